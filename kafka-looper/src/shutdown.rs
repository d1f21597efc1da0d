use std::io;

use tokio::signal::unix::{signal, SignalKind};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Turns SIGINT/SIGTERM (or a programmatic trigger) into a stop request the
/// poll loop checks once per iteration.
#[derive(Clone, Debug, Default)]
pub struct ShutdownController {
    token: CancellationToken,
}

impl ShutdownController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install SIGINT and SIGTERM handlers. The handlers are registered before
    /// this returns; the returned task fires the shutdown on the first signal.
    pub fn trap_signals(&self) -> io::Result<JoinHandle<()>> {
        let mut term = signal(SignalKind::terminate())?;
        let mut interrupt = signal(SignalKind::interrupt())?;
        let token = self.token.clone();

        Ok(tokio::spawn(async move {
            tokio::select! {
                _ = term.recv() => info!("received SIGTERM"),
                _ = interrupt.recv() => info!("received SIGINT"),
                _ = token.cancelled() => return,
            }
            token.cancel();
        }))
    }

    /// Request a shutdown without a signal.
    pub fn trigger(&self) {
        self.token.cancel();
    }

    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once shutdown has been requested.
    pub async fn triggered(&self) {
        self.token.cancelled().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_trigger_is_visible_to_clones() {
        let controller = ShutdownController::new();
        let observer = controller.clone();
        assert!(!observer.is_triggered());

        controller.trigger();
        assert!(observer.is_triggered());
        tokio::time::timeout(Duration::from_secs(1), observer.triggered())
            .await
            .expect("shutdown future should resolve once triggered");
    }

    #[tokio::test]
    async fn test_signal_task_exits_on_manual_trigger() {
        let controller = ShutdownController::new();
        let task = controller.trap_signals().unwrap();

        controller.trigger();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("signal task should stop after a manual trigger")
            .unwrap();
    }
}
