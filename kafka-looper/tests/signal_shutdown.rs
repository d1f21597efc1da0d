//! Sends a real SIGTERM to the test process, so it lives in its own binary.

use std::time::Duration;

use kafka_looper::kafka::Partition;
use kafka_looper::test_utils::{CallCounter, MockSubscription, RecordingHandler, Step};
use kafka_looper::{Looper, LooperSettings};

const TOPIC: &str = "events";

#[tokio::test]
async fn test_sigterm_mid_batch_closes_once_without_committing() {
    // One message of a four-message batch, then the script runs dry and the
    // loop keeps idling until the signal arrives.
    let (subscription, state) = MockSubscription::new(vec![
        Step::Assign(vec![Partition::new(TOPIC, 0)]),
        Step::message(TOPIC, 0, 0),
    ]);
    let settings = LooperSettings::new(4, 2)
        .unwrap()
        .with_poll_timeout(Duration::from_millis(5));
    let handler = RecordingHandler::new();
    let on_close = CallCounter::new();

    let looper = Looper::<MockSubscription>::builder(TOPIC, settings)
        .event_handler(handler.clone())
        .close_handler(on_close.clone())
        .build(subscription)
        .unwrap();
    let run = tokio::spawn(looper.run());

    // Handlers are installed before subscribing, so a second poll means the
    // message was dispatched and SIGTERM is trapped.
    tokio::time::timeout(Duration::from_secs(5), async {
        while state.poll_count() < 2 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("looper should start polling");

    let status = std::process::Command::new("kill")
        .args(["-TERM", &std::process::id().to_string()])
        .status()
        .unwrap();
    assert!(status.success());

    let result = tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .expect("looper should stop after SIGTERM")
        .unwrap();

    assert!(result.is_ok());
    assert_eq!(handler.handled(), vec![(Partition::new(TOPIC, 0), 0)]);
    assert!(state.commits().is_empty());
    assert_eq!(state.close_count(), 1);
    assert_eq!(on_close.calls(), 1);
    assert_eq!(state.subscribed_topics(), vec![TOPIC.to_string()]);
}
