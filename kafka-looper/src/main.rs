use anyhow::{Context, Result};
use axum::{routing::get, Router};
use envconfig::Envconfig;
use futures::future::ready;
use tokio::task::JoinHandle;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use kafka_looper::config::{Config, LogFormat};
use kafka_looper::hooks::LogEventHandler;
use kafka_looper::kafka::KafkaSubscription;
use kafka_looper::looper::LooperBuilder;
use kafka_looper::metrics::{serve, setup_metrics_routes};

fn setup_tracing(format: LogFormat) {
    let base_layer = fmt::layer().with_target(true).with_level(true);
    let log_layer = match format {
        LogFormat::Text => base_layer
            .with_filter(EnvFilter::from_default_env())
            .boxed(),
        LogFormat::Json => base_layer
            .json()
            .with_filter(EnvFilter::from_default_env())
            .boxed(),
    };
    tracing_subscriber::registry().with(log_layer).init();
}

pub async fn index() -> &'static str {
    "kafka looper"
}

fn start_server(config: &Config) -> Result<JoinHandle<()>> {
    let router = Router::new()
        .route("/", get(index))
        .route("/_readiness", get(index))
        .route("/_liveness", get(|| ready("ok")));
    let router = setup_metrics_routes(router).context("failed to install metrics recorder")?;

    let bind = config.bind();
    Ok(tokio::task::spawn(async move {
        if let Err(e) = serve(router, &bind).await {
            error!("metrics server on {bind} stopped: {e}");
        }
    }))
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::init_from_env()
        .context("Failed to load configuration from environment variables")?;
    setup_tracing(config.log_format);
    info!("Starting kafka looper");

    // Cadence problems are reported before anything connects to the broker
    let settings = config.looper_settings().context("Invalid looper settings")?;

    let server_handle = start_server(&config)?;
    info!("Started metrics server on {}", config.bind());

    let subscription = KafkaSubscription::new(&config.consumer_config())
        .context("Failed to create Kafka consumer")?;

    let looper = LooperBuilder::new(&config.kafka_consumer_topic, settings)
        .consumer_group(&config.kafka_consumer_group)
        .event_handler(LogEventHandler)
        .build(subscription)?;

    // Blocks until SIGINT/SIGTERM or a fatal consumer error
    let outcome = looper.run().await;

    server_handle.abort();
    outcome.context("Looper stopped with an error")
}
