use std::str::FromStr;
use std::time;

use envconfig::Envconfig;
use rdkafka::ClientConfig;

use crate::error::ConfigError;
use crate::kafka::ConsumerConfigBuilder;

#[derive(Envconfig, Clone, Debug)]
pub struct Config {
    #[envconfig(from = "BIND_HOST", default = "0.0.0.0")]
    pub host: String,

    #[envconfig(from = "BIND_PORT", default = "3302")]
    pub port: u16,

    #[envconfig(default = "localhost:9092")]
    pub kafka_hosts: String,

    #[envconfig(default = "false")]
    pub kafka_tls: bool,

    pub kafka_consumer_group: String,

    pub kafka_consumer_topic: String,

    // New groups start from the tail; set "earliest" to replay a topic
    #[envconfig(default = "latest")]
    pub kafka_consumer_offset_reset: String,

    // Zero keeps the consumer default for each of these
    #[envconfig(default = "0")]
    pub kafka_heartbeat_interval_ms: u32,

    #[envconfig(default = "0")]
    pub kafka_session_timeout_ms: u32,

    #[envconfig(default = "0")]
    pub kafka_max_poll_interval_ms: u32,

    #[envconfig(default = "0")]
    pub kafka_fetch_max_bytes: u32,

    #[envconfig(default = "0")]
    pub kafka_max_partition_fetch_bytes: u32,

    #[envconfig(default = "100")]
    pub num_per_commit: usize,

    #[envconfig(default = "10")]
    pub workers: usize,

    #[envconfig(default = "100")]
    pub poll_timeout_ms: EnvMsDuration,

    #[envconfig(default = "text")]
    pub log_format: LogFormat,
}

impl Config {
    /// Produce a host:port address for binding a TcpListener.
    pub fn bind(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Validate the loop settings. Runs before any consumer is created.
    pub fn looper_settings(&self) -> Result<LooperSettings, ConfigError> {
        if self.kafka_consumer_topic.is_empty() {
            return Err(ConfigError::MissingTopic);
        }
        Ok(LooperSettings::new(self.num_per_commit, self.workers)?
            .with_poll_timeout(self.poll_timeout_ms.0))
    }

    pub fn consumer_config(&self) -> ClientConfig {
        ConsumerConfigBuilder::new(&self.kafka_hosts, &self.kafka_consumer_group)
            .with_tls(self.kafka_tls)
            .with_offset_reset(&self.kafka_consumer_offset_reset)
            .with_heartbeat_interval_ms(self.kafka_heartbeat_interval_ms)
            .with_session_timeout_ms(self.kafka_session_timeout_ms)
            .with_max_poll_interval_ms(self.kafka_max_poll_interval_ms)
            .with_fetch_max_bytes(self.kafka_fetch_max_bytes)
            .with_max_partition_fetch_bytes(self.kafka_max_partition_fetch_bytes)
            .build()
    }
}

/// Commit cadence and concurrency sizing for a [`Looper`](crate::looper::Looper).
///
/// `num_per_commit` messages are dispatched between two barriers, so it is both
/// the largest number of outstanding workers and the checkpoint interval. It
/// has to be a whole multiple of `workers`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LooperSettings {
    num_per_commit: usize,
    workers: usize,
    poll_timeout: time::Duration,
}

impl LooperSettings {
    pub const DEFAULT_POLL_TIMEOUT: time::Duration = time::Duration::from_millis(100);

    pub fn new(num_per_commit: usize, workers: usize) -> Result<Self, ConfigError> {
        if workers == 0 {
            return Err(ConfigError::ZeroWorkers);
        }
        if num_per_commit == 0 {
            return Err(ConfigError::ZeroNumPerCommit);
        }
        if num_per_commit % workers != 0 {
            return Err(ConfigError::UnevenCommitCadence {
                num_per_commit,
                workers,
            });
        }
        Ok(Self {
            num_per_commit,
            workers,
            poll_timeout: Self::DEFAULT_POLL_TIMEOUT,
        })
    }

    pub fn with_poll_timeout(mut self, poll_timeout: time::Duration) -> Self {
        self.poll_timeout = poll_timeout;
        self
    }

    pub fn num_per_commit(&self) -> usize {
        self.num_per_commit
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn poll_timeout(&self) -> time::Duration {
        self.poll_timeout
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EnvMsDuration(pub time::Duration);

#[derive(Debug, PartialEq, Eq)]
pub struct ParseEnvMsDurationError;

impl FromStr for EnvMsDuration {
    type Err = ParseEnvMsDurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ms = s.parse::<u64>().map_err(|_| ParseEnvMsDurationError)?;

        Ok(EnvMsDuration(time::Duration::from_millis(ms)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, PartialEq, Eq)]
pub struct ParseLogFormatError(String);

impl FromStr for LogFormat {
    type Err = ParseLogFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "dev" => Ok(LogFormat::Text),
            "json" | "prod" => Ok(LogFormat::Json),
            other => Err(ParseLogFormatError(other.to_owned())),
        }
    }
}
