use rdkafka::ClientConfig;

/// Builds the rdkafka configuration for a looper consumer.
///
/// Defaults favour a small, steady consumer: start from the latest offset
/// for new groups, modest fetch sizes, and no automatic offset handling since
/// the looper commits explicitly after each drained batch.
pub struct ConsumerConfigBuilder {
    config: ClientConfig,
}

impl ConsumerConfigBuilder {
    pub fn new(bootstrap_servers: &str, group_id: &str) -> Self {
        let mut config = ClientConfig::new();

        config
            .set("bootstrap.servers", bootstrap_servers)
            .set("group.id", group_id)
            .set("api.version.request", "true")
            .set("auto.offset.reset", "latest")
            .set("enable.auto.commit", "false")
            .set("enable.auto.offset.store", "false")
            .set("heartbeat.interval.ms", "3000")
            .set("session.timeout.ms", "30000")
            .set("max.poll.interval.ms", "120000")
            .set("fetch.max.bytes", "1024000")
            .set("max.partition.fetch.bytes", "256000");

        Self { config }
    }

    /// Enable TLS/SSL for Kafka connection
    pub fn with_tls(mut self, enabled: bool) -> Self {
        if enabled {
            self.config
                .set("security.protocol", "ssl")
                .set("enable.ssl.certificate.verification", "false");
        }
        self
    }

    /// Override offset reset policy: earliest or latest
    pub fn with_offset_reset(mut self, policy: &str) -> Self {
        self.config.set("auto.offset.reset", policy);
        self
    }

    // The overrides below treat 0 as "keep the default".

    pub fn with_heartbeat_interval_ms(self, ms: u32) -> Self {
        self.set_nonzero("heartbeat.interval.ms", ms)
    }

    pub fn with_session_timeout_ms(self, ms: u32) -> Self {
        self.set_nonzero("session.timeout.ms", ms)
    }

    pub fn with_max_poll_interval_ms(self, ms: u32) -> Self {
        self.set_nonzero("max.poll.interval.ms", ms)
    }

    pub fn with_fetch_max_bytes(self, bytes: u32) -> Self {
        self.set_nonzero("fetch.max.bytes", bytes)
    }

    pub fn with_max_partition_fetch_bytes(self, bytes: u32) -> Self {
        self.set_nonzero("max.partition.fetch.bytes", bytes)
    }

    /// Add any custom configuration
    pub fn set(mut self, key: &str, value: &str) -> Self {
        self.config.set(key, value);
        self
    }

    fn set_nonzero(mut self, key: &str, value: u32) -> Self {
        if value != 0 {
            self.config.set(key, value.to_string());
        }
        self
    }

    pub fn build(self) -> ClientConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ConsumerConfigBuilder::new("kafka:9092", "looper").build();

        assert_eq!(config.get("bootstrap.servers"), Some("kafka:9092"));
        assert_eq!(config.get("group.id"), Some("looper"));
        assert_eq!(config.get("auto.offset.reset"), Some("latest"));
        assert_eq!(config.get("enable.auto.commit"), Some("false"));
        assert_eq!(config.get("heartbeat.interval.ms"), Some("3000"));
        assert_eq!(config.get("session.timeout.ms"), Some("30000"));
        assert_eq!(config.get("max.poll.interval.ms"), Some("120000"));
        assert_eq!(config.get("fetch.max.bytes"), Some("1024000"));
        assert_eq!(config.get("max.partition.fetch.bytes"), Some("256000"));
        assert_eq!(config.get("security.protocol"), None);
    }

    #[test]
    fn test_zero_overrides_keep_defaults() {
        let config = ConsumerConfigBuilder::new("kafka:9092", "looper")
            .with_heartbeat_interval_ms(0)
            .with_session_timeout_ms(45000)
            .with_fetch_max_bytes(0)
            .build();

        assert_eq!(config.get("heartbeat.interval.ms"), Some("3000"));
        assert_eq!(config.get("session.timeout.ms"), Some("45000"));
        assert_eq!(config.get("fetch.max.bytes"), Some("1024000"));
    }

    #[test]
    fn test_tls_and_offset_reset() {
        let config = ConsumerConfigBuilder::new("kafka:9092", "looper")
            .with_tls(true)
            .with_offset_reset("earliest")
            .build();

        assert_eq!(config.get("security.protocol"), Some("ssl"));
        assert_eq!(config.get("auto.offset.reset"), Some("earliest"));
    }
}
