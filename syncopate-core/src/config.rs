use std::time::Duration;

/// The configuration of a syncopate deployment.
///
/// Every room created by the registry shares this configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// How many pending entries a room's queue may hold
    pub max_queue_size: usize,
    /// How many resolution attempts a track gets before it is skipped
    pub retry_limit: u32,
    /// How long to wait before retrying a failed resolution
    pub retry_backoff: Duration,
    /// How long a single resolution attempt may take before it counts as failed
    pub resolve_timeout: Duration,
    /// How often a room advances its playback clock
    pub tick_interval: Duration,
    /// How often subscribers are expected to signal liveness
    pub keepalive_interval: Duration,
    /// How many consecutive liveness signals a subscriber may miss
    pub missed_keepalive_limit: u32,
    /// How long a room with zero subscribers stays alive
    pub idle_timeout: Duration,
    /// Whether queue contents are written to the room store
    pub persistence_enabled: bool,
}

impl Config {
    /// How long a subscriber may stay silent before it is evicted.
    pub fn liveness_grace(&self) -> Duration {
        self.keepalive_interval * self.missed_keepalive_limit
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            // Enough for a long listening session without unbounded growth
            max_queue_size: 100,
            // Providers flake, three tries covers the transient cases
            retry_limit: 3,
            retry_backoff: Duration::from_millis(500),
            resolve_timeout: Duration::from_secs(10),
            // Once per second keeps clients in lock-step without flooding them
            tick_interval: Duration::from_secs(1),
            keepalive_interval: Duration::from_secs(10),
            missed_keepalive_limit: 3,
            // Rooms linger a while so brief disconnects don't destroy them
            idle_timeout: Duration::from_secs(60 * 5),
            persistence_enabled: true,
        }
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use super::Config;

    #[test]
    fn liveness_grace_covers_all_missed_signals() {
        let config = Config {
            keepalive_interval: Duration::from_secs(5),
            missed_keepalive_limit: 4,
            ..Default::default()
        };

        assert_eq!(config.liveness_grace(), Duration::from_secs(20));
    }
}
