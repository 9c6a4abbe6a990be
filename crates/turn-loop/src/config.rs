use std::time::Duration;

/// Configuration for the turn loop.
#[derive(Debug, Clone)]
pub struct TurnLoopConfig {
    /// Upper bound for one `await_next` on a deferred layer's channel.
    pub response_timeout: Duration,
    /// A guard holds when its confidence is strictly above this value.
    pub condition_threshold: f64,
    /// Capacity of the bounded channel between an action and the executor's
    /// collection loop.
    pub emitter_capacity: usize,
}

impl Default for TurnLoopConfig {
    fn default() -> Self {
        Self {
            response_timeout: Duration::from_secs(60),
            condition_threshold: 0.0,
            emitter_capacity: 16,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = TurnLoopConfig::default();
        assert_eq!(config.response_timeout, Duration::from_secs(60));
        assert_eq!(config.condition_threshold, 0.0);
        assert_eq!(config.emitter_capacity, 16);
    }
}
