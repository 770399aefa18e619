//! Configuration for the coordination core
//!
//! Each component takes its own small config struct with sensible defaults,
//! injected at construction time. No global configuration state.

use std::time::Duration;

/// Configuration for an agent event bus
#[derive(Debug, Clone)]
pub struct BusConfig {
    /// Maximum attempts for a durable event append before buffering locally
    pub max_persist_attempts: u32,
    /// Fixed delay between append attempts
    pub persist_retry_delay: Duration,
    /// Interval at which `request_consensus` polls the durable consensus store
    pub consensus_poll_interval: Duration,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            max_persist_attempts: 3,
            persist_retry_delay: Duration::from_secs(1),
            consensus_poll_interval: Duration::from_secs(1),
        }
    }
}

impl BusConfig {
    /// Set the maximum durable append attempts
    pub fn with_max_persist_attempts(mut self, attempts: u32) -> Self {
        self.max_persist_attempts = attempts.max(1);
        self
    }

    /// Set the delay between append attempts
    pub fn with_persist_retry_delay(mut self, delay: Duration) -> Self {
        self.persist_retry_delay = delay;
        self
    }

    /// Set the consensus polling interval
    pub fn with_consensus_poll_interval(mut self, interval: Duration) -> Self {
        self.consensus_poll_interval = interval;
        self
    }
}

/// Configuration for the consensus manager
///
/// Values here are defaults applied to `ConsensusOptions` fields the caller
/// leaves unset.
#[derive(Debug, Clone)]
pub struct ConsensusConfig {
    /// Default voting window before a timer forces finalization
    pub default_timeout: Duration,
    /// Default approval threshold (0..1)
    pub default_threshold: f64,
    /// Default minimum participation ratio (0..1)
    pub default_min_participation: f64,
    /// Default quorum ratio for `ConsensusType::Quorum` requests
    pub default_quorum: f64,
    /// Default allowed vote options
    pub default_options: Vec<String>,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(60),
            default_threshold: 0.5,
            default_min_participation: 0.5,
            default_quorum: 0.67,
            default_options: vec![
                crate::consensus::VOTE_APPROVE.to_string(),
                crate::consensus::VOTE_REJECT.to_string(),
                crate::consensus::VOTE_ABSTAIN.to_string(),
            ],
        }
    }
}

impl ConsensusConfig {
    /// Set the default voting window
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Set the default approval threshold
    pub fn with_default_threshold(mut self, threshold: f64) -> Self {
        self.default_threshold = threshold.clamp(0.0, 1.0);
        self
    }
}

/// Configuration for a checkpoint manager
#[derive(Debug, Clone)]
pub struct CheckpointConfig {
    /// How many checkpoints `cleanup_old` keeps by default
    pub keep_count: usize,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self { keep_count: 10 }
    }
}

impl CheckpointConfig {
    /// Set the default retention count
    pub fn with_keep_count(mut self, keep_count: usize) -> Self {
        self.keep_count = keep_count.max(1);
        self
    }
}
