//! Configuration for relays and hubs.

use crate::error::ConfigError;

/// Configuration for a [`BoundedRelay`](crate::BoundedRelay).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct RelayConfig {
    /// Number of slots buffered between producer and consumer.
    ///
    /// The terminal marker occupies a slot like any value.
    ///
    /// Default: 1
    pub capacity: usize,

    /// Enable metrics collection (slight overhead)
    pub enable_metrics: bool,
}

impl RelayConfig {
    /// Creates a new configuration with custom settings.
    pub const fn new(capacity: usize, enable_metrics: bool) -> Self {
        Self {
            capacity,
            enable_metrics,
        }
    }

    /// A relay with room for a burst of values before the producer suspends.
    pub const fn buffered() -> Self {
        Self::new(64, false)
    }

    /// Sets the capacity.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Enables or disables metrics.
    pub fn with_metrics(mut self, enable: bool) -> Self {
        self.enable_metrics = enable;
        self
    }

    /// Checks that the configuration describes a usable relay.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        Ok(())
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self::new(1, false)
    }
}

/// Configuration for a [`MulticastHub`](crate::MulticastHub).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct HubConfig {
    /// Subscribers that must register before the first emission goes out.
    ///
    /// Default: 1
    pub min_subscribers: usize,

    /// Configuration applied to every subscriber's relay.
    pub relay: RelayConfig,
}

impl HubConfig {
    /// Creates a configuration gated on `min_subscribers` with default relays.
    pub fn new(min_subscribers: usize) -> Self {
        Self {
            min_subscribers,
            relay: RelayConfig::default(),
        }
    }

    /// Sets the quorum.
    pub fn with_min_subscribers(mut self, min_subscribers: usize) -> Self {
        self.min_subscribers = min_subscribers;
        self
    }

    /// Sets the per-subscriber relay configuration.
    pub fn with_relay(mut self, relay: RelayConfig) -> Self {
        self.relay = relay;
        self
    }

    /// Checks both the quorum and the relay configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_subscribers == 0 {
            return Err(ConfigError::ZeroQuorum);
        }
        self.relay.validate()
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        Self::new(1)
    }
}

/// Configuration for a [`ReplaySubject`](crate::ReplaySubject).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ReplayConfig {
    /// Most recent values kept for subscribers that join later. `None`
    /// keeps every value.
    ///
    /// Default: None
    pub max_size: Option<usize>,

    /// Configuration applied to every subscriber's relay. A late
    /// subscriber's relay is enlarged to hold everything replayed to it.
    pub relay: RelayConfig,
}

impl ReplayConfig {
    /// Keeps only the last `max_size` values.
    pub fn last(max_size: usize) -> Self {
        Self {
            max_size: Some(max_size),
            relay: RelayConfig::default(),
        }
    }

    /// Sets the per-subscriber relay configuration.
    pub fn with_relay(mut self, relay: RelayConfig) -> Self {
        self.relay = relay;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_size == Some(0) {
            return Err(ConfigError::ZeroReplay);
        }
        self.relay.validate()
    }
}
