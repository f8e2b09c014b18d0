//! Timeline configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{error::ConfigError, event::MILLIS_PER_DAY};

/// Default window within which consecutive messages visually connect.
pub const DEFAULT_ADJACENCY_WINDOW: Duration = Duration::from_secs(5 * 60);

/// Tunables for the derived views.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimelineConfig {
    /// Maximum timestamp distance between two connected messages.
    pub adjacency_window: Duration,
    /// Body shown in place of a redacted event.
    pub tombstone_body: String,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self { adjacency_window: DEFAULT_ADJACENCY_WINDOW, tombstone_body: String::new() }
    }
}

impl TimelineConfig {
    /// Check that the values are usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.adjacency_window.is_zero() {
            return Err(ConfigError::ZeroAdjacencyWindow);
        }
        if self.adjacency_window > Duration::from_millis(MILLIS_PER_DAY) {
            return Err(ConfigError::AdjacencyWindowTooLarge { window: self.adjacency_window });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        let config = TimelineConfig::default();
        assert_eq!(config.adjacency_window, Duration::from_secs(300));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_degenerate_windows() {
        let zero = TimelineConfig { adjacency_window: Duration::ZERO, ..Default::default() };
        assert_eq!(zero.validate(), Err(ConfigError::ZeroAdjacencyWindow));

        let huge =
            TimelineConfig { adjacency_window: Duration::from_secs(90_000), ..Default::default() };
        assert!(matches!(huge.validate(), Err(ConfigError::AdjacencyWindowTooLarge { .. })));
    }
}
