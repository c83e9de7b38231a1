use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::SyncError;

const DEFAULT_DEBOUNCE_MS: u64 = 100;
const DEFAULT_SYNC_INTERVAL_MS: u64 = 5_000;

/// Timing for a [`SyncManager`](crate::SyncManager).
///
/// Loadable from TOML:
///
/// ```
/// use crdt_sync::SyncConfig;
///
/// let config = SyncConfig::from_toml_str("debounce_ms = 50").unwrap();
/// assert_eq!(config.debounce_ms, 50);
/// assert_eq!(config.sync_interval_ms, 5_000);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncConfig {
    /// Quiet period after the last local mutation before a CRDT is broadcast.
    pub debounce_ms: u64,
    /// Period of the full re-broadcast that heals dropped updates.
    pub sync_interval_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            sync_interval_ms: DEFAULT_SYNC_INTERVAL_MS,
        }
    }
}

impl SyncConfig {
    /// Set the debounce window.
    pub fn debounce(mut self, debounce: Duration) -> Self {
        self.debounce_ms = duration_ms(debounce);
        self
    }

    /// Set the periodic sync interval.
    pub fn sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval_ms = duration_ms(interval);
        self
    }

    /// The debounce window as a [`Duration`].
    pub fn debounce_duration(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// The periodic sync interval as a [`Duration`].
    pub fn sync_interval_duration(&self) -> Duration {
        Duration::from_millis(self.sync_interval_ms)
    }

    /// Parse and validate a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(source: &str) -> Result<Self, SyncError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the sync loop cannot run with.
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.sync_interval_ms == 0 {
            return Err(SyncError::InvalidConfig(
                "sync_interval_ms must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.debounce_duration(), Duration::from_millis(100));
        assert_eq!(config.sync_interval_duration(), Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn builder_setters() {
        let config = SyncConfig::default()
            .debounce(Duration::from_millis(10))
            .sync_interval(Duration::from_secs(1));
        assert_eq!(config.debounce_ms, 10);
        assert_eq!(config.sync_interval_ms, 1_000);
    }

    #[test]
    fn parses_toml() {
        let config = SyncConfig::from_toml_str(
            r#"
            debounce_ms = 250
            sync_interval_ms = 30000
            "#,
        )
        .unwrap();
        assert_eq!(config.debounce_ms, 250);
        assert_eq!(config.sync_interval_ms, 30_000);

        assert_eq!(SyncConfig::from_toml_str("").unwrap(), SyncConfig::default());
    }

    #[test]
    fn rejects_bad_toml() {
        assert!(matches!(
            SyncConfig::from_toml_str("debounce = 5"),
            Err(SyncError::Config(_))
        ));
        assert!(matches!(
            SyncConfig::from_toml_str("debounce_ms = \"soon\""),
            Err(SyncError::Config(_))
        ));
        assert!(matches!(
            SyncConfig::from_toml_str("sync_interval_ms = 0"),
            Err(SyncError::InvalidConfig(_))
        ));
    }
}
