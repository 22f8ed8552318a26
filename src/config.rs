//! Engine configuration: defaults, validation, and the historical
//! JavaScript-driver option aliases (§3, §4.8).

use std::time::Duration;

use crate::error::{Error, Result};

pub(crate) const DEFAULT_BAUD: u32 = 115_200;
pub(crate) const DEFAULT_RECONNECT_INTERVAL_MS: u64 = 1000;
pub(crate) const DEFAULT_REJECT_ON_LOCKED: bool = false;
pub(crate) const DEFAULT_LOCK: bool = true;

/// Watchdog period is fixed by the wire protocol, not user-configurable.
pub const WATCHDOG_PERIOD: Duration = Duration::from_millis(5000);

/// Validated, typed engine options.
///
/// Two option keys accepted by [`EngineOptions::from_pairs`] are historical
/// aliases carried over from the original JavaScript driver's configuration
/// blobs: `reconnectTime` for `reconnect_interval_ms`, and `rejectOnLocked`
/// for `reject_on_locked`.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineOptions {
    pub baud_rate: u32,
    /// Whether to request an exclusive OS-level lock on the serial port.
    pub lock: bool,
    pub reconnect_interval_ms: u64,
    pub reject_on_locked: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD,
            lock: DEFAULT_LOCK,
            reconnect_interval_ms: DEFAULT_RECONNECT_INTERVAL_MS,
            reject_on_locked: DEFAULT_REJECT_ON_LOCKED,
        }
    }
}

impl EngineOptions {
    pub(crate) fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }

    fn validate(&self) -> Result<()> {
        if self.baud_rate == 0 {
            return Err(Error::Config("baud_rate must be greater than 0".into()));
        }
        if self.reconnect_interval_ms == 0 {
            return Err(Error::Config(
                "reconnect_interval_ms must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    /// Builds validated options from a flat key/value list, as loaded from
    /// an external JSON/TOML configuration blob. Canonical snake_case keys
    /// take precedence over historical aliases when both are present; a
    /// `tracing::warn!` fires once per alias encountered.
    pub fn from_pairs(pairs: &[(String, String)]) -> Result<Self> {
        let mut opts = Self::default();

        let get = |key: &str| pairs.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str());

        if let Some(v) = get("baud_rate") {
            opts.baud_rate = v
                .parse()
                .map_err(|_| Error::Config(format!("invalid baud_rate: {v}")))?;
        }
        if let Some(v) = get("lock") {
            opts.lock = v
                .parse()
                .map_err(|_| Error::Config(format!("invalid lock: {v}")))?;
        }

        match (get("reconnect_interval_ms"), get("reconnectTime")) {
            (Some(v), _) => {
                opts.reconnect_interval_ms = v
                    .parse()
                    .map_err(|_| Error::Config(format!("invalid reconnect_interval_ms: {v}")))?;
            }
            (None, Some(v)) => {
                tracing::warn!(alias = "reconnectTime", "using historical config alias");
                opts.reconnect_interval_ms = v
                    .parse()
                    .map_err(|_| Error::Config(format!("invalid reconnectTime: {v}")))?;
            }
            (None, None) => {}
        }

        match (get("reject_on_locked"), get("rejectOnLocked")) {
            (Some(v), _) => {
                opts.reject_on_locked = v
                    .parse()
                    .map_err(|_| Error::Config(format!("invalid reject_on_locked: {v}")))?;
            }
            (None, Some(v)) => {
                tracing::warn!(alias = "rejectOnLocked", "using historical config alias");
                opts.reject_on_locked = v
                    .parse()
                    .map_err(|_| Error::Config(format!("invalid rejectOnLocked: {v}")))?;
            }
            (None, None) => {}
        }

        opts.validate()?;
        Ok(opts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let opts = EngineOptions::default();
        assert_eq!(opts.baud_rate, 115_200);
        assert!(opts.lock);
        assert_eq!(opts.reconnect_interval_ms, 1000);
        assert!(!opts.reject_on_locked);
    }

    #[test]
    fn canonical_key_wins_over_alias() {
        let pairs = vec![
            ("reconnect_interval_ms".to_string(), "2000".to_string()),
            ("reconnectTime".to_string(), "9999".to_string()),
        ];
        let opts = EngineOptions::from_pairs(&pairs).unwrap();
        assert_eq!(opts.reconnect_interval_ms, 2000);
    }

    #[test]
    fn alias_used_when_canonical_absent() {
        let pairs = vec![("rejectOnLocked".to_string(), "true".to_string())];
        let opts = EngineOptions::from_pairs(&pairs).unwrap();
        assert!(opts.reject_on_locked);
    }

    #[test]
    fn zero_baud_rejected() {
        let pairs = vec![("baud_rate".to_string(), "0".to_string())];
        assert!(EngineOptions::from_pairs(&pairs).is_err());
    }
}
