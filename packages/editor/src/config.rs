//! Store configuration.

use crate::EditorError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_HISTORY_MAX_SIZE: usize = 100;
pub const DEFAULT_COMPRESSION_WINDOW_MS: i64 = 1_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StoreConfig {
    /// How long a queued writer waits for the lock
    pub lock_timeout_ms: u64,

    /// Maximum number of undo entries kept
    pub history_max_size: usize,

    /// Adjacent single-node edits closer than this are merged by compression
    pub compression_window_ms: i64,

    /// Fixed session id; generated when absent
    pub session_id: Option<String>,

    pub validate_by_default: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: DEFAULT_LOCK_TIMEOUT_MS,
            history_max_size: DEFAULT_HISTORY_MAX_SIZE,
            compression_window_ms: DEFAULT_COMPRESSION_WINDOW_MS,
            session_id: None,
            validate_by_default: true,
        }
    }
}

impl StoreConfig {
    pub fn from_json(json: &str) -> Result<Self, EditorError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = StoreConfig::from_json(r#"{"lockTimeoutMs": 250, "sessionId": "s1"}"#).unwrap();

        assert_eq!(config.lock_timeout(), Duration::from_millis(250));
        assert_eq!(config.session_id.as_deref(), Some("s1"));
        assert_eq!(config.history_max_size, DEFAULT_HISTORY_MAX_SIZE);
        assert!(config.validate_by_default);
    }

    #[test]
    fn test_invalid_json_is_config_error() {
        assert!(matches!(
            StoreConfig::from_json("{not json"),
            Err(EditorError::Config(_))
        ));
    }
}
