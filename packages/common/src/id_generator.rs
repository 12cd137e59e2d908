use crc32fast::Hasher;
use std::sync::atomic::{AtomicU64, Ordering};

/// Shared by every generator in the process so ids never collide across stores
static GLOBAL_COUNTER: AtomicU64 = AtomicU64::new(0);

static INSTANCE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Derive a session id from a seed using CRC32
pub fn get_session_id(seed: &str) -> String {
    let mut hasher = Hasher::new();
    hasher.update(seed.as_bytes());
    format!("{:08x}", hasher.finalize())
}

/// Generates `sessionId:counter` ids.
///
/// The session id is per instance; the counter is process-wide and
/// monotonically increasing.
#[derive(Debug, Clone)]
pub struct IdGenerator {
    session_id: String,
}

impl IdGenerator {
    /// Fresh generator with a session id unique to this process and instant
    pub fn new() -> Self {
        let instance = INSTANCE_COUNTER.fetch_add(1, Ordering::Relaxed);
        let seed = format!(
            "session://{}/{}/{}",
            std::process::id(),
            chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default(),
            instance
        );
        Self {
            session_id: get_session_id(&seed),
        }
    }

    /// Generator with a fixed session id (e.g. restored from config)
    pub fn from_session(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
        }
    }

    pub fn next_id(&self) -> String {
        let count = GLOBAL_COUNTER.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{}:{}", self.session_id, count)
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_session_id_is_stable_per_seed() {
        assert_eq!(get_session_id("a"), get_session_id("a"));
        assert_ne!(get_session_id("a"), get_session_id("b"));
    }

    #[test]
    fn test_ids_unique_across_instances() {
        let a = IdGenerator::from_session("same");
        let b = IdGenerator::from_session("same");

        let mut seen = HashSet::new();
        for _ in 0..50 {
            assert!(seen.insert(a.next_id()));
            assert!(seen.insert(b.next_id()));
        }
    }

    #[test]
    fn test_id_format() {
        let gen = IdGenerator::from_session("abc");
        let id = gen.next_id();
        let (session, counter) = id.split_once(':').unwrap();

        assert_eq!(session, "abc");
        assert!(counter.parse::<u64>().is_ok());
    }

    #[test]
    fn test_fresh_generators_get_distinct_sessions() {
        assert_ne!(IdGenerator::new().session_id(), IdGenerator::new().session_id());
    }
}
