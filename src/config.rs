//! Retention and capacity defaults for the orchestration core

use std::time::Duration;

/// TTLs applied to store keys. Call and quality records are refreshed on
/// every write; event lists on every append. Secondary indexes carry no TTL
/// of their own and are treated as hints by readers.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// TTL for `call:<id>` records
    pub call_ttl: Duration,
    /// Retention for `call:events:<id>` and `user:events:<id>` lists
    pub event_ttl: Duration,
    /// TTL for `call:quality:<id>:<user>` snapshots
    pub quality_ttl: Duration,
    /// Default number of events fetched when tabulating statistics
    pub default_event_limit: usize,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            call_ttl: Duration::from_secs(60 * 60),
            event_ttl: Duration::from_secs(24 * 60 * 60),
            quality_ttl: Duration::from_secs(5 * 60),
            default_event_limit: 100,
        }
    }
}
