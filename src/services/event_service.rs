//! Append-only call/user event history with bounded retention
//!
//! Audit logging is fire-and-forget: a failed append must never fail the
//! call-state mutation it documents. Dropped appends are counted so operators
//! can at least see that events were lost.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::CoreConfig;
use crate::error::Result;
use crate::models::{CallEvent, CallEventType};
use crate::store::EphemeralStore;

const CALL_EVENTS_PREFIX: &str = "call:events:";
const USER_EVENTS_PREFIX: &str = "user:events:";

/// Number of list entries scanned per key in the by-type scan
const SCAN_DEPTH: i64 = 50;

/// Service recording and querying per-call and per-user audit events
pub struct CallEventService {
    store: Arc<dyn EphemeralStore>,
    event_ttl: Duration,
    default_limit: usize,
    dropped: AtomicU64,
}

impl CallEventService {
    pub fn new(store: Arc<dyn EphemeralStore>, config: &CoreConfig) -> Self {
        Self {
            store,
            event_ttl: config.event_ttl,
            default_limit: config.default_event_limit,
            dropped: AtomicU64::new(0),
        }
    }

    /// Append an event to the per-call and per-user histories.
    ///
    /// Storage failures are logged and counted, never propagated.
    pub async fn log_event(
        &self,
        call_id: &str,
        user_id: &str,
        event_type: CallEventType,
        data: BTreeMap<String, serde_json::Value>,
    ) {
        let event = CallEvent::new(call_id, user_id, event_type, data);
        if let Err(err) = self.append(&event).await {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            warn!(
                call_id,
                user_id,
                ?event_type,
                %err,
                "Dropped call event"
            );
        } else {
            debug!(call_id, user_id, ?event_type, "Call event logged");
        }
    }

    async fn append(&self, event: &CallEvent) -> Result<()> {
        let json = serde_json::to_string(event)?;

        let call_key = format!("{CALL_EVENTS_PREFIX}{}", event.call_id);
        let user_key = format!("{USER_EVENTS_PREFIX}{}", event.user_id);

        self.store.list_push_front(&call_key, &json).await?;
        self.store.list_push_front(&user_key, &json).await?;

        // Retention is re-applied on every append
        self.store.expire(&call_key, self.event_ttl).await?;
        self.store.expire(&user_key, self.event_ttl).await?;

        Ok(())
    }

    /// Number of events lost to storage failures since startup
    pub fn dropped_event_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Events for one call, chronologically ascending
    pub async fn get_call_events(&self, call_id: &str, limit: usize) -> Result<Vec<CallEvent>> {
        let key = format!("{CALL_EVENTS_PREFIX}{call_id}");
        let mut events = self.read_list(&key, limit).await?;
        events.sort_by_key(|e| e.timestamp);
        Ok(events)
    }

    /// Events for one user, most recent first
    pub async fn get_user_events(&self, user_id: &str, limit: usize) -> Result<Vec<CallEvent>> {
        let key = format!("{USER_EVENTS_PREFIX}{user_id}");
        let mut events = self.read_list(&key, limit).await?;
        events.sort_by_key(|e| std::cmp::Reverse(e.timestamp));
        Ok(events)
    }

    async fn read_list(&self, key: &str, limit: usize) -> Result<Vec<CallEvent>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let raw = self.store.list_range(key, 0, limit as i64 - 1).await?;
        let mut events = Vec::with_capacity(raw.len());
        for json in raw {
            match serde_json::from_str::<CallEvent>(&json) {
                Ok(event) => events.push(event),
                Err(err) => warn!(key, %err, "Skipping undecodable event"),
            }
        }
        Ok(events)
    }

    /// Scan all call-event keys for events of one type, most recent first.
    ///
    /// O(n) over the key space; acceptable only while call volume and the
    /// retention window stay bounded. Not suitable for larger windows.
    pub async fn get_events_by_type(
        &self,
        event_type: CallEventType,
        limit: usize,
    ) -> Result<Vec<CallEvent>> {
        let keys = self.store.keys(&format!("{CALL_EVENTS_PREFIX}*")).await?;

        let mut events = Vec::new();
        for key in keys.into_iter().take(limit) {
            for json in self.store.list_range(&key, 0, SCAN_DEPTH - 1).await? {
                match serde_json::from_str::<CallEvent>(&json) {
                    Ok(event) if event.event_type == event_type => events.push(event),
                    Ok(_) => {}
                    Err(err) => warn!(key, %err, "Skipping undecodable event"),
                }
            }
        }

        events.sort_by_key(|e| std::cmp::Reverse(e.timestamp));
        events.truncate(limit);
        Ok(events)
    }

    /// Per-type event counts for one call; every type is present, zero-filled
    pub async fn get_event_statistics(
        &self,
        call_id: &str,
    ) -> Result<HashMap<CallEventType, u64>> {
        let events = self.get_call_events(call_id, self.default_limit).await?;
        Ok(Self::tabulate(&events))
    }

    /// Per-type event counts for one user over an optional date window
    pub async fn get_user_event_statistics(
        &self,
        user_id: &str,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<HashMap<CallEventType, u64>> {
        let events: Vec<CallEvent> = self
            .get_user_events(user_id, self.default_limit)
            .await?
            .into_iter()
            .filter(|e| from.is_none_or(|f| e.timestamp >= f))
            .filter(|e| to.is_none_or(|t| e.timestamp <= t))
            .collect();
        Ok(Self::tabulate(&events))
    }

    fn tabulate(events: &[CallEvent]) -> HashMap<CallEventType, u64> {
        let mut stats: HashMap<CallEventType, u64> =
            CallEventType::ALL.iter().map(|t| (*t, 0)).collect();
        for event in events {
            *stats.entry(event.event_type).or_default() += 1;
        }
        stats
    }

    /// Re-apply the retention TTL to every event key currently present.
    ///
    /// Protects against keys whose TTL was lost to a partial write. Returns
    /// the number of keys refreshed.
    pub async fn cleanup_old_events(&self) -> Result<usize> {
        let mut keys = self.store.keys(&format!("{CALL_EVENTS_PREFIX}*")).await?;
        keys.extend(self.store.keys(&format!("{USER_EVENTS_PREFIX}*")).await?);

        let refreshes = keys.iter().map(|key| self.store.expire(key, self.event_ttl));
        let refreshed = futures::future::join_all(refreshes)
            .await
            .into_iter()
            .filter(|r| matches!(r, Ok(true)))
            .count();

        info!(refreshed, "Refreshed event retention");
        Ok(refreshed)
    }
}
