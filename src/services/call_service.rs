//! Call lifecycle service: creation, status transitions, participants
//!
//! Every mutation is a read-modify-write against the store, serialized per
//! call id by an in-process async lock, and mirrored into the event log.

use chrono::Utc;
use dashmap::DashMap;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::CoreConfig;
use crate::error::Result;
use crate::models::{
    Call, CallEventType, CallParticipant, CallSettings, CallStatus, CallType, ParticipantRole,
    ParticipantStatus,
};
use crate::services::CallEventService;
use crate::store::EphemeralStore;

const CALL_PREFIX: &str = "call:";
const USER_CALLS_PREFIX: &str = "user:calls:";
const ACTIVE_CALLS_KEY: &str = "active_calls";

/// Typed outcome of a status transition request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusChange {
    Applied,
    NotFound,
    /// The legal-transition table rejected the request
    Rejected {
        from: CallStatus,
        to: CallStatus,
    },
}

impl StatusChange {
    pub fn is_applied(&self) -> bool {
        matches!(self, StatusChange::Applied)
    }
}

/// Authoritative owner of `Call` records and their participants
pub struct CallService {
    store: Arc<dyn EphemeralStore>,
    events: Arc<CallEventService>,
    call_ttl: Duration,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl CallService {
    pub fn new(
        store: Arc<dyn EphemeralStore>,
        events: Arc<CallEventService>,
        config: &CoreConfig,
    ) -> Self {
        Self {
            store,
            events,
            call_ttl: config.call_ttl,
            locks: DashMap::new(),
        }
    }

    /// Per-call mutation lock. Serializes read-modify-write cycles so
    /// concurrent mutations cannot silently overwrite each other.
    fn lock_for(&self, call_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(call_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn generate_room_id() -> String {
        let token = Uuid::new_v4().simple().to_string();
        format!("room_{}", &token[..8])
    }

    async fn store_call(&self, call: &Call) -> Result<()> {
        let json = serde_json::to_string(call)?;
        self.store
            .set(&format!("{CALL_PREFIX}{}", call.id), &json, Some(self.call_ttl))
            .await?;
        Ok(())
    }

    /// Start a call between a caller and a callee.
    ///
    /// The caller joins as connected host, the callee is invited. The call is
    /// indexed under the global active set and both users' personal sets.
    pub async fn create_call(
        &self,
        caller_id: &str,
        callee_id: &str,
        call_type: CallType,
        conversation_id: Option<&str>,
    ) -> Result<Call> {
        let now = Utc::now();
        let id = Uuid::new_v4().to_string();

        let mut host = CallParticipant::new(&id, caller_id, ParticipantRole::Host);
        host.status = ParticipantStatus::Connected;
        host.joined_at = Some(now);
        let callee = CallParticipant::new(&id, callee_id, ParticipantRole::Participant);

        let call = Call {
            id: id.clone(),
            caller_id: caller_id.to_string(),
            callee_id: callee_id.to_string(),
            call_type,
            status: CallStatus::Initiated,
            conversation_id: conversation_id.map(String::from),
            room_id: Self::generate_room_id(),
            participants: vec![host, callee],
            settings: CallSettings::default(),
            created_at: now,
            started_at: None,
            ended_at: None,
        };

        self.store_call(&call).await?;

        self.store.set_add(ACTIVE_CALLS_KEY, &id).await?;
        self.store
            .set_add(&format!("{USER_CALLS_PREFIX}{caller_id}"), &id)
            .await?;
        self.store
            .set_add(&format!("{USER_CALLS_PREFIX}{callee_id}"), &id)
            .await?;

        self.events
            .log_event(
                &id,
                caller_id,
                CallEventType::CallStarted,
                BTreeMap::from([
                    ("type".to_string(), json!(call_type)),
                    ("calleeId".to_string(), json!(callee_id)),
                ]),
            )
            .await;

        info!(call_id = %id, caller_id, callee_id, "Call created");
        Ok(call)
    }

    /// Fetch a call. Absence is routine for expired or unknown ids.
    pub async fn get_call(&self, call_id: &str) -> Result<Option<Call>> {
        match self.store.get(&format!("{CALL_PREFIX}{call_id}")).await? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Request a status transition, consulting the legal-transition table.
    pub async fn update_status(&self, call_id: &str, status: CallStatus) -> Result<StatusChange> {
        let lock = self.lock_for(call_id);
        let _guard = lock.lock().await;
        self.apply_status(call_id, status).await
    }

    /// Status transition body; caller must hold the per-call lock.
    async fn apply_status(&self, call_id: &str, status: CallStatus) -> Result<StatusChange> {
        let Some(mut call) = self.get_call(call_id).await? else {
            return Ok(StatusChange::NotFound);
        };

        let old_status = call.status;
        if !old_status.can_transition_to(status) {
            warn!(call_id, ?old_status, ?status, "Rejected illegal status transition");
            return Ok(StatusChange::Rejected {
                from: old_status,
                to: status,
            });
        }

        let now = Utc::now();
        call.status = status;
        if status == CallStatus::Active && call.started_at.is_none() {
            call.started_at = Some(now);
        }
        if status.is_terminal() {
            call.ended_at = Some(now);
        }

        self.store_call(&call).await?;

        if status.is_terminal() {
            self.store.set_remove(ACTIVE_CALLS_KEY, call_id).await?;
            // Terminal calls accept no further mutations
            self.locks.remove(call_id);
        }

        let event_type = match status {
            CallStatus::Ended => CallEventType::CallEnded,
            CallStatus::Declined => CallEventType::CallDeclined,
            CallStatus::Missed => CallEventType::CallMissed,
            CallStatus::Failed => CallEventType::CallFailed,
            _ => CallEventType::CallStarted,
        };
        self.events
            .log_event(
                call_id,
                &call.caller_id,
                event_type,
                BTreeMap::from([
                    ("oldStatus".to_string(), json!(old_status)),
                    ("newStatus".to_string(), json!(status)),
                ]),
            )
            .await;

        info!(call_id, ?old_status, ?status, "Call status updated");
        Ok(StatusChange::Applied)
    }

    /// Add a participant in invited status. Idempotent for existing members;
    /// fails when the call is absent or at capacity.
    pub async fn add_participant(
        &self,
        call_id: &str,
        user_id: &str,
        role: ParticipantRole,
    ) -> Result<bool> {
        let lock = self.lock_for(call_id);
        let _guard = lock.lock().await;

        let Some(mut call) = self.get_call(call_id).await? else {
            return Ok(false);
        };

        if call.participant(user_id).is_some() {
            return Ok(true);
        }

        if call.participants.len() >= call.settings.max_participants {
            warn!(call_id, user_id, "Participant limit reached");
            return Ok(false);
        }

        call.participants
            .push(CallParticipant::new(call_id, user_id, role));
        self.store_call(&call).await?;

        self.store
            .set_add(&format!("{USER_CALLS_PREFIX}{user_id}"), call_id)
            .await?;

        self.events
            .log_event(
                call_id,
                user_id,
                CallEventType::ParticipantJoined,
                BTreeMap::from([("role".to_string(), json!(role))]),
            )
            .await;

        info!(call_id, user_id, "Participant added");
        Ok(true)
    }

    /// Mark a participant as left and deindex the call for that user.
    ///
    /// When the last connected participant leaves, the call is ended
    /// automatically with the same audit trail as an explicit hangup.
    pub async fn remove_participant(&self, call_id: &str, user_id: &str) -> Result<bool> {
        let lock = self.lock_for(call_id);
        let _guard = lock.lock().await;

        let Some(mut call) = self.get_call(call_id).await? else {
            return Ok(false);
        };
        if call.participant(user_id).is_none() {
            return Ok(false);
        }

        let now = Utc::now();
        if let Some(participant) = call.participant_mut(user_id) {
            participant.status = ParticipantStatus::Left;
            participant.left_at = Some(now);
        }
        self.store_call(&call).await?;

        self.store
            .set_remove(&format!("{USER_CALLS_PREFIX}{user_id}"), call_id)
            .await?;

        self.events
            .log_event(call_id, user_id, CallEventType::ParticipantLeft, BTreeMap::new())
            .await;

        info!(call_id, user_id, "Participant removed");

        if call.connected_count() == 0 && !call.status.is_terminal() {
            self.apply_status(call_id, CallStatus::Ended).await?;
        }

        Ok(true)
    }

    /// Update a participant's membership status, stamping join/leave times.
    pub async fn update_participant_status(
        &self,
        call_id: &str,
        user_id: &str,
        status: ParticipantStatus,
    ) -> Result<bool> {
        let lock = self.lock_for(call_id);
        let _guard = lock.lock().await;

        let Some(mut call) = self.get_call(call_id).await? else {
            return Ok(false);
        };
        let Some(participant) = call.participant_mut(user_id) else {
            return Ok(false);
        };

        let old_status = participant.status;
        participant.status = status;
        match status {
            ParticipantStatus::Connected => participant.joined_at = Some(Utc::now()),
            ParticipantStatus::Left => participant.left_at = Some(Utc::now()),
            _ => {}
        }

        self.store_call(&call).await?;
        debug!(call_id, user_id, ?old_status, ?status, "Participant status updated");
        Ok(true)
    }

    /// Partial update of a participant's media toggles.
    ///
    /// Emits exactly one typed event per field whose value actually changed;
    /// unchanged or unspecified fields emit nothing.
    pub async fn update_participant_media(
        &self,
        call_id: &str,
        user_id: &str,
        is_muted: Option<bool>,
        is_video_enabled: Option<bool>,
        is_screen_sharing: Option<bool>,
    ) -> Result<bool> {
        let lock = self.lock_for(call_id);
        let _guard = lock.lock().await;

        let Some(mut call) = self.get_call(call_id).await? else {
            return Ok(false);
        };
        let Some(participant) = call.participant_mut(user_id) else {
            return Ok(false);
        };

        let mut changes: Vec<(CallEventType, &str, bool)> = Vec::new();

        if let Some(muted) = is_muted {
            if participant.is_muted != muted {
                participant.is_muted = muted;
                let event_type = if muted {
                    CallEventType::ParticipantMuted
                } else {
                    CallEventType::ParticipantUnmuted
                };
                changes.push((event_type, "muted", muted));
            }
        }
        if let Some(video) = is_video_enabled {
            if participant.is_video_enabled != video {
                participant.is_video_enabled = video;
                let event_type = if video {
                    CallEventType::VideoEnabled
                } else {
                    CallEventType::VideoDisabled
                };
                changes.push((event_type, "videoEnabled", video));
            }
        }
        if let Some(screen) = is_screen_sharing {
            if participant.is_screen_sharing != screen {
                participant.is_screen_sharing = screen;
                let event_type = if screen {
                    CallEventType::ScreenShareStarted
                } else {
                    CallEventType::ScreenShareStopped
                };
                changes.push((event_type, "screenSharing", screen));
            }
        }

        if changes.is_empty() {
            return Ok(true);
        }

        self.store_call(&call).await?;

        for (event_type, field, value) in &changes {
            self.events
                .log_event(
                    call_id,
                    user_id,
                    *event_type,
                    BTreeMap::from([((*field).to_string(), json!(value))]),
                )
                .await;
        }

        debug!(call_id, user_id, changed = changes.len(), "Participant media updated");
        Ok(true)
    }

    /// Force-end a call: every connected participant is marked as left, the
    /// call leaves the global active index and the duration is recorded.
    pub async fn end_call(&self, call_id: &str, ended_by_user_id: &str) -> Result<bool> {
        let lock = self.lock_for(call_id);
        let _guard = lock.lock().await;

        let Some(mut call) = self.get_call(call_id).await? else {
            return Ok(false);
        };
        if call.status.is_terminal() {
            debug!(call_id, status = ?call.status, "Ignoring hangup for terminal call");
            return Ok(false);
        }

        let now = Utc::now();
        call.status = CallStatus::Ended;
        call.ended_at = Some(now);
        for participant in call
            .participants
            .iter_mut()
            .filter(|p| p.status == ParticipantStatus::Connected)
        {
            participant.status = ParticipantStatus::Left;
            participant.left_at = Some(now);
        }

        self.store_call(&call).await?;
        self.store.set_remove(ACTIVE_CALLS_KEY, call_id).await?;
        self.locks.remove(call_id);

        let duration_seconds = call.duration().map(|d| d.num_seconds().max(0)).unwrap_or(0);
        self.events
            .log_event(
                call_id,
                ended_by_user_id,
                CallEventType::CallEnded,
                BTreeMap::from([
                    ("duration".to_string(), json!(duration_seconds)),
                    ("endedBy".to_string(), json!(ended_by_user_id)),
                ]),
            )
            .await;

        info!(call_id, ended_by = ended_by_user_id, "Call ended");
        Ok(true)
    }

    /// Calls a user participates in, newest first. The personal index is a
    /// hint; ids whose record has expired are skipped.
    pub async fn list_user_calls(&self, user_id: &str, limit: usize) -> Result<Vec<Call>> {
        let ids = self
            .store
            .set_members(&format!("{USER_CALLS_PREFIX}{user_id}"))
            .await?;

        let mut calls = Vec::new();
        for id in ids {
            if let Some(call) = self.get_call(&id).await? {
                calls.push(call);
            }
        }

        calls.sort_by_key(|c| std::cmp::Reverse(c.created_at));
        calls.truncate(limit);
        Ok(calls)
    }

    /// Calls that are currently active. Dangling index members and records
    /// whose status has drifted away from active are filtered out.
    pub async fn list_active_calls(&self) -> Result<Vec<Call>> {
        let ids = self.store.set_members(ACTIVE_CALLS_KEY).await?;

        let mut calls = Vec::new();
        for id in ids {
            if let Some(call) = self.get_call(&id).await? {
                if call.status == CallStatus::Active {
                    calls.push(call);
                }
            }
        }
        Ok(calls)
    }
}
