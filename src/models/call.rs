//! Call domain model: calls, participants, audit events and quality types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Media type of a call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CallType {
    Voice,
    Video,
}

/// Lifecycle state of a call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CallStatus {
    Initiated,
    Ringing,
    Active,
    Ended,
    Declined,
    Missed,
    Failed,
}

impl CallStatus {
    /// Terminal states are final; no transition is defined out of them.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CallStatus::Ended | CallStatus::Declined | CallStatus::Missed | CallStatus::Failed
        )
    }

    /// Legal-transition table consulted before every status write.
    ///
    /// Normal path: initiated -> ringing -> active -> ended. A ringing call
    /// may be declined or missed. Any non-terminal call may fail or be hung
    /// up (ended). Re-applying the current status is an idempotent no-op.
    pub fn can_transition_to(&self, next: CallStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        if *self == next {
            return true;
        }
        match (self, next) {
            (_, CallStatus::Failed) | (_, CallStatus::Ended) => true,
            (CallStatus::Initiated, CallStatus::Ringing) => true,
            (CallStatus::Initiated, CallStatus::Active) => true,
            (CallStatus::Ringing, CallStatus::Active) => true,
            (CallStatus::Ringing, CallStatus::Declined) => true,
            (CallStatus::Ringing, CallStatus::Missed) => true,
            _ => false,
        }
    }
}

/// Role of a participant within a call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ParticipantRole {
    Host,
    Participant,
}

/// Membership state of a participant within a call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ParticipantStatus {
    Invited,
    Connected,
    Left,
    Declined,
}

/// Default video resolution for a call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VideoQuality {
    Low,
    Medium,
    Hd,
    FullHd,
}

/// Default audio sample quality for a call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AudioQuality {
    Low,
    Medium,
    High,
}

/// Capacity and media defaults, immutable for the lifetime of a call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallSettings {
    pub max_participants: usize,
    pub allow_screen_sharing: bool,
    pub allow_participant_invite: bool,
    pub video_quality: VideoQuality,
    pub audio_quality: AudioQuality,
}

impl Default for CallSettings {
    fn default() -> Self {
        Self {
            max_participants: 8,
            allow_screen_sharing: true,
            allow_participant_invite: true,
            video_quality: VideoQuality::Hd,
            audio_quality: AudioQuality::High,
        }
    }
}

/// One user's membership in a call, unique by `user_id`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallParticipant {
    pub call_id: String,
    pub user_id: String,
    pub role: ParticipantRole,
    pub status: ParticipantStatus,
    pub is_muted: bool,
    pub is_video_enabled: bool,
    pub is_screen_sharing: bool,
    pub joined_at: Option<DateTime<Utc>>,
    pub left_at: Option<DateTime<Utc>>,
}

impl CallParticipant {
    pub fn new(call_id: &str, user_id: &str, role: ParticipantRole) -> Self {
        Self {
            call_id: call_id.to_string(),
            user_id: user_id.to_string(),
            role,
            status: ParticipantStatus::Invited,
            is_muted: false,
            is_video_enabled: true,
            is_screen_sharing: false,
            joined_at: None,
            left_at: None,
        }
    }
}

/// One real-time voice/video session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Call {
    pub id: String,
    pub caller_id: String,
    pub callee_id: String,
    pub call_type: CallType,
    pub status: CallStatus,
    pub conversation_id: Option<String>,
    pub room_id: String,
    pub participants: Vec<CallParticipant>,
    pub settings: CallSettings,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl Call {
    /// Wall-clock duration, available once the call has both started and ended
    pub fn duration(&self) -> Option<chrono::Duration> {
        match (self.started_at, self.ended_at) {
            (Some(started), Some(ended)) => Some(ended - started),
            _ => None,
        }
    }

    pub fn participant(&self, user_id: &str) -> Option<&CallParticipant> {
        self.participants.iter().find(|p| p.user_id == user_id)
    }

    pub fn participant_mut(&mut self, user_id: &str) -> Option<&mut CallParticipant> {
        self.participants.iter_mut().find(|p| p.user_id == user_id)
    }

    pub fn connected_count(&self) -> usize {
        self.participants
            .iter()
            .filter(|p| p.status == ParticipantStatus::Connected)
            .count()
    }
}

/// Kinds of audit events recorded against a call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CallEventType {
    CallStarted,
    CallEnded,
    CallDeclined,
    CallMissed,
    CallFailed,
    ParticipantJoined,
    ParticipantLeft,
    ParticipantMuted,
    ParticipantUnmuted,
    VideoEnabled,
    VideoDisabled,
    ScreenShareStarted,
    ScreenShareStopped,
    QualityChanged,
}

impl CallEventType {
    /// Every variant, used to zero-fill statistics tabulation
    pub const ALL: [CallEventType; 14] = [
        CallEventType::CallStarted,
        CallEventType::CallEnded,
        CallEventType::CallDeclined,
        CallEventType::CallMissed,
        CallEventType::CallFailed,
        CallEventType::ParticipantJoined,
        CallEventType::ParticipantLeft,
        CallEventType::ParticipantMuted,
        CallEventType::ParticipantUnmuted,
        CallEventType::VideoEnabled,
        CallEventType::VideoDisabled,
        CallEventType::ScreenShareStarted,
        CallEventType::ScreenShareStopped,
        CallEventType::QualityChanged,
    ];
}

/// An immutable audit record; appended, never mutated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallEvent {
    pub id: String,
    pub call_id: String,
    pub user_id: String,
    pub event_type: CallEventType,
    pub timestamp: DateTime<Utc>,
    pub data: BTreeMap<String, serde_json::Value>,
}

impl CallEvent {
    pub fn new(
        call_id: &str,
        user_id: &str,
        event_type: CallEventType,
        data: BTreeMap<String, serde_json::Value>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            call_id: call_id.to_string(),
            user_id: user_id.to_string(),
            event_type,
            timestamp: Utc::now(),
            data,
        }
    }
}

/// Raw connection telemetry reported by a client
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStats {
    pub latency_ms: f64,
    pub packet_loss_percent: f64,
    pub jitter_ms: f64,
    pub bitrate_kbps: f64,
}

/// Ordered quality bucket derived from raw network metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum QualityTier {
    Poor,
    Fair,
    Good,
    Excellent,
}

impl QualityTier {
    /// Ordinal mapping used for call-level averaging: poor=1 .. excellent=4
    pub fn ordinal(&self) -> u8 {
        match self {
            QualityTier::Poor => 1,
            QualityTier::Fair => 2,
            QualityTier::Good => 3,
            QualityTier::Excellent => 4,
        }
    }

    /// Inverse of `ordinal`, clamped to the valid range
    pub fn from_ordinal(ordinal: u8) -> Self {
        match ordinal {
            0 | 1 => QualityTier::Poor,
            2 => QualityTier::Fair,
            3 => QualityTier::Good,
            _ => QualityTier::Excellent,
        }
    }
}

/// Latest telemetry snapshot for one participant in one call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantQuality {
    pub latency_ms: f64,
    pub packet_loss_percent: f64,
    pub jitter_ms: f64,
    pub bitrate_kbps: f64,
    pub tier: QualityTier,
    pub last_updated: DateTime<Utc>,
}

/// Call-level quality aggregate, derived and never authoritative
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallQuality {
    pub average_latency_ms: f64,
    pub average_packet_loss: f64,
    pub average_jitter: f64,
    pub average_bitrate: f64,
    pub overall_tier: QualityTier,
    pub last_updated: DateTime<Utc>,
}

/// One relay/traversal endpoint a client can use to establish a peer connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceServerConfig {
    pub urls: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

impl IceServerConfig {
    pub fn stun(url: &str) -> Self {
        Self {
            urls: vec![url.to_string()],
            username: None,
            credential: None,
        }
    }
}

/// Full set of relay/traversal endpoints handed to a client
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalingConfig {
    pub ice_servers: Vec<IceServerConfig>,
}

/// Read/write view over a participant's media toggles
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaStreamInfo {
    pub user_id: String,
    pub has_audio: bool,
    pub has_video: bool,
    pub is_muted: bool,
    pub is_video_enabled: bool,
    pub is_screen_sharing: bool,
    pub video_quality: VideoQuality,
    pub audio_quality: AudioQuality,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states_are_final() {
        for terminal in [
            CallStatus::Ended,
            CallStatus::Declined,
            CallStatus::Missed,
            CallStatus::Failed,
        ] {
            assert!(terminal.is_terminal());
            assert!(!terminal.can_transition_to(CallStatus::Active));
            assert!(!terminal.can_transition_to(CallStatus::Ended));
            assert!(!terminal.can_transition_to(terminal));
        }
    }

    #[test]
    fn test_transition_table_normal_path() {
        assert!(CallStatus::Initiated.can_transition_to(CallStatus::Ringing));
        assert!(CallStatus::Ringing.can_transition_to(CallStatus::Active));
        assert!(CallStatus::Active.can_transition_to(CallStatus::Ended));
    }

    #[test]
    fn test_transition_table_rejects_backwards() {
        assert!(!CallStatus::Active.can_transition_to(CallStatus::Ringing));
        assert!(!CallStatus::Active.can_transition_to(CallStatus::Initiated));
        assert!(!CallStatus::Active.can_transition_to(CallStatus::Declined));
        assert!(!CallStatus::Initiated.can_transition_to(CallStatus::Declined));
    }

    #[test]
    fn test_non_terminal_may_fail_or_hang_up() {
        for status in [CallStatus::Initiated, CallStatus::Ringing, CallStatus::Active] {
            assert!(status.can_transition_to(CallStatus::Failed));
            assert!(status.can_transition_to(CallStatus::Ended));
        }
    }

    #[test]
    fn test_quality_tier_ordinal_round_trip() {
        for tier in [
            QualityTier::Poor,
            QualityTier::Fair,
            QualityTier::Good,
            QualityTier::Excellent,
        ] {
            assert_eq!(QualityTier::from_ordinal(tier.ordinal()), tier);
        }
        // Clamped at both ends
        assert_eq!(QualityTier::from_ordinal(0), QualityTier::Poor);
        assert_eq!(QualityTier::from_ordinal(9), QualityTier::Excellent);
    }

    #[test]
    fn test_call_serde_round_trip() {
        let mut call = Call {
            id: "c1".to_string(),
            caller_id: "alice".to_string(),
            callee_id: "bob".to_string(),
            call_type: CallType::Video,
            status: CallStatus::Ringing,
            conversation_id: Some("conv-9".to_string()),
            room_id: "room_ab12cd34".to_string(),
            participants: vec![CallParticipant::new("c1", "alice", ParticipantRole::Host)],
            settings: CallSettings::default(),
            created_at: Utc::now(),
            started_at: None,
            ended_at: None,
        };
        call.participants[0].status = ParticipantStatus::Connected;
        call.participants[0].joined_at = Some(Utc::now());

        let json = serde_json::to_string(&call).unwrap();
        let back: Call = serde_json::from_str(&json).unwrap();
        assert_eq!(back, call);
    }

    #[test]
    fn test_call_event_serde_round_trip() {
        let mut data = BTreeMap::new();
        data.insert("role".to_string(), serde_json::json!("host"));
        let event = CallEvent::new("c1", "alice", CallEventType::ParticipantJoined, data);

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("participant-joined"));

        let back: CallEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_duration_requires_both_timestamps() {
        let call = Call {
            id: "c1".to_string(),
            caller_id: "alice".to_string(),
            callee_id: "bob".to_string(),
            call_type: CallType::Voice,
            status: CallStatus::Missed,
            conversation_id: None,
            room_id: "room_00000000".to_string(),
            participants: Vec::new(),
            settings: CallSettings::default(),
            created_at: Utc::now(),
            started_at: None,
            ended_at: Some(Utc::now()),
        };
        assert!(call.duration().is_none());
    }
}
