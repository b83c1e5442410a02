pub mod call;

pub use call::{
    Call, CallEvent, CallEventType, CallParticipant, CallQuality, CallSettings, CallStatus,
    CallType, ConnectionStats, IceServerConfig, MediaStreamInfo, ParticipantQuality,
    ParticipantRole, ParticipantStatus, QualityTier, SignalingConfig, VideoQuality,
};
pub use call::AudioQuality;
