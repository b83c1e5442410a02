//! Call-session orchestration core
//!
//! Tracks the lifecycle of voice/video calls, their participants, media
//! toggles and connection quality over an ephemeral TTL store, and records
//! every state transition as an immutable audit event. The actual media
//! transport, signaling push delivery and authentication are external
//! collaborators; this crate only owns the call state they act on.

pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod services;
pub mod store;

pub use config::CoreConfig;
pub use error::{CoreError, Result};
pub use models::{
    Call, CallEvent, CallEventType, CallParticipant, CallQuality, CallSettings, CallStatus,
    CallType, ConnectionStats, IceServerConfig, MediaStreamInfo, ParticipantQuality,
    ParticipantRole, ParticipantStatus, QualityTier, SignalingConfig,
};
pub use services::{
    CallEventService, CallService, QualityService, SignalingConfigService, StatusChange,
};
pub use store::{EphemeralStore, MemoryStore, StoreError};
