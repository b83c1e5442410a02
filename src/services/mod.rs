pub mod call_service;
pub mod event_service;
pub mod quality_service;
pub mod signaling_service;

pub use call_service::{CallService, StatusChange};
pub use event_service::CallEventService;
pub use quality_service::QualityService;
pub use signaling_service::{validate_config, SignalingConfigService};
