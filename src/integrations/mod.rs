//! External integrations module.
//!
//! The workflow API gateway and the relays that surface workflow outcomes.

pub mod gateway;
pub mod http;
pub mod notifications;

pub use gateway::{PhaseDetails, PhaseGateway, WorkflowStatus};
pub use http::HttpPhaseGateway;
pub use notifications::{
    ConsoleRelay, FanoutRelay, MemoryRelay, NotificationRelay, Outcome, OutcomeKind,
    TracingRelay, WebhookRelay,
};
