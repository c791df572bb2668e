//! Workflow error types.
//!
//! Every variant has a stable code for programmatic handling.

use thiserror::Error;

use super::phase::PhaseId;

/// Result type for workflow operations.
pub type WorkflowResult<T> = Result<T, WorkflowError>;

/// Errors raised by the coordinator, the evaluator and the gateway boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowError {
    /// Workflow status could not be loaded.
    #[error("Failed to load workflow: {message}")]
    Load {
        /// Description of the failure (status code or transport error).
        message: String,
        /// Message returned by the backend, if any.
        server_message: Option<String>,
    },

    /// A phase transition could not be persisted.
    #[error("Phase transition failed: {message}")]
    Transition {
        /// Description of the failure (status code or transport error).
        message: String,
        /// Message returned by the backend, if any.
        server_message: Option<String>,
    },

    /// Navigation to a phase whose predecessor is not completed.
    #[error("Phase '{requested}' is locked; redirected to '{redirected_to}'")]
    AccessDenied { requested: PhaseId, redirected_to: PhaseId },

    /// Phase type with no completion criteria.
    #[error("Unknown phase type: {0}")]
    UnknownPhase(String),

    /// Phase id that is not part of the configured chain.
    #[error("Phase not found: {0}")]
    PhaseNotFound(String),

    /// Phase chain failed validation.
    #[error("Invalid phase chain: {0}")]
    InvalidChain(String),

    /// Checklist snapshot could not be parsed.
    #[error("Invalid phase snapshot: {0}")]
    InvalidSnapshot(String),

    /// Another transition for the project is still awaiting the backend.
    #[error("A transition is already in progress for project '{0}'")]
    TransitionInFlight(String),

    /// Response belongs to a superseded request.
    #[error("Discarded stale response (request #{received}, latest #{latest})")]
    StaleResponse { received: u64, latest: u64 },

    /// Coordinator was detached before the response arrived.
    #[error("Workflow view detached")]
    Detached,

    /// An operation ran before `initialize`.
    #[error("Workflow not initialized for project '{0}'")]
    NotInitialized(String),
}

impl WorkflowError {
    /// Create a load error without a backend message.
    pub fn load(message: impl Into<String>) -> Self {
        Self::Load { message: message.into(), server_message: None }
    }

    /// Create a transition error without a backend message.
    pub fn transition(message: impl Into<String>) -> Self {
        Self::Transition { message: message.into(), server_message: None }
    }

    /// Get the error code for this error type.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Load { .. } => "LOAD_ERROR",
            Self::Transition { .. } => "TRANSITION_ERROR",
            Self::AccessDenied { .. } => "ACCESS_DENIED",
            Self::UnknownPhase(_) => "UNKNOWN_PHASE",
            Self::PhaseNotFound(_) => "PHASE_NOT_FOUND",
            Self::InvalidChain(_) => "INVALID_PHASE_CHAIN",
            Self::InvalidSnapshot(_) => "INVALID_SNAPSHOT",
            Self::TransitionInFlight(_) => "TRANSITION_IN_FLIGHT",
            Self::StaleResponse { .. } => "STALE_RESPONSE",
            Self::Detached => "DETACHED",
            Self::NotInitialized(_) => "NOT_INITIALIZED",
        }
    }

    /// Message returned by the backend, if the error carries one.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            Self::Load { server_message, .. } | Self::Transition { server_message, .. } => {
                server_message.as_deref()
            }
            _ => None,
        }
    }

    /// Text shown to the user: the backend message verbatim, else `fallback`.
    pub fn user_message(&self, fallback: &str) -> String {
        self.server_message().map_or_else(|| fallback.to_string(), str::to_string)
    }

    /// Whether the user can retry the failed action by hand.
    pub const fn is_retriable(&self) -> bool {
        matches!(self, Self::Load { .. } | Self::Transition { .. } | Self::TransitionInFlight(_))
    }
}
