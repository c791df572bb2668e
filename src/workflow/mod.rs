//! Phase workflow for client projects.
//!
//! A project moves through a fixed chain of phases: UI/UX design,
//! development, testing and completion. A phase can be entered only once its
//! predecessor is completed, and completion is never revoked.
//!
//! ## Components
//!
//! - `PhaseChain` - Ordered, validated list of phases
//! - `WorkflowState` - Active phase and completion flags for one project
//! - `evaluator` - Per-phase completion criteria
//! - `WorkflowCoordinator` - Applies transitions after the backend confirms them

mod coordinator;
mod error;
pub mod evaluator;
mod phase;
mod state;

#[cfg(test)]
mod property_tests;

pub use coordinator::{
    CoordinatorOptions, PhaseView, WorkflowCoordinator, DEFAULT_FALLBACK_MESSAGE,
};
pub use error::{WorkflowError, WorkflowResult};
pub use evaluator::{
    evaluate, evaluate_json, is_ready, unmet_criteria, ChecklistItem, CompletionChecklist,
    Deliverable, DeliverableStatus, DevelopmentSnapshot, PhaseSnapshot, TestingReadiness,
    UiUxSnapshot,
};
pub use phase::{default_definitions, Phase, PhaseChain, PhaseDefinition, PhaseId, PhaseKind};
pub use state::{CompletionMap, TransitionDirection, TransitionRequest, WorkflowState};
