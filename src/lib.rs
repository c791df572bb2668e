#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::trivially_copy_pass_by_ref)]
#![allow(clippy::match_wildcard_for_single_variants)]
#![allow(clippy::cast_possible_truncation)]

//! # Phaseflow
//!
//! Phase-gated workflow client for client projects.
//!
//! A project moves through an ordered chain of phases (UI/UX design,
//! development, testing, completion). Phaseflow decides which phases may be
//! entered, evaluates each phase's completion criteria, and drives
//! transitions against the workflow API, applying a change locally only
//! after the backend confirms it.
//!
//! ## Features
//!
//! - **Linear gating**: a phase opens only when its predecessor is completed
//! - **Confirmed transitions**: no optimistic updates, no partial state
//! - **Single-flight**: one transition at a time, stale responses discarded
//! - **Pluggable relays**: console banners, tracing, webhooks
//!
//! ## Quick Start
//!
//! ```bash
//! # Show where a project stands
//! phaseflow status acme-site
//!
//! # Complete the active phase and move on
//! phaseflow advance acme-site
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
// Allow common patterns that are intentional in this codebase
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::significant_drop_tightening)]
#![allow(clippy::map_unwrap_or)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::redundant_closure_for_method_calls)]
#![allow(clippy::future_not_send)]

pub mod core;
pub mod integrations;
pub mod workflow;

// Re-export commonly used types
pub use core::{Config, ConfigError, FileSessionStore, SessionStore};
pub use integrations::{HttpPhaseGateway, NotificationRelay, Outcome, PhaseGateway};
pub use workflow::{
    PhaseChain, PhaseId, PhaseKind, WorkflowCoordinator, WorkflowError, WorkflowResult,
    WorkflowState,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "phaseflow";
