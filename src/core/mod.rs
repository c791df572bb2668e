//! Application plumbing: configuration and session memory.

mod config;
mod session;

pub use config::{
    ApiConfig, Config, ConfigError, ConfigResult, NotificationsConfig, SessionConfig,
    WorkflowConfig, API_URL_ENV, LOCAL_CONFIG_FILE,
};
pub use session::{
    FileSessionStore, MemorySessionStore, SessionEntry, SessionError, SessionResult, SessionStore,
};
