//! Session memory: the last phase viewed per project.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::workflow::PhaseId;

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Error types for the session store.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Session I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid session file {}: {message}", path.display())]
    InvalidJson { path: PathBuf, message: String },
}

/// Key-value store for the last phase viewed per project.
pub trait SessionStore: Send + Sync {
    /// Remembered phase for a project.
    fn load(&self, project_id: &str) -> SessionResult<Option<PhaseId>>;

    /// Remember a phase for a project.
    fn save(&self, project_id: &str, phase: &PhaseId) -> SessionResult<()>;

    /// Forget a project.
    fn clear(&self, project_id: &str) -> SessionResult<()>;
}

/// One remembered phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionEntry {
    /// Phase last viewed
    pub phase: PhaseId,

    /// When it was saved
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SessionFile {
    #[serde(default)]
    projects: BTreeMap<String, SessionEntry>,
}

/// Session store backed by a JSON file.
///
/// Writes go to a temp file that is then renamed over the original.
#[derive(Debug)]
pub struct FileSessionStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileSessionStore {
    /// Create a store at `path`. The file is created on first save.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), lock: Mutex::new(()) }
    }

    /// Path of the session file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> SessionResult<SessionFile> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(SessionFile::default()),
            Err(e) => return Err(e.into()),
        };

        serde_json::from_str(&content).map_err(|e| SessionError::InvalidJson {
            path: self.path.clone(),
            message: e.to_string(),
        })
    }

    fn write(&self, file: &SessionFile) -> SessionResult<()> {
        let content = serde_json::to_string_pretty(file).map_err(|e| SessionError::InvalidJson {
            path: self.path.clone(),
            message: e.to_string(),
        })?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let temp_path = self.path.with_extension("json.tmp");
        let mut temp = fs::File::create(&temp_path)?;
        temp.write_all(content.as_bytes())?;
        temp.write_all(b"\n")?;
        temp.sync_all()?;
        drop(temp);

        fs::rename(&temp_path, &self.path)?;
        Ok(())
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self, project_id: &str) -> SessionResult<Option<PhaseId>> {
        let _lock = self.lock.lock();
        Ok(self.read()?.projects.remove(project_id).map(|e| e.phase))
    }

    fn save(&self, project_id: &str, phase: &PhaseId) -> SessionResult<()> {
        let _lock = self.lock.lock();
        let mut file = self.read()?;
        file.projects.insert(
            project_id.to_string(),
            SessionEntry { phase: phase.clone(), updated_at: Utc::now() },
        );
        self.write(&file)?;
        tracing::debug!(project = project_id, phase = %phase, "Session saved");
        Ok(())
    }

    fn clear(&self, project_id: &str) -> SessionResult<()> {
        let _lock = self.lock.lock();
        let mut file = self.read()?;
        if file.projects.remove(project_id).is_some() {
            self.write(&file)?;
        }
        Ok(())
    }
}

/// In-memory session store.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    phases: Mutex<BTreeMap<String, PhaseId>>,
}

impl MemorySessionStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self, project_id: &str) -> SessionResult<Option<PhaseId>> {
        Ok(self.phases.lock().get(project_id).cloned())
    }

    fn save(&self, project_id: &str, phase: &PhaseId) -> SessionResult<()> {
        self.phases.lock().insert(project_id.to_string(), phase.clone());
        Ok(())
    }

    fn clear(&self, project_id: &str) -> SessionResult<()> {
        self.phases.lock().remove(project_id);
        Ok(())
    }
}
