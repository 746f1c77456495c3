//! Host-side persistence of session state.
//!
//! The orchestrator treats the [`Session`] as externally persisted; this
//! store is the CLI host adapter's implementation of that boundary. State
//! lives in a single pretty-printed JSON file so operators can inspect and,
//! in an emergency, edit it. A missing file reads as an empty session; an
//! unreadable or unparsable file is an error rather than silently treated
//! as empty, because "empty" would make the next provision leak the
//! resources the file referenced.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::session::Session;

/// Errors raised while reading or writing the session file.
#[derive(Debug, Error)]
pub enum SessionStoreError {
    /// Raised when file system operations fail.
    #[error("failed to access {path}: {message}")]
    Io {
        /// Path that could not be accessed.
        path: PathBuf,
        /// Human-readable error message.
        message: String,
    },
    /// Raised when existing session content cannot be parsed.
    #[error("failed to parse {path}: {message}")]
    Parse {
        /// Path that could not be parsed.
        path: PathBuf,
        /// Parser error message.
        message: String,
    },
}

/// Reads and writes a session as JSON at a fixed path.
#[derive(Clone, Debug)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    /// Creates a store backed by the given path.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the path the store persists to.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the persisted session; a missing file is an empty session.
    ///
    /// # Errors
    ///
    /// Returns [`SessionStoreError::Io`] when the file exists but cannot be
    /// read and [`SessionStoreError::Parse`] when its content is not a
    /// valid session document.
    pub fn load(&self) -> Result<Session, SessionStoreError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Session::new()),
            Err(err) => {
                return Err(SessionStoreError::Io {
                    path: self.path.clone(),
                    message: err.to_string(),
                });
            }
        };
        serde_json::from_str(&content).map_err(|err| SessionStoreError::Parse {
            path: self.path.clone(),
            message: err.to_string(),
        })
    }

    /// Persists the session, replacing any previous content.
    ///
    /// # Errors
    ///
    /// Returns [`SessionStoreError::Io`] when the file cannot be written.
    pub fn save(&self, session: &Session) -> Result<(), SessionStoreError> {
        let rendered =
            serde_json::to_string_pretty(session).map_err(|err| SessionStoreError::Io {
                path: self.path.clone(),
                message: err.to_string(),
            })?;
        fs::write(&self.path, rendered).map_err(|err| SessionStoreError::Io {
            path: self.path.clone(),
            message: err.to_string(),
        })
    }
}
