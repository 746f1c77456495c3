//! Bootstrap payload delivered to the node through instance metadata.
//!
//! The in-node bootstrap agent reads this JSON object once at boot, mounts
//! the attached volumes, creates the OS user, and execs the user's process
//! with the supplied environment. The payload travels over the provider's
//! user-data channel verbatim; this module only owns its shape.

use std::collections::BTreeMap;

use serde::Serialize;
use thiserror::Error;

/// Environment and identity handed to the in-node bootstrap agent.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct BootstrapPayload {
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    env: BTreeMap<String, String>,
    username: String,
}

impl BootstrapPayload {
    /// Creates a payload for the given OS username.
    ///
    /// # Errors
    ///
    /// Returns [`BootstrapError::BlankUsername`] when the username is empty
    /// or whitespace; the bootstrap agent would otherwise create a nameless
    /// user.
    pub fn new(username: impl Into<String>) -> Result<Self, BootstrapError> {
        let trimmed = username.into().trim().to_owned();
        if trimmed.is_empty() {
            return Err(BootstrapError::BlankUsername);
        }
        Ok(Self {
            env: BTreeMap::new(),
            username: trimmed,
        })
    }

    /// Adds one environment variable to the payload.
    #[must_use]
    pub fn env_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Replaces the payload's environment wholesale.
    #[must_use]
    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }

    /// Returns the username the agent will run the workload as.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Renders the payload as the user-data JSON document.
    ///
    /// The environment map is ordered, so renderings are deterministic for a
    /// given payload.
    ///
    /// # Errors
    ///
    /// Returns [`BootstrapError::Render`] when serialisation fails.
    pub fn to_user_data(&self) -> Result<String, BootstrapError> {
        serde_json::to_string(self).map_err(|err| BootstrapError::Render {
            message: err.to_string(),
        })
    }
}

/// Errors raised while assembling the bootstrap payload.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum BootstrapError {
    /// Raised when the username is empty or whitespace.
    #[error("bootstrap username must not be blank")]
    BlankUsername,
    /// Raised when the payload cannot be serialised.
    #[error("failed to render bootstrap payload: {message}")]
    Render {
        /// Serialiser error message.
        message: String,
    },
}
