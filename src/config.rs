//! Configuration loading via `ortho-config`.

use std::ffi::OsString;
use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::bootstrap::BootstrapPayload;
use crate::session::VolumeRole;
use crate::spawner::{ProvisionRequest, RoleSpec};
use crate::wait::WaitParams;

/// Spawner configuration derived from defaults, `skiff.toml`, environment
/// variables, and CLI flags, in that order of precedence.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "SKIFF",
    discovery(
        app_name = "skiff",
        env_var = "SKIFF_CONFIG_PATH",
        config_file_name = "skiff.toml",
        dotfile_name = ".skiff.toml",
        project_file_name = "skiff.toml"
    )
)]
pub struct SpawnerConfig {
    /// Base URL of the compute API. This value is required.
    pub api_base_url: String,
    /// Token used to authenticate compute API calls. This value is
    /// required.
    pub api_token: String,
    /// Launch template new nodes are created from; opaque to the spawner.
    /// This value is required.
    pub template_id: String,
    /// Optional node size overriding the template's default.
    pub node_type: Option<String>,
    /// Availability zone new resources are placed in.
    #[ortho_config(default = "us-east-1a".to_owned())]
    pub zone: String,
    /// Port the in-node workload serves on.
    #[ortho_config(default = 8888)]
    pub service_port: u16,
    /// Snapshot the home volume is initialised from. This value is
    /// required.
    pub home_snapshot_id: String,
    /// Device name the home volume is attached under; the in-node agent
    /// mounts this device at the user's home directory.
    #[ortho_config(default = "/dev/sdf".to_owned())]
    pub home_device: String,
    /// Snapshot the environment volume is initialised from. This value is
    /// required.
    pub env_snapshot_id: String,
    /// Device name the environment volume is attached under.
    #[ortho_config(default = "/dev/sdg".to_owned())]
    pub env_device: String,
    /// Seconds between provider state refreshes while waiting.
    #[ortho_config(default = 15)]
    pub poll_interval_secs: u64,
    /// Seconds before an individual wait gives up.
    #[ortho_config(default = 1200)]
    pub wait_timeout_secs: u64,
    /// Path the CLI persists session state at between invocations.
    #[ortho_config(default = "skiff-session.json".to_owned())]
    pub session_file: String,
}

/// Metadata for a configuration field, used to generate actionable error
/// messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
}

impl FieldMetadata {
    const fn new(
        description: &'static str,
        env_var: &'static str,
        toml_key: &'static str,
    ) -> Self {
        Self {
            description,
            env_var,
            toml_key,
        }
    }
}

impl SpawnerConfig {
    fn require_field(value: &str, metadata: &FieldMetadata) -> Result<(), ConfigError> {
        if value.trim().is_empty() {
            return Err(ConfigError::MissingField(format!(
                "missing {}: set {} or add {} to skiff.toml",
                metadata.description, metadata.env_var, metadata.toml_key
            )));
        }
        Ok(())
    }

    /// Loads configuration using the `ortho-config` derive, merging
    /// defaults, configuration files, environment variables, and CLI flags.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the loader fails to merge
    /// sources.
    pub fn load_from_sources() -> Result<Self, ConfigError> {
        Self::load().map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Loads configuration without attempting to parse CLI arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([OsString::from("skiff")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Performs semantic validation on required fields. Error messages
    /// include guidance on how to provide missing values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a required field is empty
    /// and [`ConfigError::InvalidValue`] when a numeric field is out of
    /// range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Self::require_field(
            &self.api_base_url,
            &FieldMetadata::new("compute API base URL", "SKIFF_API_BASE_URL", "api_base_url"),
        )?;
        Self::require_field(
            &self.api_token,
            &FieldMetadata::new("compute API token", "SKIFF_API_TOKEN", "api_token"),
        )?;
        Self::require_field(
            &self.template_id,
            &FieldMetadata::new("launch template ID", "SKIFF_TEMPLATE_ID", "template_id"),
        )?;
        Self::require_field(
            &self.zone,
            &FieldMetadata::new("availability zone", "SKIFF_ZONE", "zone"),
        )?;
        Self::require_field(
            &self.home_snapshot_id,
            &FieldMetadata::new(
                "home volume snapshot ID",
                "SKIFF_HOME_SNAPSHOT_ID",
                "home_snapshot_id",
            ),
        )?;
        Self::require_field(
            &self.home_device,
            &FieldMetadata::new("home volume device", "SKIFF_HOME_DEVICE", "home_device"),
        )?;
        Self::require_field(
            &self.env_snapshot_id,
            &FieldMetadata::new(
                "environment volume snapshot ID",
                "SKIFF_ENV_SNAPSHOT_ID",
                "env_snapshot_id",
            ),
        )?;
        Self::require_field(
            &self.env_device,
            &FieldMetadata::new(
                "environment volume device",
                "SKIFF_ENV_DEVICE",
                "env_device",
            ),
        )?;
        if self.service_port == 0 {
            return Err(ConfigError::InvalidValue(String::from(
                "service_port must be non-zero",
            )));
        }
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::InvalidValue(String::from(
                "poll_interval_secs must be non-zero",
            )));
        }
        if self.wait_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(String::from(
                "wait_timeout_secs must be non-zero",
            )));
        }
        Ok(())
    }

    /// Returns the configured role specifications in processing order.
    #[must_use]
    pub fn role_specs(&self) -> Vec<RoleSpec> {
        vec![
            RoleSpec {
                role: VolumeRole::Home,
                snapshot_id: self.home_snapshot_id.clone(),
                device: self.home_device.clone(),
            },
            RoleSpec {
                role: VolumeRole::Env,
                snapshot_id: self.env_snapshot_id.clone(),
                device: self.env_device.clone(),
            },
        ]
    }

    /// Returns the polling cadence and deadline for waits.
    #[must_use]
    pub const fn wait_params(&self) -> WaitParams {
        WaitParams {
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            wait_timeout: Duration::from_secs(self.wait_timeout_secs),
        }
    }

    /// Builds a [`ProvisionRequest`] for one user from the configured
    /// defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when validation fails.
    pub fn as_provision_request(
        &self,
        payload: BootstrapPayload,
    ) -> Result<ProvisionRequest, ConfigError> {
        self.validate()?;
        Ok(ProvisionRequest {
            template_id: self.template_id.clone(),
            node_type: self.node_type.clone(),
            zone: self.zone.clone(),
            payload,
            roles: self.role_specs(),
        })
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Indicates a configuration field holds an out-of-range value.
    #[error("invalid configuration value: {0}")]
    InvalidValue(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}
