//! Error types for the provisioning and teardown orchestrators.

use thiserror::Error;

use crate::bootstrap::BootstrapError;
use crate::provider::RequestError;
use crate::session::VolumeRole;
use crate::state::LifecycleState;
use crate::wait::WaitError;

/// Errors surfaced while provisioning a session.
///
/// Any of these aborts the whole `provision` call. Resources created before
/// the failure stay referenced by the session, so a retry resumes where the
/// failed call left off instead of duplicating them.
#[derive(Debug, Error)]
pub enum SpawnError<E>
where
    E: std::error::Error + 'static,
{
    /// Wrapper for provider failures outside a wait.
    #[error("provider error: {0}")]
    Provider(#[source] E),
    /// Raised when the bootstrap payload cannot be rendered.
    #[error(transparent)]
    Bootstrap(#[from] BootstrapError),
    /// Raised when the assembled node request is invalid.
    #[error("invalid node request: {0}")]
    Request(#[from] RequestError),
    /// Raised when a wait deadline expires. Retryable: a fresh `provision`
    /// call picks up from the persisted session.
    #[error("timed out waiting for {resource_id} to reach {target}; last observed state {observed}")]
    Timeout {
        /// Resource that was being waited on.
        resource_id: String,
        /// State that was being waited for.
        target: String,
        /// State seen on the final refresh before the deadline.
        observed: String,
    },
    /// Raised when a resource enters a phase incompatible with its target.
    #[error("{resource_id} entered state {observed}, which can no longer reach {target}")]
    UnexpectedState {
        /// Resource that regressed.
        resource_id: String,
        /// State that was being waited for.
        target: String,
        /// Incompatible state the resource was observed in.
        observed: String,
    },
    /// Raised when a resource disappears while being waited on.
    #[error("{resource_id} disappeared while waiting to reach {target}")]
    Vanished {
        /// Resource that disappeared.
        resource_id: String,
        /// State that was being waited for.
        target: String,
    },
    /// Raised when a recorded volume is attached somewhere other than the
    /// session's node and configured device. Split ownership requires
    /// operator intervention and is never auto-resolved.
    #[error(
        "volume {volume_id} for role {role} is attached to node {observed_node} \
         at {observed_device}, expected node {expected_node} at {expected_device}"
    )]
    VolumeConflict {
        /// Role the volume is recorded under.
        role: VolumeRole,
        /// Conflicting volume.
        volume_id: String,
        /// Node the session expected the volume on.
        expected_node: String,
        /// Device the role is configured to use.
        expected_device: String,
        /// Node the provider reports the volume on.
        observed_node: String,
        /// Device the provider reports the volume under.
        observed_device: String,
    },
    /// Raised when a recovered volume sits in a different zone than the
    /// node. Cross-zone attachment is unsupported; there is deliberately no
    /// snapshot-and-recreate recovery path.
    #[error(
        "volume {volume_id} for role {role} lives in zone {volume_zone}, \
         but node {node_id} is in zone {node_zone}"
    )]
    ZoneMismatch {
        /// Role the volume is recorded under.
        role: VolumeRole,
        /// Misplaced volume.
        volume_id: String,
        /// Zone the volume lives in.
        volume_zone: String,
        /// Node the volume should serve.
        node_id: String,
        /// Zone the node was placed in.
        node_zone: String,
    },
    /// Raised when a running node exposes no private address.
    #[error("node {node_id} is running but has no private address")]
    MissingAddress {
        /// Node without an address.
        node_id: String,
    },
    /// Raised when the caller's cancellation signal fires. Session
    /// mutations already applied remain valid for resumption.
    #[error("provisioning cancelled by caller")]
    Cancelled,
}

impl<E> SpawnError<E>
where
    E: std::error::Error + 'static,
{
    pub(in crate::spawner) fn from_wait<S: LifecycleState>(
        resource_id: &str,
        err: WaitError<S, E>,
    ) -> Self {
        match err {
            WaitError::Timeout { target, observed } => Self::Timeout {
                resource_id: resource_id.to_owned(),
                target: target.to_string(),
                observed: observed.to_string(),
            },
            WaitError::Unreachable { target, observed } => Self::UnexpectedState {
                resource_id: resource_id.to_owned(),
                target: target.to_string(),
                observed: observed.to_string(),
            },
            WaitError::Gone { target } => Self::Vanished {
                resource_id: resource_id.to_owned(),
                target: target.to_string(),
            },
            WaitError::Cancelled => Self::Cancelled,
            WaitError::Provider(source) => Self::Provider(source),
        }
    }
}

/// One resource teardown could not finish with.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TeardownFailure {
    /// Human-readable resource description (kind and identifier).
    pub resource: String,
    /// Why the resource could not be torn down.
    pub message: String,
}

fn summarise(failures: &[TeardownFailure]) -> String {
    let rendered: Vec<String> = failures
        .iter()
        .map(|failure| format!("{}: {}", failure.resource, failure.message))
        .collect();
    rendered.join("; ")
}

/// Errors surfaced while tearing a session down.
///
/// Individual resource failures never abort the sweep; they are collected
/// and reported together once every resource has been visited. Provider
/// errors are carried as rendered messages so failures from different
/// resources aggregate into one report.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum TeardownError {
    /// Raised when the caller's cancellation signal fires mid-teardown.
    /// Entries not yet processed stay in the session for the next attempt.
    #[error("teardown cancelled by caller")]
    Cancelled,
    /// Raised when one or more resources could not be torn down. The
    /// session entries for them have already been cleared; the listed
    /// identifiers are what an operator must sweep by hand.
    #[error("teardown incomplete: {}", summarise(.failures))]
    Incomplete {
        /// Every resource the sweep failed on.
        failures: Vec<TeardownFailure>,
    },
}
