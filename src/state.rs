//! Lifecycle state vocabularies for provider resources.
//!
//! The provider reports node phases as numeric status codes and volume
//! phases as status strings. Both are decoded into closed enums here so the
//! rest of the crate never branches on raw provider values. Decoding is a
//! total function over the provider's documented code set; anything else is
//! a contract change and surfaces as a fatal [`StateDecodeError`].

use std::fmt::{self, Debug, Display};

use thiserror::Error;

/// Common surface shared by the node and volume vocabularies.
///
/// The wait primitive uses [`can_reach`](Self::can_reach) to abandon a poll
/// loop as soon as the observed phase can no longer arrive at the target
/// phase without external intervention.
pub trait LifecycleState: Copy + Debug + Eq + Display {
    /// Returns whether a resource observed in `self` can still reach
    /// `target`.
    fn can_reach(self, target: Self) -> bool;
}

/// Phase of a compute node, decoded from the provider's numeric status code.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NodeState {
    /// The node is being launched or restarted.
    Pending,
    /// The node is up and billable.
    Running,
    /// The node is being terminated.
    ShuttingDown,
    /// The node is gone; this phase is terminal.
    Terminated,
    /// The node is powering off but may still be observed running.
    Stopping,
    /// The node is powered off and can be restarted in place.
    Stopped,
}

impl NodeState {
    /// Decodes a provider status code into a node phase.
    ///
    /// # Errors
    ///
    /// Returns [`StateDecodeError::UnrecognisedNodeCode`] for any code
    /// outside the provider's documented set. Callers must treat this as
    /// fatal rather than retrying: it signals a provider contract change,
    /// not a transient fault.
    pub const fn decode(code: u16) -> Result<Self, StateDecodeError> {
        match code {
            0 => Ok(Self::Pending),
            16 => Ok(Self::Running),
            32 => Ok(Self::ShuttingDown),
            48 => Ok(Self::Terminated),
            64 => Ok(Self::Stopping),
            80 => Ok(Self::Stopped),
            other => Err(StateDecodeError::UnrecognisedNodeCode { code: other }),
        }
    }

    const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::ShuttingDown => "shutting-down",
            Self::Terminated => "terminated",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
        }
    }
}

impl Display for NodeState {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl LifecycleState for NodeState {
    fn can_reach(self, target: Self) -> bool {
        if self == target {
            return true;
        }
        match self {
            Self::Terminated => false,
            Self::ShuttingDown => target == Self::Terminated,
            Self::Pending | Self::Running | Self::Stopping | Self::Stopped => true,
        }
    }
}

/// Phase of a block-storage volume, decoded from the provider's status
/// string.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum VolumeState {
    /// The volume is being materialised from its source snapshot.
    Creating,
    /// The volume is ready and unattached.
    Available,
    /// The volume is attached to a node.
    InUse,
    /// The volume is being deleted.
    Deleting,
    /// The volume is gone; this phase is terminal.
    Deleted,
    /// The provider gave up on the volume; this phase is terminal.
    Error,
}

impl VolumeState {
    /// Decodes a provider status string into a volume phase.
    ///
    /// # Errors
    ///
    /// Returns [`StateDecodeError::UnrecognisedVolumeStatus`] for any status
    /// outside the provider's documented set. Fatal, never retried.
    pub fn decode(status: &str) -> Result<Self, StateDecodeError> {
        match status {
            "creating" => Ok(Self::Creating),
            "available" => Ok(Self::Available),
            "in-use" => Ok(Self::InUse),
            "deleting" => Ok(Self::Deleting),
            "deleted" => Ok(Self::Deleted),
            "error" => Ok(Self::Error),
            other => Err(StateDecodeError::UnrecognisedVolumeStatus {
                status: other.to_owned(),
            }),
        }
    }

    const fn as_str(self) -> &'static str {
        match self {
            Self::Creating => "creating",
            Self::Available => "available",
            Self::InUse => "in-use",
            Self::Deleting => "deleting",
            Self::Deleted => "deleted",
            Self::Error => "error",
        }
    }
}

impl Display for VolumeState {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl LifecycleState for VolumeState {
    fn can_reach(self, target: Self) -> bool {
        if self == target {
            return true;
        }
        match self {
            Self::Error | Self::Deleted => false,
            Self::Deleting => target == Self::Deleted,
            Self::Creating | Self::Available | Self::InUse => true,
        }
    }
}

/// Errors raised while decoding provider status values.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum StateDecodeError {
    /// Raised when a node status code is outside the documented set.
    #[error("unrecognised node state code {code}")]
    UnrecognisedNodeCode {
        /// Code reported by the provider.
        code: u16,
    },
    /// Raised when a volume status string is outside the documented set.
    #[error("unrecognised volume status `{status}`")]
    UnrecognisedVolumeStatus {
        /// Status reported by the provider.
        status: String,
    },
}
