//! Persisted session record for one user's provisioned resources.
//!
//! A [`Session`] is the exclusive, externally-persisted source of truth for
//! what a user currently owns: at most one node identifier and one volume
//! identifier per role. The host stores it durably between calls and hands
//! it back unchanged; resumption after a crash reads nothing else. The
//! orchestrators record identifiers here the moment a resource is created,
//! before any waiting, so an interrupted attempt is resumed rather than
//! duplicated.

use std::collections::BTreeMap;
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

/// Logical purpose of a volume within a session.
///
/// Each role maps to a configured source snapshot and target device name;
/// roles are always processed in [`VolumeRole::ALL`] order. The ordering
/// matters only for log readability; attachment is order-independent
/// across roles.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VolumeRole {
    /// The user's home directory volume.
    Home,
    /// The shared environment (interpreter and packages) volume.
    Env,
}

impl VolumeRole {
    /// Every role, in the fixed processing order.
    pub const ALL: [Self; 2] = [Self::Home, Self::Env];

    /// Stable wire name for the role.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Home => "home",
            Self::Env => "env",
        }
    }
}

impl Display for VolumeRole {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Minimal persisted record of one user's provisioned resources.
///
/// Invariant: a populated node identifier does not imply populated volume
/// identifiers, and vice versa: either may independently survive a prior
/// partial attempt.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Session {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    node_id: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    volumes: BTreeMap<VolumeRole, String>,
}

impl Session {
    /// Creates an empty session, as at a user's first provisioning attempt.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            node_id: None,
            volumes: BTreeMap::new(),
        }
    }

    /// Returns the recorded node identifier, if any.
    #[must_use]
    pub fn node_id(&self) -> Option<&str> {
        self.node_id.as_deref()
    }

    /// Records the node identifier.
    pub fn set_node_id(&mut self, node_id: impl Into<String>) {
        self.node_id = Some(node_id.into());
    }

    /// Forgets the recorded node identifier.
    pub fn clear_node_id(&mut self) {
        self.node_id = None;
    }

    /// Returns the recorded volume identifier for a role, if any.
    #[must_use]
    pub fn volume(&self, role: VolumeRole) -> Option<&str> {
        self.volumes.get(&role).map(String::as_str)
    }

    /// Records the volume identifier for a role.
    pub fn set_volume(&mut self, role: VolumeRole, volume_id: impl Into<String>) {
        self.volumes.insert(role, volume_id.into());
    }

    /// Forgets the recorded volume identifier for a role.
    pub fn clear_volume(&mut self, role: VolumeRole) {
        self.volumes.remove(&role);
    }

    /// Returns whether the session references no resources at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.node_id.is_none() && self.volumes.is_empty()
    }

    /// Forgets every recorded resource identifier.
    pub fn clear(&mut self) {
        self.node_id = None;
        self.volumes.clear();
    }
}
