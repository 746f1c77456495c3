//! Provider abstraction for compute nodes and block-storage volumes.
//!
//! The orchestrators are written against this trait rather than a concrete
//! API client so the reconciliation logic can be exercised with scripted
//! doubles. The [`crate::compute`] module supplies the HTTP implementation.

use std::future::Future;
use std::net::IpAddr;
use std::pin::Pin;

use thiserror::Error;

use crate::state::{NodeState, VolumeState};

/// Current provider-side view of a compute node.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NodeDescriptor {
    /// Provider-assigned node identifier.
    pub id: String,
    /// Decoded lifecycle phase.
    pub state: NodeState,
    /// Availability zone the node was placed in.
    pub zone: String,
    /// Private network address, populated once the node has one.
    pub private_ip: Option<IpAddr>,
}

/// Attachment record reported for an in-use volume.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VolumeAttachment {
    /// Node the volume is attached to.
    pub node_id: String,
    /// Device name the volume is exposed under.
    pub device: String,
}

/// Current provider-side view of a block-storage volume.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VolumeDescriptor {
    /// Provider-assigned volume identifier.
    pub id: String,
    /// Decoded lifecycle phase.
    pub state: VolumeState,
    /// Availability zone the volume lives in.
    pub zone: String,
    /// Attachment details when the volume is in use.
    pub attachment: Option<VolumeAttachment>,
}

/// Parameters required to create a new compute node.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NodeRequest {
    /// Display name applied to the node for operator auditing.
    pub name: String,
    /// Opaque launch template identifier, passed through verbatim.
    pub template_id: String,
    /// Optional node size overriding the template's default.
    pub node_type: Option<String>,
    /// Target availability zone.
    pub zone: String,
    /// Rendered user-data payload consumed by the in-node bootstrap agent.
    pub user_data: String,
}

impl NodeRequest {
    /// Starts a builder for a [`NodeRequest`].
    #[must_use]
    pub fn builder() -> NodeRequestBuilder {
        NodeRequestBuilder::new()
    }

    /// Validates the request, returning a descriptive error when a required
    /// field is missing.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::Validation`] when a required string field is
    /// empty.
    pub fn validate(&self) -> Result<(), RequestError> {
        if self.name.is_empty() {
            return Err(RequestError::Validation("name".to_owned()));
        }
        if self.template_id.is_empty() {
            return Err(RequestError::Validation("template_id".to_owned()));
        }
        if self.zone.is_empty() {
            return Err(RequestError::Validation("zone".to_owned()));
        }
        Ok(())
    }
}

/// Builder for [`NodeRequest`] that defers trimming and validation to
/// construction.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct NodeRequestBuilder {
    name: String,
    template_id: String,
    node_type: Option<String>,
    zone: String,
    user_data: String,
}

impl NodeRequestBuilder {
    /// Creates an empty builder; fields must be populated before build.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the display name.
    #[must_use]
    pub fn name(mut self, value: impl Into<String>) -> Self {
        self.name = value.into();
        self
    }

    /// Sets the launch template identifier.
    #[must_use]
    pub fn template_id(mut self, value: impl Into<String>) -> Self {
        self.template_id = value.into();
        self
    }

    /// Sets the optional node size override.
    #[must_use]
    pub fn node_type(mut self, value: Option<String>) -> Self {
        self.node_type = value;
        self
    }

    /// Sets the availability zone.
    #[must_use]
    pub fn zone(mut self, value: impl Into<String>) -> Self {
        self.zone = value.into();
        self
    }

    /// Sets the user-data payload.
    #[must_use]
    pub fn user_data(mut self, value: impl Into<String>) -> Self {
        self.user_data = value.into();
        self
    }

    /// Builds and validates the [`NodeRequest`], trimming string inputs.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::Validation`] when a required field is empty.
    pub fn build(self) -> Result<NodeRequest, RequestError> {
        let request = NodeRequest {
            name: self.name.trim().to_owned(),
            template_id: self.template_id.trim().to_owned(),
            node_type: self
                .node_type
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty()),
            zone: self.zone.trim().to_owned(),
            user_data: self.user_data,
        };
        request.validate()?;
        Ok(request)
    }
}

/// Parameters required to create a volume from a snapshot.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VolumeRequest {
    /// Display name applied to the volume for operator auditing.
    pub name: String,
    /// Source snapshot the volume's contents are initialised from.
    pub snapshot_id: String,
    /// Target availability zone; must match the node the volume will serve.
    pub zone: String,
}

impl VolumeRequest {
    /// Creates a new volume request, trimming string fields.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        snapshot_id: impl Into<String>,
        zone: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into().trim().to_owned(),
            snapshot_id: snapshot_id.into().trim().to_owned(),
            zone: zone.into().trim().to_owned(),
        }
    }
}

/// Errors raised while assembling provider requests.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum RequestError {
    /// Raised when a request is missing a required field.
    #[error("missing or empty field: {0}")]
    Validation(String),
}

/// Future returned by provider operations.
pub type ProviderFuture<'a, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>;

/// Minimal interface implemented by cloud providers.
///
/// A resource that does not exist is reported as `None` from the describe
/// calls: a distinguished outcome the orchestrators use to decide whether
/// to re-provision, never folded into the error type.
pub trait Provider {
    /// Provider specific error type returned by every operation.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Creates a new node and returns its initial descriptor.
    fn create_node<'a>(
        &'a self,
        request: &'a NodeRequest,
    ) -> ProviderFuture<'a, NodeDescriptor, Self::Error>;

    /// Reads the current descriptor for a node, or `None` when it is gone.
    fn describe_node<'a>(
        &'a self,
        node_id: &'a str,
    ) -> ProviderFuture<'a, Option<NodeDescriptor>, Self::Error>;

    /// Requests a restart of a stopped node.
    fn start_node<'a>(&'a self, node_id: &'a str) -> ProviderFuture<'a, (), Self::Error>;

    /// Requests a power-off of a running node.
    fn stop_node<'a>(&'a self, node_id: &'a str) -> ProviderFuture<'a, (), Self::Error>;

    /// Requests termination of a node.
    fn terminate_node<'a>(&'a self, node_id: &'a str) -> ProviderFuture<'a, (), Self::Error>;

    /// Creates a new volume from a snapshot and returns its descriptor.
    fn create_volume<'a>(
        &'a self,
        request: &'a VolumeRequest,
    ) -> ProviderFuture<'a, VolumeDescriptor, Self::Error>;

    /// Reads the current descriptor for a volume, or `None` when it is gone.
    fn describe_volume<'a>(
        &'a self,
        volume_id: &'a str,
    ) -> ProviderFuture<'a, Option<VolumeDescriptor>, Self::Error>;

    /// Attaches an available volume to a running node at a device name.
    fn attach_volume<'a>(
        &'a self,
        node_id: &'a str,
        volume_id: &'a str,
        device: &'a str,
    ) -> ProviderFuture<'a, (), Self::Error>;

    /// Detaches an in-use volume from its node.
    fn detach_volume<'a>(&'a self, volume_id: &'a str) -> ProviderFuture<'a, (), Self::Error>;

    /// Deletes a volume; deleting an already-deleted volume succeeds.
    fn delete_volume<'a>(&'a self, volume_id: &'a str) -> ProviderFuture<'a, (), Self::Error>;
}
