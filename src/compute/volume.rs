//! Volume endpoints of the compute API.

use serde::{Deserialize, Serialize};

use crate::provider::{VolumeAttachment, VolumeDescriptor, VolumeRequest};
use crate::state::VolumeState;

use super::{ComputeClient, ComputeError, HTTP_NOT_FOUND, api_error, is_success, parse_json};

#[derive(Serialize)]
struct CreateVolumeBody<'a> {
    name: &'a str,
    snapshot_id: &'a str,
    zone: &'a str,
}

#[derive(Serialize)]
struct AttachVolumeBody<'a> {
    node_id: &'a str,
    device: &'a str,
}

#[derive(Deserialize)]
struct VolumeEnvelope {
    volume: WireVolume,
}

#[derive(Deserialize)]
pub(in crate::compute) struct WireVolume {
    id: String,
    status: String,
    zone: String,
    #[serde(default)]
    attachment: Option<WireAttachment>,
}

#[derive(Deserialize)]
struct WireAttachment {
    node_id: String,
    device: String,
}

impl WireVolume {
    pub(in crate::compute) fn into_descriptor(self) -> Result<VolumeDescriptor, ComputeError> {
        let state = VolumeState::decode(&self.status).map_err(|source| {
            ComputeError::UnrecognisedState {
                resource_id: self.id.clone(),
                source,
            }
        })?;
        Ok(VolumeDescriptor {
            id: self.id,
            state,
            zone: self.zone,
            attachment: self.attachment.map(|wire| VolumeAttachment {
                node_id: wire.node_id,
                device: wire.device,
            }),
        })
    }
}

impl ComputeClient {
    /// Creates a volume from a snapshot in a zone.
    ///
    /// # Errors
    ///
    /// Returns [`ComputeError::Api`] when the provider rejects the request.
    pub(in crate::compute) async fn provision_volume(
        &self,
        request: &VolumeRequest,
    ) -> Result<VolumeDescriptor, ComputeError> {
        let body = CreateVolumeBody {
            name: &request.name,
            snapshot_id: &request.snapshot_id,
            zone: &request.zone,
        };
        let (status, bytes) = self.post_json("/v1/volumes", &body).await?;
        if !is_success(status) {
            return Err(api_error(status, &bytes));
        }
        let envelope: VolumeEnvelope = parse_json(&bytes)?;
        envelope.volume.into_descriptor()
    }

    /// Reads a volume's current descriptor; a missing volume is `None`.
    pub(in crate::compute) async fn fetch_volume(
        &self,
        volume_id: &str,
    ) -> Result<Option<VolumeDescriptor>, ComputeError> {
        let (status, bytes) = self.get_bytes(&format!("/v1/volumes/{volume_id}")).await?;
        if status == HTTP_NOT_FOUND {
            return Ok(None);
        }
        if !is_success(status) {
            return Err(api_error(status, &bytes));
        }
        let envelope: VolumeEnvelope = parse_json(&bytes)?;
        envelope.volume.into_descriptor().map(Some)
    }

    /// Attaches an available volume to a node at a device name.
    ///
    /// The provider rejects attachment unless the node is running and the
    /// volume is available; callers confirm both before calling.
    pub(in crate::compute) async fn attach_volume_to_node(
        &self,
        node_id: &str,
        volume_id: &str,
        device: &str,
    ) -> Result<(), ComputeError> {
        let (status, bytes) = self
            .post_json(
                &format!("/v1/volumes/{volume_id}/attach"),
                &AttachVolumeBody { node_id, device },
            )
            .await?;
        if is_success(status) {
            return Ok(());
        }
        Err(api_error(status, &bytes))
    }

    /// Detaches an in-use volume from its node.
    pub(in crate::compute) async fn detach_volume_from_node(
        &self,
        volume_id: &str,
    ) -> Result<(), ComputeError> {
        let (status, bytes) = self
            .post_empty(&format!("/v1/volumes/{volume_id}/detach"))
            .await?;
        if is_success(status) {
            return Ok(());
        }
        Err(api_error(status, &bytes))
    }

    /// Deletes a volume; a volume that is already gone counts as deleted.
    pub(in crate::compute) async fn destroy_volume(
        &self,
        volume_id: &str,
    ) -> Result<(), ComputeError> {
        let (status, bytes) = self.delete(&format!("/v1/volumes/{volume_id}")).await?;
        if is_success(status) || status == HTTP_NOT_FOUND {
            return Ok(());
        }
        Err(api_error(status, &bytes))
    }
}
