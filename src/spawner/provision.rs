//! The provisioning reconciliation loop.
//!
//! Every step is written to be re-entered: identifiers are recorded into
//! the session before any waiting, recorded resources are re-validated
//! rather than trusted, and resources observed in terminal phases are
//! cleared and replaced. Two back-to-back calls with the same session
//! converge on the same node and volumes.

use tracing::{info, warn};
use uuid::Uuid;

use crate::provider::{NodeDescriptor, NodeRequest, Provider, VolumeRequest};
use crate::session::Session;
use crate::state::{NodeState, VolumeState};
use crate::wait::CancelSignal;

use super::error::SpawnError;
use super::{Endpoint, ProvisionRequest, RoleSpec, Spawner};

/// How a recorded or created volume left the resolution step.
enum VolumeResolution {
    /// Already attached to the session's node at the configured device.
    Attached,
    /// Exists (or was just created) but still needs readiness and
    /// attachment.
    Pending {
        /// Identifier of the volume to await and attach.
        volume_id: String,
    },
}

impl<P> Spawner<P>
where
    P: Provider,
{
    /// Converges the session onto one running node with every requested
    /// volume attached, and returns the node's service endpoint.
    ///
    /// Reentrant and idempotent: calling it again with the same session,
    /// including after a crash mid-call, reuses whatever already exists
    /// and never duplicates resources. On failure the session keeps every
    /// identifier recorded so far; there is no automatic rollback, and
    /// teardown remains the caller's explicit responsibility.
    ///
    /// # Errors
    ///
    /// Returns [`SpawnError`] when a provider call fails, a wait times out
    /// or observes an unreachable state, a recorded volume conflicts with
    /// the session's node, a recovered volume sits in the wrong zone, or
    /// the caller cancels.
    pub async fn provision(
        &self,
        session: &mut Session,
        request: &ProvisionRequest,
        cancel: &CancelSignal,
    ) -> Result<Endpoint, SpawnError<P::Error>> {
        let node = self.resolve_node(session, request, cancel).await?;

        let mut pending: Vec<(&RoleSpec, String)> = Vec::new();
        for spec in &request.roles {
            match self.resolve_volume(session, spec, &node).await? {
                VolumeResolution::Attached => {}
                VolumeResolution::Pending { volume_id } => pending.push((spec, volume_id)),
            }
        }

        // Readiness barrier: attachment is rejected by the provider unless
        // the node is running and the volume is available, so both facts
        // are confirmed individually before any attach call.
        let running = self.await_node(&node.id, NodeState::Running, cancel).await?;
        for (_, volume_id) in &pending {
            self.await_volume(volume_id, VolumeState::Available, cancel)
                .await?;
        }
        for (spec, volume_id) in &pending {
            self.provider
                .attach_volume(&running.id, volume_id, &spec.device)
                .await
                .map_err(SpawnError::Provider)?;
            info!(
                node_id = %running.id,
                volume_id,
                role = %spec.role,
                device = %spec.device,
                "attached volume"
            );
        }

        let address = running.private_ip.ok_or_else(|| SpawnError::MissingAddress {
            node_id: running.id.clone(),
        })?;
        Ok(Endpoint {
            address,
            port: self.service_port,
        })
    }

    /// Reuses, restarts, or replaces the session's node.
    async fn resolve_node(
        &self,
        session: &mut Session,
        request: &ProvisionRequest,
        cancel: &CancelSignal,
    ) -> Result<NodeDescriptor, SpawnError<P::Error>> {
        if let Some(node_id) = session.node_id().map(str::to_owned) {
            match self.provider.describe_node(&node_id).await {
                Ok(Some(node)) => match node.state {
                    NodeState::Pending | NodeState::Running => {
                        info!(node_id, state = %node.state, "reusing recorded node");
                        return Ok(node);
                    }
                    NodeState::Stopping | NodeState::Stopped => {
                        info!(node_id, state = %node.state, "restarting recorded node");
                        return self.restart_node(&node_id, cancel).await;
                    }
                    NodeState::ShuttingDown | NodeState::Terminated => {
                        info!(node_id, state = %node.state, "recorded node is gone; replacing");
                        session.clear_node_id();
                    }
                },
                Ok(None) => {
                    info!(node_id, "recorded node no longer exists; replacing");
                    session.clear_node_id();
                }
                Err(err) => {
                    warn!(node_id, error = %err, "recorded node unreadable; replacing");
                    session.clear_node_id();
                }
            }
        }
        self.create_node(session, request).await
    }

    /// Awaits a clean stop, then issues a restart in place.
    async fn restart_node(
        &self,
        node_id: &str,
        cancel: &CancelSignal,
    ) -> Result<NodeDescriptor, SpawnError<P::Error>> {
        let stopped = self.await_node(node_id, NodeState::Stopped, cancel).await?;
        self.provider
            .start_node(node_id)
            .await
            .map_err(SpawnError::Provider)?;
        Ok(stopped)
    }

    async fn create_node(
        &self,
        session: &mut Session,
        request: &ProvisionRequest,
    ) -> Result<NodeDescriptor, SpawnError<P::Error>> {
        let user_data = request.payload.to_user_data()?;
        let node_request = NodeRequest::builder()
            .name(format!("skiff-node-{}", Uuid::new_v4().simple()))
            .template_id(&request.template_id)
            .node_type(request.node_type.clone())
            .zone(&request.zone)
            .user_data(user_data)
            .build()?;

        let node = self
            .provider
            .create_node(&node_request)
            .await
            .map_err(SpawnError::Provider)?;
        // Recorded before any wait: a crash between here and readiness
        // resumes from the session instead of leaking an orphan node.
        session.set_node_id(&node.id);
        info!(node_id = %node.id, zone = %node.zone, "created node");
        Ok(node)
    }

    /// Validates a recorded volume or falls through to creating one.
    async fn resolve_volume(
        &self,
        session: &mut Session,
        spec: &RoleSpec,
        node: &NodeDescriptor,
    ) -> Result<VolumeResolution, SpawnError<P::Error>> {
        if let Some(volume_id) = session.volume(spec.role).map(str::to_owned) {
            match self.provider.describe_volume(&volume_id).await {
                Ok(Some(volume)) => match volume.state {
                    VolumeState::InUse => {
                        verify_attachment(spec, &volume, node)?;
                        info!(volume_id, role = %spec.role, "volume already attached");
                        return Ok(VolumeResolution::Attached);
                    }
                    VolumeState::Creating | VolumeState::Available => {
                        if volume.zone != node.zone {
                            return Err(SpawnError::ZoneMismatch {
                                role: spec.role,
                                volume_id: volume.id,
                                volume_zone: volume.zone,
                                node_id: node.id.clone(),
                                node_zone: node.zone.clone(),
                            });
                        }
                        info!(volume_id, role = %spec.role, state = %volume.state, "reusing recorded volume");
                        return Ok(VolumeResolution::Pending { volume_id: volume.id });
                    }
                    VolumeState::Deleting | VolumeState::Deleted | VolumeState::Error => {
                        info!(volume_id, role = %spec.role, state = %volume.state, "recorded volume unusable; replacing");
                        session.clear_volume(spec.role);
                    }
                },
                Ok(None) => {
                    info!(volume_id, role = %spec.role, "recorded volume no longer exists; replacing");
                    session.clear_volume(spec.role);
                }
                Err(err) => {
                    warn!(volume_id, role = %spec.role, error = %err, "recorded volume unreadable; replacing");
                    session.clear_volume(spec.role);
                }
            }
        }
        self.create_volume(session, spec, node).await
    }

    async fn create_volume(
        &self,
        session: &mut Session,
        spec: &RoleSpec,
        node: &NodeDescriptor,
    ) -> Result<VolumeResolution, SpawnError<P::Error>> {
        let request = VolumeRequest::new(
            format!("skiff-{}-{}", spec.role, Uuid::new_v4().simple()),
            &spec.snapshot_id,
            &node.zone,
        );
        let volume = self
            .provider
            .create_volume(&request)
            .await
            .map_err(SpawnError::Provider)?;
        // Same crash-resumption ordering as node creation.
        session.set_volume(spec.role, &volume.id);
        info!(volume_id = %volume.id, role = %spec.role, zone = %volume.zone, "created volume");
        Ok(VolumeResolution::Pending { volume_id: volume.id })
    }
}

/// Checks an in-use volume really is attached to this session's node at the
/// role's configured device.
fn verify_attachment<E>(
    spec: &RoleSpec,
    volume: &crate::provider::VolumeDescriptor,
    node: &NodeDescriptor,
) -> Result<(), SpawnError<E>>
where
    E: std::error::Error + 'static,
{
    let observed_node = volume
        .attachment
        .as_ref()
        .map_or("<none>", |attachment| attachment.node_id.as_str());
    let observed_device = volume
        .attachment
        .as_ref()
        .map_or("<none>", |attachment| attachment.device.as_str());

    if observed_node == node.id && observed_device == spec.device {
        return Ok(());
    }
    Err(SpawnError::VolumeConflict {
        role: spec.role,
        volume_id: volume.id.clone(),
        expected_node: node.id.clone(),
        expected_device: spec.device.clone(),
        observed_node: observed_node.to_owned(),
        observed_device: observed_device.to_owned(),
    })
}
