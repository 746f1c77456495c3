//! The teardown sweep.
//!
//! Teardown is best-effort by design: a resource that is already gone is a
//! success, one role's failure never blocks another, and repeated calls on
//! an already-empty session are safe no-ops. Failures are aggregated and
//! reported together once every resource has been visited.

use tracing::{info, warn};

use crate::provider::Provider;
use crate::session::{Session, VolumeRole};
use crate::state::{NodeState, VolumeState};
use crate::wait::CancelSignal;

use super::error::{SpawnError, TeardownError, TeardownFailure};
use super::{Spawner, TeardownPolicy};

impl<P> Spawner<P>
where
    P: Provider,
{
    /// Winds the session's resources down according to `policy`.
    ///
    /// The node is terminated or merely stopped per
    /// [`TeardownPolicy::terminate_node`]; stopping retains the node
    /// identifier so a later `provision` takes the restart path. Volumes
    /// are only touched when [`TeardownPolicy::delete_volumes`] is set:
    /// each is detached if in use, awaited to `available`, deleted, and
    /// its session entry cleared regardless of individual failure.
    ///
    /// # Errors
    ///
    /// Returns [`TeardownError::Incomplete`] listing every resource the
    /// sweep failed on, or [`TeardownError::Cancelled`] when the caller
    /// aborts; entries not yet processed then stay in the session.
    pub async fn teardown(
        &self,
        session: &mut Session,
        policy: TeardownPolicy,
        cancel: &CancelSignal,
    ) -> Result<(), TeardownError> {
        let mut failures = Vec::new();

        if let Some(node_id) = session.node_id().map(str::to_owned) {
            match self.shutdown_node(&node_id, policy.terminate_node, cancel).await {
                Ok(()) => {
                    if policy.terminate_node {
                        session.clear_node_id();
                    }
                }
                Err(SpawnError::Cancelled) => return Err(TeardownError::Cancelled),
                Err(err) => failures.push(TeardownFailure {
                    resource: format!("node {node_id}"),
                    message: err.to_string(),
                }),
            }
        }

        if policy.delete_volumes {
            for role in VolumeRole::ALL {
                let Some(volume_id) = session.volume(role).map(str::to_owned) else {
                    continue;
                };
                match self.remove_volume(&volume_id, cancel).await {
                    Ok(()) => {}
                    Err(SpawnError::Cancelled) => return Err(TeardownError::Cancelled),
                    Err(err) => failures.push(TeardownFailure {
                        resource: format!("{role} volume {volume_id}"),
                        message: err.to_string(),
                    }),
                }
                // Cleared even on failure: the aggregated error already
                // names the leaked resource, and a retry with a stale
                // entry could resurrect a half-deleted volume.
                session.clear_volume(role);
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(TeardownError::Incomplete { failures })
        }
    }

    /// Terminates or stops one node and waits for the terminal phase.
    ///
    /// An unreadable or missing node is treated as already gone: teardown
    /// must keep going when the provider has beaten it to the cleanup.
    async fn shutdown_node(
        &self,
        node_id: &str,
        terminate: bool,
        cancel: &CancelSignal,
    ) -> Result<(), SpawnError<P::Error>> {
        let node = match self.provider.describe_node(node_id).await {
            Ok(Some(node)) => node,
            Ok(None) => {
                info!(node_id, "node already gone");
                return Ok(());
            }
            Err(err) => {
                warn!(node_id, error = %err, "node unreadable during teardown; skipping");
                return Ok(());
            }
        };

        if terminate {
            if !matches!(node.state, NodeState::ShuttingDown | NodeState::Terminated) {
                self.provider
                    .terminate_node(node_id)
                    .await
                    .map_err(SpawnError::Provider)?;
            }
            return match self.await_node(node_id, NodeState::Terminated, cancel).await {
                Ok(_) => Ok(()),
                // Providers may garbage-collect the record before the
                // terminal phase is ever observed.
                Err(SpawnError::Vanished { .. }) => Ok(()),
                Err(err) => Err(err),
            };
        }

        match node.state {
            NodeState::Stopped => Ok(()),
            NodeState::Stopping => self
                .await_node(node_id, NodeState::Stopped, cancel)
                .await
                .map(|_| ()),
            NodeState::Pending | NodeState::Running => {
                self.provider
                    .stop_node(node_id)
                    .await
                    .map_err(SpawnError::Provider)?;
                self.await_node(node_id, NodeState::Stopped, cancel)
                    .await
                    .map(|_| ())
            }
            NodeState::ShuttingDown | NodeState::Terminated => {
                warn!(node_id, state = %node.state, "node terminating under a stop policy");
                Ok(())
            }
        }
    }

    /// Detaches, drains, and deletes one volume.
    async fn remove_volume(
        &self,
        volume_id: &str,
        cancel: &CancelSignal,
    ) -> Result<(), SpawnError<P::Error>> {
        let Some(volume) = self
            .provider
            .describe_volume(volume_id)
            .await
            .map_err(SpawnError::Provider)?
        else {
            info!(volume_id, "volume already gone");
            return Ok(());
        };

        match volume.state {
            VolumeState::Deleting | VolumeState::Deleted => {
                info!(volume_id, state = %volume.state, "volume already on its way out");
                return Ok(());
            }
            VolumeState::InUse => {
                self.provider
                    .detach_volume(volume_id)
                    .await
                    .map_err(SpawnError::Provider)?;
                self.await_volume(volume_id, VolumeState::Available, cancel)
                    .await?;
            }
            VolumeState::Creating => {
                self.await_volume(volume_id, VolumeState::Available, cancel)
                    .await?;
            }
            VolumeState::Available | VolumeState::Error => {}
        }

        self.provider
            .delete_volume(volume_id)
            .await
            .map_err(SpawnError::Provider)?;
        info!(volume_id, "deleted volume");
        Ok(())
    }
}
