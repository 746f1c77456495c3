//! Provisioning and teardown orchestration for per-user workbench nodes.
//!
//! [`Spawner`] reconciles the desired state (one running node with every
//! requested volume attached) against whatever partial state a prior
//! attempt left behind. It keeps no state of its own: the externally
//! persisted [`Session`] is the sole resumption input, passed in by mutable
//! reference and updated the moment resources are created.

use std::fmt::{self, Display};
use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::pin::Pin;
use std::time::Duration;

use tracing::warn;

use crate::bootstrap::BootstrapPayload;
use crate::provider::{NodeDescriptor, Provider, VolumeDescriptor};
use crate::session::{Session, VolumeRole};
use crate::state::{NodeState, VolumeState};
use crate::wait::{CancelSignal, WaitParams, await_state};

mod error;
mod provision;
mod teardown;

pub use error::{SpawnError, TeardownError, TeardownFailure};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(15);
const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(1200);

/// Everything needed to provision one session; immutable per call.
#[derive(Clone, Debug)]
pub struct ProvisionRequest {
    /// Opaque launch template identifier, passed through verbatim.
    pub template_id: String,
    /// Optional node size overriding the template's default.
    pub node_type: Option<String>,
    /// Availability zone new resources are placed in.
    pub zone: String,
    /// Payload handed to the in-node bootstrap agent.
    pub payload: BootstrapPayload,
    /// Volume roles to resolve and attach, in processing order.
    pub roles: Vec<RoleSpec>,
}

/// Configuration record for one volume role.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RoleSpec {
    /// Logical purpose of the volume.
    pub role: VolumeRole,
    /// Snapshot new volumes for this role are initialised from.
    pub snapshot_id: String,
    /// Device name the volume is attached under.
    pub device: String,
}

/// What teardown should do with the session's resources.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TeardownPolicy {
    /// Terminate the node rather than stopping it for a later restart.
    pub terminate_node: bool,
    /// Detach and delete the session's volumes.
    pub delete_volumes: bool,
}

/// Advisory liveness of a session's node.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Liveness {
    /// The node was observed running.
    Alive,
    /// No node, a non-running node, or an unreadable node. Callers
    /// re-provision.
    NotStarted,
}

/// Service endpoint of a provisioned node.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Endpoint {
    /// Private network address of the node.
    pub address: IpAddr,
    /// Configured service port.
    pub port: u16,
}

impl Display for Endpoint {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        SocketAddr::new(self.address, self.port).fmt(formatter)
    }
}

/// Future returned by [`Lifecycle`] operations.
pub type LifecycleFuture<'a, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>;

/// Future returned by the liveness poll, which never fails.
pub type LivenessFuture<'a> = Pin<Box<dyn Future<Output = Liveness> + Send + 'a>>;

/// Host-facing lifecycle contract.
///
/// The host framework's calling convention is adapted onto this trait at
/// the boundary; implementations carry no framework base class.
pub trait Lifecycle {
    /// Provider error type surfaced through [`SpawnError`].
    type Error: std::error::Error + Send + Sync + 'static;

    /// Converges the session onto one running node with all requested
    /// volumes attached and returns its service endpoint.
    fn provision<'a>(
        &'a self,
        session: &'a mut Session,
        request: &'a ProvisionRequest,
        cancel: &'a CancelSignal,
    ) -> LifecycleFuture<'a, Endpoint, SpawnError<Self::Error>>;

    /// Winds the session's resources down according to `policy`.
    fn teardown<'a>(
        &'a self,
        session: &'a mut Session,
        policy: TeardownPolicy,
        cancel: &'a CancelSignal,
    ) -> LifecycleFuture<'a, (), TeardownError>;

    /// Reports whether the session's node is currently running. Advisory
    /// and non-blocking: one provider read, never an error.
    fn poll<'a>(&'a self, session: &'a Session) -> LivenessFuture<'a>;
}

/// Orchestrates provisioning and teardown against a [`Provider`].
#[derive(Clone, Debug)]
pub struct Spawner<P> {
    provider: P,
    wait_params: WaitParams,
    service_port: u16,
}

impl<P> Spawner<P>
where
    P: Provider,
{
    /// Creates a spawner serving endpoints on `service_port`.
    #[must_use]
    pub const fn new(provider: P, service_port: u16) -> Self {
        Self {
            provider,
            wait_params: WaitParams {
                poll_interval: DEFAULT_POLL_INTERVAL,
                wait_timeout: DEFAULT_WAIT_TIMEOUT,
            },
            service_port,
        }
    }

    /// Overrides the polling cadence and deadline used for waits.
    #[must_use]
    pub const fn with_wait_params(mut self, params: WaitParams) -> Self {
        self.wait_params = params;
        self
    }

    /// Reports whether the session's node is currently running.
    ///
    /// A liveness probe must never fail: an unset node identifier, a
    /// missing node, a non-running phase, and a provider read failure all
    /// read as [`Liveness::NotStarted`] so the caller re-provisions.
    pub async fn poll(&self, session: &Session) -> Liveness {
        let Some(node_id) = session.node_id() else {
            return Liveness::NotStarted;
        };
        match self.provider.describe_node(node_id).await {
            Ok(Some(node)) if node.state == NodeState::Running => Liveness::Alive,
            Ok(_) => Liveness::NotStarted,
            Err(err) => {
                warn!(node_id, error = %err, "liveness probe failed; reporting not started");
                Liveness::NotStarted
            }
        }
    }

    pub(in crate::spawner) async fn await_node(
        &self,
        node_id: &str,
        target: NodeState,
        cancel: &CancelSignal,
    ) -> Result<NodeDescriptor, SpawnError<P::Error>> {
        await_state(
            || self.provider.describe_node(node_id),
            target,
            &self.wait_params,
            cancel,
        )
        .await
        .map_err(|err| SpawnError::from_wait(node_id, err))
    }

    pub(in crate::spawner) async fn await_volume(
        &self,
        volume_id: &str,
        target: VolumeState,
        cancel: &CancelSignal,
    ) -> Result<VolumeDescriptor, SpawnError<P::Error>> {
        await_state(
            || self.provider.describe_volume(volume_id),
            target,
            &self.wait_params,
            cancel,
        )
        .await
        .map_err(|err| SpawnError::from_wait(volume_id, err))
    }
}

impl<P> Lifecycle for Spawner<P>
where
    P: Provider + Send + Sync,
{
    type Error = P::Error;

    fn provision<'a>(
        &'a self,
        session: &'a mut Session,
        request: &'a ProvisionRequest,
        cancel: &'a CancelSignal,
    ) -> LifecycleFuture<'a, Endpoint, SpawnError<Self::Error>> {
        Box::pin(self.provision(session, request, cancel))
    }

    fn teardown<'a>(
        &'a self,
        session: &'a mut Session,
        policy: TeardownPolicy,
        cancel: &'a CancelSignal,
    ) -> LifecycleFuture<'a, (), TeardownError> {
        Box::pin(self.teardown(session, policy, cancel))
    }

    fn poll<'a>(&'a self, session: &'a Session) -> LivenessFuture<'a> {
        Box::pin(self.poll(session))
    }
}
