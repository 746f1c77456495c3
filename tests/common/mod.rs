//! Shared in-memory provider double for behaviour tests.
//!
//! The fake models a small eventually-consistent cloud: created resources
//! pass through their intermediate phases and only settle after a number of
//! describe calls, attachment is rejected unless the node is running and
//! the volume available (exactly as the real provider behaves), and
//! describe failures can be injected per volume.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::net::IpAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use skiff::{
    BootstrapPayload, NodeDescriptor, NodeRequest, NodeState, Provider, ProviderFuture,
    ProvisionRequest, RoleSpec, Spawner, VolumeAttachment, VolumeDescriptor, VolumeRequest,
    VolumeRole, VolumeState, WaitParams,
};

/// Error type returned by the fake provider.
#[derive(Clone, Debug)]
pub struct FakeError(pub String);

impl fmt::Display for FakeError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

impl std::error::Error for FakeError {}

#[derive(Clone, Debug)]
struct FakeNode {
    state: NodeState,
    zone: String,
    private_ip: Option<IpAddr>,
    polls_left: u32,
}

#[derive(Clone, Debug)]
struct FakeVolume {
    state: VolumeState,
    zone: String,
    attachment: Option<VolumeAttachment>,
    polls_left: u32,
}

#[derive(Debug)]
struct Cloud {
    nodes: BTreeMap<String, FakeNode>,
    volumes: BTreeMap<String, FakeVolume>,
    next_id: u32,
    calls: Vec<String>,
    node_settle_polls: u32,
    volume_settle_polls: u32,
    assign_addresses: bool,
    failing_volume_describes: BTreeSet<String>,
    failing_node_describes: BTreeSet<String>,
}

fn address_for(node_id: &str) -> IpAddr {
    let suffix: u8 = node_id
        .rsplit('-')
        .next()
        .and_then(|part| part.parse().ok())
        .unwrap_or(99);
    IpAddr::from([10, 0, 0, suffix])
}

impl Cloud {
    fn describe_node(&mut self, node_id: &str) -> Option<NodeDescriptor> {
        let assign_addresses = self.assign_addresses;
        let node = self.nodes.get_mut(node_id)?;
        if matches!(
            node.state,
            NodeState::Pending | NodeState::Stopping | NodeState::ShuttingDown
        ) {
            if node.polls_left == 0 {
                node.state = match node.state {
                    NodeState::Pending => NodeState::Running,
                    NodeState::Stopping => NodeState::Stopped,
                    _ => NodeState::Terminated,
                };
                if node.state == NodeState::Running
                    && node.private_ip.is_none()
                    && assign_addresses
                {
                    node.private_ip = Some(address_for(node_id));
                }
            } else {
                node.polls_left -= 1;
            }
        }
        Some(NodeDescriptor {
            id: node_id.to_owned(),
            state: node.state,
            zone: node.zone.clone(),
            private_ip: node.private_ip,
        })
    }

    fn describe_volume(&mut self, volume_id: &str) -> Result<Option<VolumeDescriptor>, FakeError> {
        if self.failing_volume_describes.contains(volume_id) {
            return Err(FakeError(format!("injected describe failure for {volume_id}")));
        }
        let Some(volume) = self.volumes.get_mut(volume_id) else {
            return Ok(None);
        };
        if matches!(volume.state, VolumeState::Creating | VolumeState::Deleting) {
            if volume.polls_left == 0 {
                volume.state = match volume.state {
                    VolumeState::Creating => VolumeState::Available,
                    _ => VolumeState::Deleted,
                };
            } else {
                volume.polls_left -= 1;
            }
        }
        Ok(Some(VolumeDescriptor {
            id: volume_id.to_owned(),
            state: volume.state,
            zone: volume.zone.clone(),
            attachment: volume.attachment.clone(),
        }))
    }
}

/// Clonable handle to the fake cloud.
#[derive(Clone, Debug)]
pub struct FakeProvider {
    cloud: Arc<Mutex<Cloud>>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self {
            cloud: Arc::new(Mutex::new(Cloud {
                nodes: BTreeMap::new(),
                volumes: BTreeMap::new(),
                next_id: 0,
                calls: Vec::new(),
                node_settle_polls: 1,
                volume_settle_polls: 1,
                assign_addresses: true,
                failing_volume_describes: BTreeSet::new(),
                failing_node_describes: BTreeSet::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Cloud> {
        self.cloud.lock().expect("fake cloud lock")
    }

    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub fn count_calls(&self, prefix: &str) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|call| call.starts_with(prefix))
            .count()
    }

    pub fn node_state(&self, node_id: &str) -> Option<NodeState> {
        self.lock().nodes.get(node_id).map(|node| node.state)
    }

    pub fn volume_state(&self, volume_id: &str) -> Option<VolumeState> {
        self.lock().volumes.get(volume_id).map(|volume| volume.state)
    }

    pub fn volume_attachment(&self, volume_id: &str) -> Option<VolumeAttachment> {
        self.lock()
            .volumes
            .get(volume_id)
            .and_then(|volume| volume.attachment.clone())
    }

    /// Forces a node into a state, as if mutated behind the spawner's back.
    /// Terminating a node releases its volume attachments, as the real
    /// provider does.
    pub fn set_node_state(&self, node_id: &str, state: NodeState) {
        let mut cloud = self.lock();
        let settle = cloud.node_settle_polls;
        if let Some(node) = cloud.nodes.get_mut(node_id) {
            node.state = state;
            node.polls_left = settle;
        }
        if matches!(state, NodeState::ShuttingDown | NodeState::Terminated) {
            for volume in cloud.volumes.values_mut() {
                if volume
                    .attachment
                    .as_ref()
                    .is_some_and(|attachment| attachment.node_id == node_id)
                {
                    volume.state = VolumeState::Available;
                    volume.attachment = None;
                }
            }
        }
    }

    /// Seeds a node that exists before the test starts.
    pub fn seed_node(&self, node_id: &str, state: NodeState, zone: &str) {
        let mut cloud = self.lock();
        let settle = cloud.node_settle_polls;
        let private_ip =
            (state == NodeState::Running).then(|| address_for(node_id));
        cloud.nodes.insert(
            node_id.to_owned(),
            FakeNode {
                state,
                zone: zone.to_owned(),
                private_ip,
                polls_left: settle,
            },
        );
    }

    /// Seeds a volume that exists before the test starts.
    pub fn seed_volume(
        &self,
        volume_id: &str,
        state: VolumeState,
        zone: &str,
        attachment: Option<VolumeAttachment>,
    ) {
        let mut cloud = self.lock();
        let settle = cloud.volume_settle_polls;
        cloud.volumes.insert(
            volume_id.to_owned(),
            FakeVolume {
                state,
                zone: zone.to_owned(),
                attachment,
                polls_left: settle,
            },
        );
    }

    /// Makes every describe of one volume fail.
    pub fn fail_volume_describe(&self, volume_id: &str) {
        self.lock()
            .failing_volume_describes
            .insert(volume_id.to_owned());
    }

    /// Makes every describe of one node fail.
    pub fn fail_node_describe(&self, node_id: &str) {
        self.lock()
            .failing_node_describes
            .insert(node_id.to_owned());
    }

    /// Makes volumes take this many describes to settle, so volume
    /// readiness can lag node readiness.
    pub fn set_volume_settle_polls(&self, polls: u32) {
        self.lock().volume_settle_polls = polls;
    }

    /// Stops assigning private addresses to nodes that reach running.
    pub fn withhold_addresses(&self) {
        self.lock().assign_addresses = false;
    }
}

impl Provider for FakeProvider {
    type Error = FakeError;

    fn create_node<'a>(
        &'a self,
        request: &'a NodeRequest,
    ) -> ProviderFuture<'a, NodeDescriptor, FakeError> {
        let mut cloud = self.lock();
        cloud.next_id += 1;
        let node_id = format!("node-{}", cloud.next_id);
        cloud.calls.push(format!("create_node {node_id}"));
        let settle = cloud.node_settle_polls;
        cloud.nodes.insert(
            node_id.clone(),
            FakeNode {
                state: NodeState::Pending,
                zone: request.zone.clone(),
                private_ip: None,
                polls_left: settle,
            },
        );
        let descriptor = NodeDescriptor {
            id: node_id,
            state: NodeState::Pending,
            zone: request.zone.clone(),
            private_ip: None,
        };
        Box::pin(std::future::ready(Ok(descriptor)))
    }

    fn describe_node<'a>(
        &'a self,
        node_id: &'a str,
    ) -> ProviderFuture<'a, Option<NodeDescriptor>, FakeError> {
        let mut cloud = self.lock();
        cloud.calls.push(format!("describe_node {node_id}"));
        let result = if cloud.failing_node_describes.contains(node_id) {
            Err(FakeError(format!("injected describe failure for {node_id}")))
        } else {
            Ok(cloud.describe_node(node_id))
        };
        Box::pin(std::future::ready(result))
    }

    fn start_node<'a>(&'a self, node_id: &'a str) -> ProviderFuture<'a, (), FakeError> {
        let mut cloud = self.lock();
        cloud.calls.push(format!("start_node {node_id}"));
        let settle = cloud.node_settle_polls;
        let result = match cloud.nodes.get_mut(node_id) {
            Some(node) if node.state == NodeState::Stopped => {
                node.state = NodeState::Pending;
                node.polls_left = settle;
                Ok(())
            }
            Some(node) => Err(FakeError(format!(
                "cannot start node {node_id} in state {}",
                node.state
            ))),
            None => Err(FakeError(format!("no such node {node_id}"))),
        };
        Box::pin(std::future::ready(result))
    }

    fn stop_node<'a>(&'a self, node_id: &'a str) -> ProviderFuture<'a, (), FakeError> {
        let mut cloud = self.lock();
        cloud.calls.push(format!("stop_node {node_id}"));
        let settle = cloud.node_settle_polls;
        let result = match cloud.nodes.get_mut(node_id) {
            Some(node) if matches!(node.state, NodeState::Running | NodeState::Pending) => {
                node.state = NodeState::Stopping;
                node.polls_left = settle;
                Ok(())
            }
            Some(node) if node.state == NodeState::Stopped => Ok(()),
            Some(node) => Err(FakeError(format!(
                "cannot stop node {node_id} in state {}",
                node.state
            ))),
            None => Err(FakeError(format!("no such node {node_id}"))),
        };
        Box::pin(std::future::ready(result))
    }

    fn terminate_node<'a>(&'a self, node_id: &'a str) -> ProviderFuture<'a, (), FakeError> {
        let mut cloud = self.lock();
        cloud.calls.push(format!("terminate_node {node_id}"));
        let settle = cloud.node_settle_polls;
        let result = match cloud.nodes.get_mut(node_id) {
            Some(node) => {
                if node.state != NodeState::Terminated {
                    node.state = NodeState::ShuttingDown;
                    node.polls_left = settle;
                }
                Ok(())
            }
            None => Err(FakeError(format!("no such node {node_id}"))),
        };
        Box::pin(std::future::ready(result))
    }

    fn create_volume<'a>(
        &'a self,
        request: &'a VolumeRequest,
    ) -> ProviderFuture<'a, VolumeDescriptor, FakeError> {
        let mut cloud = self.lock();
        cloud.next_id += 1;
        let volume_id = format!("vol-{}", cloud.next_id);
        cloud
            .calls
            .push(format!("create_volume {volume_id} {}", request.snapshot_id));
        let settle = cloud.volume_settle_polls;
        cloud.volumes.insert(
            volume_id.clone(),
            FakeVolume {
                state: VolumeState::Creating,
                zone: request.zone.clone(),
                attachment: None,
                polls_left: settle,
            },
        );
        let descriptor = VolumeDescriptor {
            id: volume_id,
            state: VolumeState::Creating,
            zone: request.zone.clone(),
            attachment: None,
        };
        Box::pin(std::future::ready(Ok(descriptor)))
    }

    fn describe_volume<'a>(
        &'a self,
        volume_id: &'a str,
    ) -> ProviderFuture<'a, Option<VolumeDescriptor>, FakeError> {
        let mut cloud = self.lock();
        cloud.calls.push(format!("describe_volume {volume_id}"));
        let result = cloud.describe_volume(volume_id);
        Box::pin(std::future::ready(result))
    }

    fn attach_volume<'a>(
        &'a self,
        node_id: &'a str,
        volume_id: &'a str,
        device: &'a str,
    ) -> ProviderFuture<'a, (), FakeError> {
        let mut cloud = self.lock();
        cloud
            .calls
            .push(format!("attach_volume {volume_id} {node_id} {device}"));
        let node_running = cloud
            .nodes
            .get(node_id)
            .is_some_and(|node| node.state == NodeState::Running);
        let result = if !node_running {
            Err(FakeError(format!(
                "attach rejected: node {node_id} is not running"
            )))
        } else {
            match cloud.volumes.get_mut(volume_id) {
                Some(volume) if volume.state == VolumeState::Available => {
                    volume.state = VolumeState::InUse;
                    volume.attachment = Some(VolumeAttachment {
                        node_id: node_id.to_owned(),
                        device: device.to_owned(),
                    });
                    Ok(())
                }
                Some(volume) => Err(FakeError(format!(
                    "attach rejected: volume {volume_id} is {}",
                    volume.state
                ))),
                None => Err(FakeError(format!("no such volume {volume_id}"))),
            }
        };
        Box::pin(std::future::ready(result))
    }

    fn detach_volume<'a>(&'a self, volume_id: &'a str) -> ProviderFuture<'a, (), FakeError> {
        let mut cloud = self.lock();
        cloud.calls.push(format!("detach_volume {volume_id}"));
        let result = match cloud.volumes.get_mut(volume_id) {
            Some(volume) if volume.state == VolumeState::InUse => {
                volume.state = VolumeState::Available;
                volume.attachment = None;
                Ok(())
            }
            Some(volume) if volume.state == VolumeState::Available => Ok(()),
            Some(volume) => Err(FakeError(format!(
                "cannot detach volume {volume_id} in state {}",
                volume.state
            ))),
            None => Err(FakeError(format!("no such volume {volume_id}"))),
        };
        Box::pin(std::future::ready(result))
    }

    fn delete_volume<'a>(&'a self, volume_id: &'a str) -> ProviderFuture<'a, (), FakeError> {
        let mut cloud = self.lock();
        cloud.calls.push(format!("delete_volume {volume_id}"));
        let settle = cloud.volume_settle_polls;
        if let Some(volume) = cloud.volumes.get_mut(volume_id) {
            volume.state = VolumeState::Deleting;
            volume.attachment = None;
            volume.polls_left = settle;
        }
        Box::pin(std::future::ready(Ok(())))
    }
}

/// Wait parameters fast enough for tests.
pub fn quick_params() -> WaitParams {
    WaitParams {
        poll_interval: Duration::from_millis(1),
        wait_timeout: Duration::from_millis(500),
    }
}

/// Spawner over a handle to the fake cloud, serving port 8888.
pub fn spawner(provider: &FakeProvider) -> Spawner<FakeProvider> {
    Spawner::new(provider.clone(), 8888).with_wait_params(quick_params())
}

/// Two-role request matching the documented home/env layout.
pub fn two_role_request() -> ProvisionRequest {
    let payload = BootstrapPayload::new("ada")
        .expect("payload")
        .env_var("JUPYTERHUB_API_TOKEN", "tok-1");
    ProvisionRequest {
        template_id: String::from("lt-0abc"),
        node_type: Some(String::from("t3.large")),
        zone: String::from("us-east-1a"),
        payload,
        roles: vec![
            RoleSpec {
                role: VolumeRole::Home,
                snapshot_id: String::from("snap-A"),
                device: String::from("/dev/sdf"),
            },
            RoleSpec {
                role: VolumeRole::Env,
                snapshot_id: String::from("snap-B"),
                device: String::from("/dev/sdg"),
            },
        ],
    }
}
