//! Node endpoints of the compute API.

use std::net::IpAddr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::provider::{NodeDescriptor, NodeRequest};
use crate::state::NodeState;

use super::{ComputeClient, ComputeError, HTTP_NOT_FOUND, api_error, is_success, parse_json};

#[derive(Serialize)]
struct CreateNodeBody<'a> {
    name: &'a str,
    template_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    node_type: Option<&'a str>,
    zone: &'a str,
    user_data: &'a str,
}

#[derive(Serialize)]
struct NodeActionBody {
    action: &'static str,
}

#[derive(Deserialize)]
struct NodeEnvelope {
    node: WireNode,
}

#[derive(Deserialize)]
pub(in crate::compute) struct WireNode {
    id: String,
    state: WireNodeState,
    zone: String,
    #[serde(default)]
    private_ip: Option<String>,
}

#[derive(Deserialize)]
struct WireNodeState {
    code: u16,
}

impl WireNode {
    pub(in crate::compute) fn into_descriptor(self) -> Result<NodeDescriptor, ComputeError> {
        let state = NodeState::decode(self.state.code).map_err(|source| {
            ComputeError::UnrecognisedState {
                resource_id: self.id.clone(),
                source,
            }
        })?;
        Ok(NodeDescriptor {
            id: self.id,
            state,
            zone: self.zone,
            // A malformed address is treated as not-yet-assigned; address
            // resolution later fails with the node id in hand.
            private_ip: self
                .private_ip
                .as_deref()
                .and_then(|ip| IpAddr::from_str(ip).ok()),
        })
    }
}

/// Power actions accepted by the node action endpoint.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(in crate::compute) enum NodeAction {
    Start,
    Stop,
    Terminate,
}

impl NodeAction {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Terminate => "terminate",
        }
    }
}

impl ComputeClient {
    /// Creates a node from a launch template.
    ///
    /// # Errors
    ///
    /// Returns [`ComputeError::Api`] when the provider rejects the request
    /// and [`ComputeError::UnrecognisedState`] when the created node reports
    /// a state outside the documented set.
    pub(in crate::compute) async fn launch_node(
        &self,
        request: &NodeRequest,
    ) -> Result<NodeDescriptor, ComputeError> {
        let body = CreateNodeBody {
            name: &request.name,
            template_id: &request.template_id,
            node_type: request.node_type.as_deref(),
            zone: &request.zone,
            user_data: &request.user_data,
        };
        let (status, bytes) = self.post_json("/v1/nodes", &body).await?;
        if !is_success(status) {
            return Err(api_error(status, &bytes));
        }
        let envelope: NodeEnvelope = parse_json(&bytes)?;
        envelope.node.into_descriptor()
    }

    /// Reads a node's current descriptor; a missing node is `None`.
    pub(in crate::compute) async fn fetch_node(
        &self,
        node_id: &str,
    ) -> Result<Option<NodeDescriptor>, ComputeError> {
        let (status, bytes) = self.get_bytes(&format!("/v1/nodes/{node_id}")).await?;
        if status == HTTP_NOT_FOUND {
            return Ok(None);
        }
        if !is_success(status) {
            return Err(api_error(status, &bytes));
        }
        let envelope: NodeEnvelope = parse_json(&bytes)?;
        envelope.node.into_descriptor().map(Some)
    }

    /// Sends a power action to a node.
    pub(in crate::compute) async fn perform_node_action(
        &self,
        node_id: &str,
        action: NodeAction,
    ) -> Result<(), ComputeError> {
        let (status, bytes) = self
            .post_json(
                &format!("/v1/nodes/{node_id}/action"),
                &NodeActionBody {
                    action: action.as_str(),
                },
            )
            .await?;
        if is_success(status) {
            return Ok(());
        }
        Err(api_error(status, &bytes))
    }
}
