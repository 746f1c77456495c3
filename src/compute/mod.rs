//! HTTP implementation of the [`Provider`] contract.
//!
//! The compute API speaks JSON over HTTPS and authenticates every request
//! with an `X-Auth-Token` header. Node state travels as a numeric code and
//! volume state as a status string; both are decoded at this boundary so
//! the orchestrators only ever see the typed vocabularies.

use std::sync::LazyLock;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::provider::{
    NodeDescriptor, NodeRequest, Provider, ProviderFuture, VolumeDescriptor, VolumeRequest,
};

mod error;
mod node;
mod volume;

pub use error::ComputeError;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
const HTTP_NOT_FOUND: u16 = 404;

static HTTP_CLIENT: LazyLock<reqwest::Client> = LazyLock::new(|| {
    reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
});

/// Client for the operator's compute API.
#[derive(Clone, Debug)]
pub struct ComputeClient {
    base_url: String,
    api_token: String,
}

impl ComputeClient {
    /// Constructs a client for the API rooted at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`ComputeError::Config`] when the base URL or token is blank.
    pub fn new(
        base_url: impl Into<String>,
        api_token: impl Into<String>,
    ) -> Result<Self, ComputeError> {
        let trimmed_url = base_url.into().trim().trim_end_matches('/').to_owned();
        let trimmed_token = api_token.into().trim().to_owned();
        if trimmed_url.is_empty() {
            return Err(ComputeError::Config(String::from("api_base_url is empty")));
        }
        if trimmed_token.is_empty() {
            return Err(ComputeError::Config(String::from("api_token is empty")));
        }
        Ok(Self {
            base_url: trimmed_url,
            api_token: trimmed_token,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn dispatch(&self, builder: reqwest::RequestBuilder) -> Result<(u16, Vec<u8>), ComputeError> {
        let response = builder
            .header("X-Auth-Token", &self.api_token)
            .send()
            .await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?;
        Ok((status, body.to_vec()))
    }

    pub(in crate::compute) async fn get_bytes(
        &self,
        path: &str,
    ) -> Result<(u16, Vec<u8>), ComputeError> {
        self.dispatch(HTTP_CLIENT.get(self.url(path))).await
    }

    pub(in crate::compute) async fn post_json<T: Serialize + Sync>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<(u16, Vec<u8>), ComputeError> {
        self.dispatch(HTTP_CLIENT.post(self.url(path)).json(body))
            .await
    }

    pub(in crate::compute) async fn post_empty(
        &self,
        path: &str,
    ) -> Result<(u16, Vec<u8>), ComputeError> {
        self.dispatch(HTTP_CLIENT.post(self.url(path))).await
    }

    pub(in crate::compute) async fn delete(
        &self,
        path: &str,
    ) -> Result<(u16, Vec<u8>), ComputeError> {
        self.dispatch(HTTP_CLIENT.delete(self.url(path))).await
    }
}

pub(in crate::compute) fn is_success(status: u16) -> bool {
    (200..300).contains(&status)
}

pub(in crate::compute) fn api_error(status: u16, body: &[u8]) -> ComputeError {
    ComputeError::Api {
        status,
        message: String::from_utf8_lossy(body).into_owned(),
    }
}

pub(in crate::compute) fn parse_json<T: DeserializeOwned>(body: &[u8]) -> Result<T, ComputeError> {
    serde_json::from_slice(body).map_err(|err| ComputeError::Payload {
        message: err.to_string(),
    })
}

impl Provider for ComputeClient {
    type Error = ComputeError;

    fn create_node<'a>(
        &'a self,
        request: &'a NodeRequest,
    ) -> ProviderFuture<'a, NodeDescriptor, Self::Error> {
        Box::pin(self.launch_node(request))
    }

    fn describe_node<'a>(
        &'a self,
        node_id: &'a str,
    ) -> ProviderFuture<'a, Option<NodeDescriptor>, Self::Error> {
        Box::pin(self.fetch_node(node_id))
    }

    fn start_node<'a>(&'a self, node_id: &'a str) -> ProviderFuture<'a, (), Self::Error> {
        Box::pin(self.perform_node_action(node_id, node::NodeAction::Start))
    }

    fn stop_node<'a>(&'a self, node_id: &'a str) -> ProviderFuture<'a, (), Self::Error> {
        Box::pin(self.perform_node_action(node_id, node::NodeAction::Stop))
    }

    fn terminate_node<'a>(&'a self, node_id: &'a str) -> ProviderFuture<'a, (), Self::Error> {
        Box::pin(self.perform_node_action(node_id, node::NodeAction::Terminate))
    }

    fn create_volume<'a>(
        &'a self,
        request: &'a VolumeRequest,
    ) -> ProviderFuture<'a, VolumeDescriptor, Self::Error> {
        Box::pin(self.provision_volume(request))
    }

    fn describe_volume<'a>(
        &'a self,
        volume_id: &'a str,
    ) -> ProviderFuture<'a, Option<VolumeDescriptor>, Self::Error> {
        Box::pin(self.fetch_volume(volume_id))
    }

    fn attach_volume<'a>(
        &'a self,
        node_id: &'a str,
        volume_id: &'a str,
        device: &'a str,
    ) -> ProviderFuture<'a, (), Self::Error> {
        Box::pin(self.attach_volume_to_node(node_id, volume_id, device))
    }

    fn detach_volume<'a>(&'a self, volume_id: &'a str) -> ProviderFuture<'a, (), Self::Error> {
        Box::pin(self.detach_volume_from_node(volume_id))
    }

    fn delete_volume<'a>(&'a self, volume_id: &'a str) -> ProviderFuture<'a, (), Self::Error> {
        Box::pin(self.destroy_volume(volume_id))
    }
}
