//! Core library for the Skiff workbench-node spawner.
//!
//! The crate provisions a per-user remote execution node on a cloud
//! compute provider, attaches the user's persistent role-tagged volumes
//! (home and environment), and hands back the node's private service
//! endpoint. The heart of it is a crash-tolerant, idempotently-resumable
//! reconciliation loop: every call converges whatever partial state a
//! prior attempt left behind onto one running node with all requested
//! volumes attached, using only the externally persisted [`Session`]
//! record as its memory.

pub mod bootstrap;
pub mod compute;
pub mod config;
pub mod provider;
pub mod session;
pub mod session_store;
pub mod spawner;
pub mod state;
pub mod wait;

pub use bootstrap::{BootstrapError, BootstrapPayload};
pub use compute::{ComputeClient, ComputeError};
pub use config::{ConfigError, SpawnerConfig};
pub use provider::{
    NodeDescriptor, NodeRequest, NodeRequestBuilder, Provider, ProviderFuture, RequestError,
    VolumeAttachment, VolumeDescriptor, VolumeRequest,
};
pub use session::{Session, VolumeRole};
pub use session_store::{SessionStore, SessionStoreError};
pub use spawner::{
    Endpoint, Lifecycle, Liveness, ProvisionRequest, RoleSpec, SpawnError, Spawner, TeardownError,
    TeardownFailure, TeardownPolicy,
};
pub use state::{LifecycleState, NodeState, StateDecodeError, VolumeState};
pub use wait::{CancelHandle, CancelSignal, WaitError, WaitParams, cancel_pair};
