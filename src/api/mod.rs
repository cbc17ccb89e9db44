// Copyright (c) 2025 - Cowboy AI, Inc.
//! Control-Plane API Boundary
//!
//! The orchestrator talks to each cluster through [`ControlPlane`], a
//! client bound to one node's HTTP API. [`ControlPlaneConnector`] builds
//! clients for an [`ApiTarget`]. Failures come back as typed
//! [`ApiError`]s so retry loops never inspect message text.
//!
//! # Architecture
//!
//! ```text
//! Sprawl ──▶ ControlPlaneConnector ──▶ ControlPlane (per node)
//!                 │                        │
//!                 ├── HttpConnector        ├── ACL / tenancy
//!                 └── SimulatedWorld       ├── catalog / agent
//!                                          ├── KV / status / snapshot
//!                                          └── peering / network areas
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use cim_sprawl::api::{ApiTarget, ControlPlaneConnector, HttpConnector, RequestOptions};
//! use cim_sprawl::domain::NodeId;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let connector = HttpConnector::default();
//!     let target = ApiTarget {
//!         cluster: "dc1".into(),
//!         node: NodeId::new("server1", ""),
//!         address: "10.0.4.2:8500".into(),
//!         proxy_port: Some(40001),
//!         token: Some("root".into()),
//!     };
//!     let client = connector.connect(&target)?;
//!     client.kv_put("hello", b"world", &RequestOptions::default()).await?;
//!     Ok(())
//! }
//! ```

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

use crate::domain::{ConfigEntry, NodeId, Resource, ResourceId};

pub mod error;
#[cfg(feature = "http")]
pub mod http;
pub mod types;

pub use error::{ApiError, ApiResult, ErrorKind};
#[cfg(feature = "http")]
pub use http::{HttpConfig, HttpConnector};
pub use types::*;

/// Where a client connects, and with which credential
#[derive(Clone, PartialEq, Eq)]
pub struct ApiTarget {
    pub cluster: String,
    pub node: NodeId,
    /// `ip:port` of the node's HTTP API on its local network
    pub address: String,
    /// Host port of the forward proxy into the node's network
    pub proxy_port: Option<u16>,
    /// `None` talks to the API anonymously
    pub token: Option<String>,
}

impl fmt::Debug for ApiTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiTarget")
            .field("cluster", &self.cluster)
            .field("node", &self.node)
            .field("address", &self.address)
            .field("proxy_port", &self.proxy_port)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Which credential a node client uses
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TokenChoice {
    /// The cluster's bootstrap (management) token
    #[default]
    Bootstrap,
    Anonymous,
    Custom(String),
}

/// Builds control-plane clients
pub trait ControlPlaneConnector: Send + Sync {
    /// Create a client for one node's API
    ///
    /// Connecting is lazy: an unreachable node surfaces as a
    /// [`ErrorKind::Transport`] error on the first call.
    fn connect(&self, target: &ApiTarget) -> ApiResult<Arc<dyn ControlPlane>>;
}

/// Client for one node's control-plane API
///
/// Every method is a single request. Tenancy and per-call token overrides
/// ride in [`RequestOptions`]; CE clusters must be sent empty tenancy.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Bootstrap the ACL system
    ///
    /// # Returns
    ///
    /// The initial management token
    ///
    /// # Errors
    ///
    /// - `NotBootstrapped` while servers are still electing or in legacy mode
    /// - `Invalid` if the system was already bootstrapped
    async fn acl_bootstrap(&self) -> ApiResult<AclToken>;

    /// Read the token the client authenticates with
    async fn acl_token_read_self(&self) -> ApiResult<AclToken>;

    async fn acl_token_list(&self, opts: &RequestOptions) -> ApiResult<Vec<AclToken>>;

    /// Create a token. The backend assigns accessor and secret.
    async fn acl_token_create(&self, token: &AclToken, opts: &RequestOptions) -> ApiResult<AclToken>;

    /// Replace the token with `token.accessor_id`
    async fn acl_token_update(&self, token: &AclToken, opts: &RequestOptions) -> ApiResult<AclToken>;

    /// Read a policy by name
    ///
    /// # Returns
    ///
    /// `None` if no policy has that name
    async fn acl_policy_read_by_name(
        &self,
        name: &str,
        opts: &RequestOptions,
    ) -> ApiResult<Option<AclPolicy>>;

    async fn acl_policy_list(&self, opts: &RequestOptions) -> ApiResult<Vec<AclPolicy>>;

    async fn acl_policy_create(&self, policy: &AclPolicy, opts: &RequestOptions) -> ApiResult<AclPolicy>;

    /// Replace the policy with `policy.id`
    async fn acl_policy_update(&self, policy: &AclPolicy, opts: &RequestOptions) -> ApiResult<AclPolicy>;

    async fn partition_list(&self) -> ApiResult<Vec<AdminPartition>>;

    async fn partition_create(&self, partition: &AdminPartition) -> ApiResult<AdminPartition>;

    async fn namespace_list(&self, opts: &RequestOptions) -> ApiResult<Vec<Namespace>>;

    async fn namespace_create(&self, ns: &Namespace, opts: &RequestOptions) -> ApiResult<Namespace>;

    async fn namespace_update(&self, ns: &Namespace, opts: &RequestOptions) -> ApiResult<Namespace>;

    /// Upsert a config entry by kind, name, partition and namespace
    ///
    /// # Errors
    ///
    /// - `IntentionsMigrating` while intentions are read only
    async fn config_entry_set(&self, entry: &ConfigEntry) -> ApiResult<()>;

    /// Create or update a typed resource
    ///
    /// # Errors
    ///
    /// - `AclNotFound` while a referenced token is still propagating
    async fn resource_write(&self, resource: &Resource) -> ApiResult<()>;

    /// Delete a typed resource; deleting a missing one succeeds
    ///
    /// # Errors
    ///
    /// - `Conflict` when a concurrent write won
    async fn resource_delete(&self, id: &ResourceId) -> ApiResult<()>;

    /// Register a node, and optionally one service and its checks
    async fn catalog_register(
        &self,
        reg: &CatalogRegistration,
        opts: &RequestOptions,
    ) -> ApiResult<()>;

    /// Deregister a service, or the whole node
    async fn catalog_deregister(
        &self,
        dereg: &CatalogDeregistration,
        opts: &RequestOptions,
    ) -> ApiResult<()>;

    async fn catalog_nodes(&self, opts: &RequestOptions) -> ApiResult<Vec<CatalogNode>>;

    /// Instances of a service
    async fn catalog_service(
        &self,
        service: &str,
        opts: &RequestOptions,
    ) -> ApiResult<Vec<CatalogService>>;

    /// Checks of every instance of a service
    async fn health_checks(&self, service: &str, opts: &RequestOptions) -> ApiResult<Vec<HealthCheck>>;

    /// Register a service with the node the client is bound to
    async fn agent_service_register(
        &self,
        reg: &AgentServiceRegistration,
        opts: &RequestOptions,
    ) -> ApiResult<()>;

    /// Ask the bound agent to join another agent's gossip pool
    async fn agent_join(&self, address: &str) -> ApiResult<()>;

    async fn kv_put(&self, key: &str, value: &[u8], opts: &RequestOptions) -> ApiResult<()>;

    /// # Returns
    ///
    /// `None` if the key does not exist
    async fn kv_get(&self, key: &str, opts: &RequestOptions) -> ApiResult<Option<Vec<u8>>>;

    /// Raft address (`ip:port`) of the current leader; empty when none
    async fn status_leader(&self) -> ApiResult<String>;

    /// Raft addresses of the voting servers
    async fn status_peers(&self) -> ApiResult<Vec<String>>;

    async fn snapshot_save(&self) -> ApiResult<Vec<u8>>;

    async fn snapshot_restore(&self, snapshot: &[u8]) -> ApiResult<()>;

    /// Generate a token the other side establishes with
    ///
    /// # Errors
    ///
    /// - `Transport` / `GatewayTimeout` while the mesh is still settling
    async fn peering_generate_token(&self, req: &PeeringGenerateTokenRequest) -> ApiResult<String>;

    /// Establish a peering from a generated token
    async fn peering_establish(&self, req: &PeeringEstablishRequest) -> ApiResult<()>;

    /// # Returns
    ///
    /// `None` if no peering has that name yet
    async fn peering_read(&self, name: &str, opts: &RequestOptions) -> ApiResult<Option<PeeringInfo>>;

    /// Create a network area
    ///
    /// # Returns
    ///
    /// The area id
    async fn network_area_create(&self, area: &NetworkAreaSpec) -> ApiResult<String>;

    async fn network_area_join(&self, area_id: &str, addresses: &[String]) -> ApiResult<()>;
}
