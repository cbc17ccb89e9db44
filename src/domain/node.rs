// Copyright (c) 2025 - Cowboy AI, Inc.
//! Nodes
//!
//! A node is one logical machine in a cluster: a consensus server, a client
//! agent, or an agentless dataplane. The compiler fills in its identity
//! (`docker_name`, `index`) and the set of internal ports it reserves;
//! the infra generator later fills in the exposed host port for each.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

use super::ids::{NodeId, WorkloadId};
use super::images::Images;
use super::network::Address;
use super::workload::Workload;

/// HTTP API port of every agent
pub const AGENT_HTTP_PORT: u16 = 8500;

/// gRPC port of a client agent
pub const CLIENT_GRPC_PORT: u16 = 8502;

/// gRPC TLS port of a server agent
pub const SERVER_GRPC_TLS_PORT: u16 = 8503;

/// Default envoy public listener for the first workload of a dataplane
pub const DEFAULT_PUBLIC_LISTENER_PORT: u16 = 20000;

/// Role of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Server,
    Client,
    Dataplane,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Server => "server",
            NodeKind::Client => "client",
            NodeKind::Dataplane => "dataplane",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Catalog API generation a node speaks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeVersion {
    #[default]
    V1,
    V2,
}

/// Network segment of a client agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSegment {
    pub name: String,
    pub port: u16,
}

/// An internal port with no exposed counterpart after an apply
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("cluster {cluster:?} node {node} port {port} not found in exposed list")]
pub struct MissingExposedPort {
    pub cluster: String,
    pub node: NodeId,
    pub port: u16,
}

/// A logical machine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub kind: NodeKind,

    #[serde(default)]
    pub version: NodeVersion,

    #[serde(default)]
    pub partition: String,

    pub name: String,

    /// Overrides the cluster images
    #[serde(default, skip_serializing_if = "Images::is_empty")]
    pub images: Images,

    /// The sanctioned way to "remove" a node
    #[serde(default)]
    pub disabled: bool,

    #[serde(default)]
    pub addresses: Vec<Address>,

    #[serde(default, alias = "services")]
    pub workloads: Vec<Workload>,

    /// Denormalized at compile
    #[serde(default)]
    pub cluster: String,

    /// Denormalized at compile
    #[serde(default)]
    pub datacenter: String,

    /// Global node index, computed at compile
    #[serde(default)]
    pub index: usize,

    /// Server joining an existing cluster (autopilot upgrade)
    #[serde(default)]
    pub is_new_server: bool,

    /// Generated during the networks step
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_cert_prefix: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub meta: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub autopilot_config: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segment: Option<NetworkSegment>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_config: Option<String>,

    /// Computed at compile
    #[serde(default)]
    docker_name: String,

    /// Keys are internal ports from compile; values are host ports from the
    /// provisioner (0 until the first apply)
    #[serde(default)]
    used_ports: BTreeMap<u16, u16>,
}

impl Node {
    /// Create an enabled v1 node with no addresses or workloads
    pub fn new(kind: NodeKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            version: NodeVersion::V1,
            partition: String::new(),
            name: name.into(),
            images: Images::default(),
            disabled: false,
            addresses: Vec::new(),
            workloads: Vec::new(),
            cluster: String::new(),
            datacenter: String::new(),
            index: 0,
            is_new_server: false,
            tls_cert_prefix: None,
            meta: BTreeMap::new(),
            autopilot_config: BTreeMap::new(),
            segment: None,
            extra_config: None,
            docker_name: String::new(),
            used_ports: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> NodeId {
        NodeId::new(self.name.clone(), &self.partition)
    }

    /// Identity of the node entry in the catalog
    pub fn catalog_id(&self) -> NodeId {
        NodeId::new(self.pod_name(), &self.partition)
    }

    pub fn docker_name(&self) -> &str {
        &self.docker_name
    }

    pub(crate) fn set_docker_name(&mut self, name: String) {
        self.docker_name = name;
    }

    pub fn pod_name(&self) -> String {
        format!("{}-pod", self.docker_name)
    }

    pub fn is_v2(&self) -> bool {
        self.version == NodeVersion::V2
    }

    pub fn is_v1(&self) -> bool {
        !self.is_v2()
    }

    pub fn is_server(&self) -> bool {
        self.kind == NodeKind::Server
    }

    pub fn is_agent(&self) -> bool {
        matches!(self.kind, NodeKind::Server | NodeKind::Client)
    }

    pub fn is_dataplane(&self) -> bool {
        self.kind == NodeKind::Dataplane
    }

    pub fn runs_workloads(&self) -> bool {
        self.is_agent() || self.is_dataplane()
    }

    pub fn needs_transparent_proxy(&self) -> bool {
        self.workloads.iter().any(|w| w.enable_transparent_proxy)
    }

    pub fn address_by_network(&self, network: &str) -> Option<&Address> {
        self.addresses.iter().find(|a| a.network == network)
    }

    /// Assigned IP on the local network
    pub fn local_address(&self) -> Option<&str> {
        self.addresses
            .iter()
            .find(|a| a.is_local())
            .and_then(|a| a.ip_address.as_deref())
    }

    /// Assigned IP on the public network
    pub fn public_address(&self) -> Option<&str> {
        self.addresses
            .iter()
            .find(|a| a.is_public())
            .and_then(|a| a.ip_address.as_deref())
    }

    pub fn has_public_address(&self) -> bool {
        self.addresses.iter().any(Address::is_public)
    }

    pub fn local_proxy_port(&self) -> Option<u16> {
        self.addresses
            .iter()
            .find(|a| a.is_local())
            .and_then(|a| a.proxy_port)
    }

    pub fn public_proxy_port(&self) -> Option<u16> {
        self.addresses
            .iter()
            .find(|a| a.is_public())
            .and_then(|a| a.proxy_port)
    }

    /// Host port mapped to an internal port, once discovered
    pub fn exposed_port(&self, internal: u16) -> Option<u16> {
        match self.used_ports.get(&internal) {
            Some(&exposed) if exposed > 0 => Some(exposed),
            _ => None,
        }
    }

    pub fn used_ports(&self) -> &BTreeMap<u16, u16> {
        &self.used_ports
    }

    pub fn sorted_ports(&self) -> Vec<u16> {
        self.used_ports.keys().copied().collect()
    }

    /// Reserve an internal port. Returns `false` if it was already taken.
    pub(crate) fn reserve_port(&mut self, port: u16) -> bool {
        if self.used_ports.contains_key(&port) {
            return false;
        }
        self.used_ports.insert(port, 0);
        true
    }

    /// Workloads with mesh gateways last, then by identity
    pub fn sorted_workloads(&self) -> Vec<&Workload> {
        let mut out: Vec<&Workload> = self.workloads.iter().collect();
        out.sort_by(|a, b| {
            a.is_mesh_gateway
                .cmp(&b.is_mesh_gateway)
                .then_with(|| a.id.cmp(&b.id))
        });
        out
    }

    pub fn workload_by_id(&self, id: &WorkloadId) -> Option<&Workload> {
        let mut id = id.clone();
        id.normalize();
        self.workloads.iter().find(|w| w.id == id)
    }

    /// Record the host ports discovered for this node.
    ///
    /// Every reserved internal port must be present in `ports`. Returns
    /// `true` when anything changed.
    pub fn digest_exposed_ports(
        &mut self,
        ports: &BTreeMap<u16, u16>,
    ) -> Result<bool, MissingExposedPort> {
        if &self.used_ports == ports {
            return Ok(false);
        }

        let mut changed = false;
        for (internal, exposed) in self.used_ports.iter_mut() {
            let Some(&found) = ports.get(internal) else {
                return Err(MissingExposedPort {
                    cluster: self.cluster.clone(),
                    node: NodeId::new(self.name.clone(), &self.partition),
                    port: *internal,
                });
            };
            if *exposed != found {
                *exposed = found;
                changed = true;
            }
        }

        for wrk in &mut self.workloads {
            wrk.exposed_envoy_admin_port = wrk
                .envoy_admin_port
                .and_then(|admin| ports.get(&admin).copied());
        }
        Ok(changed)
    }

    /// Carry runtime-discovered facts forward from the previous compile.
    pub(crate) fn inherit_from(&mut self, existing: &Node) {
        self.tls_cert_prefix = existing.tls_cert_prefix.clone();

        let mut merged = existing.used_ports.clone();
        for (&port, &exposed) in &self.used_ports {
            merged.entry(port).or_insert(exposed);
        }
        self.used_ports = merged;
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.id().fmt(f)
    }
}
