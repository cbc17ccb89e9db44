// Copyright (c) 2025 - Cowboy AI, Inc.
//! Workloads, Ports and Destinations
//!
//! A workload is a deployable unit running on a node. v1 workloads expose a
//! single `port`; v2 workloads expose named `ports`. A v1-style port on a v2
//! node is rewritten to a port named `"legacy"`.
//!
//! Fields marked "compiler owned" are filled in by the topology compiler and
//! are ignored (or rejected) when present in user config.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::ids::{NodeId, WorkloadId};
use super::invariants::{self, ValidationResult};
use super::node::NodeVersion;
use super::peering::PeerCluster;

/// Name given to the single port of a v1-style workload on a v2 node
pub const LEGACY_PORT_NAME: &str = "legacy";

/// Name of the mesh port added to mesh-enabled v2 workloads
pub const MESH_PORT_NAME: &str = "mesh";

/// Default local bind address for explicit destinations
pub const DEFAULT_LOCAL_ADDRESS: &str = "127.0.0.1";

/// Application protocol of a named port
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Tcp,
    Http,
    Http2,
    Grpc,
    Mesh,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Http => "http",
            Protocol::Http2 => "http2",
            Protocol::Grpc => "grpc",
            Protocol::Mesh => "mesh",
        }
    }
}

/// A named workload port
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Port {
    pub number: u16,
    #[serde(default)]
    pub protocol: Protocol,
}

impl Port {
    pub fn new(number: u16, protocol: Protocol) -> Self {
        Self { number, protocol }
    }
}

/// A workload's dependency on another workload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Destination {
    pub id: WorkloadId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_address: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_port: Option<u16>,

    /// Local peer name when the target lives in a peered cluster
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer: Option<String>,

    /// Target port name (v2 only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port_name: Option<String>,

    /// Cluster the destination is declared in. Compiler owned.
    #[serde(default)]
    pub cluster: String,

    /// Resolved peering link. Compiler owned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peering: Option<PeerCluster>,

    /// Set on implied destinations. Compiler owned.
    #[serde(default)]
    pub implied: bool,

    /// Virtual port of the target service port (v2). Compiler owned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub virtual_port: Option<u16>,
}

impl Destination {
    /// Explicit destination bound to a local port
    pub fn to(id: WorkloadId, local_port: u16) -> Self {
        Self {
            id,
            local_port: Some(local_port),
            ..Default::default()
        }
    }

    /// Same destination reached through a peering
    pub fn via_peer(mut self, peer: impl Into<String>) -> Self {
        self.peer = Some(peer.into());
        self
    }
}

/// A deployable unit (a.k.a. service) running on a node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Workload {
    pub id: WorkloadId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Single port (v1 style)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Named ports (v2 style)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub ports: BTreeMap<String, Port>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub envoy_admin_port: Option<u16>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub envoy_public_listener_port: Option<u16>,

    /// Discovered host port for the admin port
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exposed_envoy_admin_port: Option<u16>,

    #[serde(default)]
    pub disable_service_mesh: bool,

    #[serde(default)]
    pub is_mesh_gateway: bool,

    #[serde(default)]
    pub enable_transparent_proxy: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_http: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_tcp: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub meta: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<String>,

    /// v2 identity; defaults to the workload name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workload_identity: Option<String>,

    /// Explicit v2 service membership
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub v2_services: Vec<String>,

    #[serde(default, alias = "upstreams", skip_serializing_if = "Vec::is_empty")]
    pub destinations: Vec<Destination>,

    #[serde(default, alias = "implied_upstreams", skip_serializing_if = "Vec::is_empty")]
    pub implied_destinations: Vec<Destination>,

    /// Hosting node. Compiler owned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node: Option<NodeId>,

    /// Hosting node's version. Compiler owned.
    #[serde(default)]
    pub node_version: NodeVersion,

    /// v2 workload-instance name. Compiler owned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workload: Option<String>,
}

impl Workload {
    /// Workload with an image and a single port
    pub fn new(id: WorkloadId, image: impl Into<String>, port: u16) -> Self {
        Self {
            id,
            image: Some(image.into()),
            port: Some(port),
            ..Default::default()
        }
    }

    pub fn is_v2(&self) -> bool {
        self.node_version == NodeVersion::V2
    }

    pub fn is_v1(&self) -> bool {
        !self.is_v2()
    }

    pub fn is_mesh_enabled(&self) -> bool {
        !self.disable_service_mesh
    }

    pub fn has_check(&self) -> bool {
        self.check_tcp.is_some() || self.check_http.is_some()
    }

    /// Identity used by v2 ACL templates
    pub fn identity_name(&self) -> &str {
        self.workload_identity.as_deref().unwrap_or(&self.id.name)
    }

    /// Internal port for a named port, or the single port when unnamed
    pub fn port_or_default(&self, name: &str) -> Option<u16> {
        if self.ports.is_empty() {
            self.port
        } else {
            self.ports.get(name).map(|p| p.number)
        }
    }

    /// Catalog name of the sidecar proxy
    pub fn sidecar_name(&self) -> String {
        format!("{}-sidecar-proxy", self.id.name)
    }

    /// All destinations, explicit first
    pub fn all_destinations(&self) -> impl Iterator<Item = &Destination> {
        self.destinations
            .iter()
            .chain(self.implied_destinations.iter())
    }

    pub(crate) fn all_destinations_mut(&mut self) -> impl Iterator<Item = &mut Destination> {
        self.destinations
            .iter_mut()
            .chain(self.implied_destinations.iter_mut())
    }

    /// Internal ports this workload reserves on its node.
    ///
    /// A named port may repeat another port number; the synthetic mesh port
    /// is covered by the public listener port.
    pub fn used_ports(&self) -> Vec<u16> {
        let mut out = Vec::new();
        if self.ports.is_empty() {
            out.extend(self.port);
        } else {
            let mut seen = BTreeSet::new();
            for port in self.ports.values() {
                if port.protocol == Protocol::Mesh {
                    continue;
                }
                if seen.insert(port.number) {
                    out.push(port.number);
                }
            }
        }
        out.extend(self.envoy_admin_port);
        out.extend(self.envoy_public_listener_port);
        out.extend(self.destinations.iter().filter_map(|d| d.local_port));
        out
    }

    /// Apply version-specific port defaults, then check workload invariants.
    ///
    /// On v2 a single `port` becomes the `"legacy"` named port, and a
    /// mesh-enabled workload with a public listener gains a `"mesh"` port.
    pub fn validate(&mut self) -> ValidationResult {
        if self.is_v2() {
            if self.port.is_some() && !self.ports.is_empty() {
                return Err(invariants::ValidationError::MixedPortStyles);
            }
            if let Some(number) = self.port.take() {
                self.ports
                    .insert(LEGACY_PORT_NAME.to_string(), Port::new(number, Protocol::Tcp));
            }
            if self.is_mesh_enabled() {
                if let Some(number) = self.envoy_public_listener_port {
                    self.ports
                        .insert(MESH_PORT_NAME.to_string(), Port::new(number, Protocol::Mesh));
                }
            }
        }

        invariants::validate_workload(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn v2_workload() -> Workload {
        let mut wrk = Workload::new(WorkloadId::new("ping", "", ""), "fortio", 8080);
        wrk.node_version = NodeVersion::V2;
        wrk.envoy_admin_port = Some(19000);
        wrk.envoy_public_listener_port = Some(20000);
        wrk
    }

    #[test]
    fn test_v2_single_port_becomes_legacy() {
        let mut wrk = v2_workload();
        wrk.validate().unwrap();

        assert_eq!(wrk.port, None);
        assert_eq!(
            wrk.ports.get(LEGACY_PORT_NAME),
            Some(&Port::new(8080, Protocol::Tcp))
        );
        assert_eq!(
            wrk.ports.get(MESH_PORT_NAME),
            Some(&Port::new(20000, Protocol::Mesh))
        );
    }

    #[test]
    fn test_used_ports_skip_mesh_port() {
        let mut wrk = v2_workload();
        wrk.destinations.push(Destination::to(WorkloadId::new("pong", "", ""), 5000));
        wrk.validate().unwrap();

        assert_eq!(wrk.used_ports(), vec![8080, 19000, 20000, 5000]);
    }

    #[test]
    fn test_used_ports_dedupe_named_ports() {
        let mut wrk = v2_workload();
        wrk.port = None;
        wrk.ports.insert("http".into(), Port::new(8080, Protocol::Http));
        wrk.ports.insert("grpc".into(), Port::new(8080, Protocol::Grpc));
        wrk.validate().unwrap();

        assert_eq!(wrk.used_ports(), vec![8080, 19000, 20000]);
    }

    #[test]
    fn test_mixed_port_styles_rejected() {
        let mut wrk = v2_workload();
        wrk.ports.insert("http".into(), Port::new(8081, Protocol::Http));
        assert_eq!(
            wrk.validate(),
            Err(invariants::ValidationError::MixedPortStyles)
        );
    }

    #[test]
    fn test_upstreams_alias() {
        let json = r#"{
            "id": {"name": "ping"},
            "image": "fortio",
            "port": 8080,
            "upstreams": [{"id": {"name": "pong"}, "local_port": 5000}]
        }"#;
        let wrk: Workload = serde_json::from_str(json).unwrap();
        assert_eq!(wrk.destinations.len(), 1);
        assert_eq!(wrk.destinations[0].local_port, Some(5000));
    }
}
