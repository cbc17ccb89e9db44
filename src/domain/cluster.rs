// Copyright (c) 2025 - Cowboy AI, Inc.
//! Clusters
//!
//! One independent consensus deployment. After compile, `partitions` is the
//! sorted tenancy closure of everything the cluster references, and
//! `peerings` maps each local peer name to this cluster's side of a peering.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::ids::{NodeId, WorkloadId, DEFAULT_NAMESPACE, DEFAULT_PARTITION};
use super::images::Images;
use super::node::{Node, NodeKind, AGENT_HTTP_PORT};
use super::peering::PeerCluster;
use super::resource::{ConfigEntry, Partition, Resource, V2Service};
use super::workload::Workload;

/// One consensus cluster
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    pub name: String,

    /// Defaults to `name`
    #[serde(default)]
    pub network_name: String,

    /// Overrides the topology images
    #[serde(default, skip_serializing_if = "Images::is_empty")]
    pub images: Images,

    #[serde(default)]
    pub enterprise: bool,

    /// Forward-declared v2 services. When empty, services are inferred from
    /// the workloads on v2 nodes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub services: Vec<V2Service>,

    #[serde(default)]
    pub nodes: Vec<Node>,

    /// Declared tenancy; replaced by the computed closure at compile
    #[serde(default)]
    pub partitions: Vec<Partition>,

    /// Defaults to `name`
    #[serde(default)]
    pub datacenter: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub initial_config_entries: Vec<ConfigEntry>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub initial_resources: Vec<Resource>,

    /// Volume holding generated TLS material. Set during the networks step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_volume_name: Option<String>,

    /// Local peer name to this cluster's side of the peering. Compiler owned.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub peerings: BTreeMap<String, PeerCluster>,

    /// Turned on automatically when any node or seed resource needs v2
    #[serde(default)]
    pub enable_v2: bool,

    /// Run v2 resources with v2 tenancy instead of bridging to v1 tenancy
    #[serde(default)]
    pub enable_v2_tenancy: bool,

    /// Network segment name to serf port
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub segments: BTreeMap<String, u16>,

    #[serde(default)]
    pub disable_gossip_encryption: bool,
}

impl Cluster {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn has_partition(&self, partition: &str) -> bool {
        self.partitions.iter().any(|p| p.name == partition)
    }

    /// Partition scope for per-partition queries. CE clusters query once
    /// with no partition.
    pub fn partition_query_list(&self) -> Vec<Option<&str>> {
        if !self.enterprise {
            return vec![None];
        }
        self.partitions.iter().map(|p| Some(p.name.as_str())).collect()
    }

    pub fn partition_names(&self) -> Vec<&str> {
        self.partitions.iter().map(|p| p.name.as_str()).collect()
    }

    pub fn namespaces_in(&self, partition: &str) -> Vec<&str> {
        self.partitions
            .iter()
            .filter(|p| p.name == partition)
            .flat_map(|p| p.namespaces.iter().map(String::as_str))
            .collect()
    }

    /// Enabled servers, excluding servers that are joining as new servers
    pub fn server_nodes(&self) -> Vec<&Node> {
        self.sorted_nodes()
            .into_iter()
            .filter(|n| n.kind == NodeKind::Server && !n.disabled && !n.is_new_server)
            .collect()
    }

    /// Enabled server whose local address matches `addr` (`ip:port`)
    pub fn server_by_addr(&self, addr: &str) -> Option<&Node> {
        let (ip, _) = addr.rsplit_once(':')?;
        self.nodes
            .iter()
            .filter(|n| n.is_server() && !n.disabled)
            .find(|n| n.local_address() == Some(ip))
    }

    /// First enabled server with a reachable API port
    pub fn first_server(&self) -> Option<&Node> {
        self.nodes
            .iter()
            .find(|n| n.is_server() && !n.disabled && n.exposed_port(AGENT_HTTP_PORT).is_some())
    }

    pub fn first_client(&self) -> Option<&Node> {
        self.nodes
            .iter()
            .find(|n| n.kind == NodeKind::Client && !n.disabled)
    }

    pub fn active_nodes(&self) -> Vec<&Node> {
        self.nodes.iter().filter(|n| !n.disabled).collect()
    }

    /// Servers first, then by partition, then by name
    pub fn sorted_nodes(&self) -> Vec<&Node> {
        fn kind_order(kind: NodeKind) -> u8 {
            match kind {
                NodeKind::Server => 1,
                NodeKind::Client | NodeKind::Dataplane => 2,
            }
        }

        let mut out: Vec<&Node> = self.nodes.iter().collect();
        out.sort_by(|a, b| {
            kind_order(a.kind)
                .cmp(&kind_order(b.kind))
                .then_with(|| a.partition.cmp(&b.partition))
                .then_with(|| a.name.cmp(&b.name))
        });
        out
    }

    pub fn node_by_id(&self, id: &NodeId) -> Option<&Node> {
        let mut id = id.clone();
        id.normalize();
        self.nodes.iter().find(|n| n.id() == id)
    }

    pub fn node_by_id_mut(&mut self, id: &NodeId) -> Option<&mut Node> {
        let mut id = id.clone();
        id.normalize();
        self.nodes.iter_mut().find(|n| n.id() == id)
    }

    pub fn workload_by_id(&self, node: &NodeId, id: &WorkloadId) -> Option<&Workload> {
        self.node_by_id(node)?.workload_by_id(id)
    }

    /// Every instance of a workload across the cluster's nodes
    pub fn workloads_by_id(&self, id: &WorkloadId) -> Vec<&Workload> {
        let mut id = id.clone();
        id.normalize();
        self.nodes
            .iter()
            .flat_map(|n| n.workloads.iter())
            .filter(|w| w.id == id)
            .collect()
    }

    pub fn v2_service(&self, id: &WorkloadId) -> Option<&V2Service> {
        self.services.iter().find(|s| &s.id == id)
    }

    /// Is this the expected tenancy of a CE cluster?
    pub(crate) fn has_only_default_tenancy(&self) -> bool {
        self.partitions.len() == 1
            && self.partitions[0].name == DEFAULT_PARTITION
            && self.partitions[0].namespaces == [DEFAULT_NAMESPACE]
    }

    pub(crate) fn inherit_from(&mut self, existing: &Cluster) {
        self.tls_volume_name = existing.tls_volume_name.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::network::Address;
    use std::collections::BTreeMap;

    fn server(name: &str, ip: &str) -> Node {
        let mut node = Node::new(NodeKind::Server, name);
        let mut addr = Address::on("dc1");
        addr.ip_address = Some(ip.into());
        node.addresses.push(addr);
        node.reserve_port(AGENT_HTTP_PORT);
        node
    }

    fn cluster() -> Cluster {
        let mut c = Cluster::new("dc1");
        c.nodes.push(Node::new(NodeKind::Client, "a-client"));
        c.nodes.push(server("s2", "10.0.0.3"));
        c.nodes.push(server("s1", "10.0.0.2"));
        c
    }

    #[test]
    fn test_sorted_nodes_puts_servers_first() {
        let c = cluster();
        let names: Vec<&str> = c.sorted_nodes().iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["s1", "s2", "a-client"]);
    }

    #[test]
    fn test_server_by_addr() {
        let c = cluster();
        assert_eq!(c.server_by_addr("10.0.0.3:8300").map(|n| n.name.as_str()), Some("s2"));
        assert!(c.server_by_addr("10.0.0.9:8300").is_none());
        assert!(c.server_by_addr("garbage").is_none());
    }

    #[test]
    fn test_first_server_needs_exposed_api() {
        let mut c = cluster();
        assert!(c.first_server().is_none());

        c.nodes[1]
            .digest_exposed_ports(&BTreeMap::from([(AGENT_HTTP_PORT, 32000)]))
            .unwrap();
        assert_eq!(c.first_server().map(|n| n.name.as_str()), Some("s2"));
    }

    #[test]
    fn test_server_nodes_skip_new_and_disabled() {
        let mut c = cluster();
        c.nodes[1].is_new_server = true;
        let names: Vec<&str> = c.server_nodes().iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["s1"]);

        c.nodes[2].disabled = true;
        assert!(c.server_nodes().is_empty());
    }

    #[test]
    fn test_partition_query_list() {
        let mut c = cluster();
        c.partitions = vec![
            Partition { name: "ap1".into(), namespaces: vec!["default".into()] },
            Partition { name: "default".into(), namespaces: vec!["default".into(), "ns1".into()] },
        ];
        assert_eq!(c.partition_query_list(), vec![None]);

        c.enterprise = true;
        assert_eq!(c.partition_query_list(), vec![Some("ap1"), Some("default")]);
        assert_eq!(c.namespaces_in("default"), vec!["default", "ns1"]);
        assert!(!c.has_only_default_tenancy());
    }
}
