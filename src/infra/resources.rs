// Copyright (c) 2025 - Cowboy AI, Inc.
//! Rendered infrastructure for one step
//!
//! Each step renders everything earlier steps rendered plus its own
//! additions: networks, then servers, then client agents, then dataplanes
//! and workload containers. Disabled nodes are never rendered, which is how
//! the provisioner learns to remove them.

use serde::Serialize;
use std::fmt;

use super::InfraResult;
use crate::domain::{Cluster, Node, NodeId, NodeKind, NodeVersion, Topology, Workload, WorkloadId};
use crate::secrets::{GenericSecret, SecretStore};
use crate::state_machine::Step;

/// A network to create
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkSpec {
    pub name: String,
    pub docker_name: String,
    pub subnet: String,
}

/// A node's attachment to a network
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddressSpec {
    pub network: String,
    pub ip: String,
    pub local: bool,
}

/// Agent process settings
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct AgentSettings {
    pub server: bool,
    pub datacenter: String,
    pub partition: String,
    pub gossip_key: Option<String>,
    pub recovery_token: Option<String>,
    pub agent_token: Option<String>,
    pub license: Option<String>,
    /// Local addresses of the cluster's enabled servers
    pub retry_join: Vec<String>,
    pub segment: Option<String>,
    pub extra_config: Option<String>,
}

impl fmt::Debug for AgentSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentSettings")
            .field("server", &self.server)
            .field("datacenter", &self.datacenter)
            .field("partition", &self.partition)
            .field("retry_join", &self.retry_join)
            .finish_non_exhaustive()
    }
}

/// One container of a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub command: Vec<String>,
    pub env: Vec<String>,
    /// Workload a proxy or gateway container fronts
    pub service: Option<WorkloadId>,
}

/// A node with its containers and the internal ports to expose
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeSpec {
    pub cluster: String,
    pub id: NodeId,
    pub kind: NodeKind,
    pub version: NodeVersion,
    pub docker_name: String,
    pub pod_name: String,
    pub addresses: Vec<AddressSpec>,
    pub ports: Vec<u16>,
    pub agent: Option<AgentSettings>,
    pub containers: Vec<ContainerSpec>,
}

impl NodeSpec {
    pub fn is_server(&self) -> bool {
        self.kind == NodeKind::Server
    }

    pub fn local_ip(&self) -> Option<&str> {
        self.addresses
            .iter()
            .find(|a| a.local)
            .map(|a| a.ip.as_str())
    }

    pub fn public_ip(&self) -> Option<&str> {
        self.addresses
            .iter()
            .find(|a| !a.local)
            .map(|a| a.ip.as_str())
    }

    /// Image of the agent container, if this node runs one
    pub fn agent_image(&self) -> Option<&str> {
        self.agent
            .as_ref()
            .and(self.containers.first())
            .map(|c| c.image.as_str())
    }
}

/// Everything a provisioner must converge to for one step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceSet {
    pub topology_id: String,
    pub step: Step,
    pub networks: Vec<NetworkSpec>,
    /// Per-cluster TLS volumes
    pub volumes: Vec<String>,
    pub nodes: Vec<NodeSpec>,
}

impl ResourceSet {
    /// Render the topology for `step`.
    ///
    /// Networks must already have subnets and nodes their addresses.
    pub fn render(
        topology: &Topology,
        secrets: &SecretStore,
        step: Step,
        license: Option<&str>,
    ) -> InfraResult<Self> {
        let mut networks = Vec::new();
        for net in topology.sorted_networks() {
            let subnet = net
                .subnet
                .clone()
                .ok_or_else(|| super::InfraError::NoIpPool(net.name.clone()))?;
            networks.push(NetworkSpec {
                name: net.name.clone(),
                docker_name: net.docker_name.clone(),
                subnet,
            });
        }

        let mut volumes = Vec::new();
        let mut nodes = Vec::new();
        for cluster in topology.sorted_clusters() {
            volumes.extend(cluster.tls_volume_name.clone());
            for node in cluster.sorted_nodes() {
                if node.disabled || !renders_at(node.kind, step) {
                    continue;
                }
                nodes.push(render_node(cluster, node, secrets, step, license));
            }
        }

        Ok(Self {
            topology_id: topology.id.clone(),
            step,
            networks,
            volumes,
            nodes,
        })
    }

    pub fn node(&self, cluster: &str, id: &NodeId) -> Option<&NodeSpec> {
        self.nodes
            .iter()
            .find(|n| n.cluster == cluster && &n.id == id)
    }
}

fn renders_at(kind: NodeKind, step: Step) -> bool {
    match kind {
        NodeKind::Server => step.starts_servers(),
        NodeKind::Client => step.starts_agents(),
        NodeKind::Dataplane => step.starts_services(),
    }
}

fn render_node(
    cluster: &Cluster,
    node: &Node,
    secrets: &SecretStore,
    step: Step,
    license: Option<&str>,
) -> NodeSpec {
    let addresses = node
        .addresses
        .iter()
        .filter_map(|a| {
            a.ip_address.as_ref().map(|ip| AddressSpec {
                network: a.network.clone(),
                ip: ip.clone(),
                local: a.is_local(),
            })
        })
        .collect();

    let agent = node
        .is_agent()
        .then(|| agent_settings(cluster, node, secrets, license));

    let mut containers = Vec::new();
    if node.is_agent() {
        containers.push(ContainerSpec {
            name: format!("{}-agent", node.docker_name()),
            image: node.images.agent.clone(),
            command: Vec::new(),
            env: Vec::new(),
            service: None,
        });
    }
    if step.starts_services() {
        for wrk in node.sorted_workloads() {
            let token = secrets.read_workload_token(&cluster.name, &wrk.id);
            containers.extend(workload_containers(node, wrk, token));
        }
    }

    NodeSpec {
        cluster: cluster.name.clone(),
        id: node.id(),
        kind: node.kind,
        version: node.version,
        docker_name: node.docker_name().to_string(),
        pod_name: node.pod_name(),
        addresses,
        ports: node.sorted_ports(),
        agent,
        containers,
    }
}

fn agent_settings(
    cluster: &Cluster,
    node: &Node,
    secrets: &SecretStore,
    license: Option<&str>,
) -> AgentSettings {
    let bootstrap = secrets.read_generic(&cluster.name, GenericSecret::BootstrapToken);
    let agent_token = secrets
        .read_agent_token(&cluster.name, &node.id())
        .or_else(|| if node.is_server() { bootstrap } else { None });

    AgentSettings {
        server: node.is_server(),
        datacenter: cluster.datacenter.clone(),
        partition: node.partition.clone(),
        gossip_key: secrets.read_generic(&cluster.name, GenericSecret::GossipKey),
        recovery_token: secrets.read_generic(&cluster.name, GenericSecret::AgentRecovery),
        agent_token,
        license: cluster.enterprise.then(|| license.map(str::to_string)).flatten(),
        retry_join: cluster
            .server_nodes()
            .iter()
            .filter_map(|s| s.local_address().map(str::to_string))
            .collect(),
        segment: node.segment.as_ref().map(|s| s.name.clone()),
        extra_config: node.extra_config.clone(),
    }
}

fn workload_containers(node: &Node, wrk: &Workload, token: Option<String>) -> Vec<ContainerSpec> {
    let base = format!("{}-{}", node.docker_name(), wrk.id.tf_string());
    let mut out = Vec::new();

    if !wrk.is_mesh_gateway {
        out.push(ContainerSpec {
            name: base.clone(),
            image: wrk.image.clone().unwrap_or_default(),
            command: wrk.command.clone(),
            env: wrk.env.clone(),
            service: None,
        });
    }

    if wrk.is_mesh_enabled() {
        let (image, token_env) = if node.is_dataplane() {
            (node.images.dataplane.clone(), "DP_CREDENTIAL_STATIC_TOKEN")
        } else {
            (node.images.envoy.clone(), "CONSUL_HTTP_TOKEN")
        };
        let suffix = if wrk.is_mesh_gateway { "gateway" } else { "sidecar" };
        out.push(ContainerSpec {
            name: format!("{base}-{suffix}"),
            image,
            command: Vec::new(),
            env: token
                .map(|t| vec![format!("{token_env}={t}")])
                .unwrap_or_default(),
            service: Some(wrk.id.clone()),
        });
    }
    out
}
