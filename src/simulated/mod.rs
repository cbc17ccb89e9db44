// Copyright (c) 2025 - Cowboy AI, Inc.
//! In-Process Simulated Backend
//!
//! [`SimulatedWorld`] stands in for both the container runtime and the
//! control plane, so a whole launch can run without Docker:
//!
//! ```text
//! Generator ──apply──▶ SimulatedWorld ◀──connect── Sprawl
//!                           │
//!                           ├── running nodes, host ports
//!                           ├── per-cluster ACL, catalog, KV
//!                           └── peerings, network areas
//! ```
//!
//! It behaves like a small but strict cluster: ACL endpoints refuse to
//! answer before bootstrap, unknown tokens are rejected, writes need a
//! leader, and the leader moves to the newest server image the way
//! autopilot upgrade migration does. [`Fault`]s inject the transient
//! errors the orchestrator is expected to ride out.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

use crate::api::{
    kind, AclPolicy, AclToken, AgentServiceCheck, AgentServiceRegistration, ApiTarget,
    CatalogNode, ControlPlane, ControlPlaneConnector, PeeringInfo, PeeringState,
};
use crate::api::{ApiError, ApiResult, ErrorKind, Namespace};
use crate::domain::{partition_or_default, ConfigEntry, NodeId, Resource, ResourceId};
use crate::infra::{ApplyOutputs, InfraResult, NodeSpec, Provisioner, ResourceSet};
use crate::state_machine::Step;

mod client;
pub mod cluster;

pub use client::SimulatedClient;
pub use cluster::{CatalogView, ServiceInstance};

use cluster::SimCluster;

/// Port the simulated forward proxies listen on inside their network
const PROXY_INTERNAL_PORT: u16 = 3128;
const FIRST_HOST_PORT: u16 = 30000;
const SERVER_RPC_PORT: u16 = 8300;
const MESH_GATEWAY_PORT: u16 = 8443;

/// A transient failure the simulation can be told to produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Fault {
    /// ACL bootstrap and policy reads answer as if servers were still electing
    BootstrapPending,
    /// Resource and catalog writes report a token that has not propagated
    AclNotFound,
    /// Config entry writes hit the intentions migration window
    IntentionsMigrating,
    /// Resource deletes lose a write race
    DeleteConflict,
    /// Peering calls time out at the gateway
    PeeringTimeout,
}

#[derive(Debug, Default)]
pub(crate) struct Faults(BTreeMap<Fault, u32>);

impl Faults {
    /// Consume one pending occurrence of `fault`
    pub(crate) fn take(&mut self, fault: Fault) -> bool {
        match self.0.get_mut(&fault) {
            Some(n) if *n > 0 => {
                *n -= 1;
                true
            }
            _ => false,
        }
    }

    pub(crate) fn raise(&mut self, fault: Fault) -> ApiResult<()> {
        if !self.take(fault) {
            return Ok(());
        }
        Err(match fault {
            Fault::BootstrapPending => ApiError::new(
                ErrorKind::NotBootstrapped,
                "The ACL system is currently in legacy mode",
            ),
            Fault::AclNotFound => ApiError::new(ErrorKind::AclNotFound, "ACL not found").with_status(403),
            Fault::IntentionsMigrating => ApiError::new(
                ErrorKind::IntentionsMigrating,
                "Intentions are read only while being upgraded to config entries",
            )
            .with_status(500),
            Fault::DeleteConflict => ApiError::new(ErrorKind::Conflict, "version mismatch").with_status(409),
            Fault::PeeringTimeout => {
                ApiError::new(ErrorKind::GatewayTimeout, "gateway timeout").with_status(504)
            }
        })
    }
}

#[derive(Debug, Clone)]
pub(crate) struct PendingPeering {
    cluster: String,
    partition: String,
    peer_name: String,
}

#[derive(Debug)]
pub(crate) struct WorldState {
    pub(crate) clusters: BTreeMap<String, SimCluster>,
    pub(crate) running: BTreeMap<(String, NodeId), NodeSpec>,
    host_ports: BTreeMap<(String, u16), u16>,
    next_port: u16,
    steps: Vec<Step>,
    pending_peerings: BTreeMap<String, PendingPeering>,
    pub(crate) faults: Faults,
}

impl Default for WorldState {
    fn default() -> Self {
        Self {
            clusters: BTreeMap::new(),
            running: BTreeMap::new(),
            host_ports: BTreeMap::new(),
            next_port: FIRST_HOST_PORT,
            steps: Vec::new(),
            pending_peerings: BTreeMap::new(),
            faults: Faults::default(),
        }
    }
}

impl WorldState {
    /// Host ports stay stable for a container across applies
    fn host_port(&mut self, docker_name: &str, internal: u16) -> u16 {
        let key = (docker_name.to_string(), internal);
        if let Some(&port) = self.host_ports.get(&key) {
            return port;
        }
        let port = self.next_port;
        self.next_port += 1;
        self.host_ports.insert(key, port);
        port
    }

    /// The leader stays put unless it stopped or an enabled server runs a
    /// newer image, in which case leadership moves to the first such server.
    fn elect_leaders(&mut self) {
        for (name, cluster) in &mut self.clusters {
            let servers: Vec<(String, &str)> = self
                .running
                .values()
                .filter(|n| &n.cluster == name && n.is_server())
                .filter_map(|n| {
                    let ip = n.local_ip()?;
                    Some((format!("{ip}:{SERVER_RPC_PORT}"), n.agent_image().unwrap_or_default()))
                })
                .collect();

            cluster.voters = servers.iter().map(|(addr, _)| addr.clone()).collect();
            let newest = servers.iter().map(|(_, image)| *image).max();
            let keep = cluster
                .leader
                .as_ref()
                .and_then(|leader| servers.iter().find(|(addr, _)| addr == leader))
                .is_some_and(|(_, image)| Some(*image) == newest);
            if keep {
                continue;
            }

            let next = servers
                .iter()
                .find(|(_, image)| Some(*image) == newest)
                .map(|(addr, _)| addr.clone());
            if next != cluster.leader {
                debug!(cluster = %name, leader = ?next, "leader changed");
            }
            cluster.leader = next;
        }
    }

    /// Agents register their own catalog node, and agent-hosted mesh
    /// gateways register themselves once they start.
    fn self_register(&mut self) {
        for node in self.running.values() {
            if node.agent.is_none() {
                continue;
            }
            let Some(cluster) = self.clusters.get_mut(&node.cluster) else {
                continue;
            };
            if cluster.leader.is_none() {
                continue;
            }
            let Some(local) = node.local_ip() else {
                continue;
            };

            let mut tagged = BTreeMap::new();
            tagged.insert("lan".to_string(), local.to_string());
            tagged.insert("lan_ipv4".to_string(), local.to_string());
            if let Some(public) = node.public_ip() {
                tagged.insert("wan".to_string(), public.to_string());
                tagged.insert("wan_ipv4".to_string(), public.to_string());
            }
            cluster.agent_self_register(CatalogNode {
                node: node.pod_name.clone(),
                address: local.to_string(),
                tagged_addresses: tagged,
                meta: BTreeMap::new(),
                partition: node.id.partition.clone(),
            });

            for container in &node.containers {
                let Some(wrk) = &container.service else {
                    continue;
                };
                if !container.name.ends_with("-gateway") {
                    continue;
                }
                let reg = AgentServiceRegistration {
                    kind: kind::MESH_GATEWAY.to_string(),
                    id: wrk.name.clone(),
                    name: wrk.name.clone(),
                    port: Some(MESH_GATEWAY_PORT),
                    namespace: wrk.namespace.clone(),
                    partition: wrk.partition.clone(),
                    checks: vec![AgentServiceCheck {
                        name: "Mesh Gateway Listening".to_string(),
                        tcp: format!("{local}:{MESH_GATEWAY_PORT}"),
                        interval: "10s".to_string(),
                        ..Default::default()
                    }],
                    ..Default::default()
                };
                cluster.insert_agent_service(
                    &node.pod_name,
                    partition_or_default(&wrk.partition),
                    local,
                    &reg,
                );
            }
        }
    }

    fn generate_peering_token(
        &mut self,
        cluster: &str,
        partition: &str,
        peer_name: &str,
    ) -> ApiResult<String> {
        let token = uuid::Uuid::new_v4().to_string();
        let partition = partition_or_default(partition).to_string();
        let sim = self
            .clusters
            .get_mut(cluster)
            .ok_or_else(|| ApiError::not_found(format!("no cluster {cluster:?}")))?;
        sim.peerings.insert(
            (partition.clone(), peer_name.to_string()),
            PeeringInfo {
                name: peer_name.to_string(),
                state: PeeringState::Pending,
                partition: partition.clone(),
            },
        );
        self.pending_peerings.insert(
            token.clone(),
            PendingPeering {
                cluster: cluster.to_string(),
                partition,
                peer_name: peer_name.to_string(),
            },
        );
        Ok(token)
    }

    fn establish_peering(
        &mut self,
        cluster: &str,
        partition: &str,
        peer_name: &str,
        token: &str,
    ) -> ApiResult<()> {
        let pending = self.pending_peerings.get(token).cloned().ok_or_else(|| {
            ApiError::new(ErrorKind::Invalid, "peering token is invalid").with_status(400)
        })?;
        let partition = partition_or_default(partition).to_string();

        let dialer = self
            .clusters
            .get_mut(cluster)
            .ok_or_else(|| ApiError::not_found(format!("no cluster {cluster:?}")))?;
        dialer.peerings.insert(
            (partition.clone(), peer_name.to_string()),
            PeeringInfo {
                name: peer_name.to_string(),
                state: PeeringState::Active,
                partition,
            },
        );

        if let Some(info) = self
            .clusters
            .get_mut(&pending.cluster)
            .and_then(|c| c.peerings.get_mut(&(pending.partition.clone(), pending.peer_name.clone())))
        {
            info.state = PeeringState::Active;
        }
        Ok(())
    }
}

/// The simulated infrastructure and control plane
///
/// Cloning shares the same world.
#[derive(Debug, Clone, Default)]
pub struct SimulatedWorld {
    state: Arc<Mutex<WorldState>>,
}

impl SimulatedWorld {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, WorldState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make the next `times` occurrences of an operation fail with `fault`
    pub fn inject(&self, fault: Fault, times: u32) {
        *self.lock().faults.0.entry(fault).or_default() += times;
    }

    /// Steps applied so far, in order
    pub fn applied_steps(&self) -> Vec<Step> {
        self.lock().steps.clone()
    }

    pub fn is_running(&self, cluster: &str, node: &NodeId) -> bool {
        self.lock()
            .running
            .contains_key(&(cluster.to_string(), node.clone()))
    }

    /// Image the node's agent container currently runs
    pub fn agent_image(&self, cluster: &str, node: &NodeId) -> Option<String> {
        self.lock()
            .running
            .get(&(cluster.to_string(), node.clone()))
            .and_then(|n| n.agent_image().map(str::to_string))
    }

    pub fn leader(&self, cluster: &str) -> Option<String> {
        self.lock()
            .clusters
            .get(cluster)
            .and_then(|c| c.leader.clone())
    }

    pub fn catalog(&self, cluster: &str) -> CatalogView {
        self.lock()
            .clusters
            .get(cluster)
            .map(SimCluster::view)
            .unwrap_or_default()
    }

    pub fn resource(&self, cluster: &str, id: &ResourceId) -> Option<Resource> {
        self.lock()
            .clusters
            .get(cluster)
            .and_then(|c| c.resource(id).cloned())
    }

    pub fn config_entries(&self, cluster: &str) -> Vec<ConfigEntry> {
        self.lock()
            .clusters
            .get(cluster)
            .map(SimCluster::config_entries)
            .unwrap_or_default()
    }

    pub fn tokens(&self, cluster: &str) -> Vec<AclToken> {
        self.lock()
            .clusters
            .get(cluster)
            .map(SimCluster::tokens)
            .unwrap_or_default()
    }

    pub fn policies(&self, cluster: &str) -> Vec<AclPolicy> {
        self.lock()
            .clusters
            .get(cluster)
            .map(SimCluster::policies)
            .unwrap_or_default()
    }

    pub fn namespaces(&self, cluster: &str) -> Vec<Namespace> {
        self.lock()
            .clusters
            .get(cluster)
            .map(SimCluster::namespaces)
            .unwrap_or_default()
    }

    pub fn kv_len(&self, cluster: &str) -> usize {
        self.lock()
            .clusters
            .get(cluster)
            .map(SimCluster::kv_len)
            .unwrap_or_default()
    }

    /// Injected occurrences of `fault` not yet raised
    pub fn pending_faults(&self, fault: Fault) -> u32 {
        self.lock().faults.0.get(&fault).copied().unwrap_or_default()
    }

    pub fn snapshot_restores(&self, cluster: &str) -> usize {
        self.lock()
            .clusters
            .get(cluster)
            .map(|c| c.restores)
            .unwrap_or_default()
    }

    /// Addresses the cluster's agents were asked to join
    pub fn joins(&self, cluster: &str) -> Vec<String> {
        self.lock()
            .clusters
            .get(cluster)
            .map(|c| c.joins.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn peering(&self, cluster: &str, partition: &str, name: &str) -> Option<PeeringInfo> {
        self.lock().clusters.get(cluster).and_then(|c| {
            c.peerings
                .get(&(partition_or_default(partition).to_string(), name.to_string()))
                .cloned()
        })
    }

    /// Areas created in a cluster, with the addresses joined to each
    pub fn network_areas(&self, cluster: &str) -> Vec<(String, Vec<String>)> {
        self.lock()
            .clusters
            .get(cluster)
            .map(|c| {
                c.areas
                    .values()
                    .map(|(spec, joined)| (spec.peer_datacenter.clone(), joined.iter().cloned().collect()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub(crate) fn generate_peering_token(
        &self,
        cluster: &str,
        partition: &str,
        peer_name: &str,
    ) -> ApiResult<String> {
        self.lock()
            .generate_peering_token(cluster, partition, peer_name)
    }

    pub(crate) fn establish_peering(
        &self,
        cluster: &str,
        partition: &str,
        peer_name: &str,
        token: &str,
    ) -> ApiResult<()> {
        self.lock()
            .establish_peering(cluster, partition, peer_name, token)
    }
}

impl ControlPlaneConnector for SimulatedWorld {
    fn connect(&self, target: &ApiTarget) -> ApiResult<Arc<dyn ControlPlane>> {
        Ok(Arc::new(SimulatedClient::new(
            self.clone(),
            &target.cluster,
            target.node.clone(),
            target.token.clone(),
        )))
    }
}

#[async_trait]
impl Provisioner for SimulatedWorld {
    async fn apply(&self, set: &ResourceSet) -> InfraResult<ApplyOutputs> {
        let mut state = self.lock();
        state.steps.push(set.step);

        let mut out = ApplyOutputs::default();
        for net in &set.networks {
            let port = state.host_port(&net.docker_name, PROXY_INTERNAL_PORT);
            out.proxy_ports.insert(net.name.clone(), port);
        }

        let previous = std::mem::take(&mut state.running);
        for node in &set.nodes {
            let ports = node
                .ports
                .iter()
                .map(|&p| (p, state.host_port(&node.docker_name, p)))
                .collect();
            out.node_ports
                .insert((node.cluster.clone(), node.id.clone()), ports);

            let datacenter = node
                .agent
                .as_ref()
                .map_or(node.cluster.as_str(), |a| a.datacenter.as_str());
            state
                .clusters
                .entry(node.cluster.clone())
                .or_insert_with(|| SimCluster::new(datacenter));
            state
                .running
                .insert((node.cluster.clone(), node.id.clone()), node.clone());
        }

        for (key, node) in previous {
            if node.agent.is_none() || state.running.contains_key(&key) {
                continue;
            }
            debug!(cluster = %key.0, node = %key.1, "agent stopped; leaving catalog");
            if let Some(cluster) = state.clusters.get_mut(&key.0) {
                cluster.remove_node(partition_or_default(&node.id.partition), &node.pod_name);
            }
        }

        state.elect_leaders();
        state.self_register();
        info!(
            step = %set.step,
            nodes = set.nodes.len(),
            networks = set.networks.len(),
            "simulated apply complete"
        );
        Ok(out)
    }

    async fn destroy(&self, topology_id: &str) -> InfraResult<()> {
        let mut state = self.lock();
        state.running.clear();
        state.clusters.clear();
        state.pending_peerings.clear();
        info!(%topology_id, "simulated topology destroyed");
        Ok(())
    }
}
