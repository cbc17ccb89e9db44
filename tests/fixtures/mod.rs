// Copyright (c) 2025 - Cowboy AI, Inc.
//! Test Fixtures for cim-sprawl
//!
//! Deterministic topology configs shared by the integration tests. Every
//! config here compiles; tests edit copies to provoke failures.
//!
//! # Layouts
//! - `single_cluster_config`: dc1 with three servers, one client agent
//!   hosting `ping`, and one dataplane hosting `pong`
//! - `peered_config`: dc1 dialing dc2, each with a mesh gateway on its
//!   client agent
//! - `autopilot_config`: dc1 with three running and three disabled servers

#![allow(dead_code)]

use std::sync::Arc;

use cim_sprawl::domain::{
    Cluster, Config, Destination, Images, Network, NetworkType, Node, NodeId, NodeKind, PeerCluster,
    Peering, Workload, WorkloadId,
};
use cim_sprawl::{SimulatedWorld, Sprawl, SprawlConfig};

pub const UPGRADE_CE_IMAGE: &str = "hashicorp/consul:1.18.0";
pub const UPGRADE_ENTERPRISE_IMAGE: &str = "hashicorp/consul-enterprise:1.18.0-ent";

pub fn node(kind: NodeKind, name: &str) -> Node {
    Node::new(kind, name)
}

pub fn node_id(name: &str) -> NodeId {
    NodeId::new(name, "")
}

/// Mesh-enabled v1 workload with an envoy admin port
pub fn mesh_workload(name: &str, port: u16, admin: u16) -> Workload {
    let mut wrk = Workload::new(WorkloadId::new(name, "", ""), "fortio", port);
    wrk.envoy_admin_port = Some(admin);
    wrk
}

/// v1 workload outside the mesh
pub fn plain_workload(name: &str, port: u16) -> Workload {
    let mut wrk = Workload::new(WorkloadId::new(name, "", ""), "fortio", port);
    wrk.disable_service_mesh = true;
    wrk
}

pub fn mesh_gateway() -> Workload {
    let mut wrk = Workload::new(WorkloadId::new("mesh-gateway", "", ""), "", 8443);
    wrk.image = None;
    wrk.is_mesh_gateway = true;
    wrk.envoy_admin_port = Some(19000);
    wrk
}

pub fn lan(name: &str) -> Network {
    Network::new(name, NetworkType::Lan)
}

pub fn single_cluster_config() -> Config {
    let mut dc1 = Cluster::new("dc1");
    for name in ["server1", "server2", "server3"] {
        dc1.nodes.push(node(NodeKind::Server, name));
    }

    let mut client = node(NodeKind::Client, "client1");
    let mut ping = mesh_workload("ping", 8080, 19000);
    ping.destinations
        .push(Destination::to(WorkloadId::new("pong", "", ""), 5000));
    client.workloads.push(ping);
    dc1.nodes.push(client);

    let mut dataplane = node(NodeKind::Dataplane, "dataplane1");
    dataplane.workloads.push(mesh_workload("pong", 8080, 19000));
    dc1.nodes.push(dataplane);

    Config {
        networks: vec![lan("dc1")],
        clusters: vec![dc1],
        ..Default::default()
    }
}

pub fn peered_config() -> Config {
    let clusters = ["dc1", "dc2"]
        .into_iter()
        .map(|name| {
            let mut c = Cluster::new(name);
            c.nodes.push(node(NodeKind::Server, "server1"));
            let mut client = node(NodeKind::Client, "client1");
            client.workloads.push(mesh_gateway());
            client.workloads.push(plain_workload("ping", 8080));
            c.nodes.push(client);
            c
        })
        .collect();

    Config {
        networks: vec![lan("dc1"), lan("dc2")],
        clusters,
        peerings: vec![Peering::new(PeerCluster::new("dc1", ""), PeerCluster::new("dc2", ""))],
        ..Default::default()
    }
}

pub fn autopilot_config() -> Config {
    let mut dc1 = Cluster::new("dc1");
    for i in 1..=6 {
        let mut server = node(NodeKind::Server, &format!("server{i}"));
        server.disabled = i > 3;
        dc1.nodes.push(server);
    }
    let mut client = node(NodeKind::Client, "client1");
    client.workloads.push(plain_workload("ping", 8080));
    dc1.nodes.push(client);

    Config {
        networks: vec![lan("dc1")],
        clusters: vec![dc1],
        ..Default::default()
    }
}

pub fn upgrade_images() -> Images {
    Images {
        agent_ce: UPGRADE_CE_IMAGE.to_string(),
        agent_enterprise: UPGRADE_ENTERPRISE_IMAGE.to_string(),
        ..Images::default()
    }
}

pub fn settings() -> SprawlConfig {
    SprawlConfig::immediate()
}

/// Launch `config` on a fresh simulated world
pub async fn launch(config: Config) -> (Sprawl, SimulatedWorld) {
    let world = SimulatedWorld::new();
    let sprawl = Sprawl::launch(
        Arc::new(world.clone()),
        Arc::new(world.clone()),
        config,
        settings(),
    )
    .await
    .expect("launch should succeed");
    (sprawl, world)
}

/// Catalog node name of a compiled node
pub fn pod_name(sprawl: &Sprawl, cluster: &str, node: &str) -> String {
    sprawl
        .topology()
        .cluster(cluster)
        .and_then(|c| c.node_by_id(&node_id(node)))
        .map(Node::pod_name)
        .expect("node should exist")
}
