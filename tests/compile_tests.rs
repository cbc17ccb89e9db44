// Copyright (c) 2025 - Cowboy AI, Inc.
//! Topology compiler tests
//!
//! Covers the fatal validation paths and the recompile invariants through
//! the public `compile` / `recompile` entry points.

mod fixtures;

use fixtures::*;
use pretty_assertions::assert_eq;
use test_case::test_case;

use cim_sprawl::compiler::{compile, recompile, CompileError};
use cim_sprawl::domain::{
    Cluster, Config, Destination, NodeKind, PeerCluster, Peering, Topology, V2Service, WorkloadId,
};

/// Zero out the fields only runtime discovery may change
fn without_discovered(mut topology: Topology) -> Topology {
    for cluster in topology.clusters.values_mut() {
        for node in &mut cluster.nodes {
            node.tls_cert_prefix = None;
            for wrk in &mut node.workloads {
                wrk.exposed_envoy_admin_port = None;
            }
        }
    }
    topology
}

#[test]
fn test_empty_networks_rejected() {
    let mut config = single_cluster_config();
    config.networks.clear();
    assert_eq!(compile(&config).unwrap_err(), CompileError::NetworksEmpty);
}

#[test]
fn test_duplicate_cluster_rejected() {
    let mut config = single_cluster_config();
    let copy = config.clusters[0].clone();
    config.clusters.push(copy);
    assert_eq!(
        compile(&config).unwrap_err(),
        CompileError::DuplicateCluster("dc1".into())
    );
}

#[test]
fn test_colliding_workload_ports_rejected() {
    let mut config = single_cluster_config();
    let client = &mut config.clusters[0].nodes[3];
    client.workloads.push(plain_workload("pang", 8080));

    let err = compile(&config).unwrap_err();
    assert_eq!(
        err,
        CompileError::PortReuse {
            cluster: "dc1".into(),
            node: "client1".into(),
            port: 8080,
        }
    );
    assert!(err.to_string().contains("port used more than once"));
}

#[test]
fn test_recompile_without_edits_is_stable() {
    let config = single_cluster_config();
    let first = compile(&config).unwrap();
    let second = recompile(&config, &first).unwrap();

    assert_eq!(second.id, first.id);
    assert_eq!(without_discovered(second), without_discovered(first));
}

#[test]
fn test_peering_links_point_at_the_other_side() {
    let topology = compile(&peered_config()).unwrap();

    let dc1 = &topology.clusters["dc1"].peerings["peer-dc2-default"];
    assert_eq!(dc1.link.as_ref().map(|l| l.name.as_str()), Some("dc2"));
    let dc2 = &topology.clusters["dc2"].peerings["peer-dc1-default"];
    assert_eq!(dc2.link.as_ref().map(|l| l.name.as_str()), Some("dc1"));
}

#[test]
fn test_declared_peer_names_resolve() {
    let mut config = peered_config();
    let client = &mut config.clusters[0].nodes[1];
    let mut ping = mesh_workload("pinger", 8090, 19001);
    ping.destinations.push(
        Destination::to(WorkloadId::new("ping", "", ""), 5001).via_peer("peer-dc2-default"),
    );
    client.workloads.push(ping);

    let topology = compile(&config).unwrap();
    let client = &topology.clusters["dc1"].nodes[1];
    let dest = &client.workloads.iter().find(|w| w.id.name == "pinger").unwrap().destinations[0];
    assert_eq!(dest.peering.as_ref().map(|p| p.name.as_str()), Some("dc2"));
}

#[test]
fn test_undeclared_peer_names_listed() {
    let mut config = peered_config();
    let client = &mut config.clusters[0].nodes[1];
    let mut ping = mesh_workload("pinger", 8090, 19001);
    ping.destinations.push(
        Destination::to(WorkloadId::new("ping", "", ""), 5001).via_peer("peer-dc9-default"),
    );
    ping.destinations.push(
        Destination::to(WorkloadId::new("pong", "", ""), 5002).via_peer("peer-dc3-default"),
    );
    client.workloads.push(ping);

    assert_eq!(
        compile(&config).unwrap_err(),
        CompileError::UnknownPeerings {
            cluster: "dc1".into(),
            names: vec!["peer-dc3-default".into(), "peer-dc9-default".into()],
        }
    );
}

#[test_case(250, true ; "pool holds 250 services")]
#[test_case(251, false ; "pool overflows at 251")]
fn test_virtual_ip_pool(count: usize, ok: bool) {
    let mut config = single_cluster_config();
    let dc1 = &mut config.clusters[0];
    dc1.nodes.truncate(1);
    for i in 0..count {
        dc1.services.push(V2Service::new(WorkloadId::new(format!("svc{i}"), "", "")));
    }

    match compile(&config) {
        Ok(topology) => {
            assert!(ok);
            let services = &topology.clusters["dc1"].services;
            assert_eq!(services[count - 1].virtual_ips, vec!["10.244.0.251"]);
            let unique: std::collections::BTreeSet<_> =
                services.iter().map(|s| s.virtual_ips[0].clone()).collect();
            assert_eq!(unique.len(), count);
        }
        Err(err) => {
            assert!(!ok);
            assert_eq!(err, CompileError::TooManyVirtualIps { cluster: "dc1".into() });
            assert!(err.to_string().contains("too many ips"));
        }
    }
}

#[test]
fn test_disabled_node_survives_recompile() {
    let mut config = single_cluster_config();
    let first = compile(&config).unwrap();

    assert!(config.disable_node("dc1", &node_id("dataplane1")).unwrap());
    assert!(!config.disable_node("dc1", &node_id("dataplane1")).unwrap());
    let second = recompile(&config, &first).unwrap();

    let dc1 = &second.clusters["dc1"];
    assert_eq!(dc1.nodes.len(), 5);
    assert!(dc1.node_by_id(&node_id("dataplane1")).unwrap().disabled);
}

#[test]
fn test_shuffled_nodes_rejected() {
    let mut config = single_cluster_config();
    let first = compile(&config).unwrap();
    config.clusters[0].nodes.swap(1, 2);

    let err = recompile(&config, &first).unwrap_err();
    assert!(matches!(err, CompileError::NodeShuffled { .. }), "{err}");
    assert!(err.to_string().contains("has been shuffled"));
}

#[test]
fn test_vanished_node_rejected() {
    let mut config = single_cluster_config();
    let first = compile(&config).unwrap();
    config.clusters[0].nodes.pop();

    let err = recompile(&config, &first).unwrap_err();
    assert!(matches!(err, CompileError::NodeVanished { .. }), "{err}");
}

#[test]
fn test_new_cluster_rejected_on_recompile() {
    let mut config = single_cluster_config();
    let first = compile(&config).unwrap();

    let mut dc2 = Cluster::new("dc2");
    dc2.network_name = "dc1".into();
    dc2.nodes.push(node(NodeKind::Server, "server1"));
    config.clusters.push(dc2);

    assert_eq!(
        recompile(&config, &first).unwrap_err(),
        CompileError::KeySetChanged("clusters")
    );
}

#[test]
fn test_self_peering_rejected() {
    let mut config: Config = peered_config();
    config.peerings = vec![Peering::new(PeerCluster::new("dc1", ""), PeerCluster::new("dc1", ""))];
    assert!(compile(&config).is_err());
}

#[test]
fn test_config_loads_from_json() {
    let json = r#"{
        "networks": [{ "name": "dc1", "type": "lan" }],
        "clusters": [{
            "name": "dc1",
            "nodes": [
                { "kind": "server", "name": "server1" },
                { "kind": "client", "name": "client1" }
            ]
        }]
    }"#;
    let config = Config::from_json_str(json).unwrap();
    let topology = compile(&config).unwrap();
    assert_eq!(topology.clusters["dc1"].nodes.len(), 2);
}

#[test]
fn test_removed_workload_on_enabled_node_rejected() {
    let mut config = single_cluster_config();
    let first = compile(&config).unwrap();
    config.clusters[0].nodes[3].workloads.pop();

    let err = recompile(&config, &first).unwrap_err();
    assert_eq!(
        err,
        CompileError::WorkloadVanished {
            cluster: "dc1".into(),
            node: "client1".into(),
            workload: WorkloadId::new("ping", "", "").to_string(),
        }
    );
    assert!(err.to_string().contains("has vanished"));
}

#[test_case("envoy_admin_port" ; "admin port")]
#[test_case("port" ; "service port")]
#[test_case("command" ; "command")]
#[test_case("env" ; "env")]
fn test_workload_identity_edit_rejected(field: &str) {
    let mut config = single_cluster_config();
    let first = compile(&config).unwrap();

    let ping = &mut config.clusters[0].nodes[3].workloads[0];
    match field {
        "envoy_admin_port" => ping.envoy_admin_port = Some(19999),
        "port" => ping.port = Some(8081),
        "command" => ping.command = vec!["server".into(), "-http-port".into(), "8081".into()],
        "env" => ping.env = vec!["FORTIO_NAME=ping".into()],
        other => unreachable!("unknown field {other}"),
    }

    let err = recompile(&config, &first).unwrap_err();
    assert!(
        matches!(err, CompileError::ImmutableEdit { what: "workload", .. }),
        "{err}"
    );
}

#[test_case("enterprise" ; "enterprise flag")]
#[test_case("datacenter" ; "datacenter")]
#[test_case("network_name" ; "network")]
fn test_cluster_identity_edit_rejected(field: &str) {
    let mut config = single_cluster_config();
    config.networks.push(lan("alt"));
    let first = compile(&config).unwrap();

    let dc1 = &mut config.clusters[0];
    match field {
        "enterprise" => dc1.enterprise = true,
        "datacenter" => dc1.datacenter = "east".into(),
        "network_name" => dc1.network_name = "alt".into(),
        other => unreachable!("unknown field {other}"),
    }

    assert_eq!(
        recompile(&config, &first).unwrap_err(),
        CompileError::ImmutableEdit {
            what: "cluster",
            id: "dc1".into(),
        }
    );
}
