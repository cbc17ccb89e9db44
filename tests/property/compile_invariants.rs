// Copyright (c) 2025 - Cowboy AI, Inc.
//! Property-Based Tests for Topology Compilation

use std::collections::HashSet;

use cim_sprawl::compiler::{compile, recompile, CompileError};
use cim_sprawl::domain::{
    Cluster, Config, Network, NetworkType, Node, NodeKind, V2Service, Workload, WorkloadId,
};
use proptest::prelude::*;

fn config(servers: usize, clients: usize, workloads: usize) -> Config {
    let mut dc1 = Cluster::new("dc1");
    for i in 0..servers {
        dc1.nodes.push(Node::new(NodeKind::Server, format!("server{i}")));
    }
    for i in 0..clients {
        let mut client = Node::new(NodeKind::Client, format!("client{i}"));
        for w in 0..workloads {
            let mut wrk = Workload::new(
                WorkloadId::new(format!("svc{i}-{w}"), "", ""),
                "fortio",
                8080 + w as u16,
            );
            wrk.disable_service_mesh = true;
            client.workloads.push(wrk);
        }
        dc1.nodes.push(client);
    }
    Config {
        networks: vec![Network::new("dc1", NetworkType::Lan)],
        clusters: vec![dc1],
        ..Default::default()
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Node order and identities survive compilation unchanged
    #[test]
    fn prop_compile_keeps_node_order(servers in 1usize..5, clients in 0usize..5, workloads in 0usize..4) {
        let cfg = config(servers, clients, workloads);
        let topology = compile(&cfg).unwrap();
        let compiled: Vec<_> = topology.clusters["dc1"].nodes.iter().map(Node::id).collect();
        let declared: Vec<_> = cfg.clusters[0].nodes.iter().map(Node::id).collect();
        prop_assert_eq!(compiled, declared);
    }

    /// Recompiling an unchanged config keeps the id and every node in place
    #[test]
    fn prop_recompile_is_stable(servers in 1usize..4, clients in 0usize..4, workloads in 0usize..3) {
        let cfg = config(servers, clients, workloads);
        let first = compile(&cfg).unwrap();
        let second = recompile(&cfg, &first).unwrap();

        prop_assert_eq!(&second.id, &first.id);
        let before: Vec<_> = first.clusters["dc1"].nodes.iter().map(Node::id).collect();
        let after: Vec<_> = second.clusters["dc1"].nodes.iter().map(Node::id).collect();
        prop_assert_eq!(before, after);
    }

    /// Any swap of two distinct nodes is caught on recompile
    #[test]
    fn prop_recompile_rejects_any_swap(servers in 2usize..5, clients in 0usize..4, a in any::<prop::sample::Index>(), b in any::<prop::sample::Index>()) {
        let mut cfg = config(servers, clients, 0);
        let first = compile(&cfg).unwrap();

        let len = cfg.clusters[0].nodes.len();
        let (a, b) = (a.index(len), b.index(len));
        prop_assume!(a != b);
        cfg.clusters[0].nodes.swap(a, b);

        let result = recompile(&cfg, &first);
        prop_assert!(
            matches!(result, Err(CompileError::NodeShuffled { .. })),
            "unexpected result {:?}",
            result.map(|t| t.id)
        );
    }

    /// Declared v2 services get distinct addresses up to the pool limit
    #[test]
    fn prop_virtual_ips_unique(count in 1usize..=250) {
        let mut cfg = config(1, 0, 0);
        for i in 0..count {
            cfg.clusters[0].services.push(V2Service::new(WorkloadId::new(format!("svc{i}"), "", "")));
        }
        let topology = compile(&cfg).unwrap();
        let services = &topology.clusters["dc1"].services;

        let ips: HashSet<&String> = services.iter().flat_map(|s| s.virtual_ips.iter()).collect();
        prop_assert_eq!(ips.len(), count);
        prop_assert!(services.iter().all(|s| s.virtual_ips.len() == 1));
    }
}
