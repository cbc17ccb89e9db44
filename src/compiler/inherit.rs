// Copyright (c) 2025 - Cowboy AI, Inc.
//! Recompile invariants
//!
//! A recompile may flip `disabled`, edit metadata, and append nodes. It may
//! not create or destroy networks or clusters, reorder or drop nodes, or
//! edit identity fields. Runtime-discovered facts are carried forward.

use std::collections::HashMap;

use tracing::warn;

use super::error::{CompileError, CompileResult};
use crate::domain::{Cluster, Node, Topology, Workload};

pub(crate) fn inherit_and_validate(prev: &Topology, next: &mut Topology) -> CompileResult<()> {
    if !prev.networks.keys().eq(next.networks.keys()) {
        return Err(CompileError::KeySetChanged("networks"));
    }
    for (name, net) in next.networks.iter_mut() {
        let Some(old) = prev.networks.get(name) else {
            return Err(CompileError::KeySetChanged("networks"));
        };
        net.inherit_from(old);
        if net != old {
            return Err(CompileError::NetworkChanged(name.clone()));
        }
    }

    if !prev.clusters.keys().eq(next.clusters.keys()) {
        return Err(CompileError::KeySetChanged("clusters"));
    }
    for (name, cluster) in next.clusters.iter_mut() {
        let Some(old) = prev.clusters.get(name) else {
            return Err(CompileError::KeySetChanged("clusters"));
        };
        inherit_cluster(old, cluster)?;
    }
    Ok(())
}

fn inherit_cluster(old: &Cluster, cluster: &mut Cluster) -> CompileResult<()> {
    cluster.inherit_from(old);

    if cluster.name != old.name
        || cluster.network_name != old.network_name
        || cluster.datacenter != old.datacenter
        || cluster.enterprise != old.enterprise
    {
        return Err(CompileError::ImmutableEdit {
            what: "cluster",
            id: cluster.name.clone(),
        });
    }

    if !cluster.initial_config_entries.is_empty() {
        warn!(cluster = %cluster.name, "initial config entries were provided, but are skipped on recompile");
    }
    if !cluster.initial_resources.is_empty() {
        warn!(cluster = %cluster.name, "initial resources were provided, but are skipped on recompile");
    }

    let positions: HashMap<_, usize> = cluster
        .nodes
        .iter()
        .enumerate()
        .map(|(i, n)| (n.id(), i))
        .collect();

    let name = cluster.name.clone();
    for (prev_idx, old_node) in old.nodes.iter().enumerate() {
        let id = old_node.id();
        let Some(&pos) = positions.get(&id) else {
            return Err(CompileError::NodeVanished {
                cluster: name,
                node: id.to_string(),
            });
        };
        if pos != prev_idx {
            return Err(CompileError::NodeShuffled {
                cluster: name,
                node: id.to_string(),
                from: prev_idx,
                to: pos,
            });
        }
        inherit_node(&name, old_node, &mut cluster.nodes[pos])?;
    }
    Ok(())
}

fn inherit_node(cluster: &str, old: &Node, node: &mut Node) -> CompileResult<()> {
    let immutable = |what| CompileError::ImmutableEdit {
        what,
        id: format!("{cluster}/{}", old.id()),
    };

    if node.kind != old.kind
        || node.version != old.version
        || node.partition != old.partition
        || node.name != old.name
        || node.index != old.index
        || node.addresses.len() != old.addresses.len()
    {
        return Err(immutable("node"));
    }

    // Workload ports feed the node's port set, so workloads are checked first
    for old_wrk in &old.workloads {
        let Some(wrk) = node.workloads.iter().find(|w| w.id == old_wrk.id) else {
            return Err(CompileError::WorkloadVanished {
                cluster: cluster.to_string(),
                node: old.id().to_string(),
                workload: old_wrk.id.to_string(),
            });
        };
        if !same_workload_identity(old_wrk, wrk) {
            return Err(CompileError::ImmutableEdit {
                what: "workload",
                id: format!("{cluster}/{}/{}", old.id(), old_wrk.id),
            });
        }
    }

    let same_ports = old
        .used_ports()
        .keys()
        .eq(node.used_ports().keys());
    if !same_ports {
        return Err(immutable("node"));
    }

    node.inherit_from(old);

    for (addr, old_addr) in node.addresses.iter_mut().zip(&old.addresses) {
        if addr.network != old_addr.network {
            return Err(CompileError::invalid(
                format!("cluster {cluster:?} node {:?}", old.id().to_string()),
                "addresses were shuffled",
            ));
        }
        if addr.network_type != old_addr.network_type {
            return Err(immutable("address"));
        }
        addr.inherit_from(old_addr);
    }

    for wrk in &mut node.workloads {
        if let Some(old_wrk) = old.workloads.iter().find(|w| w.id == wrk.id) {
            wrk.exposed_envoy_admin_port = old_wrk.exposed_envoy_admin_port;
        }
    }
    Ok(())
}

fn same_workload_identity(a: &Workload, b: &Workload) -> bool {
    a.id == b.id
        && a.port == b.port
        && a.ports == b.ports
        && a.envoy_admin_port == b.envoy_admin_port
        && a.envoy_public_listener_port == b.envoy_public_listener_port
        && a.command == b.command
        && a.env == b.env
}
