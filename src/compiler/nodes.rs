// Copyright (c) 2025 - Cowboy AI, Inc.
//! Node and workload defaulting
//!
//! Nodes get their global index, images, identity and port reservations.
//! Workloads get their tenancy, destination defaults and v2 membership.

use std::collections::{BTreeSet, HashSet};

use super::error::{check_label, CompileError, CompileResult};
use super::services;
use super::tenancy::Tenancies;
use super::{Context, DOCKER_PREFIX};
use crate::domain::node::{
    AGENT_HTTP_PORT, CLIENT_GRPC_PORT, DEFAULT_PUBLIC_LISTENER_PORT, SERVER_GRPC_TLS_PORT,
};
use crate::domain::workload::{DEFAULT_LOCAL_ADDRESS, LEGACY_PORT_NAME};
use crate::domain::{
    namespace_or_default, partition_or_default, Address, Cluster, Destination, Node, NodeId,
    NodeKind, Workload, WorkloadId, DEFAULT_NAMESPACE,
};

pub(super) fn compile_node(
    c: &mut Cluster,
    n: &mut Node,
    tenancies: &mut Tenancies,
    seen: &mut HashSet<NodeId>,
    implicit: bool,
    ctx: &mut Context<'_>,
) -> CompileResult<()> {
    if n.name.is_empty() {
        return Err(CompileError::invalid(
            format!("cluster {:?}", c.name),
            "node has no name",
        ));
    }
    check_label("node", &n.name)?;
    let path = format!("cluster {:?} node {:?}", c.name, n.name);

    if n.is_v2() {
        if n.kind == NodeKind::Client {
            return Err(CompileError::invalid(
                path,
                "v2 does not support client agents at this time",
            ));
        }
        c.enable_v2 = true;
    }

    n.partition = partition_or_default(&n.partition).to_string();
    check_label("partition", &n.partition)?;
    tenancies.add(&n.partition, DEFAULT_NAMESPACE);

    if !seen.insert(n.id()) {
        return Err(CompileError::invalid(
            path,
            "cannot have two nodes in the same cluster with the same name",
        ));
    }
    if !n.used_ports().is_empty() {
        return Err(CompileError::invalid(path, "user cannot specify used ports"));
    }
    if !n.docker_name().is_empty() {
        return Err(CompileError::invalid(path, "user cannot specify the docker name"));
    }
    if n.index != 0 {
        return Err(CompileError::invalid(path, "user cannot specify the node index"));
    }

    if n.is_agent() {
        n.reserve_port(AGENT_HTTP_PORT);
        n.reserve_port(if n.is_server() {
            SERVER_GRPC_TLS_PORT
        } else {
            CLIENT_GRPC_PORT
        });
    }

    n.index = ctx.next_index;
    ctx.next_index += 1;

    n.images = c
        .images
        .override_with(&n.images.choose_agent(c.enterprise))
        .choose_node(n.kind);
    n.cluster = c.name.clone();
    n.datacenter = c.datacenter.clone();
    n.set_docker_name(format!(
        "{DOCKER_PREFIX}-{}-{}-{}",
        c.name,
        n.id().tf_string(),
        ctx.id
    ));

    compile_addresses(c, n, ctx, &path)?;

    if n.is_dataplane() && n.workloads.len() > 1 {
        return Err(CompileError::invalid(
            path,
            "cannot have multiple services on a dataplane node",
        ));
    }

    let mut workloads = std::mem::take(&mut n.workloads);
    let mut seen_workloads = HashSet::new();
    for wrk in &mut workloads {
        compile_workload(c, n, wrk, tenancies, &mut seen_workloads, implicit, ctx)?;
    }
    n.workloads = workloads;
    Ok(())
}

fn compile_addresses(c: &Cluster, n: &mut Node, ctx: &Context<'_>, path: &str) -> CompileResult<()> {
    if n.addresses.is_empty() {
        n.addresses.push(Address::on(c.network_name.clone()));
    }

    let (mut local, mut public) = (0, 0);
    for addr in &mut n.addresses {
        if addr.network.is_empty() {
            return Err(CompileError::invalid(
                path,
                "address is missing the network name",
            ));
        }
        let net = ctx.networks.get(&addr.network).ok_or_else(|| {
            CompileError::invalid(
                path,
                format!("address references unknown network {:?}", addr.network),
            )
        })?;
        addr.network_type = net.network_type;
        if addr.is_local() {
            local += 1;
        } else {
            public += 1;
        }
    }

    if local != 1 {
        return Err(CompileError::invalid(
            path,
            "node must have exactly one local address",
        ));
    }
    if public > 1 {
        return Err(CompileError::invalid(
            path,
            "node has more than one public address",
        ));
    }
    Ok(())
}

fn compile_workload(
    c: &mut Cluster,
    n: &mut Node,
    wrk: &mut Workload,
    tenancies: &mut Tenancies,
    seen: &mut HashSet<WorkloadId>,
    implicit: bool,
    ctx: &mut Context<'_>,
) -> CompileResult<()> {
    if n.is_agent() {
        wrk.id.partition = n.partition.clone();
    }
    wrk.id.normalize();
    wrk.node = Some(n.id());
    wrk.node_version = n.version;
    if n.is_v2() {
        wrk.workload = Some(format!("{}-{}", wrk.id.name, n.name));
    }

    let path = format!(
        "cluster {:?} node {:?} service {:?}",
        c.name,
        n.id().to_string(),
        wrk.id.to_string()
    );

    check_label("service", &wrk.id.name)?;
    check_label("partition", &wrk.id.partition)?;
    check_label("namespace", &wrk.id.namespace)?;
    if wrk.id.partition != n.partition {
        return Err(CompileError::invalid(
            path,
            "service must be in the same partition as its node",
        ));
    }
    tenancies.add(&wrk.id.partition, &wrk.id.namespace);

    if !seen.insert(wrk.id.clone()) {
        return Err(CompileError::invalid(
            path,
            "cannot have two services on the same node with the same id",
        ));
    }

    if n.is_dataplane() && wrk.is_mesh_enabled() && wrk.envoy_public_listener_port.is_none() {
        if n.used_ports().contains_key(&DEFAULT_PUBLIC_LISTENER_PORT) {
            return Err(CompileError::invalid(
                path,
                "envoy public listener port is required",
            ));
        }
        wrk.envoy_public_listener_port = Some(DEFAULT_PUBLIC_LISTENER_PORT);
    }

    if n.is_v1() && !wrk.implied_destinations.is_empty() {
        return Err(CompileError::invalid(
            path,
            "v1 does not support implied destinations yet",
        ));
    }

    let caller = wrk.id.clone();
    let found = ctx.found_peers.entry(c.name.clone()).or_default();
    for dest in &mut wrk.destinations {
        default_destination(dest, &caller, n.is_v2(), &path)?;
        track_destination(dest, found, tenancies);
    }
    for dest in &mut wrk.implied_destinations {
        dest.implied = true;
        default_destination(dest, &caller, n.is_v2(), &path)?;
        track_destination(dest, found, tenancies);
    }

    wrk.validate()
        .map_err(|source| CompileError::InvalidWorkload {
            cluster: c.name.clone(),
            node: n.id().to_string(),
            workload: wrk.id.to_string(),
            source,
        })?;

    if wrk.enable_transparent_proxy && !n.is_dataplane() {
        return Err(CompileError::invalid(
            path,
            "transparent proxy is only supported on dataplane nodes",
        ));
    }

    for port in wrk.used_ports() {
        if !n.reserve_port(port) {
            return Err(CompileError::PortReuse {
                cluster: c.name.clone(),
                node: n.id().to_string(),
                port,
            });
        }
    }

    if n.is_v2() {
        services::attach_workload(c, wrk, implicit, &path)?;
    } else {
        if !wrk.v2_services.is_empty() {
            return Err(CompileError::invalid(path, "cannot specify v2 services for v1"));
        }
        if wrk.workload_identity.is_some() {
            return Err(CompileError::invalid(
                path,
                "cannot specify workload identities for v1",
            ));
        }
    }
    Ok(())
}

/// Fill in tenancy and bind defaults for one destination.
///
/// Peer-less destinations inherit the caller's tenancy. Peered ones drop the
/// partition, which is resolved from the peer link later.
pub(crate) fn default_destination(
    dest: &mut Destination,
    caller: &WorkloadId,
    v2: bool,
    path: &str,
) -> CompileResult<()> {
    if dest.peer.is_none() {
        if dest.id.partition.is_empty() {
            dest.id.partition = caller.partition.clone();
        }
        if dest.id.namespace.is_empty() {
            dest.id.namespace = caller.namespace.clone();
        }
    } else {
        dest.id.partition.clear();
        dest.id.namespace = namespace_or_default(&dest.id.namespace).to_string();
    }

    if dest.implied {
        if dest.port_name.as_deref().unwrap_or_default().is_empty() {
            return Err(CompileError::invalid(
                path,
                format!("implicit destinations must use port names in v2: {}", dest.id),
            ));
        }
        return Ok(());
    }

    if dest.local_address.is_none() {
        dest.local_address = Some(DEFAULT_LOCAL_ADDRESS.to_string());
    }
    match (dest.port_name.is_some(), v2) {
        (true, false) => Err(CompileError::invalid(
            path,
            format!("explicit destinations cannot use port names in v1: {}", dest.id),
        )),
        (false, true) => {
            dest.port_name = Some(LEGACY_PORT_NAME.to_string());
            Ok(())
        }
        _ => Ok(()),
    }
}

fn track_destination(
    dest: &Destination,
    found: &mut BTreeSet<String>,
    tenancies: &mut Tenancies,
) {
    if let Some(peer) = &dest.peer {
        found.insert(peer.clone());
    }
    tenancies.add(&dest.id.partition, &dest.id.namespace);
}
