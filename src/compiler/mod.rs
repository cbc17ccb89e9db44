// Copyright (c) 2025 - Cowboy AI, Inc.
//! Topology Compiler
//!
//! Turns a declarative [`Config`] into a fully resolved [`Topology`]. The
//! compiler is a pure function of its inputs plus a fresh topology id:
//!
//! 1. Networks get provisioning names
//! 2. Clusters, nodes and workloads are defaulted and validated, ports are
//!    reserved per node, and each cluster's tenancy closure is computed
//! 3. v2 services are inferred and given virtual addresses
//! 4. Peerings are linked and destinations denormalized against them
//!
//! [`recompile`] reruns the same pass with the previous topology's id and
//! then checks identity invariants, carrying discovered facts forward.
//!
//! # Example
//!
//! ```rust
//! use cim_sprawl::compiler::{compile, recompile};
//! use cim_sprawl::domain::{Cluster, Config, Network, NetworkType, Node, NodeKind};
//!
//! let mut dc1 = Cluster::new("dc1");
//! dc1.nodes.push(Node::new(NodeKind::Server, "server1"));
//! let config = Config {
//!     networks: vec![Network::new("dc1", NetworkType::Lan)],
//!     clusters: vec![dc1],
//!     ..Default::default()
//! };
//!
//! let topology = compile(&config).unwrap();
//! assert_eq!(topology.clusters["dc1"].datacenter, "dc1");
//! assert_eq!(recompile(&config, &topology).unwrap(), topology);
//! ```

pub mod error;
mod inherit;
mod nodes;
pub mod peering;
pub mod services;
mod tenancy;

use std::collections::{BTreeMap, HashSet};

use tracing::{debug, info, info_span};
use uuid::Uuid;

pub use error::{CompileError, CompileResult};
use error::check_label;
use peering::FoundPeerNames;
use tenancy::Tenancies;

use crate::domain::{Cluster, Config, Images, Network, Topology};

/// Prefix of every generated provisioning name
pub const DOCKER_PREFIX: &str = "sprawl";

/// Shared state threaded through one compile pass
pub(crate) struct Context<'a> {
    id: &'a str,
    images: &'a Images,
    networks: &'a BTreeMap<String, Network>,
    next_index: usize,
    found_peers: FoundPeerNames,
}

/// Compile a config into a new topology with a fresh id.
pub fn compile(config: &Config) -> CompileResult<Topology> {
    let span = info_span!("compile");
    let _enter = span.enter();

    let topology = build(config, None)?;
    info!(
        topology = %topology.id,
        networks = topology.networks.len(),
        clusters = topology.clusters.len(),
        "compiled topology"
    );
    Ok(topology)
}

/// Compile an edited config against the live topology.
///
/// The result keeps the previous id, subnets, IP assignments and discovered
/// ports. Identity edits, dropped nodes or workloads, and reordered nodes
/// are rejected.
pub fn recompile(config: &Config, previous: &Topology) -> CompileResult<Topology> {
    let span = info_span!("recompile", topology = %previous.id);
    let _enter = span.enter();

    let mut next = build(config, Some(&previous.id))?;
    inherit::inherit_and_validate(previous, &mut next)?;
    info!(clusters = next.clusters.len(), "recompiled topology");
    Ok(next)
}

/// 16 hex characters
fn new_topology_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(16);
    id
}

fn build(config: &Config, previous_id: Option<&str>) -> CompileResult<Topology> {
    let mut raw = config.clone();
    let id = previous_id.map_or_else(new_topology_id, str::to_string);

    let images = Images::defaults().override_with(&raw.images);
    if !images.agent.is_empty() {
        return Err(CompileError::AgentImageAtTopLevel);
    }

    let networks = compile_networks(std::mem::take(&mut raw.networks), &id)?;

    if raw.clusters.is_empty() {
        return Err(CompileError::ClustersEmpty);
    }

    let mut ctx = Context {
        id: &id,
        images: &images,
        networks: &networks,
        next_index: 0,
        found_peers: FoundPeerNames::new(),
    };
    let mut clusters = BTreeMap::new();
    for mut cluster in std::mem::take(&mut raw.clusters) {
        if clusters.contains_key(&cluster.name) {
            return Err(CompileError::DuplicateCluster(cluster.name));
        }
        compile_cluster(&mut cluster, &mut ctx)?;
        clusters.insert(cluster.name.clone(), cluster);
    }
    let found = ctx.found_peers;

    peering::resolve(&mut raw.peerings, &mut clusters, found)?;
    peering::check_network_areas(&mut raw.network_areas, &clusters)?;

    Ok(Topology {
        id,
        images,
        networks,
        clusters,
        peerings: raw.peerings,
        network_areas: raw.network_areas,
    })
}

fn compile_networks(raw: Vec<Network>, id: &str) -> CompileResult<BTreeMap<String, Network>> {
    if raw.is_empty() {
        return Err(CompileError::NetworksEmpty);
    }

    let mut out = BTreeMap::new();
    for mut net in raw {
        if !net.docker_name.is_empty() {
            return Err(CompileError::invalid(
                format!("network {:?}", net.name),
                "user cannot specify the docker name",
            ));
        }
        check_label("network", &net.name)?;
        if out.contains_key(&net.name) {
            return Err(CompileError::DuplicateNetwork(net.name));
        }
        net.docker_name = format!("{DOCKER_PREFIX}-{}-{id}", net.name);
        out.insert(net.name.clone(), net);
    }
    Ok(out)
}

fn compile_cluster(c: &mut Cluster, ctx: &mut Context<'_>) -> CompileResult<()> {
    if c.name.is_empty() {
        return Err(CompileError::invalid("cluster", "cluster has no name"));
    }
    check_label("cluster", &c.name)?;
    let path = format!("cluster {:?}", c.name);

    if c.datacenter.is_empty() {
        c.datacenter = c.name.clone();
    } else {
        check_label("datacenter", &c.datacenter)?;
    }
    if c.network_name.is_empty() {
        c.network_name = c.name.clone();
    }
    if !ctx.networks.contains_key(&c.network_name) {
        return Err(CompileError::invalid(
            path,
            format!("cluster references an unknown network {:?}", c.network_name),
        ));
    }

    c.images = ctx.images.override_with(&c.images).choose_agent(c.enterprise);

    if c.nodes.is_empty() {
        return Err(CompileError::invalid(path, "cluster has no nodes"));
    }

    let implicit = c.services.is_empty();
    if !implicit {
        c.enable_v2 = true;
        for svc in &mut c.services {
            if svc.workloads.is_some() {
                return Err(CompileError::invalid(
                    path,
                    format!("the workloads field for v2 service {} is not user settable", svc.id),
                ));
            }
            svc.id.normalize();
        }
    }

    if c.tls_volume_name.is_some() {
        return Err(CompileError::invalid(
            path,
            "user cannot specify the tls volume name",
        ));
    }

    let mut tenancies = Tenancies::seed(c)?;

    let mut nodes = std::mem::take(&mut c.nodes);
    let mut seen = HashSet::new();
    for node in &mut nodes {
        nodes::compile_node(c, node, &mut tenancies, &mut seen, implicit, ctx)?;
    }
    c.nodes = nodes;

    services::assign_virtual_ips(c)?;
    if c.enable_v2 {
        services::resolve_implied_ports(c);
    }

    c.partitions = tenancies.into_partitions();
    if !c.enterprise && !c.has_only_default_tenancy() {
        return Err(CompileError::invalid(
            path,
            "cannot use partitions or namespaces with a CE cluster",
        ));
    }

    debug!(
        cluster = %c.name,
        nodes = c.nodes.len(),
        services = c.services.len(),
        enable_v2 = c.enable_v2,
        "compiled cluster"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{NetworkType, Node, NodeKind};
    use pretty_assertions::assert_eq;

    fn config() -> Config {
        let mut dc1 = Cluster::new("dc1");
        dc1.nodes.push(Node::new(NodeKind::Server, "server1"));
        dc1.nodes.push(Node::new(NodeKind::Client, "client1"));
        Config {
            networks: vec![Network::new("dc1", NetworkType::Lan)],
            clusters: vec![dc1],
            ..Default::default()
        }
    }

    #[test]
    fn test_topology_id_shape() {
        let id = new_topology_id();
        assert_eq!(id.len(), 16);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_defaults_applied() {
        let topo = compile(&config()).unwrap();
        let dc1 = &topo.clusters["dc1"];

        assert_eq!(dc1.network_name, "dc1");
        assert_eq!(dc1.datacenter, "dc1");
        assert_eq!(topo.networks["dc1"].docker_name, format!("sprawl-dc1-{}", topo.id));
        assert_eq!(dc1.nodes[0].index, 0);
        assert_eq!(dc1.nodes[1].index, 1);
        assert_eq!(dc1.nodes[0].sorted_ports(), vec![8500, 8503]);
        assert_eq!(dc1.nodes[1].sorted_ports(), vec![8500, 8502]);
        assert_eq!(
            dc1.nodes[1].docker_name(),
            format!("sprawl-dc1-client1-{}", topo.id)
        );
        assert!(dc1.has_only_default_tenancy());
    }

    #[test]
    fn test_agent_image_rejected_at_top_level() {
        let mut cfg = config();
        cfg.images.agent = "consul:dev".into();
        assert_eq!(compile(&cfg), Err(CompileError::AgentImageAtTopLevel));
    }

    #[test]
    fn test_node_index_is_global() {
        let mut cfg = config();
        let mut dc2 = Cluster::new("dc2");
        dc2.nodes.push(Node::new(NodeKind::Server, "server1"));
        cfg.clusters.push(dc2);
        cfg.networks.push(Network::new("dc2", NetworkType::Lan));

        let topo = compile(&cfg).unwrap();
        assert_eq!(topo.clusters["dc2"].nodes[0].index, 2);
    }

    #[test]
    fn test_ce_cluster_rejects_namespaces() {
        let mut cfg = config();
        cfg.clusters[0].partitions.push(crate::domain::Partition {
            name: "default".into(),
            namespaces: vec!["ns1".into()],
        });
        assert!(matches!(compile(&cfg), Err(CompileError::Invalid { .. })));

        cfg.clusters[0].enterprise = true;
        let topo = compile(&cfg).unwrap();
        assert_eq!(topo.clusters["dc1"].namespaces_in("default"), vec!["default", "ns1"]);
    }
}
