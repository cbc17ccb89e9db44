// Copyright (c) 2025 - Cowboy AI, Inc.
//! Peer-link resolution
//!
//! Declared peerings are validated, their peer names defaulted, and each
//! side linked to an un-linked copy of the other. Destinations are then
//! denormalized against the resulting per-cluster peer map.

use std::collections::{BTreeMap, BTreeSet};

use super::error::{CompileError, CompileResult};
use crate::domain::{
    partition_or_default, Cluster, NetworkArea, PeerCluster, Peering, DEFAULT_PARTITION,
};

/// Peer names referenced by destinations, per cluster
pub(crate) type FoundPeerNames = BTreeMap<String, BTreeSet<String>>;

/// Default local name one side uses for the other
pub fn default_peer_name(other: &PeerCluster) -> String {
    format!("peer-{}-{}", other.name, other.partition)
}

fn check_side(
    clusters: &BTreeMap<String, Cluster>,
    side: &mut PeerCluster,
    path: &str,
) -> CompileResult<()> {
    let cluster = clusters
        .get(&side.name)
        .ok_or_else(|| CompileError::invalid(path, format!("cluster {:?} does not exist", side.name)))?;

    side.partition = partition_or_default(&side.partition).to_string();
    if cluster.enterprise {
        if !cluster.has_partition(&side.partition) {
            return Err(CompileError::invalid(
                path,
                format!(
                    "partition {:?} does not exist in cluster {:?}",
                    side.partition, side.name
                ),
            ));
        }
    } else if side.partition != DEFAULT_PARTITION {
        return Err(CompileError::invalid(
            path,
            format!("partitions are an enterprise feature: cluster {:?}", side.name),
        ));
    }
    Ok(())
}

fn insert_side(
    by_cluster: &mut BTreeMap<String, BTreeMap<String, PeerCluster>>,
    side: &PeerCluster,
    path: &str,
) -> CompileResult<()> {
    let peers = by_cluster.entry(side.name.clone()).or_default();
    if peers.contains_key(&side.peer_name) {
        return Err(CompileError::invalid(
            path,
            format!(
                "cluster {:?} already has a peering named {:?}",
                side.name, side.peer_name
            ),
        ));
    }
    peers.insert(side.peer_name.clone(), side.clone());
    Ok(())
}

/// Validate and link every peering, then attach peer maps and denormalize
/// destinations on each cluster.
pub(crate) fn resolve(
    peerings: &mut [Peering],
    clusters: &mut BTreeMap<String, Cluster>,
    mut found: FoundPeerNames,
) -> CompileResult<()> {
    let mut by_cluster: BTreeMap<String, BTreeMap<String, PeerCluster>> = BTreeMap::new();

    for p in peerings.iter_mut() {
        let path = format!("peering {p}");
        check_side(clusters, &mut p.dialing, &path)?;
        check_side(clusters, &mut p.accepting, &path)?;
        if p.dialing.name == p.accepting.name {
            return Err(CompileError::invalid(path, "self peerings are not allowed"));
        }

        if p.accepting.peer_name.is_empty() {
            p.accepting.peer_name = default_peer_name(&p.dialing);
        }
        if p.dialing.peer_name.is_empty() {
            p.dialing.peer_name = default_peer_name(&p.accepting);
        }

        let accepting = p.accepting.unlinked();
        let dialing = p.dialing.unlinked();
        p.accepting.link = Some(Box::new(dialing));
        p.dialing.link = Some(Box::new(accepting));

        insert_side(&mut by_cluster, &p.accepting, &path)?;
        insert_side(&mut by_cluster, &p.dialing, &path)?;

        for side in [&p.accepting, &p.dialing] {
            if let Some(names) = found.get_mut(&side.name) {
                names.remove(&side.peer_name);
            }
        }
    }

    for (cluster, names) in &found {
        if !names.is_empty() {
            return Err(CompileError::UnknownPeerings {
                cluster: cluster.clone(),
                names: names.iter().cloned().collect(),
            });
        }
    }

    for cluster in clusters.values_mut() {
        cluster.peerings = by_cluster.remove(&cluster.name).unwrap_or_default();
        denormalize_destinations(cluster)?;
    }
    Ok(())
}

fn denormalize_destinations(cluster: &mut Cluster) -> CompileResult<()> {
    let name = cluster.name.clone();
    let peerings = &cluster.peerings;
    for node in &mut cluster.nodes {
        for wrk in &mut node.workloads {
            for dest in wrk.all_destinations_mut() {
                let Some(peer) = dest.peer.as_deref() else {
                    dest.cluster = name.clone();
                    dest.peering = None;
                    continue;
                };
                let link = peerings
                    .get(peer)
                    .and_then(|side| side.link.as_deref())
                    .ok_or_else(|| {
                        CompileError::invalid(
                            format!("cluster {name:?}"),
                            format!("peering {peer:?} has no link"),
                        )
                    })?;
                dest.cluster = link.name.clone();
                dest.id.partition = link.partition.clone();
                dest.peering = Some(link.clone());
            }
        }
    }
    Ok(())
}

/// Network areas join two distinct enterprise clusters.
pub(crate) fn check_network_areas(
    areas: &mut [NetworkArea],
    clusters: &BTreeMap<String, Cluster>,
) -> CompileResult<()> {
    for area in areas.iter_mut() {
        let path = format!("network area {area}");
        for side in [&mut area.primary, &mut area.secondary] {
            let cluster = clusters.get(&side.name).ok_or_else(|| {
                CompileError::invalid(&path, format!("cluster {:?} does not exist", side.name))
            })?;
            if !cluster.enterprise {
                return Err(CompileError::invalid(
                    &path,
                    format!("network areas are an enterprise feature: cluster {:?}", side.name),
                ));
            }
            side.partition = partition_or_default(&side.partition).to_string();
        }
        if area.primary.name == area.secondary.name {
            return Err(CompileError::invalid(path, "a network area needs two clusters"));
        }
    }
    Ok(())
}
