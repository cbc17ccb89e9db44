// Copyright (c) 2025 - Cowboy AI, Inc.
//! Config and Topology Aggregates
//!
//! [`Config`] is the user-authored input. [`Topology`] is the compiled
//! aggregate root: fully defaulted, invariant-checked, and keyed by name.
//! The orchestrator owns exactly one `Topology` at a time and replaces it
//! wholesale on every recompile.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

use super::cluster::Cluster;
use super::ids::NodeId;
use super::images::Images;
use super::network::Network;
use super::peering::{NetworkArea, Peering};

/// Config lookup and loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("no such cluster: {0:?}")]
    NoSuchCluster(String),

    #[error("expected to find node {node} in cluster {cluster:?}")]
    NoSuchNode { cluster: String, node: NodeId },

    #[error("found output network that does not exist: {0}")]
    NoSuchNetwork(String),
}

/// Declarative topology input
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Overrides the built-in default images
    #[serde(default, skip_serializing_if = "Images::is_empty")]
    pub images: Images,

    #[serde(default)]
    pub networks: Vec<Network>,

    #[serde(default)]
    pub clusters: Vec<Cluster>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub peerings: Vec<Peering>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub network_areas: Vec<NetworkArea>,
}

impl Config {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    pub fn cluster(&self, name: &str) -> Option<&Cluster> {
        self.clusters.iter().find(|c| c.name == name)
    }

    pub fn cluster_mut(&mut self, name: &str) -> Option<&mut Cluster> {
        self.clusters.iter_mut().find(|c| c.name == name)
    }

    /// Mark a node disabled. Returns `false` if it already was.
    pub fn disable_node(&mut self, cluster: &str, node: &NodeId) -> Result<bool, ConfigError> {
        self.set_node_disabled(cluster, node, true)
    }

    /// Mark a node enabled. Returns `false` if it already was.
    pub fn enable_node(&mut self, cluster: &str, node: &NodeId) -> Result<bool, ConfigError> {
        self.set_node_disabled(cluster, node, false)
    }

    fn set_node_disabled(
        &mut self,
        cluster: &str,
        node: &NodeId,
        disabled: bool,
    ) -> Result<bool, ConfigError> {
        let found = self
            .cluster_mut(cluster)
            .ok_or_else(|| ConfigError::NoSuchCluster(cluster.to_string()))?
            .node_by_id_mut(node)
            .ok_or_else(|| ConfigError::NoSuchNode {
                cluster: cluster.to_string(),
                node: node.clone(),
            })?;

        if found.disabled == disabled {
            return Ok(false);
        }
        found.disabled = disabled;
        Ok(true)
    }
}

/// Compiled topology
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topology {
    /// Opaque per-run identifier, stable across recompiles
    pub id: String,

    /// Resolved topology-level images
    pub images: Images,

    pub networks: BTreeMap<String, Network>,

    pub clusters: BTreeMap<String, Cluster>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub peerings: Vec<Peering>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub network_areas: Vec<NetworkArea>,
}

impl Topology {
    pub fn cluster(&self, name: &str) -> Option<&Cluster> {
        self.clusters.get(name)
    }

    pub fn cluster_mut(&mut self, name: &str) -> Option<&mut Cluster> {
        self.clusters.get_mut(name)
    }

    pub fn network(&self, name: &str) -> Option<&Network> {
        self.networks.get(name)
    }

    /// Networks in name order
    pub fn sorted_networks(&self) -> impl Iterator<Item = &Network> {
        self.networks.values()
    }

    /// Clusters in name order
    pub fn sorted_clusters(&self) -> impl Iterator<Item = &Cluster> {
        self.clusters.values()
    }

    /// Record a network's forward-proxy port, copying it onto every node
    /// address on that network. Returns `true` when it changed.
    pub fn digest_exposed_proxy_port(
        &mut self,
        network: &str,
        proxy_port: u16,
    ) -> Result<bool, ConfigError> {
        let net = self
            .networks
            .get_mut(network)
            .ok_or_else(|| ConfigError::NoSuchNetwork(network.to_string()))?;
        if net.proxy_port == Some(proxy_port) {
            return Ok(false);
        }
        net.proxy_port = Some(proxy_port);

        for cluster in self.clusters.values_mut() {
            for node in &mut cluster.nodes {
                for addr in node.addresses.iter_mut().filter(|a| a.network == network) {
                    addr.proxy_port = Some(proxy_port);
                }
            }
        }
        Ok(true)
    }
}
