// Copyright (c) 2025 - Cowboy AI, Inc.
//! Infra Generation Boundary
//!
//! The [`Generator`] turns the live [`Topology`](crate::domain::Topology)
//! into a [`ResourceSet`] for one [`Step`], hands it to a [`Provisioner`],
//! and digests the ports the provisioner reports back into the topology.
//!
//! ```text
//! Topology + Step ──render──▶ ResourceSet ──apply──▶ Provisioner
//!        ▲                                               │
//!        └──────────── digest ◀── ApplyOutputs ◀─────────┘
//! ```
//!
//! What the provisioner does with a resource set (containers, VMs, an
//! in-process simulation) is opaque here.

use async_trait::async_trait;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::domain::{MissingExposedPort, NodeId, SubnetError};
use crate::state_machine::Step;

pub mod generator;
pub mod resources;
pub mod subnets;

pub use generator::Generator;
pub use resources::{AddressSpec, AgentSettings, ContainerSpec, NetworkSpec, NodeSpec, ResourceSet};
pub use subnets::SubnetAllocator;

/// Errors raised while generating or applying infrastructure
#[derive(Debug, Error)]
pub enum InfraError {
    #[error("network {network:?} subnet changed from {from} to {to} after launch")]
    SubnetChanged {
        network: String,
        from: String,
        to: String,
    },

    #[error(transparent)]
    MissingExposedPort(#[from] MissingExposedPort),

    #[error("network {0:?} has no ip pool; assign a subnet first")]
    NoIpPool(String),

    #[error("network {network:?} has no address for node index {index}")]
    NoIpForIndex { network: String, index: usize },

    #[error("found output network that does not exist: {0}")]
    NoSuchNetwork(String),

    #[error("found output node that does not exist: cluster {cluster:?} node {node}")]
    NoSuchNode { cluster: String, node: NodeId },

    #[error("no free subnets left")]
    SubnetsExhausted,

    #[error(transparent)]
    InvalidSubnet(#[from] SubnetError),

    #[error("provisioner failed during {step}: {message}")]
    Provision { step: Step, message: String },
}

/// Result type for infra operations
pub type InfraResult<T> = Result<T, InfraError>;

/// What a provisioner discovered while applying a resource set
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyOutputs {
    /// Internal → host port, per `(cluster, node)`
    pub node_ports: BTreeMap<(String, NodeId), BTreeMap<u16, u16>>,
    /// Forward-proxy host port, per network name
    pub proxy_ports: BTreeMap<String, u16>,
}

/// Applies rendered resource sets
///
/// Implementations must converge: applying the same set twice leaves the
/// infrastructure unchanged, and anything absent from the set (disabled
/// nodes, later steps) is removed or left unstarted.
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Bring infrastructure in line with `set`
    ///
    /// # Returns
    ///
    /// Host ports for every node and network in the set
    ///
    /// # Errors
    ///
    /// - `Provision` if the backend fails to apply
    async fn apply(&self, set: &ResourceSet) -> InfraResult<ApplyOutputs>;

    /// Tear down everything created for a topology
    async fn destroy(&self, topology_id: &str) -> InfraResult<()>;
}
