// Copyright (c) 2025 - Cowboy AI, Inc.
//! Compile errors
//!
//! Every failure is fatal and path-qualified; there is no partial compile.

use thiserror::Error;

use crate::domain::{LabelError, ValidationError};

/// Reminder attached to node identity errors
pub const DISABLE_HINT: &str = "use the disabled flag if you want to ignore a node";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CompileError {
    #[error("topology.networks is empty")]
    NetworksEmpty,

    #[error("topology.clusters is empty")]
    ClustersEmpty,

    #[error("topology.images.agent cannot be set at this level")]
    AgentImageAtTopLevel,

    #[error("cannot have two networks with the same name {0:?}")]
    DuplicateNetwork(String),

    #[error(
        "cannot have two clusters with the same name {0:?}; use unique names and override the datacenter field if that's what you want"
    )]
    DuplicateCluster(String),

    #[error("{what} name is not valid: {name:?}: {source}")]
    InvalidLabel {
        what: &'static str,
        name: String,
        #[source]
        source: LabelError,
    },

    #[error("port used more than once on cluster {cluster:?} node {node:?}: {port}")]
    PortReuse {
        cluster: String,
        node: String,
        port: u16,
    },

    #[error("cluster {cluster:?} node {node:?} service {workload:?} is not valid: {source}")]
    InvalidWorkload {
        cluster: String,
        node: String,
        workload: String,
        #[source]
        source: ValidationError,
    },

    #[error("cluster[{cluster}] found topology references to peerings that do not exist: {names:?}")]
    UnknownPeerings { cluster: String, names: Vec<String> },

    #[error("cluster {cluster:?}: too many ips using this approach to VIPs")]
    TooManyVirtualIps { cluster: String },

    #[error("cannot create or destroy {0}")]
    KeySetChanged(&'static str),

    #[error("networks cannot change: network {0:?} differs from the previous compile")]
    NetworkChanged(String),

    #[error("cannot edit some {what} fields for {id:?}")]
    ImmutableEdit { what: &'static str, id: String },

    #[error("cluster {cluster:?}: node {node:?} has vanished; {DISABLE_HINT}")]
    NodeVanished { cluster: String, node: String },

    #[error("cluster {cluster:?}: node {node:?} has been shuffled {from} -> {to}; {DISABLE_HINT}")]
    NodeShuffled {
        cluster: String,
        node: String,
        from: usize,
        to: usize,
    },

    #[error(
        "cluster {cluster:?} node {node:?}: service {workload:?} has vanished; disable the node to remove its services"
    )]
    WorkloadVanished {
        cluster: String,
        node: String,
        workload: String,
    },

    #[error("{path}: {reason}")]
    Invalid { path: String, reason: String },
}

/// Result type for compile operations
pub type CompileResult<T> = Result<T, CompileError>;

impl CompileError {
    pub(crate) fn invalid(path: impl Into<String>, reason: impl Into<String>) -> Self {
        CompileError::Invalid {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Validate a DNS label, naming what it labels on failure
pub(crate) fn check_label(what: &'static str, name: &str) -> CompileResult<()> {
    crate::domain::validate_label(name).map_err(|source| CompileError::InvalidLabel {
        what,
        name: name.to_string(),
        source,
    })
}
