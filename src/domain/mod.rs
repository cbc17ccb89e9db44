// Copyright (c) 2025 - Cowboy AI, Inc.
//! Topology Domain Models
//!
//! The declarative input ([`Config`]) and its compiled form ([`Topology`]),
//! plus the entities and value objects both are built from.
//!
//! # Value Objects with Invariants
//!
//! - [`Subnet`] - IPv4 CIDR with a deterministic host pool
//! - [`NodeId`] / [`WorkloadId`] - tenancy-qualified identities
//! - [`Images`] - layered container image selection
//! - [`ResourceType`] - `group.version.kind` of typed resources
//! - DNS labels via [`validate_label`]
//!
//! # Entities
//!
//! - [`Network`] - a `lan` or `wan` network and its address pool
//! - [`Cluster`] - one consensus cluster and its nodes
//! - [`Node`] - a server, client agent, or dataplane
//! - [`Workload`] - a deployable unit on a node
//! - [`Peering`] / [`NetworkArea`] - cross-cluster links

pub mod cluster;
pub mod ids;
pub mod images;
pub mod invariants;
pub mod label;
pub mod network;
pub mod node;
pub mod peering;
pub mod resource;
pub mod resource_type;
pub mod subnet;
pub mod topology;
pub mod workload;

pub use cluster::Cluster;
pub use ids::{
    namespace_or_default, partition_or_default, NodeId, WorkloadId, DEFAULT_NAMESPACE,
    DEFAULT_PARTITION,
};
pub use images::Images;
pub use invariants::{ValidationError, ValidationResult};
pub use label::{is_valid_label, validate_label, LabelError};
pub use network::{Address, Network, NetworkType};
pub use node::{MissingExposedPort, NetworkSegment, Node, NodeKind, NodeVersion, AGENT_HTTP_PORT};
pub use peering::{NetworkArea, PeerCluster, Peering};
pub use resource::{ConfigEntry, Partition, Resource, ResourceId, ServicePort, Tenancy, V2Service};
pub use resource_type::ResourceType;
pub use subnet::{Subnet, SubnetError};
pub use topology::{Config, ConfigError, Topology};
pub use workload::{Destination, Port, Protocol, Workload};
