// Copyright (c) 2025 - Cowboy AI, Inc.
//! Multi-cluster topology compiler and phased deployment orchestrator
//!
//! A declarative [`Config`] describes networks, clusters, nodes, workloads
//! and peerings. The [`compiler`] resolves it into a [`Topology`], the
//! [`infra`] generator renders and applies that topology step by step, and
//! [`Sprawl`] brings every cluster's control plane (ACLs, tenancy, catalog,
//! peerings) to the state the topology asks for.

pub mod api;
pub mod compiler;
pub mod config;
pub mod domain;
pub mod errors;
pub mod infra;
pub mod retry;
pub mod secrets;
pub mod simulated;
pub mod sprawl;
pub mod state_machine;

// Re-export commonly used types
pub use api::{ApiError, ControlPlane, ControlPlaneConnector, ErrorKind, RequestOptions, TokenChoice};
pub use compiler::{compile, recompile, CompileError};
pub use config::{RetryTimings, SprawlConfig};
pub use domain::{Config, Topology};
pub use errors::{ResultExt, SprawlError, SprawlResult};
pub use infra::Provisioner;
pub use simulated::SimulatedWorld;
pub use sprawl::{RelaunchMode, Sprawl, UpgradeMode};
