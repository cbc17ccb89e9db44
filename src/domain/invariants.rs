// Copyright (c) 2025 - Cowboy AI, Inc.
//! Pure Validation Functions - Workload Invariants
//!
//! Business rules a workload must satisfy before the compiler reserves its
//! ports or resolves its destinations. All functions are pure and return
//! detailed validation results.
//!
//! # Invariant Categories
//!
//! 1. **Port Invariants**: v1 single port vs v2 named ports
//! 2. **Mesh Invariants**: admin/listener ports, gateways, transparent proxy
//! 3. **Destination Invariants**: explicit vs implied destinations

use std::net::IpAddr;

use super::workload::{Destination, Workload};

/// Validation result with detailed error information
pub type ValidationResult = Result<(), ValidationError>;

/// Workload validation error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("service name is required")]
    MissingName,

    #[error("service image is required")]
    MissingImage,

    #[error("cannot specify both singleport and multiport on service in v2")]
    MixedPortStyles,

    #[error("cannot specify multiport on service in v1")]
    NamedPortsInV1,

    #[error("service has invalid port")]
    MissingPort,

    #[error("service has invalid port number {0:?}")]
    InvalidNamedPort(String),

    #[error("transparent proxy does not work with v1")]
    TransparentProxyInV1,

    #[error("cannot disable service mesh and {0}")]
    RequiresMesh(&'static str),

    #[error("cannot use envoy admin port without a service mesh")]
    AdminPortWithoutMesh,

    #[error("envoy admin port is required")]
    AdminPortRequired,

    #[error("cannot specify both a tcp and an http health check")]
    ConflictingChecks,

    #[error("destination service name is required")]
    DestinationNameRequired,

    #[error("destination {0:?} local port is required")]
    DestinationLocalPortRequired(String),

    #[error("destination {name:?} local address is invalid: {address}")]
    InvalidLocalAddress { name: String, address: String },

    #[error("destination {0:?}: implied field cannot be set")]
    ImpliedFieldSet(String),

    #[error("implied destination {0:?} cannot set a local address or port")]
    ImpliedLocalBind(String),
}

/// Validate a workload after version defaults have been applied
///
/// # Rules
/// - Name is required; image is required unless the workload is a mesh gateway
/// - Port rules per version (see [`validate_ports`])
/// - Mesh rules (see [`validate_mesh`])
/// - At most one health check
/// - Destination rules (see [`validate_destination`], [`validate_implied_destination`])
pub fn validate_workload(wrk: &Workload) -> ValidationResult {
    if wrk.id.name.is_empty() {
        return Err(ValidationError::MissingName);
    }
    if wrk.image.as_deref().unwrap_or_default().is_empty() && !wrk.is_mesh_gateway {
        return Err(ValidationError::MissingImage);
    }

    validate_ports(wrk)?;
    validate_mesh(wrk)?;

    if wrk.check_tcp.is_some() && wrk.check_http.is_some() {
        return Err(ValidationError::ConflictingChecks);
    }

    for dest in &wrk.destinations {
        validate_destination(dest)?;
    }
    for dest in &wrk.implied_destinations {
        validate_implied_destination(dest)?;
    }
    Ok(())
}

/// Validate port declarations
///
/// # Rules
/// - v2: only named ports, each with a non-zero number
/// - v1: no named ports, a non-zero single port, no transparent proxy
pub fn validate_ports(wrk: &Workload) -> ValidationResult {
    if wrk.is_v2() {
        if wrk.port.is_some() && !wrk.ports.is_empty() {
            return Err(ValidationError::MixedPortStyles);
        }
        for (name, port) in &wrk.ports {
            if port.number == 0 {
                return Err(ValidationError::InvalidNamedPort(name.clone()));
            }
        }
        return Ok(());
    }

    if !wrk.ports.is_empty() {
        return Err(ValidationError::NamedPortsInV1);
    }
    if wrk.port.unwrap_or_default() == 0 {
        return Err(ValidationError::MissingPort);
    }
    if wrk.enable_transparent_proxy {
        return Err(ValidationError::TransparentProxyInV1);
    }
    Ok(())
}

/// Validate service mesh settings
///
/// # Rules
/// - Disabling the mesh excludes gateways, destinations and transparent proxy
/// - The envoy admin port is required with a mesh and forbidden without one
pub fn validate_mesh(wrk: &Workload) -> ValidationResult {
    if wrk.disable_service_mesh {
        if wrk.is_mesh_gateway {
            return Err(ValidationError::RequiresMesh("still run a mesh gateway"));
        }
        if !wrk.destinations.is_empty() {
            return Err(ValidationError::RequiresMesh("configure destinations"));
        }
        if !wrk.implied_destinations.is_empty() {
            return Err(ValidationError::RequiresMesh(
                "configure implied destinations",
            ));
        }
        if wrk.enable_transparent_proxy {
            return Err(ValidationError::RequiresMesh("activate tproxy"));
        }
        if wrk.envoy_admin_port.is_some() {
            return Err(ValidationError::AdminPortWithoutMesh);
        }
    } else if wrk.envoy_admin_port.unwrap_or_default() == 0 {
        return Err(ValidationError::AdminPortRequired);
    }
    Ok(())
}

/// Validate an explicit destination
///
/// # Rules
/// - Target name and local port are required
/// - A local address, when given, must parse as an IP
/// - `implied` is compiler owned
pub fn validate_destination(dest: &Destination) -> ValidationResult {
    if dest.id.name.is_empty() {
        return Err(ValidationError::DestinationNameRequired);
    }
    if dest.local_port.unwrap_or_default() == 0 {
        return Err(ValidationError::DestinationLocalPortRequired(
            dest.id.name.clone(),
        ));
    }
    if let Some(address) = dest.local_address.as_deref() {
        if !address.is_empty() && address.parse::<IpAddr>().is_err() {
            return Err(ValidationError::InvalidLocalAddress {
                name: dest.id.name.clone(),
                address: address.to_string(),
            });
        }
    }
    if dest.implied {
        return Err(ValidationError::ImpliedFieldSet(dest.id.name.clone()));
    }
    Ok(())
}

/// Validate an implied destination
///
/// # Rules
/// - Target name is required
/// - No local address or local port
pub fn validate_implied_destination(dest: &Destination) -> ValidationResult {
    if dest.id.name.is_empty() {
        return Err(ValidationError::DestinationNameRequired);
    }
    if dest.local_port.is_some() || dest.local_address.is_some() {
        return Err(ValidationError::ImpliedLocalBind(dest.id.name.clone()));
    }
    Ok(())
}
