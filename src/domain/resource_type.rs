// Copyright (c) 2025 - Cowboy AI, Inc.
//! Typed Resource Type Taxonomy
//!
//! Every v2 resource is addressed by a `group.version.kind` triple. The
//! compiler and the catalog registrar write a fixed set of these; some of
//! them are derived by the control plane and may never be seeded by users.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// API version shared by the resource types used here
pub const V2_VERSION: &str = "v2beta1";

/// Resource type parse error
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid resource type {0:?}: expected group.version.kind")]
pub struct ResourceTypeError(pub String);

/// A `group.version.kind` triple
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceType {
    pub group: String,
    pub group_version: String,
    pub kind: String,
}

impl ResourceType {
    pub fn new(group: &str, kind: &str) -> Self {
        Self {
            group: group.to_string(),
            group_version: V2_VERSION.to_string(),
            kind: kind.to_string(),
        }
    }

    // Catalog
    pub fn workload() -> Self {
        Self::new("catalog", "Workload")
    }
    pub fn service() -> Self {
        Self::new("catalog", "Service")
    }
    pub fn health_status() -> Self {
        Self::new("catalog", "HealthStatus")
    }
    pub fn health_checks() -> Self {
        Self::new("catalog", "HealthChecks")
    }
    pub fn node() -> Self {
        Self::new("catalog", "Node")
    }
    pub fn service_endpoints() -> Self {
        Self::new("catalog", "ServiceEndpoints")
    }

    // Auth
    pub fn workload_identity() -> Self {
        Self::new("auth", "WorkloadIdentity")
    }
    pub fn computed_traffic_permissions() -> Self {
        Self::new("auth", "ComputedTrafficPermissions")
    }

    // Mesh
    pub fn destinations() -> Self {
        Self::new("mesh", "Destinations")
    }
    pub fn proxy_configuration() -> Self {
        Self::new("mesh", "ProxyConfiguration")
    }
    pub fn computed_routes() -> Self {
        Self::new("mesh", "ComputedRoutes")
    }
    pub fn proxy_state_template() -> Self {
        Self::new("mesh", "ProxyStateTemplate")
    }

    /// Types owned by the compiler, the registrar, or the control plane's
    /// own controllers. Seeding these by hand is rejected.
    pub fn is_compiler_owned(&self) -> bool {
        [
            Self::computed_traffic_permissions(),
            Self::workload_identity(),
            Self::computed_routes(),
            Self::proxy_state_template(),
            Self::health_checks(),
            Self::health_status(),
            Self::node(),
            Self::service_endpoints(),
            Self::workload(),
        ]
        .iter()
        .any(|owned| owned.group == self.group && owned.kind == self.kind)
    }

    /// URL path segment for the resource HTTP API
    pub fn path(&self) -> String {
        format!("{}/{}/{}", self.group, self.group_version, self.kind)
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.group, self.group_version, self.kind)
    }
}

impl FromStr for ResourceType {
    type Err = ResourceTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, '.');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(group), Some(version), Some(kind))
                if !group.is_empty() && !version.is_empty() && !kind.is_empty() =>
            {
                Ok(Self {
                    group: group.to_string(),
                    group_version: version.to_string(),
                    kind: kind.to_string(),
                })
            }
            _ => Err(ResourceTypeError(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_resource_type_parsing() {
        let t: ResourceType = "catalog.v2beta1.Workload".parse().unwrap();
        assert_eq!(t, ResourceType::workload());
        assert_eq!(t.to_string(), "catalog.v2beta1.Workload");
        assert!("catalog.Workload".parse::<ResourceType>().is_err());
    }

    #[test_case(ResourceType::workload(), true ; "workload")]
    #[test_case(ResourceType::workload_identity(), true ; "identity")]
    #[test_case(ResourceType::proxy_state_template(), true ; "proxy state")]
    #[test_case(ResourceType::service(), false ; "service")]
    #[test_case(ResourceType::destinations(), false ; "destinations")]
    #[test_case(ResourceType::new("auth", "TrafficPermissions"), false ; "traffic permissions")]
    fn test_compiler_owned(t: ResourceType, owned: bool) {
        assert_eq!(t.is_compiler_owned(), owned);
    }
}
