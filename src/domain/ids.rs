// Copyright (c) 2025 - Cowboy AI, Inc.
//! Node and Workload Identity
//!
//! Identities are tenancy-qualified. An empty partition or namespace always
//! means `"default"`; [`NodeId::normalize`] and [`WorkloadId::normalize`]
//! make that explicit so identities compare equal regardless of how they were
//! written in the config.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Partition used when none is given
pub const DEFAULT_PARTITION: &str = "default";

/// Namespace used when none is given
pub const DEFAULT_NAMESPACE: &str = "default";

/// Returns `"default"` for an empty partition.
pub fn partition_or_default(partition: &str) -> &str {
    if partition.is_empty() {
        DEFAULT_PARTITION
    } else {
        partition
    }
}

/// Returns `"default"` for an empty namespace.
pub fn namespace_or_default(namespace: &str) -> &str {
    if namespace.is_empty() {
        DEFAULT_NAMESPACE
    } else {
        namespace
    }
}

/// Identity of a node within a cluster
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId {
    pub name: String,
    #[serde(default)]
    pub partition: String,
}

impl NodeId {
    /// Create a normalized node identity
    pub fn new(name: impl Into<String>, partition: impl AsRef<str>) -> Self {
        Self {
            name: name.into(),
            partition: partition_or_default(partition.as_ref()).to_string(),
        }
    }

    /// Fill in the default partition
    pub fn normalize(&mut self) {
        self.partition = partition_or_default(&self.partition).to_string();
    }

    /// Form used in ACL token descriptions
    pub fn acl_string(&self) -> String {
        format!("{}--{}", partition_or_default(&self.partition), self.name)
    }

    /// Form used in generated resource names
    pub fn tf_string(&self) -> String {
        if partition_or_default(&self.partition) == DEFAULT_PARTITION {
            self.name.clone()
        } else {
            format!("{}-{}", self.partition, self.name)
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if partition_or_default(&self.partition) == DEFAULT_PARTITION {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}/{}", self.partition, self.name)
        }
    }
}

/// Identity of a workload (service) within a cluster
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WorkloadId {
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub partition: String,
}

impl WorkloadId {
    /// Create a normalized workload identity
    pub fn new(
        name: impl Into<String>,
        namespace: impl AsRef<str>,
        partition: impl AsRef<str>,
    ) -> Self {
        Self {
            name: name.into(),
            namespace: namespace_or_default(namespace.as_ref()).to_string(),
            partition: partition_or_default(partition.as_ref()).to_string(),
        }
    }

    /// Fill in the default partition and namespace
    pub fn normalize(&mut self) {
        self.namespace = namespace_or_default(&self.namespace).to_string();
        self.partition = partition_or_default(&self.partition).to_string();
    }

    /// Same identity with a different name, e.g. for sidecar proxies
    pub fn with_name(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: self.namespace.clone(),
            partition: self.partition.clone(),
        }
    }

    /// Form used in ACL token and policy descriptions
    pub fn acl_string(&self) -> String {
        format!(
            "{}--{}--{}",
            partition_or_default(&self.partition),
            namespace_or_default(&self.namespace),
            self.name
        )
    }

    /// Form used in generated resource names
    pub fn tf_string(&self) -> String {
        if self.is_default_tenancy() {
            self.name.clone()
        } else {
            format!(
                "{}-{}-{}",
                partition_or_default(&self.partition),
                namespace_or_default(&self.namespace),
                self.name
            )
        }
    }

    fn is_default_tenancy(&self) -> bool {
        partition_or_default(&self.partition) == DEFAULT_PARTITION
            && namespace_or_default(&self.namespace) == DEFAULT_NAMESPACE
    }
}

impl fmt::Display for WorkloadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_default_tenancy() {
            write!(f, "{}", self.name)
        } else {
            write!(
                f,
                "{}/{}/{}",
                partition_or_default(&self.partition),
                namespace_or_default(&self.namespace),
                self.name
            )
        }
    }
}
