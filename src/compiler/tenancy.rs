// Copyright (c) 2025 - Cowboy AI, Inc.
//! Tenancy closure
//!
//! Every construct that names a partition or namespace adds it here. The
//! cluster's `partitions` list is then derived from the closure instead of
//! being trusted as declared.

use std::collections::{BTreeMap, BTreeSet};

use super::error::{check_label, CompileError, CompileResult};
use crate::domain::{
    namespace_or_default, partition_or_default, Cluster, Partition, DEFAULT_NAMESPACE,
};

/// Accumulated partition to namespace-set map
#[derive(Debug, Default)]
pub(crate) struct Tenancies {
    partitions: BTreeMap<String, BTreeSet<String>>,
}

impl Tenancies {
    pub(crate) fn add(&mut self, partition: &str, namespace: &str) {
        self.partitions
            .entry(partition_or_default(partition).to_string())
            .or_default()
            .insert(namespace_or_default(namespace).to_string());
    }

    /// Seed the closure from the cluster's declared partitions, config
    /// entries and resources.
    pub(crate) fn seed(cluster: &mut Cluster) -> CompileResult<Self> {
        let mut out = Tenancies::default();

        for partition in &cluster.partitions {
            check_label("partition", partition_or_default(&partition.name))?;
            out.add(&partition.name, DEFAULT_NAMESPACE);
            for ns in &partition.namespaces {
                check_label("namespace", namespace_or_default(ns))?;
                out.add(&partition.name, ns);
            }
        }

        for entry in &cluster.initial_config_entries {
            out.add(&entry.partition, &entry.namespace);
        }

        if !cluster.initial_resources.is_empty() {
            cluster.enable_v2 = true;
        }
        for res in &mut cluster.initial_resources {
            let path = format!("cluster {:?} initial resource {:?}", cluster.name, res.id.name);
            if !res.id.tenancy.is_local() {
                return Err(CompileError::invalid(
                    path,
                    "peer tenancy is not supported for initial resources",
                ));
            }
            if res.id.resource_type.is_compiler_owned() {
                return Err(CompileError::invalid(
                    path,
                    format!(
                        "resources of type {} are managed by the compiler",
                        res.id.resource_type
                    ),
                ));
            }
            res.id.tenancy.normalize();
            out.add(&res.id.tenancy.partition, &res.id.tenancy.namespace);
        }

        Ok(out)
    }

    /// Sorted partitions, each with its sorted namespaces
    pub(crate) fn into_partitions(self) -> Vec<Partition> {
        self.partitions
            .into_iter()
            .map(|(name, namespaces)| Partition {
                name,
                namespaces: namespaces.into_iter().collect(),
            })
            .collect()
    }
}
