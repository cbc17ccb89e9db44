// Copyright (c) 2025 - Cowboy AI, Inc.
//! Admin partitions and namespaces

use std::collections::BTreeSet;
use tracing::info;

use super::acl::upsert_policy;
use super::{acl_rules, Sprawl};
use crate::api::{AclLink, AclPolicy, AdminPartition, Namespace, NamespaceAclConfig, RequestOptions};
use crate::domain::{Cluster, DEFAULT_NAMESPACE, DEFAULT_PARTITION};
use crate::errors::{ResultExt, SprawlResult};

impl Sprawl {
    /// Create missing partitions, then make every namespace default to
    /// cross-namespace catalog reads. Enterprise clusters only.
    pub(super) async fn init_tenancies(&self, cluster: &Cluster) -> SprawlResult<()> {
        if !cluster.enterprise {
            return Ok(());
        }
        let client = self.client(&cluster.name)?;

        let existing: BTreeSet<String> = client
            .partition_list()
            .await
            .with_context(|| format!("cluster {:?}: list partitions", cluster.name))?
            .into_iter()
            .map(|p| p.name)
            .collect();
        for name in cluster.partition_names() {
            if name == DEFAULT_PARTITION || existing.contains(name) {
                continue;
            }
            client
                .partition_create(&AdminPartition {
                    name: name.to_string(),
                    description: "created via sprawl".to_string(),
                })
                .await
                .with_context(|| format!("cluster {:?}: create partition {name:?}", cluster.name))?;
            info!(cluster = %cluster.name, partition = name, "partition created");
        }

        for partition in &cluster.partitions {
            let opts = RequestOptions::partition(&partition.name);
            let policy = AclPolicy {
                name: acl_rules::CROSS_NAMESPACE_POLICY.to_string(),
                description: "cross namespace catalog read".to_string(),
                rules: acl_rules::cross_namespace_read(&partition.name),
                ..Default::default()
            };
            upsert_policy(client.as_ref(), &policy, &opts)
                .await
                .with_context(|| {
                    format!("cluster {:?}: cross namespace policy in {:?}", cluster.name, partition.name)
                })?;

            let existing: BTreeSet<String> = client
                .namespace_list(&opts)
                .await
                .with_context(|| format!("cluster {:?}: list namespaces", cluster.name))?
                .into_iter()
                .map(|ns| ns.name)
                .collect();

            for name in &partition.namespaces {
                let ns = Namespace {
                    name: name.clone(),
                    partition: partition.name.clone(),
                    description: if name == DEFAULT_NAMESPACE {
                        "Builtin Default Namespace".to_string()
                    } else {
                        "created via sprawl".to_string()
                    },
                    acls: Some(NamespaceAclConfig {
                        policy_defaults: vec![AclLink::by_name(acl_rules::CROSS_NAMESPACE_POLICY)],
                    }),
                };
                if existing.contains(name) {
                    client.namespace_update(&ns, &opts).await
                } else {
                    client.namespace_create(&ns, &opts).await
                }
                .with_context(|| {
                    format!("cluster {:?}: namespace {}/{}", cluster.name, partition.name, name)
                })?;
            }
            info!(
                cluster = %cluster.name,
                partition = %partition.name,
                namespaces = partition.namespaces.len(),
                "namespaces ready"
            );
        }
        Ok(())
    }
}
