// Copyright (c) 2025 - Cowboy AI, Inc.
//! ACL bootstrap and token management
//!
//! Tokens are matched by description so that a relaunch finds and updates
//! what an earlier launch created instead of minting duplicates.

use tracing::{debug, info};

use super::{acl_rules, Sprawl};
use crate::api::{
    AclLink, AclNodeIdentity, AclPolicy, AclServiceIdentity, AclTemplateVariables,
    AclTemplatedPolicy, AclToken, ControlPlane, RequestOptions, ANONYMOUS_ACCESSOR,
    GLOBAL_MANAGEMENT_POLICY,
};
use crate::domain::{Cluster, Node, Workload, DEFAULT_NAMESPACE};
use crate::errors::{ResultExt, SprawlResult};
use crate::retry::{retry_on, retry_until, Attempt};
use crate::secrets::GenericSecret;

impl Sprawl {
    /// Bootstrap the ACL system, or confirm a stored bootstrap token still
    /// works. Returns the management token.
    pub(super) async fn bootstrap_acls(&self, cluster: &Cluster) -> SprawlResult<String> {
        let client = self.client(&cluster.name)?;
        let timings = self.timings();

        if let Some(token) = self.management_token(&cluster.name) {
            let opts = RequestOptions::default().with_token(token.clone());
            retry_until(&timings.acl_bootstrap(), "acl ready", || {
                let client = client.clone();
                let opts = opts.clone();
                async move {
                    match client
                        .acl_policy_read_by_name(GLOBAL_MANAGEMENT_POLICY, &opts)
                        .await
                    {
                        Ok(Some(_)) => Attempt::Done(()),
                        Ok(None) => Attempt::Again("management policy not visible".to_string()),
                        Err(e) if e.is_bootstrap_pending() => Attempt::Again(e.to_string()),
                        Err(e) => Attempt::Abort(e),
                    }
                }
            })
            .await?;
            debug!(cluster = %cluster.name, "acl system ready");
            return Ok(token);
        }

        let token = retry_on(
            &timings.acl_bootstrap(),
            "acl bootstrap",
            |e: &crate::api::ApiError| e.is_bootstrap_pending(),
            || client.acl_bootstrap(),
        )
        .await?;
        self.secrets
            .save_generic(&cluster.name, GenericSecret::BootstrapToken, token.secret_id.clone());
        info!(cluster = %cluster.name, "acl bootstrapped");
        Ok(token.secret_id)
    }

    /// Let anonymous requests read the catalog
    pub(super) async fn create_anonymous_token(&self, cluster: &Cluster) -> SprawlResult<()> {
        let client = self.client(&cluster.name)?;
        let opts = RequestOptions::default();
        let policy = AclPolicy {
            name: acl_rules::ANONYMOUS_POLICY.to_string(),
            description: "anonymous".to_string(),
            rules: acl_rules::anonymous(cluster.enterprise),
            ..Default::default()
        };
        upsert_policy(client.as_ref(), &policy, &opts)
            .await
            .with_context(|| format!("cluster {:?}: anonymous policy", cluster.name))?;

        let token = AclToken {
            accessor_id: ANONYMOUS_ACCESSOR.to_string(),
            description: "Anonymous Token".to_string(),
            policies: vec![AclLink::by_name(acl_rules::ANONYMOUS_POLICY)],
            ..Default::default()
        };
        client
            .acl_token_update(&token, &opts)
            .await
            .with_context(|| format!("cluster {:?}: anonymous token", cluster.name))?;
        info!(cluster = %cluster.name, "anonymous token updated");
        Ok(())
    }

    /// One token per agent node, disabled nodes included so they can be
    /// enabled later without another ACL pass.
    pub(super) async fn create_agent_tokens(&self, cluster: &Cluster) -> SprawlResult<()> {
        let client = self.client(&cluster.name)?;
        for node in cluster.nodes.iter().filter(|n| n.is_agent()) {
            if self.secrets.read_agent_token(&cluster.name, &node.id()).is_some() {
                continue;
            }
            let opts = RequestOptions::tenancy(&node.partition, DEFAULT_NAMESPACE)
                .for_enterprise(cluster.enterprise);
            let token = upsert_token(client.as_ref(), &agent_token(cluster, node), &opts)
                .await
                .with_context(|| format!("cluster {:?}: agent token for {}", cluster.name, node.id()))?;
            info!(cluster = %cluster.name, node = %node.id(), "agent token created");
            self.secrets
                .save_agent_token(&cluster.name, &node.id(), token.secret_id);
        }
        Ok(())
    }

    /// One token per workload on enabled nodes. Mesh gateways also get
    /// their own policy.
    pub(super) async fn create_workload_tokens(&self, cluster: &Cluster) -> SprawlResult<()> {
        let client = self.client(&cluster.name)?;
        for node in cluster.nodes.iter().filter(|n| !n.disabled) {
            for wrk in node.sorted_workloads() {
                if self.secrets.read_workload_token(&cluster.name, &wrk.id).is_some() {
                    continue;
                }
                let opts = RequestOptions::tenancy(&wrk.id.partition, &wrk.id.namespace)
                    .for_enterprise(cluster.enterprise);

                let mut token = workload_token(cluster, wrk);
                if wrk.is_mesh_gateway {
                    let policy = AclPolicy {
                        name: acl_rules::mesh_gateway_policy_name(&wrk.id),
                        description: format!("mesh gateway {}", wrk.id),
                        rules: acl_rules::mesh_gateway(&wrk.id, cluster.enterprise),
                        ..Default::default()
                    };
                    let policy_opts = RequestOptions::tenancy(&wrk.id.partition, DEFAULT_NAMESPACE)
                        .for_enterprise(cluster.enterprise);
                    upsert_policy(client.as_ref(), &policy, &policy_opts)
                        .await
                        .with_context(|| format!("cluster {:?}: policy {}", cluster.name, policy.name))?;
                    token.policies.push(AclLink::by_name(policy.name));
                }

                let token = upsert_token(client.as_ref(), &token, &opts)
                    .await
                    .with_context(|| format!("cluster {:?}: token for {}", cluster.name, wrk.id))?;
                info!(cluster = %cluster.name, workload = %wrk.id, "workload token created");
                self.secrets
                    .save_workload_token(&cluster.name, &wrk.id, token.secret_id);
            }
        }
        Ok(())
    }
}

fn agent_token(cluster: &Cluster, node: &Node) -> AclToken {
    AclToken {
        description: format!("agent--{}", node.id().acl_string()),
        node_identities: vec![AclNodeIdentity {
            node_name: node.pod_name(),
            datacenter: cluster.datacenter.clone(),
        }],
        ..Default::default()
    }
}

fn workload_token(cluster: &Cluster, wrk: &Workload) -> AclToken {
    let mut token = AclToken {
        description: format!("service--{}", wrk.id.acl_string()),
        ..Default::default()
    };
    if wrk.is_v2() {
        token.templated_policies = vec![AclTemplatedPolicy {
            template_name: acl_rules::WORKLOAD_IDENTITY_TEMPLATE.to_string(),
            template_variables: Some(AclTemplateVariables {
                name: wrk.identity_name().to_string(),
            }),
        }];
    } else {
        token.service_identities = vec![AclServiceIdentity {
            service_name: wrk.id.name.clone(),
            datacenters: vec![cluster.datacenter.clone()],
        }];
    }
    token
}

/// Create the policy, or overwrite the rules of the one with its name
pub(super) async fn upsert_policy(
    client: &dyn ControlPlane,
    policy: &AclPolicy,
    opts: &RequestOptions,
) -> SprawlResult<AclPolicy> {
    match client.acl_policy_read_by_name(&policy.name, opts).await? {
        Some(existing) => {
            let updated = AclPolicy {
                id: existing.id,
                ..policy.clone()
            };
            Ok(client.acl_policy_update(&updated, opts).await?)
        }
        None => Ok(client.acl_policy_create(policy, opts).await?),
    }
}

/// Create the token, or update the one with the same description
async fn upsert_token(
    client: &dyn ControlPlane,
    token: &AclToken,
    opts: &RequestOptions,
) -> SprawlResult<AclToken> {
    let existing = client
        .acl_token_list(opts)
        .await?
        .into_iter()
        .find(|t| t.description == token.description);
    match existing {
        Some(existing) => {
            let updated = AclToken {
                accessor_id: existing.accessor_id,
                secret_id: existing.secret_id,
                ..token.clone()
            };
            Ok(client.acl_token_update(&updated, opts).await?)
        }
        None => Ok(client.acl_token_create(token, opts).await?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{NodeKind, NodeVersion, WorkloadId};
    use pretty_assertions::assert_eq;

    fn dc1() -> Cluster {
        Cluster {
            datacenter: "dc1".into(),
            ..Cluster::new("dc1")
        }
    }

    #[test]
    fn test_agent_token_uses_node_identity() {
        let mut node = Node::new(NodeKind::Client, "c1");
        node.set_docker_name("sprawl-dc1-c1".into());
        let token = agent_token(&dc1(), &node);
        assert_eq!(token.description, "agent--default--c1");
        assert_eq!(token.node_identities[0].node_name, "sprawl-dc1-c1-pod");
        assert_eq!(token.node_identities[0].datacenter, "dc1");
    }

    #[test]
    fn test_workload_token_by_catalog_version() {
        let mut wrk = Workload::new(WorkloadId::new("ping", "", ""), "pinger", 8080);
        let v1 = workload_token(&dc1(), &wrk);
        assert_eq!(v1.description, "service--default--default--ping");
        assert_eq!(v1.service_identities[0].service_name, "ping");
        assert!(v1.templated_policies.is_empty());

        wrk.node_version = NodeVersion::V2;
        wrk.workload_identity = Some("ping-identity".into());
        let v2 = workload_token(&dc1(), &wrk);
        assert!(v2.service_identities.is_empty());
        assert_eq!(
            v2.templated_policies[0].template_variables,
            Some(AclTemplateVariables {
                name: "ping-identity".into()
            })
        );
    }
}
