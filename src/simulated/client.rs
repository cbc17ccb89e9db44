// Copyright (c) 2025 - Cowboy AI, Inc.
//! Control-plane client bound to one simulated node

use async_trait::async_trait;
use uuid::Uuid;

use super::cluster::SimCluster;
use super::{Fault, Faults, SimulatedWorld};
use crate::api::{
    AclPolicy, AclToken, AdminPartition, AgentServiceRegistration, ApiError, ApiResult,
    CatalogDeregistration, CatalogNode, CatalogRegistration, CatalogService, ControlPlane,
    ErrorKind, HealthCheck, Namespace, NetworkAreaSpec, PeeringEstablishRequest,
    PeeringGenerateTokenRequest, PeeringInfo, RequestOptions,
};
use crate::domain::{partition_or_default, ConfigEntry, NodeId, Resource, ResourceId};
use crate::infra::NodeSpec;

/// A [`ControlPlane`] that talks to a [`SimulatedWorld`] node
#[derive(Debug, Clone)]
pub struct SimulatedClient {
    world: SimulatedWorld,
    cluster: String,
    node: NodeId,
    token: Option<String>,
}

impl SimulatedClient {
    pub fn new(world: SimulatedWorld, cluster: &str, node: NodeId, token: Option<String>) -> Self {
        Self {
            world,
            cluster: cluster.to_string(),
            node,
            token,
        }
    }

    fn token<'a>(&'a self, opts: &'a RequestOptions) -> Option<&'a str> {
        opts.token.as_deref().or(self.token.as_deref())
    }

    fn unreachable(&self) -> ApiError {
        ApiError::new(
            ErrorKind::Transport,
            format!("dial {} in {}: connection refused", self.node, self.cluster),
        )
    }

    /// Run `f` against the bound node's cluster; the node must be running
    fn with<R>(
        &self,
        f: impl FnOnce(&mut SimCluster, &NodeSpec, &mut Faults) -> ApiResult<R>,
    ) -> ApiResult<R> {
        let mut guard = self.world.lock();
        let state = &mut *guard;
        let node = state
            .running
            .get(&(self.cluster.clone(), self.node.clone()))
            .ok_or_else(|| self.unreachable())?;
        let cluster = state
            .clusters
            .get_mut(&self.cluster)
            .ok_or_else(|| self.unreachable())?;
        f(cluster, node, &mut state.faults)
    }
}

#[async_trait]
impl ControlPlane for SimulatedClient {
    async fn acl_bootstrap(&self) -> ApiResult<AclToken> {
        self.with(|c, _, faults| {
            faults.raise(Fault::BootstrapPending)?;
            c.acl_bootstrap()
        })
    }

    async fn acl_token_read_self(&self) -> ApiResult<AclToken> {
        self.with(|c, _, _| c.acl_token_read_self(self.token.as_deref()))
    }

    async fn acl_token_list(&self, opts: &RequestOptions) -> ApiResult<Vec<AclToken>> {
        self.with(|c, _, _| c.acl_token_list(self.token(opts), opts))
    }

    async fn acl_token_create(&self, token: &AclToken, opts: &RequestOptions) -> ApiResult<AclToken> {
        self.with(|c, _, _| c.acl_token_create(self.token(opts), token, opts))
    }

    async fn acl_token_update(&self, token: &AclToken, opts: &RequestOptions) -> ApiResult<AclToken> {
        self.with(|c, _, _| c.acl_token_update(self.token(opts), token, opts))
    }

    async fn acl_policy_read_by_name(
        &self,
        name: &str,
        opts: &RequestOptions,
    ) -> ApiResult<Option<AclPolicy>> {
        self.with(|c, _, faults| {
            faults.raise(Fault::BootstrapPending)?;
            c.acl_policy_read_by_name(self.token(opts), name, opts)
        })
    }

    async fn acl_policy_list(&self, opts: &RequestOptions) -> ApiResult<Vec<AclPolicy>> {
        self.with(|c, _, _| c.acl_policy_list(self.token(opts), opts))
    }

    async fn acl_policy_create(&self, policy: &AclPolicy, opts: &RequestOptions) -> ApiResult<AclPolicy> {
        self.with(|c, _, _| c.acl_policy_create(self.token(opts), policy, opts))
    }

    async fn acl_policy_update(&self, policy: &AclPolicy, opts: &RequestOptions) -> ApiResult<AclPolicy> {
        self.with(|c, _, _| c.acl_policy_update(self.token(opts), policy, opts))
    }

    async fn partition_list(&self) -> ApiResult<Vec<AdminPartition>> {
        self.with(|c, _, _| c.partition_list(self.token.as_deref()))
    }

    async fn partition_create(&self, partition: &AdminPartition) -> ApiResult<AdminPartition> {
        self.with(|c, _, _| c.partition_create(self.token.as_deref(), partition))
    }

    async fn namespace_list(&self, opts: &RequestOptions) -> ApiResult<Vec<Namespace>> {
        self.with(|c, _, _| c.namespace_list(self.token(opts), opts))
    }

    async fn namespace_create(&self, ns: &Namespace, opts: &RequestOptions) -> ApiResult<Namespace> {
        self.with(|c, _, _| c.namespace_create(self.token(opts), ns, opts))
    }

    async fn namespace_update(&self, ns: &Namespace, opts: &RequestOptions) -> ApiResult<Namespace> {
        self.with(|c, _, _| c.namespace_update(self.token(opts), ns, opts))
    }

    async fn config_entry_set(&self, entry: &ConfigEntry) -> ApiResult<()> {
        self.with(|c, _, faults| {
            faults.raise(Fault::IntentionsMigrating)?;
            c.config_entry_set(self.token.as_deref(), entry)
        })
    }

    async fn resource_write(&self, resource: &Resource) -> ApiResult<()> {
        self.with(|c, _, faults| {
            faults.raise(Fault::AclNotFound)?;
            c.resource_write(self.token.as_deref(), resource)
        })
    }

    async fn resource_delete(&self, id: &ResourceId) -> ApiResult<()> {
        self.with(|c, _, faults| {
            faults.raise(Fault::DeleteConflict)?;
            c.resource_delete(self.token.as_deref(), id)
        })
    }

    async fn catalog_register(
        &self,
        reg: &CatalogRegistration,
        opts: &RequestOptions,
    ) -> ApiResult<()> {
        self.with(|c, _, faults| {
            faults.raise(Fault::AclNotFound)?;
            c.catalog_register(self.token(opts), reg)
        })
    }

    async fn catalog_deregister(
        &self,
        dereg: &CatalogDeregistration,
        opts: &RequestOptions,
    ) -> ApiResult<()> {
        self.with(|c, _, _| c.catalog_deregister(self.token(opts), dereg))
    }

    async fn catalog_nodes(&self, opts: &RequestOptions) -> ApiResult<Vec<CatalogNode>> {
        self.with(|c, _, _| c.catalog_nodes(self.token(opts), opts))
    }

    async fn catalog_service(
        &self,
        service: &str,
        opts: &RequestOptions,
    ) -> ApiResult<Vec<CatalogService>> {
        self.with(|c, _, _| c.catalog_service(self.token(opts), service, opts))
    }

    async fn health_checks(&self, service: &str, opts: &RequestOptions) -> ApiResult<Vec<HealthCheck>> {
        self.with(|c, _, _| c.health_checks(self.token(opts), service, opts))
    }

    async fn agent_service_register(
        &self,
        reg: &AgentServiceRegistration,
        opts: &RequestOptions,
    ) -> ApiResult<()> {
        self.with(|c, node, faults| {
            if node.agent.is_none() {
                return Err(ApiError::not_found("no agent on this node"));
            }
            faults.raise(Fault::AclNotFound)?;
            c.agent_service_register(
                self.token(opts),
                &node.pod_name,
                partition_or_default(&node.id.partition),
                reg,
            )
        })
    }

    async fn agent_join(&self, address: &str) -> ApiResult<()> {
        self.with(|c, _, _| {
            c.joins.insert(address.to_string());
            Ok(())
        })
    }

    async fn kv_put(&self, key: &str, value: &[u8], opts: &RequestOptions) -> ApiResult<()> {
        self.with(|c, _, _| c.kv_put(self.token(opts), key, value, opts))
    }

    async fn kv_get(&self, key: &str, opts: &RequestOptions) -> ApiResult<Option<Vec<u8>>> {
        self.with(|c, _, _| c.kv_get(self.token(opts), key, opts))
    }

    async fn status_leader(&self) -> ApiResult<String> {
        self.with(|c, _, _| Ok(c.leader.clone().unwrap_or_default()))
    }

    async fn status_peers(&self) -> ApiResult<Vec<String>> {
        self.with(|c, _, _| Ok(c.voters.clone()))
    }

    async fn snapshot_save(&self) -> ApiResult<Vec<u8>> {
        self.with(|c, _, _| c.snapshot_save(self.token.as_deref()))
    }

    async fn snapshot_restore(&self, snapshot: &[u8]) -> ApiResult<()> {
        self.with(|c, _, _| c.snapshot_restore(self.token.as_deref(), snapshot))
    }

    async fn peering_generate_token(&self, req: &PeeringGenerateTokenRequest) -> ApiResult<String> {
        self.with(|c, _, faults| {
            faults.raise(Fault::PeeringTimeout)?;
            c.check_write(self.token.as_deref(), "peering:write")
        })?;
        self.world
            .generate_peering_token(&self.cluster, &req.partition, &req.peer_name)
    }

    async fn peering_establish(&self, req: &PeeringEstablishRequest) -> ApiResult<()> {
        self.with(|c, _, faults| {
            faults.raise(Fault::PeeringTimeout)?;
            c.check_write(self.token.as_deref(), "peering:write")
        })?;
        self.world.establish_peering(
            &self.cluster,
            &req.partition,
            &req.peer_name,
            &req.peering_token,
        )
    }

    async fn peering_read(&self, name: &str, opts: &RequestOptions) -> ApiResult<Option<PeeringInfo>> {
        self.with(|c, _, _| c.peering_read(self.token(opts), name, opts))
    }

    async fn network_area_create(&self, area: &NetworkAreaSpec) -> ApiResult<String> {
        self.with(|c, _, _| {
            c.check_write(self.token.as_deref(), "operator:write")?;
            let id = Uuid::new_v4().to_string();
            let spec = NetworkAreaSpec {
                id: id.clone(),
                ..area.clone()
            };
            c.areas.insert(id.clone(), (spec, Default::default()));
            Ok(id)
        })
    }

    async fn network_area_join(&self, area_id: &str, addresses: &[String]) -> ApiResult<()> {
        self.with(|c, _, _| {
            c.check_write(self.token.as_deref(), "operator:write")?;
            let (_, joined) = c
                .areas
                .get_mut(area_id)
                .ok_or_else(|| ApiError::not_found(format!("network area {area_id:?} not found")))?;
            joined.extend(addresses.iter().cloned());
            Ok(())
        })
    }
}
