// Copyright (c) 2025 - Cowboy AI, Inc.
//! In-memory state of one simulated cluster

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

use crate::api::{
    AclLink, AclPolicy, AclToken, AdminPartition, AgentService, AgentServiceRegistration,
    ApiError, ApiResult, CatalogDeregistration, CatalogNode, CatalogRegistration, CatalogService,
    ErrorKind, HealthCheck, HealthCheckDefinition, Namespace, NetworkAreaSpec, PeeringInfo,
    RequestOptions, ANONYMOUS_ACCESSOR, GLOBAL_MANAGEMENT_POLICY, HEALTH_PASSING,
};
use crate::domain::{
    namespace_or_default, partition_or_default, ConfigEntry, Resource, ResourceId,
    DEFAULT_NAMESPACE, DEFAULT_PARTITION,
};

const GLOBAL_MANAGEMENT_ID: &str = "00000000-0000-0000-0000-000000000001";
const ANONYMOUS_SECRET: &str = "anonymous";

type TenantKey = (String, String);
type ResourceKey = (String, String, String, String);
type KvKey = (String, String, String);

/// A registered service instance with its checks
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceInstance {
    pub node: String,
    pub service: AgentService,
    pub checks: Vec<HealthCheck>,
}

/// Catalog contents compared by idempotence checks
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CatalogView {
    pub nodes: BTreeMap<(String, String), CatalogNode>,
    pub services: BTreeMap<(String, String, String), ServiceInstance>,
    pub resources: BTreeSet<ResourceKey>,
}

#[derive(Debug, Default)]
pub(crate) struct SimCluster {
    pub(crate) datacenter: String,
    management_token: Option<String>,
    tokens: BTreeMap<String, AclToken>,
    policies: BTreeMap<String, AclPolicy>,
    partitions: BTreeMap<String, AdminPartition>,
    namespaces: BTreeMap<TenantKey, Namespace>,
    config_entries: BTreeMap<ResourceKey, ConfigEntry>,
    resources: BTreeMap<ResourceKey, Resource>,
    catalog_nodes: BTreeMap<TenantKey, CatalogNode>,
    /// Keyed by (partition, node, service id)
    services: BTreeMap<(String, String, String), ServiceInstance>,
    kv: BTreeMap<KvKey, Vec<u8>>,
    pub(crate) leader: Option<String>,
    pub(crate) voters: Vec<String>,
    pub(crate) peerings: BTreeMap<TenantKey, PeeringInfo>,
    pub(crate) areas: BTreeMap<String, (NetworkAreaSpec, BTreeSet<String>)>,
    pub(crate) joins: BTreeSet<String>,
    pub(crate) restores: usize,
}

fn tenancy(opts: &RequestOptions) -> TenantKey {
    (
        partition_or_default(opts.partition.as_deref().unwrap_or_default()).to_string(),
        namespace_or_default(opts.namespace.as_deref().unwrap_or_default()).to_string(),
    )
}

fn partition_of(opts: &RequestOptions) -> String {
    tenancy(opts).0
}

fn forbidden(what: &str) -> ApiError {
    ApiError::new(ErrorKind::Forbidden, format!("Permission denied: {what}")).with_status(403)
}

#[derive(Serialize, Deserialize)]
struct Snapshot {
    kv: Vec<(KvKey, Vec<u8>)>,
}

impl SimCluster {
    pub(crate) fn new(datacenter: &str) -> Self {
        let mut cluster = Self {
            datacenter: datacenter.to_string(),
            ..Default::default()
        };
        cluster.partitions.insert(
            DEFAULT_PARTITION.to_string(),
            AdminPartition {
                name: DEFAULT_PARTITION.to_string(),
                description: "Builtin Default Partition".to_string(),
            },
        );
        cluster.ensure_default_namespace(DEFAULT_PARTITION);
        cluster
    }

    fn ensure_default_namespace(&mut self, partition: &str) {
        let key = (partition.to_string(), DEFAULT_NAMESPACE.to_string());
        self.namespaces.entry(key).or_insert_with(|| Namespace {
            name: DEFAULT_NAMESPACE.to_string(),
            partition: partition.to_string(),
            description: "Builtin Default Namespace".to_string(),
            acls: None,
        });
    }

    pub(crate) fn is_bootstrapped(&self) -> bool {
        self.management_token.is_some()
    }

    fn require_leader(&self) -> ApiResult<()> {
        if self.leader.is_none() {
            return Err(ApiError::new(ErrorKind::NoLeader, "No cluster leader").with_status(500));
        }
        Ok(())
    }

    fn known_token(&self, secret: &str) -> bool {
        self.management_token.as_deref() == Some(secret)
            || self.tokens.values().any(|t| t.secret_id == secret)
    }

    /// Non-ACL endpoints: open until bootstrap, then token-gated
    fn authorize(&self, token: Option<&str>, write: bool, what: &str) -> ApiResult<()> {
        if !self.is_bootstrapped() {
            return Ok(());
        }
        match token {
            None | Some(ANONYMOUS_SECRET) if write => Err(forbidden(what)),
            None | Some(ANONYMOUS_SECRET) => Ok(()),
            Some(secret) if self.known_token(secret) => Ok(()),
            Some(_) => Err(ApiError::new(ErrorKind::AclNotFound, "ACL not found").with_status(403)),
        }
    }

    /// ACL endpoints: unavailable until bootstrap, writes need management
    fn authorize_acl(&self, token: Option<&str>, write: bool, what: &str) -> ApiResult<()> {
        if !self.is_bootstrapped() {
            return Err(ApiError::new(
                ErrorKind::NotBootstrapped,
                "The ACL system must be bootstrapped before making any requests",
            )
            .with_status(401));
        }
        let secret = token.ok_or_else(|| forbidden(what))?;
        if !self.known_token(secret) {
            return Err(ApiError::new(ErrorKind::AclNotFound, "ACL not found").with_status(403));
        }
        if write && self.management_token.as_deref() != Some(secret) {
            return Err(forbidden(what));
        }
        Ok(())
    }

    // ACL

    pub(crate) fn acl_bootstrap(&mut self) -> ApiResult<AclToken> {
        if self.leader.is_none() {
            return Err(ApiError::new(
                ErrorKind::NotBootstrapped,
                "The ACL system is currently in legacy mode",
            )
            .with_status(500));
        }
        if self.is_bootstrapped() {
            return Err(ApiError::new(
                ErrorKind::Invalid,
                "ACL bootstrap no longer allowed (reset index: 1)",
            )
            .with_status(403));
        }

        self.policies.insert(
            GLOBAL_MANAGEMENT_ID.to_string(),
            AclPolicy {
                id: GLOBAL_MANAGEMENT_ID.to_string(),
                name: GLOBAL_MANAGEMENT_POLICY.to_string(),
                description: "Builtin Policy that grants unlimited access".to_string(),
                rules: String::new(),
                partition: DEFAULT_PARTITION.to_string(),
                namespace: DEFAULT_NAMESPACE.to_string(),
            },
        );
        self.tokens.insert(
            ANONYMOUS_ACCESSOR.to_string(),
            AclToken {
                accessor_id: ANONYMOUS_ACCESSOR.to_string(),
                secret_id: ANONYMOUS_SECRET.to_string(),
                description: "Anonymous Token".to_string(),
                ..Default::default()
            },
        );

        let token = AclToken {
            accessor_id: Uuid::new_v4().to_string(),
            secret_id: Uuid::new_v4().to_string(),
            description: "Bootstrap Token (Global Management)".to_string(),
            policies: vec![AclLink {
                id: GLOBAL_MANAGEMENT_ID.to_string(),
                name: GLOBAL_MANAGEMENT_POLICY.to_string(),
            }],
            ..Default::default()
        };
        self.management_token = Some(token.secret_id.clone());
        self.tokens.insert(token.accessor_id.clone(), token.clone());
        Ok(token)
    }

    pub(crate) fn acl_token_read_self(&self, token: Option<&str>) -> ApiResult<AclToken> {
        self.authorize_acl(token, false, "acl:read")?;
        let secret = token.unwrap_or_default();
        self.tokens
            .values()
            .find(|t| t.secret_id == secret)
            .cloned()
            .ok_or_else(|| ApiError::new(ErrorKind::AclNotFound, "ACL not found"))
    }

    pub(crate) fn acl_token_list(
        &self,
        token: Option<&str>,
        opts: &RequestOptions,
    ) -> ApiResult<Vec<AclToken>> {
        self.authorize_acl(token, false, "acl:read")?;
        let partition = partition_of(opts);
        Ok(self
            .tokens
            .values()
            .filter(|t| partition_or_default(&t.partition) == partition)
            .cloned()
            .collect())
    }

    fn resolve_links(&self, links: &[AclLink], partition: &str) -> ApiResult<Vec<AclLink>> {
        links
            .iter()
            .map(|link| {
                self.policies
                    .values()
                    .find(|p| {
                        (link.id.is_empty() || p.id == link.id)
                            && (link.name.is_empty() || p.name == link.name)
                            && (partition_or_default(&p.partition) == partition
                                || p.id == GLOBAL_MANAGEMENT_ID)
                    })
                    .map(|p| AclLink {
                        id: p.id.clone(),
                        name: p.name.clone(),
                    })
                    .ok_or_else(|| {
                        ApiError::new(
                            ErrorKind::Invalid,
                            format!("cannot find policy {:?}", link.name),
                        )
                        .with_status(400)
                    })
            })
            .collect()
    }

    pub(crate) fn acl_token_create(
        &mut self,
        token: Option<&str>,
        new: &AclToken,
        opts: &RequestOptions,
    ) -> ApiResult<AclToken> {
        self.authorize_acl(token, true, "acl:write")?;
        let partition = partition_of(opts);
        let mut created = new.clone();
        created.policies = self.resolve_links(&new.policies, &partition)?;
        if created.accessor_id.is_empty() {
            created.accessor_id = Uuid::new_v4().to_string();
        } else if self.tokens.contains_key(&created.accessor_id) {
            return Err(ApiError::new(ErrorKind::Invalid, "accessor id already in use"));
        }
        if created.secret_id.is_empty() {
            created.secret_id = Uuid::new_v4().to_string();
        }
        created.partition = partition;
        self.tokens
            .insert(created.accessor_id.clone(), created.clone());
        Ok(created)
    }

    pub(crate) fn acl_token_update(
        &mut self,
        token: Option<&str>,
        updated: &AclToken,
        opts: &RequestOptions,
    ) -> ApiResult<AclToken> {
        self.authorize_acl(token, true, "acl:write")?;
        let partition = partition_of(opts);
        let policies = self.resolve_links(&updated.policies, &partition)?;
        let existing = self
            .tokens
            .get_mut(&updated.accessor_id)
            .ok_or_else(|| ApiError::not_found("token not found"))?;
        let secret = existing.secret_id.clone();
        *existing = AclToken {
            secret_id: secret,
            policies,
            partition,
            ..updated.clone()
        };
        Ok(existing.clone())
    }

    pub(crate) fn acl_policy_read_by_name(
        &self,
        token: Option<&str>,
        name: &str,
        opts: &RequestOptions,
    ) -> ApiResult<Option<AclPolicy>> {
        self.authorize_acl(token, false, "acl:read")?;
        let partition = partition_of(opts);
        Ok(self
            .policies
            .values()
            .find(|p| p.name == name && partition_or_default(&p.partition) == partition)
            .cloned())
    }

    pub(crate) fn acl_policy_list(
        &self,
        token: Option<&str>,
        opts: &RequestOptions,
    ) -> ApiResult<Vec<AclPolicy>> {
        self.authorize_acl(token, false, "acl:read")?;
        let partition = partition_of(opts);
        Ok(self
            .policies
            .values()
            .filter(|p| partition_or_default(&p.partition) == partition)
            .cloned()
            .collect())
    }

    pub(crate) fn acl_policy_create(
        &mut self,
        token: Option<&str>,
        policy: &AclPolicy,
        opts: &RequestOptions,
    ) -> ApiResult<AclPolicy> {
        self.authorize_acl(token, true, "acl:write")?;
        let partition = partition_of(opts);
        if self
            .policies
            .values()
            .any(|p| p.name == policy.name && partition_or_default(&p.partition) == partition)
        {
            return Err(ApiError::new(
                ErrorKind::Invalid,
                format!("Invalid Policy: A Policy with Name {:?} already exists", policy.name),
            )
            .with_status(500));
        }
        let created = AclPolicy {
            id: Uuid::new_v4().to_string(),
            partition,
            namespace: tenancy(opts).1,
            ..policy.clone()
        };
        self.policies.insert(created.id.clone(), created.clone());
        Ok(created)
    }

    pub(crate) fn acl_policy_update(
        &mut self,
        token: Option<&str>,
        policy: &AclPolicy,
        opts: &RequestOptions,
    ) -> ApiResult<AclPolicy> {
        self.authorize_acl(token, true, "acl:write")?;
        let existing = self
            .policies
            .get_mut(&policy.id)
            .ok_or_else(|| ApiError::not_found("policy not found"))?;
        *existing = AclPolicy {
            partition: partition_of(opts),
            namespace: tenancy(opts).1,
            ..policy.clone()
        };
        Ok(existing.clone())
    }

    // Tenancy

    pub(crate) fn partition_list(&self, token: Option<&str>) -> ApiResult<Vec<AdminPartition>> {
        self.authorize(token, false, "operator:read")?;
        Ok(self.partitions.values().cloned().collect())
    }

    pub(crate) fn partition_create(
        &mut self,
        token: Option<&str>,
        partition: &AdminPartition,
    ) -> ApiResult<AdminPartition> {
        self.authorize(token, true, "operator:write")?;
        self.require_leader()?;
        if self.partitions.contains_key(&partition.name) {
            return Err(ApiError::new(
                ErrorKind::Invalid,
                format!("partition {:?} already exists", partition.name),
            ));
        }
        self.partitions
            .insert(partition.name.clone(), partition.clone());
        self.ensure_default_namespace(&partition.name);
        Ok(partition.clone())
    }

    pub(crate) fn namespace_list(
        &self,
        token: Option<&str>,
        opts: &RequestOptions,
    ) -> ApiResult<Vec<Namespace>> {
        self.authorize(token, false, "namespace:read")?;
        let partition = partition_of(opts);
        Ok(self
            .namespaces
            .iter()
            .filter(|((p, _), _)| p == &partition)
            .map(|(_, ns)| ns.clone())
            .collect())
    }

    fn namespace_key(ns: &Namespace, opts: &RequestOptions) -> TenantKey {
        let partition = if ns.partition.is_empty() {
            partition_of(opts)
        } else {
            ns.partition.clone()
        };
        (partition, ns.name.clone())
    }

    pub(crate) fn namespace_create(
        &mut self,
        token: Option<&str>,
        ns: &Namespace,
        opts: &RequestOptions,
    ) -> ApiResult<Namespace> {
        self.authorize(token, true, "operator:write")?;
        let key = Self::namespace_key(ns, opts);
        if !self.partitions.contains_key(&key.0) {
            return Err(ApiError::new(
                ErrorKind::Invalid,
                format!("partition {:?} does not exist", key.0),
            ));
        }
        if self.namespaces.contains_key(&key) {
            return Err(ApiError::new(
                ErrorKind::Invalid,
                format!("namespace {:?} already exists", ns.name),
            ));
        }
        let created = Namespace {
            partition: key.0.clone(),
            ..ns.clone()
        };
        self.namespaces.insert(key, created.clone());
        Ok(created)
    }

    pub(crate) fn namespace_update(
        &mut self,
        token: Option<&str>,
        ns: &Namespace,
        opts: &RequestOptions,
    ) -> ApiResult<Namespace> {
        self.authorize(token, true, "operator:write")?;
        let key = Self::namespace_key(ns, opts);
        let existing = self
            .namespaces
            .get_mut(&key)
            .ok_or_else(|| ApiError::not_found("namespace not found"))?;
        *existing = Namespace {
            partition: key.0,
            ..ns.clone()
        };
        Ok(existing.clone())
    }

    // Config entries and resources

    pub(crate) fn config_entry_set(
        &mut self,
        token: Option<&str>,
        entry: &ConfigEntry,
    ) -> ApiResult<()> {
        self.authorize(token, true, "config:write")?;
        self.require_leader()?;
        let key = (
            entry.kind.clone(),
            partition_or_default(&entry.partition).to_string(),
            namespace_or_default(&entry.namespace).to_string(),
            entry.name.clone(),
        );
        self.config_entries.insert(key, entry.clone());
        Ok(())
    }

    fn resource_key(id: &ResourceId) -> ResourceKey {
        (
            id.resource_type.to_string(),
            partition_or_default(&id.tenancy.partition).to_string(),
            namespace_or_default(&id.tenancy.namespace).to_string(),
            id.name.clone(),
        )
    }

    pub(crate) fn resource_write(
        &mut self,
        token: Option<&str>,
        resource: &Resource,
    ) -> ApiResult<()> {
        self.authorize(token, true, "resource:write")?;
        self.require_leader()?;
        self.resources
            .insert(Self::resource_key(&resource.id), resource.clone());
        Ok(())
    }

    pub(crate) fn resource_delete(&mut self, token: Option<&str>, id: &ResourceId) -> ApiResult<()> {
        self.authorize(token, true, "resource:write")?;
        self.require_leader()?;
        self.resources.remove(&Self::resource_key(id));
        Ok(())
    }

    pub(crate) fn resource(&self, id: &ResourceId) -> Option<&Resource> {
        self.resources.get(&Self::resource_key(id))
    }

    pub(crate) fn config_entries(&self) -> Vec<ConfigEntry> {
        self.config_entries.values().cloned().collect()
    }

    // Catalog

    pub(crate) fn catalog_register(
        &mut self,
        token: Option<&str>,
        reg: &CatalogRegistration,
    ) -> ApiResult<()> {
        self.authorize(token, true, "node:write")?;
        self.require_leader()?;
        let partition = partition_or_default(&reg.partition).to_string();
        let key = (partition.clone(), reg.node.clone());

        if !(reg.skip_node_update && self.catalog_nodes.contains_key(&key)) {
            self.catalog_nodes.insert(
                key,
                CatalogNode {
                    node: reg.node.clone(),
                    address: reg.address.clone(),
                    tagged_addresses: reg.tagged_addresses.clone(),
                    meta: reg.node_meta.clone(),
                    partition: partition.clone(),
                },
            );
        }

        if let Some(svc) = &reg.service {
            let checks = reg
                .checks
                .iter()
                .map(|c| HealthCheck {
                    node: reg.node.clone(),
                    service_id: svc.id.clone(),
                    service_name: svc.service.clone(),
                    partition: partition.clone(),
                    ..c.clone()
                })
                .collect();
            self.services.insert(
                (partition, reg.node.clone(), svc.id.clone()),
                ServiceInstance {
                    node: reg.node.clone(),
                    service: svc.clone(),
                    checks,
                },
            );
        }
        Ok(())
    }

    pub(crate) fn catalog_deregister(
        &mut self,
        token: Option<&str>,
        dereg: &CatalogDeregistration,
    ) -> ApiResult<()> {
        self.authorize(token, true, "node:write")?;
        self.require_leader()?;
        let partition = partition_or_default(&dereg.partition).to_string();
        if dereg.service_id.is_empty() {
            self.remove_node(&partition, &dereg.node);
        } else {
            self.services
                .remove(&(partition, dereg.node.clone(), dereg.service_id.clone()));
        }
        Ok(())
    }

    pub(crate) fn remove_node(&mut self, partition: &str, node: &str) {
        self.catalog_nodes
            .remove(&(partition.to_string(), node.to_string()));
        self.services
            .retain(|(p, n, _), _| !(p == partition && n == node));
    }

    pub(crate) fn catalog_nodes(
        &self,
        token: Option<&str>,
        opts: &RequestOptions,
    ) -> ApiResult<Vec<CatalogNode>> {
        self.authorize(token, false, "node:read")?;
        self.require_leader()?;
        let partition = partition_of(opts);
        Ok(self
            .catalog_nodes
            .iter()
            .filter(|((p, _), _)| p == &partition)
            .map(|(_, n)| n.clone())
            .collect())
    }

    fn instances<'a>(
        &'a self,
        service: &'a str,
        opts: &RequestOptions,
    ) -> impl Iterator<Item = &'a ServiceInstance> + 'a {
        let (partition, namespace) = tenancy(opts);
        self.services
            .iter()
            .filter(move |((p, _, _), inst)| {
                p == &partition
                    && inst.service.service == service
                    && namespace_or_default(&inst.service.namespace) == namespace
            })
            .map(|(_, inst)| inst)
    }

    pub(crate) fn catalog_service(
        &self,
        token: Option<&str>,
        service: &str,
        opts: &RequestOptions,
    ) -> ApiResult<Vec<CatalogService>> {
        self.authorize(token, false, "service:read")?;
        self.require_leader()?;
        let partition = partition_of(opts);
        Ok(self
            .instances(service, opts)
            .map(|inst| CatalogService {
                node: inst.node.clone(),
                address: self
                    .catalog_nodes
                    .get(&(partition.clone(), inst.node.clone()))
                    .map(|n| n.address.clone())
                    .unwrap_or_default(),
                service_id: inst.service.id.clone(),
                service_name: inst.service.service.clone(),
                service_kind: inst.service.kind.clone(),
                service_port: inst.service.port,
                namespace: inst.service.namespace.clone(),
                partition: partition.clone(),
            })
            .collect())
    }

    pub(crate) fn health_checks(
        &self,
        token: Option<&str>,
        service: &str,
        opts: &RequestOptions,
    ) -> ApiResult<Vec<HealthCheck>> {
        self.authorize(token, false, "service:read")?;
        self.require_leader()?;
        Ok(self
            .instances(service, opts)
            .flat_map(|inst| inst.checks.iter().cloned())
            .collect())
    }

    /// Register a service through the agent running as `node`
    pub(crate) fn agent_service_register(
        &mut self,
        token: Option<&str>,
        node: &str,
        node_partition: &str,
        reg: &AgentServiceRegistration,
    ) -> ApiResult<()> {
        self.authorize(token, true, "service:write")?;
        self.require_leader()?;
        let partition = if reg.partition.is_empty() {
            node_partition.to_string()
        } else {
            reg.partition.clone()
        };
        let address = self
            .catalog_nodes
            .get(&(partition.clone(), node.to_string()))
            .map(|n| n.address.clone())
            .unwrap_or_default();

        self.insert_agent_service(node, &partition, &address, reg);
        if let Some(sidecar) = reg.connect.as_ref().and_then(|c| c.sidecar_service.as_deref()) {
            let mut sidecar = sidecar.clone();
            if sidecar.name.is_empty() {
                sidecar.name = format!("{}-sidecar-proxy", reg.name);
            }
            if sidecar.id.is_empty() {
                sidecar.id = format!("{}-sidecar-proxy", reg.id);
            }
            if sidecar.kind.is_empty() {
                sidecar.kind = crate::api::kind::CONNECT_PROXY.to_string();
            }
            if sidecar.namespace.is_empty() {
                sidecar.namespace = reg.namespace.clone();
            }
            self.insert_agent_service(node, &partition, &address, &sidecar);
        }
        Ok(())
    }

    pub(crate) fn insert_agent_service(
        &mut self,
        node: &str,
        partition: &str,
        address: &str,
        reg: &AgentServiceRegistration,
    ) {
        let id = if reg.id.is_empty() {
            reg.name.clone()
        } else {
            reg.id.clone()
        };
        let checks = reg
            .checks
            .iter()
            .enumerate()
            .map(|(i, c)| HealthCheck {
                node: node.to_string(),
                check_id: if c.check_id.is_empty() {
                    format!("service:{id}:{}", i + 1)
                } else {
                    c.check_id.clone()
                },
                name: c.name.clone(),
                status: HEALTH_PASSING.to_string(),
                service_id: id.clone(),
                service_name: reg.name.clone(),
                definition: HealthCheckDefinition {
                    tcp: c.tcp.clone(),
                    http: c.http.clone(),
                    method: c.method.clone(),
                    interval: c.interval.clone(),
                    timeout: c.timeout.clone(),
                },
                namespace: reg.namespace.clone(),
                partition: partition.to_string(),
            })
            .collect();
        let service = AgentService {
            kind: reg.kind.clone(),
            id: id.clone(),
            service: reg.name.clone(),
            meta: reg.meta.clone(),
            port: reg.port.unwrap_or_default(),
            address: if reg.address.is_empty() {
                address.to_string()
            } else {
                reg.address.clone()
            },
            tagged_addresses: BTreeMap::new(),
            proxy: reg.proxy.clone(),
            namespace: reg.namespace.clone(),
            partition: partition.to_string(),
        };
        self.services.insert(
            (partition.to_string(), node.to_string(), id),
            ServiceInstance {
                node: node.to_string(),
                service,
                checks,
            },
        );
    }

    /// An agent joining the catalog on its own
    pub(crate) fn agent_self_register(&mut self, node: CatalogNode) {
        let key = (partition_or_default(&node.partition).to_string(), node.node.clone());
        self.catalog_nodes.insert(key, node);
    }

    pub(crate) fn has_catalog_node(&self, partition: &str, node: &str) -> bool {
        self.catalog_nodes
            .contains_key(&(partition.to_string(), node.to_string()))
    }

    // KV, status, snapshots

    pub(crate) fn kv_put(
        &mut self,
        token: Option<&str>,
        key: &str,
        value: &[u8],
        opts: &RequestOptions,
    ) -> ApiResult<()> {
        self.authorize(token, true, "key:write")?;
        self.require_leader()?;
        let (p, ns) = tenancy(opts);
        self.kv
            .insert((p, ns, key.to_string()), value.to_vec());
        Ok(())
    }

    pub(crate) fn kv_get(
        &self,
        token: Option<&str>,
        key: &str,
        opts: &RequestOptions,
    ) -> ApiResult<Option<Vec<u8>>> {
        self.authorize(token, false, "key:read")?;
        self.require_leader()?;
        let (p, ns) = tenancy(opts);
        Ok(self.kv.get(&(p, ns, key.to_string())).cloned())
    }

    pub(crate) fn kv_len(&self) -> usize {
        self.kv.len()
    }

    pub(crate) fn snapshot_save(&self, token: Option<&str>) -> ApiResult<Vec<u8>> {
        self.authorize_acl(token, true, "operator:write")?;
        self.require_leader()?;
        let snapshot = Snapshot {
            kv: self.kv.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        };
        serde_json::to_vec(&snapshot)
            .map_err(|e| ApiError::new(ErrorKind::Other, e.to_string()))
    }

    pub(crate) fn snapshot_restore(&mut self, token: Option<&str>, data: &[u8]) -> ApiResult<()> {
        self.authorize_acl(token, true, "operator:write")?;
        self.require_leader()?;
        let snapshot: Snapshot = serde_json::from_slice(data)
            .map_err(|e| ApiError::new(ErrorKind::Invalid, e.to_string()).with_status(400))?;
        self.kv = snapshot.kv.into_iter().collect();
        self.restores += 1;
        Ok(())
    }

    pub(crate) fn peering_read(
        &self,
        token: Option<&str>,
        name: &str,
        opts: &RequestOptions,
    ) -> ApiResult<Option<PeeringInfo>> {
        self.authorize(token, false, "peering:read")?;
        self.require_leader()?;
        Ok(self
            .peerings
            .get(&(partition_of(opts), name.to_string()))
            .cloned())
    }

    pub(crate) fn check_write(&self, token: Option<&str>, what: &str) -> ApiResult<()> {
        self.authorize(token, true, what)?;
        self.require_leader()
    }

    pub(crate) fn view(&self) -> CatalogView {
        CatalogView {
            nodes: self.catalog_nodes.clone(),
            services: self.services.clone(),
            resources: self.resources.keys().cloned().collect(),
        }
    }

    pub(crate) fn tokens(&self) -> Vec<AclToken> {
        self.tokens.values().cloned().collect()
    }

    pub(crate) fn policies(&self) -> Vec<AclPolicy> {
        self.policies.values().cloned().collect()
    }

    pub(crate) fn namespaces(&self) -> Vec<Namespace> {
        self.namespaces.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ResourceType, Tenancy};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn led() -> SimCluster {
        let mut c = SimCluster::new("dc1");
        c.leader = Some("10.0.4.2:8300".into());
        c
    }

    #[test]
    fn test_acl_endpoints_wait_for_bootstrap() {
        let mut c = SimCluster::new("dc1");
        assert!(c.acl_bootstrap().unwrap_err().is_bootstrap_pending());

        c.leader = Some("10.0.4.2:8300".into());
        let err = c
            .acl_policy_read_by_name(Some("x"), GLOBAL_MANAGEMENT_POLICY, &RequestOptions::default())
            .unwrap_err();
        assert!(err.is(ErrorKind::NotBootstrapped));

        let root = c.acl_bootstrap().unwrap();
        let policy = c
            .acl_policy_read_by_name(
                Some(&root.secret_id),
                GLOBAL_MANAGEMENT_POLICY,
                &RequestOptions::default(),
            )
            .unwrap();
        assert!(policy.is_some());
        assert!(c.acl_bootstrap().unwrap_err().is(ErrorKind::Invalid));
    }

    #[test]
    fn test_writes_need_a_known_token_after_bootstrap() {
        let mut c = led();
        let opts = RequestOptions::default();
        c.kv_put(None, "a", b"1", &opts).unwrap();

        let root = c.acl_bootstrap().unwrap();
        assert!(c.kv_put(None, "a", b"2", &opts).unwrap_err().is(ErrorKind::Forbidden));
        assert!(c
            .kv_put(Some("bogus"), "a", b"2", &opts)
            .unwrap_err()
            .is(ErrorKind::AclNotFound));
        c.kv_put(Some(&root.secret_id), "a", b"3", &opts).unwrap();
        assert_eq!(c.kv_get(None, "a", &opts).unwrap(), Some(b"3".to_vec()));
    }

    #[test]
    fn test_token_create_resolves_policies_by_name() {
        let mut c = led();
        let root = c.acl_bootstrap().unwrap().secret_id;
        let opts = RequestOptions::default();
        c.acl_policy_create(
            Some(&root),
            &AclPolicy {
                name: "reader".into(),
                rules: "node_prefix \"\" { policy = \"read\" }".into(),
                ..Default::default()
            },
            &opts,
        )
        .unwrap();

        let token = c
            .acl_token_create(
                Some(&root),
                &AclToken {
                    description: "x".into(),
                    policies: vec![AclLink::by_name("reader")],
                    ..Default::default()
                },
                &opts,
            )
            .unwrap();
        assert!(!token.secret_id.is_empty());
        assert!(!token.policies[0].id.is_empty());

        let missing = c.acl_token_create(
            Some(&root),
            &AclToken {
                policies: vec![AclLink::by_name("nope")],
                ..Default::default()
            },
            &opts,
        );
        assert!(missing.unwrap_err().is(ErrorKind::Invalid));
    }

    #[test]
    fn test_catalog_deregister_node_drops_its_services() {
        let mut c = led();
        let opts = RequestOptions::default();
        c.catalog_register(
            None,
            &CatalogRegistration {
                node: "n1".into(),
                address: "10.0.4.5".into(),
                service: Some(AgentService {
                    id: "ping".into(),
                    service: "ping".into(),
                    port: 8080,
                    ..Default::default()
                }),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(c.catalog_service(None, "ping", &opts).unwrap().len(), 1);

        c.catalog_deregister(
            None,
            &CatalogDeregistration {
                node: "n1".into(),
                ..Default::default()
            },
        )
        .unwrap();
        assert!(c.catalog_service(None, "ping", &opts).unwrap().is_empty());
        assert!(c.catalog_nodes(None, &opts).unwrap().is_empty());
    }

    #[test]
    fn test_snapshot_restore_replaces_kv() {
        let mut c = led();
        let root = c.acl_bootstrap().unwrap().secret_id;
        let opts = RequestOptions::default();
        c.kv_put(Some(&root), "k", b"v1", &opts).unwrap();
        let snap = c.snapshot_save(Some(&root)).unwrap();
        c.kv_put(Some(&root), "k", b"v2", &opts).unwrap();

        c.snapshot_restore(Some(&root), &snap).unwrap();
        assert_eq!(c.kv_get(Some(&root), "k", &opts).unwrap(), Some(b"v1".to_vec()));
        assert_eq!(c.restores, 1);
    }

    #[test]
    fn test_resource_delete_of_missing_is_ok() {
        let mut c = led();
        let id = ResourceId::new(ResourceType::workload(), "w", Tenancy::new("", ""));
        c.resource_delete(None, &id).unwrap();
        c.resource_write(None, &Resource::new(id.clone(), json!({}))).unwrap();
        assert!(c.resource(&id).is_some());
        c.resource_delete(None, &id).unwrap();
        assert!(c.resource(&id).is_none());
    }
}
