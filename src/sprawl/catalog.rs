// Copyright (c) 2025 - Cowboy AI, Inc.
//! Catalog Registration
//!
//! Two strategies, picked by node kind:
//!
//! ```text
//! agent node ──agent_service_register──▶ local agent (workload token)
//!
//! dataplane v1 ──catalog_register──▶ faux node, service, sidecar
//! dataplane v2 ──resource_write────▶ Workload, HealthStatus,
//!                                    Destinations, ProxyConfiguration,
//!                                    WorkloadIdentity, Service
//! ```
//!
//! Dataplane sync is driven only by each node's `disabled` flag, so running
//! it twice against the same topology leaves the catalog unchanged.

use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::{debug, info};

use super::{api_target, Sprawl};
use crate::api::{
    kind, AgentService, AgentServiceCheck, AgentServiceConnect, AgentServiceRegistration,
    ApiError, CatalogDeregistration, CatalogRegistration, ControlPlane, ErrorKind, HealthCheck,
    HealthCheckDefinition, MeshGatewayConfig, ProxyConfig, RequestOptions, ServiceAddress,
    Upstream, DATAPLANE_FAUX_META, HEALTH_PASSING,
};
use crate::domain::{
    partition_or_default, Cluster, Node, Resource, ResourceId, ResourceType, Tenancy, V2Service,
    Workload, WorkloadId,
};
use crate::errors::{ResultExt, SprawlError, SprawlResult};
use crate::retry::retry_on;

fn acl_not_found(e: &ApiError) -> bool {
    e.is(ErrorKind::AclNotFound)
}

impl Sprawl {
    /// Register workloads of enabled agent nodes with their local agent
    pub(super) async fn register_agent_services(&self, cluster: &Cluster) -> SprawlResult<()> {
        for node in cluster.sorted_nodes() {
            if node.disabled || !node.is_agent() || node.is_v2() || node.workloads.is_empty() {
                continue;
            }
            for wrk in node.sorted_workloads() {
                // Agent-hosted gateways register themselves at startup.
                if wrk.is_mesh_gateway {
                    continue;
                }
                let token = self.secrets.read_workload_token(&cluster.name, &wrk.id);
                let client = self
                    .connector
                    .connect(&api_target(&cluster.name, node, token)?)?;
                let reg = agent_registration(cluster, wrk);
                let opts = RequestOptions::default();

                retry_on(
                    &self.timings().acl_propagation(),
                    "register service with agent",
                    acl_not_found,
                    || client.agent_service_register(&reg, &opts),
                )
                .await
                .with_context(|| {
                    format!(
                        "cluster {:?}: register service {} to node {}",
                        cluster.name,
                        wrk.id,
                        node.id()
                    )
                })?;
                debug!(
                    cluster = %cluster.name,
                    node = %node.id(),
                    service = %wrk.id,
                    "registered service to client agent"
                );
            }
        }
        Ok(())
    }

    /// Register or deregister every dataplane's workloads, then write the
    /// cluster's v2 services.
    pub(super) async fn sync_dataplanes(&self, cluster: &Cluster) -> SprawlResult<()> {
        let client = self.client(&cluster.name)?;
        let mut identities: BTreeMap<WorkloadId, Resource> = BTreeMap::new();

        for node in &cluster.nodes {
            if !node.is_dataplane() || node.workloads.is_empty() {
                continue;
            }

            if node.is_v2() {
                for wrk in node.sorted_workloads() {
                    let pending = workload_resources(node, wrk)?;
                    if node.disabled {
                        self.delete_resources(client.as_ref(), &cluster.name, &pending)
                            .await?;
                        continue;
                    }
                    for res in pending.writes() {
                        self.write_resource(client.as_ref(), &cluster.name, res).await?;
                    }
                    let identity = WorkloadId::new(
                        wrk.identity_name(),
                        &wrk.id.namespace,
                        &wrk.id.partition,
                    );
                    identities.entry(identity).or_insert(pending.identity);
                }
                continue;
            }

            if !node.disabled {
                let reg = faux_node_registration(cluster, node)?;
                self.catalog_register(client.as_ref(), &reg)
                    .await
                    .with_context(|| format!("cluster {:?}: virtual node {}", cluster.name, node.id()))?;
                debug!(cluster = %cluster.name, node = %node.id(), "virtual node created");
            }

            for wrk in node.sorted_workloads() {
                if node.disabled {
                    self.deregister_dataplane_workload(client.as_ref(), cluster, node, wrk)
                        .await?;
                } else {
                    self.register_dataplane_workload(client.as_ref(), cluster, node, wrk)
                        .await?;
                }
            }

            if node.disabled {
                let dereg = CatalogDeregistration {
                    node: node.pod_name(),
                    partition: partition_for(cluster, &node.partition),
                    ..Default::default()
                };
                self.catalog_deregister(client.as_ref(), &dereg)
                    .await
                    .with_context(|| format!("cluster {:?}: virtual node {}", cluster.name, node.id()))?;
                info!(cluster = %cluster.name, node = %node.id(), "virtual node removed");
            }
        }

        for res in identities.values() {
            self.write_resource(client.as_ref(), &cluster.name, res).await?;
        }
        for svc in &cluster.services {
            let res = service_resource(svc);
            self.write_resource(client.as_ref(), &cluster.name, &res).await?;
        }
        Ok(())
    }

    async fn register_dataplane_workload(
        &self,
        client: &dyn ControlPlane,
        cluster: &Cluster,
        node: &Node,
        wrk: &Workload,
    ) -> SprawlResult<()> {
        let reg = service_registration(cluster, node, wrk)?;
        self.catalog_register(client, &reg)
            .await
            .with_context(|| {
                format!("cluster {:?}: register service {} to node {}", cluster.name, wrk.id, node.id())
            })?;
        debug!(cluster = %cluster.name, node = %node.id(), service = %wrk.id, "dataplane service created");

        if wrk.is_mesh_enabled() && !wrk.is_mesh_gateway {
            let reg = sidecar_registration(cluster, node, wrk)?;
            self.catalog_register(client, &reg)
                .await
                .with_context(|| {
                    format!("cluster {:?}: register sidecar of {} to node {}", cluster.name, wrk.id, node.id())
                })?;
            debug!(cluster = %cluster.name, node = %node.id(), service = %wrk.id, "dataplane sidecar created");
        }
        Ok(())
    }

    async fn deregister_dataplane_workload(
        &self,
        client: &dyn ControlPlane,
        cluster: &Cluster,
        node: &Node,
        wrk: &Workload,
    ) -> SprawlResult<()> {
        let mut ids = vec![wrk.id.name.clone()];
        if wrk.is_mesh_enabled() && !wrk.is_mesh_gateway {
            ids.push(wrk.sidecar_name());
        }
        for service_id in ids {
            let dereg = CatalogDeregistration {
                node: node.pod_name(),
                service_id,
                namespace: if cluster.enterprise { wrk.id.namespace.clone() } else { String::new() },
                partition: partition_for(cluster, &wrk.id.partition),
            };
            self.catalog_deregister(client, &dereg).await.with_context(|| {
                format!(
                    "cluster {:?}: deregister {} at node {}",
                    cluster.name,
                    dereg.service_id,
                    node.id()
                )
            })?;
            info!(
                cluster = %cluster.name,
                node = %node.id(),
                service = %dereg.service_id,
                "dataplane service removed"
            );
        }
        Ok(())
    }

    async fn catalog_register(
        &self,
        client: &dyn ControlPlane,
        reg: &CatalogRegistration,
    ) -> SprawlResult<()> {
        let opts = RequestOptions::default();
        retry_on(
            &self.timings().acl_propagation(),
            "catalog register",
            acl_not_found,
            || client.catalog_register(reg, &opts),
        )
        .await?;
        Ok(())
    }

    async fn catalog_deregister(
        &self,
        client: &dyn ControlPlane,
        dereg: &CatalogDeregistration,
    ) -> SprawlResult<()> {
        let opts = RequestOptions::default();
        retry_on(
            &self.timings().acl_propagation(),
            "catalog deregister",
            acl_not_found,
            || client.catalog_deregister(dereg, &opts),
        )
        .await?;
        Ok(())
    }

    pub(super) async fn write_resource(
        &self,
        client: &dyn ControlPlane,
        cluster: &str,
        res: &Resource,
    ) -> SprawlResult<()> {
        retry_on(
            &self.timings().acl_propagation(),
            "write resource",
            acl_not_found,
            || client.resource_write(res),
        )
        .await
        .with_context(|| format!("cluster {cluster:?}: write resource {}", resource_label(&res.id)))?;
        info!(cluster, id = %resource_label(&res.id), "resource upserted");
        Ok(())
    }

    async fn delete_resources(
        &self,
        client: &dyn ControlPlane,
        cluster: &str,
        pending: &WorkloadResources,
    ) -> SprawlResult<()> {
        for res in pending.writes() {
            retry_on(
                &self.timings().acl_propagation(),
                "delete resource",
                |e: &ApiError| e.is(ErrorKind::Conflict) || e.is(ErrorKind::AclNotFound),
                || client.resource_delete(&res.id),
            )
            .await
            .with_context(|| format!("cluster {cluster:?}: delete resource {}", resource_label(&res.id)))?;
            info!(cluster, id = %resource_label(&res.id), "resource deleted");
        }
        Ok(())
    }
}

fn resource_label(id: &ResourceId) -> String {
    format!(
        "{}/{}/{}/{}",
        id.resource_type, id.tenancy.partition, id.tenancy.namespace, id.name
    )
}

/// Partition field for catalog calls; CE clusters reject any value
fn partition_for(cluster: &Cluster, partition: &str) -> String {
    if cluster.enterprise {
        partition_or_default(partition).to_string()
    } else {
        String::new()
    }
}

fn local_address(node: &Node) -> SprawlResult<String> {
    node.local_address()
        .map(str::to_string)
        .ok_or_else(|| SprawlError::fatal(format!("node {} has no local address", node.id())))
}

fn upstreams(cluster: &Cluster, wrk: &Workload) -> Vec<Upstream> {
    wrk.destinations
        .iter()
        .map(|dest| {
            let mut up = Upstream {
                destination_name: dest.id.name.clone(),
                destination_peer: dest.peer.clone().unwrap_or_default(),
                local_bind_address: dest.local_address.clone().unwrap_or_default(),
                local_bind_port: dest.local_port.unwrap_or_default(),
                ..Default::default()
            };
            if cluster.enterprise {
                up.destination_namespace = dest.id.namespace.clone();
                if dest.peer.is_none() {
                    up.destination_partition = dest.id.partition.clone();
                }
            }
            up
        })
        .collect()
}

fn agent_check(wrk: &Workload) -> Option<AgentServiceCheck> {
    let base = AgentServiceCheck {
        name: "up".to_string(),
        interval: "5s".to_string(),
        timeout: "1s".to_string(),
        ..Default::default()
    };
    if let Some(tcp) = &wrk.check_tcp {
        Some(AgentServiceCheck {
            tcp: tcp.clone(),
            ..base
        })
    } else {
        wrk.check_http.as_ref().map(|http| AgentServiceCheck {
            http: http.clone(),
            method: "GET".to_string(),
            ..base
        })
    }
}

/// Registration sent to a node's own agent
pub(crate) fn agent_registration(cluster: &Cluster, wrk: &Workload) -> AgentServiceRegistration {
    let mut reg = AgentServiceRegistration {
        id: wrk.id.name.clone(),
        name: wrk.id.name.clone(),
        port: wrk.port,
        meta: wrk.meta.clone(),
        checks: agent_check(wrk).into_iter().collect(),
        ..Default::default()
    };
    if cluster.enterprise {
        reg.namespace = wrk.id.namespace.clone();
        reg.partition = wrk.id.partition.clone();
    }

    if wrk.is_mesh_enabled() {
        let mut checks = Vec::new();
        if let Some(port) = wrk.envoy_public_listener_port {
            checks.push(AgentServiceCheck {
                name: "Connect Sidecar Listening".to_string(),
                tcp: format!("127.0.0.1:{port}"),
                interval: "10s".to_string(),
                ..Default::default()
            });
        }
        reg.connect = Some(AgentServiceConnect {
            sidecar_service: Some(Box::new(AgentServiceRegistration {
                port: wrk.envoy_public_listener_port,
                proxy: Some(ProxyConfig {
                    upstreams: upstreams(cluster, wrk),
                    ..Default::default()
                }),
                checks,
                ..Default::default()
            })),
        });
    }
    reg
}

fn tagged_addresses(node: &Node) -> BTreeMap<String, String> {
    let mut tagged = BTreeMap::new();
    if let Some(local) = node.local_address() {
        tagged.insert("lan".to_string(), local.to_string());
        tagged.insert("lan_ipv4".to_string(), local.to_string());
    }
    if let Some(public) = node.public_address() {
        tagged.insert("wan".to_string(), public.to_string());
        tagged.insert("wan_ipv4".to_string(), public.to_string());
    }
    tagged
}

/// Catalog node standing in for a dataplane
pub(crate) fn faux_node_registration(cluster: &Cluster, node: &Node) -> SprawlResult<CatalogRegistration> {
    Ok(CatalogRegistration {
        node: node.pod_name(),
        address: local_address(node)?,
        tagged_addresses: tagged_addresses(node),
        node_meta: BTreeMap::from([(DATAPLANE_FAUX_META.to_string(), "1".to_string())]),
        partition: partition_for(cluster, &node.partition),
        ..Default::default()
    })
}

fn synced_check(cluster: &Cluster, service_id: &str, wrk: &Workload, definition: HealthCheckDefinition) -> HealthCheck {
    let mut check = HealthCheck {
        name: "external sync".to_string(),
        status: HEALTH_PASSING.to_string(),
        service_id: service_id.to_string(),
        service_name: service_id.to_string(),
        definition,
        ..Default::default()
    };
    if cluster.enterprise {
        check.namespace = wrk.id.namespace.clone();
        check.partition = wrk.id.partition.clone();
    }
    check
}

/// The workload itself on a dataplane's faux node
pub(crate) fn service_registration(
    cluster: &Cluster,
    node: &Node,
    wrk: &Workload,
) -> SprawlResult<CatalogRegistration> {
    let local = local_address(node)?;
    let port = wrk.port.unwrap_or_default();
    let mut svc = AgentService {
        kind: kind::TYPICAL.to_string(),
        id: wrk.id.name.clone(),
        service: wrk.id.name.clone(),
        meta: wrk.meta.clone(),
        port,
        address: local.clone(),
        ..Default::default()
    };

    if wrk.is_mesh_gateway {
        svc.kind = kind::MESH_GATEWAY.to_string();
        svc.proxy = Some(ProxyConfig {
            config: serde_json::Map::from_iter([
                ("envoy_gateway_no_default_bind".to_string(), Value::Bool(true)),
                ("envoy_gateway_bind_tagged_addresses".to_string(), Value::Bool(true)),
            ]),
            mesh_gateway: Some(MeshGatewayConfig {
                mode: "local".to_string(),
            }),
            ..Default::default()
        });
    }

    let mut tagged = BTreeMap::new();
    if node.has_public_address() {
        tagged = tagged_addresses(node);
        svc.tagged_addresses = tagged
            .iter()
            .map(|(tag, address)| {
                (
                    tag.clone(),
                    ServiceAddress {
                        address: address.clone(),
                        port,
                    },
                )
            })
            .collect();
    }

    let mut partition = String::new();
    if cluster.enterprise {
        partition = wrk.id.partition.clone();
        svc.namespace = wrk.id.namespace.clone();
        svc.partition = wrk.id.partition.clone();
    }

    let definition = if let Some(tcp) = &wrk.check_tcp {
        Some(HealthCheckDefinition {
            tcp: tcp.clone(),
            ..Default::default()
        })
    } else if let Some(http) = &wrk.check_http {
        Some(HealthCheckDefinition {
            http: http.clone(),
            method: "GET".to_string(),
            ..Default::default()
        })
    } else if wrk.is_mesh_gateway {
        // Peering waits for a passing gateway check.
        Some(HealthCheckDefinition {
            tcp: format!("{local}:{port}"),
            ..Default::default()
        })
    } else {
        None
    };
    let checks = definition
        .map(|d| synced_check(cluster, &wrk.id.name, wrk, d))
        .into_iter()
        .collect();

    Ok(CatalogRegistration {
        node: node.pod_name(),
        tagged_addresses: tagged,
        service: Some(svc),
        checks,
        skip_node_update: true,
        partition,
        ..Default::default()
    })
}

/// The sidecar proxy of a mesh-enabled dataplane workload
pub(crate) fn sidecar_registration(
    cluster: &Cluster,
    node: &Node,
    wrk: &Workload,
) -> SprawlResult<CatalogRegistration> {
    let local = local_address(node)?;
    let name = wrk.sidecar_name();
    let port = wrk.envoy_public_listener_port.unwrap_or_default();

    let mut svc = AgentService {
        kind: kind::CONNECT_PROXY.to_string(),
        id: name.clone(),
        service: name.clone(),
        meta: wrk.meta.clone(),
        port,
        address: local.clone(),
        proxy: Some(ProxyConfig {
            destination_service_name: wrk.id.name.clone(),
            destination_service_id: wrk.id.name.clone(),
            local_service_port: wrk.port,
            upstreams: upstreams(cluster, wrk),
            ..Default::default()
        }),
        ..Default::default()
    };

    let mut partition = String::new();
    if cluster.enterprise {
        partition = wrk.id.partition.clone();
        svc.namespace = wrk.id.namespace.clone();
        svc.partition = wrk.id.partition.clone();
    }

    let check = synced_check(
        cluster,
        &name,
        wrk,
        HealthCheckDefinition {
            tcp: format!("{local}:{port}"),
            ..Default::default()
        },
    );

    Ok(CatalogRegistration {
        node: node.pod_name(),
        service: Some(svc),
        checks: vec![check],
        skip_node_update: true,
        partition,
        ..Default::default()
    })
}

/// Typed resources describing one v2 workload instance
#[derive(Debug, Clone)]
pub(crate) struct WorkloadResources {
    pub workload: Resource,
    pub health: Option<Resource>,
    pub destinations: Option<Resource>,
    pub proxy_configuration: Option<Resource>,
    pub identity: Resource,
}

impl WorkloadResources {
    /// Everything written per instance; identities are written once per
    /// cluster after all instances.
    fn writes(&self) -> impl Iterator<Item = &Resource> {
        std::iter::once(&self.workload)
            .chain(self.health.iter())
            .chain(self.destinations.iter())
            .chain(self.proxy_configuration.iter())
    }
}

pub(crate) fn workload_resources(node: &Node, wrk: &Workload) -> SprawlResult<WorkloadResources> {
    if wrk.is_mesh_gateway {
        return Err(SprawlError::fatal(format!(
            "v2 does not support mesh gateways: {}",
            wrk.id
        )));
    }
    let instance = wrk
        .workload
        .clone()
        .ok_or_else(|| SprawlError::fatal(format!("v2 workload {} has no instance name", wrk.id)))?;
    let tenancy = Tenancy::from(&wrk.id);
    let selector = json!({ "names": [instance] });

    let mut addresses = vec![json!({ "host": local_address(node)? })];
    if let Some(public) = node.public_address() {
        addresses.push(json!({ "host": public, "external": true }));
    }
    let ports: serde_json::Map<String, Value> = wrk
        .ports
        .iter()
        .map(|(name, port)| {
            (
                name.clone(),
                json!({ "port": port.number, "protocol": port.protocol.as_str() }),
            )
        })
        .collect();

    let workload = Resource::new(
        ResourceId::new(ResourceType::workload(), instance.clone(), tenancy.clone()),
        json!({
            "identity": wrk.id.name,
            "ports": ports,
            "addresses": addresses,
            "metadata": wrk.meta,
        }),
    );

    let health = wrk.has_check().then(|| {
        Resource::new(
            ResourceId::new(
                ResourceType::health_status(),
                format!("{instance}-check-0"),
                tenancy.clone(),
            ),
            json!({ "type": "external-sync", "status": "HEALTH_PASSING" }),
        )
        .owned_by(workload.id.clone())
    });

    let mut destinations = None;
    let mut proxy_configuration = None;
    if wrk.is_mesh_enabled() {
        let dests: Vec<Value> = wrk
            .destinations
            .iter()
            .map(|d| {
                json!({
                    "destinationRef": {
                        "type": ResourceType::service().to_string(),
                        "name": d.id.name,
                        "tenancy": { "partition": d.id.partition, "namespace": d.id.namespace },
                    },
                    "destinationPort": d.port_name.clone().unwrap_or_default(),
                    "ipPort": {
                        "ip": d.local_address.clone().unwrap_or_default(),
                        "port": d.local_port.unwrap_or_default(),
                    },
                })
            })
            .collect();
        destinations = Some(Resource::new(
            ResourceId::new(ResourceType::destinations(), instance.clone(), tenancy.clone()),
            json!({ "workloads": selector, "destinations": dests }),
        ));

        if wrk.enable_transparent_proxy {
            proxy_configuration = Some(Resource::new(
                ResourceId::new(ResourceType::proxy_configuration(), instance.clone(), tenancy.clone()),
                json!({
                    "workloads": selector,
                    "dynamicConfig": { "mode": "PROXY_MODE_TRANSPARENT" },
                }),
            ));
        }
    }

    let identity = Resource::new(
        ResourceId::new(ResourceType::workload_identity(), wrk.identity_name(), tenancy),
        json!({}),
    );

    Ok(WorkloadResources {
        workload,
        health,
        destinations,
        proxy_configuration,
        identity,
    })
}

fn service_resource(svc: &V2Service) -> Resource {
    let ports: Vec<Value> = svc
        .ports
        .iter()
        .map(|p| {
            let mut port = json!({
                "targetPort": p.target_port,
                "protocol": p.protocol.as_str(),
            });
            if let Some(vport) = p.virtual_port {
                port["virtualPort"] = json!(vport);
            }
            port
        })
        .collect();
    Resource::new(
        ResourceId::new(
            ResourceType::service(),
            svc.id.name.clone(),
            Tenancy::from(&svc.id),
        ),
        json!({
            "workloads": { "names": svc.workloads.clone().unwrap_or_default() },
            "ports": ports,
            "virtualIps": svc.virtual_ips,
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Address, Destination, NetworkType, NodeKind, NodeVersion, Port, Protocol};
    use pretty_assertions::assert_eq;

    fn dataplane() -> Node {
        let mut node = Node::new(NodeKind::Dataplane, "dp1");
        node.set_docker_name("sprawl-dc1-dp1".into());
        node.addresses = vec![Address {
            ip_address: Some("10.0.4.9".into()),
            ..Address::on("dc1")
        }];
        node
    }

    fn pinger() -> Workload {
        let mut wrk = Workload::new(WorkloadId::new("ping", "", ""), "pinger", 8080);
        wrk.envoy_public_listener_port = Some(20000);
        wrk.check_tcp = Some("127.0.0.1:8080".into());
        wrk.destinations = vec![Destination {
            local_address: Some("127.0.0.1".into()),
            ..Destination::to(WorkloadId::new("pong", "", ""), 5000)
        }];
        wrk
    }

    #[test]
    fn test_agent_registration_carries_sidecar_and_check() {
        let reg = agent_registration(&Cluster::new("dc1"), &pinger());
        assert_eq!(reg.id, "ping");
        assert_eq!(reg.port, Some(8080));
        assert!(reg.namespace.is_empty());
        assert_eq!(reg.checks[0].tcp, "127.0.0.1:8080");
        assert_eq!(reg.checks[0].interval, "5s");

        let sidecar = reg.connect.unwrap().sidecar_service.unwrap();
        assert_eq!(sidecar.port, Some(20000));
        let upstreams = sidecar.proxy.unwrap().upstreams;
        assert_eq!(upstreams[0].destination_name, "pong");
        assert_eq!(upstreams[0].local_bind_port, 5000);
        assert!(upstreams[0].destination_partition.is_empty());
    }

    #[test]
    fn test_agent_registration_without_mesh_has_no_sidecar() {
        let mut wrk = pinger();
        wrk.disable_service_mesh = true;
        wrk.check_tcp = None;
        wrk.check_http = Some("http://127.0.0.1:8080/health".into());
        let reg = agent_registration(&Cluster::new("dc1"), &wrk);
        assert!(reg.connect.is_none());
        assert_eq!(reg.checks[0].method, "GET");
    }

    #[test]
    fn test_faux_node_is_marked() {
        let reg = faux_node_registration(&Cluster::new("dc1"), &dataplane()).unwrap();
        assert_eq!(reg.node, "sprawl-dc1-dp1-pod");
        assert_eq!(reg.node_meta.get(DATAPLANE_FAUX_META).map(String::as_str), Some("1"));
        assert_eq!(reg.tagged_addresses.get("lan").map(String::as_str), Some("10.0.4.9"));
        assert!(!reg.tagged_addresses.contains_key("wan"));
        assert!(reg.partition.is_empty());
    }

    #[test]
    fn test_public_address_tags_service() {
        let mut node = dataplane();
        node.addresses.push(Address {
            network_type: NetworkType::Wan,
            ip_address: Some("10.1.0.9".into()),
            ..Address::on("wan")
        });
        let reg = service_registration(&Cluster::new("dc1"), &node, &pinger()).unwrap();
        let svc = reg.service.unwrap();
        assert_eq!(svc.tagged_addresses["wan"].address, "10.1.0.9");
        assert_eq!(svc.tagged_addresses["wan"].port, 8080);
        assert!(reg.skip_node_update);
    }

    #[test]
    fn test_mesh_gateway_gets_passing_check() {
        let mut gw = Workload::new(WorkloadId::new("mesh-gateway", "", ""), "envoy", 8443);
        gw.is_mesh_gateway = true;
        let reg = service_registration(&Cluster::new("dc1"), &dataplane(), &gw).unwrap();
        let svc = reg.service.unwrap();
        assert_eq!(svc.kind, kind::MESH_GATEWAY);
        assert_eq!(svc.proxy.unwrap().mesh_gateway.unwrap().mode, "local");
        assert_eq!(reg.checks.len(), 1);
        assert!(reg.checks[0].is_passing());
        assert_eq!(reg.checks[0].definition.tcp, "10.0.4.9:8443");
    }

    #[test]
    fn test_sidecar_registration() {
        let reg = sidecar_registration(&Cluster::new("dc1"), &dataplane(), &pinger()).unwrap();
        let svc = reg.service.unwrap();
        assert_eq!(svc.id, "ping-sidecar-proxy");
        assert_eq!(svc.kind, kind::CONNECT_PROXY);
        assert_eq!(svc.port, 20000);
        let proxy = svc.proxy.unwrap();
        assert_eq!(proxy.destination_service_id, "ping");
        assert_eq!(proxy.local_service_port, Some(8080));
        assert_eq!(reg.checks[0].service_id, "ping-sidecar-proxy");
    }

    #[test]
    fn test_v2_workload_resources() {
        let mut node = dataplane();
        node.version = NodeVersion::V2;
        let mut wrk = pinger();
        wrk.node_version = NodeVersion::V2;
        wrk.workload = Some("ping-dp1".into());
        wrk.workload_identity = Some("ping".into());
        wrk.enable_transparent_proxy = true;
        wrk.ports = BTreeMap::from([("http".to_string(), Port::new(8080, Protocol::Http))]);

        let res = workload_resources(&node, &wrk).unwrap();
        assert_eq!(res.workload.id.name, "ping-dp1");
        assert_eq!(res.workload.data["ports"]["http"]["protocol"], "http");
        let health = res.health.as_ref().unwrap();
        assert_eq!(health.id.name, "ping-dp1-check-0");
        assert_eq!(health.owner.as_ref(), Some(&res.workload.id));
        assert!(res.destinations.is_some());
        assert!(res.proxy_configuration.is_some());
        assert_eq!(res.identity.id.resource_type, ResourceType::workload_identity());
        assert_eq!(res.writes().count(), 4);
    }

    #[test]
    fn test_v2_mesh_gateway_is_rejected() {
        let mut wrk = pinger();
        wrk.is_mesh_gateway = true;
        wrk.workload = Some("gw".into());
        assert!(workload_resources(&dataplane(), &wrk).is_err());
    }
}
