// Copyright (c) 2025 - Cowboy AI, Inc.
//! v2 service inference and virtual addressing

use std::collections::BTreeSet;

use super::error::{CompileError, CompileResult};
use crate::domain::{Cluster, Protocol, V2Service, Workload, WorkloadId};

/// Highest service index that still fits in the VIP block
pub const MAX_VIRTUAL_IPS: usize = 250;

/// First virtual port handed out per service
pub const VIRTUAL_PORT_BASE: u16 = 8080;

/// Address of the n-th service (1-based)
pub fn virtual_ip(n: usize) -> String {
    format!("10.244.0.{}", n + 1)
}

/// Record a v2 workload's service membership.
///
/// With no declared services each workload defines one same-named service
/// on first use. Otherwise every name in `v2_services` must be declared.
pub(crate) fn attach_workload(
    cluster: &mut Cluster,
    wrk: &mut Workload,
    implicit: bool,
    path: &str,
) -> CompileResult<()> {
    let Some(instance) = wrk.workload.clone() else {
        return Err(CompileError::invalid(path, "v2 workload has no instance name"));
    };

    if implicit {
        wrk.v2_services = vec![wrk.id.name.clone()];

        let pos = match cluster.services.iter().position(|s| s.id == wrk.id) {
            Some(pos) => pos,
            None => {
                let svc = wrk
                    .ports
                    .iter()
                    .fold(V2Service::new(wrk.id.clone()), |svc, (name, port)| {
                        svc.with_port(name.clone(), port.protocol)
                    });
                cluster.services.push(svc);
                cluster.services.len() - 1
            }
        };
        cluster.services[pos].select(instance);
    } else {
        for name in &wrk.v2_services {
            let id = WorkloadId::new(name.clone(), &wrk.id.namespace, &wrk.id.partition);
            let svc = cluster
                .services
                .iter_mut()
                .find(|s| s.id == id)
                .ok_or_else(|| {
                    CompileError::invalid(path, format!("v2 service {id} was not declared"))
                })?;
            svc.select(instance.clone());
        }
    }

    if wrk.workload_identity.is_none() {
        wrk.workload_identity = Some(wrk.id.name.clone());
    }
    Ok(())
}

/// Give every v2 service a virtual IP and each non-mesh port a virtual port.
pub(crate) fn assign_virtual_ips(cluster: &mut Cluster) -> CompileResult<()> {
    for (i, svc) in cluster.services.iter_mut().enumerate() {
        let n = i + 1;
        if n > MAX_VIRTUAL_IPS {
            return Err(CompileError::TooManyVirtualIps {
                cluster: cluster.name.clone(),
            });
        }
        svc.virtual_ips = vec![virtual_ip(n)];

        let mut used: BTreeSet<u16> = svc
            .ports
            .iter()
            .filter(|p| p.protocol != Protocol::Mesh)
            .filter_map(|p| p.virtual_port)
            .collect();
        let mut next = VIRTUAL_PORT_BASE;
        for port in svc.ports.iter_mut() {
            if port.protocol == Protocol::Mesh || port.virtual_port.is_some() {
                continue;
            }
            while used.contains(&next) {
                next += 1;
            }
            used.insert(next);
            port.virtual_port = Some(next);
        }
    }
    Ok(())
}

/// Copy each implied destination's virtual port from its target service.
pub(crate) fn resolve_implied_ports(cluster: &mut Cluster) {
    let services = &cluster.services;
    for node in &mut cluster.nodes {
        for wrk in &mut node.workloads {
            for dest in &mut wrk.implied_destinations {
                let Some(svc) = services.iter().find(|s| s.id == dest.id) else {
                    continue;
                };
                dest.virtual_port = svc
                    .ports
                    .iter()
                    .filter(|p| p.protocol != Protocol::Mesh)
                    .find(|p| Some(p.target_port.as_str()) == dest.port_name.as_deref())
                    .and_then(|p| p.virtual_port);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{NodeVersion, Port, ServicePort};
    use pretty_assertions::assert_eq;

    fn v2_workload(name: &str) -> Workload {
        let mut wrk = Workload::new(WorkloadId::new(name, "", ""), "fortio", 8080);
        wrk.port = None;
        wrk.node_version = NodeVersion::V2;
        wrk.ports.insert("http".into(), Port::new(8080, Protocol::Http));
        wrk.ports.insert("mesh".into(), Port::new(20000, Protocol::Mesh));
        wrk.workload = Some(format!("{name}-dc1-client1"));
        wrk
    }

    #[test]
    fn test_implicit_service_created_once() {
        let mut c = Cluster::new("dc1");
        let mut a = v2_workload("ping");
        let mut b = v2_workload("ping");
        b.workload = Some("ping-dc1-client2".into());

        attach_workload(&mut c, &mut a, true, "p").unwrap();
        attach_workload(&mut c, &mut b, true, "p").unwrap();

        assert_eq!(c.services.len(), 1);
        assert_eq!(
            c.services[0].workloads,
            Some(vec!["ping-dc1-client1".into(), "ping-dc1-client2".into()])
        );
        assert_eq!(a.v2_services, vec!["ping"]);
        assert_eq!(a.workload_identity.as_deref(), Some("ping"));
    }

    #[test]
    fn test_explicit_service_must_be_declared() {
        let mut c = Cluster::new("dc1");
        let mut wrk = v2_workload("ping");
        wrk.v2_services = vec!["api".into()];
        assert!(attach_workload(&mut c, &mut wrk, false, "p").is_err());

        c.services.push(V2Service::new(WorkloadId::new("api", "", "")));
        attach_workload(&mut c, &mut wrk, false, "p").unwrap();
        assert_eq!(
            c.services[0].workloads,
            Some(vec!["ping-dc1-client1".into()])
        );
    }

    #[test]
    fn test_virtual_ports_skip_mesh_and_taken() {
        let mut c = Cluster::new("dc1");
        let mut svc = V2Service::new(WorkloadId::new("ping", "", ""))
            .with_port("http", Protocol::Http)
            .with_port("mesh", Protocol::Mesh)
            .with_port("grpc", Protocol::Grpc);
        svc.ports.push(ServicePort {
            target_port: "admin".into(),
            protocol: Protocol::Http,
            virtual_port: Some(8081),
        });
        c.services.push(svc);

        assign_virtual_ips(&mut c).unwrap();
        let ports: Vec<Option<u16>> = c.services[0].ports.iter().map(|p| p.virtual_port).collect();
        assert_eq!(ports, vec![Some(8080), None, Some(8082), Some(8081)]);
        assert_eq!(c.services[0].virtual_ips, vec!["10.244.0.2"]);
    }

    #[test]
    fn test_virtual_ip_pool_limit() {
        let mut c = Cluster::new("dc1");
        for i in 0..MAX_VIRTUAL_IPS {
            c.services.push(V2Service::new(WorkloadId::new(format!("s{i}"), "", "")));
        }
        assign_virtual_ips(&mut c).unwrap();
        assert_eq!(c.services[249].virtual_ips, vec!["10.244.0.251"]);

        c.services.push(V2Service::new(WorkloadId::new("s250", "", "")));
        assert_eq!(
            assign_virtual_ips(&mut c),
            Err(CompileError::TooManyVirtualIps {
                cluster: "dc1".into()
            })
        );
    }
}
