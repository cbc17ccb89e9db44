// Copyright (c) 2025 - Cowboy AI, Inc.
//! Infra generator
//!
//! Owns subnet allocation for the lifetime of a run. A network's subnet is
//! chosen once; seeing a different one on a later apply is fatal.

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

use super::resources::ResourceSet;
use super::subnets::SubnetAllocator;
use super::{ApplyOutputs, InfraError, InfraResult, Provisioner};
use crate::compiler::DOCKER_PREFIX;
use crate::domain::Topology;
use crate::secrets::SecretStore;
use crate::state_machine::Step;

/// Renders, applies and digests one step at a time
pub struct Generator {
    provisioner: Arc<dyn Provisioner>,
    subnets: SubnetAllocator,
    /// Subnets handed out so far, per network
    assigned: BTreeMap<String, String>,
    license: Option<String>,
}

impl Generator {
    pub fn new(provisioner: Arc<dyn Provisioner>, subnet_seed: u64, license: Option<String>) -> Self {
        Self {
            provisioner,
            subnets: SubnetAllocator::new(subnet_seed),
            assigned: BTreeMap::new(),
            license,
        }
    }

    /// Bring infrastructure up to `step` and record what was discovered.
    ///
    /// # Returns
    ///
    /// `true` if any discovered port changed
    pub async fn generate(
        &mut self,
        topology: &mut Topology,
        secrets: &SecretStore,
        step: Step,
    ) -> InfraResult<bool> {
        self.assign_subnets(topology)?;
        assign_addresses(topology)?;
        name_volumes(topology);

        let set = ResourceSet::render(topology, secrets, step, self.license.as_deref())?;
        debug!(
            %step,
            networks = set.networks.len(),
            nodes = set.nodes.len(),
            "applying resource set"
        );
        let outputs = self.provisioner.apply(&set).await?;
        let changed = digest(topology, &outputs)?;
        info!(%step, changed, "infra step applied");
        Ok(changed)
    }

    /// Tear down everything created for the topology
    pub async fn destroy(&self, topology: &Topology) -> InfraResult<()> {
        self.provisioner.destroy(&topology.id).await
    }

    fn assign_subnets(&mut self, topology: &mut Topology) -> InfraResult<()> {
        for net in topology.networks.values() {
            if let Some(subnet) = &net.subnet {
                if !self.assigned.contains_key(&net.name) {
                    self.subnets.reserve(subnet)?;
                }
            }
        }

        for net in topology.networks.values_mut() {
            match (self.assigned.get(&net.name), net.subnet.clone()) {
                (Some(prev), Some(cur)) if prev != &cur => {
                    return Err(InfraError::SubnetChanged {
                        network: net.name.clone(),
                        from: prev.clone(),
                        to: cur,
                    });
                }
                (Some(prev), None) => {
                    net.set_subnet(prev)?;
                }
                (Some(_), Some(_)) => {}
                (None, Some(cur)) => {
                    self.assigned.insert(net.name.clone(), cur);
                }
                (None, None) => {
                    let cidr = self.subnets.allocate()?;
                    net.set_subnet(&cidr)?;
                    debug!(network = %net.name, subnet = %cidr, "allocated subnet");
                    self.assigned.insert(net.name.clone(), cidr);
                }
            }
        }
        Ok(())
    }
}

/// Every address gets the IP at its node's global index.
fn assign_addresses(topology: &mut Topology) -> InfraResult<()> {
    let networks = &topology.networks;
    for cluster in topology.clusters.values_mut() {
        for node in &mut cluster.nodes {
            let index = node.index;
            for addr in &mut node.addresses {
                let net = networks
                    .get(&addr.network)
                    .ok_or_else(|| InfraError::NoSuchNetwork(addr.network.clone()))?;
                if net.ip_pool.is_empty() {
                    return Err(InfraError::NoIpPool(net.name.clone()));
                }
                let ip = net.ip_by_index(index).ok_or_else(|| InfraError::NoIpForIndex {
                    network: net.name.clone(),
                    index,
                })?;
                addr.ip_address = Some(ip.to_string());
            }
        }
    }
    Ok(())
}

fn name_volumes(topology: &mut Topology) {
    let id = topology.id.clone();
    for cluster in topology.clusters.values_mut() {
        if cluster.tls_volume_name.is_none() {
            cluster.tls_volume_name = Some(format!("{DOCKER_PREFIX}-tls-{}-{id}", cluster.name));
        }
    }
}

/// Feed discovered ports back into the topology.
fn digest(topology: &mut Topology, outputs: &ApplyOutputs) -> InfraResult<bool> {
    let mut changed = false;
    for (network, &port) in &outputs.proxy_ports {
        changed |= topology
            .digest_exposed_proxy_port(network, port)
            .map_err(|_| InfraError::NoSuchNetwork(network.clone()))?;
    }

    for ((cluster, node_id), ports) in &outputs.node_ports {
        let node = topology
            .cluster_mut(cluster)
            .and_then(|c| c.node_by_id_mut(node_id))
            .ok_or_else(|| InfraError::NoSuchNode {
                cluster: cluster.clone(),
                node: node_id.clone(),
            })?;
        changed |= node.digest_exposed_ports(ports)?;
    }
    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile;
    use crate::domain::{Cluster, Config, Network, NetworkType, Node, NodeKind};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Maps every port to port + 10000
    #[derive(Default)]
    struct Recording {
        sets: Mutex<Vec<ResourceSet>>,
    }

    #[async_trait]
    impl Provisioner for Recording {
        async fn apply(&self, set: &ResourceSet) -> InfraResult<ApplyOutputs> {
            self.sets.lock().unwrap().push(set.clone());
            let mut out = ApplyOutputs::default();
            for net in &set.networks {
                out.proxy_ports.insert(net.name.clone(), 40000);
            }
            for node in &set.nodes {
                out.node_ports.insert(
                    (node.cluster.clone(), node.id.clone()),
                    node.ports.iter().map(|&p| (p, p + 10000)).collect(),
                );
            }
            Ok(out)
        }

        async fn destroy(&self, _topology_id: &str) -> InfraResult<()> {
            Ok(())
        }
    }

    fn topology() -> Topology {
        let mut dc1 = Cluster::new("dc1");
        dc1.nodes.push(Node::new(NodeKind::Server, "server1"));
        dc1.nodes.push(Node::new(NodeKind::Client, "client1"));
        compile(&Config {
            networks: vec![Network::new("dc1", NetworkType::Lan)],
            clusters: vec![dc1],
            ..Default::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_generate_digests_ports_and_addresses() {
        let provisioner = Arc::new(Recording::default());
        let mut gen = Generator::new(provisioner.clone(), 3, None);
        let mut topo = topology();
        let secrets = SecretStore::new();

        assert!(gen.generate(&mut topo, &secrets, Step::Servers).await.unwrap());

        let dc1 = &topo.clusters["dc1"];
        assert_eq!(dc1.nodes[0].exposed_port(8500), Some(18500));
        assert_eq!(dc1.nodes[1].exposed_port(8500), None);
        assert_eq!(dc1.nodes[0].local_proxy_port(), Some(40000));
        assert!(dc1.nodes[1].local_address().is_some());
        assert!(dc1.tls_volume_name.is_some());

        assert!(gen.generate(&mut topo, &secrets, Step::Agents).await.unwrap());
        assert!(!gen.generate(&mut topo, &secrets, Step::Agents).await.unwrap());
        assert_eq!(provisioner.sets.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_subnet_change_is_fatal() {
        let mut gen = Generator::new(Arc::new(Recording::default()), 3, None);
        let mut topo = topology();
        let secrets = SecretStore::new();
        gen.generate(&mut topo, &secrets, Step::Networks).await.unwrap();

        let net = topo.networks.get_mut("dc1").unwrap();
        let other = if net.subnet.as_deref() == Some("10.0.1.0/24") {
            "10.0.2.0/24"
        } else {
            "10.0.1.0/24"
        };
        net.set_subnet(other).unwrap();

        let err = gen
            .generate(&mut topo, &secrets, Step::Servers)
            .await
            .unwrap_err();
        assert!(matches!(err, InfraError::SubnetChanged { .. }));
    }

    #[tokio::test]
    async fn test_inherited_subnet_is_kept() {
        let mut gen = Generator::new(Arc::new(Recording::default()), 3, None);
        let mut topo = topology();
        topo.networks
            .get_mut("dc1")
            .unwrap()
            .set_subnet("10.0.77.0/24")
            .unwrap();

        gen.generate(&mut topo, &SecretStore::new(), Step::Networks)
            .await
            .unwrap();
        assert_eq!(topo.networks["dc1"].subnet.as_deref(), Some("10.0.77.0/24"));
    }
}
