// Copyright (c) 2025 - Cowboy AI, Inc.
//! Cluster Peering and Network Areas
//!
//! ```text
//! mesh gateways healthy ──▶ accepting: generate token
//!                                │
//!                                ▼
//!                           dialing: establish ──▶ both sides Active
//! ```

use std::time::Instant;
use tracing::{debug, info};

use super::Sprawl;
use crate::api::{
    ApiError, NetworkAreaSpec, PeeringEstablishRequest, PeeringGenerateTokenRequest,
    PeeringState, RequestOptions,
};
use crate::domain::PeerCluster;
use crate::errors::{ResultExt, SprawlError, SprawlResult};
use crate::retry::{retry_on, retry_until, Attempt, RetryError};

fn is_transient(e: &ApiError) -> bool {
    e.is_peering_transient()
}

impl Sprawl {
    /// Block until every mesh gateway in the topology is registered once
    /// and passing.
    pub(super) async fn wait_for_mesh_gateways(&self) -> SprawlResult<()> {
        for cluster in self.clusters() {
            let client = self.client(&cluster.name)?;
            for node in cluster.nodes.iter().filter(|n| !n.disabled) {
                for wrk in node.workloads.iter().filter(|w| w.is_mesh_gateway) {
                    let opts = RequestOptions::tenancy(&wrk.id.partition, &wrk.id.namespace)
                        .for_enterprise(cluster.enterprise);
                    let name = wrk.id.name.as_str();

                    retry_until(&self.timings().gateway(), "mesh gateway ready", || {
                        let client = client.clone();
                        let opts = opts.clone();
                        async move {
                            let instances = match client.catalog_service(name, &opts).await {
                                Ok(instances) => instances,
                                Err(e) => return Attempt::Again(e.to_string()),
                            };
                            match instances.len() {
                                0 => return Attempt::Again("not registered yet".to_string()),
                                1 => {}
                                n => {
                                    return Attempt::Abort(SprawlError::fatal(format!(
                                        "expected exactly one mesh gateway {name:?}, found {n}"
                                    )))
                                }
                            }
                            match client.health_checks(name, &opts).await {
                                Ok(checks) if checks.iter().any(|c| c.is_passing()) => {
                                    Attempt::Done(())
                                }
                                Ok(_) => Attempt::Again("no passing check".to_string()),
                                Err(e) => Attempt::Again(e.to_string()),
                            }
                        }
                    })
                    .await
                    .with_context(|| format!("cluster {:?}: mesh gateway {}", cluster.name, wrk.id))?;
                    debug!(cluster = %cluster.name, gateway = %wrk.id, "mesh gateway ready");
                }
            }
        }
        Ok(())
    }

    /// Exchange a token for every declared peering
    pub(super) async fn initiate_peerings(&self) -> SprawlResult<()> {
        for peering in &self.topology.peerings {
            let accepting = self.cluster(&peering.accepting.name)?;
            let dialing = self.cluster(&peering.dialing.name)?;
            let accepting_client = self.client(&accepting.name)?;
            let dialing_client = self.client(&dialing.name)?;

            let req = PeeringGenerateTokenRequest {
                peer_name: peering.accepting.peer_name.clone(),
                partition: enterprise_partition(accepting.enterprise, &peering.accepting),
            };
            let token = retry_on(
                &self.timings().peering_call(),
                "generate peering token",
                is_transient,
                || accepting_client.peering_generate_token(&req),
            )
            .await
            .with_context(|| format!("peering {peering}: generate token"))?;

            let req = PeeringEstablishRequest {
                peer_name: peering.dialing.peer_name.clone(),
                peering_token: token,
                partition: enterprise_partition(dialing.enterprise, &peering.dialing),
            };
            retry_on(
                &self.timings().peering_call(),
                "establish peering",
                is_transient,
                || dialing_client.peering_establish(&req),
            )
            .await
            .with_context(|| format!("peering {peering}: establish"))?;
            info!(%peering, "peering established");
        }
        Ok(())
    }

    /// Create each network area on both sides and join them together
    pub(super) async fn init_network_areas(&self) -> SprawlResult<()> {
        for area in &self.topology.network_areas {
            let primary = self.cluster(&area.primary.name)?;
            let secondary = self.cluster(&area.secondary.name)?;

            let mut ids = Vec::new();
            for (local, remote) in [(primary, secondary), (secondary, primary)] {
                let id = self
                    .client(&local.name)?
                    .network_area_create(&NetworkAreaSpec {
                        peer_datacenter: remote.datacenter.clone(),
                        ..Default::default()
                    })
                    .await
                    .with_context(|| format!("network area {area}: create in {:?}", local.name))?;
                ids.push(id);
            }

            for ((local, remote), id) in [(primary, secondary), (secondary, primary)].into_iter().zip(&ids) {
                let addresses: Vec<String> = remote
                    .server_nodes()
                    .iter()
                    .filter_map(|n| n.local_address())
                    .map(str::to_string)
                    .collect();
                self.client(&local.name)?
                    .network_area_join(id, &addresses)
                    .await
                    .with_context(|| format!("network area {area}: join from {:?}", local.name))?;
            }
            info!(%area, "network area joined");
        }
        Ok(())
    }

    /// Wait until both sides of every peering report `Active`
    pub(super) async fn wait_for_peering_active(&self) -> SprawlResult<()> {
        for peering in &self.topology.peerings {
            for side in [&peering.dialing, &peering.accepting] {
                let client = self.client(&side.name)?;
                let opts = RequestOptions::partition(&side.partition)
                    .for_enterprise(self.cluster(&side.name)?.enterprise);
                let name = side.peer_name.as_str();
                let start = Instant::now();

                let waited: Result<(), RetryError<SprawlError>> =
                    retry_until(&self.timings().peering_active(), "peering active", || {
                    let client = client.clone();
                    let opts = opts.clone();
                    async move {
                        match client.peering_read(name, &opts).await {
                            Ok(Some(info)) if info.state == PeeringState::Active => Attempt::Done(()),
                            Ok(Some(info)) => Attempt::Again(format!("state is {:?}", info.state)),
                            Ok(None) => Attempt::Again("peering not found".to_string()),
                            Err(e) => Attempt::Again(e.to_string()),
                        }
                    }
                })
                .await;
                waited.with_context(|| format!("cluster {:?}: peering {name:?}", side.name))?;
                info!(
                    cluster = %side.name,
                    peering = name,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "peering is active"
                );
            }
        }
        Ok(())
    }
}

fn enterprise_partition(enterprise: bool, side: &PeerCluster) -> String {
    if enterprise {
        side.partition.clone()
    } else {
        String::new()
    }
}
