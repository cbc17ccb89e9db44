// Copyright (c) 2025 - Cowboy AI, Inc.
//! Launch and relaunch sequencing
//!
//! ```text
//! networks ─▶ servers ─▶ ACLs, tenancy, seed data, agent tokens
//!                  │
//!                  ▼
//!               agents ─▶ anti-entropy ─▶ workload tokens, catalog sync
//!                                              │
//!                                              ▼
//!                                          services ─▶ peerings ─▶ Active
//! ```

use std::collections::BTreeSet;
use tracing::{debug, info};

use super::{RelaunchMode, Sprawl};
use crate::api::{AdminPartition, ApiError, ErrorKind, RequestOptions};
use crate::domain::Cluster;
use crate::errors::{ResultExt, SprawlError, SprawlResult};
use crate::retry::{retry_on, retry_until, Attempt, RetryError};
use crate::secrets::{generate_gossip_key, generate_recovery_token, GenericSecret};
use crate::state_machine::{PhaseCommand, Step};

const LOCAL_WRITE_KEY: &str = "sprawl-local-write";
const PLACEHOLDER_PARTITION: &str = "placeholder";

impl Sprawl {
    pub(super) async fn launch_steps(&mut self) -> SprawlResult<()> {
        self.init_secrets();

        self.generate(Step::Networks).await?;
        self.generate(Step::Servers).await?;
        for cluster in self.clusters() {
            self.init_servers(&cluster).await?;
        }

        self.generate(Step::Agents).await?;
        for cluster in self.clusters() {
            self.wait_for_client_anti_entropy(&cluster).await?;
        }

        for cluster in self.clusters() {
            self.create_workload_tokens(&cluster).await?;
            self.sync_dataplanes(&cluster).await?;
            self.register_agent_services(&cluster).await?;
        }

        self.generate(Step::Services).await?;
        self.phase
            .transition_with_history(PhaseCommand::MarkLaunched, chrono::Utc::now())?;

        self.wait_for_mesh_gateways().await?;
        self.initiate_peerings().await?;
        self.init_network_areas().await?;
        self.wait_for_peering_active().await
    }

    pub(super) async fn relaunch_steps(&mut self, mode: RelaunchMode) -> SprawlResult<()> {
        if mode == RelaunchMode::Regular {
            for cluster in self.clusters() {
                self.init_tenancies(&cluster).await?;
                self.create_agent_tokens(&cluster).await?;
                self.create_workload_tokens(&cluster).await?;
                self.sync_dataplanes(&cluster).await?;
            }
        }

        self.generate(Step::Relaunch).await?;

        for cluster in self.clusters() {
            self.connect_cluster(&cluster.name, None)?;
        }
        if mode == RelaunchMode::Upgrade {
            for cluster in self.clusters() {
                self.wait_for_leader(&cluster).await?;
            }
        }
        // Restarted servers must accept the stored token before clients use it
        for cluster in self.clusters() {
            let token = self
                .bootstrap_acls(&cluster)
                .await
                .with_context(|| format!("cluster {:?}: verify acls", cluster.name))?;
            self.connect_cluster(&cluster.name, Some(token))?;
        }

        for cluster in self.clusters() {
            self.rejoin_servers(&cluster).await?;
            self.wait_for_client_anti_entropy(&cluster).await?;
            self.register_agent_services(&cluster).await?;
        }

        self.wait_for_peering_active().await
    }

    fn init_secrets(&self) {
        for cluster in self.topology.sorted_clusters() {
            if !cluster.disable_gossip_encryption {
                self.secrets
                    .get_or_init_generic(&cluster.name, GenericSecret::GossipKey, generate_gossip_key);
            }
            self.secrets.get_or_init_generic(
                &cluster.name,
                GenericSecret::AgentRecovery,
                generate_recovery_token,
            );
        }
    }

    async fn init_servers(&mut self, cluster: &Cluster) -> SprawlResult<()> {
        self.connect_cluster(&cluster.name, None)?;
        self.rejoin_servers(cluster).await?;

        let token = self
            .bootstrap_acls(cluster)
            .await
            .with_context(|| format!("cluster {:?}: bootstrap acls", cluster.name))?;
        self.connect_cluster(&cluster.name, Some(token))?;

        self.wait_for_local_writes(cluster).await?;
        self.init_tenancies(cluster).await?;
        self.apply_initial_config_entries(cluster).await?;
        self.apply_initial_resources(cluster).await?;
        self.create_anonymous_token(cluster).await?;
        self.create_agent_tokens(cluster).await?;
        info!(cluster = %cluster.name, "servers initialised");
        Ok(())
    }

    /// Every server joins every other server by local address
    async fn rejoin_servers(&self, cluster: &Cluster) -> SprawlResult<()> {
        let servers = cluster.server_nodes();
        if servers.len() < 2 {
            return Ok(());
        }
        for server in &servers {
            let client = self.node_client(&cluster.name, server)?;
            for other in servers.iter().filter(|o| o.id() != server.id()) {
                let Some(addr) = other.local_address() else {
                    continue;
                };
                retry_on(
                    &self.timings().server_join(),
                    "server join",
                    |e: &ApiError| e.is(ErrorKind::Transport),
                    || client.agent_join(addr),
                )
                .await
                .with_context(|| {
                    format!("cluster {:?}: join {} to {}", cluster.name, server.id(), other.id())
                })?;
            }
        }
        debug!(cluster = %cluster.name, servers = servers.len(), "servers joined");
        Ok(())
    }

    /// Block until the cluster accepts writes from the management token
    async fn wait_for_local_writes(&self, cluster: &Cluster) -> SprawlResult<()> {
        let client = self.client(&cluster.name)?;
        let opts = RequestOptions::default();

        let written: Result<(), RetryError<SprawlError>> =
            retry_until(&self.timings().local_write(), "local write", || {
                let client = client.clone();
                let opts = opts.clone();
                async move {
                    match client.kv_put(LOCAL_WRITE_KEY, b"ok", &opts).await {
                        Ok(()) => Attempt::Done(()),
                        Err(e) => Attempt::Again(e.to_string()),
                    }
                }
            })
            .await;
        written.with_context(|| format!("cluster {:?}: kv write", cluster.name))?;

        if cluster.enterprise {
            let written: Result<(), RetryError<SprawlError>> =
                retry_until(&self.timings().local_write(), "partition write", || {
                    let client = client.clone();
                    async move {
                        let existing = match client.partition_list().await {
                            Ok(existing) => existing,
                            Err(e) => return Attempt::Again(e.to_string()),
                        };
                        if existing.iter().any(|p| p.name == PLACEHOLDER_PARTITION) {
                            return Attempt::Done(());
                        }
                        let placeholder = AdminPartition {
                            name: PLACEHOLDER_PARTITION.to_string(),
                            description: "placeholder".to_string(),
                        };
                        match client.partition_create(&placeholder).await {
                            Ok(_) => Attempt::Done(()),
                            Err(e) => Attempt::Again(e.to_string()),
                        }
                    }
                })
                .await;
            written.with_context(|| format!("cluster {:?}: partition write", cluster.name))?;
        }
        debug!(cluster = %cluster.name, "local writes accepted");
        Ok(())
    }

    async fn apply_initial_config_entries(&self, cluster: &Cluster) -> SprawlResult<()> {
        if cluster.initial_config_entries.is_empty() {
            return Ok(());
        }
        let client = self.client(&cluster.name)?;
        for entry in &cluster.initial_config_entries {
            retry_on(
                &self.timings().config_entry(),
                "config entry",
                |e: &ApiError| e.is(ErrorKind::IntentionsMigrating),
                || client.config_entry_set(entry),
            )
            .await
            .with_context(|| {
                format!("cluster {:?}: config entry {}/{}", cluster.name, entry.kind, entry.name)
            })?;
        }
        info!(
            cluster = %cluster.name,
            entries = cluster.initial_config_entries.len(),
            "initial config entries applied"
        );
        Ok(())
    }

    async fn apply_initial_resources(&self, cluster: &Cluster) -> SprawlResult<()> {
        if cluster.initial_resources.is_empty() {
            return Ok(());
        }
        let client = self.client(&cluster.name)?;
        for res in &cluster.initial_resources {
            self.write_resource(client.as_ref(), &cluster.name, res).await?;
        }
        info!(
            cluster = %cluster.name,
            resources = cluster.initial_resources.len(),
            "initial resources written"
        );
        Ok(())
    }

    /// Block until every enabled agent shows up in the catalog with its
    /// tagged addresses
    async fn wait_for_client_anti_entropy(&self, cluster: &Cluster) -> SprawlResult<()> {
        let client = self.client(&cluster.name)?;
        let expected: BTreeSet<String> = cluster
            .nodes
            .iter()
            .filter(|n| n.is_agent() && !n.disabled)
            .map(|n| n.pod_name())
            .collect();
        if expected.is_empty() {
            return Ok(());
        }
        let scopes: Vec<RequestOptions> = cluster
            .partition_query_list()
            .into_iter()
            .map(|p| p.map_or_else(RequestOptions::default, RequestOptions::partition))
            .collect();

        let synced: Result<(), RetryError<SprawlError>> =
            retry_until(&self.timings().anti_entropy(), "client anti-entropy", || {
                let client = client.clone();
                let scopes = scopes.clone();
                let expected = &expected;
                async move {
                    let mut seen = BTreeSet::new();
                    for opts in &scopes {
                        match client.catalog_nodes(opts).await {
                            Ok(nodes) => seen.extend(
                                nodes
                                    .into_iter()
                                    .filter(|n| !n.tagged_addresses.is_empty())
                                    .map(|n| n.node),
                            ),
                            Err(e) => return Attempt::Again(e.to_string()),
                        }
                    }
                    match expected.difference(&seen).next() {
                        None => Attempt::Done(()),
                        Some(missing) => Attempt::Again(format!("node {missing} not synced yet")),
                    }
                }
            })
            .await;
        synced.with_context(|| format!("cluster {:?}: client anti-entropy", cluster.name))?;
        debug!(cluster = %cluster.name, agents = expected.len(), "agents in catalog");
        Ok(())
    }

    async fn wait_for_leader(&self, cluster: &Cluster) -> SprawlResult<()> {
        let client = self.client(&cluster.name)?;
        let leader: Result<String, RetryError<SprawlError>> =
            retry_until(&self.timings().leader(), "leader election", || {
                let client = client.clone();
                async move {
                    match client.status_leader().await {
                        Ok(addr) if !addr.is_empty() => Attempt::Done(addr),
                        Ok(_) => Attempt::Again("no leader".to_string()),
                        Err(e) => Attempt::Again(e.to_string()),
                    }
                }
            })
            .await;
        let leader = leader.with_context(|| format!("cluster {:?}: wait for leader", cluster.name))?;
        info!(cluster = %cluster.name, %leader, "leader elected");
        Ok(())
    }
}

