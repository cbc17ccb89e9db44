// Copyright (c) 2025 - Cowboy AI, Inc.
//! Deployment Orchestrator
//!
//! A [`Sprawl`] owns one running topology. It compiles the config, drives
//! the infra generator step by step, and in between those steps brings the
//! control plane of every cluster to the state the topology asks for.
//!
//! # Architecture
//!
//! ```text
//! Config ──compile──▶ Topology ──Generator──▶ Provisioner
//!                        │
//!                        ▼
//!                     Sprawl ──ControlPlane──▶ cluster APIs
//!                        │
//!                        ├── ACL bootstrap, tokens, policies
//!                        ├── partitions and namespaces
//!                        ├── catalog sync (agents, dataplanes, v2 resources)
//!                        └── peerings and network areas
//! ```
//!
//! Everything runs sequentially: clusters, nodes and peerings are visited
//! in a fixed order and every wait is a fixed-delay retry loop.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use cim_sprawl::config::SprawlConfig;
//! use cim_sprawl::domain::Config;
//! use cim_sprawl::simulated::SimulatedWorld;
//! use cim_sprawl::sprawl::Sprawl;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_json_file("topology.json")?;
//!     let world = SimulatedWorld::new();
//!     let sprawl = Sprawl::launch(
//!         Arc::new(world.clone()),
//!         Arc::new(world),
//!         config,
//!         SprawlConfig::default(),
//!     )
//!     .await?;
//!     println!("{}", sprawl.details());
//!     sprawl.stop().await?;
//!     Ok(())
//! }
//! ```

use rand::RngCore;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, info_span, Instrument};

use crate::api::{ApiTarget, ControlPlane, ControlPlaneConnector, RequestOptions, TokenChoice};
use crate::compiler::{compile, recompile};
use crate::config::{RetryTimings, SprawlConfig};
use crate::domain::{Cluster, Config, Node, NodeId, Topology, AGENT_HTTP_PORT};
use crate::errors::{ResultExt, SprawlError, SprawlResult};
use crate::infra::{Generator, Provisioner};
use crate::secrets::{GenericSecret, SecretStore};
use crate::state_machine::{GeneratorPhase, PhaseCommand, StateMachineWithHistory, Step};

mod acl;
pub mod acl_rules;
mod boot;
mod catalog;
mod details;
mod peering;
mod tenancy;
mod upgrade;

pub use upgrade::{no_validation, UpgradeMode};

/// How a relaunch treats the running clusters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RelaunchMode {
    /// Reconcile tenancy, tokens and catalog, then regenerate
    #[default]
    Regular,
    /// Regenerate with new images and wait for leadership to settle
    Upgrade,
}

impl fmt::Display for RelaunchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelaunchMode::Regular => f.write_str("regular"),
            RelaunchMode::Upgrade => f.write_str("upgrade"),
        }
    }
}

/// A launched topology and the handles needed to change it
pub struct Sprawl {
    connector: Arc<dyn ControlPlaneConnector>,
    generator: Generator,
    settings: SprawlConfig,
    secrets: SecretStore,
    /// The config as the caller wrote it, before compilation
    config: Config,
    topology: Topology,
    phase: StateMachineWithHistory<GeneratorPhase>,
    /// Management clients, one per cluster
    clients: BTreeMap<String, Arc<dyn ControlPlane>>,
}

impl fmt::Debug for Sprawl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sprawl")
            .field("topology", &self.topology.id)
            .field("phase", &self.phase.current)
            .field("clusters", &self.clients.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Sprawl {
    /// Compile `config` and bring the whole topology up.
    ///
    /// # Arguments
    ///
    /// * `connector` - Builds control-plane clients for cluster nodes
    /// * `provisioner` - Applies rendered infrastructure
    /// * `config` - Declarative topology
    /// * `settings` - License, subnet seed and retry timings
    ///
    /// # Errors
    ///
    /// Any compile, infra or control-plane failure aborts the launch. The
    /// address table is still logged to help debugging.
    pub async fn launch(
        connector: Arc<dyn ControlPlaneConnector>,
        provisioner: Arc<dyn Provisioner>,
        config: Config,
        settings: SprawlConfig,
    ) -> SprawlResult<Self> {
        let topology = compile(&config).context("compile topology")?;
        let generator = Generator::new(provisioner, settings.subnet_seed, settings.license.clone());

        let mut sprawl = Self {
            connector,
            generator,
            settings,
            secrets: SecretStore::new(),
            config,
            topology,
            phase: StateMachineWithHistory::new(GeneratorPhase::Pending),
            clients: BTreeMap::new(),
        };

        let start = Instant::now();
        let span = info_span!("launch", topology = %sprawl.topology.id);
        if let Err(err) = sprawl.launch_steps().instrument(span).await {
            sprawl.log_details();
            return Err(err);
        }
        info!(
            elapsed_ms = start.elapsed().as_millis() as u64,
            "topology is ready for use"
        );
        sprawl.log_details();
        Ok(sprawl)
    }

    /// Apply an edited config to the running topology
    pub async fn relaunch(&mut self, config: Config) -> SprawlResult<()> {
        self.relaunch_with_phase(config, RelaunchMode::Regular).await
    }

    /// Recompile against the live topology and reconcile.
    ///
    /// Nodes are removed by disabling them; recompile rejects anything that
    /// drops or reorders nodes.
    pub async fn relaunch_with_phase(
        &mut self,
        config: Config,
        mode: RelaunchMode,
    ) -> SprawlResult<()> {
        let topology = recompile(&config, &self.topology).context("recompile topology")?;
        self.config = config;
        self.topology = topology;

        let start = Instant::now();
        let span = info_span!("relaunch", topology = %self.topology.id, %mode);
        if let Err(err) = self.relaunch_steps(mode).instrument(span).await {
            self.log_details();
            return Err(err);
        }
        info!(
            elapsed_ms = start.elapsed().as_millis() as u64,
            %mode,
            "topology is ready for use"
        );
        self.log_details();
        Ok(())
    }

    /// Tear down all infrastructure of the topology
    pub async fn stop(&self) -> SprawlResult<()> {
        self.generator
            .destroy(&self.topology)
            .await
            .context("destroy topology")?;
        info!(topology = %self.topology.id, "topology destroyed");
        Ok(())
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// The config last applied, as written by the caller
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn secrets(&self) -> &SecretStore {
        &self.secrets
    }

    pub fn phase(&self) -> GeneratorPhase {
        self.phase.current
    }

    pub fn settings(&self) -> &SprawlConfig {
        &self.settings
    }

    /// Node currently holding cluster leadership
    ///
    /// # Errors
    ///
    /// - `NotFound` if no leader is elected, or the leader address matches
    ///   no enabled server
    pub async fn leader(&self, cluster: &str) -> SprawlResult<Node> {
        let client = self.client(cluster)?;
        let addr = client
            .status_leader()
            .await
            .with_context(|| format!("cluster {cluster:?}: read leader"))?;
        if addr.is_empty() {
            return Err(SprawlError::not_found(format!("cluster {cluster:?} has no leader")));
        }
        self.cluster(cluster)?
            .server_by_addr(&addr)
            .cloned()
            .ok_or_else(|| SprawlError::not_found(format!("leader {addr} not found")))
    }

    /// Enabled servers other than the leader
    pub async fn followers(&self, cluster: &str) -> SprawlResult<Vec<Node>> {
        let leader = self
            .leader(cluster)
            .await
            .context("could not determine leader")?;
        Ok(self
            .cluster(cluster)?
            .nodes
            .iter()
            .filter(|n| n.is_server() && !n.disabled && n.id() != leader.id())
            .cloned()
            .collect())
    }

    pub fn disabled_servers(&self, cluster: &str) -> SprawlResult<Vec<Node>> {
        Ok(self
            .cluster(cluster)?
            .nodes
            .iter()
            .filter(|n| n.is_server() && n.disabled)
            .cloned()
            .collect())
    }

    /// Save a snapshot, let the cluster settle, then restore it
    pub async fn snapshot_save_and_restore(&self, cluster: &str) -> SprawlResult<()> {
        let client = self.client(cluster)?;
        let snapshot = client
            .snapshot_save()
            .await
            .with_context(|| format!("cluster {cluster:?}: save snapshot"))?;
        info!(cluster, bytes = snapshot.len(), "snapshot saved");

        tokio::time::sleep(self.timings().snapshot_settle()).await;

        client
            .snapshot_restore(&snapshot)
            .await
            .with_context(|| format!("cluster {cluster:?}: restore snapshot"))?;
        info!(cluster, "snapshot restored");
        Ok(())
    }

    /// # Returns
    ///
    /// `None` if the key does not exist
    pub async fn get_kv(
        &self,
        cluster: &str,
        key: &str,
        opts: &RequestOptions,
    ) -> SprawlResult<Option<Vec<u8>>> {
        self.client(cluster)?
            .kv_get(key, opts)
            .await
            .with_context(|| format!("cluster {cluster:?}: get key {key:?}"))
    }

    /// Write keys `key-0` through `key-{count}` with random values
    pub async fn load_kv_data_to_cluster(
        &self,
        cluster: &str,
        count: usize,
        opts: &RequestOptions,
    ) -> SprawlResult<()> {
        let client = self.client(cluster)?;
        let mut value = vec![0u8; self.settings.kv_value_size];
        for i in 0..=count {
            rand::thread_rng().fill_bytes(&mut value);
            let key = format!("key-{i}");
            client
                .kv_put(&key, &value, opts)
                .await
                .with_context(|| format!("cluster {cluster:?}: write key {key:?}"))?;
        }
        info!(cluster, keys = count + 1, "kv data loaded");
        Ok(())
    }

    /// Client for the agent running on one node
    ///
    /// # Errors
    ///
    /// - `NotFound` for an unknown cluster or node
    /// - `Fatal` if the node runs no agent
    pub fn api_client_for_node(
        &self,
        cluster: &str,
        node: &NodeId,
        token: TokenChoice,
    ) -> SprawlResult<Arc<dyn ControlPlane>> {
        let c = self.cluster(cluster)?;
        let n = c
            .node_by_id(node)
            .ok_or_else(|| SprawlError::not_found(format!("cluster {cluster:?} node {node}")))?;
        if !n.is_agent() {
            return Err(SprawlError::fatal(format!("node {node} is not an agent")));
        }
        let token = match token {
            TokenChoice::Bootstrap => self.management_token(cluster),
            TokenChoice::Anonymous => None,
            TokenChoice::Custom(token) => Some(token),
        };
        let target = api_target(cluster, n, token)?;
        Ok(self.connector.connect(&target)?)
    }

    /// Client for the first client agent, or the first server when the
    /// cluster has no clients
    pub fn api_client_for_cluster(
        &self,
        cluster: &str,
        token: TokenChoice,
    ) -> SprawlResult<Arc<dyn ControlPlane>> {
        let c = self.cluster(cluster)?;
        let agent = c
            .first_client()
            .or_else(|| c.first_server())
            .ok_or_else(|| SprawlError::not_found(format!("no agent in cluster {cluster:?}")))?;
        self.api_client_for_node(cluster, &agent.id(), token)
    }

    fn timings(&self) -> &RetryTimings {
        &self.settings.timings
    }

    fn cluster(&self, name: &str) -> SprawlResult<&Cluster> {
        self.topology
            .cluster(name)
            .ok_or_else(|| SprawlError::not_found(format!("no such cluster: {name}")))
    }

    /// Clusters in name order, detached from `self` so phases can mutate
    fn clusters(&self) -> Vec<Cluster> {
        self.topology.sorted_clusters().cloned().collect()
    }

    fn client(&self, cluster: &str) -> SprawlResult<Arc<dyn ControlPlane>> {
        self.clients
            .get(cluster)
            .cloned()
            .ok_or_else(|| SprawlError::not_found(format!("no client for cluster {cluster:?}")))
    }

    fn management_token(&self, cluster: &str) -> Option<String> {
        self.secrets.read_generic(cluster, GenericSecret::BootstrapToken)
    }

    /// Point the cluster's management client at its first server
    fn connect_cluster(&mut self, cluster: &str, token: Option<String>) -> SprawlResult<()> {
        let client = {
            let c = self.cluster(cluster)?;
            let server = c.first_server().ok_or_else(|| {
                SprawlError::not_found(format!("cluster {cluster:?} has no reachable server"))
            })?;
            self.connector.connect(&api_target(cluster, server, token)?)?
        };
        self.clients.insert(cluster.to_string(), client);
        Ok(())
    }

    /// Client bound to one node's agent, authenticated as management
    fn node_client(&self, cluster: &str, node: &Node) -> SprawlResult<Arc<dyn ControlPlane>> {
        let target = api_target(cluster, node, self.management_token(cluster))?;
        Ok(self.connector.connect(&target)?)
    }

    /// Advance the generator phase and apply `step`
    async fn generate(&mut self, step: Step) -> SprawlResult<bool> {
        self.phase
            .transition_with_history(PhaseCommand::Apply(step), chrono::Utc::now())?;
        self.generator
            .generate(&mut self.topology, &self.secrets, step)
            .await
            .with_context(|| format!("generate {step}"))
    }
}

fn api_target(cluster: &str, node: &Node, token: Option<String>) -> SprawlResult<ApiTarget> {
    let ip = node.local_address().ok_or_else(|| {
        SprawlError::fatal(format!("cluster {cluster:?} node {} has no local address", node.id()))
    })?;
    Ok(ApiTarget {
        cluster: cluster.to_string(),
        node: node.id(),
        address: format!("{ip}:{AGENT_HTTP_PORT}"),
        proxy_port: node.local_proxy_port(),
        token,
    })
}
