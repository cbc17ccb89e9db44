// Copyright (c) 2025 - Cowboy AI, Inc.
//! Upgrade drivers
//!
//! Both recipes are built from [`Sprawl::relaunch_with_phase`] with
//! [`RelaunchMode::Upgrade`]. Standard mode walks one agent at a time;
//! autopilot mode brings in a batch of new servers and waits for the
//! leader to move onto them.

use futures::future::BoxFuture;
use std::fmt;
use tracing::info;

use super::{RelaunchMode, Sprawl};
use crate::domain::{Cluster, Config, Images, NodeKind};
use crate::errors::{ResultExt, SprawlError, SprawlResult};
use crate::retry::{retry_until, Attempt, RetryError};

/// How [`Sprawl::upgrade`] replaces agent images
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpgradeMode {
    /// Relaunch servers, then clients, one node at a time
    Standard,
    /// Enable new servers in one relaunch and wait for leadership to move
    Autopilot,
}

impl fmt::Display for UpgradeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpgradeMode::Standard => f.write_str("standard"),
            UpgradeMode::Autopilot => f.write_str("autopilot"),
        }
    }
}

/// Validation callback that accepts every step
pub fn no_validation(_: &Sprawl) -> BoxFuture<'_, SprawlResult<()>> {
    Box::pin(async { Ok(()) })
}

impl Sprawl {
    /// Move the agents of `cluster` onto `target` images.
    ///
    /// `validate` runs after every relaunch. In autopilot mode
    /// `new_servers` indexes the disabled servers of the cluster (in node
    /// order) to bring in; it must name at least as many servers as are
    /// currently running.
    ///
    /// # Errors
    ///
    /// - `NotFound` for an unknown cluster
    /// - `Fatal` if a new-server index is not a disabled server, or the
    ///   batch is smaller than the running server set
    /// - `RetryExhausted` if the leader never moves in autopilot mode
    pub async fn upgrade<F>(
        &mut self,
        cluster: &str,
        mode: UpgradeMode,
        target: &Images,
        new_servers: &[usize],
        mut validate: F,
    ) -> SprawlResult<()>
    where
        F: for<'a> FnMut(&'a Sprawl) -> BoxFuture<'a, SprawlResult<()>>,
    {
        info!(cluster, %mode, "upgrade started");
        match mode {
            UpgradeMode::Standard => self.standard_upgrade(cluster, target, &mut validate).await?,
            UpgradeMode::Autopilot => {
                self.autopilot_upgrade(cluster, target, new_servers, &mut validate)
                    .await?
            }
        }
        info!(cluster, %mode, "upgrade complete");
        Ok(())
    }

    async fn standard_upgrade<F>(
        &mut self,
        cluster: &str,
        target: &Images,
        validate: &mut F,
    ) -> SprawlResult<()>
    where
        F: for<'a> FnMut(&'a Sprawl) -> BoxFuture<'a, SprawlResult<()>>,
    {
        let mut config = self.config.clone();
        let nodes = config_cluster(&config, cluster)?;
        let order: Vec<usize> = [NodeKind::Server, NodeKind::Client]
            .into_iter()
            .flat_map(|kind| {
                nodes
                    .nodes
                    .iter()
                    .enumerate()
                    .filter(move |(_, n)| n.kind == kind && !n.disabled)
                    .map(|(i, _)| i)
            })
            .collect();

        for i in order {
            let node = &mut config_cluster_mut(&mut config, cluster)?.nodes[i];
            node.images = node.images.override_with(&agent_images(target));
            let id = node.id();
            info!(cluster, node = %id, "upgrading node");

            self.relaunch_with_phase(config.clone(), RelaunchMode::Upgrade)
                .await
                .with_context(|| format!("upgrade {cluster}/{id}"))?;
            validate(&*self)
                .await
                .with_context(|| format!("validate after upgrading {cluster}/{id}"))?;
        }
        Ok(())
    }

    async fn autopilot_upgrade<F>(
        &mut self,
        cluster: &str,
        target: &Images,
        new_servers: &[usize],
        validate: &mut F,
    ) -> SprawlResult<()>
    where
        F: for<'a> FnMut(&'a Sprawl) -> BoxFuture<'a, SprawlResult<()>>,
    {
        let old_leader = self.leader(cluster).await?;
        let running = self.cluster(cluster)?.server_nodes().len();
        if new_servers.len() < running {
            return Err(SprawlError::fatal(format!(
                "autopilot upgrade needs at least {running} new servers, got {}",
                new_servers.len()
            )));
        }

        let mut config = self.config.clone();
        let c = config_cluster_mut(&mut config, cluster)?;
        for &i in new_servers {
            let node = c
                .nodes
                .get_mut(i)
                .filter(|n| n.kind == NodeKind::Server && n.disabled)
                .ok_or_else(|| {
                    SprawlError::fatal(format!("node {i} of cluster {cluster:?} is not a disabled server"))
                })?;
            node.disabled = false;
            node.is_new_server = true;
            node.images = node.images.override_with(&agent_images(target));
        }

        self.relaunch_with_phase(config.clone(), RelaunchMode::Upgrade)
            .await
            .with_context(|| format!("autopilot upgrade of {cluster}: add new servers"))?;

        tokio::time::sleep(self.timings().leader_transfer_settle()).await;
        let old_id = old_leader.id();
        let moved: Result<(), RetryError<SprawlError>> =
            retry_until(&self.timings().leader_transfer(), "leader transfer", || {
                let this = &*self;
                let old_id = &old_id;
                async move {
                    match this.leader(cluster).await {
                        Ok(leader) if &leader.id() != old_id => Attempt::Done(()),
                        Ok(leader) => Attempt::Again(format!("leader is still {}", leader.id())),
                        Err(e) => Attempt::Again(e.to_string()),
                    }
                }
            })
            .await;
        moved.with_context(|| format!("autopilot upgrade of {cluster}: leader transfer"))?;
        info!(cluster, old_leader = %old_id, "leadership moved to new servers");

        for &i in new_servers {
            if let Some(node) = config_cluster_mut(&mut config, cluster)?.nodes.get_mut(i) {
                node.is_new_server = false;
            }
        }
        self.config = config;
        if let Some(c) = self.topology.cluster_mut(cluster) {
            for n in c.nodes.iter_mut() {
                n.is_new_server = false;
            }
        }

        validate(&*self)
            .await
            .with_context(|| format!("validate after autopilot upgrade of {cluster}"))
    }
}

/// Only the agent images take part in an upgrade
fn agent_images(target: &Images) -> Images {
    Images {
        agent_ce: target.agent_ce.clone(),
        agent_enterprise: target.agent_enterprise.clone(),
        ..Images::default()
    }
}

fn config_cluster<'a>(config: &'a Config, name: &str) -> SprawlResult<&'a Cluster> {
    config
        .cluster(name)
        .ok_or_else(|| SprawlError::not_found(format!("no such cluster: {name}")))
}

fn config_cluster_mut<'a>(
    config: &'a mut Config,
    name: &str,
) -> SprawlResult<&'a mut Cluster> {
    config
        .cluster_mut(name)
        .ok_or_else(|| SprawlError::not_found(format!("no such cluster: {name}")))
}
