// Copyright (c) 2025 - Cowboy AI, Inc.
//! Orchestrator tests against the simulated backend
//!
//! These drive full launches, relaunches and upgrades through
//! [`SimulatedWorld`], which stands in for both the provisioner and the
//! cluster APIs.

mod fixtures;

use std::collections::BTreeSet;
use std::sync::Arc;

use fixtures::*;
use futures::FutureExt;
use pretty_assertions::assert_eq;

use cim_sprawl::api::{PeeringState, TokenChoice};
use cim_sprawl::domain::{ConfigEntry, NodeKind};
use cim_sprawl::simulated::Fault;
use cim_sprawl::sprawl::no_validation;
use cim_sprawl::state_machine::{GeneratorPhase, Step};
use cim_sprawl::{RelaunchMode, RequestOptions, SimulatedWorld, Sprawl, SprawlError, UpgradeMode};

fn service_ids_on(world: &SimulatedWorld, cluster: &str, pod: &str) -> BTreeSet<String> {
    world
        .catalog(cluster)
        .services
        .keys()
        .filter(|(_, node, _)| node == pod)
        .map(|(_, _, id)| id.clone())
        .collect()
}

#[tokio::test]
async fn test_launch_applies_every_step_in_order() {
    let (sprawl, world) = launch(single_cluster_config()).await;

    assert_eq!(sprawl.phase(), GeneratorPhase::Launched);
    assert_eq!(
        world.applied_steps(),
        vec![Step::Networks, Step::Servers, Step::Agents, Step::Services]
    );
    for name in ["server1", "server2", "server3", "client1", "dataplane1"] {
        assert!(world.is_running("dc1", &node_id(name)), "{name} should be running");
    }
    assert!(sprawl.secrets().len() >= 3);
}

#[tokio::test]
async fn test_launch_registers_agent_and_dataplane_workloads() {
    let (sprawl, world) = launch(single_cluster_config()).await;

    let client = pod_name(&sprawl, "dc1", "client1");
    let dataplane = pod_name(&sprawl, "dc1", "dataplane1");

    assert!(service_ids_on(&world, "dc1", &client).contains("ping"));
    assert_eq!(
        service_ids_on(&world, "dc1", &dataplane),
        BTreeSet::from(["pong".to_string(), "pong-sidecar-proxy".to_string()])
    );
    assert!(world
        .catalog("dc1")
        .nodes
        .keys()
        .any(|(_, node)| node == &dataplane));
}

#[tokio::test]
async fn test_launch_issues_tokens_by_description() {
    let (_sprawl, world) = launch(single_cluster_config()).await;

    let descriptions: BTreeSet<String> = world
        .tokens("dc1")
        .into_iter()
        .map(|t| t.description)
        .collect();
    for expected in [
        "agent--default--server1",
        "agent--default--client1",
        "service--default--default--ping",
        "service--default--default--pong",
        "Anonymous Token",
    ] {
        assert!(descriptions.contains(expected), "missing token {expected}");
    }
}

#[tokio::test]
async fn test_relaunch_without_changes_is_a_no_op() {
    let (mut sprawl, world) = launch(single_cluster_config()).await;
    let config = sprawl.config().clone();

    sprawl.relaunch(config.clone()).await.unwrap();
    let catalog = world.catalog("dc1");
    let tokens = world.tokens("dc1").len();

    sprawl.relaunch(config).await.unwrap();
    assert_eq!(world.catalog("dc1"), catalog);
    assert_eq!(world.tokens("dc1").len(), tokens);
    assert_eq!(world.applied_steps().last(), Some(&Step::Relaunch));
}

#[tokio::test]
async fn test_disabling_dataplane_deregisters_its_workloads() {
    let (mut sprawl, world) = launch(single_cluster_config()).await;
    let dataplane = pod_name(&sprawl, "dc1", "dataplane1");

    let mut config = sprawl.config().clone();
    assert!(config.disable_node("dc1", &node_id("dataplane1")).unwrap());
    sprawl.relaunch(config).await.unwrap();

    let node = sprawl
        .topology()
        .cluster("dc1")
        .and_then(|c| c.node_by_id(&node_id("dataplane1")))
        .cloned()
        .unwrap();
    assert!(node.disabled);
    assert!(service_ids_on(&world, "dc1", &dataplane).is_empty());
    assert!(!world
        .catalog("dc1")
        .nodes
        .keys()
        .any(|(_, n)| n == &dataplane));
    assert!(!world.is_running("dc1", &node_id("dataplane1")));
}

#[tokio::test]
async fn test_reenabling_dataplane_registers_it_again() {
    let (mut sprawl, world) = launch(single_cluster_config()).await;
    let dataplane = pod_name(&sprawl, "dc1", "dataplane1");

    let mut config = sprawl.config().clone();
    config.disable_node("dc1", &node_id("dataplane1")).unwrap();
    sprawl.relaunch(config.clone()).await.unwrap();

    config.enable_node("dc1", &node_id("dataplane1")).unwrap();
    sprawl.relaunch(config).await.unwrap();
    assert!(service_ids_on(&world, "dc1", &dataplane).contains("pong"));
    assert!(world.is_running("dc1", &node_id("dataplane1")));
}

#[tokio::test]
async fn test_relaunch_rejects_shuffled_nodes() {
    let (mut sprawl, _world) = launch(single_cluster_config()).await;
    let mut config = sprawl.config().clone();
    config.clusters[0].nodes.swap(0, 1);

    let err = sprawl.relaunch(config).await.unwrap_err();
    assert!(err.to_string().contains("has been shuffled"), "{err}");
}

#[tokio::test]
async fn test_launch_retries_transient_backend_errors() {
    let world = SimulatedWorld::new();
    world.inject(Fault::BootstrapPending, 3);
    world.inject(Fault::IntentionsMigrating, 2);
    world.inject(Fault::AclNotFound, 2);

    let mut config = single_cluster_config();
    config.clusters[0]
        .initial_config_entries
        .push(ConfigEntry::new("service-defaults", "ping"));

    let sprawl = Sprawl::launch(Arc::new(world.clone()), Arc::new(world.clone()), config, settings())
        .await
        .unwrap();
    assert!(sprawl.phase().is_launched());
    assert_eq!(world.config_entries("dc1").len(), 1);
}

#[tokio::test]
async fn test_relaunch_waits_for_restarted_servers_to_accept_stored_token() {
    let (mut sprawl, world) = launch(single_cluster_config()).await;
    let tokens = world.tokens("dc1").len();
    world.inject(Fault::BootstrapPending, 2);

    let config = sprawl.config().clone();
    sprawl
        .relaunch_with_phase(config, RelaunchMode::Upgrade)
        .await
        .unwrap();

    assert_eq!(world.pending_faults(Fault::BootstrapPending), 0);
    assert_eq!(world.tokens("dc1").len(), tokens);
    assert!(sprawl.phase().is_launched());
}

#[tokio::test]
async fn test_launch_rejects_duplicate_mesh_gateways() {
    let world = SimulatedWorld::new();
    let mut config = peered_config();
    let mut second = node(NodeKind::Client, "client2");
    second.workloads.push(mesh_gateway());
    config.clusters[0].nodes.push(second);

    let err = Sprawl::launch(Arc::new(world.clone()), Arc::new(world.clone()), config, settings())
        .await
        .unwrap_err();
    assert!(matches!(err.root(), SprawlError::Fatal(_)), "{err}");
    assert!(err.to_string().contains("expected exactly one mesh gateway"), "{err}");
}

#[tokio::test]
async fn test_peering_reaches_active_on_both_sides() {
    let world = SimulatedWorld::new();
    world.inject(Fault::PeeringTimeout, 2);
    let sprawl = Sprawl::launch(
        Arc::new(world.clone()),
        Arc::new(world.clone()),
        peered_config(),
        settings(),
    )
    .await
    .unwrap();

    let dialing = world.peering("dc1", "default", "peer-dc2-default").unwrap();
    let accepting = world.peering("dc2", "default", "peer-dc1-default").unwrap();
    assert_eq!(dialing.state, PeeringState::Active);
    assert_eq!(accepting.state, PeeringState::Active);
    assert_eq!(sprawl.topology().peerings.len(), 1);
}

#[tokio::test]
async fn test_relaunch_keeps_peering_active() {
    let (mut sprawl, world) = launch(peered_config()).await;
    let config = sprawl.config().clone();
    sprawl.relaunch(config).await.unwrap();

    let dialing = world.peering("dc1", "default", "peer-dc2-default").unwrap();
    assert_eq!(dialing.state, PeeringState::Active);
}

#[tokio::test]
async fn test_standard_upgrade_walks_servers_then_clients() {
    let (mut sprawl, world) = launch(single_cluster_config()).await;
    let mut seen = Vec::new();

    sprawl
        .upgrade("dc1", UpgradeMode::Standard, &upgrade_images(), &[], |s: &Sprawl| {
            seen.push(s.phase());
            async { Ok(()) }.boxed()
        })
        .await
        .unwrap();

    assert_eq!(seen.len(), 4);
    for name in ["server1", "server2", "server3", "client1"] {
        assert_eq!(
            world.agent_image("dc1", &node_id(name)).as_deref(),
            Some(UPGRADE_CE_IMAGE),
            "{name} should run the new image"
        );
    }
    let leader = sprawl.leader("dc1").await.unwrap();
    assert_eq!(leader.kind, NodeKind::Server);
}

#[tokio::test]
async fn test_autopilot_upgrade_moves_leadership_to_new_servers() {
    let (mut sprawl, world) = launch(autopilot_config()).await;
    let old_leader = sprawl.leader("dc1").await.unwrap();
    assert!(["server1", "server2", "server3"].contains(&old_leader.name.as_str()));
    assert_eq!(sprawl.disabled_servers("dc1").unwrap().len(), 3);

    sprawl
        .upgrade(
            "dc1",
            UpgradeMode::Autopilot,
            &upgrade_images(),
            &[3, 4, 5],
            |s: &Sprawl| async move { s.leader("dc1").await.map(|_| ()) }.boxed(),
        )
        .await
        .unwrap();

    let leader = sprawl.leader("dc1").await.unwrap();
    assert!(["server4", "server5", "server6"].contains(&leader.name.as_str()));
    assert!(world.is_running("dc1", &node_id("server6")));
    let dc1 = sprawl.topology().cluster("dc1").unwrap();
    assert!(dc1.nodes.iter().all(|n| !n.is_new_server && !(n.is_server() && n.disabled)));
    assert!(sprawl.disabled_servers("dc1").unwrap().is_empty());
}

#[tokio::test]
async fn test_autopilot_upgrade_needs_enough_new_servers() {
    let (mut sprawl, _world) = launch(autopilot_config()).await;
    let err = sprawl
        .upgrade("dc1", UpgradeMode::Autopilot, &upgrade_images(), &[3], no_validation)
        .await
        .unwrap_err();
    assert!(matches!(err, SprawlError::Fatal(_)), "{err}");

    let err = sprawl
        .upgrade("dc1", UpgradeMode::Autopilot, &upgrade_images(), &[0, 4, 5], no_validation)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("not a disabled server"), "{err}");
}

#[tokio::test]
async fn test_followers_exclude_the_leader() {
    let (sprawl, _world) = launch(single_cluster_config()).await;
    let leader = sprawl.leader("dc1").await.unwrap();
    let followers = sprawl.followers("dc1").await.unwrap();

    assert_eq!(followers.len(), 2);
    assert!(followers.iter().all(|f| f.id() != leader.id()));
}

#[tokio::test]
async fn test_kv_load_and_snapshot_restore() {
    let (sprawl, world) = launch(single_cluster_config()).await;
    let opts = RequestOptions::default();
    let before = world.kv_len("dc1");

    sprawl.load_kv_data_to_cluster("dc1", 9, &opts).await.unwrap();
    assert_eq!(world.kv_len("dc1"), before + 10);
    let value = sprawl.get_kv("dc1", "key-3", &opts).await.unwrap().unwrap();
    assert_eq!(value.len(), sprawl.settings().kv_value_size);
    assert_eq!(sprawl.get_kv("dc1", "missing", &opts).await.unwrap(), None);

    sprawl.snapshot_save_and_restore("dc1").await.unwrap();
    assert_eq!(world.snapshot_restores("dc1"), 1);
}

#[tokio::test]
async fn test_api_clients_only_for_agents() {
    let (sprawl, _world) = launch(single_cluster_config()).await;

    let err = sprawl
        .api_client_for_node("dc1", &node_id("dataplane1"), TokenChoice::Bootstrap)
        .err()
        .unwrap();
    assert!(matches!(err, SprawlError::Fatal(_)));

    let client = sprawl
        .api_client_for_cluster("dc1", TokenChoice::Bootstrap)
        .unwrap();
    assert!(!client.status_leader().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_details_lists_every_node() {
    let (sprawl, _world) = launch(single_cluster_config()).await;
    let details = sprawl.details();
    for name in ["server1", "server2", "server3", "client1", "dataplane1"] {
        assert!(details.contains(name), "details should list {name}");
    }
}

#[tokio::test]
async fn test_stop_tears_down_everything() {
    let (sprawl, world) = launch(single_cluster_config()).await;
    sprawl.stop().await.unwrap();
    assert!(!world.is_running("dc1", &node_id("server1")));
}
