// Copyright (c) 2025 - Cowboy AI, Inc.
//! Process-lifetime secret store
//!
//! Generated credentials keyed by `(cluster, scope)`. Entries are created
//! lazily and never regenerated once present, so they carry forward
//! unchanged across recompiles. The store is shared behind a mutex so
//! clusters can be brought up concurrently.

use base64::Engine as _;
use rand::RngCore;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::domain::{NodeId, WorkloadId};

/// Cluster-wide secrets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GenericSecret {
    BootstrapToken,
    CaPem,
    GossipKey,
    AgentRecovery,
}

/// What a secret belongs to within a cluster
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SecretScope {
    Generic(GenericSecret),
    /// Agent token of a node
    Agent(NodeId),
    /// Service token of a workload
    Workload(WorkloadId),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SecretKey {
    cluster: String,
    scope: SecretScope,
}

/// Keyed store for generated credentials
#[derive(Default)]
pub struct SecretStore {
    entries: Mutex<HashMap<SecretKey, String>>,
}

impl fmt::Debug for SecretStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretStore")
            .field("entries", &self.lock().len())
            .finish()
    }
}

impl SecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SecretKey, String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn key(cluster: &str, scope: SecretScope) -> SecretKey {
        SecretKey {
            cluster: cluster.to_string(),
            scope,
        }
    }

    pub fn save_generic(&self, cluster: &str, secret: GenericSecret, value: impl Into<String>) {
        self.lock()
            .insert(Self::key(cluster, SecretScope::Generic(secret)), value.into());
    }

    pub fn read_generic(&self, cluster: &str, secret: GenericSecret) -> Option<String> {
        self.lock()
            .get(&Self::key(cluster, SecretScope::Generic(secret)))
            .cloned()
    }

    pub fn save_agent_token(&self, cluster: &str, node: &NodeId, token: impl Into<String>) {
        self.lock()
            .insert(Self::key(cluster, SecretScope::Agent(node.clone())), token.into());
    }

    pub fn read_agent_token(&self, cluster: &str, node: &NodeId) -> Option<String> {
        self.lock()
            .get(&Self::key(cluster, SecretScope::Agent(node.clone())))
            .cloned()
    }

    pub fn save_workload_token(&self, cluster: &str, id: &WorkloadId, token: impl Into<String>) {
        self.lock()
            .insert(Self::key(cluster, SecretScope::Workload(id.clone())), token.into());
    }

    pub fn read_workload_token(&self, cluster: &str, id: &WorkloadId) -> Option<String> {
        self.lock()
            .get(&Self::key(cluster, SecretScope::Workload(id.clone())))
            .cloned()
    }

    /// Return the existing generic secret, or store the generated one.
    pub fn get_or_init_generic(
        &self,
        cluster: &str,
        secret: GenericSecret,
        generate: impl FnOnce() -> String,
    ) -> String {
        self.lock()
            .entry(Self::key(cluster, SecretScope::Generic(secret)))
            .or_insert_with(generate)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// 32 random bytes, standard base64
pub fn generate_gossip_key() -> String {
    let mut key = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut key);
    base64::engine::general_purpose::STANDARD.encode(key)
}

/// A fresh UUID
pub fn generate_recovery_token() -> String {
    uuid::Uuid::new_v4().to_string()
}
