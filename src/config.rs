// Copyright (c) 2025 - Cowboy AI, Inc.
//! Orchestration settings
//!
//! Every fixed delay and bounded budget used by the bring-up loops lives in
//! [`RetryTimings`], threaded through [`SprawlConfig`] rather than shared
//! globals.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::retry::RetryPolicy;

/// Default size of each value written by a KV load
pub const DEFAULT_KV_VALUE_SIZE: usize = 128 * 1024;

/// Fixed delays (milliseconds) and attempt budgets for retry loops
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryTimings {
    /// Objects not yet visible because ACLs are still propagating
    pub acl_propagation_ms: u64,
    /// Credential store not yet bootstrapped
    pub acl_bootstrap_ms: u64,
    /// First KV write after servers start
    pub local_write_ms: u64,
    /// Client agents appearing in the catalog
    pub anti_entropy_ms: u64,
    /// Servers rejoining each other
    pub server_join_ms: u64,
    /// Config entries while intentions migrate
    pub config_entry_ms: u64,
    /// Peering token generation and establishment
    pub peering_call_ms: u64,
    /// Peering status polling
    pub peering_poll_ms: u64,
    pub peering_active_attempts: u32,
    /// Mesh gateway health polling
    pub gateway_poll_ms: u64,
    /// Leader presence polling
    pub leader_poll_ms: u64,
    /// Sleep before the first leader-transfer check
    pub leader_transfer_settle_ms: u64,
    pub leader_transfer_ms: u64,
    pub leader_transfer_attempts: u32,
    /// Sleep between snapshot save and restore
    pub snapshot_settle_ms: u64,
}

impl Default for RetryTimings {
    fn default() -> Self {
        Self {
            acl_propagation_ms: 50,
            acl_bootstrap_ms: 250,
            local_write_ms: 500,
            anti_entropy_ms: 1000,
            server_join_ms: 500,
            config_entry_ms: 500,
            peering_call_ms: 50,
            peering_poll_ms: 100,
            peering_active_attempts: 200,
            gateway_poll_ms: 1000,
            leader_poll_ms: 500,
            leader_transfer_settle_ms: 20_000,
            leader_transfer_ms: 5000,
            leader_transfer_attempts: 20,
            snapshot_settle_ms: 3000,
        }
    }
}

impl RetryTimings {
    /// No delays, same budgets
    pub fn immediate() -> Self {
        Self {
            acl_propagation_ms: 0,
            acl_bootstrap_ms: 0,
            local_write_ms: 0,
            anti_entropy_ms: 0,
            server_join_ms: 0,
            config_entry_ms: 0,
            peering_call_ms: 0,
            peering_poll_ms: 0,
            gateway_poll_ms: 0,
            leader_poll_ms: 0,
            leader_transfer_settle_ms: 0,
            leader_transfer_ms: 0,
            snapshot_settle_ms: 0,
            ..Self::default()
        }
    }

    pub fn acl_propagation(&self) -> RetryPolicy {
        forever(self.acl_propagation_ms)
    }

    pub fn acl_bootstrap(&self) -> RetryPolicy {
        forever(self.acl_bootstrap_ms)
    }

    pub fn local_write(&self) -> RetryPolicy {
        forever(self.local_write_ms)
    }

    pub fn anti_entropy(&self) -> RetryPolicy {
        forever(self.anti_entropy_ms)
    }

    pub fn server_join(&self) -> RetryPolicy {
        forever(self.server_join_ms)
    }

    pub fn config_entry(&self) -> RetryPolicy {
        forever(self.config_entry_ms)
    }

    pub fn peering_call(&self) -> RetryPolicy {
        forever(self.peering_call_ms)
    }

    pub fn peering_active(&self) -> RetryPolicy {
        RetryPolicy::bounded(
            Duration::from_millis(self.peering_poll_ms),
            self.peering_active_attempts,
        )
    }

    pub fn gateway(&self) -> RetryPolicy {
        forever(self.gateway_poll_ms)
    }

    pub fn leader(&self) -> RetryPolicy {
        forever(self.leader_poll_ms)
    }

    pub fn leader_transfer(&self) -> RetryPolicy {
        RetryPolicy::bounded(
            Duration::from_millis(self.leader_transfer_ms),
            self.leader_transfer_attempts,
        )
    }

    pub fn leader_transfer_settle(&self) -> Duration {
        Duration::from_millis(self.leader_transfer_settle_ms)
    }

    pub fn snapshot_settle(&self) -> Duration {
        Duration::from_millis(self.snapshot_settle_ms)
    }
}

fn forever(ms: u64) -> RetryPolicy {
    RetryPolicy::forever(Duration::from_millis(ms))
}

/// Orchestrator configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SprawlConfig {
    /// Enterprise license passed to enterprise agents
    pub license: Option<String>,

    /// Seed for the subnet choice; the same seed yields the same subnets
    pub subnet_seed: u64,

    /// Size in bytes of each value written by a KV load
    pub kv_value_size: usize,

    pub timings: RetryTimings,
}

impl Default for SprawlConfig {
    fn default() -> Self {
        Self {
            license: None,
            subnet_seed: 0,
            kv_value_size: DEFAULT_KV_VALUE_SIZE,
            timings: RetryTimings::default(),
        }
    }
}

impl SprawlConfig {
    /// Load configuration from environment variables
    ///
    /// - `SPRAWL_LICENSE`: enterprise license
    /// - `SPRAWL_SUBNET_SEED`: subnet seed (ignored if not a number)
    pub fn from_env() -> Self {
        let license = std::env::var("SPRAWL_LICENSE")
            .ok()
            .filter(|s| !s.trim().is_empty());

        let subnet_seed = std::env::var("SPRAWL_SUBNET_SEED")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or_default();

        Self {
            license,
            subnet_seed,
            ..Self::default()
        }
    }

    /// Same settings with no retry delays
    pub fn immediate() -> Self {
        Self {
            timings: RetryTimings::immediate(),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = SprawlConfig::default();
        assert_eq!(cfg.kv_value_size, 128 * 1024);
        assert_eq!(cfg.timings.leader_transfer().max_attempts, Some(20));
        assert_eq!(
            cfg.timings.leader_transfer_settle(),
            Duration::from_secs(20)
        );
        assert_eq!(cfg.timings.acl_propagation().max_attempts, None);
    }

    #[test]
    fn test_immediate_keeps_budgets() {
        let t = RetryTimings::immediate();
        assert_eq!(t.acl_bootstrap().delay, Duration::ZERO);
        assert_eq!(t.peering_active().max_attempts, Some(200));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let cfg: SprawlConfig =
            serde_json::from_str(r#"{"subnet_seed": 7, "timings": {"gateway_poll_ms": 10}}"#)
                .unwrap();
        assert_eq!(cfg.subnet_seed, 7);
        assert_eq!(cfg.timings.gateway_poll_ms, 10);
        assert_eq!(cfg.timings.leader_poll_ms, 500);
    }
}
