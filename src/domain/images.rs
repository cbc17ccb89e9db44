// Copyright (c) 2025 - Cowboy AI, Inc.
//! Container image selection
//!
//! Images resolve in three layers: built-in defaults, then the cluster
//! override, then the node override. Empty fields never override.

use serde::{Deserialize, Serialize};

use super::node::NodeKind;

pub const DEFAULT_AGENT_CE_IMAGE: &str = "hashicorp/consul:1.17.0";
pub const DEFAULT_AGENT_ENTERPRISE_IMAGE: &str = "hashicorp/consul-enterprise:1.17.0-ent";
pub const DEFAULT_ENVOY_IMAGE: &str = "envoyproxy/envoy:v1.27.2";
pub const DEFAULT_DATAPLANE_IMAGE: &str = "hashicorp/consul-dataplane:1.3.0";

/// Set of images used to run a node
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Images {
    /// Resolved agent image. Chosen from `agent_ce`/`agent_enterprise`.
    pub agent: String,
    pub agent_ce: String,
    pub agent_enterprise: String,
    pub envoy: String,
    pub dataplane: String,
}

impl Images {
    /// Built-in defaults
    pub fn defaults() -> Self {
        Self {
            agent: String::new(),
            agent_ce: DEFAULT_AGENT_CE_IMAGE.to_string(),
            agent_enterprise: DEFAULT_AGENT_ENTERPRISE_IMAGE.to_string(),
            envoy: DEFAULT_ENVOY_IMAGE.to_string(),
            dataplane: DEFAULT_DATAPLANE_IMAGE.to_string(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Layer `other` on top of `self`; only non-empty fields win.
    pub fn override_with(&self, other: &Images) -> Images {
        fn pick(base: &str, over: &str) -> String {
            if over.is_empty() { base } else { over }.to_string()
        }

        Images {
            agent: pick(&self.agent, &other.agent),
            agent_ce: pick(&self.agent_ce, &other.agent_ce),
            agent_enterprise: pick(&self.agent_enterprise, &other.agent_enterprise),
            envoy: pick(&self.envoy, &other.envoy),
            dataplane: pick(&self.dataplane, &other.dataplane),
        }
    }

    /// Collapse the CE/enterprise choice into `agent`.
    pub fn choose_agent(&self, enterprise: bool) -> Images {
        let mut out = self.clone();
        out.agent = if enterprise {
            out.agent_enterprise.clone()
        } else {
            out.agent_ce.clone()
        };
        out.agent_ce.clear();
        out.agent_enterprise.clear();
        out
    }

    /// Drop images a node of this kind never runs.
    pub fn choose_node(&self, kind: NodeKind) -> Images {
        let mut out = self.clone();
        match kind {
            NodeKind::Server => {
                out.envoy.clear();
                out.dataplane.clear();
            }
            NodeKind::Client => out.dataplane.clear(),
            NodeKind::Dataplane => out.agent.clear(),
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_override_only_non_empty_fields() {
        let base = Images::defaults();
        let over = Images {
            envoy: "envoyproxy/envoy:v1.28.0".into(),
            ..Default::default()
        };
        let merged = base.override_with(&over);
        assert_eq!(merged.envoy, "envoyproxy/envoy:v1.28.0");
        assert_eq!(merged.agent_ce, DEFAULT_AGENT_CE_IMAGE);
    }

    #[test]
    fn test_choose_agent() {
        let ce = Images::defaults().choose_agent(false);
        assert_eq!(ce.agent, DEFAULT_AGENT_CE_IMAGE);
        assert!(ce.agent_ce.is_empty() && ce.agent_enterprise.is_empty());

        let ent = Images::defaults().choose_agent(true);
        assert_eq!(ent.agent, DEFAULT_AGENT_ENTERPRISE_IMAGE);
    }

    #[test]
    fn test_choose_node() {
        let images = Images::defaults().choose_agent(false);
        let server = images.choose_node(NodeKind::Server);
        assert!(server.envoy.is_empty() && server.dataplane.is_empty());

        let dataplane = images.choose_node(NodeKind::Dataplane);
        assert!(dataplane.agent.is_empty());
        assert_eq!(dataplane.dataplane, DEFAULT_DATAPLANE_IMAGE);
    }
}
