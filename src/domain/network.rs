// Copyright (c) 2025 - Cowboy AI, Inc.
//! Networks and Node Addresses
//!
//! A network is either `lan` (local, reachable only inside the topology) or
//! `wan` (public, shared between clusters). Subnets and IP pools are assigned
//! once by the infra generator and carried forward on every recompile.

use serde::{Deserialize, Serialize};

use super::subnet::{Subnet, SubnetError};

/// Network reachability class
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkType {
    #[default]
    Lan,
    Wan,
}

impl NetworkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkType::Lan => "lan",
            NetworkType::Wan => "wan",
        }
    }
}

/// A logical network
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Network {
    pub name: String,

    #[serde(default, rename = "type")]
    pub network_type: NetworkType,

    /// Provisioning-backend name. Compiler owned.
    #[serde(default)]
    pub docker_name: String,

    /// Assigned once on first launch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subnet: Option<String>,

    /// Node addresses, drawn by node index
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ip_pool: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_address: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns_address: Option<String>,

    /// Host port of the forward proxy into this network
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_port: Option<u16>,
}

impl Network {
    /// Create a network
    pub fn new(name: impl Into<String>, network_type: NetworkType) -> Self {
        Self {
            name: name.into(),
            network_type,
            ..Default::default()
        }
    }

    pub fn is_local(&self) -> bool {
        self.network_type == NetworkType::Lan
    }

    pub fn is_public(&self) -> bool {
        self.network_type == NetworkType::Wan
    }

    /// Assign a subnet and rebuild the IP pool.
    ///
    /// The last two usable hosts become the proxy and DNS addresses and are
    /// removed from the pool. Returns `true` when the subnet changed.
    pub fn set_subnet(&mut self, cidr: &str) -> Result<bool, SubnetError> {
        let subnet = Subnet::new(cidr)?;
        let canonical = subnet.to_string();
        if self.subnet.as_deref() == Some(canonical.as_str()) {
            return Ok(false);
        }

        let mut pool: Vec<String> = subnet.hosts().map(|ip| ip.to_string()).collect();
        self.proxy_address = pool.pop();
        self.dns_address = pool.pop();
        self.ip_pool = pool;
        self.subnet = Some(canonical);
        Ok(true)
    }

    /// Address for the node with the given global index
    pub fn ip_by_index(&self, index: usize) -> Option<&str> {
        self.ip_pool.get(index).map(String::as_str)
    }

    /// Carry the generated addressing forward from the previous compile.
    pub(crate) fn inherit_from(&mut self, existing: &Network) {
        self.subnet = existing.subnet.clone();
        self.ip_pool = existing.ip_pool.clone();
        self.proxy_address = existing.proxy_address.clone();
        self.dns_address = existing.dns_address.clone();
        self.proxy_port = existing.proxy_port;
    }
}

/// A node's attachment to a network
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Address {
    /// Network name; defaults to the cluster's network
    #[serde(default)]
    pub network: String,

    /// Copied from the network. Compiler owned.
    #[serde(default, rename = "type")]
    pub network_type: NetworkType,

    /// Assigned after the networks step
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,

    /// Copied from the network once discovered
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_port: Option<u16>,
}

impl Address {
    pub fn on(network: impl Into<String>) -> Self {
        Self {
            network: network.into(),
            ..Default::default()
        }
    }

    pub fn is_local(&self) -> bool {
        self.network_type == NetworkType::Lan
    }

    pub fn is_public(&self) -> bool {
        self.network_type == NetworkType::Wan
    }

    pub(crate) fn inherit_from(&mut self, existing: &Address) {
        self.ip_address = existing.ip_address.clone();
        self.proxy_port = existing.proxy_port;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_subnet_builds_pool() {
        let mut net = Network::new("dc1", NetworkType::Lan);
        assert!(net.set_subnet("10.20.0.0/24").unwrap());

        assert_eq!(net.subnet.as_deref(), Some("10.20.0.0/24"));
        assert_eq!(net.ip_by_index(0), Some("10.20.0.2"));
        assert_eq!(net.proxy_address.as_deref(), Some("10.20.0.254"));
        assert_eq!(net.dns_address.as_deref(), Some("10.20.0.253"));
        assert_eq!(net.ip_pool.len(), 251);
    }

    #[test]
    fn test_set_same_subnet_is_unchanged() {
        let mut net = Network::new("dc1", NetworkType::Lan);
        net.set_subnet("10.20.0.0/24").unwrap();
        assert!(!net.set_subnet("10.20.0.9/24").unwrap());
    }

    #[test]
    fn test_network_type_serde() {
        let net: Network = serde_json::from_str(r#"{"name":"wan","type":"wan"}"#).unwrap();
        assert!(net.is_public());
        let net: Network = serde_json::from_str(r#"{"name":"dc1"}"#).unwrap();
        assert!(net.is_local());
    }
}
