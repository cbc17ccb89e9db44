// Copyright (c) 2025 - Cowboy AI, Inc.
//! IPv4 Subnet Value Object
//!
//! Networks are allocated a subnet exactly once, on first launch. Every node
//! address is then drawn from the subnet's host pool by node index, so the pool
//! must be deterministic for a given CIDR.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;
use thiserror::Error;

/// Subnet validation error
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubnetError {
    #[error("invalid IPv4 address: {0}")]
    InvalidAddress(String),

    #[error("invalid CIDR notation: {0}")]
    InvalidCidr(String),

    #[error("invalid prefix length: {0} (must be 16-30)")]
    InvalidPrefixLength(u8),
}

/// IPv4 network in CIDR notation
///
/// Invariants:
/// - Address is masked to the network boundary
/// - Prefix length is 16-30, keeping host pools bounded and non-empty
///
/// # Examples
///
/// ```rust
/// use cim_sprawl::domain::Subnet;
///
/// let subnet = Subnet::new("10.12.0.7/24").unwrap();
/// assert_eq!(subnet.to_string(), "10.12.0.0/24");
/// assert_eq!(subnet.hosts().next().unwrap().to_string(), "10.12.0.2");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Subnet {
    network: Ipv4Addr,
    prefix_length: u8,
}

impl Subnet {
    /// Smallest accepted prefix
    pub const MIN_PREFIX: u8 = 16;

    /// Largest accepted prefix
    pub const MAX_PREFIX: u8 = 30;

    /// Parse a subnet in CIDR notation, masking host bits.
    pub fn new(cidr: impl AsRef<str>) -> Result<Self, SubnetError> {
        let cidr = cidr.as_ref();
        let (addr_str, prefix_str) = cidr
            .split_once('/')
            .ok_or_else(|| SubnetError::InvalidCidr(cidr.to_string()))?;

        let address = Ipv4Addr::from_str(addr_str)
            .map_err(|_| SubnetError::InvalidAddress(addr_str.to_string()))?;

        let prefix_length = prefix_str
            .parse::<u8>()
            .map_err(|_| SubnetError::InvalidCidr(cidr.to_string()))?;

        if !(Self::MIN_PREFIX..=Self::MAX_PREFIX).contains(&prefix_length) {
            return Err(SubnetError::InvalidPrefixLength(prefix_length));
        }

        let mask = u32::MAX << (32 - prefix_length);
        Ok(Self {
            network: Ipv4Addr::from(u32::from(address) & mask),
            prefix_length,
        })
    }

    /// Network address
    pub fn network(&self) -> Ipv4Addr {
        self.network
    }

    /// Prefix length
    pub fn prefix_length(&self) -> u8 {
        self.prefix_length
    }

    /// Usable host addresses in ascending order.
    ///
    /// The network address and the `.1` gateway are skipped, as is the
    /// broadcast address.
    pub fn hosts(&self) -> impl Iterator<Item = Ipv4Addr> {
        let base = u32::from(self.network);
        let size = 1u32 << (32 - self.prefix_length);
        (2..size - 1).map(move |offset| Ipv4Addr::from(base + offset))
    }

    /// Does this subnet contain the address?
    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        let mask = u32::MAX << (32 - self.prefix_length);
        u32::from(addr) & mask == u32::from(self.network)
    }
}

impl fmt::Display for Subnet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix_length)
    }
}

impl FromStr for Subnet {
    type Err = SubnetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subnet_masks_host_bits() {
        let subnet = Subnet::new("10.4.7.200/24").unwrap();
        assert_eq!(subnet.network(), Ipv4Addr::new(10, 4, 7, 0));
        assert_eq!(subnet.to_string(), "10.4.7.0/24");
    }

    #[test]
    fn test_hosts_skip_reserved_addresses() {
        let subnet = Subnet::new("10.4.7.0/29").unwrap();
        let hosts: Vec<String> = subnet.hosts().map(|ip| ip.to_string()).collect();
        assert_eq!(
            hosts,
            vec!["10.4.7.2", "10.4.7.3", "10.4.7.4", "10.4.7.5", "10.4.7.6"]
        );
    }

    #[test]
    fn test_hosts_count_for_slash_24() {
        let subnet = Subnet::new("10.4.7.0/24").unwrap();
        assert_eq!(subnet.hosts().count(), 253);
        assert!(subnet.contains(Ipv4Addr::new(10, 4, 7, 254)));
        assert!(!subnet.contains(Ipv4Addr::new(10, 4, 8, 1)));
    }

    #[test]
    fn test_invalid_subnets() {
        assert!(matches!(
            Subnet::new("10.4.7.0"),
            Err(SubnetError::InvalidCidr(_))
        ));
        assert!(matches!(
            Subnet::new("10.4.300.0/24"),
            Err(SubnetError::InvalidAddress(_))
        ));
        assert_eq!(
            Subnet::new("10.0.0.0/8"),
            Err(SubnetError::InvalidPrefixLength(8))
        );
        assert_eq!(
            Subnet::new("10.0.0.0/31"),
            Err(SubnetError::InvalidPrefixLength(31))
        );
    }
}
