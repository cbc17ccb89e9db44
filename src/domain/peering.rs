// Copyright (c) 2025 - Cowboy AI, Inc.
//! Peerings and Network Areas
//!
//! A peering is a directional trust relationship between two clusters. Each
//! side names the other with a local peer name; after compile each side's
//! `link` points at an un-linked copy of the other side.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One side of a peering or network area
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerCluster {
    /// Cluster name
    pub name: String,

    #[serde(default)]
    pub partition: String,

    /// Name this side uses for the other side; defaulted at compile
    #[serde(default)]
    pub peer_name: String,

    /// The other side. Compiler owned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<Box<PeerCluster>>,
}

impl PeerCluster {
    pub fn new(name: impl Into<String>, partition: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            partition: partition.into(),
            ..Default::default()
        }
    }

    /// Copy of this side without its link
    pub fn unlinked(&self) -> PeerCluster {
        PeerCluster {
            link: None,
            ..self.clone()
        }
    }
}

impl fmt::Display for PeerCluster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.partition)
    }
}

/// A dialing/accepting pair
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peering {
    pub dialing: PeerCluster,
    pub accepting: PeerCluster,
}

impl Peering {
    pub fn new(dialing: PeerCluster, accepting: PeerCluster) -> Self {
        Self { dialing, accepting }
    }
}

impl fmt::Display for Peering {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({})->({})", self.dialing, self.accepting)
    }
}

/// A pair of enterprise clusters joined through a network area
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkArea {
    pub primary: PeerCluster,
    pub secondary: PeerCluster,
}

impl fmt::Display for NetworkArea {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({})<->({})", self.primary, self.secondary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peering_display() {
        let p = Peering::new(
            PeerCluster::new("dc1", "default"),
            PeerCluster::new("dc2", "ap1"),
        );
        assert_eq!(p.to_string(), "(dc1:default)->(dc2:ap1)");
    }

    #[test]
    fn test_unlinked_drops_link() {
        let mut side = PeerCluster::new("dc1", "default");
        side.link = Some(Box::new(PeerCluster::new("dc2", "default")));
        assert_eq!(side.unlinked().link, None);
        assert_eq!(side.unlinked().name, "dc1");
    }
}
