// Copyright (c) 2025 - Cowboy AI, Inc.
//! Seeded subnet allocation
//!
//! Candidates form an explicit ordered list of /24s. Each allocation picks
//! an index from a seeded generator and removes that candidate, so the same
//! seed always yields the same subnets in the same order.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{InfraError, InfraResult};
use crate::domain::Subnet;

/// Third octet range of the `10.0.x.0/24` candidates
const FIRST_OCTET: u16 = 1;
const LAST_OCTET: u16 = 254;

/// Hands out unused /24 subnets
#[derive(Debug)]
pub struct SubnetAllocator {
    candidates: Vec<String>,
    rng: StdRng,
}

impl SubnetAllocator {
    pub fn new(seed: u64) -> Self {
        Self {
            candidates: (FIRST_OCTET..=LAST_OCTET)
                .map(|n| format!("10.0.{n}.0/24"))
                .collect(),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Mark a subnet as taken, e.g. one carried over from a previous compile
    pub fn reserve(&mut self, cidr: &str) -> InfraResult<()> {
        let canonical = Subnet::new(cidr)?.to_string();
        self.candidates.retain(|c| c != &canonical);
        Ok(())
    }

    pub fn allocate(&mut self) -> InfraResult<String> {
        if self.candidates.is_empty() {
            return Err(InfraError::SubnetsExhausted);
        }
        let idx = self.rng.gen_range(0..self.candidates.len());
        Ok(self.candidates.remove(idx))
    }

    pub fn remaining(&self) -> usize {
        self.candidates.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_same_seed_same_subnets() {
        let mut a = SubnetAllocator::new(42);
        let mut b = SubnetAllocator::new(42);
        for _ in 0..5 {
            assert_eq!(a.allocate().unwrap(), b.allocate().unwrap());
        }
    }

    #[test]
    fn test_allocations_are_unique_until_exhausted() {
        let mut alloc = SubnetAllocator::new(7);
        let mut seen = HashSet::new();
        while alloc.remaining() > 0 {
            assert!(seen.insert(alloc.allocate().unwrap()));
        }
        assert_eq!(seen.len(), 254);
        assert!(matches!(alloc.allocate(), Err(InfraError::SubnetsExhausted)));
    }

    #[test]
    fn test_reserved_subnet_never_allocated() {
        let mut alloc = SubnetAllocator::new(1);
        alloc.reserve("10.0.9.7/24").unwrap();
        assert_eq!(alloc.remaining(), 253);
        while alloc.remaining() > 0 {
            assert_ne!(alloc.allocate().unwrap(), "10.0.9.0/24");
        }
    }
}
