// Copyright (c) 2025 - Cowboy AI, Inc.
//! Property-Based Tests for Subnets and Subnet Allocation

use std::collections::HashSet;
use std::net::Ipv4Addr;

use cim_sprawl::domain::Subnet;
use cim_sprawl::infra::SubnetAllocator;
use proptest::prelude::*;

proptest! {
    /// Parsing masks host bits, so re-parsing the canonical form is stable
    #[test]
    fn prop_subnet_canonical_form_is_stable(addr in any::<u32>(), prefix in 16u8..=30) {
        let cidr = format!("{}/{prefix}", Ipv4Addr::from(addr));
        let subnet = Subnet::new(&cidr).unwrap();
        prop_assert_eq!(Subnet::new(subnet.to_string()).unwrap(), subnet);
        prop_assert!(subnet.contains(Ipv4Addr::from(addr)));
    }

    #[test]
    fn prop_out_of_range_prefix_rejected(addr in any::<u32>(), prefix in prop_oneof![0u8..16, 31u8..=32]) {
        let cidr = format!("{}/{prefix}", Ipv4Addr::from(addr));
        prop_assert!(Subnet::new(cidr).is_err());
    }

    /// Host pools skip the network, gateway and broadcast addresses
    #[test]
    fn prop_host_pool_is_inside_and_ascending(addr in any::<u32>(), prefix in 22u8..=30) {
        let subnet = Subnet::new(format!("{}/{prefix}", Ipv4Addr::from(addr))).unwrap();
        let hosts: Vec<Ipv4Addr> = subnet.hosts().collect();

        prop_assert_eq!(hosts.len(), (1usize << (32 - prefix)) - 3);
        prop_assert_eq!(u32::from(hosts[0]), u32::from(subnet.network()) + 2);
        prop_assert!(hosts.windows(2).all(|w| w[0] < w[1]));
        prop_assert!(hosts.iter().all(|h| subnet.contains(*h)));
    }

    /// Same seed, same subnets; never the same subnet twice
    #[test]
    fn prop_allocator_is_deterministic_and_unique(seed in any::<u64>(), count in 1usize..60) {
        let mut a = SubnetAllocator::new(seed);
        let mut b = SubnetAllocator::new(seed);

        let first: Vec<String> = (0..count).map(|_| a.allocate().unwrap()).collect();
        let second: Vec<String> = (0..count).map(|_| b.allocate().unwrap()).collect();
        prop_assert_eq!(&first, &second);

        let unique: HashSet<&String> = first.iter().collect();
        prop_assert_eq!(unique.len(), count);
    }

    /// Reserved subnets are never handed out
    #[test]
    fn prop_reserved_subnets_skipped(seed in any::<u64>(), octet in 1u8..=254) {
        let reserved = format!("10.0.{octet}.0/24");
        let mut alloc = SubnetAllocator::new(seed);
        alloc.reserve(&reserved).unwrap();

        let total = alloc.remaining();
        let all: Vec<String> = (0..total).map(|_| alloc.allocate().unwrap()).collect();
        prop_assert!(!all.contains(&reserved));
        prop_assert!(alloc.allocate().is_err());
    }
}
