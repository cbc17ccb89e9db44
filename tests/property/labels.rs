// Copyright (c) 2025 - Cowboy AI, Inc.
//! Property-Based Tests for DNS Label Validation

use cim_sprawl::domain::{validate_label, LabelError, NodeId, WorkloadId};
use proptest::prelude::*;

proptest! {
    /// Lowercase alphanumeric labels with inner hyphens are always accepted
    #[test]
    fn prop_well_formed_labels_accepted(label in "[a-z0-9]([a-z0-9-]{0,61}[a-z0-9])?") {
        prop_assert!(validate_label(&label).is_ok());
    }

    #[test]
    fn prop_overlong_labels_rejected(label in "[a-z]{64,100}") {
        prop_assert!(matches!(validate_label(&label), Err(LabelError::TooLong(_))));
    }

    #[test]
    fn prop_edge_hyphens_rejected(inner in "[a-z0-9]{1,20}", leading in any::<bool>()) {
        let label = if leading { format!("-{inner}") } else { format!("{inner}-") };
        prop_assert!(matches!(
            validate_label(&label),
            Err(LabelError::InvalidLabelFormat(_))
        ));
    }

    /// Any character outside `[A-Za-z0-9-]` is reported
    #[test]
    fn prop_foreign_characters_reported(
        prefix in "[a-z]{1,10}",
        ch in prop::char::any().prop_filter("non label char", |c| !c.is_ascii_alphanumeric() && *c != '-'),
    ) {
        let label = format!("{prefix}{ch}");
        prop_assume!(label.len() <= 63);
        match validate_label(&label) {
            Err(LabelError::InvalidCharacter { ch: found, .. }) => prop_assert_eq!(found, ch),
            other => prop_assert!(false, "unexpected result {:?}", other),
        }
    }

    /// Normalization is idempotent and fills in defaults
    #[test]
    fn prop_identity_normalization_idempotent(
        name in "[a-z]{1,10}",
        namespace in prop_oneof![Just(String::new()), "[a-z]{1,8}"],
        partition in prop_oneof![Just(String::new()), "[a-z]{1,8}"],
    ) {
        let id = WorkloadId::new(name.clone(), &namespace, &partition);
        let mut again = id.clone();
        again.normalize();
        prop_assert_eq!(&again, &id);
        prop_assert!(!id.partition.is_empty() && !id.namespace.is_empty());

        let node = NodeId::new(name, &partition);
        prop_assert_eq!(node.acl_string(), format!("{}--{}", node.partition, node.name));
    }
}
