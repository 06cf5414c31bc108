// Copyright 2025 Lars Brubaker
// Shared test utilities for organ-scaffold tests.

#![allow(dead_code)]

use organ_scaffold::fields::{element_is_right_handed, FieldKind};
use organ_scaffold::scaffold::{default_parameters, Scaffold};
use organ_scaffold::{Organ, Species};

/// Build the default variant of an organ for a species.
pub fn build(organ: Organ, species: Species) -> Scaffold {
    let params = default_parameters(organ, species);
    Scaffold::build(params, None)
        .unwrap_or_else(|e| panic!("{} {} build failed: {e}", organ.name(), species.name()))
}

/// Every node defined in every field must hold finite values.
pub fn assert_all_finite(scaffold: &Scaffold) {
    for (kind, field) in &scaffold.fields {
        for n in 0..scaffold.topology.node_count() as u32 {
            if let Some(value) = field.value(n) {
                assert!(
                    value.is_finite(),
                    "{}: node {n} has non-finite values",
                    kind.name()
                );
            }
        }
        for value in field.seam_alternates.values() {
            assert!(value.is_finite(), "{}: non-finite seam version", kind.name());
        }
    }
}

/// Every element must be right-handed in the geometric field.
pub fn assert_right_handed(scaffold: &Scaffold) {
    let geometric = scaffold.geometric();
    for (i, element) in scaffold.topology.elements.iter().enumerate() {
        assert_eq!(
            element_is_right_handed(geometric, element),
            Some(true),
            "element {i} is not right-handed"
        );
    }
}

/// The geometric field must define every node of the topology.
pub fn assert_geometric_complete(scaffold: &Scaffold) {
    let geometric = scaffold.geometric();
    assert_eq!(
        geometric.defined_count(),
        scaffold.topology.node_count(),
        "geometric field must cover every node"
    );
}

/// Entity count of a named volume group, zero if the group is absent.
pub fn volume_group_size(scaffold: &Scaffold, name: &str) -> usize {
    scaffold
        .annotations
        .find(name)
        .map(|group| group.elements.len())
        .unwrap_or(0)
}

pub fn has_field(scaffold: &Scaffold, kind: FieldKind) -> bool {
    scaffold.field(kind).is_some()
}
