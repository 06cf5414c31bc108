// Copyright 2025 Lars Brubaker
// Refinement: identity transform, uniform subdivision, annotation and
// marker inheritance, multi-part conformance.

mod helpers;

use organ_scaffold::scaffold::{default_parameters, Scaffold};
use organ_scaffold::{Organ, ParamValue, Species};

#[test]
fn identity_refinement_reproduces_the_geometric_field() {
    let scaffold = helpers::build(Organ::Brainstem, Species::Human);
    let refined = scaffold.refine([1, 1, 1]).unwrap();
    assert_eq!(
        refined.topology.element_count(),
        scaffold.topology.element_count()
    );
    assert_eq!(refined.topology.node_count(), scaffold.topology.node_count());
    let original = scaffold.geometric();
    for (parent, children) in refined.children.iter().enumerate() {
        let child = &refined.topology.elements[children[0] as usize];
        let source = &scaffold.topology.elements[parent];
        for (corner, &node) in child.nodes.iter().enumerate() {
            let got = refined.geometric.value(node).unwrap().x;
            let expected = original.value(source.nodes[corner]).unwrap().x;
            assert!(
                (got - expected).length() < 1e-9,
                "identity refinement moved a node by {}",
                (got - expected).length()
            );
        }
    }
}

#[test]
fn refine_2x2x2_multiplies_elements_by_eight() {
    let scaffold = helpers::build(Organ::Esophagus, Species::Human);
    let refined = scaffold.refine([2, 2, 2]).unwrap();
    assert_eq!(
        refined.topology.element_count(),
        scaffold.topology.element_count() * 8
    );
    for children in &refined.children {
        assert_eq!(children.len(), 8);
    }
    // geometric values on the refined mesh are finite everywhere
    for n in 0..refined.topology.node_count() as u32 {
        assert!(refined.geometric.value(n).unwrap().is_finite());
    }
}

#[test]
fn children_inherit_every_parent_group_membership() {
    let scaffold = helpers::build(Organ::Esophagus, Species::Human);
    let refined = scaffold.refine([2, 2, 2]).unwrap();
    for group in scaffold.annotations.groups() {
        if group.elements.is_empty() {
            continue;
        }
        let refined_group = refined
            .annotations
            .resolve_group(&group.term.name)
            .unwrap();
        for &parent in &group.elements {
            for &child in &refined.children[parent as usize] {
                assert!(
                    refined_group.elements.contains(&child),
                    "child of {parent} missing from '{}'",
                    group.term.name
                );
            }
        }
    }
}

#[test]
fn only_the_geometric_field_exists_on_the_refined_mesh() {
    // the refined overlay intentionally carries geometric coordinates only;
    // material/flat/straight values are absent for refined-mesh nodes
    let scaffold = helpers::build(Organ::Colon, Species::Human);
    let refined = scaffold.refine([2, 1, 1]).unwrap();
    assert_eq!(
        refined.geometric.defined_count(),
        refined.topology.node_count()
    );
    let material = scaffold
        .field(organ_scaffold::FieldKind::Material)
        .unwrap();
    assert!(refined.topology.node_count() > material.node_count());
}

#[test]
fn lung_apex_marker_survives_refinement() {
    let scaffold = helpers::build(Organ::Lung, Species::Human);
    let group = scaffold.annotations.find("apex of left lung").unwrap();
    assert_eq!(group.markers.len(), 1);
    let refined = scaffold.refine([2, 2, 2]).unwrap();
    let refined_group = refined.annotations.resolve_group("apex of left lung").unwrap();
    assert_eq!(refined_group.markers.len(), 1);
    let marker = &refined_group.markers[0];
    assert!((marker.element as usize) < refined.topology.element_count());
    for xi in marker.xi {
        assert!((0.0..=1.0).contains(&xi));
    }
}

#[test]
fn uniform_counts_keep_multi_part_refinement_conformant() {
    let scaffold = helpers::build(Organ::Lung, Species::Human);
    let counts = vec![[2, 2, 2]; scaffold.topology.parts.len()];
    let refined = scaffold.refine_per_part(&counts).unwrap();
    assert!(refined.conformant);
}

#[test]
fn non_uniform_counts_warn_but_still_refine() {
    let scaffold = helpers::build(Organ::Lung, Species::Human);
    let mut counts = vec![[1, 1, 1]; scaffold.topology.parts.len()];
    counts[0] = [2, 2, 2];
    let refined = scaffold.refine_per_part(&counts).unwrap();
    assert!(!refined.conformant);
    assert!(refined.topology.element_count() > scaffold.topology.element_count());
}

#[test]
fn refinement_requested_by_parameters_runs_in_the_build() {
    let params = default_parameters(Organ::Bladder, Species::Human)
        .with("refine", ParamValue::Bool(true))
        .with("refine count around", ParamValue::Int(2))
        .with("refine count along", ParamValue::Int(2))
        .with("refine count through wall", ParamValue::Int(1));
    let scaffold = Scaffold::build(params, None).unwrap();
    let refined = scaffold.refined.as_ref().unwrap();
    assert_eq!(refined.counts, [2, 2, 1]);
    assert!(refined.topology.element_count() > scaffold.topology.element_count());
}
