// Copyright 2025 Lars Brubaker
// Fissure separation and multi-part boundary tests.

mod helpers;

use organ_scaffold::scaffold::{default_parameters, Scaffold};
use organ_scaffold::{Organ, ParamValue, Species};

fn lung(open: bool) -> Scaffold {
    let params = default_parameters(Organ::Lung, Species::Human)
        .with("open fissure", ParamValue::Bool(open));
    Scaffold::build(params, None).unwrap()
}

#[test]
fn closed_fissures_share_boundary_nodes() {
    let scaffold = lung(false);
    let topo = &scaffold.topology;
    let lower = topo.part_index("lower lobe of left lung").unwrap();
    let upper = topo.part_index("upper lobe of left lung").unwrap();
    assert!(topo.shared_node_count(lower, upper) > 0);
    assert_eq!(topo.duplicate_node_count(lower, upper), 0);
}

#[test]
fn open_fissures_duplicate_exactly_the_shared_nodes() {
    let closed = lung(false);
    let open = lung(true);
    let pairs = [
        ("lower lobe of left lung", "upper lobe of left lung"),
        ("lower lobe of right lung", "middle lobe of right lung"),
        ("middle lobe of right lung", "upper lobe of right lung"),
    ];
    for (a, b) in pairs {
        let ca = closed.topology.part_index(a).unwrap();
        let cb = closed.topology.part_index(b).unwrap();
        let oa = open.topology.part_index(a).unwrap();
        let ob = open.topology.part_index(b).unwrap();
        let shared_when_closed = closed.topology.shared_node_count(ca, cb);
        assert!(shared_when_closed > 0);
        assert_eq!(open.topology.shared_node_count(oa, ob), 0);
        assert_eq!(
            open.topology.duplicate_node_count(oa, ob),
            shared_when_closed,
            "open fissure {a}|{b} must duplicate exactly the shared nodes"
        );
    }
    // duplicated fissure nodes are coincident in the geometric field
    let geometric = open.geometric();
    for boundary in &open.topology.boundaries {
        for &(duplicate, primary) in &boundary.duplicates {
            let a = geometric.value(duplicate).unwrap();
            let b = geometric.value(primary).unwrap();
            assert!((a.x - b.x).length() < 1e-9);
        }
    }
}

#[test]
fn open_fissure_grows_node_count_only() {
    let closed = lung(false);
    let open = lung(true);
    assert_eq!(
        closed.topology.element_count(),
        open.topology.element_count()
    );
    let total_dup: usize = open
        .topology
        .boundaries
        .iter()
        .map(|b| b.duplicates.len())
        .sum();
    assert_eq!(
        open.topology.node_count(),
        closed.topology.node_count() + total_dup
    );
}

#[test]
fn brainstem_subdivisions_share_transverse_rings() {
    let scaffold = helpers::build(Organ::Brainstem, Species::Human);
    let topo = &scaffold.topology;
    let medulla = topo.part_index("medulla oblongata").unwrap();
    let pons = topo.part_index("pons").unwrap();
    let midbrain = topo.part_index("midbrain").unwrap();
    assert!(topo.shared_node_count(medulla, pons) > 0);
    assert!(topo.shared_node_count(pons, midbrain) > 0);
    assert_eq!(topo.shared_node_count(medulla, midbrain), 0);
    // shared junction nodes carry one consistent geometric value
    helpers::assert_geometric_complete(&scaffold);
    helpers::assert_right_handed(&scaffold);
}

#[test]
fn heart_atria_continue_their_ventricles() {
    let scaffold = helpers::build(Organ::Heart, Species::Human);
    let topo = &scaffold.topology;
    let lv = topo.part_index("left ventricle myocardium").unwrap();
    let la = topo.part_index("left atrium myocardium").unwrap();
    let rv = topo.part_index("right ventricle myocardium").unwrap();
    let ra = topo.part_index("right atrium myocardium").unwrap();
    assert!(topo.shared_node_count(lv, la) > 0);
    assert!(topo.shared_node_count(rv, ra) > 0);
    // the ventricles are independently meshed
    assert_eq!(topo.shared_node_count(lv, rv), 0);
    // septum strip lives on the left ventricle wall
    assert!(helpers::volume_group_size(&scaffold, "interventricular septum") > 0);
}

#[test]
fn atrial_luminal_surfaces_overlap_only_their_vessels() {
    let scaffold = helpers::build(Organ::Heart, Species::Human);
    let luminal = scaffold
        .annotations
        .find("luminal surface of left atrium")
        .unwrap();
    let vessel = scaffold.annotations.find("pulmonary vein").unwrap();
    assert!(!luminal.faces.is_empty());
    assert!(!vessel.faces.is_empty());
    // the documented overlap exists and is allow-listed
    assert!(vessel.faces.iter().all(|f| luminal.faces.contains(f)));
    assert!(scaffold.annotations.surface_overlaps().is_empty());
}
