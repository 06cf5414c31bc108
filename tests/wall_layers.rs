// Copyright 2025 Lars Brubaker
// Through-wall layer groups and species-conditional group tests.

mod helpers;

use organ_scaffold::scaffold::{default_parameters, Scaffold};
use organ_scaffold::{Organ, ParamValue, ScaffoldError, Species};

const COLON_LAYER_GROUPS: [&str; 5] = [
    "mucosa of colon",
    "submucosa of colon",
    "circular muscle layer of colon",
    "longitudinal muscle layer of colon",
    "muscularis externa of colon",
];

#[test]
fn four_wall_layers_yield_five_layer_volume_groups() {
    let params = default_parameters(Organ::Colon, Species::Human);
    assert_eq!(params.get_int("wall layer count", 0), 4);
    let scaffold = Scaffold::build(params, None).unwrap();
    for name in COLON_LAYER_GROUPS {
        let size = helpers::volume_group_size(&scaffold, name);
        assert!(size > 0, "layer group '{name}' must be nonempty");
    }
    // the combined muscularis is exactly the two muscle layers
    let circular = helpers::volume_group_size(&scaffold, COLON_LAYER_GROUPS[2]);
    let longitudinal = helpers::volume_group_size(&scaffold, COLON_LAYER_GROUPS[3]);
    let combined = helpers::volume_group_size(&scaffold, COLON_LAYER_GROUPS[4]);
    assert_eq!(combined, circular + longitudinal);
}

#[test]
fn single_wall_layer_yields_undivided_volume_only() {
    let params = default_parameters(Organ::Colon, Species::Human)
        .with("wall layer count", ParamValue::Int(1));
    let scaffold = Scaffold::build(params, None).unwrap();
    assert_eq!(
        helpers::volume_group_size(&scaffold, "colon"),
        scaffold.topology.element_count()
    );
    for name in COLON_LAYER_GROUPS {
        assert_eq!(
            helpers::volume_group_size(&scaffold, name),
            0,
            "no layer subgroup '{name}' with a single wall layer"
        );
    }
}

#[test]
fn unsupported_layer_count_is_a_fatal_configuration_error() {
    let params = default_parameters(Organ::Colon, Species::Human)
        .with("wall layer count", ParamValue::Int(2));
    assert!(matches!(
        Scaffold::build(params, None),
        Err(ScaffoldError::Configuration(_))
    ));
}

#[test]
fn layer_groups_partition_the_wall() {
    let scaffold = helpers::build(Organ::Esophagus, Species::Human);
    let layer_total: usize = [
        "esophagus mucosa",
        "submucosa of esophagus",
        "esophagus smooth muscle circular layer",
        "esophagus smooth muscle longitudinal layer",
    ]
    .iter()
    .map(|name| helpers::volume_group_size(&scaffold, name))
    .sum();
    assert_eq!(layer_total, scaffold.topology.element_count());
}

// ── species-conditional groups ─────────────────────────────────────────────

#[test]
fn taenia_coli_present_for_human_absent_for_rat() {
    let human = helpers::build(Organ::Colon, Species::Human);
    assert!(helpers::volume_group_size(&human, "taenia coli") > 0);
    let rat = helpers::build(Organ::Colon, Species::Rat);
    assert_eq!(helpers::volume_group_size(&rat, "taenia coli"), 0);
}

#[test]
fn accessory_lobe_present_for_mouse_absent_for_human() {
    let mouse = helpers::build(Organ::Lung, Species::Mouse);
    assert!(helpers::volume_group_size(&mouse, "right lung accessory lobe") > 0);
    let human = helpers::build(Organ::Lung, Species::Human);
    assert_eq!(
        helpers::volume_group_size(&human, "right lung accessory lobe"),
        0
    );
    // the human scaffold has one part fewer
    assert!(mouse.topology.parts.len() == human.topology.parts.len() + 1);
}

#[test]
fn forestomach_junction_is_rodent_only() {
    let rat = helpers::build(Organ::Stomach, Species::Rat);
    assert!(
        helpers::volume_group_size(&rat, "forestomach-glandular stomach junction") > 0
    );
    let pig = helpers::build(Organ::Stomach, Species::Pig);
    assert_eq!(
        helpers::volume_group_size(&pig, "forestomach-glandular stomach junction"),
        0
    );
}

#[test]
fn uterine_horns_are_non_human_branches() {
    let mouse = helpers::build(Organ::Uterus, Species::Mouse);
    assert!(helpers::volume_group_size(&mouse, "left uterine horn") > 0);
    assert!(helpers::volume_group_size(&mouse, "right uterine horn") > 0);
    assert_eq!(mouse.topology.branches.len(), 2);
    let human = helpers::build(Organ::Uterus, Species::Human);
    assert_eq!(helpers::volume_group_size(&human, "left uterine horn"), 0);
    assert!(human.topology.branches.is_empty());
    // human-only fundus region
    assert!(helpers::volume_group_size(&human, "fundus of uterus") > 0);
    assert_eq!(helpers::volume_group_size(&mouse, "fundus of uterus"), 0);
}

#[test]
fn ureters_appear_only_with_the_flag() {
    let without = helpers::build(Organ::Bladder, Species::Human);
    assert_eq!(helpers::volume_group_size(&without, "left ureter"), 0);
    assert!(without.topology.branches.is_empty());

    let params = default_parameters(Organ::Bladder, Species::Human)
        .with("include ureters", ParamValue::Bool(true));
    let with = Scaffold::build(params, None).unwrap();
    assert!(helpers::volume_group_size(&with, "left ureter") > 0);
    assert!(helpers::volume_group_size(&with, "right ureter") > 0);
    assert_eq!(with.topology.branches.len(), 2);
    helpers::assert_right_handed(&with);
}

#[test]
fn longitudinal_segments_partition_the_small_intestine() {
    let scaffold = helpers::build(Organ::SmallIntestine, Species::Human);
    let total: usize = ["duodenum", "jejunum", "ileum"]
        .iter()
        .map(|name| helpers::volume_group_size(&scaffold, name))
        .sum();
    let trunk_elements = scaffold.topology.parts[0].element_count;
    assert_eq!(total, trunk_elements);
}
