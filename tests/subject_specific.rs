// Copyright 2025 Lars Brubaker
// Subject-specific vagus builds from segmentation input.

mod helpers;

use glam::DVec3;
use organ_scaffold::scaffold::{default_parameters, Scaffold};
use organ_scaffold::segmentation::{ContourGroup, LandmarkMarker, OrientationNode};
use organ_scaffold::{Organ, ScaffoldError, SegmentationInput, Species};

fn trunk_points() -> Vec<DVec3> {
    (0..=20)
        .map(|i| DVec3::new(2.0 * (i as f64 * 0.3).sin(), 0.5 * i as f64, 20.0 * i as f64))
        .collect()
}

fn input_with_landmarks(names: &[&str]) -> SegmentationInput {
    let points = trunk_points();
    let landmarks = names
        .iter()
        .enumerate()
        .map(|(i, name)| LandmarkMarker {
            name: name.to_string(),
            x: points[i * 8 + 1],
        })
        .collect();
    SegmentationInput {
        trunk: ContourGroup {
            name: "left vagus nerve".into(),
            points,
            radii: vec![2.0; 21],
        },
        branches: vec![
            ContourGroup {
                name: "superior laryngeal nerve".into(),
                points: (0..6)
                    .map(|i| DVec3::new(3.0 + 4.0 * i as f64, 4.0, 60.0 + 2.0 * i as f64))
                    .collect(),
                radii: vec![1.0; 6],
            },
            ContourGroup {
                name: "unnamed twig".into(),
                points: vec![DVec3::new(1.0, 0.0, 200.0), DVec3::new(9.0, 0.0, 206.0)],
                radii: vec![],
            },
        ],
        landmarks,
        orientations: vec![OrientationNode {
            direction: "orientation anterior".into(),
            x: DVec3::new(0.0, -5.0, 0.0),
        }],
    }
}

#[test]
fn one_recognized_landmark_is_a_fatal_input_error() {
    let input = input_with_landmarks(&[
        "level of superior border of jugular foramen on the vagus nerve",
        "a bespoke unlisted point",
    ]);
    let params = default_parameters(Organ::VagusNerve, Species::Human);
    assert!(matches!(
        Scaffold::build(params, Some(&input)),
        Err(ScaffoldError::InvalidInput(_))
    ));
}

#[test]
fn two_recognized_landmarks_build_a_subject_scaffold() {
    let input = input_with_landmarks(&[
        "level of superior border of jugular foramen on the vagus nerve",
        "level of laryngeal prominence on the vagus nerve",
    ]);
    let params = default_parameters(Organ::VagusNerve, Species::Human);
    let scaffold = Scaffold::build(params, Some(&input)).unwrap();

    helpers::assert_geometric_complete(&scaffold);
    helpers::assert_all_finite(&scaffold);

    // the trunk follows the digitized contour, not the default path
    let trunk_length = scaffold.parts_geometry[0].path.length();
    assert!((trunk_length - 400.0).abs() < 40.0);

    // the recognized branch became a part with a bound group
    assert_eq!(scaffold.topology.branches.len(), 1);
    assert!(helpers::volume_group_size(&scaffold, "superior laryngeal nerve") > 0);
    // the unrecognized one was passed through without a group
    assert!(scaffold.annotations.find("unnamed twig").is_none());
}

#[test]
fn recognized_landmarks_become_marker_points() {
    let names = [
        "level of superior border of jugular foramen on the vagus nerve",
        "level of laryngeal prominence on the vagus nerve",
    ];
    let input = input_with_landmarks(&names);
    let params = default_parameters(Organ::VagusNerve, Species::Human);
    let scaffold = Scaffold::build(params, Some(&input)).unwrap();
    for name in names {
        let group = scaffold.annotations.resolve_group(name).unwrap();
        assert_eq!(group.markers.len(), 1);
        let marker = &group.markers[0];
        assert!((marker.element as usize) < scaffold.topology.element_count());
        assert_eq!(
            group.term.id.as_deref().map(|id| id.starts_with("ILX:")),
            Some(true),
            "level markers bind to the landmark vocabulary"
        );
    }
}

#[test]
fn duplicate_branch_names_abort_the_build() {
    let mut input = input_with_landmarks(&[
        "level of superior border of jugular foramen on the vagus nerve",
        "level of laryngeal prominence on the vagus nerve",
    ]);
    let duplicate = input.branches[0].clone();
    input.branches.push(duplicate);
    let params = default_parameters(Organ::VagusNerve, Species::Human);
    assert!(matches!(
        Scaffold::build(params, Some(&input)),
        Err(ScaffoldError::InvalidInput(_))
    ));
}
