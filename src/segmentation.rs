// Copyright 2025 Lars Brubaker
// License: MIT
//
// Subject-specific segmentation input for nerve scaffolds.
//
// The input is a set of named, annotated point groups digitized from one
// specimen: a trunk contour group, branch contour groups, landmark level
// markers, and optional orientation nodes from the fixed eight-direction
// vocabulary. Names bind to the controlled vocabulary; unrecognized names
// are passed through without a group binding and logged. Validation needs
// at least two recognized landmarks to scale the material coordinates, and
// rejects duplicate branch names.

use glam::DVec3;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ScaffoldError};
use crate::params::Organ;
use crate::terms::{find_term, ORIENTATION_DIRECTIONS, VAGUS_LEVEL_TERMS};

/// One named group of digitized points (a trunk or branch contour).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ContourGroup {
    pub name: String,
    pub points: Vec<DVec3>,
    /// Per-point radius where digitized; empty means unknown.
    pub radii: Vec<f64>,
}

/// One anatomical landmark marker.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LandmarkMarker {
    pub name: String,
    pub x: DVec3,
}

/// One orientation node from the eight-direction vocabulary.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OrientationNode {
    pub direction: String,
    pub x: DVec3,
}

/// Complete segmentation input for a subject-specific build.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SegmentationInput {
    /// Trunk contour group; its name selects left or right trunk.
    pub trunk: ContourGroup,
    pub branches: Vec<ContourGroup>,
    pub landmarks: Vec<LandmarkMarker>,
    pub orientations: Vec<OrientationNode>,
}

/// The validated, vocabulary-bound view of a segmentation input.
#[derive(Clone, Debug)]
pub struct ValidatedSegmentation<'a> {
    pub input: &'a SegmentationInput,
    /// Landmarks matching the level vocabulary, in input order.
    pub recognized_landmarks: Vec<&'a LandmarkMarker>,
    /// Branch groups whose names bind to the organ vocabulary.
    pub recognized_branches: Vec<&'a ContourGroup>,
    /// Names that did not bind; carried through for the caller.
    pub unrecognized: Vec<String>,
}

impl SegmentationInput {
    /// Validate against the vocabulary for `organ`. Fatal: fewer than two
    /// recognized landmarks, duplicate branch names, empty trunk.
    /// Non-fatal: unrecognized names (logged, passed through); orientation
    /// directions outside the eight-direction vocabulary (logged, ignored).
    pub fn validate(&self, organ: Organ) -> Result<ValidatedSegmentation<'_>> {
        if self.trunk.points.len() < 2 {
            return Err(ScaffoldError::InvalidInput(format!(
                "trunk group '{}' has {} points, need at least 2",
                self.trunk.name,
                self.trunk.points.len()
            )));
        }
        for (i, a) in self.branches.iter().enumerate() {
            for b in &self.branches[i + 1..] {
                if a.name == b.name {
                    return Err(ScaffoldError::InvalidInput(format!(
                        "duplicate branch name '{}'",
                        a.name
                    )));
                }
            }
        }

        let mut recognized_landmarks = Vec::new();
        let mut unrecognized = Vec::new();
        for landmark in &self.landmarks {
            if VAGUS_LEVEL_TERMS.iter().any(|t| t.name == landmark.name) {
                recognized_landmarks.push(landmark);
            } else {
                log::warn!("unrecognized landmark term '{}'", landmark.name);
                unrecognized.push(landmark.name.clone());
            }
        }
        if recognized_landmarks.len() < 2 {
            return Err(ScaffoldError::InvalidInput(format!(
                "{} recognized landmark markers, need at least 2",
                recognized_landmarks.len()
            )));
        }

        let mut recognized_branches = Vec::new();
        for branch in &self.branches {
            if find_term(organ, &branch.name).is_some() {
                recognized_branches.push(branch);
            } else {
                log::warn!("unrecognized branch term '{}'", branch.name);
                unrecognized.push(branch.name.clone());
            }
        }

        for orientation in &self.orientations {
            if !ORIENTATION_DIRECTIONS.contains(&orientation.direction.as_str()) {
                log::warn!(
                    "orientation direction '{}' outside the eight-direction vocabulary",
                    orientation.direction
                );
            }
        }

        Ok(ValidatedSegmentation {
            input: self,
            recognized_landmarks,
            recognized_branches,
            unrecognized,
        })
    }
}
