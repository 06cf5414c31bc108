// Copyright 2025 Lars Brubaker
// License: MIT
//
// Annotation groups: named, term-bound subsets of mesh entities.
//
// A group may hold members at several dimensions: 3-D elements, 2-D faces,
// 1-D edges, 0-D nodes, plus marker points embedded at an element-local
// location. Closure validation checks that lower-dimensional members lie on
// the boundary of the higher-dimensional ones; violations are logged and
// reported, never fatal.

use std::collections::BTreeSet;

use crate::error::{Result, ScaffoldError};
use crate::geom::Real;
use crate::terms::Term;
use crate::topology::{EdgeKey, ElementIdx, FaceKey, NodeIdx, Topology};

/// A controlled-vocabulary binding: name plus optional ontology id.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AnnotationTerm {
    pub name: String,
    pub id: Option<String>,
}

impl From<&Term> for AnnotationTerm {
    fn from(term: &Term) -> Self {
        AnnotationTerm {
            name: term.name.to_string(),
            id: term.id.map(str::to_string),
        }
    }
}

/// A point annotation embedded at an element-local position.
#[derive(Clone, Debug)]
pub struct MarkerPoint {
    pub name: String,
    pub element: ElementIdx,
    pub xi: [Real; 3],
}

#[derive(Clone, Debug, Default)]
pub struct AnnotationGroup {
    pub term: AnnotationTerm,
    pub elements: BTreeSet<ElementIdx>,
    pub faces: BTreeSet<FaceKey>,
    pub edges: BTreeSet<EdgeKey>,
    pub nodes: BTreeSet<NodeIdx>,
    pub markers: Vec<MarkerPoint>,
}

impl AnnotationGroup {
    pub fn new(term: AnnotationTerm) -> Self {
        AnnotationGroup {
            term,
            ..Default::default()
        }
    }

    /// Highest dimension with members: 3, 2, 1, 0, or -1 when empty.
    pub fn dimension(&self) -> i32 {
        if !self.elements.is_empty() {
            3
        } else if !self.faces.is_empty() {
            2
        } else if !self.edges.is_empty() {
            1
        } else if !self.nodes.is_empty() || !self.markers.is_empty() {
            0
        } else {
            -1
        }
    }

    pub fn is_empty(&self) -> bool {
        self.dimension() < 0
    }
}

/// One closure violation: a member not on the boundary of the group's
/// higher-dimensional members.
#[derive(Clone, Debug)]
pub struct ClosureViolation {
    pub group: String,
    pub detail: String,
}

/// The scaffold's set of annotation groups.
#[derive(Clone, Debug, Default)]
pub struct AnnotationRegistry {
    groups: Vec<AnnotationGroup>,
    /// Pairs of group names whose 2-D members may overlap.
    overlap_allowed: Vec<(String, String)>,
}

impl AnnotationRegistry {
    pub fn new() -> Self {
        AnnotationRegistry::default()
    }

    pub fn allow_overlap(&mut self, a: &str, b: &str) {
        self.overlap_allowed.push((a.to_string(), b.to_string()));
    }

    pub fn groups(&self) -> &[AnnotationGroup] {
        &self.groups
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Find an existing group by term name, or create it.
    pub fn find_or_create(&mut self, term: AnnotationTerm) -> &mut AnnotationGroup {
        if let Some(i) = self.groups.iter().position(|g| g.term.name == term.name) {
            return &mut self.groups[i];
        }
        self.groups.push(AnnotationGroup::new(term));
        self.groups.last_mut().expect("just pushed")
    }

    /// Add a group with the given entities, merging into an existing group
    /// bound to the same term.
    pub fn add_group(&mut self, term: AnnotationTerm, elements: &[ElementIdx]) {
        let group = self.find_or_create(term);
        group.elements.extend(elements.iter().copied());
    }

    pub fn find(&self, name: &str) -> Option<&AnnotationGroup> {
        self.groups.iter().find(|g| g.term.name == name)
    }

    /// Group for a term, or GroupNotFound.
    pub fn resolve_group(&self, name: &str) -> Result<&AnnotationGroup> {
        self.find(name)
            .ok_or_else(|| ScaffoldError::GroupNotFound(name.to_string()))
    }

    /// Verify every group's lower-dimensional members lie on the boundary of
    /// its higher-dimensional members. Non-fatal: violations are logged and
    /// returned; the build carries on.
    pub fn validate_closure(&self, topology: &Topology) -> Vec<ClosureViolation> {
        let mut violations = Vec::new();
        for group in &self.groups {
            if !group.elements.is_empty() {
                let mut element_faces: BTreeSet<FaceKey> = BTreeSet::new();
                let mut element_edges: BTreeSet<EdgeKey> = BTreeSet::new();
                let mut element_nodes: BTreeSet<NodeIdx> = BTreeSet::new();
                for &e in &group.elements {
                    let element = &topology.elements[e as usize];
                    element_faces.extend(element.faces());
                    element_edges.extend(element.edges());
                    element_nodes.extend(element.nodes.iter().copied());
                }
                for face in &group.faces {
                    if !element_faces.contains(face) {
                        violations.push(ClosureViolation {
                            group: group.term.name.clone(),
                            detail: format!("face {face:?} not on member element boundary"),
                        });
                    }
                }
                for edge in &group.edges {
                    if !element_edges.contains(edge) {
                        violations.push(ClosureViolation {
                            group: group.term.name.clone(),
                            detail: format!("edge {edge:?} not on member element boundary"),
                        });
                    }
                }
                for &node in &group.nodes {
                    if !element_nodes.contains(&node) {
                        violations.push(ClosureViolation {
                            group: group.term.name.clone(),
                            detail: format!("node {node} not on a member element"),
                        });
                    }
                }
            } else if !group.faces.is_empty() {
                let mut face_nodes: BTreeSet<NodeIdx> = BTreeSet::new();
                for face in &group.faces {
                    face_nodes.extend(face.iter().copied());
                }
                for &node in &group.nodes {
                    if !face_nodes.contains(&node) {
                        violations.push(ClosureViolation {
                            group: group.term.name.clone(),
                            detail: format!("node {node} not on a member face"),
                        });
                    }
                }
            }
            for marker in &group.markers {
                if marker.element as usize >= topology.elements.len() {
                    violations.push(ClosureViolation {
                        group: group.term.name.clone(),
                        detail: format!("marker '{}' embedded in missing element", marker.name),
                    });
                }
            }
        }
        for violation in &violations {
            log::warn!(
                "annotation closure: group '{}': {}",
                violation.group,
                violation.detail
            );
        }
        violations
    }

    /// 2-D overlaps between volume-surface groups that are not on the
    /// allow-list. Informational; the one documented overlap (atrial luminal
    /// surfaces with adjoining vessels) is filtered out.
    pub fn surface_overlaps(&self) -> Vec<(String, String)> {
        let mut out = Vec::new();
        for (i, a) in self.groups.iter().enumerate() {
            for b in &self.groups[i + 1..] {
                if a.faces.is_empty() || b.faces.is_empty() {
                    continue;
                }
                if a.faces.intersection(&b.faces).next().is_some() {
                    let pair_allowed = self.overlap_allowed.iter().any(|(x, y)| {
                        (x == &a.term.name && y == &b.term.name)
                            || (x == &b.term.name && y == &a.term.name)
                    });
                    if !pair_allowed {
                        out.push((a.term.name.clone(), b.term.name.clone()));
                    }
                }
            }
        }
        out
    }
}
