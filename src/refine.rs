// Copyright 2025 Lars Brubaker
// License: MIT
//
// Mesh refinement: uniform per-axis subdivision of a built scaffold.
//
// Each parent element is split into counts[0] x counts[1] x counts[2]
// children by evaluating the geometric field's element basis at
// sub-parametric positions. Only the geometric field is populated on the
// refined mesh; material/flat/straight/split values stay undefined there by
// design. Children inherit every annotation group membership of their
// parent; marker points are re-embedded into the child containing them.

use std::collections::HashMap;

use glam::DVec3;

use crate::annotation::{AnnotationRegistry, MarkerPoint};
use crate::error::{Result, ScaffoldError};
use crate::fields::{evaluate_element, FieldData, FieldKind, NodeFieldValue};
use crate::geom::Real;
use crate::topology::{
    Element, ElementIdx, ElementOrigin, ElementShape, Node, NodeIdx, NodeOrigin, Topology,
    INVALID,
};

/// A refined overlay: derived topology, geometric field, and annotations.
/// Discard and rebuild whenever the parent scaffold changes.
#[derive(Debug)]
pub struct RefinedMesh {
    pub topology: Topology,
    pub geometric: FieldData,
    pub annotations: AnnotationRegistry,
    pub counts: [usize; 3],
    /// Child element ids per parent element id.
    pub children: Vec<Vec<ElementIdx>>,
    /// False when independently-meshed parts were refined with different
    /// counts and the shared boundaries are no longer conformant.
    pub conformant: bool,
}

/// Node deduplication across parent element boundaries by quantized
/// coordinates; the quantum is a fixed fraction of the mesh diagonal.
/// Keys are scoped by merge domain so coincident nodes across an open
/// fissure stay distinct: parts joined by closed (shared-node) boundaries
/// share a domain, parts separated by open boundaries do not.
struct NodeMerger {
    quantum: Real,
    domains: Vec<usize>,
    seen: HashMap<(usize, [i64; 3]), NodeIdx>,
}

impl NodeMerger {
    fn new(geometric: &FieldData, topology: &Topology) -> Self {
        let mut min = DVec3::splat(Real::MAX);
        let mut max = DVec3::splat(Real::MIN);
        for n in 0..topology.node_count() as u32 {
            if let Some(v) = geometric.value(n) {
                min = min.min(v.x);
                max = max.max(v.x);
            }
        }
        let diagonal = (max - min).length();
        NodeMerger {
            quantum: (diagonal * 1.0e-9).max(1.0e-12),
            domains: part_merge_domains(topology),
            seen: HashMap::new(),
        }
    }

    fn key(&self, part: usize, x: DVec3) -> (usize, [i64; 3]) {
        (
            self.domains[part],
            [
                (x.x / self.quantum).round() as i64,
                (x.y / self.quantum).round() as i64,
                (x.z / self.quantum).round() as i64,
            ],
        )
    }

    fn find_or_insert(
        &mut self,
        part: usize,
        x: DVec3,
        create: impl FnOnce() -> NodeIdx,
    ) -> NodeIdx {
        let key = self.key(part, x);
        if let Some(&idx) = self.seen.get(&key) {
            return idx;
        }
        let idx = create();
        self.seen.insert(key, idx);
        idx
    }
}

/// Union parts over closed shared boundaries; open boundaries keep the
/// adjoining parts in separate merge domains.
fn part_merge_domains(topology: &Topology) -> Vec<usize> {
    let mut parent: Vec<usize> = (0..topology.parts.len()).collect();
    fn find(parent: &mut [usize], i: usize) -> usize {
        let mut root = i;
        while parent[root] != root {
            root = parent[root];
        }
        let mut walk = i;
        while parent[walk] != root {
            let next = parent[walk];
            parent[walk] = root;
            walk = next;
        }
        root
    }
    for boundary in &topology.boundaries {
        if !boundary.shared.is_empty() {
            let a = find(&mut parent, boundary.part_a);
            let b = find(&mut parent, boundary.part_b);
            parent[a] = b;
        }
    }
    (0..parent.len())
        .map(|i| find(&mut parent, i))
        .collect()
}

/// Refine every element of the scaffold topology by the same per-axis
/// counts. counts = [1, 1, 1] is the identity transform on the geometric
/// field. `part_counts`, when given, overrides counts per part; differing
/// counts across parts sharing a boundary produce a non-conformant result
/// (logged warning, not an error).
pub fn refine(
    topology: &Topology,
    geometric: &FieldData,
    annotations: &AnnotationRegistry,
    counts: [usize; 3],
    part_counts: Option<&[[usize; 3]]>,
) -> Result<RefinedMesh> {
    if counts.contains(&0) {
        return Err(ScaffoldError::Configuration(
            "refine counts must be positive".into(),
        ));
    }
    if let Some(per_part) = part_counts {
        if per_part.len() != topology.parts.len() {
            return Err(ScaffoldError::Configuration(format!(
                "per-part refine counts for {} parts, topology has {}",
                per_part.len(),
                topology.parts.len()
            )));
        }
        if per_part.iter().any(|c| c.contains(&0)) {
            return Err(ScaffoldError::Configuration(
                "refine counts must be positive".into(),
            ));
        }
    }

    let mut conformant = true;
    if let Some(per_part) = part_counts {
        for boundary in &topology.boundaries {
            if per_part[boundary.part_a] != per_part[boundary.part_b] {
                conformant = false;
                log::warn!(
                    "refine counts differ across the boundary between parts {} and {}; \
                     the refined meshes do not conform there",
                    boundary.part_a,
                    boundary.part_b
                );
            }
        }
    }

    let mut out = Topology::new();
    let mut values: Vec<NodeFieldValue> = Vec::new();
    let mut merger = NodeMerger::new(geometric, topology);
    let mut children: Vec<Vec<ElementIdx>> = vec![Vec::new(); topology.element_count()];

    for (parent_index, parent) in topology.elements.iter().enumerate() {
        let c = part_counts
            .map(|per_part| per_part[parent.origin.part])
            .unwrap_or(counts);
        for k in 0..c[2] {
            for j in 0..c[1] {
                for i in 0..c[0] {
                    let mut corner_ids = [INVALID; 8];
                    let mut degenerate = false;
                    for corner in 0..8usize {
                        let bits = [corner & 1, (corner >> 1) & 1, (corner >> 2) & 1];
                        let xi = [
                            (i + bits[0]) as Real / c[0] as Real,
                            (j + bits[1]) as Real / c[1] as Real,
                            (k + bits[2]) as Real / c[2] as Real,
                        ];
                        let (x, jacobian) =
                            evaluate_element(geometric, parent, xi).ok_or_else(|| {
                                ScaffoldError::Configuration(
                                    "refinement needs a fully defined geometric field".into(),
                                )
                            })?;
                        let value = NodeFieldValue {
                            x,
                            d1: jacobian[0] / c[0] as Real,
                            d2: jacobian[1] / c[1] as Real,
                            d3: jacobian[2] / c[2] as Real,
                        };
                        let idx = merger.find_or_insert(parent.origin.part, x, || {
                            let idx = out.nodes.len() as NodeIdx;
                            out.nodes.push(Node {
                                origin: NodeOrigin {
                                    part: parent.origin.part,
                                    along: parent.origin.segment * c[1] + j + bits[1],
                                    wall: parent.origin.layer * c[2] + k + bits[2],
                                    around: parent.origin.sector * c[0] + i + bits[0],
                                    duplicate_of: INVALID,
                                },
                            });
                            values.push(value);
                            idx
                        });
                        if corner_ids[..corner].contains(&idx) {
                            degenerate = true;
                        }
                        corner_ids[corner] = idx;
                    }
                    let origin = ElementOrigin {
                        part: parent.origin.part,
                        segment: parent.origin.segment * c[1] + j,
                        layer: parent.origin.layer * c[2] + k,
                        sector: parent.origin.sector * c[0] + i,
                    };
                    // collapsed children (wedge apex fans) keep a collapsed shape
                    let element = if degenerate {
                        let mut distinct = Vec::new();
                        for &id in &corner_ids {
                            if !distinct.contains(&id) {
                                distinct.push(id);
                            }
                        }
                        Element {
                            shape: if distinct.len() >= 6 {
                                ElementShape::Wedge
                            } else {
                                ElementShape::Pyramid
                            },
                            nodes: distinct,
                            origin,
                        }
                    } else {
                        Element {
                            shape: ElementShape::Hexahedron,
                            nodes: corner_ids.to_vec(),
                            origin,
                        }
                    };
                    let child_index = out.elements.len() as ElementIdx;
                    out.elements.push(element);
                    children[parent_index].push(child_index);
                }
            }
        }
    }

    let mut field = FieldData::undefined(FieldKind::Geometric, out.nodes.len());
    for (i, value) in values.into_iter().enumerate() {
        field.set(i as NodeIdx, value);
    }

    // transfer annotations: children inherit every parent element
    // membership; markers re-embed into the child containing them
    let mut refined_annotations = AnnotationRegistry::new();
    for group in annotations.groups() {
        let target = refined_annotations.find_or_create(group.term.clone());
        for &parent_element in &group.elements {
            for &child in &children[parent_element as usize] {
                target.elements.insert(child);
            }
        }
        for marker in &group.markers {
            let c = part_counts
                .map(|per_part| per_part[topology.elements[marker.element as usize].origin.part])
                .unwrap_or(counts);
            let (child, xi) = re_embed(marker.xi, c, &children[marker.element as usize]);
            target.markers.push(MarkerPoint {
                name: marker.name.clone(),
                element: child,
                xi,
            });
        }
    }

    Ok(RefinedMesh {
        topology: out,
        geometric: field,
        annotations: refined_annotations,
        counts,
        children,
        conformant,
    })
}

/// Map a parent-local location into (child element, child-local xi).
/// Children are laid out k-major, then j, then i.
fn re_embed(xi: [Real; 3], counts: [usize; 3], children: &[ElementIdx]) -> (ElementIdx, [Real; 3]) {
    let mut cell = [0usize; 3];
    let mut local = [0.0; 3];
    for dir in 0..3 {
        let scaled = xi[dir].clamp(0.0, 1.0) * counts[dir] as Real;
        cell[dir] = (scaled as usize).min(counts[dir] - 1);
        local[dir] = scaled - cell[dir] as Real;
    }
    let index = (cell[2] * counts[1] + cell[1]) * counts[0] + cell[0];
    (children[index], local)
}
