// Copyright 2025 Lars Brubaker
// License: MIT
//
// Mesh topology: nodes and elements produced by sweeping cross-section
// rings along central paths.
//
// All entities live in Vec arenas addressed by u32 indices, INVALID = null.
// Coordinates do not live here; every coordinate field maps node indices to
// values over this one shared topology.
//
// Element local coordinates: xi1 = around, xi2 = along, xi3 = through-wall
// (inner to outer). With rings wound counter-clockwise about the path
// tangent this ordering is right-handed for every element.

use glam::DVec3;

use crate::error::{Result, ScaffoldError};
use crate::geom::Real;

pub const INVALID: u32 = u32::MAX;

/// Index into Topology::nodes.
pub type NodeIdx = u32;
/// Index into Topology::elements.
pub type ElementIdx = u32;

/// Canonical face identity: the face's node set, sorted.
pub type FaceKey = [NodeIdx; 4];
/// Canonical edge identity: the edge's node pair, sorted.
pub type EdgeKey = [NodeIdx; 2];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ElementShape {
    Hexahedron,
    Wedge,
    Pyramid,
}

/// Provenance of a node in the swept grid that created it.
#[derive(Clone, Copy, Debug)]
pub struct NodeOrigin {
    pub part: usize,
    pub along: usize,
    pub wall: usize,
    pub around: usize,
    /// For a fissure duplicate, the node this one was copied from.
    pub duplicate_of: NodeIdx,
}

#[derive(Clone, Copy, Debug)]
pub struct Node {
    pub origin: NodeOrigin,
}

/// Back-reference from an element to the sweep coordinates that produced it.
#[derive(Clone, Copy, Debug)]
pub struct ElementOrigin {
    pub part: usize,
    /// Path segment (element index along).
    pub segment: usize,
    /// Through-wall layer index.
    pub layer: usize,
    /// Angular sector index.
    pub sector: usize,
}

#[derive(Clone, Debug)]
pub struct Element {
    pub shape: ElementShape,
    /// xi-ordered node list: hex 8, wedge 6, pyramid 5.
    pub nodes: Vec<NodeIdx>,
    pub origin: ElementOrigin,
}

impl Element {
    /// Faces as canonical sorted node tuples. Wedge triangle faces and the
    /// pyramid apex faces repeat one node to fill the quad key.
    pub fn faces(&self) -> Vec<FaceKey> {
        match self.shape {
            ElementShape::Hexahedron => {
                let n = &self.nodes;
                [
                    [n[0], n[2], n[4], n[6]], // xi1 = 0
                    [n[1], n[3], n[5], n[7]], // xi1 = 1
                    [n[0], n[1], n[4], n[5]], // xi2 = 0
                    [n[2], n[3], n[6], n[7]], // xi2 = 1
                    [n[0], n[1], n[2], n[3]], // xi3 = 0
                    [n[4], n[5], n[6], n[7]], // xi3 = 1
                ]
                .iter()
                .map(|f| face_key(*f))
                .collect()
            }
            ElementShape::Wedge => {
                let n = &self.nodes;
                vec![
                    face_key([n[0], n[1], n[2], n[2]]),
                    face_key([n[3], n[4], n[5], n[5]]),
                    face_key([n[0], n[1], n[3], n[4]]),
                    face_key([n[1], n[2], n[4], n[5]]),
                    face_key([n[0], n[2], n[3], n[5]]),
                ]
            }
            ElementShape::Pyramid => {
                let n = &self.nodes;
                vec![
                    face_key([n[0], n[1], n[2], n[3]]),
                    face_key([n[0], n[1], n[4], n[4]]),
                    face_key([n[1], n[3], n[4], n[4]]),
                    face_key([n[3], n[2], n[4], n[4]]),
                    face_key([n[2], n[0], n[4], n[4]]),
                ]
            }
        }
    }

    pub fn edges(&self) -> Vec<EdgeKey> {
        let n = &self.nodes;
        match self.shape {
            ElementShape::Hexahedron => [
                (0, 1),
                (2, 3),
                (4, 5),
                (6, 7),
                (0, 2),
                (1, 3),
                (4, 6),
                (5, 7),
                (0, 4),
                (1, 5),
                (2, 6),
                (3, 7),
            ]
            .iter()
            .map(|&(a, b)| edge_key(n[a], n[b]))
            .collect(),
            ElementShape::Wedge => [(0, 1), (1, 2), (2, 0), (3, 4), (4, 5), (5, 3), (0, 3), (1, 4), (2, 5)]
                .iter()
                .map(|&(a, b)| edge_key(n[a], n[b]))
                .collect(),
            ElementShape::Pyramid => [(0, 1), (1, 3), (3, 2), (2, 0), (0, 4), (1, 4), (2, 4), (3, 4)]
                .iter()
                .map(|&(a, b)| edge_key(n[a], n[b]))
                .collect(),
        }
    }
}

pub fn face_key(mut nodes: [NodeIdx; 4]) -> FaceKey {
    nodes.sort_unstable();
    nodes
}

pub fn edge_key(a: NodeIdx, b: NodeIdx) -> EdgeKey {
    if a <= b {
        [a, b]
    } else {
        [b, a]
    }
}

/// One swept grid of nodes: (along + 1) x (wall + 1) x around, the last
/// angular index wrapping to the first.
#[derive(Clone, Debug)]
pub struct PartGrid {
    pub name: String,
    /// Elements along the path.
    pub along_count: usize,
    /// Element layers through the wall.
    pub wall_count: usize,
    /// Elements (== nodes) around the ring.
    pub around_count: usize,
    ids: Vec<NodeIdx>,
    pub element_start: ElementIdx,
    pub element_count: usize,
    /// Apex node ids per wall surface when the far end is capped.
    pub apex: Vec<NodeIdx>,
}

impl PartGrid {
    pub fn node(&self, along: usize, wall: usize, around: usize) -> NodeIdx {
        let around = around % self.around_count;
        self.ids[(along * (self.wall_count + 1) + wall) * self.around_count + around]
    }

    pub fn node_ids(&self) -> &[NodeIdx] {
        &self.ids
    }

    pub fn elements(&self) -> std::ops::Range<u32> {
        self.element_start..(self.element_start + self.element_count as u32)
    }

    /// All node ids in the ring at one along index.
    pub fn ring(&self, along: usize) -> Vec<NodeIdx> {
        let mut out = Vec::with_capacity((self.wall_count + 1) * self.around_count);
        for wall in 0..=self.wall_count {
            for around in 0..self.around_count {
                out.push(self.node(along, wall, around));
            }
        }
        out
    }

    /// All node ids in the longitudinal column at one around index.
    pub fn column(&self, around: usize) -> Vec<NodeIdx> {
        let mut out = Vec::with_capacity((self.along_count + 1) * (self.wall_count + 1));
        for along in 0..=self.along_count {
            for wall in 0..=self.wall_count {
                out.push(self.node(along, wall, around));
            }
        }
        out
    }
}

/// How a part's nodes coincide with an earlier part's.
#[derive(Clone, Copy, Debug)]
pub enum SeamKind {
    /// A longitudinal column of nodes (a fissure line): this part's column
    /// at `around_self` lies on the other part's column at `around_other`.
    Longitudinal {
        around_self: usize,
        around_other: usize,
    },
    /// This part's start ring is the other part's end ring.
    Transverse,
}

#[derive(Clone, Copy, Debug)]
pub struct Seam {
    pub other_part: usize,
    pub kind: SeamKind,
}

/// Record of one internal boundary between two parts: either shared nodes
/// or, with the boundary open, pairs (duplicate, primary).
#[derive(Clone, Debug)]
pub struct BoundaryRecord {
    pub part_a: usize,
    pub part_b: usize,
    /// End-to-end ring junction rather than a longitudinal column.
    pub transverse: bool,
    pub shared: Vec<NodeIdx>,
    pub duplicates: Vec<(NodeIdx, NodeIdx)>,
}

/// Deterministic origin of a branch: everything needed to derive the branch
/// start frame from the parent, under any coordinate field.
#[derive(Clone, Debug)]
pub struct BranchAttachment {
    pub parent_part: usize,
    pub parent_element: ElementIdx,
    pub xi: [Real; 3],
    /// Departure direction in the parent's local (d2, d3, d1) frame.
    pub direction: DVec3,
}

#[derive(Clone, Debug)]
pub struct BranchRecord {
    pub name: String,
    pub part: usize,
    pub attachment: BranchAttachment,
    /// Arc length of the branch path.
    pub length: Real,
}

/// The complete element/node graph of one scaffold.
#[derive(Clone, Debug, Default)]
pub struct Topology {
    pub nodes: Vec<Node>,
    pub elements: Vec<Element>,
    pub parts: Vec<PartGrid>,
    pub boundaries: Vec<BoundaryRecord>,
    pub branches: Vec<BranchRecord>,
}

impl Topology {
    pub fn new() -> Self {
        Topology::default()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn element_count(&self) -> usize {
        self.elements.len()
    }

    pub fn part_index(&self, name: &str) -> Option<usize> {
        self.parts.iter().position(|p| p.name == name)
    }

    fn push_node(&mut self, origin: NodeOrigin) -> NodeIdx {
        let idx = self.nodes.len() as NodeIdx;
        self.nodes.push(Node { origin });
        idx
    }

    /// Sweep one part grid. `seam` shares (closed) or duplicates (open)
    /// nodes along an internal boundary with an earlier part; `capped`
    /// closes the far end onto an apex column of wedge elements.
    pub fn add_part(
        &mut self,
        name: &str,
        along_count: usize,
        wall_count: usize,
        around_count: usize,
        seam: Option<(Seam, bool)>,
        capped: bool,
    ) -> Result<usize> {
        if along_count == 0 || wall_count == 0 || around_count < 3 {
            return Err(ScaffoldError::Configuration(format!(
                "part '{name}': invalid grid {along_count} x {wall_count} x {around_count}"
            )));
        }
        let part = self.parts.len();
        if let Some((seam, _)) = &seam {
            if seam.other_part >= part {
                return Err(ScaffoldError::Configuration(format!(
                    "part '{name}': seam references part {} not yet built",
                    seam.other_part
                )));
            }
        }

        let mut ids = Vec::with_capacity((along_count + 1) * (wall_count + 1) * around_count);
        let mut shared = Vec::new();
        let mut duplicates = Vec::new();
        for along in 0..=along_count {
            for wall in 0..=wall_count {
                for around in 0..around_count {
                    let origin = NodeOrigin {
                        part,
                        along,
                        wall,
                        around,
                        duplicate_of: INVALID,
                    };
                    let idx = match &seam {
                        Some((seam, open)) => {
                            let other = &self.parts[seam.other_part];
                            let coincident = match seam.kind {
                                SeamKind::Longitudinal {
                                    around_self,
                                    around_other,
                                } if around == around_self
                                    && other.along_count == along_count
                                    && other.wall_count == wall_count =>
                                {
                                    Some(other.node(along, wall, around_other))
                                }
                                SeamKind::Transverse
                                    if along == 0
                                        && other.wall_count == wall_count
                                        && other.around_count == around_count =>
                                {
                                    Some(other.node(other.along_count, wall, around))
                                }
                                _ => None,
                            };
                            match coincident {
                                Some(primary) if !open => {
                                    shared.push(primary);
                                    primary
                                }
                                Some(primary) => {
                                    let mut origin = origin;
                                    origin.duplicate_of = primary;
                                    let dup = self.push_node(origin);
                                    duplicates.push((dup, primary));
                                    dup
                                }
                                None => self.push_node(origin),
                            }
                        }
                        None => self.push_node(origin),
                    };
                    ids.push(idx);
                }
            }
        }

        let element_start = self.elements.len() as ElementIdx;
        let grid = PartGrid {
            name: name.to_string(),
            along_count,
            wall_count,
            around_count,
            ids,
            element_start,
            element_count: 0,
            apex: Vec::new(),
        };

        // hexahedra: xi1 around, xi2 along, xi3 wall
        let mut elements_added = 0;
        for segment in 0..along_count {
            for layer in 0..wall_count {
                for sector in 0..around_count {
                    let nodes = vec![
                        grid.node(segment, layer, sector),
                        grid.node(segment, layer, sector + 1),
                        grid.node(segment + 1, layer, sector),
                        grid.node(segment + 1, layer, sector + 1),
                        grid.node(segment, layer + 1, sector),
                        grid.node(segment, layer + 1, sector + 1),
                        grid.node(segment + 1, layer + 1, sector),
                        grid.node(segment + 1, layer + 1, sector + 1),
                    ];
                    self.elements.push(Element {
                        shape: ElementShape::Hexahedron,
                        nodes,
                        origin: ElementOrigin {
                            part,
                            segment,
                            layer,
                            sector,
                        },
                    });
                    elements_added += 1;
                }
            }
        }

        let mut grid = grid;
        if capped {
            // apex column: one node per wall surface, closing the far ring
            // with a fan of wedges
            for wall in 0..=wall_count {
                let apex = self.push_node(NodeOrigin {
                    part,
                    along: along_count + 1,
                    wall,
                    around: 0,
                    duplicate_of: INVALID,
                });
                grid.apex.push(apex);
            }
            for layer in 0..wall_count {
                for sector in 0..around_count {
                    let nodes = vec![
                        grid.node(along_count, layer, sector),
                        grid.node(along_count, layer, sector + 1),
                        grid.apex[layer],
                        grid.node(along_count, layer + 1, sector),
                        grid.node(along_count, layer + 1, sector + 1),
                        grid.apex[layer + 1],
                    ];
                    self.elements.push(Element {
                        shape: ElementShape::Wedge,
                        nodes,
                        origin: ElementOrigin {
                            part,
                            segment: along_count,
                            layer,
                            sector,
                        },
                    });
                    elements_added += 1;
                }
            }
        }
        grid.element_count = elements_added;

        if let Some((seam, _)) = &seam {
            self.boundaries.push(BoundaryRecord {
                part_a: seam.other_part,
                part_b: part,
                transverse: matches!(seam.kind, SeamKind::Transverse),
                shared,
                duplicates,
            });
        }
        self.parts.push(grid);
        Ok(part)
    }

    /// Shared node count on the internal boundary between two parts.
    pub fn shared_node_count(&self, part_a: usize, part_b: usize) -> usize {
        self.boundaries
            .iter()
            .filter(|b| {
                (b.part_a == part_a && b.part_b == part_b)
                    || (b.part_a == part_b && b.part_b == part_a)
            })
            .map(|b| b.shared.len())
            .sum()
    }

    /// Duplicated node count on the internal boundary between two parts.
    pub fn duplicate_node_count(&self, part_a: usize, part_b: usize) -> usize {
        self.boundaries
            .iter()
            .filter(|b| {
                (b.part_a == part_a && b.part_b == part_b)
                    || (b.part_a == part_b && b.part_b == part_a)
            })
            .map(|b| b.duplicates.len())
            .sum()
    }

    /// Concatenate another topology after this one, unifying `junction`
    /// node pairs (other's node -> this's node). Every other id is rebased
    /// past this topology's arenas, so the result has no collisions.
    /// Returns the combined topology and the node remap applied to `other`.
    pub fn concatenate(
        &self,
        other: &Topology,
        junction: &[(NodeIdx, NodeIdx)],
    ) -> (Topology, Vec<NodeIdx>) {
        let node_base = self.nodes.len() as NodeIdx;
        let element_base = self.elements.len() as ElementIdx;
        let mut remap: Vec<NodeIdx> = (0..other.nodes.len())
            .map(|i| node_base + i as NodeIdx)
            .collect();
        for &(from_other, to_self) in junction {
            remap[from_other as usize] = to_self;
        }

        let mut out = self.clone();
        for (i, node) in other.nodes.iter().enumerate() {
            if junction.iter().any(|&(from, _)| from as usize == i) {
                // unified with an existing node; keep arena alignment with a
                // tombstone pointing at the survivor
                let mut origin = node.origin;
                origin.duplicate_of = remap[i];
                out.nodes.push(Node { origin });
            } else {
                let mut origin = node.origin;
                origin.part += self.parts.len();
                out.nodes.push(Node { origin });
            }
        }
        for element in &other.elements {
            let mut e = element.clone();
            e.nodes = e.nodes.iter().map(|&n| remap[n as usize]).collect();
            e.origin.part += self.parts.len();
            out.elements.push(e);
        }
        for part in &other.parts {
            let mut p = part.clone();
            p.ids = p.ids.iter().map(|&n| remap[n as usize]).collect();
            p.apex = p.apex.iter().map(|&n| remap[n as usize]).collect();
            p.element_start += element_base;
            out.parts.push(p);
        }
        for boundary in &other.boundaries {
            let mut b = boundary.clone();
            b.part_a += self.parts.len();
            b.part_b += self.parts.len();
            b.shared = b.shared.iter().map(|&n| remap[n as usize]).collect();
            b.duplicates = b
                .duplicates
                .iter()
                .map(|&(d, p)| (remap[d as usize], remap[p as usize]))
                .collect();
            out.boundaries.push(b);
        }
        for branch in &other.branches {
            let mut br = branch.clone();
            br.part += self.parts.len();
            br.attachment.parent_part += self.parts.len();
            br.attachment.parent_element += element_base;
            out.branches.push(br);
        }
        (out, remap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tube(along: usize, wall: usize, around: usize) -> Topology {
        let mut topo = Topology::new();
        topo.add_part("tube", along, wall, around, None, false).unwrap();
        topo
    }

    #[test]
    fn tube_counts() {
        let topo = tube(4, 1, 8);
        assert_eq!(topo.node_count(), 5 * 2 * 8);
        assert_eq!(topo.element_count(), 4 * 1 * 8);
    }

    #[test]
    fn rejects_degenerate_grid() {
        let mut topo = Topology::new();
        assert!(topo.add_part("bad", 0, 1, 8, None, false).is_err());
        assert!(topo.add_part("bad", 4, 1, 2, None, false).is_err());
    }

    #[test]
    fn ring_wraps_around() {
        let topo = tube(2, 1, 6);
        let part = &topo.parts[0];
        assert_eq!(part.node(0, 0, 6), part.node(0, 0, 0));
    }

    #[test]
    fn hex_nodes_are_distinct() {
        let topo = tube(3, 2, 8);
        for element in &topo.elements {
            let mut nodes = element.nodes.clone();
            nodes.sort_unstable();
            nodes.dedup();
            assert_eq!(nodes.len(), 8);
        }
    }

    #[test]
    fn closed_longitudinal_seam_shares_column() {
        let mut topo = Topology::new();
        topo.add_part("a", 4, 1, 8, None, false).unwrap();
        let seam = Seam {
            other_part: 0,
            kind: SeamKind::Longitudinal {
                around_self: 0,
                around_other: 4,
            },
        };
        topo.add_part("b", 4, 1, 8, Some((seam, false)), false).unwrap();
        // column length = (along+1) * (wall+1)
        assert_eq!(topo.shared_node_count(0, 1), 5 * 2);
        assert_eq!(topo.duplicate_node_count(0, 1), 0);
    }

    #[test]
    fn open_longitudinal_seam_duplicates_column() {
        let mut topo = Topology::new();
        topo.add_part("a", 4, 1, 8, None, false).unwrap();
        let seam = Seam {
            other_part: 0,
            kind: SeamKind::Longitudinal {
                around_self: 0,
                around_other: 4,
            },
        };
        topo.add_part("b", 4, 1, 8, Some((seam, true)), false).unwrap();
        assert_eq!(topo.shared_node_count(0, 1), 0);
        assert_eq!(topo.duplicate_node_count(0, 1), 5 * 2);
        // duplicates reference their primaries
        for &(dup, primary) in &topo.boundaries[0].duplicates {
            assert_eq!(topo.nodes[dup as usize].origin.duplicate_of, primary);
            assert_ne!(dup, primary);
        }
    }

    #[test]
    fn transverse_seam_joins_end_to_start() {
        let mut topo = Topology::new();
        topo.add_part("a", 3, 1, 8, None, false).unwrap();
        let seam = Seam {
            other_part: 0,
            kind: SeamKind::Transverse,
        };
        topo.add_part("b", 2, 1, 8, Some((seam, false)), false).unwrap();
        assert_eq!(topo.shared_node_count(0, 1), 2 * 8);
        let a = &topo.parts[0];
        let b = &topo.parts[1];
        assert_eq!(a.node(3, 0, 2), b.node(0, 0, 2));
    }

    #[test]
    fn capped_part_adds_wedges() {
        let mut topo = Topology::new();
        topo.add_part("dome", 2, 1, 6, None, true).unwrap();
        let wedges = topo
            .elements
            .iter()
            .filter(|e| e.shape == ElementShape::Wedge)
            .count();
        assert_eq!(wedges, 6);
        assert_eq!(topo.parts[0].apex.len(), 2);
    }

    #[test]
    fn concatenate_has_no_id_collisions() {
        let a = tube(3, 1, 8);
        let b = tube(2, 1, 8);
        // unify b's start ring with a's end ring
        let junction: Vec<(NodeIdx, NodeIdx)> = (0..=1)
            .flat_map(|wall| {
                (0..8).map(move |around| (wall, around))
            })
            .map(|(wall, around)| {
                (
                    b.parts[0].node(0, wall, around),
                    a.parts[0].node(3, wall, around),
                )
            })
            .collect();
        let (merged, _) = a.concatenate(&b, &junction);
        assert_eq!(merged.element_count(), a.element_count() + b.element_count());
        // every element node id is in range and junction nodes unified
        for element in &merged.elements {
            for &n in &element.nodes {
                assert!((n as usize) < merged.nodes.len());
            }
        }
        let b_part = &merged.parts[1];
        assert_eq!(b_part.node(0, 0, 3), merged.parts[0].node(3, 0, 3));
    }
}
