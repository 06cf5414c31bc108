// Copyright 2025 Lars Brubaker
// License: MIT
//
// Coordinate fields over one shared topology.
//
// Every field maps node indices to a position and three derivative vectors
// aligned with element local directions: d1 = d/dxi1 (around),
// d2 = d/dxi2 (along), d3 = d/dxi3 (through-wall). A node not participating
// in a field is explicitly undefined (None), never silently defaulted.
//
// Cut seams (the flat field's opening seam, the split field's margin) store
// a second value version per seam node in `seam_alternates`; positions of
// split-seam versions are identical, only derivatives differ.

use std::collections::BTreeMap;

use glam::DVec3;

use crate::error::{Result, ScaffoldError};
use crate::geom::{is_finite_vec, set_magnitude, Real};
use crate::interp::{cubic_hermite_basis, cubic_hermite_basis_derivatives, curvature};
use crate::path::CentralPath;
use crate::profile::CrossSectionProfile;
use crate::topology::{Element, ElementIdx, ElementShape, NodeIdx, Topology};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum FieldKind {
    Geometric,
    Material,
    Flat,
    Straight,
    Split,
}

impl FieldKind {
    pub fn name(&self) -> &'static str {
        match self {
            FieldKind::Geometric => "coordinates",
            FieldKind::Material => "material coordinates",
            FieldKind::Flat => "flat coordinates",
            FieldKind::Straight => "straight coordinates",
            FieldKind::Split => "split coordinates",
        }
    }
}

/// Position and element-direction derivatives of one node in one field.
#[derive(Clone, Copy, Debug, Default)]
pub struct NodeFieldValue {
    pub x: DVec3,
    pub d1: DVec3,
    pub d2: DVec3,
    pub d3: DVec3,
}

impl NodeFieldValue {
    pub fn is_finite(&self) -> bool {
        is_finite_vec(self.x)
            && is_finite_vec(self.d1)
            && is_finite_vec(self.d2)
            && is_finite_vec(self.d3)
    }
}

/// One named coordinate field over the shared topology.
#[derive(Clone, Debug)]
pub struct FieldData {
    pub kind: FieldKind,
    values: Vec<Option<NodeFieldValue>>,
    /// Second value version at cut/split seam nodes.
    pub seam_alternates: BTreeMap<NodeIdx, NodeFieldValue>,
}

impl FieldData {
    pub fn undefined(kind: FieldKind, node_count: usize) -> Self {
        FieldData {
            kind,
            values: vec![None; node_count],
            seam_alternates: BTreeMap::new(),
        }
    }

    pub fn set(&mut self, node: NodeIdx, value: NodeFieldValue) {
        self.values[node as usize] = Some(value);
    }

    pub fn value(&self, node: NodeIdx) -> Option<&NodeFieldValue> {
        self.values.get(node as usize).and_then(|v| v.as_ref())
    }

    pub fn is_defined(&self, node: NodeIdx) -> bool {
        self.value(node).is_some()
    }

    pub fn defined_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_some()).count()
    }

    pub fn node_count(&self) -> usize {
        self.values.len()
    }
}

/// Everything needed to evaluate one part's geometry: its central path and
/// cross-section profile. Physical cross-section size is carried by the
/// path's director magnitudes; profile points are in director units.
#[derive(Clone, Debug)]
pub struct PartGeometry {
    pub path: CentralPath,
    pub profile: CrossSectionProfile,
}

// ─────────────────────────── geometric field ──────────────────────────────

/// Geometric coordinates: path samples offset by profile ring points, with
/// curvature-corrected along-derivatives through the wall.
pub fn synthesize_geometric(
    topology: &Topology,
    parts_geometry: &[PartGeometry],
) -> Result<FieldData> {
    if parts_geometry.len() != topology.parts.len() {
        return Err(ScaffoldError::Configuration(format!(
            "geometry for {} parts but topology has {}",
            parts_geometry.len(),
            topology.parts.len()
        )));
    }
    let mut field = FieldData::undefined(FieldKind::Geometric, topology.node_count());
    for (part_index, geometry) in parts_geometry.iter().enumerate() {
        let grid = &topology.parts[part_index];
        let path = &geometry.path;
        let rings = geometry.profile.rings();
        if rings.len() != grid.wall_count + 1 {
            return Err(ScaffoldError::Configuration(format!(
                "part '{}': profile yields {} rings, grid needs {}",
                grid.name,
                rings.len(),
                grid.wall_count + 1
            )));
        }
        let length = path.length();
        let along_step = length / grid.along_count as Real;
        for along in 0..=grid.along_count {
            let t = (along_step * along as Real).min(length);
            let sample = path.sample(t)?;
            // positions for every wall ring first; derivatives need them
            let mut ring_positions =
                vec![vec![DVec3::ZERO; grid.around_count]; grid.wall_count + 1];
            for wall in 0..=grid.wall_count {
                for around in 0..grid.around_count {
                    let p = rings[wall].points[around];
                    ring_positions[wall][around] = sample.x + sample.d2 * p.x + sample.d3 * p.y;
                }
            }
            for wall in 0..=grid.wall_count {
                for around in 0..grid.around_count {
                    let node = grid.node(along, wall, around);
                    // shared boundary nodes keep the first part's values
                    if field.is_defined(node) {
                        continue;
                    }
                    let p = rings[wall].points[around];
                    let dp = rings[wall].derivatives[around];
                    let x = ring_positions[wall][around];
                    let d1 = sample.d2 * dp.x + sample.d3 * dp.y;
                    // along-derivative, shortened on the inside of bends
                    let offset = sample.d2 * p.x + sample.d3 * p.y;
                    let radial = offset.normalize_or_zero();
                    let curv = section_curvature(path, t, radial);
                    let factor = (1.0 - curv * offset.length()).max(0.1);
                    let d2 = set_magnitude(sample.d1, along_step * factor);
                    let d3 = if grid.wall_count > 0 {
                        if wall < grid.wall_count {
                            ring_positions[wall + 1][around] - ring_positions[wall][around]
                        } else {
                            ring_positions[wall][around] - ring_positions[wall - 1][around]
                        }
                    } else {
                        radial
                    };
                    field.set(node, NodeFieldValue { x, d1, d2, d3 });
                }
            }
        }
        // capped far end: apex column on the path axis just beyond the tube
        if !grid.apex.is_empty() {
            let end = path.sample(length)?;
            let axis = end.d1.normalize_or_zero();
            let mean_radius = 0.5 * (end.d2.length() + end.d3.length());
            for (wall, &apex) in grid.apex.iter().enumerate() {
                let depth = wall as Real / grid.wall_count.max(1) as Real;
                let x = end.x + axis * mean_radius * (0.6 + 0.4 * depth);
                field.set(
                    apex,
                    NodeFieldValue {
                        x,
                        d1: DVec3::ZERO,
                        d2: set_magnitude(axis, mean_radius * 0.5),
                        d3: set_magnitude(axis, mean_radius * 0.4 / grid.wall_count.max(1) as Real),
                    },
                );
            }
        }
    }
    Ok(field)
}

fn section_curvature(path: &CentralPath, t: Real, radial: DVec3) -> Real {
    if radial == DVec3::ZERO {
        return 0.0;
    }
    let nodes = path.nodes();
    let lengths: Vec<Real> = {
        let nx: Vec<DVec3> = nodes.iter().map(|n| n.x).collect();
        let nd1: Vec<DVec3> = nodes.iter().map(|n| n.d1).collect();
        let mut acc = vec![0.0];
        let mut total = 0.0;
        for e in 0..nx.len() - 1 {
            total += crate::interp::arc_length(nx[e], nd1[e], nx[e + 1], nd1[e + 1]);
            acc.push(total);
        }
        acc
    };
    let nx: Vec<DVec3> = nodes.iter().map(|n| n.x).collect();
    let nd1: Vec<DVec3> = nodes.iter().map(|n| n.d1).collect();
    let (e, xi) = crate::interp::locate_arc_distance(&nx, &nd1, &lengths, t);
    curvature(nx[e], nd1[e], nx[e + 1], nd1[e + 1], radial, xi)
}

// ─────────────────────────── material field ───────────────────────────────

/// Material coordinates: a fixed, species-invariant unit tube (outer radius
/// 0.5, unit length per part). Parts chained end-to-end by transverse
/// boundaries continue one tube; unconnected parts get tubes side by side.
/// Branch parts are re-rooted on their parent's material frame so the
/// embedding holds in material space too.
pub fn synthesize_material(topology: &Topology) -> FieldData {
    let mut field = FieldData::undefined(FieldKind::Material, topology.node_count());
    let branch_parts: Vec<usize> = topology.branches.iter().map(|b| b.part).collect();

    // chain parts joined end-to-end; boundaries are recorded in build order
    let part_count = topology.parts.len();
    let mut chain_root: Vec<usize> = (0..part_count).collect();
    let mut z_origin: Vec<Real> = vec![0.0; part_count];
    for boundary in &topology.boundaries {
        if boundary.transverse {
            chain_root[boundary.part_b] = chain_root[boundary.part_a];
            z_origin[boundary.part_b] = z_origin[boundary.part_a] + 1.0;
        }
    }

    for (part_index, grid) in topology.parts.iter().enumerate() {
        if branch_parts.contains(&part_index) {
            continue;
        }
        let origin = DVec3::new(1.5 * chain_root[part_index] as Real, 0.0, z_origin[part_index]);
        fill_straight_tube(&mut field, grid, origin, DVec3::Z, DVec3::X, 0.5, 1.0);
    }
    // branches: origin and axis resolved from the parent's material frame
    for branch in &topology.branches {
        let parent = &topology.elements[branch.attachment.parent_element as usize];
        if let Some((x, jacobian)) = evaluate_element(&field, parent, branch.attachment.xi) {
            let frame = orthonormal_frame(jacobian);
            let axis = direction_in_frame(branch.attachment.direction, frame);
            let grid = &topology.parts[branch.part];
            let side = axis.cross(frame[2]).normalize_or_zero();
            let side = if side == DVec3::ZERO { frame[0] } else { side };
            fill_straight_tube(&mut field, grid, x, axis, side, 0.1, 0.5);
        }
    }
    field
}

// ─────────────────────────── flat field ───────────────────────────────────

/// Flat coordinates for one tubular part: the tube cut along its seam
/// (around index 0) and unrolled into a plane. Circumferential arc length
/// maps to x, longitudinal arc length to y, wall depth to z. Seam nodes get
/// an alternate version carrying the far (full-circumference) x.
pub fn synthesize_flat(
    topology: &Topology,
    geometric: &FieldData,
    part_index: usize,
) -> Result<FieldData> {
    let grid = &topology.parts[part_index];
    let mut field = FieldData::undefined(FieldKind::Flat, topology.node_count());
    for along in 0..=grid.along_count {
        for wall in 0..=grid.wall_count {
            // circumferential arc lengths from the geometric ring
            let mut positions = Vec::with_capacity(grid.around_count + 1);
            for around in 0..=grid.around_count {
                let node = grid.node(along, wall, around);
                let value = geometric.value(node).ok_or_else(|| {
                    ScaffoldError::Configuration(
                        "flat field needs a fully defined geometric field".into(),
                    )
                })?;
                positions.push(value.x);
            }
            let arcs: Vec<Real> = (0..grid.around_count)
                .map(|s| (positions[s + 1] - positions[s]).length())
                .collect();
            let mut x_around = Vec::with_capacity(grid.around_count + 1);
            x_around.push(0.0);
            for arc in &arcs {
                x_around.push(x_around.last().unwrap() + arc);
            }
            let circumference = *x_around.last().unwrap();

            // longitudinal arc length along this column
            let y = column_arc_length(geometric, grid, along, wall);
            let z = wall_depth(geometric, grid, along, wall);

            for around in 0..grid.around_count {
                let node = grid.node(along, wall, around);
                let d1 = DVec3::new(arcs[around], 0.0, 0.0);
                let d2 = DVec3::new(0.0, column_step(geometric, grid, along, wall), 0.0);
                let d3 = DVec3::new(0.0, 0.0, wall_step(geometric, grid, along, wall));
                let value = NodeFieldValue {
                    x: DVec3::new(x_around[around], y, z),
                    d1,
                    d2,
                    d3,
                };
                field.set(node, value);
                if around == 0 {
                    // the cut-open far edge of the sheet
                    let mut alternate = value;
                    alternate.x.x = circumference;
                    alternate.d1 = DVec3::new(arcs[grid.around_count - 1], 0.0, 0.0);
                    field.seam_alternates.insert(node, alternate);
                }
            }
        }
    }
    Ok(field)
}

fn column_arc_length(geometric: &FieldData, grid: &crate::topology::PartGrid, along: usize, wall: usize) -> Real {
    let mut y = 0.0;
    for a in 0..along {
        let p0 = geometric.value(grid.node(a, wall, 0)).map(|v| v.x);
        let p1 = geometric.value(grid.node(a + 1, wall, 0)).map(|v| v.x);
        if let (Some(p0), Some(p1)) = (p0, p1) {
            y += (p1 - p0).length();
        }
    }
    y
}

fn column_step(geometric: &FieldData, grid: &crate::topology::PartGrid, along: usize, wall: usize) -> Real {
    let a = along.min(grid.along_count - 1);
    let p0 = geometric.value(grid.node(a, wall, 0)).map(|v| v.x);
    let p1 = geometric.value(grid.node(a + 1, wall, 0)).map(|v| v.x);
    match (p0, p1) {
        (Some(p0), Some(p1)) => (p1 - p0).length(),
        _ => 0.0,
    }
}

fn wall_depth(geometric: &FieldData, grid: &crate::topology::PartGrid, along: usize, wall: usize) -> Real {
    let mut z = 0.0;
    for w in 0..wall {
        let p0 = geometric.value(grid.node(along, w, 0)).map(|v| v.x);
        let p1 = geometric.value(grid.node(along, w + 1, 0)).map(|v| v.x);
        if let (Some(p0), Some(p1)) = (p0, p1) {
            z += (p1 - p0).length();
        }
    }
    z
}

fn wall_step(geometric: &FieldData, grid: &crate::topology::PartGrid, along: usize, wall: usize) -> Real {
    if grid.wall_count == 0 {
        return 0.0;
    }
    let w = wall.min(grid.wall_count - 1);
    let p0 = geometric.value(grid.node(along, w, 0)).map(|v| v.x);
    let p1 = geometric.value(grid.node(along, w + 1, 0)).map(|v| v.x);
    match (p0, p1) {
        (Some(p0), Some(p1)) => (p1 - p0).length(),
        _ => 0.0,
    }
}

// ─────────────────────────── straight field ───────────────────────────────

/// Straight coordinates: the trunk straightened onto the +z axis with its
/// geometric arc length preserved and origin at the proximal end; each
/// branch rendered straight with its geometric length, departing from the
/// straightened trunk frame in its recorded relative direction.
pub fn synthesize_straight(
    topology: &Topology,
    parts_geometry: &[PartGeometry],
) -> Result<FieldData> {
    let mut field = FieldData::undefined(FieldKind::Straight, topology.node_count());
    let branch_parts: Vec<usize> = topology.branches.iter().map(|b| b.part).collect();
    for (part_index, geometry) in parts_geometry.iter().enumerate() {
        if branch_parts.contains(&part_index) {
            continue;
        }
        let grid = &topology.parts[part_index];
        let path = &geometry.path;
        let rings = geometry.profile.rings();
        let length = path.length();
        let along_step = length / grid.along_count as Real;
        for along in 0..=grid.along_count {
            let t = (along_step * along as Real).min(length);
            let sample = path.sample(t)?;
            let (r2, r3) = (sample.d2.length(), sample.d3.length());
            for wall in 0..=grid.wall_count {
                for around in 0..grid.around_count {
                    let node = grid.node(along, wall, around);
                    if field.is_defined(node) {
                        continue;
                    }
                    let p = rings[wall].points[around];
                    let dp = rings[wall].derivatives[around];
                    let x = DVec3::new(p.x * r2, p.y * r3, t);
                    let d1 = DVec3::new(dp.x * r2, dp.y * r3, 0.0);
                    let d3_dir = DVec3::new(p.x * r2, p.y * r3, 0.0).normalize_or_zero();
                    let wall_thickness = geometry.profile.wall_thickness
                        * 0.5
                        * (r2 + r3)
                        / grid.wall_count.max(1) as Real;
                    field.set(
                        node,
                        NodeFieldValue {
                            x,
                            d1,
                            d2: DVec3::new(0.0, 0.0, along_step),
                            d3: d3_dir * wall_thickness,
                        },
                    );
                }
            }
            if !grid.apex.is_empty() && along == grid.along_count {
                let mean_radius = 0.5 * (r2 + r3);
                for (wall, &apex) in grid.apex.iter().enumerate() {
                    let depth = wall as Real / grid.wall_count.max(1) as Real;
                    field.set(
                        apex,
                        NodeFieldValue {
                            x: DVec3::new(0.0, 0.0, t + mean_radius * (0.6 + 0.4 * depth)),
                            d1: DVec3::ZERO,
                            d2: DVec3::new(0.0, 0.0, mean_radius * 0.5),
                            d3: DVec3::new(0.0, 0.0, mean_radius * 0.1),
                        },
                    );
                }
            }
        }
    }
    // branches: straight lines departing the straightened trunk
    for branch in &topology.branches {
        let parent = &topology.elements[branch.attachment.parent_element as usize];
        if let Some((origin, jacobian)) = evaluate_element(&field, parent, branch.attachment.xi) {
            let frame = orthonormal_frame(jacobian);
            let axis = direction_in_frame(branch.attachment.direction, frame);
            let grid = &topology.parts[branch.part];
            let geometry = &parts_geometry[branch.part];
            let radius = 0.5
                * (geometry.path.nodes()[0].d2.length() + geometry.path.nodes()[0].d3.length());
            let side = axis.cross(frame[2]).normalize_or_zero();
            let side = if side == DVec3::ZERO { frame[0] } else { side };
            fill_straight_tube(&mut field, grid, origin, axis, side, radius, branch.length);
        }
    }
    Ok(field)
}

// ─────────────────────────── split field ──────────────────────────────────

/// Split coordinates: geometric positions with derivative versions
/// duplicated on the designated margin columns so each half-surface can be
/// fitted without sharing a smoothed derivative across the seam. Primary
/// version carries the one-sided around-derivative from the first half,
/// the alternate from the second; positions are identical.
pub fn synthesize_split(
    topology: &Topology,
    geometric: &FieldData,
    part_index: usize,
    margin_around: [usize; 2],
) -> FieldData {
    let grid = &topology.parts[part_index];
    let mut field = FieldData::undefined(FieldKind::Split, topology.node_count());
    for along in 0..=grid.along_count {
        for wall in 0..=grid.wall_count {
            for around in 0..grid.around_count {
                let node = grid.node(along, wall, around);
                let Some(value) = geometric.value(node) else {
                    continue;
                };
                let mut value = *value;
                if margin_around.contains(&around) {
                    let next = geometric
                        .value(grid.node(along, wall, around + 1))
                        .map(|v| v.x);
                    let prev = geometric
                        .value(grid.node(along, wall, (around + grid.around_count - 1) % grid.around_count))
                        .map(|v| v.x);
                    if let (Some(next), Some(prev)) = (next, prev) {
                        let mut alternate = value;
                        value.d1 = next - value.x;
                        alternate.d1 = value.x - prev;
                        field.seam_alternates.insert(node, alternate);
                    }
                }
                field.set(node, value);
            }
        }
    }
    for &apex in &grid.apex {
        if let Some(value) = geometric.value(apex) {
            field.set(apex, *value);
        }
    }
    field
}

// ─────────────────────────── shared machinery ─────────────────────────────

/// Fill one part grid as a straight tube: rings of `radius` (outer surface)
/// swept from `origin` along `axis` for `length`, first ring node on `side`.
fn fill_straight_tube(
    field: &mut FieldData,
    grid: &crate::topology::PartGrid,
    origin: DVec3,
    axis: DVec3,
    side: DVec3,
    radius: Real,
    length: Real,
) {
    let axis = axis.normalize_or_zero();
    let side = crate::geom::reject_from(side, axis).normalize_or_zero();
    let up = axis.cross(side);
    let along_step = length / grid.along_count as Real;
    let dtheta = std::f64::consts::TAU / grid.around_count as Real;
    // wall rings from outer radius inward; innermost at 60% by convention
    let inner = 0.6 * radius;
    for along in 0..=grid.along_count {
        let centre = origin + axis * (along_step * along as Real);
        for wall in 0..=grid.wall_count {
            let r = inner + (radius - inner) * wall as Real / grid.wall_count.max(1) as Real;
            for around in 0..grid.around_count {
                let node = grid.node(along, wall, around);
                if field.is_defined(node) {
                    continue;
                }
                let theta = dtheta * around as Real;
                let radial = side * theta.cos() + up * theta.sin();
                field.set(
                    node,
                    NodeFieldValue {
                        x: centre + radial * r,
                        d1: (up * theta.cos() - side * theta.sin()) * r * dtheta,
                        d2: axis * along_step,
                        d3: radial * ((radius - inner) / grid.wall_count.max(1) as Real),
                    },
                );
            }
        }
    }
    for (wall, &apex) in grid.apex.iter().enumerate() {
        let depth = wall as Real / grid.wall_count.max(1) as Real;
        field.set(
            apex,
            NodeFieldValue {
                x: origin + axis * (length + radius * (0.6 + 0.4 * depth)),
                d1: DVec3::ZERO,
                d2: axis * (radius * 0.5),
                d3: axis * (radius * 0.1),
            },
        );
    }
}

/// Right-handed orthonormal frame [e1, e2, e3] nearest the jacobian columns.
fn orthonormal_frame(jacobian: [DVec3; 3]) -> [DVec3; 3] {
    let e1 = jacobian[0].normalize_or_zero();
    let e2 = crate::geom::reject_from(jacobian[1], e1).normalize_or_zero();
    let e3 = e1.cross(e2);
    [e1, e2, e3]
}

/// Map a relative direction expressed in a local frame to world space.
fn direction_in_frame(direction: DVec3, frame: [DVec3; 3]) -> DVec3 {
    (frame[0] * direction.x + frame[1] * direction.y + frame[2] * direction.z).normalize_or_zero()
}

/// Evaluate a field inside an element at local coordinates xi, returning
/// position and the three jacobian columns d/dxi. Uses the incomplete
/// tricubic Hermite basis over the element's corner values; unavailable
/// cross-derivative terms are zero. Returns None if any corner is undefined.
pub fn evaluate_element(
    field: &FieldData,
    element: &Element,
    xi: [Real; 3],
) -> Option<(DVec3, [DVec3; 3])> {
    let corner_nodes: [NodeIdx; 8] = match element.shape {
        ElementShape::Hexahedron => {
            let n = &element.nodes;
            [n[0], n[1], n[2], n[3], n[4], n[5], n[6], n[7]]
        }
        ElementShape::Wedge => {
            // collapsed hexahedron: apex line repeated at xi2 = 1
            let n = &element.nodes;
            [n[0], n[1], n[2], n[2], n[3], n[4], n[5], n[5]]
        }
        ElementShape::Pyramid => {
            let n = &element.nodes;
            [n[0], n[1], n[2], n[3], n[4], n[4], n[4], n[4]]
        }
    };
    let mut corners = [NodeFieldValue::default(); 8];
    for (i, &node) in corner_nodes.iter().enumerate() {
        corners[i] = *field.value(node)?;
    }

    let basis: [[Real; 4]; 3] = [
        cubic_hermite_basis(xi[0]),
        cubic_hermite_basis(xi[1]),
        cubic_hermite_basis(xi[2]),
    ];
    let dbasis: [[Real; 4]; 3] = [
        cubic_hermite_basis_derivatives(xi[0]),
        cubic_hermite_basis_derivatives(xi[1]),
        cubic_hermite_basis_derivatives(xi[2]),
    ];

    let mut x = DVec3::ZERO;
    let mut jacobian = [DVec3::ZERO; 3];
    for corner in 0..8usize {
        let bits = [corner & 1, (corner >> 1) & 1, (corner >> 2) & 1];
        let value = &corners[corner];
        // value-basis index 0/2, derivative-basis index 1/3 per direction
        let v = |dir: usize, table: &[[Real; 4]; 3]| table[dir][2 * bits[dir]];
        let d = |dir: usize, table: &[[Real; 4]; 3]| table[dir][2 * bits[dir] + 1];

        let terms: [(DVec3, [Real; 3]); 4] = [
            (value.x, [v(0, &basis), v(1, &basis), v(2, &basis)]),
            (value.d1, [d(0, &basis), v(1, &basis), v(2, &basis)]),
            (value.d2, [v(0, &basis), d(1, &basis), v(2, &basis)]),
            (value.d3, [v(0, &basis), v(1, &basis), d(2, &basis)]),
        ];
        for (vector, weights) in &terms {
            x += *vector * (weights[0] * weights[1] * weights[2]);
        }
        // jacobian: replace the basis of one direction with its derivative
        for dir in 0..3 {
            let pick = |i: usize, slot: usize| -> Real {
                let table = if i == dir { &dbasis } else { &basis };
                if slot == 0 {
                    v(i, table)
                } else {
                    d(i, table)
                }
            };
            jacobian[dir] += value.x * (pick(0, 0) * pick(1, 0) * pick(2, 0));
            jacobian[dir] += value.d1 * (pick(0, 1) * pick(1, 0) * pick(2, 0));
            jacobian[dir] += value.d2 * (pick(0, 0) * pick(1, 1) * pick(2, 0));
            jacobian[dir] += value.d3 * (pick(0, 0) * pick(1, 0) * pick(2, 1));
        }
    }
    Some((x, jacobian))
}

/// True if every element's jacobian at its centre is right-handed in this
/// field. Skips elements with undefined corners.
pub fn element_is_right_handed(field: &FieldData, element: &Element) -> Option<bool> {
    let (_, jacobian) = evaluate_element(field, element, [0.5, 0.5, 0.5])?;
    Some(crate::geom::is_right_handed(jacobian[0], jacobian[1], jacobian[2]))
}

/// Elements of the topology whose field jacobians are not right-handed.
pub fn left_handed_elements(field: &FieldData, topology: &Topology) -> Vec<ElementIdx> {
    topology
        .elements
        .iter()
        .enumerate()
        .filter(|(_, e)| element_is_right_handed(field, e) == Some(false))
        .map(|(i, _)| i as ElementIdx)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::straight_path;
    use crate::profile::{CrossSectionProfile, ProfileShape};
    use crate::topology::Topology;

    fn tube_fixture() -> (Topology, Vec<PartGeometry>) {
        let mut topo = Topology::new();
        topo.add_part("tube", 4, 1, 8, None, false).unwrap();
        let geometry = PartGeometry {
            path: straight_path(4.0, 1.0, 4),
            profile: CrossSectionProfile::new(
                ProfileShape::Ellipse { a: 1.0, b: 1.0 },
                8,
                0.2,
                vec![1.0],
                &[1, 4],
            )
            .unwrap(),
        };
        (topo, vec![geometry])
    }

    #[test]
    fn geometric_field_defines_every_node() {
        let (topo, geometry) = tube_fixture();
        let field = synthesize_geometric(&topo, &geometry).unwrap();
        assert_eq!(field.defined_count(), topo.node_count());
        for n in 0..topo.node_count() as u32 {
            assert!(field.value(n).unwrap().is_finite());
        }
    }

    #[test]
    fn geometric_elements_are_right_handed() {
        let (topo, geometry) = tube_fixture();
        let field = synthesize_geometric(&topo, &geometry).unwrap();
        assert!(left_handed_elements(&field, &topo).is_empty());
    }

    #[test]
    fn element_evaluation_reproduces_corners() {
        let (topo, geometry) = tube_fixture();
        let field = synthesize_geometric(&topo, &geometry).unwrap();
        let element = &topo.elements[0];
        let corner = field.value(element.nodes[0]).unwrap();
        let (x, jacobian) = evaluate_element(&field, element, [0.0, 0.0, 0.0]).unwrap();
        assert!((x - corner.x).length() < 1e-12);
        assert!((jacobian[0] - corner.d1).length() < 1e-12);
        assert!((jacobian[1] - corner.d2).length() < 1e-12);
        assert!((jacobian[2] - corner.d3).length() < 1e-12);
        let far = field.value(element.nodes[7]).unwrap();
        let (x1, _) = evaluate_element(&field, element, [1.0, 1.0, 1.0]).unwrap();
        assert!((x1 - far.x).length() < 1e-12);
    }

    #[test]
    fn material_field_is_unit_scale() {
        let (topo, _) = tube_fixture();
        let field = synthesize_material(&topo);
        assert_eq!(field.defined_count(), topo.node_count());
        for n in 0..topo.node_count() as u32 {
            let v = field.value(n).unwrap();
            assert!(v.x.z >= -1e-12 && v.x.z <= 1.0 + 1e-12);
            let r = (v.x - DVec3::new(0.0, 0.0, v.x.z)).length();
            assert!(r <= 0.5 + 1e-12);
        }
    }

    #[test]
    fn flat_field_preserves_circumference() {
        let (topo, geometry) = tube_fixture();
        let geometric = synthesize_geometric(&topo, &geometry).unwrap();
        let flat = synthesize_flat(&topo, &geometric, 0).unwrap();
        let grid = &topo.parts[0];
        for along in 0..=grid.along_count {
            for wall in 0..=grid.wall_count {
                // geometric circumference of this ring
                let mut circumference = 0.0;
                for around in 0..grid.around_count {
                    let a = geometric.value(grid.node(along, wall, around)).unwrap().x;
                    let b = geometric
                        .value(grid.node(along, wall, around + 1))
                        .unwrap()
                        .x;
                    circumference += (b - a).length();
                }
                // flat sheet width = alternate x at the seam
                let seam = grid.node(along, wall, 0);
                let width = flat.seam_alternates.get(&seam).unwrap().x.x;
                assert!(
                    (width - circumference).abs() <= 1e-6 * circumference,
                    "width {width} vs circumference {circumference}"
                );
            }
        }
    }

    #[test]
    fn split_field_duplicates_margin_derivatives_only() {
        let (topo, geometry) = tube_fixture();
        let geometric = synthesize_geometric(&topo, &geometry).unwrap();
        let split = synthesize_split(&topo, &geometric, 0, [0, 4]);
        let grid = &topo.parts[0];
        let margin_node = grid.node(1, 0, 0);
        let primary = split.value(margin_node).unwrap();
        let alternate = split.seam_alternates.get(&margin_node).unwrap();
        assert_eq!(primary.x, alternate.x);
        assert!(primary.d1 != alternate.d1);
        // off-margin nodes have no alternate
        assert!(!split.seam_alternates.contains_key(&grid.node(1, 0, 2)));
    }
}
