// Copyright 2025 Lars Brubaker
// License: MIT
//
// Central path: the 1-D cubic Hermite curve a cross-section is swept along.
//
// Each path node carries position x, along-path derivative d1, two lateral
// director derivatives d2/d3 spanning the cross-section plane, and cross
// derivatives d12/d13 giving the rate of change of d2/d3 along the path.
// By convention d2 points toward the first ring node of every swept
// cross-section; manual path edits must maintain this.

use glam::DVec3;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ScaffoldError};
use crate::geom::{reject_from, Real};
use crate::interp::{
    arc_length, interpolate_cubic_hermite, interpolate_cubic_hermite_derivative,
    locate_arc_distance, smooth_curve_derivatives, DerivativeScalingMode, SmoothingOptions,
    SmoothingOutcome,
};

/// One node of a central path.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct PathNode {
    pub x: DVec3,
    pub d1: DVec3,
    pub d2: DVec3,
    pub d3: DVec3,
    pub d12: DVec3,
    pub d13: DVec3,
}

impl PathNode {
    pub fn new(x: DVec3, d1: DVec3, d2: DVec3, d3: DVec3) -> Self {
        PathNode {
            x,
            d1,
            d2,
            d3,
            d12: DVec3::ZERO,
            d13: DVec3::ZERO,
        }
    }
}

/// Sampled state of the path at one parameter value.
#[derive(Clone, Copy, Debug)]
pub struct PathSample {
    pub x: DVec3,
    pub d1: DVec3,
    pub d2: DVec3,
    pub d3: DVec3,
    pub d12: DVec3,
    pub d13: DVec3,
}

/// An ordered sequence of path nodes interpolated as cubic Hermite sections.
#[derive(Clone, Debug)]
pub struct CentralPath {
    nodes: Vec<PathNode>,
    /// Cumulative arc lengths to each node; lengths[0] == 0.
    lengths: Vec<Real>,
}

impl CentralPath {
    /// Build a path from nodes. Directors must be non-degenerate at every
    /// node: non-zero and not parallel to d1.
    pub fn new(nodes: Vec<PathNode>) -> Result<Self> {
        if nodes.len() < 2 {
            return Err(ScaffoldError::Configuration(
                "central path needs at least 2 nodes".into(),
            ));
        }
        for (i, node) in nodes.iter().enumerate() {
            for (label, d) in [("d2", node.d2), ("d3", node.d3)] {
                if d.length_squared() == 0.0 {
                    return Err(ScaffoldError::Configuration(format!(
                        "central path node {i}: {label} is zero"
                    )));
                }
                if d.cross(node.d1).length_squared() == 0.0 {
                    return Err(ScaffoldError::Configuration(format!(
                        "central path node {i}: {label} is parallel to d1"
                    )));
                }
            }
        }
        let mut path = CentralPath {
            nodes,
            lengths: Vec::new(),
        };
        path.update_lengths();
        Ok(path)
    }

    fn update_lengths(&mut self) {
        self.lengths.clear();
        self.lengths.push(0.0);
        let mut total = 0.0;
        for e in 0..self.nodes.len() - 1 {
            total += arc_length(
                self.nodes[e].x,
                self.nodes[e].d1,
                self.nodes[e + 1].x,
                self.nodes[e + 1].d1,
            );
            self.lengths.push(total);
        }
    }

    pub fn nodes(&self) -> &[PathNode] {
        &self.nodes
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn element_count(&self) -> usize {
        self.nodes.len() - 1
    }

    /// Total arc length of the path.
    pub fn length(&self) -> Real {
        *self.lengths.last().unwrap_or(&0.0)
    }

    /// Sample position and directors at arc distance t in [0, length].
    pub fn sample(&self, t: Real) -> Result<PathSample> {
        let length = self.length();
        if !(0.0..=length).contains(&t) || !t.is_finite() {
            return Err(ScaffoldError::Range { t, length });
        }
        let nx: Vec<DVec3> = self.nodes.iter().map(|n| n.x).collect();
        let nd1: Vec<DVec3> = self.nodes.iter().map(|n| n.d1).collect();
        let (e, xi) = locate_arc_distance(&nx, &nd1, &self.lengths, t);
        Ok(self.sample_element(e, xi))
    }

    /// Sample at (element, xi) without range checking.
    pub fn sample_element(&self, e: usize, xi: Real) -> PathSample {
        let a = &self.nodes[e];
        let b = &self.nodes[e + 1];
        // d2/d3 interpolate as Hermite curves whose derivatives are d12/d13
        PathSample {
            x: interpolate_cubic_hermite(a.x, a.d1, b.x, b.d1, xi),
            d1: interpolate_cubic_hermite_derivative(a.x, a.d1, b.x, b.d1, xi),
            d2: interpolate_cubic_hermite(a.d2, a.d12, b.d2, b.d12, xi),
            d3: interpolate_cubic_hermite(a.d3, a.d13, b.d3, b.d13, xi),
            d12: interpolate_cubic_hermite_derivative(a.d2, a.d12, b.d2, b.d12, xi),
            d13: interpolate_cubic_hermite_derivative(a.d3, a.d13, b.d3, b.d13, xi),
        }
    }

    /// Recompute d1 from neighbouring node positions by length-weighted
    /// averaging. Bounded and idempotent once converged. Node count and
    /// ordering never change.
    pub fn smooth_derivatives(&mut self) -> SmoothingOutcome {
        let nx: Vec<DVec3> = self.nodes.iter().map(|n| n.x).collect();
        let mut nd1: Vec<DVec3> = self.nodes.iter().map(|n| n.d1).collect();
        let outcome = smooth_curve_derivatives(
            &nx,
            &mut nd1,
            DerivativeScalingMode::HarmonicMean,
            SmoothingOptions {
                fix_all_directions: true,
                ..Default::default()
            },
        );
        for (node, d1) in self.nodes.iter_mut().zip(nd1) {
            node.d1 = d1;
        }
        self.update_lengths();
        outcome
    }

    /// Project d2/d3 to be orthogonal to d1 at each node, preserving their
    /// magnitudes.
    pub fn make_side_derivatives_normal(&mut self) {
        for node in &mut self.nodes {
            let m2 = node.d2.length();
            let m3 = node.d3.length();
            node.d2 = crate::geom::set_magnitude(reject_from(node.d2, node.d1), m2);
            node.d3 = crate::geom::set_magnitude(reject_from(node.d3, node.d1), m3);
        }
    }

    /// Smooth d12/d13 along the path, treating the d2 (resp. d3) sequence as
    /// a curve whose derivatives are d12 (resp. d13), with the same bounded
    /// convergence rule as `smooth_derivatives`.
    pub fn smooth_side_cross_derivatives(&mut self) -> [SmoothingOutcome; 2] {
        let d2s: Vec<DVec3> = self.nodes.iter().map(|n| n.d2).collect();
        let d3s: Vec<DVec3> = self.nodes.iter().map(|n| n.d3).collect();
        let mut d12s: Vec<DVec3> = self.nodes.iter().map(|n| n.d12).collect();
        let mut d13s: Vec<DVec3> = self.nodes.iter().map(|n| n.d13).collect();
        let outcome2 = smooth_curve_derivatives(
            &d2s,
            &mut d12s,
            DerivativeScalingMode::ArithmeticMean,
            SmoothingOptions::default(),
        );
        let outcome3 = smooth_curve_derivatives(
            &d3s,
            &mut d13s,
            DerivativeScalingMode::ArithmeticMean,
            SmoothingOptions::default(),
        );
        for (i, node) in self.nodes.iter_mut().enumerate() {
            node.d12 = d12s[i];
            node.d13 = d13s[i];
        }
        [outcome2, outcome3]
    }
}

/// A straight default path along +z: length `length`, `elements` sections,
/// d2 along +x and d3 along +y scaled to `radius`. The starting point for
/// organs without a curated path.
pub fn straight_path(length: Real, radius: Real, elements: usize) -> CentralPath {
    let n = elements.max(1);
    let dz = length / n as Real;
    let nodes = (0..=n)
        .map(|i| {
            PathNode::new(
                DVec3::new(0.0, 0.0, dz * i as Real),
                DVec3::new(0.0, 0.0, dz),
                DVec3::new(radius, 0.0, 0.0),
                DVec3::new(0.0, radius, 0.0),
            )
        })
        .collect();
    CentralPath::new(nodes).expect("straight path nodes are non-degenerate")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bent_path() -> CentralPath {
        let nodes = vec![
            PathNode::new(DVec3::ZERO, DVec3::new(0.0, 0.0, 1.0), DVec3::X, DVec3::Y),
            PathNode::new(
                DVec3::new(0.0, 0.3, 1.0),
                DVec3::new(0.0, 0.4, 1.0),
                DVec3::X,
                DVec3::new(0.0, 1.0, -0.3),
            ),
            PathNode::new(
                DVec3::new(0.0, 1.0, 1.8),
                DVec3::new(0.0, 0.8, 0.6),
                DVec3::X,
                DVec3::new(0.0, 0.6, -0.8),
            ),
        ];
        CentralPath::new(nodes).unwrap()
    }

    #[test]
    fn rejects_too_few_nodes() {
        let node = PathNode::new(DVec3::ZERO, DVec3::Z, DVec3::X, DVec3::Y);
        assert!(CentralPath::new(vec![node]).is_err());
    }

    #[test]
    fn rejects_degenerate_directors() {
        let good = PathNode::new(DVec3::ZERO, DVec3::Z, DVec3::X, DVec3::Y);
        let mut bad = good;
        bad.x = DVec3::new(0.0, 0.0, 1.0);
        bad.d2 = DVec3::ZERO;
        assert!(CentralPath::new(vec![good, bad]).is_err());
        let mut parallel = good;
        parallel.x = DVec3::new(0.0, 0.0, 1.0);
        parallel.d3 = DVec3::new(0.0, 0.0, 2.0);
        assert!(CentralPath::new(vec![good, parallel]).is_err());
    }

    #[test]
    fn sample_out_of_range_fails() {
        let path = straight_path(4.0, 1.0, 4);
        assert!(path.sample(-0.1).is_err());
        assert!(path.sample(path.length() + 0.1).is_err());
        assert!(path.sample(path.length()).is_ok());
    }

    #[test]
    fn straight_path_samples_linearly() {
        let path = straight_path(4.0, 1.0, 4);
        let s = path.sample(2.0).unwrap();
        assert!((s.x - DVec3::new(0.0, 0.0, 2.0)).length() < 1e-9);
        assert!((s.d2 - DVec3::X).length() < 1e-9);
    }

    #[test]
    fn smoothing_preserves_node_count_and_is_idempotent() {
        let mut path = bent_path();
        let count = path.node_count();
        let first = path.smooth_derivatives();
        assert!(first.converged);
        assert_eq!(path.node_count(), count);
        let before: Vec<DVec3> = path.nodes().iter().map(|n| n.d1).collect();
        path.smooth_derivatives();
        let scale = path.length();
        for (node, d1) in path.nodes().iter().zip(before) {
            assert!((node.d1 - d1).abs().max_element() <= 1.0e-6 * scale);
        }
    }

    #[test]
    fn side_derivatives_become_normal() {
        let mut path = bent_path();
        path.make_side_derivatives_normal();
        for node in path.nodes() {
            assert!(node.d2.dot(node.d1).abs() < 1e-9 * node.d1.length() * node.d2.length());
            assert!(node.d3.dot(node.d1).abs() < 1e-9 * node.d1.length() * node.d3.length());
        }
    }
}
