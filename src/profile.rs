// Copyright 2025 Lars Brubaker
// License: MIT
//
// Cross-section profiles: the 2-D boundary swept along a central path.
//
// A profile is an ordered ring of boundary points in the (d2, d3) plane,
// starting at the +d2 axis and winding counter-clockwise, plus optional
// nested rings for through-wall layering. Ring point counts are fixed per
// organ/species; layer counts must be one of the organ's supported values.

use glam::DVec2;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ScaffoldError};
use crate::geom::Real;

/// Boundary shape of a cross-section.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ProfileShape {
    /// Ellipse with semi-axes (a, b) along d2, d3.
    Ellipse { a: Real, b: Real },
    /// Superellipse |x/a|^n + |y/b|^n = 1; n = 2 is the ellipse.
    Superellipse { a: Real, b: Real, exponent: Real },
    /// Closed piecewise-cubic boundary through control points (local 2-D),
    /// interpolated with loop-smoothed derivatives.
    PiecewiseCubic { control_points: Vec<DVec2> },
}

/// One cross-section: an outer boundary, angular resolution, and through-wall
/// layer thickness fractions (innermost first) summing to 1.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CrossSectionProfile {
    pub shape: ProfileShape,
    pub points_around: usize,
    /// Wall thickness as a fraction of the boundary radius.
    pub wall_thickness: Real,
    /// Layer fractions, innermost (luminal) to outermost; sum to 1.
    pub layer_fractions: Vec<Real>,
}

/// One evaluated ring: points and their d/dtheta derivatives, ordered
/// counter-clockwise from the +d2 axis.
#[derive(Clone, Debug)]
pub struct ProfileRing {
    pub points: Vec<DVec2>,
    pub derivatives: Vec<DVec2>,
}

impl CrossSectionProfile {
    pub fn new(
        shape: ProfileShape,
        points_around: usize,
        wall_thickness: Real,
        layer_fractions: Vec<Real>,
        supported_layer_counts: &[usize],
    ) -> Result<Self> {
        if points_around < 3 {
            return Err(ScaffoldError::Configuration(format!(
                "profile needs at least 3 points around, got {points_around}"
            )));
        }
        if !supported_layer_counts.contains(&layer_fractions.len()) {
            return Err(ScaffoldError::Configuration(format!(
                "unsupported through-wall layer count {} (supported: {supported_layer_counts:?})",
                layer_fractions.len()
            )));
        }
        let sum: Real = layer_fractions.iter().sum();
        if (sum - 1.0).abs() > 1.0e-9 {
            return Err(ScaffoldError::Configuration(format!(
                "layer fractions must sum to 1, got {sum}"
            )));
        }
        if layer_fractions.iter().any(|&f| f <= 0.0) {
            return Err(ScaffoldError::Configuration(
                "layer fractions must be positive".into(),
            ));
        }
        Ok(CrossSectionProfile {
            shape,
            points_around,
            wall_thickness,
            layer_fractions,
        })
    }

    pub fn layer_count(&self) -> usize {
        self.layer_fractions.len()
    }

    /// Ring count through the wall: layers + 1 surfaces for layered profiles,
    /// a single ring when layer count is 1 and wall thickness is zero.
    pub fn ring_count(&self) -> usize {
        if self.wall_thickness > 0.0 {
            self.layer_count() + 1
        } else {
            1
        }
    }

    /// Evaluate all rings, innermost first. The outer boundary ring comes
    /// from the shape; inner rings are scaled toward the centre by the
    /// cumulative layer fractions of the wall thickness.
    pub fn rings(&self) -> Vec<ProfileRing> {
        let outer = self.boundary_ring();
        if self.ring_count() == 1 {
            return vec![outer];
        }
        // cumulative inward offsets: innermost surface at full wall depth
        let mut rings = Vec::with_capacity(self.layer_count() + 1);
        let mut depth = self.wall_thickness;
        rings.push(scale_ring(&outer, 1.0 - depth));
        for fraction in &self.layer_fractions {
            depth -= fraction * self.wall_thickness;
            rings.push(scale_ring(&outer, 1.0 - depth.max(0.0)));
        }
        rings
    }

    /// The outer boundary ring of the profile.
    pub fn boundary_ring(&self) -> ProfileRing {
        let n = self.points_around;
        let mut points = Vec::with_capacity(n);
        let mut derivatives = Vec::with_capacity(n);
        let dtheta = std::f64::consts::TAU / n as Real;
        match &self.shape {
            ProfileShape::Ellipse { a, b } => {
                for i in 0..n {
                    let theta = dtheta * i as Real;
                    points.push(DVec2::new(a * theta.cos(), b * theta.sin()));
                    derivatives
                        .push(DVec2::new(-a * theta.sin(), b * theta.cos()) * dtheta);
                }
            }
            ProfileShape::Superellipse { a, b, exponent } => {
                let p = 2.0 / exponent;
                for i in 0..n {
                    let theta = dtheta * i as Real;
                    let (s, c) = theta.sin_cos();
                    let x = a * c.abs().powf(p) * c.signum();
                    let y = b * s.abs().powf(p) * s.signum();
                    points.push(DVec2::new(x, y));
                }
                // derivatives by central differences: the analytic form is
                // singular on the axes for exponent > 2
                for i in 0..n {
                    let prev = points[(i + n - 1) % n];
                    let next = points[(i + 1) % n];
                    derivatives.push((next - prev) * 0.5);
                }
            }
            ProfileShape::PiecewiseCubic { control_points } => {
                let m = control_points.len();
                // loop derivatives from neighbour chords
                let cd: Vec<DVec2> = (0..m)
                    .map(|i| {
                        (control_points[(i + 1) % m] - control_points[(i + m - 1) % m]) * 0.5
                    })
                    .collect();
                for i in 0..n {
                    let u = i as Real * m as Real / n as Real;
                    let e = (u as usize) % m;
                    let xi = u - u.floor();
                    let (p1, p2) = (control_points[e], control_points[(e + 1) % m]);
                    let (q1, q2) = (cd[e], cd[(e + 1) % m]);
                    let xi2 = xi * xi;
                    let xi3 = xi2 * xi;
                    let f = [
                        1.0 - 3.0 * xi2 + 2.0 * xi3,
                        xi - 2.0 * xi2 + xi3,
                        3.0 * xi2 - 2.0 * xi3,
                        -xi2 + xi3,
                    ];
                    let df = [
                        -6.0 * xi + 6.0 * xi2,
                        1.0 - 4.0 * xi + 3.0 * xi2,
                        6.0 * xi - 6.0 * xi2,
                        -2.0 * xi + 3.0 * xi2,
                    ];
                    points.push(p1 * f[0] + q1 * f[1] + p2 * f[2] + q2 * f[3]);
                    derivatives.push(
                        (p1 * df[0] + q1 * df[1] + p2 * df[2] + q2 * df[3]) * (m as Real / n as Real),
                    );
                }
            }
        }
        ProfileRing {
            points,
            derivatives,
        }
    }

    /// Perimeter of the outer boundary, by summing chord-midpoint arc
    /// approximations over the angular sampling.
    pub fn boundary_perimeter(&self) -> Real {
        let ring = self.boundary_ring();
        let n = ring.points.len();
        (0..n)
            .map(|i| (ring.points[(i + 1) % n] - ring.points[i]).length())
            .sum()
    }
}

fn scale_ring(ring: &ProfileRing, factor: Real) -> ProfileRing {
    ProfileRing {
        points: ring.points.iter().map(|p| *p * factor).collect(),
        derivatives: ring.derivatives.iter().map(|d| *d * factor).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ellipse(layers: Vec<Real>, supported: &[usize]) -> Result<CrossSectionProfile> {
        CrossSectionProfile::new(
            ProfileShape::Ellipse { a: 1.0, b: 1.0 },
            8,
            0.25,
            layers,
            supported,
        )
    }

    #[test]
    fn rejects_unsupported_layer_count() {
        let err = ellipse(vec![0.5, 0.5], &[1, 4]);
        assert!(matches!(err, Err(ScaffoldError::Configuration(_))));
    }

    #[test]
    fn rejects_fractions_not_summing_to_one() {
        let err = CrossSectionProfile::new(
            ProfileShape::Ellipse { a: 1.0, b: 1.0 },
            8,
            0.25,
            vec![0.3, 0.3, 0.3, 0.3],
            &[1, 4],
        );
        assert!(err.is_err());
    }

    #[test]
    fn single_layer_zero_wall_gives_one_ring() {
        let profile = CrossSectionProfile::new(
            ProfileShape::Ellipse { a: 1.0, b: 1.0 },
            8,
            0.0,
            vec![1.0],
            &[1],
        )
        .unwrap();
        assert_eq!(profile.rings().len(), 1);
    }

    #[test]
    fn four_layers_give_five_rings_inner_to_outer() {
        let profile = ellipse(vec![0.35, 0.15, 0.35, 0.15], &[1, 4]).unwrap();
        let rings = profile.rings();
        assert_eq!(rings.len(), 5);
        // radii increase monotonically, outermost is the boundary
        let radii: Vec<Real> = rings.iter().map(|r| r.points[0].length()).collect();
        for pair in radii.windows(2) {
            assert!(pair[0] < pair[1]);
        }
        assert!((radii[4] - 1.0).abs() < 1e-12);
        assert!((radii[0] - 0.75).abs() < 1e-12);
    }

    #[test]
    fn ellipse_ring_starts_on_first_axis() {
        let profile = ellipse(vec![1.0], &[1]).unwrap();
        let ring = profile.boundary_ring();
        assert!((ring.points[0] - DVec2::new(1.0, 0.0)).length() < 1e-12);
        assert_eq!(ring.points.len(), 8);
        assert_eq!(ring.derivatives.len(), 8);
    }

    #[test]
    fn superellipse_exponent_two_matches_ellipse() {
        let sup = CrossSectionProfile::new(
            ProfileShape::Superellipse {
                a: 2.0,
                b: 1.0,
                exponent: 2.0,
            },
            12,
            0.0,
            vec![1.0],
            &[1],
        )
        .unwrap();
        let ell = CrossSectionProfile::new(
            ProfileShape::Ellipse { a: 2.0, b: 1.0 },
            12,
            0.0,
            vec![1.0],
            &[1],
        )
        .unwrap();
        for (p, q) in sup
            .boundary_ring()
            .points
            .iter()
            .zip(ell.boundary_ring().points.iter())
        {
            assert!((*p - *q).length() < 1e-9);
        }
    }

    #[test]
    fn piecewise_cubic_passes_through_controls() {
        let square = vec![
            DVec2::new(1.0, 0.0),
            DVec2::new(0.0, 1.0),
            DVec2::new(-1.0, 0.0),
            DVec2::new(0.0, -1.0),
        ];
        let profile = CrossSectionProfile::new(
            ProfileShape::PiecewiseCubic {
                control_points: square.clone(),
            },
            8,
            0.0,
            vec![1.0],
            &[1],
        )
        .unwrap();
        let ring = profile.boundary_ring();
        // every second sample lands on a control point
        for (i, control) in square.iter().enumerate() {
            assert!((ring.points[i * 2] - *control).length() < 1e-9);
        }
    }
}
