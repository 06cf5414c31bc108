// Copyright 2025 Lars Brubaker
// License: MIT
//
// Cubic Hermite interpolation over curves of 3-D points.
//
// All curves are sequences of (value, derivative) node pairs; each element
// between consecutive nodes is a cubic Hermite section parameterized by
// xi in [0, 1]. Arc lengths use 4-point Gauss-Legendre quadrature.

use glam::DVec3;

use crate::geom::{set_magnitude, Real, GAUSS_WT4, GAUSS_XI4};

/// Maximum iterations for the bounded smoothing / arc-length loops.
pub const MAX_SMOOTHING_ITERATIONS: usize = 100;
/// Relative convergence tolerance for the bounded smoothing loops.
pub const SMOOTHING_TOLERANCE: Real = 1.0e-6;

/// How a node derivative magnitude is derived from adjacent arc lengths.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DerivativeScalingMode {
    ArithmeticMean,
    HarmonicMean,
}

/// Basis function values for (v1, d1, v2, d2) at xi.
#[inline]
pub fn cubic_hermite_basis(xi: Real) -> [Real; 4] {
    let xi2 = xi * xi;
    let xi3 = xi2 * xi;
    [
        1.0 - 3.0 * xi2 + 2.0 * xi3,
        xi - 2.0 * xi2 + xi3,
        3.0 * xi2 - 2.0 * xi3,
        -xi2 + xi3,
    ]
}

/// First derivatives of the basis functions at xi.
#[inline]
pub fn cubic_hermite_basis_derivatives(xi: Real) -> [Real; 4] {
    let xi2 = xi * xi;
    [
        -6.0 * xi + 6.0 * xi2,
        1.0 - 4.0 * xi + 3.0 * xi2,
        6.0 * xi - 6.0 * xi2,
        -2.0 * xi + 3.0 * xi2,
    ]
}

/// Interpolated value on one Hermite section.
pub fn interpolate_cubic_hermite(v1: DVec3, d1: DVec3, v2: DVec3, d2: DVec3, xi: Real) -> DVec3 {
    let [f1, f2, f3, f4] = cubic_hermite_basis(xi);
    v1 * f1 + d1 * f2 + v2 * f3 + d2 * f4
}

/// Interpolated derivative (w.r.t. xi) on one Hermite section.
pub fn interpolate_cubic_hermite_derivative(
    v1: DVec3,
    d1: DVec3,
    v2: DVec3,
    d2: DVec3,
    xi: Real,
) -> DVec3 {
    let [f1, f2, f3, f4] = cubic_hermite_basis_derivatives(xi);
    v1 * f1 + d1 * f2 + v2 * f3 + d2 * f4
}

/// Interpolated second derivative (w.r.t. xi) on one Hermite section.
pub fn interpolate_cubic_hermite_second_derivative(
    v1: DVec3,
    d1: DVec3,
    v2: DVec3,
    d2: DVec3,
    xi: Real,
) -> DVec3 {
    let f1 = -6.0 + 12.0 * xi;
    let f2 = -4.0 + 6.0 * xi;
    let f3 = 6.0 - 12.0 * xi;
    let f4 = -2.0 + 6.0 * xi;
    v1 * f1 + d1 * f2 + v2 * f3 + d2 * f4
}

/// Value at xi for quadratic Hermite-Lagrange interpolation from v1, d1 to v2.
pub fn interpolate_hermite_lagrange(v1: DVec3, d1: DVec3, v2: DVec3, xi: Real) -> DVec3 {
    let xi2 = xi * xi;
    v1 * (1.0 - xi2) + d1 * (xi - xi2) + v2 * xi2
}

/// Derivative at xi for quadratic Hermite-Lagrange interpolation from v1, d1 to v2.
pub fn interpolate_hermite_lagrange_derivative(v1: DVec3, d1: DVec3, v2: DVec3, xi: Real) -> DVec3 {
    v1 * (-2.0 * xi) + d1 * (1.0 - 2.0 * xi) + v2 * (2.0 * xi)
}

/// Value at xi for quadratic Lagrange-Hermite interpolation from v1 to v2, d2.
pub fn interpolate_lagrange_hermite(v1: DVec3, v2: DVec3, d2: DVec3, xi: Real) -> DVec3 {
    let xi2 = xi * xi;
    v1 * (1.0 - 2.0 * xi + xi2) + v2 * (2.0 * xi - xi2) + d2 * (-xi + xi2)
}

/// Derivative at xi for quadratic Lagrange-Hermite interpolation from v1 to v2, d2.
pub fn interpolate_lagrange_hermite_derivative(v1: DVec3, v2: DVec3, d2: DVec3, xi: Real) -> DVec3 {
    v1 * (-2.0 + 2.0 * xi) + v2 * (2.0 - 2.0 * xi) + d2 * (-1.0 + 2.0 * xi)
}

/// Approximate arc length of one Hermite section by 4-point Gauss quadrature.
pub fn arc_length(v1: DVec3, d1: DVec3, v2: DVec3, d2: DVec3) -> Real {
    let mut length = 0.0;
    for i in 0..4 {
        let dm = interpolate_cubic_hermite_derivative(v1, d1, v2, d2, GAUSS_XI4[i]);
        length += GAUSS_WT4[i] * dm.length();
    }
    length
}

/// Arc length of one Hermite section from xi = 0 up to the given xi,
/// by re-parameterizing the truncated section.
pub fn arc_length_to_xi(v1: DVec3, d1: DVec3, v2: DVec3, d2: DVec3, xi: Real) -> Real {
    let d1m = d1 * xi;
    let v2m = interpolate_cubic_hermite(v1, d1, v2, d2, xi);
    let d2m = interpolate_cubic_hermite_derivative(v1, d1, v2, d2, xi) * xi;
    arc_length(v1, d1m, v2m, d2m)
}

/// Arc length with d1, d2 iteratively rescaled to the arc length itself.
/// Converges to the length of the section whose end derivatives are unit
/// tangents scaled by that length.
pub fn compute_arc_length_rescaling_derivatives(
    v1: DVec3,
    d1: DVec3,
    v2: DVec3,
    d2: DVec3,
) -> Real {
    let mut last = (v2 - v1).length();
    let u1 = d1.normalize_or_zero();
    let u2 = d2.normalize_or_zero();
    let mut length = last;
    for iter in 0..MAX_SMOOTHING_ITERATIONS {
        length = arc_length(v1, u1 * last, v2, u2 * last);
        if iter > 9 {
            // damp slow oscillation
            length = 0.8 * length + 0.2 * last;
        }
        if (length - last).abs() < SMOOTHING_TOLERANCE * length {
            return length;
        }
        last = length;
    }
    log::warn!(
        "arc length iteration cap reached, residual {:e}",
        (length - last).abs()
    );
    length
}

/// Total arc length of a curve of nodes with derivatives.
pub fn curve_length(nx: &[DVec3], nd1: &[DVec3]) -> Real {
    let mut total = 0.0;
    for e in 0..nx.len().saturating_sub(1) {
        total += arc_length(nx[e], nd1[e], nx[e + 1], nd1[e + 1]);
    }
    total
}

/// Scalar curvature (1/R) of a Hermite section at xi, measured against a
/// unit radial vector normal to the curve tangent.
pub fn curvature(
    v1: DVec3,
    d1: DVec3,
    v2: DVec3,
    d2: DVec3,
    radial: DVec3,
    xi: Real,
) -> Real {
    let tangent = interpolate_cubic_hermite_derivative(v1, d1, v2, d2, xi);
    let d_tangent = interpolate_cubic_hermite_second_derivative(v1, d1, v2, d2, xi);
    let mag_sq = tangent.length_squared();
    if mag_sq > 0.0 {
        d_tangent.dot(radial) / mag_sq
    } else {
        0.0
    }
}

/// One point resampled from a curve: element index, xi within it, and the
/// derivative scale factor dxi(in)/dxi(out).
#[derive(Clone, Copy, Debug)]
pub struct CurveLocation {
    pub element: usize,
    pub xi: Real,
    pub derivative_scale: Real,
}

/// Resample a Hermite curve to `elements_count_out` equal-arc-length elements.
/// Returns new points, new derivatives, and the source location of each point.
pub fn sample_curve(
    nx: &[DVec3],
    nd1: &[DVec3],
    elements_count_out: usize,
) -> (Vec<DVec3>, Vec<DVec3>, Vec<CurveLocation>) {
    assert!(nx.len() >= 2 && nx.len() == nd1.len() && elements_count_out > 0);
    let elements_in = nx.len() - 1;
    let mut lengths = Vec::with_capacity(elements_in + 1);
    lengths.push(0.0);
    let mut total = 0.0;
    for e in 0..elements_in {
        total += arc_length(nx[e], nd1[e], nx[e + 1], nd1[e + 1]);
        lengths.push(total);
    }
    let element_length = total / elements_count_out as Real;

    let mut px = Vec::with_capacity(elements_count_out + 1);
    let mut pd1 = Vec::with_capacity(elements_count_out + 1);
    let mut locations = Vec::with_capacity(elements_count_out + 1);
    for n in 0..=elements_count_out {
        let distance = element_length * n as Real;
        let (element, xi) = locate_arc_distance(nx, nd1, &lengths, distance);
        let x = interpolate_cubic_hermite(nx[element], nd1[element], nx[element + 1], nd1[element + 1], xi);
        let d = interpolate_cubic_hermite_derivative(
            nx[element],
            nd1[element],
            nx[element + 1],
            nd1[element + 1],
            xi,
        );
        // rescale derivative to the out element length
        let in_length = lengths[element + 1] - lengths[element];
        let scale = if in_length > 0.0 {
            element_length / in_length
        } else {
            1.0
        };
        px.push(x);
        pd1.push(d * scale);
        locations.push(CurveLocation {
            element,
            xi,
            derivative_scale: scale,
        });
    }
    (px, pd1, locations)
}

/// Find the (element, xi) at the given arc distance along the curve,
/// refining xi by bisection on arc length within the containing element.
pub fn locate_arc_distance(
    nx: &[DVec3],
    nd1: &[DVec3],
    lengths: &[Real],
    distance: Real,
) -> (usize, Real) {
    let elements_in = nx.len() - 1;
    let total = lengths[elements_in];
    let distance = distance.clamp(0.0, total);
    let mut element = elements_in - 1;
    for e in 0..elements_in {
        if distance <= lengths[e + 1] {
            element = e;
            break;
        }
    }
    let target = distance - lengths[element];
    let section_length = lengths[element + 1] - lengths[element];
    if section_length <= 0.0 {
        return (element, 0.0);
    }
    let (v1, d1, v2, d2) = (nx[element], nd1[element], nx[element + 1], nd1[element + 1]);
    let mut lo = 0.0;
    let mut hi = 1.0;
    let mut xi = target / section_length;
    for _ in 0..MAX_SMOOTHING_ITERATIONS {
        let len = arc_length_to_xi(v1, d1, v2, d2, xi);
        if (len - target).abs() < SMOOTHING_TOLERANCE * section_length {
            break;
        }
        if len < target {
            lo = xi;
        } else {
            hi = xi;
        }
        xi = 0.5 * (lo + hi);
    }
    (element, xi)
}

/// Outcome of a bounded smoothing loop.
#[derive(Clone, Copy, Debug)]
pub struct SmoothingOutcome {
    pub iterations: usize,
    pub converged: bool,
    /// Largest derivative component change in the final iteration.
    pub max_change: Real,
}

/// Options for [`smooth_curve_derivatives`].
#[derive(Clone, Copy, Debug, Default)]
pub struct SmoothingOptions {
    /// Only adjust magnitudes, keeping every direction fixed.
    pub fix_all_directions: bool,
    /// Keep the start derivative entirely fixed.
    pub fix_start_derivative: bool,
    /// Keep the end derivative entirely fixed.
    pub fix_end_derivative: bool,
    /// Keep the start direction, adjusting magnitude only.
    pub fix_start_direction: bool,
    /// Keep the end direction, adjusting magnitude only.
    pub fix_end_direction: bool,
}

/// Smooth curve derivatives nd1 to vary smoothly and stay near arc length.
///
/// Interior node directions become the length-weighted mean of the deltas to
/// each neighbour; magnitudes come from the arithmetic or harmonic mean of
/// adjacent arc lengths. End derivatives use the quadratic Lagrange-Hermite /
/// Hermite-Lagrange blends unless fixed. The loop is bounded by
/// [`MAX_SMOOTHING_ITERATIONS`] and converges on [`SMOOTHING_TOLERANCE`];
/// overrunning the cap logs a warning and returns the best-effort result.
pub fn smooth_curve_derivatives(
    nx: &[DVec3],
    nd1: &mut [DVec3],
    mode: DerivativeScalingMode,
    options: SmoothingOptions,
) -> SmoothingOutcome {
    let nodes_count = nx.len();
    assert!(nodes_count >= 2 && nd1.len() == nodes_count);
    let elements_count = nodes_count - 1;

    if elements_count == 1 && !options.fix_start_derivative && !options.fix_end_derivative {
        if !(options.fix_all_directions || options.fix_start_direction || options.fix_end_direction)
        {
            let delta = nx[1] - nx[0];
            nd1[0] = delta;
            nd1[1] = delta;
            return SmoothingOutcome {
                iterations: 0,
                converged: true,
                max_change: 0.0,
            };
        }
        if options.fix_all_directions || (options.fix_start_direction && options.fix_end_direction)
        {
            let length = compute_arc_length_rescaling_derivatives(nx[0], nd1[0], nx[1], nd1[1]);
            nd1[0] = set_magnitude(nd1[0], length);
            nd1[1] = set_magnitude(nd1[1], length);
            return SmoothingOutcome {
                iterations: 0,
                converged: true,
                max_change: 0.0,
            };
        }
    }

    let mut max_change = 0.0;
    for iteration in 0..MAX_SMOOTHING_ITERATIONS {
        let last: Vec<DVec3> = nd1.to_vec();
        let arc_lengths: Vec<Real> = (0..elements_count)
            .map(|e| arc_length(nx[e], last[e], nx[e + 1], last[e + 1]))
            .collect();

        if !options.fix_start_derivative {
            if options.fix_all_directions || options.fix_start_direction {
                let mag = 2.0 * arc_lengths[0] - last[1].length();
                nd1[0] = if mag > 0.0 {
                    set_magnitude(nd1[0], mag)
                } else {
                    DVec3::ZERO
                };
            } else {
                nd1[0] = interpolate_lagrange_hermite_derivative(nx[0], nx[1], last[1], 0.0);
            }
        }
        for n in 1..nodes_count - 1 {
            let nm = n - 1;
            if !options.fix_all_directions {
                // mean of neighbour deltas, weighted toward the nearer one;
                // equal weights on a degenerate (zero-length) pair
                let dirm = nx[n] - nx[nm];
                let dirp = nx[n + 1] - nx[n];
                let sum = arc_lengths[nm] + arc_lengths[n];
                let (wm, wp) = if sum > 0.0 {
                    (arc_lengths[n] / sum, arc_lengths[nm] / sum)
                } else {
                    (0.5, 0.5)
                };
                nd1[n] = dirm * wm + dirp * wp;
            }
            let mag = match mode {
                DerivativeScalingMode::ArithmeticMean => 0.5 * (arc_lengths[nm] + arc_lengths[n]),
                DerivativeScalingMode::HarmonicMean => {
                    if arc_lengths[nm] > 0.0 && arc_lengths[n] > 0.0 {
                        2.0 / (1.0 / arc_lengths[nm] + 1.0 / arc_lengths[n])
                    } else {
                        0.0
                    }
                }
            };
            nd1[n] = set_magnitude(nd1[n], mag);
        }
        if !options.fix_end_derivative {
            let e = elements_count - 1;
            if options.fix_all_directions || options.fix_end_direction {
                let mag = 2.0 * arc_lengths[e] - last[e].length();
                nd1[nodes_count - 1] = if mag > 0.0 {
                    set_magnitude(nd1[nodes_count - 1], mag)
                } else {
                    DVec3::ZERO
                };
            } else {
                nd1[nodes_count - 1] =
                    interpolate_hermite_lagrange_derivative(nx[e], last[e], nx[e + 1], 1.0);
            }
        }

        max_change = nd1
            .iter()
            .zip(last.iter())
            .map(|(a, b)| (*a - *b).abs().max_element())
            .fold(0.0, Real::max);
        let scale = curve_length(nx, nd1).max(1.0e-300);
        if max_change < SMOOTHING_TOLERANCE * scale {
            return SmoothingOutcome {
                iterations: iteration + 1,
                converged: true,
                max_change,
            };
        }
    }
    log::warn!(
        "derivative smoothing iteration cap reached, max change {:e}",
        max_change
    );
    SmoothingOutcome {
        iterations: MAX_SMOOTHING_ITERATIONS,
        converged: false,
        max_change,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basis_partition_of_unity_at_nodes() {
        let b0 = cubic_hermite_basis(0.0);
        assert_eq!(b0, [1.0, 0.0, 0.0, 0.0]);
        let b1 = cubic_hermite_basis(1.0);
        assert_eq!(b1, [0.0, 0.0, 1.0, 0.0]);
    }

    #[test]
    fn derivative_basis_reproduces_node_derivatives() {
        let db0 = cubic_hermite_basis_derivatives(0.0);
        assert_eq!(db0, [0.0, 1.0, 0.0, 0.0]);
        let db1 = cubic_hermite_basis_derivatives(1.0);
        assert_eq!(db1, [0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn straight_section_arc_length_is_chord() {
        let v1 = DVec3::ZERO;
        let v2 = DVec3::new(2.0, 0.0, 0.0);
        let d = DVec3::new(2.0, 0.0, 0.0);
        let length = arc_length(v1, d, v2, d);
        assert!((length - 2.0).abs() < 1e-12);
    }

    #[test]
    fn arc_length_to_xi_is_monotone() {
        let v1 = DVec3::ZERO;
        let v2 = DVec3::new(1.0, 1.0, 0.0);
        let d1 = DVec3::new(1.5, 0.0, 0.0);
        let d2 = DVec3::new(0.0, 1.5, 0.0);
        let mut last = 0.0;
        for i in 1..=10 {
            let len = arc_length_to_xi(v1, d1, v2, d2, i as Real / 10.0);
            assert!(len > last);
            last = len;
        }
    }

    #[test]
    fn sample_curve_preserves_endpoints() {
        let nx = vec![
            DVec3::ZERO,
            DVec3::new(1.0, 0.5, 0.0),
            DVec3::new(2.0, 0.0, 0.0),
        ];
        let nd1 = vec![DVec3::X; 3];
        let (px, pd1, locations) = sample_curve(&nx, &nd1, 4);
        assert_eq!(px.len(), 5);
        assert_eq!(pd1.len(), 5);
        assert_eq!(locations.len(), 5);
        assert!((px[0] - nx[0]).length() < 1e-9);
        assert!((px[4] - nx[2]).length() < 1e-9);
    }

    #[test]
    fn smoothing_converges_and_is_idempotent() {
        let nx = vec![
            DVec3::ZERO,
            DVec3::new(1.0, 0.2, 0.0),
            DVec3::new(2.1, -0.1, 0.0),
            DVec3::new(3.0, 0.3, 0.0),
        ];
        let mut nd1 = vec![DVec3::X; 4];
        let first = smooth_curve_derivatives(
            &nx,
            &mut nd1,
            DerivativeScalingMode::ArithmeticMean,
            SmoothingOptions::default(),
        );
        assert!(first.converged);
        let before = nd1.clone();
        let second = smooth_curve_derivatives(
            &nx,
            &mut nd1,
            DerivativeScalingMode::ArithmeticMean,
            SmoothingOptions::default(),
        );
        assert!(second.converged);
        let scale = curve_length(&nx, &nd1);
        for (a, b) in nd1.iter().zip(before.iter()) {
            assert!((*a - *b).abs().max_element() <= SMOOTHING_TOLERANCE * scale);
        }
    }

    #[test]
    fn harmonic_mean_magnitude_below_arithmetic() {
        let nx = vec![
            DVec3::ZERO,
            DVec3::new(1.0, 0.0, 0.0),
            DVec3::new(4.0, 0.0, 0.0),
        ];
        let mut nd_a = vec![DVec3::X; 3];
        let mut nd_h = vec![DVec3::X; 3];
        smooth_curve_derivatives(
            &nx,
            &mut nd_a,
            DerivativeScalingMode::ArithmeticMean,
            SmoothingOptions::default(),
        );
        smooth_curve_derivatives(
            &nx,
            &mut nd_h,
            DerivativeScalingMode::HarmonicMean,
            SmoothingOptions::default(),
        );
        assert!(nd_h[1].length() < nd_a[1].length());
    }
}
