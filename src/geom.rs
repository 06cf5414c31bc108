// Copyright 2025 Lars Brubaker
// License: MIT
//
// Small geometric helpers shared by the interpolation and field modules.
// Vector storage is glam::DVec3; this module adds the handful of operations
// glam does not provide directly.

use glam::DVec3;

pub type Real = f64;

/// 3-point Gauss-Legendre abscissae on [0, 1].
pub const GAUSS_XI3: [Real; 3] = [0.112701665379258, 0.5, 0.887298334620742];
/// 3-point Gauss-Legendre weights.
pub const GAUSS_WT3: [Real; 3] = [5.0 / 18.0, 4.0 / 9.0, 5.0 / 18.0];

/// 4-point Gauss-Legendre abscissae on [0, 1].
pub const GAUSS_XI4: [Real; 4] = [
    0.069431844202974,
    0.330009478207572,
    0.669990521792428,
    0.930568155797026,
];
/// 4-point Gauss-Legendre weights.
pub const GAUSS_WT4: [Real; 4] = [
    0.173927422568727,
    0.326072577431273,
    0.326072577431273,
    0.173927422568727,
];

/// Rescale v to the given magnitude. Zero vectors are returned unchanged.
#[inline]
pub fn set_magnitude(v: DVec3, magnitude: Real) -> DVec3 {
    let len = v.length();
    if len > 0.0 {
        v * (magnitude / len)
    } else {
        v
    }
}

/// Component of v orthogonal to direction (direction need not be unit).
#[inline]
pub fn reject_from(v: DVec3, direction: DVec3) -> DVec3 {
    let len_sq = direction.length_squared();
    if len_sq > 0.0 {
        v - direction * (v.dot(direction) / len_sq)
    } else {
        v
    }
}

/// True if every component of v is finite.
#[inline]
pub fn is_finite_vec(v: DVec3) -> bool {
    v.x.is_finite() && v.y.is_finite() && v.z.is_finite()
}

/// Positive when the three local axes form a right-handed set.
#[inline]
pub fn is_right_handed(a1: DVec3, a2: DVec3, a3: DVec3) -> bool {
    a1.cross(a2).dot(a3) > 0.0
}
