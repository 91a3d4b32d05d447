//! Scalar and vector helpers shared by the planner and controllers.

use core::f32::consts::PI;
use nalgebra::{Vector2, Vector3};
use num_traits::Float;

/// Centi-degrees per radian.
const RAD_TO_CENTI_DEG: f32 = 18000. / PI;

/// Constrain `amt` to `[low, high]`, returning the midpoint for NaN input.
pub fn constrain_float(amt: f32, low: f32, high: f32) -> f32 {
    if amt.is_nan() {
        return (low + high) / 2.0;
    }

    if amt < low {
        return low;
    }

    if amt > high {
        return high;
    }

    amt
}

/// Square root that returns 0 instead of NaN for negative input.
pub fn safe_sqrt(v: f32) -> f32 {
    let ret = Float::sqrt(v);
    if ret.is_nan() {
        return 0.0;
    }
    ret
}

pub fn radians_to_centi_degrees(rad: f32) -> f32 {
    rad * RAD_TO_CENTI_DEG
}

/// Bearing in centi-degrees [0, 36000) from `origin` to `destination`.
///
/// 0 points along +x (north) and bearings increase clockwise towards +y (east).
pub fn bearing_cd(origin: &Vector3<f32>, destination: &Vector3<f32>) -> f32 {
    let delta = destination - origin;
    let mut bearing = 9000. + radians_to_centi_degrees(Float::atan2(-delta.x, delta.y));
    if bearing < 0. {
        bearing += 36000.;
    }
    if bearing >= 36000. {
        bearing -= 36000.;
    }
    bearing
}

/// Velocity that brings `error` to zero with proportional gain `p` near the target
/// and a constant deceleration `accel` further out.
pub fn sqrt_controller(error: f32, p: f32, accel: f32) -> f32 {
    if accel <= 0. || p <= 0. {
        return error * p.max(0.);
    }

    let linear_dist = accel / (p * p);
    if error > linear_dist {
        safe_sqrt(2. * accel * (error - linear_dist / 2.))
    } else if error < -linear_dist {
        -safe_sqrt(2. * accel * (-error - linear_dist / 2.))
    } else {
        error * p
    }
}

/// Scale `v` down so its length does not exceed `max`.
pub fn limit_norm(v: Vector2<f32>, max: f32) -> Vector2<f32> {
    let len = v.norm();
    if len > max && len > 0. {
        v * (max / len)
    } else {
        v
    }
}
