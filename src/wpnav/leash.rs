use super::{WpNav, ALT_HOLD_ACCEL_MAX, LEASH_LENGTH_MIN};
use crate::{hal::Ahrs, InertialNav, PositionControl};
use embedded_time::Clock;
use nalgebra::Vector3;

/// Speed, acceleration and leash limits along a track.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrackLimits {
    /// Acceleration in cm/s/s along the track.
    pub accel: f32,
    /// Maximum speed in cm/s along the track.
    pub speed: f32,
    /// Leash length in cm along the track.
    pub leash_length: f32,
}

impl Default for TrackLimits {
    fn default() -> Self {
        Self {
            accel: 0.,
            speed: 0.,
            leash_length: LEASH_LENGTH_MIN,
        }
    }
}

/// Per-axis limits the track limits are derived from.
#[derive(Clone, Copy, Debug)]
pub(crate) struct AxisLimits {
    pub speed_xy: f32,
    pub speed_up: f32,
    pub speed_down: f32,
    pub accel_xy: f32,
    pub leash_xy: f32,
    pub leash_up: f32,
    pub leash_down: f32,
}

impl TrackLimits {
    /// Tightest limits along the direction `unit` that respect every per-axis limit.
    pub(crate) fn along(unit: &Vector3<f32>, axis: &AxisLimits) -> Self {
        // length of the unit direction vector in the horizontal and vertical
        let unit_xy = unit.xy().norm();
        let unit_z = unit.z.abs();

        let (speed_z, leash_z) = if unit.z >= 0. {
            (axis.speed_up, axis.leash_up)
        } else {
            (axis.speed_down, axis.leash_down)
        };

        if unit_z == 0. && unit_xy == 0. {
            Self::default()
        } else if unit_z == 0. {
            Self {
                accel: axis.accel_xy / unit_xy,
                speed: axis.speed_xy / unit_xy,
                leash_length: axis.leash_xy / unit_xy,
            }
        } else if unit_xy == 0. {
            Self {
                accel: ALT_HOLD_ACCEL_MAX / unit_z,
                speed: speed_z / unit_z,
                leash_length: leash_z / unit_z,
            }
        } else {
            Self {
                accel: (ALT_HOLD_ACCEL_MAX / unit_z).min(axis.accel_xy / unit_xy),
                speed: (speed_z / unit_z).min(axis.speed_xy / unit_xy),
                leash_length: (leash_z / unit_z).min(axis.leash_xy / unit_xy),
            }
        }
    }
}

impl<I, A, P, C> WpNav<I, A, P, C>
where
    I: InertialNav,
    A: Ahrs,
    P: PositionControl,
    C: Clock<T = u32>,
{
    /// Recalculate the speed, acceleration and leash along the active track.
    pub fn calculate_wp_leash_length(&mut self) {
        let axis = AxisLimits {
            speed_xy: self.params.speed_cms,
            speed_up: self.params.speed_up_cms,
            speed_down: self.params.speed_down_cms,
            accel_xy: self.params.accel_cmss,
            leash_xy: self.pos_control.leash_xy(),
            leash_up: self.pos_control.leash_up_z(),
            leash_down: self.pos_control.leash_down_z(),
        };
        self.limits = TrackLimits::along(&self.pos_delta_unit, &axis);
    }
}
