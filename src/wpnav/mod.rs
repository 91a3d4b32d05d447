//! Waypoint, spline and loiter navigation.
//!
//! [`WpNav`] moves an intermediate position target along the active segment and hands it to
//! a [`PositionControl`] implementation. Each `update_*` method is meant to be called from the
//! main loop at least as fast as its update period:
//! the target is advanced once per period and the position controller's inner loop runs in between.

use crate::{
    hal::{millis, Ahrs, InertialNav},
    math::bearing_cd,
    params::{ParamStore, WpNavParams, WP_ACCELERATION},
    Error, PositionControl,
};
pub use crate::control::{ALT_HOLD_ACCEL_MAX, LEASH_LENGTH_MIN};
use embedded_time::Clock;
use log::{debug, warn};
use nalgebra::{Vector2, Vector3};

mod leash;
pub use leash::TrackLimits;

mod loiter;

mod spline;
pub use spline::{HermiteSpline, SegmentEnd};

mod track;

/// Seconds between loiter updates.
pub const LOITER_UPDATE_TIME: f32 = 0.0095;
/// Seconds between waypoint and spline updates.
pub const WP_UPDATE_TIME: f32 = 0.095;
/// Default loiter acceleration in cm/s/s.
pub const LOITER_ACCEL: f32 = 250.;
/// Minimum acceleration in cm/s/s used by loiter's drag model.
pub const LOITER_ACCEL_MIN: f32 = 25.;
/// Milliseconds since the last waypoint update after which the planner is considered idle.
pub const ACTIVE_TIMEOUT_MS: u32 = 1000;

/// Geometry of the active segment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SegmentType {
    Straight,
    Spline,
}

#[derive(Clone, Copy, Debug)]
struct Flags {
    reached_destination: bool,
    fast_waypoint: bool,
    segment_type: SegmentType,
}

/// Fixed rate update gate driven by a millisecond clock.
#[derive(Clone, Copy, Debug)]
struct UpdateTimer {
    /// Update period in seconds.
    period: f32,
    last_update_ms: u32,
}

impl UpdateTimer {
    const fn new(period: f32) -> Self {
        Self {
            period,
            last_update_ms: 0,
        }
    }

    /// If a full period has elapsed at `now_ms`, restart the timer and return the elapsed time in seconds.
    /// Elapsed times of a second or more are reported as 0.
    fn ready(&mut self, now_ms: u32) -> Option<f32> {
        let dt = self.elapsed_ms(now_ms) as f32 / 1000.;
        if dt < self.period {
            return None;
        }

        self.last_update_ms = now_ms;
        if dt >= 1. {
            debug!("update gap of {} s, ignoring elapsed time", dt);
            Some(0.)
        } else {
            Some(dt)
        }
    }

    fn elapsed_ms(&self, now_ms: u32) -> u32 {
        now_ms.wrapping_sub(self.last_update_ms)
    }
}

/// Waypoint and loiter navigation planner.
///
/// Reads the vehicle state from an [`InertialNav`] and [`Ahrs`],
/// and writes position targets to a [`PositionControl`].
pub struct WpNav<I, A, P, C> {
    inav: I,
    ahrs: A,
    pos_control: P,
    clock: C,
    params: WpNavParams,
    /// Parameters repaired at runtime that should be persisted.
    accel_repaired: bool,

    loiter_timer: UpdateTimer,
    /// Pilot's desired forward acceleration in cm/s/s.
    pilot_accel_fwd: f32,
    /// Pilot's desired right acceleration in cm/s/s.
    pilot_accel_rgt: f32,
    loiter_accel: f32,

    wp_timer: UpdateTimer,
    origin: Vector3<f32>,
    destination: Vector3<f32>,
    /// Unit vector from origin to destination.
    pos_delta_unit: Vector3<f32>,
    track_length: f32,
    /// Distance in cm along the track of the intermediate target.
    track_desired: f32,
    /// Speed in cm/s the intermediate target is moving along the track.
    limited_speed_xy: f32,
    limits: TrackLimits,

    spline: HermiteSpline,
    spline_time: f32,
    spline_vel_scaler: f32,
    spline_origin_vel: Vector3<f32>,
    spline_destination_vel: Vector3<f32>,
    spline_slow_down_dist: f32,

    flags: Flags,
    /// Desired heading in centi-degrees.
    yaw: f32,
}

impl<I, A, P, C> WpNav<I, A, P, C>
where
    I: InertialNav,
    A: Ahrs,
    P: PositionControl,
    C: Clock<T = u32>,
{
    pub fn new(inav: I, ahrs: A, pos_control: P, clock: C, params: WpNavParams) -> Self {
        Self {
            inav,
            ahrs,
            pos_control,
            clock,
            params,
            accel_repaired: false,
            loiter_timer: UpdateTimer::new(LOITER_UPDATE_TIME),
            pilot_accel_fwd: 0.,
            pilot_accel_rgt: 0.,
            loiter_accel: LOITER_ACCEL,
            wp_timer: UpdateTimer::new(WP_UPDATE_TIME),
            origin: Vector3::zeros(),
            destination: Vector3::zeros(),
            pos_delta_unit: Vector3::zeros(),
            track_length: 0.,
            track_desired: 0.,
            limited_speed_xy: 0.,
            limits: TrackLimits::default(),
            spline: HermiteSpline::default(),
            spline_time: 0.,
            spline_vel_scaler: 0.,
            spline_origin_vel: Vector3::zeros(),
            spline_destination_vel: Vector3::zeros(),
            spline_slow_down_dist: 0.,
            flags: Flags {
                reached_destination: false,
                fast_waypoint: false,
                segment_type: SegmentType::Straight,
            },
            yaw: 0.,
        }
    }

    pub fn params(&self) -> &WpNavParams {
        &self.params
    }

    pub fn params_mut(&mut self) -> &mut WpNavParams {
        &mut self.params
    }

    pub fn pos_control(&self) -> &P {
        &self.pos_control
    }

    pub fn pos_control_mut(&mut self) -> &mut P {
        &mut self.pos_control
    }

    pub fn inav(&self) -> &I {
        &self.inav
    }

    pub fn ahrs(&self) -> &A {
        &self.ahrs
    }

    /// Persist parameters that were repaired after being loaded with invalid values.
    pub fn save_repaired_params<S: ParamStore>(&mut self, store: &mut S) {
        if self.accel_repaired {
            store.set_and_save(WpNavParams::ACCEL, self.params.accel_cmss);
            self.accel_repaired = false;
        }
    }

    /// Returns `true` if a repaired parameter is waiting to be saved.
    pub fn has_repaired_params(&self) -> bool {
        self.accel_repaired
    }

    /// Returns `true` once the active segment's destination has been reached.
    pub fn reached_destination(&self) -> bool {
        self.flags.reached_destination
    }

    pub fn segment_type(&self) -> SegmentType {
        self.flags.segment_type
    }

    /// Returns `true` if the destination counts as reached as soon as the target arrives there.
    pub fn is_fast_waypoint(&self) -> bool {
        self.flags.fast_waypoint
    }

    /// Mark the current waypoint as fast so it completes once the intermediate target arrives.
    pub fn set_fast_waypoint(&mut self, fast: bool) {
        self.flags.fast_waypoint = fast;
    }

    pub fn origin(&self) -> Vector3<f32> {
        self.origin
    }

    pub fn destination(&self) -> Vector3<f32> {
        self.destination
    }

    /// Desired heading in centi-degrees.
    pub fn yaw(&self) -> f32 {
        self.yaw
    }

    pub fn pos_delta_unit(&self) -> Vector3<f32> {
        self.pos_delta_unit
    }

    pub fn track_length(&self) -> f32 {
        self.track_length
    }

    pub fn track_desired(&self) -> f32 {
        self.track_desired
    }

    pub fn limited_speed_xy(&self) -> f32 {
        self.limited_speed_xy
    }

    pub fn track_limits(&self) -> &TrackLimits {
        &self.limits
    }

    fn now_ms(&self) -> Result<u32, Error> {
        millis(&self.clock)
    }

    /// Returns `true` if the waypoint controller ran within the last second.
    fn is_wp_active(&self, now_ms: u32) -> bool {
        self.wp_timer.elapsed_ms(now_ms) < ACTIVE_TIMEOUT_MS
    }

    /// Point the vehicle could stop at from its current position and velocity.
    fn stopping_point(&self) -> Vector3<f32> {
        let position = self.inav.position();
        let velocity = self.inav.velocity();
        let xy = self.pos_control.stopping_point_xy(&position, &velocity);
        let z = self.pos_control.stopping_point_z(&position, &velocity);
        Vector3::new(xy.x, xy.y, z)
    }

    /// Horizontal stopping point with the current altitude target.
    fn stopping_point_xy(&self) -> Vector3<f32> {
        let position = self.inav.position();
        let xy = self
            .pos_control
            .stopping_point_xy(&position, &self.inav.velocity());
        Vector3::new(xy.x, xy.y, self.pos_control.pos_target().z)
    }

    /// Reset the acceleration to its default if it was loaded as zero or negative.
    fn check_wp_accel(&mut self) {
        if self.params.accel_cmss <= 0. {
            warn!(
                "waypoint acceleration {} is not positive, resetting to {}",
                self.params.accel_cmss, WP_ACCELERATION
            );
            self.params.accel_cmss = WP_ACCELERATION;
            self.accel_repaired = true;
        }
    }

    /// Push the waypoint speed and acceleration limits to the position controller
    /// and recalculate the leashes.
    fn init_pos_control_limits(&mut self) {
        self.pos_control.set_speed_xy(self.params.speed_cms);
        self.pos_control.set_accel_xy(self.params.accel_cmss);
        self.pos_control
            .set_speed_z(-self.params.speed_down_cms, self.params.speed_up_cms);
        self.pos_control.calc_leash_length_xy();
        self.pos_control.calc_leash_length_z();

        self.calculate_wp_leash_length();
    }

    /// Run the position controller's inner loop against the current target.
    fn run_xy_controller(&mut self, use_desired_velocity: bool) {
        let position = self.inav.position();
        let velocity = self.inav.velocity();
        self.pos_control
            .update_xy_controller(use_desired_velocity, &position, &velocity);
    }

    fn horizontal_velocity(&self) -> Vector2<f32> {
        self.inav.velocity().xy()
    }
}

/// Bearing in centi-degrees between two positions, rounded towards zero.
pub(crate) fn bearing_cd_i32(origin: &Vector3<f32>, destination: &Vector3<f32>) -> i32 {
    bearing_cd(origin, destination) as i32
}
