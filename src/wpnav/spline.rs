use super::{SegmentType, WpNav};
use crate::{
    hal::Ahrs,
    math::{radians_to_centi_degrees, safe_sqrt},
    Error, InertialNav, PositionControl,
};
use embedded_time::Clock;
use log::debug;
use nalgebra::Vector3;

/// Spline time past the end of a segment that is carried into the next chained spline.
pub const SPLINE_TIME_CARRY_MAX: f32 = 1.1;

/// Endpoint velocities are scaled down if they sum to more than this many times the segment length.
const OVERSHOOT_RATIO: f32 = 4.;

/// How a spline segment ends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SegmentEnd {
    /// The vehicle stops at the destination.
    Stop,
    /// The next segment is a straight line.
    Straight,
    /// The next segment is another spline.
    Spline,
}

/// Cubic hermite curve from its endpoint positions and velocities.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct HermiteSpline {
    coefficients: [Vector3<f32>; 4],
}

impl HermiteSpline {
    pub fn new(
        origin: Vector3<f32>,
        destination: Vector3<f32>,
        origin_vel: Vector3<f32>,
        destination_vel: Vector3<f32>,
    ) -> Self {
        Self {
            coefficients: [
                origin,
                origin_vel,
                -origin * 3. - origin_vel * 2. + destination * 3. - destination_vel,
                origin * 2. + origin_vel - destination * 2. + destination_vel,
            ],
        }
    }

    /// Position at spline time `s`, where 0 is the origin and 1 is the destination.
    pub fn position(&self, s: f32) -> Vector3<f32> {
        let [h0, h1, h2, h3] = &self.coefficients;
        h0 + h1 * s + h2 * (s * s) + h3 * (s * s * s)
    }

    /// Derivative of the position with respect to spline time.
    pub fn velocity(&self, s: f32) -> Vector3<f32> {
        let [_, h1, h2, h3] = &self.coefficients;
        h1 + h2 * (2. * s) + h3 * (3. * s * s)
    }
}

impl<I, A, P, C> WpNav<I, A, P, C>
where
    I: InertialNav,
    A: Ahrs,
    P: PositionControl,
    C: Clock<T = u32>,
{
    /// Fly a spline to `destination` (cm from home).
    ///
    /// `next_destination` is only used when `segment_end` is [`SegmentEnd::Straight`] or [`SegmentEnd::Spline`].
    pub fn set_spline_destination(
        &mut self,
        destination: Vector3<f32>,
        stopped_at_start: bool,
        segment_end: SegmentEnd,
        next_destination: Vector3<f32>,
    ) -> Result<(), Error> {
        let now = self.now_ms()?;

        // continue from the previous waypoint if the vehicle just reached it
        let origin = if self.flags.reached_destination && self.is_wp_active(now) {
            self.destination
        } else {
            self.stopping_point()
        };

        self.set_spline_origin_and_destination(
            origin,
            destination,
            stopped_at_start,
            segment_end,
            next_destination,
        )
    }

    /// Fly a spline from `origin` to `destination` (cm from home).
    pub fn set_spline_origin_and_destination(
        &mut self,
        origin: Vector3<f32>,
        destination: Vector3<f32>,
        stopped_at_start: bool,
        segment_end: SegmentEnd,
        next_destination: Vector3<f32>,
    ) -> Result<(), Error> {
        let now = self.now_ms()?;
        let prev_segment_exists = self.flags.reached_destination && self.is_wp_active(now);

        self.check_wp_accel();

        if stopped_at_start || !prev_segment_exists {
            self.spline_origin_vel = (destination - origin) * 0.1;
            self.spline_time = 0.;
        } else if self.flags.segment_type == SegmentType::Straight {
            // fly straight through the origin along the previous track
            self.spline_origin_vel = self.destination - self.origin;
            self.spline_time = 0.;
        } else {
            // the previous spline already left its destination heading this way
            self.spline_origin_vel = self.spline_destination_vel;
            if self.spline_time > 1. && self.spline_time < SPLINE_TIME_CARRY_MAX {
                self.spline_time -= 1.;
            } else {
                self.spline_time = 0.;
            }
        }
        self.spline_vel_scaler = 0.;

        let (destination_vel, fast_waypoint) = match segment_end {
            SegmentEnd::Stop => ((destination - origin) * 0.1, false),
            SegmentEnd::Straight => (next_destination - destination, true),
            SegmentEnd::Spline => (next_destination - origin, true),
        };
        self.spline_destination_vel = destination_vel;
        self.flags.fast_waypoint = fast_waypoint;

        // limit overshoot when the next segment is short
        let vel_len = (self.spline_origin_vel + self.spline_destination_vel).norm();
        let pos_len = (destination - origin).norm() * OVERSHOOT_RATIO;
        let vel_scaling = if vel_len > pos_len { pos_len / vel_len } else { 1. };
        self.spline = HermiteSpline::new(
            origin,
            destination,
            self.spline_origin_vel * vel_scaling,
            self.spline_destination_vel * vel_scaling,
        );

        self.yaw = self.ahrs.yaw_sensor() as f32;

        self.origin = origin;
        self.destination = destination;

        self.init_pos_control_limits();

        // TODO: include the climb and descent speeds once the vertical controller shapes its own stop
        self.spline_slow_down_dist =
            self.params.speed_cms * self.params.speed_cms / (2. * self.params.accel_cmss);

        self.pos_control.set_pos_target(origin);
        self.flags.reached_destination = false;
        self.flags.segment_type = SegmentType::Spline;

        debug!(
            "spline segment to ({}, {}, {}), end {:?}",
            destination.x, destination.y, destination.z, segment_end
        );

        Ok(())
    }

    /// Move the intermediate target along the spline.
    pub fn advance_spline_target_along_track(&mut self, dt: f32) {
        if self.flags.reached_destination {
            return;
        }

        let target_pos = self.spline.position(self.spline_time);
        let target_vel = self.spline.velocity(self.spline_time);

        let dist_to_wp = (self.destination - target_pos).norm();
        let accel = self.params.accel_cmss;
        let speed = self.params.speed_cms;

        if !self.flags.fast_waypoint && dist_to_wp < self.spline_slow_down_dist {
            self.spline_vel_scaler = safe_sqrt(dist_to_wp * 2. * accel);
        } else if self.spline_vel_scaler < speed {
            self.spline_vel_scaler += accel * dt;
        }
        self.spline_vel_scaler = self.spline_vel_scaler.min(speed);

        self.pos_control.set_pos_target(target_pos);
        self.yaw = radians_to_centi_degrees(target_vel.y.atan2(target_vel.x));

        let target_speed = target_vel.norm();
        if target_speed > 0. {
            // scale spline time so the target moves at the desired speed along the curve
            self.spline_time += self.spline_vel_scaler / target_speed * dt;
        } else {
            // nowhere to go on a degenerate curve
            self.spline_time = 1.;
        }

        if self.spline_time >= 1. {
            self.flags.reached_destination = true;
            debug!("reached spline destination after t = {}", self.spline_time);
        }
    }

    /// Run the spline controller. Call at 10hz or faster.
    ///
    /// Does nothing unless the active segment is a spline.
    pub fn update_spline(&mut self) -> Result<(), Error> {
        if self.flags.segment_type != SegmentType::Spline {
            return Ok(());
        }

        let now = self.now_ms()?;

        if let Some(dt) = self.wp_timer.ready(now) {
            self.advance_spline_target_along_track(dt);
            self.pos_control.trigger_xy();
        } else {
            self.run_xy_controller(false);
        }

        Ok(())
    }

    pub fn spline(&self) -> &HermiteSpline {
        &self.spline
    }

    /// Parameter along the active spline, 0 at the origin and 1 at the destination.
    pub fn spline_time(&self) -> f32 {
        self.spline_time
    }

    /// Target speed in cm/s along the spline.
    pub fn spline_vel_scaler(&self) -> f32 {
        self.spline_vel_scaler
    }

    pub fn spline_origin_vel(&self) -> Vector3<f32> {
        self.spline_origin_vel
    }

    pub fn spline_destination_vel(&self) -> Vector3<f32> {
        self.spline_destination_vel
    }

    /// Distance in cm from the destination at which the target starts slowing down.
    pub fn spline_slow_down_dist(&self) -> f32 {
        self.spline_slow_down_dist
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        hal::sim::{ManualClock, SimVehicle},
        PosController, WpNavParams,
    };
    use approx::assert_relative_eq;
    use core::cell::Cell;

    #[test]
    fn hermite_matches_endpoints() {
        let origin = Vector3::new(100., -50., 200.);
        let destination = Vector3::new(900., 300., 250.);
        let origin_vel = Vector3::new(300., 0., 0.);
        let destination_vel = Vector3::new(0., 400., 10.);
        let spline = HermiteSpline::new(origin, destination, origin_vel, destination_vel);

        assert_relative_eq!(spline.position(0.), origin);
        assert_relative_eq!(spline.position(1.), destination, epsilon = 1e-3);
        assert_relative_eq!(spline.velocity(0.), origin_vel);
        assert_relative_eq!(spline.velocity(1.), destination_vel, epsilon = 1e-3);
    }

    #[test]
    fn spline_to_a_stop_slows_into_the_destination() {
        let now = Cell::new(5_000);
        let vehicle = SimVehicle::at(Vector3::zeros());
        let mut wpnav = WpNav::new(
            &vehicle,
            &vehicle,
            PosController::default(),
            ManualClock(&now),
            WpNavParams::default(),
        );
        let destination = Vector3::new(400., 0., 0.);
        wpnav
            .set_spline_origin_and_destination(
                Vector3::zeros(),
                destination,
                true,
                SegmentEnd::Stop,
                Vector3::zeros(),
            )
            .unwrap();

        assert_eq!(wpnav.segment_type(), SegmentType::Spline);
        assert!(!wpnav.is_fast_waypoint());
        assert_eq!(wpnav.spline_origin_vel(), Vector3::new(40., 0., 0.));
        assert_eq!(wpnav.spline_destination_vel(), Vector3::new(40., 0., 0.));
        assert_relative_eq!(wpnav.spline_slow_down_dist(), 1250.);

        let mut last_x = 0.;
        for _ in 0..200 {
            now.set(now.get() + 100);
            wpnav.update_spline().unwrap();

            let target = wpnav.pos_control().pos_target();
            assert!(target.x >= last_x);
            assert!(target.x <= destination.x + 1e-3);
            last_x = target.x;
            assert!(wpnav.spline_vel_scaler() <= 500.);

            // never faster than the vehicle could stop from
            let remaining = (destination - target).norm();
            assert!(wpnav.spline_vel_scaler() <= (2. * 100. * remaining).sqrt() + 1e-2);

            if wpnav.reached_destination() {
                break;
            }
            assert!(wpnav.spline_time() < 1.);
        }

        assert!(wpnav.reached_destination());
        assert!(wpnav.spline_time() >= 1.);
    }

    #[test]
    fn short_next_segment_scales_endpoint_velocities() {
        let now = Cell::new(5_000);
        let vehicle = SimVehicle::at(Vector3::zeros());
        let mut wpnav = WpNav::new(
            &vehicle,
            &vehicle,
            PosController::default(),
            ManualClock(&now),
            WpNavParams::default(),
        );
        // |V0 + V1| = |(10, 0, 0) + (990, 0, 0)| = 10 * segment length
        wpnav
            .set_spline_origin_and_destination(
                Vector3::zeros(),
                Vector3::new(100., 0., 0.),
                true,
                SegmentEnd::Straight,
                Vector3::new(1090., 0., 0.),
            )
            .unwrap();

        assert!(wpnav.is_fast_waypoint());
        assert_relative_eq!(wpnav.spline().velocity(0.), Vector3::new(4., 0., 0.), epsilon = 1e-3);
        assert_relative_eq!(wpnav.spline().velocity(1.), Vector3::new(396., 0., 0.), epsilon = 1e-2);
        // the unscaled velocity is kept for the next segment
        assert_eq!(wpnav.spline_destination_vel(), Vector3::new(990., 0., 0.));
    }

    #[test]
    fn chained_splines_carry_a_small_overrun() {
        let now = Cell::new(5_000);
        let vehicle = SimVehicle::at(Vector3::zeros());
        vehicle.yaw.set(core::f32::consts::FRAC_PI_2);
        let mut wpnav = WpNav::new(
            &vehicle,
            &vehicle,
            PosController::default(),
            ManualClock(&now),
            WpNavParams::default(),
        );
        let first = Vector3::new(1000., 0., 0.);
        let second = Vector3::new(2000., 1000., 0.);
        wpnav
            .set_spline_origin_and_destination(Vector3::zeros(), first, true, SegmentEnd::Spline, second)
            .unwrap();
        assert_relative_eq!(wpnav.yaw(), 9000., epsilon = 1.);

        for _ in 0..300 {
            now.set(now.get() + 100);
            wpnav.update_spline().unwrap();
            if wpnav.reached_destination() {
                break;
            }
        }
        assert!(wpnav.reached_destination());

        wpnav.spline_time = 1.05;
        wpnav
            .set_spline_destination(second, false, SegmentEnd::Stop, Vector3::zeros())
            .unwrap();

        assert_eq!(wpnav.origin(), first);
        assert_relative_eq!(wpnav.spline_time(), 0.05, epsilon = 1e-5);
        assert_eq!(wpnav.spline_origin_vel(), second);
        assert!(!wpnav.reached_destination());
    }

    #[test]
    fn large_overrun_restarts_the_next_spline() {
        let now = Cell::new(5_000);
        let vehicle = SimVehicle::at(Vector3::zeros());
        let mut wpnav = WpNav::new(
            &vehicle,
            &vehicle,
            PosController::default(),
            ManualClock(&now),
            WpNavParams::default(),
        );
        let first = Vector3::new(1000., 0., 0.);
        wpnav
            .set_spline_origin_and_destination(
                Vector3::zeros(),
                first,
                true,
                SegmentEnd::Spline,
                Vector3::new(2000., 0., 0.),
            )
            .unwrap();

        // pretend the segment was just completed
        wpnav.flags.reached_destination = true;
        wpnav.wp_timer.last_update_ms = now.get();
        wpnav.spline_time = 1.3;

        wpnav
            .set_spline_destination(Vector3::new(2000., 0., 0.), false, SegmentEnd::Stop, Vector3::zeros())
            .unwrap();
        assert_eq!(wpnav.spline_time(), 0.);
    }

    #[test]
    fn spline_after_straight_continues_along_the_track() {
        let now = Cell::new(5_000);
        let vehicle = SimVehicle::at(Vector3::zeros());
        let mut wpnav = WpNav::new(
            &vehicle,
            &vehicle,
            PosController::default(),
            ManualClock(&now),
            WpNavParams::default(),
        );
        wpnav.set_wp_origin_and_destination(Vector3::zeros(), Vector3::new(0., 500., 0.));
        wpnav.flags.reached_destination = true;
        wpnav.wp_timer.last_update_ms = now.get();

        wpnav
            .set_spline_destination(Vector3::new(500., 500., 0.), false, SegmentEnd::Stop, Vector3::zeros())
            .unwrap();

        assert_eq!(wpnav.origin(), Vector3::new(0., 500., 0.));
        assert_eq!(wpnav.spline_origin_vel(), Vector3::new(0., 500., 0.));
        assert_eq!(wpnav.spline_time(), 0.);
    }

    #[test]
    fn degenerate_spline_is_reached_immediately() {
        let now = Cell::new(5_000);
        let vehicle = SimVehicle::at(Vector3::zeros());
        let mut wpnav = WpNav::new(
            &vehicle,
            &vehicle,
            PosController::default(),
            ManualClock(&now),
            WpNavParams::default(),
        );
        let point = Vector3::new(10., 20., 30.);
        wpnav
            .set_spline_origin_and_destination(point, point, true, SegmentEnd::Stop, Vector3::zeros())
            .unwrap();

        wpnav.advance_spline_target_along_track(0.1);

        assert!(wpnav.reached_destination());
        assert_eq!(wpnav.pos_control().pos_target(), point);
    }

    #[test]
    fn update_spline_ignores_straight_segments() {
        let now = Cell::new(5_000);
        let vehicle = SimVehicle::at(Vector3::zeros());
        let mut wpnav = WpNav::new(
            &vehicle,
            &vehicle,
            PosController::default(),
            ManualClock(&now),
            WpNavParams::default(),
        );
        wpnav.set_wp_origin_and_destination(Vector3::zeros(), Vector3::new(1000., 0., 0.));

        now.set(now.get() + 100);
        wpnav.update_spline().unwrap();

        assert!(!wpnav.pos_control().is_triggered());
        assert_eq!(wpnav.track_desired(), 0.);
    }
}
