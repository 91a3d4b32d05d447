use super::{bearing_cd_i32, SegmentType, WpNav};
use crate::{
    hal::Ahrs, math::constrain_float, params::WP_SPEED_MIN, Error, InertialNav, PositionControl,
};
use embedded_time::Clock;
use log::debug;
use nalgebra::Vector3;

impl<I, A, P, C> WpNav<I, A, P, C>
where
    I: InertialNav,
    A: Ahrs,
    P: PositionControl,
    C: Clock<T = u32>,
{
    /// Set the horizontal waypoint speed in cm/s. Speeds below the minimum are ignored.
    pub fn set_horizontal_velocity(&mut self, velocity_cms: f32) {
        if velocity_cms >= WP_SPEED_MIN {
            self.params.speed_cms = velocity_cms;
            self.pos_control.set_speed_xy(velocity_cms);
        }
    }

    /// Fly a straight line to `destination` (cm from home).
    ///
    /// While the waypoint controller is active the current position target becomes the origin,
    /// otherwise the vehicle's stopping point is used.
    pub fn set_wp_destination(&mut self, destination: Vector3<f32>) -> Result<(), Error> {
        let now = self.now_ms()?;

        let origin = if self.is_wp_active(now) {
            self.pos_control.pos_target()
        } else {
            self.stopping_point()
        };

        self.set_wp_origin_and_destination(origin, destination);
        Ok(())
    }

    /// Fly a straight line from `origin` to `destination` (cm from home).
    pub fn set_wp_origin_and_destination(&mut self, origin: Vector3<f32>, destination: Vector3<f32>) {
        self.origin = origin;
        self.destination = destination;

        let pos_delta = destination - origin;
        self.track_length = pos_delta.norm();
        self.pos_delta_unit = if self.track_length == 0. {
            Vector3::zeros()
        } else {
            pos_delta / self.track_length
        };

        self.check_wp_accel();
        self.init_pos_control_limits();

        self.yaw = bearing_cd_i32(&origin, &destination) as f32;

        // start the intermediate target at the beginning of the track
        self.pos_control.set_pos_target(origin);
        self.track_desired = 0.;
        self.flags.reached_destination = false;
        self.flags.fast_waypoint = false;
        self.flags.segment_type = SegmentType::Straight;

        // start from the current speed along the track
        let speed_along_track = self.inav.velocity().dot(&self.pos_delta_unit);
        self.limited_speed_xy = constrain_float(speed_along_track, 0., self.params.speed_cms);

        debug!(
            "straight segment of {} cm from ({}, {}, {})",
            self.track_length, origin.x, origin.y, origin.z
        );
    }

    /// Point the vehicle could stop at horizontally, at the current altitude target.
    pub fn wp_stopping_point_xy(&self) -> Vector3<f32> {
        self.stopping_point_xy()
    }

    /// Move the intermediate target along the track, at most as far as the leash allows.
    pub fn advance_wp_target_along_track(&mut self, dt: f32) {
        let position = self.inav.position();
        let velocity = self.inav.velocity();
        self.advance_track(dt, &position, &velocity);
    }

    fn advance_track(&mut self, dt: f32, position: &Vector3<f32>, velocity: &Vector3<f32>) {
        let unit = self.pos_delta_unit;
        let curr_delta = position - self.origin;

        // how far along the track the vehicle is
        let track_covered = curr_delta.dot(&unit);

        let track_error = curr_delta - unit * track_covered;
        let track_error_xy = track_error.xy().norm();
        let track_error_z = track_error.z.abs();

        let leash_xy = self.pos_control.leash_xy();
        let leash_z = if track_error.z >= 0. {
            self.pos_control.leash_up_z()
        } else {
            self.pos_control.leash_down_z()
        };

        // how far the target may move ahead of the vehicle before reaching the end of the leash
        let leash = self.limits.leash_length;
        let track_extra_max =
            (leash * (leash_z - track_error_z) / leash_z).min(leash * (leash_xy - track_error_xy) / leash_xy);
        let track_desired_max = track_covered + track_extra_max.max(0.);

        let speed_along_track = velocity.dot(&unit);

        // speed at which the position controller switches from linear to sqrt response
        let kp = self.pos_control.pos_xy_kp();
        let linear_velocity = if kp > 0. {
            self.limits.accel / kp
        } else {
            self.params.speed_cms
        };

        let track_desired_prev = self.track_desired;
        if speed_along_track < -linear_velocity {
            // flying quickly away from the destination, leave the target where it is
            self.limited_speed_xy = 0.;
        } else {
            if dt > 0. {
                if track_desired_max > self.track_desired {
                    self.limited_speed_xy += 2. * self.limits.accel * dt;
                } else {
                    // at the end of the leash, keep the current speed
                    self.track_desired = track_desired_max;
                }
            }

            self.limited_speed_xy = self.limited_speed_xy.min(self.limits.speed);

            // keep the target speed within reach of the vehicle's own speed
            if speed_along_track.abs() < linear_velocity {
                self.limited_speed_xy = constrain_float(
                    self.limited_speed_xy,
                    speed_along_track - linear_velocity,
                    speed_along_track + linear_velocity,
                );
            }
        }

        let track_desired_temp = constrain_float(
            track_desired_prev + self.limited_speed_xy * dt,
            0.,
            self.track_length,
        );
        // never move the target backwards
        self.track_desired = track_desired_prev.max(self.track_desired.max(track_desired_temp));

        self.pos_control
            .set_pos_target(self.origin + unit * self.track_desired);

        if !self.flags.reached_destination && self.track_desired >= self.track_length {
            // fast waypoints complete once the target arrives,
            // others also need the vehicle within the waypoint radius
            if self.flags.fast_waypoint
                || (position - self.destination).norm() <= self.params.radius_cm
            {
                self.flags.reached_destination = true;
                debug!("reached waypoint ({}, {}, {})", self.destination.x, self.destination.y, self.destination.z);
            }
        }
    }

    /// Horizontal distance in cm from the vehicle to the destination.
    pub fn wp_distance_to_destination(&self) -> f32 {
        (self.destination.xy() - self.inav.position().xy()).norm()
    }

    /// Bearing in centi-degrees from the vehicle to the destination.
    pub fn wp_bearing_to_destination(&self) -> i32 {
        bearing_cd_i32(&self.inav.position(), &self.destination)
    }

    /// Run the waypoint controller. Call at 10hz or faster.
    pub fn update_wpnav(&mut self) -> Result<(), Error> {
        let now = self.now_ms()?;

        if let Some(dt) = self.wp_timer.ready(now) {
            let position = self.inav.position();
            let velocity = self.inav.velocity();
            self.advance_track(dt, &position, &velocity);
            self.pos_control.trigger_xy();
        } else {
            self.run_xy_controller(false);
        }

        Ok(())
    }
}
