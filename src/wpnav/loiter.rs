use super::{bearing_cd_i32, WpNav, LOITER_ACCEL_MIN};
use crate::{hal::Ahrs, params::LOITER_SPEED_MIN, Error, InertialNav, PositionControl};
use embedded_time::Clock;
use log::warn;
use nalgebra::{Vector2, Vector3};

/// Full scale roll or pitch stick input in centi-degrees.
const STICK_INPUT_MAX: f32 = 4500.;

/// Slow `vel` with fake wind resistance, pulling it towards zero without crossing it.
fn apply_drag(vel: f32, dt: f32, accel: f32, speed: f32) -> f32 {
    if vel > 0. {
        let vel = vel - (accel - LOITER_ACCEL_MIN) * dt * vel / speed;
        (vel - LOITER_ACCEL_MIN * dt).max(0.)
    } else if vel < 0. {
        let vel = vel - (accel - LOITER_ACCEL_MIN) * dt * vel / speed;
        (vel + LOITER_ACCEL_MIN * dt).min(0.)
    } else {
        vel
    }
}

impl<I, A, P, C> WpNav<I, A, P, C>
where
    I: InertialNav,
    A: Ahrs,
    P: PositionControl,
    C: Clock<T = u32>,
{
    /// Loiter at `position` (cm from home) with no feed forward velocity.
    pub fn set_loiter_target(&mut self, position: Vector3<f32>) {
        self.pos_control.set_pos_target(position);
        self.pos_control.set_desired_velocity(Vector2::zeros());
        self.init_loiter_limits();
    }

    /// Loiter from the vehicle's current position and horizontal velocity.
    pub fn init_loiter_target(&mut self) {
        self.pos_control.set_pos_target(self.inav.position());
        self.pos_control
            .set_desired_velocity(self.horizontal_velocity());
        self.init_loiter_limits();
    }

    /// Set the maximum loiter speed in cm/s. Speeds below the minimum are ignored.
    pub fn set_loiter_velocity(&mut self, velocity_cms: f32) {
        if velocity_cms >= LOITER_SPEED_MIN {
            self.params.loiter_speed_cms = velocity_cms;
            self.pos_control.set_speed_xy(velocity_cms);
            self.loiter_accel = velocity_cms / 2.;
            self.pos_control.set_accel_xy(self.loiter_accel);
        }
    }

    /// Set the pilot's desired acceleration from roll and pitch stick input in centi-degrees.
    pub fn set_pilot_desired_acceleration(&mut self, control_roll: f32, control_pitch: f32) {
        self.pilot_accel_fwd = -control_pitch * self.loiter_accel / STICK_INPUT_MAX;
        self.pilot_accel_rgt = control_roll * self.loiter_accel / STICK_INPUT_MAX;
    }

    /// Point the vehicle could stop at horizontally, at the current altitude target.
    pub fn loiter_stopping_point_xy(&self) -> Vector3<f32> {
        self.stopping_point_xy()
    }

    /// Bearing in centi-degrees from the vehicle to the loiter target.
    pub fn loiter_bearing_to_target(&self) -> i32 {
        bearing_cd_i32(&self.inav.position(), &self.pos_control.pos_target())
    }

    /// Pilot's desired forward acceleration in cm/s/s.
    pub fn pilot_accel_fwd(&self) -> f32 {
        self.pilot_accel_fwd
    }

    /// Pilot's desired right acceleration in cm/s/s.
    pub fn pilot_accel_rgt(&self) -> f32 {
        self.pilot_accel_rgt
    }

    /// Loiter acceleration in cm/s/s.
    pub fn loiter_accel(&self) -> f32 {
        self.loiter_accel
    }

    /// Integrate the pilot's acceleration into the position controller's feed forward velocity.
    pub fn calc_loiter_desired_velocity(&mut self, dt: f32) {
        if dt < 0. {
            return;
        }

        if self.params.loiter_speed_cms < LOITER_SPEED_MIN {
            warn!(
                "loiter speed {} below minimum, using {}",
                self.params.loiter_speed_cms, LOITER_SPEED_MIN
            );
            self.params.loiter_speed_cms = LOITER_SPEED_MIN;
            self.loiter_accel = LOITER_SPEED_MIN / 2.;
        }
        let speed = self.params.loiter_speed_cms;

        // rotate pilot input into the earth frame
        let (cos_yaw, sin_yaw) = (self.ahrs.cos_yaw(), self.ahrs.sin_yaw());
        let desired_accel = Vector2::new(
            self.pilot_accel_fwd * cos_yaw - self.pilot_accel_rgt * sin_yaw,
            self.pilot_accel_fwd * sin_yaw + self.pilot_accel_rgt * cos_yaw,
        );

        let mut desired_vel = self.pos_control.desired_velocity() + desired_accel * dt;
        desired_vel.x = apply_drag(desired_vel.x, dt, self.loiter_accel, speed);
        desired_vel.y = apply_drag(desired_vel.y, dt, self.loiter_accel, speed);

        let vel_total = desired_vel.norm();
        if vel_total > speed && vel_total > 0. {
            desired_vel *= speed / vel_total;
        }

        self.pos_control.set_desired_velocity(desired_vel);
    }

    /// Run the loiter controller. Call at 100hz or faster.
    pub fn update_loiter(&mut self) -> Result<(), Error> {
        let now = self.now_ms()?;

        if let Some(dt) = self.loiter_timer.ready(now) {
            self.calc_loiter_desired_velocity(dt);
            self.pos_control.trigger_xy();
        } else {
            self.run_xy_controller(true);
        }

        Ok(())
    }

    fn init_loiter_limits(&mut self) {
        self.pos_control.set_speed_xy(self.params.loiter_speed_cms);
        self.loiter_accel = self.params.loiter_speed_cms / 2.;
        self.pos_control.set_accel_xy(self.loiter_accel);

        self.pilot_accel_fwd = 0.;
        self.pilot_accel_rgt = 0.;
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        hal::sim::{ManualClock, SimVehicle},
        PosController, PositionControl, WpNav, WpNavParams,
    };
    use approx::assert_relative_eq;
    use core::cell::Cell;
    use nalgebra::{Vector2, Vector3};

    #[test]
    fn drag_slows_without_reversing() {
        let now = Cell::new(5_000);
        let vehicle = SimVehicle::at(Vector3::zeros());
        let mut wpnav = WpNav::new(
            &vehicle,
            &vehicle,
            PosController::default(),
            ManualClock(&now),
            WpNavParams::default(),
        );
        wpnav.set_loiter_target(Vector3::zeros());
        assert_eq!(wpnav.loiter_accel(), 250.);
        wpnav
            .pos_control_mut()
            .set_desired_velocity(Vector2::new(300., 0.));

        let mut last = 300.;
        for _ in 0..100 {
            wpnav.calc_loiter_desired_velocity(0.01);
            let vel = wpnav.pos_control().desired_velocity();
            assert!(vel.x >= 0.);
            assert!(vel.norm() < last);
            last = vel.norm();
        }
    }

    #[test]
    fn released_sticks_come_to_rest() {
        let now = Cell::new(5_000);
        let vehicle = SimVehicle::at(Vector3::zeros());
        let mut wpnav = WpNav::new(
            &vehicle,
            &vehicle,
            PosController::default(),
            ManualClock(&now),
            WpNavParams::default(),
        );
        wpnav.set_loiter_target(Vector3::zeros());
        wpnav
            .pos_control_mut()
            .set_desired_velocity(Vector2::new(-500., 0.));

        // loiter speed / minimum acceleration = 20 s
        for _ in 0..2_000 {
            now.set(now.get() + 10);
            wpnav.update_loiter().unwrap();
        }

        assert_eq!(wpnav.pos_control().desired_velocity(), Vector2::zeros());
    }

    #[test]
    fn pilot_input_is_rotated_by_heading() {
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
        wpnav.init_loiter_target();

        // full forward pitch while facing east
        wpnav.set_pilot_desired_acceleration(0., -4500.);
        assert_relative_eq!(wpnav.pilot_accel_fwd(), 250.);
        assert_eq!(wpnav.pilot_accel_rgt(), 0.);

        wpnav.calc_loiter_desired_velocity(0.1);

        // 25 cm/s, less 1.125 proportional drag and 2.5 minimum drag
        let vel = wpnav.pos_control().desired_velocity();
        assert_relative_eq!(vel.x, 0., epsilon = 1e-3);
        assert_relative_eq!(vel.y, 21.375, epsilon = 1e-3);
    }

    #[test]
    fn feed_forward_is_limited_to_loiter_speed() {
        let now = Cell::new(5_000);
        let vehicle = SimVehicle::at(Vector3::zeros());
        let mut wpnav = WpNav::new(
            &vehicle,
            &vehicle,
            PosController::default(),
            ManualClock(&now),
            WpNavParams::default(),
        );
        wpnav.set_loiter_target(Vector3::zeros());
        wpnav
            .pos_control_mut()
            .set_desired_velocity(Vector2::new(3000., 4000.));

        wpnav.calc_loiter_desired_velocity(0.);

        assert_relative_eq!(wpnav.pos_control().desired_velocity().norm(), 500., epsilon = 1e-2);
    }

    #[test]
    fn low_loiter_speed_is_repaired() {
        let now = Cell::new(5_000);
        let vehicle = SimVehicle::at(Vector3::zeros());
        let params = WpNavParams {
            loiter_speed_cms: 20.,
            ..Default::default()
        };
        let mut wpnav = WpNav::new(
            &vehicle,
            &vehicle,
            PosController::default(),
            ManualClock(&now),
            params,
        );

        wpnav.calc_loiter_desired_velocity(0.01);

        assert_eq!(wpnav.params().loiter_speed_cms, 100.);
        assert_eq!(wpnav.loiter_accel(), 50.);
    }

    #[test]
    fn loiter_velocity_updates_limits() {
        let now = Cell::new(5_000);
        let vehicle = SimVehicle::at(Vector3::zeros());
        let mut wpnav = WpNav::new(
            &vehicle,
            &vehicle,
            PosController::default(),
            ManualClock(&now),
            WpNavParams::default(),
        );

        wpnav.set_loiter_velocity(50.);
        assert_eq!(wpnav.params().loiter_speed_cms, 500.);

        wpnav.set_loiter_velocity(800.);
        assert_eq!(wpnav.loiter_accel(), 400.);
        assert_eq!(wpnav.pos_control().speed_xy(), 800.);
        assert_eq!(wpnav.pos_control().accel_xy(), 400.);
    }

    #[test]
    fn init_loiter_target_keeps_current_motion() {
        let now = Cell::new(5_000);
        let vehicle = SimVehicle::at(Vector3::new(100., 200., 300.));
        vehicle.velocity.set(Vector3::new(30., -40., 10.));
        let mut wpnav = WpNav::new(
            &vehicle,
            &vehicle,
            PosController::default(),
            ManualClock(&now),
            WpNavParams::default(),
        );
        wpnav.set_pilot_desired_acceleration(1000., 1000.);

        wpnav.init_loiter_target();

        assert_eq!(wpnav.pos_control().pos_target(), Vector3::new(100., 200., 300.));
        assert_eq!(wpnav.pos_control().desired_velocity(), Vector2::new(30., -40.));
        assert_eq!(wpnav.pilot_accel_fwd(), 0.);
        assert_eq!(wpnav.pilot_accel_rgt(), 0.);
    }

    #[test]
    fn bearing_to_loiter_target() {
        let now = Cell::new(5_000);
        let vehicle = SimVehicle::at(Vector3::zeros());
        let mut wpnav = WpNav::new(
            &vehicle,
            &vehicle,
            PosController::default(),
            ManualClock(&now),
            WpNavParams::default(),
        );
        wpnav.set_loiter_target(Vector3::new(0., 100., 0.));

        assert_eq!(wpnav.loiter_bearing_to_target(), 9000);
        assert_eq!(wpnav.loiter_stopping_point_xy(), Vector3::new(0., 0., 0.));
    }
}
