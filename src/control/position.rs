use super::PositionControl;
use crate::math::{limit_norm, sqrt_controller};
use nalgebra::{Vector2, Vector3};

/// Shortest leash in cm.
pub const LEASH_LENGTH_MIN: f32 = 100.;
/// Smallest acceleration in cm/s/s used to calculate a leash.
pub const ACCELERATION_MIN: f32 = 50.;
/// Vertical acceleration in cm/s/s used for vertical leashes and stopping points.
pub const ALT_HOLD_ACCEL_MAX: f32 = 250.;

/// Leash length in cm that keeps the target within reach of a vehicle
/// flying at `speed` with acceleration `accel` under proportional gain `kp`.
pub fn calc_leash_length(speed: f32, accel: f32, kp: f32) -> f32 {
    let accel = if accel <= 0. { ACCELERATION_MIN } else { accel };

    if kp <= 0. {
        return LEASH_LENGTH_MIN;
    }

    let leash = if speed <= accel / kp {
        // linear leash length based on speed close in
        speed / kp
    } else {
        // leash length grows at the square of speed further out
        accel / (2. * kp * kp) + (speed * speed) / (2. * accel)
    };

    leash.max(LEASH_LENGTH_MIN)
}

/// Distance needed to stop from `speed` decelerating at `accel` under proportional gain `kp`.
fn stopping_distance(speed: f32, accel: f32, kp: f32) -> f32 {
    let linear_velocity = accel / kp;
    if speed < linear_velocity {
        speed / kp
    } else {
        accel / (2. * kp * kp) + (speed * speed) / (2. * accel)
    }
}

/// Cascaded position → velocity → acceleration controller.
#[derive(Clone, Debug)]
pub struct PosController {
    /// Horizontal position gain (1/s).
    pub pos_xy_k_p: f32,
    /// Horizontal velocity gain (1/s).
    pub vel_xy_k_p: f32,
    /// Vertical position gain (1/s).
    pub pos_z_k_p: f32,
    pos_target: Vector3<f32>,
    desired_vel: Vector2<f32>,
    vel_target: Vector2<f32>,
    accel_target: Vector2<f32>,
    speed_xy: f32,
    accel_xy: f32,
    speed_down_z: f32,
    speed_up_z: f32,
    leash_xy: f32,
    leash_up_z: f32,
    leash_down_z: f32,
    is_triggered: bool,
}

impl Default for PosController {
    fn default() -> Self {
        let mut controller = Self {
            pos_xy_k_p: 1.,
            vel_xy_k_p: 1.,
            pos_z_k_p: 1.,
            pos_target: Vector3::zeros(),
            desired_vel: Vector2::zeros(),
            vel_target: Vector2::zeros(),
            accel_target: Vector2::zeros(),
            speed_xy: 500.,
            accel_xy: 100.,
            speed_down_z: -150.,
            speed_up_z: 250.,
            leash_xy: LEASH_LENGTH_MIN,
            leash_up_z: LEASH_LENGTH_MIN,
            leash_down_z: LEASH_LENGTH_MIN,
            is_triggered: false,
        };
        controller.calc_leash_length_xy();
        controller.calc_leash_length_z();
        controller
    }
}

impl PosController {
    /// Horizontal velocity target from the last position update.
    pub fn vel_target(&self) -> Vector2<f32> {
        self.vel_target
    }

    /// Horizontal acceleration target from the last velocity update.
    pub fn accel_target(&self) -> Vector2<f32> {
        self.accel_target
    }

    pub fn speed_xy(&self) -> f32 {
        self.speed_xy
    }

    pub fn accel_xy(&self) -> f32 {
        self.accel_xy
    }

    /// Returns `true` if a new target is waiting to be picked up by the next update.
    pub fn is_triggered(&self) -> bool {
        self.is_triggered
    }

    fn pos_to_rate_xy(&mut self, use_desired_velocity: bool, position: &Vector3<f32>) {
        let mut pos_error = self.pos_target.xy() - position.xy();

        // constrain the target to within the leash
        let error_total = pos_error.norm();
        if error_total > self.leash_xy && error_total > 0. {
            pos_error *= self.leash_xy / error_total;
            let target = position.xy() + pos_error;
            self.pos_target.x = target.x;
            self.pos_target.y = target.y;
        }

        let error_total = pos_error.norm();
        let mut vel_target = if error_total > 0. {
            pos_error * (sqrt_controller(error_total, self.pos_xy_k_p, self.accel_xy) / error_total)
        } else {
            Vector2::zeros()
        };

        if use_desired_velocity {
            vel_target += self.desired_vel;
        }

        self.vel_target = limit_norm(vel_target, self.speed_xy);
    }

    fn rate_to_accel_xy(&mut self, velocity: &Vector3<f32>) {
        let accel = self.vel_xy_k_p * (self.vel_target - velocity.xy());
        self.accel_target = limit_norm(accel, self.accel_xy);
    }
}

impl PositionControl for PosController {
    fn pos_target(&self) -> Vector3<f32> {
        self.pos_target
    }

    fn set_pos_target(&mut self, position: Vector3<f32>) {
        self.pos_target = position;
    }

    fn desired_velocity(&self) -> Vector2<f32> {
        self.desired_vel
    }

    fn set_desired_velocity(&mut self, velocity: Vector2<f32>) {
        self.desired_vel = velocity;
    }

    fn set_speed_xy(&mut self, speed_cms: f32) {
        self.speed_xy = speed_cms;
    }

    fn set_accel_xy(&mut self, accel_cmss: f32) {
        self.accel_xy = accel_cmss;
    }

    fn set_speed_z(&mut self, speed_down_cms: f32, speed_up_cms: f32) {
        self.speed_down_z = speed_down_cms;
        self.speed_up_z = speed_up_cms;
    }

    fn stopping_point_xy(&self, position: &Vector3<f32>, velocity: &Vector3<f32>) -> Vector2<f32> {
        let vel = velocity.xy();
        let vel_total = vel.norm();

        if self.pos_xy_k_p <= 0. || self.accel_xy <= 0. || vel_total == 0. {
            return position.xy();
        }

        let stopping_dist = stopping_distance(vel_total, self.accel_xy, self.pos_xy_k_p)
            .max(0.)
            .min(self.leash_xy);

        position.xy() + vel * (stopping_dist / vel_total)
    }

    fn stopping_point_z(&self, position: &Vector3<f32>, velocity: &Vector3<f32>) -> f32 {
        let vel = velocity.z;

        if self.pos_z_k_p <= 0. || vel == 0. {
            return position.z;
        }

        let linear_velocity = ALT_HOLD_ACCEL_MAX / self.pos_z_k_p;
        let stopping_dist = if vel.abs() < linear_velocity {
            vel / self.pos_z_k_p
        } else {
            let linear_distance = ALT_HOLD_ACCEL_MAX / (2. * self.pos_z_k_p * self.pos_z_k_p);
            let dist = linear_distance + (vel * vel) / (2. * ALT_HOLD_ACCEL_MAX);
            if vel > 0. {
                dist
            } else {
                -dist
            }
        };

        position.z + stopping_dist.max(-self.leash_down_z).min(self.leash_up_z)
    }

    fn leash_xy(&self) -> f32 {
        self.leash_xy
    }

    fn leash_up_z(&self) -> f32 {
        self.leash_up_z
    }

    fn leash_down_z(&self) -> f32 {
        self.leash_down_z
    }

    fn pos_xy_kp(&self) -> f32 {
        self.pos_xy_k_p
    }

    fn calc_leash_length_xy(&mut self) {
        self.leash_xy = calc_leash_length(self.speed_xy, self.accel_xy, self.pos_xy_k_p);
    }

    fn calc_leash_length_z(&mut self) {
        self.leash_up_z = calc_leash_length(self.speed_up_z, ALT_HOLD_ACCEL_MAX, self.pos_z_k_p);
        self.leash_down_z =
            calc_leash_length(-self.speed_down_z, ALT_HOLD_ACCEL_MAX, self.pos_z_k_p);
    }

    fn trigger_xy(&mut self) {
        self.is_triggered = true;
    }

    fn update_xy_controller(
        &mut self,
        use_desired_velocity: bool,
        position: &Vector3<f32>,
        velocity: &Vector3<f32>,
    ) {
        // the position step only runs when the planner has moved the target
        if self.is_triggered {
            self.pos_to_rate_xy(use_desired_velocity, position);
            self.is_triggered = false;
        }
        self.rate_to_accel_xy(velocity);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn leash_is_linear_at_low_speed() {
        assert_relative_eq!(calc_leash_length(150., 250., 1.), 150.);
        assert_relative_eq!(calc_leash_length(50., 250., 1.), LEASH_LENGTH_MIN);
    }

    #[test]
    fn leash_grows_with_square_of_speed() {
        // 100 / 2 + 500^2 / 200
        assert_relative_eq!(calc_leash_length(500., 100., 1.), 1300.);
    }

    #[test]
    fn leash_without_gain_is_minimum() {
        assert_relative_eq!(calc_leash_length(500., 100., 0.), LEASH_LENGTH_MIN);
    }

    #[test]
    fn default_leashes_follow_default_limits() {
        let controller = PosController::default();

        assert_relative_eq!(controller.leash_xy(), 1300.);
        assert_relative_eq!(controller.leash_up_z(), 250.);
        assert_relative_eq!(controller.leash_down_z(), 150.);
    }

    #[test]
    fn stopping_point_is_ahead_of_motion() {
        let controller = PosController::default();
        let position = Vector3::new(100., 200., 300.);

        let at_rest = controller.stopping_point_xy(&position, &Vector3::zeros());
        assert_eq!(at_rest, position.xy());

        // 50 cm/s is in the linear region: 50 / kP
        let moving = controller.stopping_point_xy(&position, &Vector3::new(50., 0., 0.));
        assert_relative_eq!(moving, Vector2::new(150., 200.));

        let climbing = controller.stopping_point_z(&position, &Vector3::new(0., 0., 100.));
        assert_relative_eq!(climbing, 400.);

        let descending = controller.stopping_point_z(&position, &Vector3::new(0., 0., -1000.));
        assert_relative_eq!(descending, 300. - controller.leash_down_z());
    }

    #[test]
    fn position_step_waits_for_trigger() {
        let mut controller = PosController::default();
        controller.set_pos_target(Vector3::new(50., 0., 0.));

        controller.update_xy_controller(false, &Vector3::zeros(), &Vector3::zeros());
        assert_eq!(controller.vel_target(), Vector2::zeros());

        controller.trigger_xy();
        controller.update_xy_controller(false, &Vector3::zeros(), &Vector3::zeros());
        assert!(!controller.is_triggered());
        assert_relative_eq!(controller.vel_target(), Vector2::new(50., 0.));
        assert_relative_eq!(controller.accel_target(), Vector2::new(50., 0.));
    }

    #[test]
    fn desired_velocity_is_fed_forward() {
        let mut controller = PosController::default();
        controller.set_desired_velocity(Vector2::new(0., 800.));

        controller.trigger_xy();
        controller.update_xy_controller(true, &Vector3::zeros(), &Vector3::zeros());

        // limited to the horizontal speed
        assert_relative_eq!(controller.vel_target(), Vector2::new(0., 500.));
    }
}
