use nalgebra::{Vector2, Vector3};

mod position;
pub use position::{PosController, ALT_HOLD_ACCEL_MAX, LEASH_LENGTH_MIN};

/// Position controller driven by the navigation planner.
///
/// Positions are in cm from home, velocities in cm/s and accelerations in cm/s/s.
pub trait PositionControl {
    fn pos_target(&self) -> Vector3<f32>;

    fn set_pos_target(&mut self, position: Vector3<f32>);

    /// Horizontal feed forward velocity.
    fn desired_velocity(&self) -> Vector2<f32>;

    fn set_desired_velocity(&mut self, velocity: Vector2<f32>);

    /// Set the maximum horizontal speed.
    fn set_speed_xy(&mut self, speed_cms: f32);

    /// Set the maximum horizontal acceleration.
    fn set_accel_xy(&mut self, accel_cmss: f32);

    /// Set the maximum descent (negative) and climb speeds.
    fn set_speed_z(&mut self, speed_down_cms: f32, speed_up_cms: f32);

    /// Horizontal point the vehicle could stop at from its current position and velocity.
    fn stopping_point_xy(&self, position: &Vector3<f32>, velocity: &Vector3<f32>) -> Vector2<f32>;

    /// Altitude the vehicle could stop at from its current position and velocity.
    fn stopping_point_z(&self, position: &Vector3<f32>, velocity: &Vector3<f32>) -> f32;

    fn leash_xy(&self) -> f32;

    fn leash_up_z(&self) -> f32;

    fn leash_down_z(&self) -> f32;

    /// Proportional gain of the horizontal position controller.
    fn pos_xy_kp(&self) -> f32;

    /// Recalculate the horizontal leash from the current speed and acceleration limits.
    fn calc_leash_length_xy(&mut self);

    /// Recalculate the vertical leashes from the current speed limits.
    fn calc_leash_length_z(&mut self);

    /// Recompute from the position target on the next horizontal update.
    fn trigger_xy(&mut self);

    /// Run the horizontal controller against the current target.
    fn update_xy_controller(
        &mut self,
        use_desired_velocity: bool,
        position: &Vector3<f32>,
        velocity: &Vector3<f32>,
    );
}

impl<T> PositionControl for &mut T
where
    T: PositionControl + ?Sized,
{
    fn pos_target(&self) -> Vector3<f32> {
        (**self).pos_target()
    }

    fn set_pos_target(&mut self, position: Vector3<f32>) {
        (**self).set_pos_target(position)
    }

    fn desired_velocity(&self) -> Vector2<f32> {
        (**self).desired_velocity()
    }

    fn set_desired_velocity(&mut self, velocity: Vector2<f32>) {
        (**self).set_desired_velocity(velocity)
    }

    fn set_speed_xy(&mut self, speed_cms: f32) {
        (**self).set_speed_xy(speed_cms)
    }

    fn set_accel_xy(&mut self, accel_cmss: f32) {
        (**self).set_accel_xy(accel_cmss)
    }

    fn set_speed_z(&mut self, speed_down_cms: f32, speed_up_cms: f32) {
        (**self).set_speed_z(speed_down_cms, speed_up_cms)
    }

    fn stopping_point_xy(&self, position: &Vector3<f32>, velocity: &Vector3<f32>) -> Vector2<f32> {
        (**self).stopping_point_xy(position, velocity)
    }

    fn stopping_point_z(&self, position: &Vector3<f32>, velocity: &Vector3<f32>) -> f32 {
        (**self).stopping_point_z(position, velocity)
    }

    fn leash_xy(&self) -> f32 {
        (**self).leash_xy()
    }

    fn leash_up_z(&self) -> f32 {
        (**self).leash_up_z()
    }

    fn leash_down_z(&self) -> f32 {
        (**self).leash_down_z()
    }

    fn pos_xy_kp(&self) -> f32 {
        (**self).pos_xy_kp()
    }

    fn calc_leash_length_xy(&mut self) {
        (**self).calc_leash_length_xy()
    }

    fn calc_leash_length_z(&mut self) {
        (**self).calc_leash_length_z()
    }

    fn trigger_xy(&mut self) {
        (**self).trigger_xy()
    }

    fn update_xy_controller(
        &mut self,
        use_desired_velocity: bool,
        position: &Vector3<f32>,
        velocity: &Vector3<f32>,
    ) {
        (**self).update_xy_controller(use_desired_velocity, position, velocity)
    }
}
