use crate::Error;
use embedded_time::{duration::Milliseconds, Clock};
use nalgebra::Vector3;

/// Inertial navigation estimate in a local earth frame (x north, y east, z up).
pub trait InertialNav {
    /// Current position relative to home in cm.
    fn position(&self) -> Vector3<f32>;

    /// Current velocity in cm/s.
    fn velocity(&self) -> Vector3<f32>;
}

/// Attitude estimate.
pub trait Ahrs {
    fn cos_yaw(&self) -> f32;

    fn sin_yaw(&self) -> f32;

    /// Heading in centi-degrees.
    fn yaw_sensor(&self) -> i32;
}

impl<T> InertialNav for &T
where
    T: InertialNav + ?Sized,
{
    fn position(&self) -> Vector3<f32> {
        (**self).position()
    }

    fn velocity(&self) -> Vector3<f32> {
        (**self).velocity()
    }
}

impl<T> Ahrs for &T
where
    T: Ahrs + ?Sized,
{
    fn cos_yaw(&self) -> f32 {
        (**self).cos_yaw()
    }

    fn sin_yaw(&self) -> f32 {
        (**self).sin_yaw()
    }

    fn yaw_sensor(&self) -> i32 {
        (**self).yaw_sensor()
    }
}

/// Read the current time of `clock` in milliseconds since its epoch.
pub fn millis<C>(clock: &C) -> Result<u32, Error>
where
    C: Clock<T = u32>,
{
    let now = Milliseconds::<u32>::try_from(clock.try_now()?.duration_since_epoch())?;
    Ok(now.0)
}
