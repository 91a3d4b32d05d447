//! Persistent tuning parameters.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Default horizontal waypoint speed in cm/s.
pub const WP_SPEED: f32 = 500.;
/// Minimum horizontal waypoint speed in cm/s.
pub const WP_SPEED_MIN: f32 = 100.;
/// Default waypoint radius in cm.
pub const WP_RADIUS: f32 = 200.;
/// Default climb speed in cm/s.
pub const WP_SPEED_UP: f32 = 250.;
/// Default descent speed in cm/s.
pub const WP_SPEED_DOWN: f32 = 150.;
/// Default loiter speed in cm/s.
pub const LOITER_SPEED: f32 = 500.;
/// Minimum loiter speed in cm/s.
pub const LOITER_SPEED_MIN: f32 = 100.;
/// Default horizontal acceleration in cm/s/s.
pub const WP_ACCELERATION: f32 = 100.;

/// Key-value storage that survives reboots.
pub trait ParamStore {
    fn get(&self, name: &str) -> Option<f32>;

    /// Set `name` to `value` and persist it.
    fn set_and_save(&mut self, name: &str, value: f32);
}

impl<T> ParamStore for &mut T
where
    T: ParamStore + ?Sized,
{
    fn get(&self, name: &str) -> Option<f32> {
        (**self).get(name)
    }

    fn set_and_save(&mut self, name: &str, value: f32) {
        (**self).set_and_save(name, value)
    }
}

/// Waypoint and loiter navigation parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct WpNavParams {
    /// Speed in cm/s the vehicle maintains horizontally during a waypoint mission.
    pub speed_cms: f32,
    /// Distance in cm from a waypoint that counts as reaching it.
    pub radius_cm: f32,
    /// Speed in cm/s the vehicle maintains while climbing during a waypoint mission.
    pub speed_up_cms: f32,
    /// Speed in cm/s the vehicle maintains while descending during a waypoint mission.
    pub speed_down_cms: f32,
    /// Maximum horizontal speed in cm/s while loitering.
    pub loiter_speed_cms: f32,
    /// Horizontal acceleration in cm/s/s during a waypoint mission.
    pub accel_cmss: f32,
}

impl Default for WpNavParams {
    fn default() -> Self {
        Self {
            speed_cms: WP_SPEED,
            radius_cm: WP_RADIUS,
            speed_up_cms: WP_SPEED_UP,
            speed_down_cms: WP_SPEED_DOWN,
            loiter_speed_cms: LOITER_SPEED,
            accel_cmss: WP_ACCELERATION,
        }
    }
}

impl WpNavParams {
    pub const SPEED: &'static str = "SPEED";
    pub const RADIUS: &'static str = "RADIUS";
    pub const SPEED_UP: &'static str = "SPEED_UP";
    pub const SPEED_DN: &'static str = "SPEED_DN";
    pub const LOIT_SPEED: &'static str = "LOIT_SPEED";
    pub const ACCEL: &'static str = "ACCEL";

    /// Load the parameters from `store`, using defaults for missing entries.
    pub fn load<S: ParamStore>(store: &S) -> Self {
        let defaults = Self::default();
        Self {
            speed_cms: store.get(Self::SPEED).unwrap_or(defaults.speed_cms),
            radius_cm: store.get(Self::RADIUS).unwrap_or(defaults.radius_cm),
            speed_up_cms: store.get(Self::SPEED_UP).unwrap_or(defaults.speed_up_cms),
            speed_down_cms: store.get(Self::SPEED_DN).unwrap_or(defaults.speed_down_cms),
            loiter_speed_cms: store
                .get(Self::LOIT_SPEED)
                .unwrap_or(defaults.loiter_speed_cms),
            accel_cmss: store.get(Self::ACCEL).unwrap_or(defaults.accel_cmss),
        }
    }

    /// Constrain each parameter to its documented range.
    pub fn clamped(self) -> Self {
        Self {
            speed_cms: self.speed_cms.max(0.).min(2000.),
            radius_cm: self.radius_cm.max(100.).min(1000.),
            speed_up_cms: self.speed_up_cms.max(0.).min(1000.),
            speed_down_cms: self.speed_down_cms.max(0.).min(1000.),
            loiter_speed_cms: self.loiter_speed_cms.max(0.).min(2000.),
            accel_cmss: self.accel_cmss.max(50.).min(500.),
        }
    }
}

/// Barometer calibration and drift parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BaroParams {
    /// Calibrated ground pressure in Pascal.
    pub ground_pressure: f32,
    /// Calibrated ground temperature in degrees C.
    pub ground_temperature: f32,
    /// Altitude offset in meters added to the barometric altitude.
    pub alt_offset: f32,
    /// Drift estimator time constant in seconds. Negative disables drift estimation.
    pub drift_tc: f32,
    /// Seconds after calibration spent averaging the external ground level.
    pub drift_init_period: f32,
}

impl Default for BaroParams {
    fn default() -> Self {
        Self {
            ground_pressure: 0.,
            ground_temperature: 0.,
            alt_offset: 0.,
            drift_tc: 180.,
            drift_init_period: 180.,
        }
    }
}

impl BaroParams {
    pub const ABS_PRESS: &'static str = "ABS_PRESS";
    pub const TEMP: &'static str = "TEMP";
    pub const ALT_OFFSET: &'static str = "ALT_OFFSET";
    pub const DRIFT_TC: &'static str = "DRIFT_TC";
    pub const DRIFT_INIT: &'static str = "DRIFT_INIT";

    /// Load the parameters from `store`, using defaults for missing entries.
    pub fn load<S: ParamStore>(store: &S) -> Self {
        let defaults = Self::default();
        Self {
            ground_pressure: store
                .get(Self::ABS_PRESS)
                .unwrap_or(defaults.ground_pressure),
            ground_temperature: store
                .get(Self::TEMP)
                .unwrap_or(defaults.ground_temperature),
            alt_offset: store.get(Self::ALT_OFFSET).unwrap_or(defaults.alt_offset),
            drift_tc: store.get(Self::DRIFT_TC).unwrap_or(defaults.drift_tc),
            drift_init_period: store
                .get(Self::DRIFT_INIT)
                .unwrap_or(defaults.drift_init_period),
        }
    }
}
