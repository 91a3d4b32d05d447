//! Barometric altitude.

use crate::{
    filter::{DerivativeFilter, LowPassFilter},
    hal::millis,
    math::safe_sqrt,
    params::{BaroParams, ParamStore},
    Error,
};
use embedded_hal::blocking::delay::DelayMs;
use embedded_time::Clock;
use log::{info, warn};

/// Milliseconds to wait for a healthy reading during calibration.
const READ_TIMEOUT_MS: u32 = 500;
/// Altitude change in meters after which the airspeed ratio is recalculated.
const EAS2TAS_ALT_THRESHOLD: f32 = 100.;
/// Largest innovation in meters accepted by the drift estimator.
const DRIFT_INNOVATION_MAX: f32 = 5.;

/// Absolute pressure sensor.
pub trait Barometer {
    /// Initialize the sensor, returning `true` on success.
    fn init(&mut self) -> bool;

    /// Read the accumulated samples, returning how many were read.
    fn read(&mut self) -> u8;

    /// Pressure in Pascal from the last read.
    fn pressure(&self) -> f32;

    /// Temperature in degrees C from the last read.
    fn temperature(&self) -> f32;

    /// Accumulate a sample between reads.
    fn accumulate(&mut self) {}

    fn is_healthy(&self) -> bool;

    /// Time in ms of the last successful read.
    fn last_update_ms(&self) -> u32;
}

impl<T> Barometer for &mut T
where
    T: Barometer + ?Sized,
{
    fn init(&mut self) -> bool {
        (**self).init()
    }

    fn read(&mut self) -> u8 {
        (**self).read()
    }

    fn pressure(&self) -> f32 {
        (**self).pressure()
    }

    fn temperature(&self) -> f32 {
        (**self).temperature()
    }

    fn accumulate(&mut self) {
        (**self).accumulate()
    }

    fn is_healthy(&self) -> bool {
        (**self).is_healthy()
    }

    fn last_update_ms(&self) -> u32 {
        (**self).last_update_ms()
    }
}

/// Altitude, climb rate and airspeed ratio from a [`Barometer`] calibrated on the ground.
pub struct Altimeter<B, C> {
    baro: B,
    clock: C,
    params: BaroParams,
    /// Altitude in meters above the calibrated ground pressure.
    altitude: f32,
    last_altitude_ms: Option<u32>,
    last_altitude_eas2tas: f32,
    eas2tas: f32,
    cal_time_ms: u32,
    drift_est: f32,
    drift_gnd_level: f32,
    drift_init_count: u16,
    drift_filter: LowPassFilter,
    climb_rate_filter: DerivativeFilter<7>,
}

impl<B, C> Altimeter<B, C>
where
    B: Barometer,
    C: Clock<T = u32>,
{
    pub fn new(baro: B, clock: C, params: BaroParams) -> Self {
        Self {
            baro,
            clock,
            params,
            altitude: 0.,
            last_altitude_ms: None,
            last_altitude_eas2tas: 0.,
            eas2tas: 0.,
            cal_time_ms: 0,
            drift_est: 0.,
            drift_gnd_level: 0.,
            drift_init_count: 0,
            drift_filter: LowPassFilter::default(),
            climb_rate_filter: DerivativeFilter::new(),
        }
    }

    pub fn baro(&self) -> &B {
        &self.baro
    }

    pub fn baro_mut(&mut self) -> &mut B {
        &mut self.baro
    }

    pub fn params(&self) -> &BaroParams {
        &self.params
    }

    pub fn init(&mut self) -> bool {
        self.baro.init()
    }

    pub fn read(&mut self) -> u8 {
        self.baro.read()
    }

    /// Calibrated ground pressure in Pascal.
    pub fn ground_pressure(&self) -> f32 {
        self.params.ground_pressure
    }

    /// Calibrated ground temperature in degrees C.
    pub fn ground_temperature(&self) -> f32 {
        self.params.ground_temperature
    }

    /// Current drift estimate in meters.
    pub fn drift_estimate(&self) -> f32 {
        self.drift_est
    }

    /// Calibrate the ground pressure and temperature and save them to `store`.
    ///
    /// Blocks for about 1.5 seconds. Fails if the sensor does not report a healthy reading within 500 ms.
    pub fn calibrate<D, S>(&mut self, delay: &mut D, store: &mut S) -> Result<(), Error>
    where
        D: DelayMs<u32>,
        S: ParamStore,
    {
        self.params.alt_offset = 0.;
        store.set_and_save(BaroParams::ALT_OFFSET, 0.);

        // the first readings are often bad
        self.wait_for_reading(delay, 20)?;
        delay.delay_ms(20);

        let mut ground_pressure = 0.;
        let mut ground_temperature = 0.;
        for _ in 0..10 {
            self.wait_for_reading(delay, 1)?;
            ground_pressure = self.baro.pressure();
            ground_temperature = self.baro.temperature();
            delay.delay_ms(100);
        }

        for _ in 0..5 {
            self.wait_for_reading(delay, 1)?;
            ground_pressure = ground_pressure * 0.8 + self.baro.pressure() * 0.2;
            ground_temperature = ground_temperature * 0.8 + self.baro.temperature() * 0.2;
            delay.delay_ms(100);
        }

        self.params.ground_pressure = ground_pressure;
        self.params.ground_temperature = ground_temperature;
        store.set_and_save(BaroParams::ABS_PRESS, ground_pressure);
        store.set_and_save(BaroParams::TEMP, ground_temperature);
        self.cal_time_ms = self.now_ms()?;

        info!(
            "barometer calibrated to {} Pa at {} C",
            ground_pressure, ground_temperature
        );
        Ok(())
    }

    /// Recalibrate to the current reading without saving.
    pub fn update_calibration(&mut self) -> Result<(), Error> {
        self.params.ground_pressure = self.baro.pressure();
        self.params.ground_temperature = self.baro.temperature();
        self.cal_time_ms = self.now_ms()?;
        Ok(())
    }

    /// Altitude in meters between `base_pressure` and `pressure`, at the calibrated ground temperature.
    pub fn altitude_difference(&self, base_pressure: f32, pressure: f32) -> f32 {
        let scaling = pressure / base_pressure;
        let temp = self.params.ground_temperature + 273.15;
        153.8462 * temp * (1. - (0.190259 * scaling.ln()).exp())
    }

    /// Altitude in meters above the calibration point, corrected for offset and drift.
    ///
    /// Returns 0 until the barometer is calibrated.
    pub fn altitude(&mut self) -> f32 {
        if self.params.ground_pressure == 0. {
            return 0.;
        }

        let last_update = self.baro.last_update_ms();
        if self.last_altitude_ms != Some(last_update) {
            self.altitude = self.altitude_difference(self.params.ground_pressure, self.baro.pressure());
            self.last_altitude_ms = Some(last_update);
            self.climb_rate_filter.update(self.altitude, last_update);
        }

        self.altitude + self.params.alt_offset - self.drift_est
    }

    /// Ratio of true to equivalent airspeed at the current altitude.
    pub fn eas2tas(&mut self) -> f32 {
        if (self.altitude - self.last_altitude_eas2tas).abs() < EAS2TAS_ALT_THRESHOLD
            && self.eas2tas != 0.
        {
            return self.eas2tas;
        }

        let temp_k = self.params.ground_temperature + 273.15 - 0.0065 * self.altitude;
        self.eas2tas = safe_sqrt(1.225 / (self.baro.pressure() / (287.26 * temp_k)));
        self.last_altitude_eas2tas = self.altitude;
        self.eas2tas
    }

    /// Climb rate in m/s.
    pub fn climb_rate(&mut self) -> f32 {
        self.climb_rate_filter.slope() * 1e3
    }

    /// Update the drift estimate from an external altitude `alt` (in meters) sampled every `dt` seconds.
    ///
    /// The external ground level is averaged for the configured period after calibration.
    pub fn update_drift_estimate(&mut self, alt: f32, dt: f32) -> Result<(), Error> {
        let since_cal_ms = self.now_ms()?.wrapping_sub(self.cal_time_ms);
        if (since_cal_ms as f32) < self.params.drift_init_period * 1000. {
            self.drift_gnd_level += alt;
            self.drift_init_count = self.drift_init_count.saturating_add(1);
            return Ok(());
        }

        if self.drift_init_count > 0 {
            self.drift_gnd_level /= f32::from(self.drift_init_count);
            self.drift_init_count = 0;
            self.drift_filter.set_time_constant(dt, self.params.drift_tc);
            self.drift_est = self.drift_filter.apply(0.);
        }

        if self.params.drift_tc < 0. {
            self.drift_est = 0.;
            return Ok(());
        }

        let innovation =
            self.altitude + self.params.alt_offset - self.drift_est - (alt - self.drift_gnd_level);
        if innovation < DRIFT_INNOVATION_MAX {
            self.drift_filter.set_time_constant(dt, self.params.drift_tc);
            self.drift_est = self.drift_filter.apply(innovation + self.drift_est);
        }

        Ok(())
    }

    /// Poll the sensor until it reports a healthy reading, waiting `poll_ms` between reads.
    fn wait_for_reading<D>(&mut self, delay: &mut D, poll_ms: u32) -> Result<(), Error>
    where
        D: DelayMs<u32>,
    {
        let start = self.now_ms()?;
        loop {
            self.baro.read();
            if self.baro.is_healthy() && self.baro.pressure() != 0. {
                return Ok(());
            }

            if self.now_ms()?.wrapping_sub(start) > READ_TIMEOUT_MS {
                warn!("no healthy barometer reading for {} ms", READ_TIMEOUT_MS);
                return Err(Error::BaroTimeout);
            }
            delay.delay_ms(poll_ms);
        }
    }

    fn now_ms(&self) -> Result<u32, Error> {
        millis(&self.clock)
    }
}
