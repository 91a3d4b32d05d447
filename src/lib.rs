//! # embedded-wpnav
//! A `#![no_std]` waypoint and loiter navigation library for embedded multi-copters.
//!
//! # Navigation
//! [`WpNav`] produces an intermediate position target for a position controller to track,
//! either along a straight track, along a cubic hermite spline, or from pilot stick input
//! while loitering.
//!
//! [`control`] contains the [`PositionControl`] interface the planner drives
//! (see [`PosController`] for a reference implementation).
//!
//! # Sensors
//! [`hal`] contains the inertial and attitude interfaces the planner reads from.
//!
//! [`baro`] contains the barometer interface and the [`Altimeter`] built on top of it.
//!
//! # Examples
//! Fly to a waypoint 10 meters north, running the planner from the main loop.
//! ```ignore
//! use embedded_wpnav::{PosController, WpNav, WpNavParams};
//! use nalgebra::Vector3;
//!
//! let mut wpnav = WpNav::new(&inav, &ahrs, PosController::default(), clock, WpNavParams::default());
//! wpnav.set_wp_destination(Vector3::new(1000., 0., 0.))?;
//!
//! while !wpnav.reached_destination() {
//!     wpnav.update_wpnav()?;
//!     let accel = wpnav.pos_control().accel_target();
//!     // Convert the acceleration into a lean angle...
//! }
//! ```

#![no_std]

use embedded_time::{clock, ConversionError};

pub mod baro;
pub use baro::{Altimeter, Barometer};

pub mod control;
pub use control::{PosController, PositionControl};

pub mod filter;

pub mod hal;
pub use hal::{Ahrs, InertialNav};

pub mod math;

pub mod params;
pub use params::{BaroParams, ParamStore, WpNavParams};

pub mod wpnav;
pub use wpnav::{SegmentEnd, SegmentType, WpNav};

#[derive(Debug)]
pub enum Error {
    Clock(clock::Error),
    Time(ConversionError),
    /// The barometer did not report a healthy reading in time.
    BaroTimeout,
}

impl From<clock::Error> for Error {
    fn from(clock_error: clock::Error) -> Self {
        Error::Clock(clock_error)
    }
}

impl From<ConversionError> for Error {
    fn from(time_error: ConversionError) -> Self {
        Error::Time(time_error)
    }
}
