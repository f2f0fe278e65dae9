#![no_std]
#![allow(clippy::needless_doctest_main)]
#![doc = include_str!("../README.md")]

#[macro_use]
mod log;

mod bias;
mod ekf;
mod engine;
mod error;
mod heading;
mod lowpass;
pub mod matrix;
mod yaw;
mod zupt;

pub use bias::{BiasEstimator, BiasParams};
pub use ekf::{Attitude, AttitudeEkf, Correction, Diagnostics, EkfParams, FilterSnapshot};
pub use engine::{EngineConfig, OrientationEngine, ReadingHistory, SensorReading};
pub use error::ConfigError;
pub use heading::{orientation_from_accel_mag, HeadingParams, OrientationAngles};
pub use lowpass::WarmStartLowPass;
pub use yaw::{wrap_angle, YawStrategy};
pub use zupt::{StationaryDetector, ZuptParams};
