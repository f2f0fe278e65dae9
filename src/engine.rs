//! Per-sample routing of raw gyroscope, accelerometer and magnetometer
//! readings through the detector, the bias estimator and the filter.

use core::time::Duration;

use heapless::Deque;
use nalgebra::Vector3;

use crate::bias::{BiasEstimator, BiasParams};
use crate::ekf::{Attitude, AttitudeEkf, Correction, EkfParams};
use crate::error::ConfigError;
use crate::heading::{orientation_from_accel_mag, HeadingParams};
use crate::yaw::YawStrategy;
use crate::zupt::{StationaryDetector, ZuptParams};

#[derive(Debug, Copy, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EngineConfig {
    pub ekf: EkfParams,
    pub zupt: ZuptParams,
    pub bias: BiasParams,
    pub heading: HeadingParams,
    /// Blend magnetometer headings into yaw while the body is moving too.
    pub blend_while_moving: bool,
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.ekf.validate()?;
        self.zupt.validate()?;
        self.bias.validate()?;
        self.heading.validate()
    }
}

/// One row of the engine's output trace, recorded per gyroscope sample.
#[derive(Debug, Copy, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SensorReading {
    pub timestamp: Duration,
    /// Bias-corrected rate, zero while stationary.
    pub gyro: [f32; 3],
    pub accel: [f32; 3],
    pub mag: [f32; 3],
    /// Dead-reckoned angles from the corrected rate alone.
    pub integrated: [f32; 3],
    pub filtered: Attitude,
    pub stationary: bool,
}

/// Most recent `N` readings, oldest first.
#[derive(Debug, Clone)]
pub struct ReadingHistory<const N: usize> {
    readings: Deque<SensorReading, N>,
}

impl<const N: usize> Default for ReadingHistory<N> {
    fn default() -> Self {
        Self {
            readings: Deque::new(),
        }
    }
}

impl<const N: usize> ReadingHistory<N> {
    /// Appends `reading`, evicting the oldest one when full.
    pub fn push(&mut self, reading: SensorReading) {
        if self.readings.is_full() {
            self.readings.pop_front();
        }
        let _ = self.readings.push_back(reading);
    }

    pub fn iter(&self) -> impl Iterator<Item = &SensorReading> {
        self.readings.iter()
    }

    pub fn latest(&self) -> Option<&SensorReading> {
        self.readings.back()
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    pub fn clear(&mut self) {
        self.readings.clear();
    }
}

/// Orientation estimator fed directly with timestamped sensor samples.
///
/// ```
/// use core::time::Duration;
/// use euler_ekf::{EngineConfig, OrientationEngine};
/// use nalgebra::Vector3;
///
/// let mut engine: OrientationEngine = OrientationEngine::new(EngineConfig::default()).unwrap();
/// for i in 0..50u64 {
///     let t = Duration::from_millis(10 * i);
///     engine.on_gyro(t, Vector3::new(0.001, -0.001, 0.0));
///     engine.on_accel(Vector3::new(0.0, 0.0, 9.81));
///     engine.on_mag(Vector3::new(0.0, 22.0, -40.0));
/// }
/// assert!(engine.is_stationary());
/// assert!(engine.attitude().roll.abs() < 1e-3);
/// ```
#[derive(Debug, Clone)]
pub struct OrientationEngine<const HISTORY: usize = 100> {
    config: EngineConfig,
    ekf: AttitudeEkf,
    detector: StationaryDetector,
    bias: BiasEstimator,
    history: ReadingHistory<HISTORY>,
    last_gyro_timestamp: Option<Duration>,
    last_accel: Option<Vector3<f32>>,
    last_mag: Option<Vector3<f32>>,
    integrated: Vector3<f32>,
    absolute_yaw: f32,
}

impl<const HISTORY: usize> OrientationEngine<HISTORY> {
    pub fn new(config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            ekf: AttitudeEkf::new(config.ekf),
            detector: StationaryDetector::new(config.zupt),
            bias: BiasEstimator::new(config.bias),
            history: ReadingHistory::default(),
            last_gyro_timestamp: None,
            last_accel: None,
            last_mag: None,
            integrated: Vector3::zeros(),
            absolute_yaw: 0.0,
        })
    }

    /// Handles one gyroscope sample (rad/s) taken at `timestamp`.
    ///
    /// The first sample after construction or [`reset`](Self::reset) only
    /// establishes the time base.
    pub fn on_gyro(&mut self, timestamp: Duration, raw: Vector3<f32>) -> SensorReading {
        let stationary = self.detector.update(raw);
        self.bias.update(raw, stationary);
        let gyro = self.bias.correct(raw, stationary);

        if let Some(previous) = self.last_gyro_timestamp {
            match timestamp.checked_sub(previous) {
                Some(elapsed) if !elapsed.is_zero() => {
                    let dt = elapsed.as_secs_f32();
                    self.integrated += gyro * dt;
                    self.ekf.predict(gyro, dt);
                }
                _ => {
                    log_warn!("gyro timestamp did not advance, prediction skipped");
                }
            }
        }
        self.last_gyro_timestamp = Some(timestamp);

        let reading = SensorReading {
            timestamp,
            gyro: gyro.into(),
            accel: self.last_accel.unwrap_or_else(Vector3::zeros).into(),
            mag: self.last_mag.unwrap_or_else(Vector3::zeros).into(),
            integrated: self.integrated.into(),
            filtered: self.ekf.attitude(),
            stationary,
        };
        self.history.push(reading);
        reading
    }

    /// Handles one accelerometer sample (m/s²).
    pub fn on_accel(&mut self, raw: Vector3<f32>) -> Correction {
        self.last_accel = Some(raw);
        self.ekf.update(raw)
    }

    /// Handles one magnetometer sample.
    ///
    /// Returns `None` when no heading could be derived or the current motion
    /// state calls for no yaw correction.
    pub fn on_mag(&mut self, raw: Vector3<f32>) -> Option<Correction> {
        self.last_mag = Some(raw);

        let accel = self.last_accel?;
        let orientation = orientation_from_accel_mag(accel, raw, &self.config.heading)?;
        self.absolute_yaw = orientation.azimuth;

        YawStrategy::select(self.detector.is_stationary(), self.config.blend_while_moving)
            .map(|strategy| strategy.apply(&mut self.ekf, orientation.azimuth))
    }

    /// Zeroes the attitude and the integrated angles. The learned gyro bias,
    /// the detector window and the history are kept.
    pub fn reset(&mut self) {
        self.ekf.reset();
        self.integrated = Vector3::zeros();
        self.absolute_yaw = 0.0;
        self.last_gyro_timestamp = None;
    }

    pub fn attitude(&self) -> Attitude {
        self.ekf.attitude()
    }

    pub fn filter(&self) -> &AttitudeEkf {
        &self.ekf
    }

    pub fn is_stationary(&self) -> bool {
        self.detector.is_stationary()
    }

    pub fn gyro_bias(&self) -> Vector3<f32> {
        self.bias.bias()
    }

    /// Azimuth of the most recent magnetometer heading.
    pub fn absolute_yaw(&self) -> f32 {
        self.absolute_yaw
    }

    pub fn integrated_angles(&self) -> Vector3<f32> {
        self.integrated
    }

    pub fn history(&self) -> &ReadingHistory<HISTORY> {
        &self.history
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}
