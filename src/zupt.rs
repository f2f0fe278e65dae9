use heapless::Deque;
use nalgebra::Vector3;

use crate::error::{ensure_positive, ConfigError};

#[derive(Debug, Copy, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ZuptParams {
    /// Angular-rate magnitude (rad/s) below which a sample counts as still.
    pub movement_threshold: f32,
}

impl Default for ZuptParams {
    fn default() -> Self {
        Self {
            movement_threshold: 0.03,
        }
    }
}

impl ZuptParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure_positive("movement_threshold", self.movement_threshold)
    }
}

/// Zero-velocity detector over the last `N` gyro magnitudes.
///
/// The body is stationary once the window is full and every magnitude in it
/// is strictly below the threshold. Until the window fills the previous
/// decision is kept, which is "moving" for a fresh detector.
#[derive(Debug, Clone)]
pub struct StationaryDetector<const N: usize = 7> {
    params: ZuptParams,
    window: Deque<f32, N>,
    stationary: bool,
}

impl<const N: usize> Default for StationaryDetector<N> {
    fn default() -> Self {
        Self::new(ZuptParams::default())
    }
}

impl<const N: usize> StationaryDetector<N> {
    #[must_use]
    pub fn new(params: ZuptParams) -> Self {
        Self {
            params,
            window: Deque::new(),
            stationary: false,
        }
    }

    /// Records one gyro sample and returns the updated decision.
    pub fn update(&mut self, gyro: Vector3<f32>) -> bool {
        if self.window.is_full() {
            self.window.pop_front();
        }
        // cannot fail, a slot was freed above
        let _ = self.window.push_back(gyro.norm());

        if self.window.is_full() {
            let threshold = self.params.movement_threshold;
            let stationary = self.window.iter().all(|&magnitude| magnitude < threshold);
            if stationary != self.stationary {
                if stationary {
                    log_info!("stationary");
                } else {
                    log_info!("moving");
                }
            }
            self.stationary = stationary;
        }
        self.stationary
    }

    #[inline]
    pub fn is_stationary(&self) -> bool {
        self.stationary
    }

    /// Number of magnitudes currently held, at most `N`.
    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    pub fn params(&self) -> &ZuptParams {
        &self.params
    }
}
