use nalgebra::Vector3;

use crate::error::{ensure_unit, ConfigError};
use crate::lowpass::WarmStartLowPass;

#[derive(Debug, Copy, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BiasParams {
    /// Stationary samples averaged before switching to the moving average.
    pub warmup_samples: u32,
    /// Weight of each new stationary sample once warmed up.
    pub update_rate: f32,
}

impl Default for BiasParams {
    fn default() -> Self {
        Self {
            warmup_samples: 100,
            update_rate: 0.01,
        }
    }
}

impl BiasParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.warmup_samples == 0 {
            return Err(ConfigError::NotPositive {
                name: "warmup_samples",
            });
        }
        ensure_unit("update_rate", self.update_rate)
    }
}

/// Gyroscope offset learned from stationary periods.
///
/// Samples taken while moving never reach the estimate. While stationary the
/// body is not rotating, so the corrected rate is exactly zero; otherwise it
/// is the raw rate minus the current offset.
#[derive(Debug, Clone)]
pub struct BiasEstimator {
    filter: WarmStartLowPass<3, 1>,
}

impl Default for BiasEstimator {
    fn default() -> Self {
        Self::new(BiasParams::default())
    }
}

impl BiasEstimator {
    #[must_use]
    pub fn new(params: BiasParams) -> Self {
        Self {
            filter: WarmStartLowPass::new(params.warmup_samples, params.update_rate),
        }
    }

    /// Feeds `raw` into the estimate when `stationary`.
    pub fn update(&mut self, raw: Vector3<f32>, stationary: bool) {
        if !stationary {
            return;
        }

        let was_warm = self.filter.is_initialized();
        self.filter.filter(raw);
        if !was_warm && self.filter.is_initialized() {
            let bias = self.bias();
            log_info!("gyro bias warmed up: {} {} {}", bias.x, bias.y, bias.z);
        }
    }

    /// Bias-corrected angular rate.
    pub fn correct(&self, raw: Vector3<f32>, stationary: bool) -> Vector3<f32> {
        if stationary {
            Vector3::zeros()
        } else {
            raw - self.bias()
        }
    }

    #[inline]
    pub fn bias(&self) -> Vector3<f32> {
        self.filter.last_output
    }

    pub fn is_warmed_up(&self) -> bool {
        self.filter.is_initialized()
    }

    pub fn sample_count(&self) -> u32 {
        self.filter.sample_count()
    }
}

#[cfg(test)]
mod tests {
    extern crate std;
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_warmup_converges_to_constant_offset() {
        let mut estimator = BiasEstimator::default();
        let offset = Vector3::new(0.01, -0.02, 0.005);

        for _ in 0..99 {
            estimator.update(offset, true);
        }
        assert!(!estimator.is_warmed_up());

        estimator.update(offset, true);
        assert!(estimator.is_warmed_up());
        assert_eq!(estimator.sample_count(), 100);
        assert_relative_eq!(estimator.bias(), offset, epsilon = 1e-6);
    }

    #[test]
    fn test_moving_samples_are_ignored() {
        let mut estimator = BiasEstimator::default();
        estimator.update(Vector3::new(1.0, 1.0, 1.0), false);
        assert_eq!(estimator.sample_count(), 0);
        assert_eq!(estimator.bias(), Vector3::zeros());
    }

    #[test]
    fn test_moving_average_after_warmup() {
        let mut estimator = BiasEstimator::new(BiasParams {
            warmup_samples: 1,
            update_rate: 0.01,
        });
        estimator.update(Vector3::new(0.0, 0.0, 0.0), true);
        estimator.update(Vector3::new(1.0, 0.0, 0.0), true);

        assert_relative_eq!(estimator.bias().x, 0.01, epsilon = 1e-7);
        assert_eq!(estimator.sample_count(), 1);
    }

    #[test]
    fn test_default_warmup_then_decay() {
        let mut estimator = BiasEstimator::default();
        let v = Vector3::new(0.02, -0.01, 0.004);
        let w = Vector3::new(0.05, 0.03, -0.02);

        for _ in 0..100 {
            estimator.update(v, true);
        }
        estimator.update(w, true);

        assert_eq!(estimator.sample_count(), 100);
        assert_relative_eq!(estimator.bias(), v * 0.99 + w * 0.01, epsilon = 1e-6);
    }

    #[test]
    fn test_correct_zero_while_stationary() {
        let mut estimator = BiasEstimator::default();
        for _ in 0..100 {
            estimator.update(Vector3::new(0.02, 0.0, 0.0), true);
        }
        let raw = Vector3::new(0.5, 0.1, 0.0);

        assert_eq!(estimator.correct(raw, true), Vector3::zeros());
        assert_relative_eq!(
            estimator.correct(raw, false),
            Vector3::new(0.48, 0.1, 0.0),
            epsilon = 1e-6
        );
    }

    #[test]
    fn test_params_validation() {
        assert_eq!(BiasParams::default().validate(), Ok(()));
        let params = BiasParams {
            update_rate: 1.5,
            ..BiasParams::default()
        };
        assert_eq!(
            params.validate(),
            Err(ConfigError::OutOfUnitRange {
                name: "update_rate"
            })
        );
    }
}
