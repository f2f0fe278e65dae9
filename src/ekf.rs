use core::f32::consts::{FRAC_PI_2, FRAC_PI_4};

use libm::{atan2f, cosf, fabsf, sinf, sqrtf, tanf};
use nalgebra::{Vector2, Vector3};

use crate::error::{ensure_positive, ensure_unit, ConfigError};
use crate::matrix::{
    add, inverse2x2, multiply, subtract, transpose, Inversion, Matrix2, Matrix2x6, Matrix6,
    Vector6,
};

pub(crate) const ROLL: usize = 0;
pub(crate) const PITCH: usize = 1;
pub(crate) const YAW: usize = 2;
const BIAS_X: usize = 3;
const BIAS_Y: usize = 4;
const BIAS_Z: usize = 5;

/// Tuning constants of the attitude filter.
#[derive(Debug, Copy, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EkfParams {
    /// Gravity magnitude (m/s²).
    pub gravity: f32,
    /// Base process noise of roll, pitch and yaw.
    pub process_noise_angles: f32,
    /// Base process noise of the three gyro biases.
    pub process_noise_bias: f32,
    pub measurement_noise_roll: f32,
    pub measurement_noise_pitch: f32,
    /// Dynamic factor gained per rad/s of angular rate.
    pub motion_noise_gain: f32,
    pub max_dynamic_factor: f32,
    /// Share of the dynamic factor applied to bias process noise.
    pub bias_noise_damping: f32,
    /// Trust factor gained per m/s² of deviation from gravity.
    pub accel_trust_gain: f32,
    pub min_accel_trust: f32,
    pub max_accel_trust: f32,
    /// Accelerometer readings deviating from gravity by more than this are skipped.
    pub accel_gate: f32,
    pub yaw_measurement_noise: f32,
    pub initial_angle_variance: f32,
    pub initial_bias_variance: f32,
    /// Distance from ±π/2 at which the pitch singularity guard engages.
    pub singularity_band: f32,
    /// Pitch is clamped to ±(π/2 - `pitch_margin`) inside the band.
    pub pitch_margin: f32,
    /// Roll and yaw variance floor applied inside the band.
    pub singular_variance_floor: f32,
    pub yaw_blend_gain: f32,
    /// Headings differing from the estimate by this much or more are discarded.
    pub yaw_blend_window: f32,
    pub yaw_variance_decay: f32,
    pub yaw_variance_floor: f32,
}

impl Default for EkfParams {
    fn default() -> Self {
        Self {
            gravity: 9.81,
            process_noise_angles: 0.01,
            process_noise_bias: 0.0001,
            measurement_noise_roll: 0.1,
            measurement_noise_pitch: 0.1,
            motion_noise_gain: 2.0,
            max_dynamic_factor: 10.0,
            bias_noise_damping: 0.1,
            accel_trust_gain: 5.0,
            min_accel_trust: 0.5,
            max_accel_trust: 5.0,
            accel_gate: 1.0,
            yaw_measurement_noise: 0.3,
            initial_angle_variance: 1.0,
            initial_bias_variance: 0.1,
            singularity_band: 0.1,
            pitch_margin: 0.01,
            singular_variance_floor: 0.5,
            yaw_blend_gain: 0.05,
            yaw_blend_window: FRAC_PI_4,
            yaw_variance_decay: 0.95,
            yaw_variance_floor: 0.1,
        }
    }
}

impl EkfParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure_positive("gravity", self.gravity)?;
        ensure_positive("process_noise_angles", self.process_noise_angles)?;
        ensure_positive("process_noise_bias", self.process_noise_bias)?;
        ensure_positive("measurement_noise_roll", self.measurement_noise_roll)?;
        ensure_positive("measurement_noise_pitch", self.measurement_noise_pitch)?;
        ensure_positive("motion_noise_gain", self.motion_noise_gain)?;
        ensure_positive("accel_trust_gain", self.accel_trust_gain)?;
        ensure_positive("min_accel_trust", self.min_accel_trust)?;
        ensure_positive("max_accel_trust", self.max_accel_trust)?;
        ensure_positive("accel_gate", self.accel_gate)?;
        ensure_positive("yaw_measurement_noise", self.yaw_measurement_noise)?;
        ensure_positive("initial_angle_variance", self.initial_angle_variance)?;
        ensure_positive("initial_bias_variance", self.initial_bias_variance)?;
        ensure_positive("singularity_band", self.singularity_band)?;
        ensure_positive("pitch_margin", self.pitch_margin)?;
        ensure_positive("singular_variance_floor", self.singular_variance_floor)?;
        ensure_positive("yaw_blend_window", self.yaw_blend_window)?;
        ensure_positive("yaw_variance_floor", self.yaw_variance_floor)?;
        ensure_unit("bias_noise_damping", self.bias_noise_damping)?;
        ensure_unit("yaw_blend_gain", self.yaw_blend_gain)?;
        ensure_unit("yaw_variance_decay", self.yaw_variance_decay)?;

        if self.max_dynamic_factor.is_nan() || self.max_dynamic_factor < 1.0 {
            return Err(ConfigError::DynamicFactorBelowOne);
        }
        if self.min_accel_trust > self.max_accel_trust {
            return Err(ConfigError::InvertedBounds {
                name: "min_accel_trust",
            });
        }
        if self.pitch_margin >= self.singularity_band {
            return Err(ConfigError::InvertedBounds {
                name: "pitch_margin",
            });
        }
        Ok(())
    }
}

/// Outcome of a measurement update.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Correction {
    Applied,
    /// The innovation covariance was singular; the identity stood in for its
    /// inverse.
    Degenerate,
    /// The measurement was gated out and the filter is unchanged.
    Rejected,
}

/// Counters of the numerical fallbacks taken so far. They never feed back
/// into the estimate.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Diagnostics {
    pub singular_inversions: u32,
    pub rejected_accel: u32,
    pub discarded_headings: u32,
    pub singularity_clamps: u32,
    pub skipped_predictions: u32,
}

/// Roll, pitch and yaw in radians.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Attitude {
    pub roll: f32,
    pub pitch: f32,
    pub yaw: f32,
}

impl Attitude {
    #[must_use]
    pub fn to_degrees(self) -> Attitude {
        Attitude {
            roll: self.roll.to_degrees(),
            pitch: self.pitch.to_degrees(),
            yaw: self.yaw.to_degrees(),
        }
    }
}

/// The complete estimator state: enough to reproduce every later output.
#[derive(Debug, Copy, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FilterSnapshot {
    pub state: [f32; 6],
    pub covariance: [[f32; 6]; 6],
}

/// Extended Kalman filter over `[roll, pitch, yaw, bias_x, bias_y, bias_z]`.
#[derive(Debug, Clone)]
pub struct AttitudeEkf {
    pub(crate) params: EkfParams,
    pub(crate) state: Vector6,
    pub(crate) covariance: Matrix6,
    pub(crate) diagnostics: Diagnostics,
}

impl Default for AttitudeEkf {
    fn default() -> Self {
        AttitudeEkf::new(EkfParams::default())
    }
}

impl AttitudeEkf {
    #[must_use]
    pub fn new(params: EkfParams) -> Self {
        let a = params.initial_angle_variance;
        let b = params.initial_bias_variance;
        AttitudeEkf {
            params,
            state: Vector6::zeros(),
            covariance: Matrix6::from_diagonal(&Vector6::new(a, a, a, b, b, b)),
            diagnostics: Diagnostics::default(),
        }
    }

    #[must_use]
    pub fn from_snapshot(params: EkfParams, snapshot: &FilterSnapshot) -> Self {
        AttitudeEkf {
            params,
            state: Vector6::from(snapshot.state),
            covariance: Matrix6::from_fn(|i, j| snapshot.covariance[i][j]),
            diagnostics: Diagnostics::default(),
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> FilterSnapshot {
        FilterSnapshot {
            state: core::array::from_fn(|i| self.state[i]),
            covariance: core::array::from_fn(|i| {
                core::array::from_fn(|j| self.covariance[(i, j)])
            }),
        }
    }

    #[inline]
    pub fn roll(&self) -> f32 {
        self.state[ROLL]
    }

    #[inline]
    pub fn pitch(&self) -> f32 {
        self.state[PITCH]
    }

    #[inline]
    pub fn yaw(&self) -> f32 {
        self.state[YAW]
    }

    #[inline]
    pub fn bias_x(&self) -> f32 {
        self.state[BIAS_X]
    }

    #[inline]
    pub fn bias_y(&self) -> f32 {
        self.state[BIAS_Y]
    }

    #[inline]
    pub fn bias_z(&self) -> f32 {
        self.state[BIAS_Z]
    }

    #[inline]
    pub fn bias(&self) -> Vector3<f32> {
        Vector3::new(self.bias_x(), self.bias_y(), self.bias_z())
    }

    pub fn attitude(&self) -> Attitude {
        Attitude {
            roll: self.roll(),
            pitch: self.pitch(),
            yaw: self.yaw(),
        }
    }

    pub fn state(&self) -> &Vector6 {
        &self.state
    }

    pub fn covariance(&self) -> &Matrix6 {
        &self.covariance
    }

    pub fn params(&self) -> &EkfParams {
        &self.params
    }

    pub fn diagnostics(&self) -> Diagnostics {
        self.diagnostics
    }

    pub fn set_yaw(&mut self, yaw: f32) {
        self.state[YAW] = yaw;
    }

    /// Zeroes roll, pitch and yaw and their covariance rows and columns,
    /// leaving the bias estimate and its covariance block untouched.
    pub fn reset(&mut self) {
        for i in ROLL..=YAW {
            self.state[i] = 0.0;
            for j in 0..6 {
                if i == j {
                    self.covariance[(i, j)] = self.params.initial_angle_variance;
                } else {
                    self.covariance[(i, j)] = 0.0;
                    self.covariance[(j, i)] = 0.0;
                }
            }
        }
    }

    /// Motion-intensity scaling of the orientation process noise, in
    /// `[1, max_dynamic_factor]`.
    pub fn dynamic_factor(&self, rate_magnitude: f32) -> f32 {
        1.0 + (rate_magnitude * self.params.motion_noise_gain)
            .min(self.params.max_dynamic_factor - 1.0)
    }

    /// Process noise for one prediction step at the given angular-rate
    /// magnitude, before scaling by the elapsed time.
    pub fn process_noise(&self, rate_magnitude: f32) -> Matrix6 {
        let dynamic = self.dynamic_factor(rate_magnitude);
        let angles = self.params.process_noise_angles * dynamic;
        let bias = self.params.process_noise_bias
            * (1.0 + (dynamic - 1.0) * self.params.bias_noise_damping);
        Matrix6::from_diagonal(&Vector6::new(angles, angles, angles, bias, bias, bias))
    }

    /// Accelerometer noise for a reading whose magnitude deviates from gravity
    /// by `deviation`.
    pub fn tilt_noise(&self, deviation: f32) -> Matrix2 {
        let trust = (1.0 + deviation * self.params.accel_trust_gain)
            .clamp(self.params.min_accel_trust, self.params.max_accel_trust);
        Matrix2::new(
            self.params.measurement_noise_roll * trust,
            0.0,
            0.0,
            self.params.measurement_noise_pitch * trust,
        )
    }

    /// Specific force a stationary sensor would read at the current roll and
    /// pitch.
    pub fn expected_acceleration(&self) -> Vector3<f32> {
        let g = self.params.gravity;
        let (roll, pitch) = (self.roll(), self.pitch());
        Vector3::new(
            -g * sinf(pitch),
            g * sinf(roll) * cosf(pitch),
            g * cosf(roll) * cosf(pitch),
        )
    }

    /// Propagates the state with a gyro sample over `dt` seconds.
    ///
    /// `gyro` is in rad/s; the bias held in the state is subtracted before the
    /// body rates are mapped to Euler-angle rates. Non-positive or non-finite
    /// `dt` leaves the filter unchanged.
    pub fn predict(&mut self, gyro: Vector3<f32>, dt: f32) {
        if !(dt.is_finite() && dt > 0.0) {
            self.diagnostics.skipped_predictions =
                self.diagnostics.skipped_predictions.saturating_add(1);
            log_warn!("prediction skipped, dt = {}", dt);
            return;
        }

        let process_noise = self.process_noise(gyro.norm());
        let rate = gyro - self.bias();

        let (sr, cr) = (sinf(self.roll()), cosf(self.roll()));
        let (tp, cp) = (tanf(self.pitch()), cosf(self.pitch()));

        self.state[ROLL] += (rate.x + sr * tp * rate.y + cr * tp * rate.z) * dt;
        self.state[PITCH] += (cr * rate.y - sr * rate.z) * dt;
        self.state[YAW] += (sr / cp * rate.y + cr / cp * rate.z) * dt;

        let f = transition_jacobian(self.roll(), self.pitch(), rate, dt);
        let fpft = multiply(&multiply(&f, &self.covariance), &transpose(&f));
        self.covariance = add(&fpft, &(process_noise * dt));

        self.guard_singularity();
    }

    /// Corrects roll and pitch against the gravity direction.
    ///
    /// Readings whose magnitude is more than `accel_gate` away from gravity
    /// carry linear acceleration and are rejected without touching the state.
    pub fn update(&mut self, accel: Vector3<f32>) -> Correction {
        let deviation = fabsf(accel.norm() - self.params.gravity);
        let noise = self.tilt_noise(deviation);

        if deviation > self.params.accel_gate {
            self.diagnostics.rejected_accel = self.diagnostics.rejected_accel.saturating_add(1);
            log_trace!("accelerometer rejected, deviation {} m/s^2", deviation);
            return Correction::Rejected;
        }

        let measured = Vector2::new(
            atan2f(accel.y, accel.z),
            atan2f(-accel.x, sqrtf(accel.y * accel.y + accel.z * accel.z)),
        );
        let innovation = measured - Vector2::new(self.roll(), self.pitch());

        let h = tilt_jacobian();
        let ht = transpose(&h);
        let pht = multiply(&self.covariance, &ht);
        let s = add(&multiply(&h, &pht), &noise);

        let inverse = inverse2x2(&s);
        let correction = self.record_inversion(&inverse);
        let k = multiply(&pht, &inverse.or_identity());

        self.state += multiply(&k, &innovation);
        self.covariance = multiply(
            &subtract(&Matrix6::identity(), &multiply(&k, &h)),
            &self.covariance,
        );

        self.guard_singularity();
        correction
    }

    pub(crate) fn record_inversion<const N: usize>(
        &mut self,
        inverse: &Inversion<N>,
    ) -> Correction {
        if inverse.is_singular() {
            self.diagnostics.singular_inversions =
                self.diagnostics.singular_inversions.saturating_add(1);
            log_warn!("singular innovation covariance, correction degenerated");
            Correction::Degenerate
        } else {
            Correction::Applied
        }
    }

    /// Keeps pitch away from ±π/2, where the Euler rate equations divide by
    /// zero, and marks roll and yaw as poorly observed while there.
    fn guard_singularity(&mut self) {
        let pitch = self.pitch();
        if fabsf(fabsf(pitch) - FRAC_PI_2) >= self.params.singularity_band {
            return;
        }

        let limit = FRAC_PI_2 - self.params.pitch_margin;
        self.state[PITCH] = pitch.clamp(-limit, limit);

        let floor = self.params.singular_variance_floor;
        self.covariance[(ROLL, ROLL)] = self.covariance[(ROLL, ROLL)].max(floor);
        self.covariance[(YAW, YAW)] = self.covariance[(YAW, YAW)].max(floor);

        self.diagnostics.singularity_clamps = self.diagnostics.singularity_clamps.saturating_add(1);
        log_debug!("pitch {} clamped near gimbal lock", pitch);
    }
}

/// Linearisation of the Euler-rate kinematics around `roll`/`pitch` for the
/// bias-corrected body rate `rate`, discretised over `dt`.
fn transition_jacobian(roll: f32, pitch: f32, rate: Vector3<f32>, dt: f32) -> Matrix6 {
    let (sr, cr) = (sinf(roll), cosf(roll));
    let (sp, cp, tp) = (sinf(pitch), cosf(pitch), tanf(pitch));
    let sec2 = 1.0 / (cp * cp);
    let (q, r) = (rate.y, rate.z);

    let mut f = Matrix6::identity();

    f[(ROLL, ROLL)] += (cr * tp * q - sr * tp * r) * dt;
    f[(ROLL, PITCH)] += (sr * sec2 * q + cr * sec2 * r) * dt;
    f[(ROLL, BIAS_X)] -= dt;
    f[(ROLL, BIAS_Y)] -= sr * tp * dt;
    f[(ROLL, BIAS_Z)] -= cr * tp * dt;

    f[(PITCH, ROLL)] += (-sr * q - cr * r) * dt;
    f[(PITCH, BIAS_Y)] -= cr * dt;
    f[(PITCH, BIAS_Z)] += sr * dt;

    f[(YAW, ROLL)] += (cr / cp * q - sr / cp * r) * dt;
    f[(YAW, PITCH)] += (sr * sp * sec2 * q + cr * sp * sec2 * r) * dt;
    f[(YAW, BIAS_Y)] -= sr / cp * dt;
    f[(YAW, BIAS_Z)] -= cr / cp * dt;

    f
}

/// The accelerometer channel observes roll and pitch directly.
fn tilt_jacobian() -> Matrix2x6 {
    let mut h = Matrix2x6::zeros();
    h[(0, ROLL)] = 1.0;
    h[(1, PITCH)] = 1.0;
    h
}

#[cfg(test)]
mod tests {
    extern crate std;
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    #[test]
    fn test_initial_covariance() {
        let ekf = AttitudeEkf::default();
        let expected = Matrix6::from_diagonal(&Vector6::new(1.0, 1.0, 1.0, 0.1, 0.1, 0.1));
        assert_eq!(*ekf.covariance(), expected);
        assert_eq!(*ekf.state(), Vector6::zeros());
    }

    #[test]
    fn test_dynamic_factor_is_clamped() {
        let ekf = AttitudeEkf::default();
        assert_relative_eq!(ekf.dynamic_factor(0.0), 1.0);
        assert_relative_eq!(ekf.dynamic_factor(1.0), 3.0);
        assert_relative_eq!(ekf.dynamic_factor(100.0), 10.0);
    }

    #[test]
    fn test_process_noise_scales_bias_less() {
        let ekf = AttitudeEkf::default();
        let q = ekf.process_noise(1.0);
        assert_relative_eq!(q[(0, 0)], 0.03, epsilon = 1e-7);
        assert_relative_eq!(q[(2, 2)], 0.03, epsilon = 1e-7);
        assert_relative_eq!(q[(3, 3)], 0.0001 * 1.2, epsilon = 1e-9);
        assert_eq!(q[(0, 1)], 0.0);
    }

    #[test]
    fn test_tilt_noise_trust_bounds() {
        let ekf = AttitudeEkf::default();
        assert_relative_eq!(ekf.tilt_noise(0.0)[(0, 0)], 0.1);
        assert_relative_eq!(ekf.tilt_noise(0.2)[(1, 1)], 0.2, epsilon = 1e-6);
        assert_relative_eq!(ekf.tilt_noise(10.0)[(0, 0)], 0.5, epsilon = 1e-6);
    }

    #[test]
    fn test_expected_acceleration_level() {
        let ekf = AttitudeEkf::default();
        assert_relative_eq!(ekf.expected_acceleration(), Vector3::new(0.0, 0.0, 9.81));
    }

    #[test]
    fn test_jacobian_zero_rate_only_bias_coupling() {
        let f = transition_jacobian(0.0, 0.0, Vector3::zeros(), 0.1);
        let mut expected = Matrix6::identity();
        expected[(ROLL, BIAS_X)] = -0.1;
        expected[(PITCH, BIAS_Y)] = -0.1;
        expected[(YAW, BIAS_Z)] = -0.1;
        assert_relative_eq!(f, expected, epsilon = 1e-7);
    }

    #[test]
    fn test_predict_integrates_roll_rate() {
        let mut ekf = AttitudeEkf::default();
        ekf.predict(Vector3::new(0.5, 0.0, 0.0), 0.1);
        assert_relative_eq!(ekf.roll(), 0.05, epsilon = 1e-6);
        assert_abs_diff_eq!(ekf.pitch(), 0.0);
        assert_abs_diff_eq!(ekf.yaw(), 0.0);
    }

    #[test]
    fn test_predict_rejects_bad_dt() {
        let mut ekf = AttitudeEkf::default();
        let before = ekf.snapshot();
        ekf.predict(Vector3::new(1.0, 1.0, 1.0), 0.0);
        ekf.predict(Vector3::new(1.0, 1.0, 1.0), -0.01);
        ekf.predict(Vector3::new(1.0, 1.0, 1.0), f32::NAN);
        assert_eq!(ekf.snapshot(), before);
        assert_eq!(ekf.diagnostics().skipped_predictions, 3);
    }

    #[test]
    fn test_singularity_guard_clamps_both_signs() {
        let mut ekf = AttitudeEkf::default();
        ekf.state[PITCH] = -FRAC_PI_2;
        ekf.covariance[(ROLL, ROLL)] = 0.01;
        ekf.guard_singularity();

        assert_relative_eq!(ekf.pitch(), -(FRAC_PI_2 - 0.01), epsilon = 1e-6);
        assert_relative_eq!(ekf.covariance()[(ROLL, ROLL)], 0.5);
        assert_eq!(ekf.diagnostics().singularity_clamps, 1);
    }

    #[test]
    fn test_singularity_guard_leaves_moderate_pitch() {
        let mut ekf = AttitudeEkf::default();
        ekf.state[PITCH] = 1.0;
        ekf.guard_singularity();
        assert_eq!(ekf.pitch(), 1.0);
        assert_eq!(ekf.diagnostics().singularity_clamps, 0);
    }

    #[test]
    fn test_update_pulls_toward_measured_tilt() {
        let mut ekf = AttitudeEkf::default();
        let roll = 0.2_f32;
        let accel = Vector3::new(0.0, 9.81 * libm::sinf(roll), 9.81 * libm::cosf(roll));

        assert_eq!(ekf.update(accel), Correction::Applied);
        // P = 1, R = 0.1: gain 1 / 1.1
        assert_relative_eq!(ekf.roll(), roll / 1.1, epsilon = 1e-5);
        assert_relative_eq!(ekf.covariance()[(ROLL, ROLL)], 0.1 / 1.1, epsilon = 1e-5);
    }

    #[test]
    fn test_params_validation() {
        assert_eq!(EkfParams::default().validate(), Ok(()));

        let params = EkfParams {
            gravity: 0.0,
            ..EkfParams::default()
        };
        assert_eq!(
            params.validate(),
            Err(ConfigError::NotPositive { name: "gravity" })
        );

        let params = EkfParams {
            min_accel_trust: 6.0,
            ..EkfParams::default()
        };
        assert_eq!(
            params.validate(),
            Err(ConfigError::InvertedBounds {
                name: "min_accel_trust"
            })
        );

        let params = EkfParams {
            max_dynamic_factor: 0.5,
            ..EkfParams::default()
        };
        assert_eq!(params.validate(), Err(ConfigError::DynamicFactorBelowOne));
    }
}
