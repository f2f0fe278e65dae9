//! Heading corrections of the attitude filter.
//!
//! Two ways of folding an absolute heading into the yaw state are offered.
//! The smooth blend nudges yaw a fixed fraction toward the heading and drops
//! headings that disagree too much; it is meant for use while the body moves.
//! The Kalman update treats the heading as a scalar measurement of yaw and
//! also corrects the states correlated with it; it is meant for stationary
//! periods when magnetometer noise is lowest.

use core::f32::consts::{PI, TAU};

use libm::{fabsf, remainderf};

use crate::ekf::{AttitudeEkf, Correction, YAW};
use crate::matrix::{add, inverse1x1, multiply, subtract, transpose, Matrix1, Matrix1x6, Matrix6};

/// Wraps an angle into `(-π, π]`. Non-finite input is returned unchanged.
pub fn wrap_angle(angle: f32) -> f32 {
    if !angle.is_finite() {
        return angle;
    }

    // remainder lies in [-π, π]
    let wrapped = remainderf(angle, TAU);
    if wrapped <= -PI {
        PI
    } else {
        wrapped
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum YawStrategy {
    /// [`AttitudeEkf::update_yaw`]
    Blend,
    /// [`AttitudeEkf::update_with_yaw_measurement`]
    Kalman,
}

impl YawStrategy {
    /// The full Kalman update while stationary; while moving the blend if
    /// `blend_while_moving`, otherwise no heading correction at all.
    pub fn select(stationary: bool, blend_while_moving: bool) -> Option<YawStrategy> {
        if stationary {
            Some(YawStrategy::Kalman)
        } else if blend_while_moving {
            Some(YawStrategy::Blend)
        } else {
            None
        }
    }

    pub fn apply(self, ekf: &mut AttitudeEkf, heading: f32) -> Correction {
        match self {
            YawStrategy::Blend => ekf.update_yaw(heading),
            YawStrategy::Kalman => ekf.update_with_yaw_measurement(heading),
        }
    }
}

impl AttitudeEkf {
    /// Blends yaw toward `heading` along the shortest arc.
    ///
    /// Headings at least `yaw_blend_window` away from the current estimate are
    /// treated as flips or magnetic outliers and discarded.
    pub fn update_yaw(&mut self, heading: f32) -> Correction {
        let difference = wrap_angle(heading - self.yaw());

        if fabsf(difference) >= self.params.yaw_blend_window {
            self.diagnostics.discarded_headings =
                self.diagnostics.discarded_headings.saturating_add(1);
            log_debug!("heading discarded, {} rad off", difference);
            return Correction::Rejected;
        }

        self.state[YAW] += self.params.yaw_blend_gain * difference;
        let decayed = self.covariance[(YAW, YAW)] * self.params.yaw_variance_decay;
        self.covariance[(YAW, YAW)] = decayed.max(self.params.yaw_variance_floor);
        Correction::Applied
    }

    /// Scalar Kalman update with `heading` as a direct observation of yaw.
    pub fn update_with_yaw_measurement(&mut self, heading: f32) -> Correction {
        let innovation = wrap_angle(heading - self.yaw());

        let h = yaw_jacobian();
        let pht = multiply(&self.covariance, &transpose(&h));
        let s = add(
            &multiply(&h, &pht),
            &Matrix1::from_element(self.params.yaw_measurement_noise),
        );

        let inverse = inverse1x1(&s);
        let correction = self.record_inversion(&inverse);
        let k = multiply(&pht, &inverse.or_identity());

        self.state += k * innovation;
        self.covariance = multiply(
            &subtract(&Matrix6::identity(), &multiply(&k, &h)),
            &self.covariance,
        );
        correction
    }
}

fn yaw_jacobian() -> Matrix1x6 {
    let mut h = Matrix1x6::zeros();
    h[(0, YAW)] = 1.0;
    h
}
