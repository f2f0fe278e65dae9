//! Absolute orientation from a single accelerometer and magnetometer pair.
//!
//! The device frame is the usual handset one: x to the right, y forward, z out
//! of the screen. The accelerometer reads the reaction to gravity, so a device
//! lying flat reads `+g` on z. Azimuth is measured from magnetic north toward
//! east.

use libm::{asinf, atan2f};
use nalgebra::Vector3;

use crate::error::{ensure_positive, ensure_unit, ConfigError};

#[derive(Debug, Copy, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HeadingParams {
    /// Length of `mag × accel` (before normalisation) below which the field is
    /// too close to vertical, or too weak, to define east.
    pub min_field_norm: f32,
    /// Accelerometer magnitudes below this share of gravity count as free fall.
    pub free_fall_fraction: f32,
    pub gravity: f32,
}

impl Default for HeadingParams {
    fn default() -> Self {
        Self {
            min_field_norm: 0.1,
            free_fall_fraction: 0.1,
            gravity: 9.81,
        }
    }
}

impl HeadingParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure_positive("min_field_norm", self.min_field_norm)?;
        ensure_unit("free_fall_fraction", self.free_fall_fraction)?;
        ensure_positive("gravity", self.gravity)
    }
}

/// Radians.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OrientationAngles {
    pub azimuth: f32,
    pub pitch: f32,
    pub roll: f32,
}

/// Builds the east, north and up axes from the two field vectors and reads
/// the angles off the resulting rotation matrix.
///
/// Returns `None` in free fall, and when the magnetic field is (anti)parallel
/// to gravity or absent.
pub fn orientation_from_accel_mag(
    accel: Vector3<f32>,
    mag: Vector3<f32>,
    params: &HeadingParams,
) -> Option<OrientationAngles> {
    let free_fall = params.free_fall_fraction * params.gravity;
    if accel.norm_squared() < free_fall * free_fall {
        return None;
    }

    let east = mag.cross(&accel);
    let east_norm = east.norm();
    if east_norm < params.min_field_norm {
        return None;
    }
    let east = east / east_norm;
    let up = accel / accel.norm();
    let north = up.cross(&east);

    Some(OrientationAngles {
        azimuth: atan2f(east.y, north.y),
        pitch: asinf(-up.y),
        roll: atan2f(-up.x, up.z),
    })
}
