/// Rejected configuration value. `name` is the offending field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    #[error("`{name}` must be finite and strictly positive")]
    NotPositive { name: &'static str },

    #[error("`{name}` must lie in (0, 1]")]
    OutOfUnitRange { name: &'static str },

    #[error("`{name}` lower bound exceeds upper bound")]
    InvertedBounds { name: &'static str },

    #[error("`max_dynamic_factor` must be at least 1")]
    DynamicFactorBelowOne,
}

pub(crate) fn ensure_positive(name: &'static str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NotPositive { name })
    }
}

pub(crate) fn ensure_unit(name: &'static str, value: f32) -> Result<(), ConfigError> {
    if value > 0.0 && value <= 1.0 {
        Ok(())
    } else {
        Err(ConfigError::OutOfUnitRange { name })
    }
}
