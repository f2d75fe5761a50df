// Configuration validation

use crate::{ConfigError, Result};
use std::fmt::Display;

/// Implemented by configuration structs that can check their own invariants
pub trait Validate {
    fn validate(&self) -> Result<()>;
}

/// Reusable validation rules
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate that a value is not empty
    pub fn not_empty(value: &str, field: &str) -> Result<()> {
        if value.trim().is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "{} cannot be empty",
                field
            )));
        }
        Ok(())
    }

    /// Validate that a number is within an inclusive range
    pub fn in_range<T: PartialOrd + Display>(value: T, min: T, max: T, field: &str) -> Result<()> {
        if value < min || value > max {
            return Err(ConfigError::ValidationError(format!(
                "{} must be between {} and {} (got {})",
                field, min, max, value
            )));
        }
        Ok(())
    }

    /// Validate that `low <= high`
    pub fn ordered<T: PartialOrd + Display>(
        low: T,
        high: T,
        low_field: &str,
        high_field: &str,
    ) -> Result<()> {
        if low > high {
            return Err(ConfigError::ValidationError(format!(
                "{} ({}) cannot exceed {} ({})",
                low_field, low, high_field, high
            )));
        }
        Ok(())
    }
}
