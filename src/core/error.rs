//! Core capability errors (identity parsing, value validation).
//!
//! These are domain refusals: bounded, stable, and never a library detail.

use thiserror::Error;

use super::effect::{Effect, Transience};

/// Invalid identifier.
#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum InvalidId {
    #[error("participant id `{raw}` is invalid: {reason}")]
    Participant { raw: String, reason: String },
}

/// A numeric value outside its allowed range.
#[derive(Debug, Error, Clone, PartialEq)]
#[error("{field} value {value} out of range {min}..={max}")]
pub struct RangeError {
    pub field: &'static str,
    pub value: f64,
    pub min: f64,
    pub max: f64,
}

/// Canonical error enum for the core capability.
#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum CoreError {
    #[error(transparent)]
    InvalidId(#[from] InvalidId),
    #[error(transparent)]
    Range(#[from] RangeError),
    #[error("{field} must be finite")]
    NotFinite { field: &'static str },
}

impl CoreError {
    pub fn transience(&self) -> Transience {
        // Core errors are pure input failures.
        Transience::Permanent
    }

    pub fn effect(&self) -> Effect {
        Effect::None
    }
}

pub(crate) fn ensure_finite(field: &'static str, value: f64) -> Result<f64, CoreError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(CoreError::NotFinite { field })
    }
}

pub(crate) fn ensure_range(
    field: &'static str,
    value: f64,
    min: f64,
    max: f64,
) -> Result<f64, CoreError> {
    ensure_finite(field, value)?;
    if value < min || value > max {
        return Err(RangeError {
            field,
            value,
            min,
            max,
        }
        .into());
    }
    Ok(value)
}
