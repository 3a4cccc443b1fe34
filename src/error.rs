use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors raised at the boundary of the engine.
///
/// Everything past validation is a total function: degenerate rate constants are
/// handled analytically and an unfittable reference curve is an empty result.
#[derive(Error, Debug)]
pub enum HrtError {
    #[error("dose amount must be a positive finite number, got {0}")]
    InvalidDoseAmount(f64),

    #[error("measured concentration must be a non-negative finite number, got {0}")]
    InvalidMeasurement(f64),

    #[error("unknown substance model: {0}")]
    UnknownModel(String),

    #[error("unknown ester: {0}")]
    UnknownEster(String),

    #[error("unknown dosing method: {0}")]
    UnknownMethod(String),

    #[error("no pharmacokinetic model for {ester} given by {method}")]
    UnsupportedCombination { ester: String, method: String },

    #[error("invalid model parameters: {0}")]
    InvalidParameters(String),

    #[error("dosing interval must be positive, got {0} days")]
    InvalidInterval(f64),

    #[error("malformed time of day: {0}")]
    InvalidTimeOfDay(String),

    #[error("window ends ({end}) before it starts ({start})")]
    InvalidWindow {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("measurement at {at} precedes the last applied measurement at {last}")]
    OutOfOrderMeasurement {
        at: DateTime<Utc>,
        last: DateTime<Utc>,
    },

    #[error("reference curve must have {expected} daily samples, got {found}")]
    InvalidReferenceCurve { expected: usize, found: usize },

    #[error("target concentration must be positive, got {0}")]
    InvalidTarget(f64),

    #[error("series needs one value per time, got {times} times and {values} values")]
    SeriesLengthMismatch { times: usize, values: usize },

    #[error("no suggested interval yields a feasible regimen")]
    NoFeasibleRegimen,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, HrtError>;
