use chrono::{DateTime, Utc};
use serde_derive::{Deserialize, Serialize};

use crate::error::{HrtError, Result};
use crate::structs::model::ModelKey;

/// Where a dose record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DoseOrigin {
    Manual,
    Scheduled,
    Imported,
}

/// A single administered (or projected) dose.
///
/// `amount` is in the model's native unit: mg for injections and oral tablets,
/// mcg/day for patches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dose {
    model: ModelKey,
    amount: f64,
    timestamp: DateTime<Utc>,
    origin: DoseOrigin,
}

impl Dose {
    pub fn new(
        model: ModelKey,
        amount: f64,
        timestamp: DateTime<Utc>,
        origin: DoseOrigin,
    ) -> Result<Self> {
        if !amount.is_finite() || amount <= 0.0 {
            return Err(HrtError::InvalidDoseAmount(amount));
        }
        Ok(Dose {
            model,
            amount,
            timestamp,
            origin,
        })
    }

    /// A dose produced by schedule expansion, whose amount the regimen has
    /// already validated.
    pub(crate) fn scheduled(model: ModelKey, amount: f64, timestamp: DateTime<Utc>) -> Self {
        Dose {
            model,
            amount,
            timestamp,
            origin: DoseOrigin::Scheduled,
        }
    }

    pub fn model(&self) -> ModelKey {
        self.model
    }
    pub fn amount(&self) -> f64 {
        self.amount
    }
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
    pub fn origin(&self) -> DoseOrigin {
        self.origin
    }
}

/// A lab result for the circulating concentration, in pg/mL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabMeasurement {
    value: f64,
    timestamp: DateTime<Utc>,
    notes: Option<String>,
    /// Set when the measurement predates the first logged dose but the person
    /// was already following their regimen when it was drawn.
    #[serde(default)]
    on_schedule: bool,
}

impl LabMeasurement {
    pub fn new(value: f64, timestamp: DateTime<Utc>, notes: Option<String>) -> Result<Self> {
        if !value.is_finite() || value < 0.0 {
            return Err(HrtError::InvalidMeasurement(value));
        }
        Ok(LabMeasurement {
            value,
            timestamp,
            notes,
            on_schedule: false,
        })
    }

    pub fn on_schedule(mut self, on_schedule: bool) -> Self {
        self.on_schedule = on_schedule;
        self
    }

    pub fn value(&self) -> f64 {
        self.value
    }
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }
    pub fn is_on_schedule(&self) -> bool {
        self.on_schedule
    }
}

/// Record a manually taken dose. Persisting it is the caller's job.
pub fn log_dose(model: ModelKey, amount: f64, timestamp: DateTime<Utc>) -> Result<Dose> {
    Dose::new(model, amount, timestamp, DoseOrigin::Manual)
}

/// Record a lab measurement. Persisting it is the caller's job.
pub fn log_measurement(
    value: f64,
    timestamp: DateTime<Utc>,
    notes: Option<&str>,
) -> Result<LabMeasurement> {
    LabMeasurement::new(value, timestamp, notes.map(str::to_string))
}
