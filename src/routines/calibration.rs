//! Calibration of the model against lab results
//!
//! Each measurement contributes the ratio of measured to predicted concentration.
//! Ratios are blended with exponential weights that halve every
//! `half_life_days`, and the blended factor scales all later estimates. A
//! measurement taken while no dose contributes yet cannot form a ratio; it seeds a
//! baseline residual that decays with the terminal rate constant instead.

use chrono::{DateTime, Utc};
use serde_derive::{Deserialize, Serialize};

use crate::error::{HrtError, Result};
use crate::routines::settings::CalibrationSettings;
use crate::simulator::elapsed_days;
use crate::structs::dose::LabMeasurement;

/// Bounds of the reported scaling factor.
pub const FACTOR_BOUNDS: (f64, f64) = (0.0, 2.0);

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct Baseline {
    value: f64,
    at: DateTime<Utc>,
}

/// Running state of the calibration filter. Updates must be applied in
/// measurement order; use [CalibrationState::replay] after a retroactive entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationState {
    half_life_days: f64,
    min_prediction: f64,
    baseline_k3: f64,
    weighted_sum: f64,
    weighted_squares: f64,
    weight_total: f64,
    factor: f64,
    samples: usize,
    last_update: Option<DateTime<Utc>>,
    baseline: Option<Baseline>,
}

impl CalibrationState {
    /// A fresh filter. `baseline_k3` is the terminal rate constant used to decay
    /// the baseline residual.
    pub fn new(half_life_days: f64, min_prediction: f64, baseline_k3: f64) -> Result<Self> {
        if !half_life_days.is_finite() || half_life_days <= 0.0 {
            return Err(HrtError::InvalidParameters(format!(
                "calibration half-life must be positive, got {}",
                half_life_days
            )));
        }
        if !baseline_k3.is_finite() || baseline_k3 <= 0.0 {
            return Err(HrtError::InvalidParameters(format!(
                "baseline decay constant must be positive, got {}",
                baseline_k3
            )));
        }
        Ok(CalibrationState {
            half_life_days,
            min_prediction: min_prediction.max(0.0),
            baseline_k3,
            weighted_sum: 0.0,
            weighted_squares: 0.0,
            weight_total: 0.0,
            factor: 1.0,
            samples: 0,
            last_update: None,
            baseline: None,
        })
    }

    pub fn from_settings(settings: &CalibrationSettings, baseline_k3: f64) -> Result<Self> {
        Self::new(settings.half_life_days, settings.min_prediction, baseline_k3)
    }

    /// Current scaling factor, within [FACTOR_BOUNDS].
    pub fn factor(&self) -> f64 {
        self.factor
    }

    /// Weighted variance of the measured/predicted ratios.
    pub fn variance(&self) -> f64 {
        if self.weight_total <= 0.0 {
            return 0.0;
        }
        let mean = self.weighted_sum / self.weight_total;
        (self.weighted_squares / self.weight_total - mean * mean).max(0.0)
    }

    /// Number of measurements that contributed a ratio.
    pub fn samples(&self) -> usize {
        self.samples
    }

    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        self.last_update
    }

    fn decay_rate(&self) -> f64 {
        std::f64::consts::LN_2 / self.half_life_days
    }

    /// Apply one measurement together with the raw model prediction at its time.
    /// Returns the new factor.
    pub fn update(&mut self, measurement: &LabMeasurement, prediction: f64) -> Result<f64> {
        let at = measurement.timestamp();
        if let Some(last) = self.last_update {
            if at < last {
                return Err(HrtError::OutOfOrderMeasurement { at, last });
            }
            let decay = (-self.decay_rate() * elapsed_days(at, last)).exp();
            self.weighted_sum *= decay;
            self.weighted_squares *= decay;
            self.weight_total *= decay;
        }
        self.last_update = Some(at);

        // Also catches a NaN prediction
        if !(prediction >= self.min_prediction) {
            tracing::warn!(
                "Prediction {:.3} at {} is below {}, using {:.1} as baseline residual",
                prediction,
                at,
                self.min_prediction,
                measurement.value()
            );
            self.baseline = Some(Baseline {
                value: measurement.value(),
                at,
            });
            return Ok(self.factor);
        }

        let ratio = measurement.value() / prediction;
        self.weighted_sum += ratio;
        self.weighted_squares += ratio * ratio;
        self.weight_total += 1.0;
        self.samples += 1;
        self.baseline = None;

        let (low, high) = FACTOR_BOUNDS;
        self.factor = (self.weighted_sum / self.weight_total).clamp(low, high);
        tracing::debug!(
            "Calibration ratio {:.3} at {}, factor now {:.3} (variance {:.4})",
            ratio,
            at,
            self.factor,
            self.variance()
        );
        Ok(self.factor)
    }

    /// Residual left by a measurement taken before any dose contributed.
    pub fn baseline_at(&self, at: DateTime<Utc>) -> f64 {
        match self.baseline {
            Some(baseline) if at >= baseline.at => {
                baseline.value * (-self.baseline_k3 * elapsed_days(at, baseline.at)).exp()
            }
            _ => 0.0,
        }
    }

    /// Calibrated estimate for a raw aggregate at `at`. Not clamped.
    pub fn estimate(&self, raw: f64, at: DateTime<Utc>) -> f64 {
        self.factor * raw + self.baseline_at(at)
    }

    /// Rebuild the filter from a full measurement history, in time order.
    /// `predictor` gives the raw prediction for each measurement.
    pub fn replay<F>(&self, measurements: &[LabMeasurement], mut predictor: F) -> Result<Self>
    where
        F: FnMut(&LabMeasurement) -> f64,
    {
        let mut ordered: Vec<&LabMeasurement> = measurements.iter().collect();
        ordered.sort_by_key(|m| m.timestamp());

        let mut state = Self::new(self.half_life_days, self.min_prediction, self.baseline_k3)?;
        for measurement in ordered {
            let prediction = predictor(measurement);
            state.update(measurement, prediction)?;
        }
        Ok(state)
    }
}
