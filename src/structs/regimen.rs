use chrono::NaiveTime;
use serde_derive::{Deserialize, Serialize};

use crate::error::{HrtError, Result};
use crate::structs::model::ModelKey;

/// How doses of a regimen enter the timeline.
///
/// `Manual` regimens only describe intent; every dose is logged by hand.
/// `Automatic` and `Both` regimens are expanded into scheduled doses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TrackingMode {
    #[default]
    Manual,
    Automatic,
    Both,
}

impl TrackingMode {
    pub fn is_scheduled(&self) -> bool {
        matches!(self, TrackingMode::Automatic | TrackingMode::Both)
    }
}

/// A recurring dosing schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimenDefinition {
    model: ModelKey,
    amount: f64,
    interval_days: f64,
    time_of_day: NaiveTime,
    phase_days: Option<f64>,
    mode: TrackingMode,
}

impl RegimenDefinition {
    pub fn new(model: ModelKey, amount: f64, interval_days: f64) -> Result<Self> {
        if !amount.is_finite() || amount <= 0.0 {
            return Err(HrtError::InvalidDoseAmount(amount));
        }
        if !interval_days.is_finite() || interval_days <= 0.0 {
            return Err(HrtError::InvalidInterval(interval_days));
        }
        Ok(RegimenDefinition {
            model,
            amount,
            interval_days,
            time_of_day: default_time_of_day(),
            phase_days: None,
            mode: TrackingMode::default(),
        })
    }

    pub fn with_time_of_day(mut self, time_of_day: NaiveTime) -> Self {
        self.time_of_day = time_of_day;
        self
    }

    /// Parse an `HH:MM` time of day.
    pub fn with_time_of_day_str(self, time_of_day: &str) -> Result<Self> {
        let parsed = NaiveTime::parse_from_str(time_of_day.trim(), "%H:%M")
            .map_err(|_| HrtError::InvalidTimeOfDay(time_of_day.to_string()))?;
        Ok(self.with_time_of_day(parsed))
    }

    /// Align doses to a day of the 28-day cycle. A zero offset disables alignment.
    pub fn with_phase_days(mut self, phase_days: f64) -> Self {
        self.phase_days = if phase_days > 0.0 && phase_days.is_finite() {
            Some(phase_days)
        } else {
            None
        };
        self
    }

    /// Align doses to a day of the 28-day cycle, day zero included.
    pub fn with_cycle_phase(mut self, phase_days: f64) -> Self {
        self.phase_days = (phase_days >= 0.0 && phase_days.is_finite()).then_some(phase_days);
        self
    }

    pub fn with_mode(mut self, mode: TrackingMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn model(&self) -> ModelKey {
        self.model
    }
    pub fn amount(&self) -> f64 {
        self.amount
    }
    pub fn interval_days(&self) -> f64 {
        self.interval_days
    }
    pub fn time_of_day(&self) -> NaiveTime {
        self.time_of_day
    }
    pub fn phase_days(&self) -> Option<f64> {
        self.phase_days
    }
    pub fn mode(&self) -> TrackingMode {
        self.mode
    }
}

/// A regimen proposed by one of the auto-regimen solvers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedRegimen {
    pub model: ModelKey,
    pub amount: f64,
    pub interval_days: f64,
    /// Cycle day the schedule is aligned to. Only cycle-fit schedules carry one.
    pub phase_days: Option<f64>,
}

impl GeneratedRegimen {
    /// Accept the proposal as a schedulable regimen.
    pub fn into_definition(
        &self,
        time_of_day: NaiveTime,
        mode: TrackingMode,
    ) -> Result<RegimenDefinition> {
        let definition = RegimenDefinition::new(self.model, self.amount, self.interval_days)?
            .with_time_of_day(time_of_day)
            .with_mode(mode);
        Ok(match self.phase_days {
            Some(phase) => definition.with_cycle_phase(phase),
            None => definition,
        })
    }
}

fn default_time_of_day() -> NaiveTime {
    NaiveTime::from_hms_opt(8, 0, 0).unwrap_or(NaiveTime::MIN)
}
