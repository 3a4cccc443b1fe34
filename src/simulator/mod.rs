pub mod analytical;
pub mod cache;

use chrono::{DateTime, Duration, Utc};
use serde_derive::{Deserialize, Serialize};

use crate::error::{HrtError, Result};
use crate::structs::dose::Dose;
use crate::structs::model::{ModelKey, SubstanceModel};
use crate::structs::units::ConcentrationUnit;

use analytical::{contribution, repeated_dose_level};
use cache::horizon;

const MS_PER_DAY: f64 = 86_400_000.0;

/// Fractional days from `from` to `at`. Negative when `at` is earlier.
pub fn elapsed_days(at: DateTime<Utc>, from: DateTime<Utc>) -> f64 {
    (at - from).num_milliseconds() as f64 / MS_PER_DAY
}

pub(crate) fn days_to_duration(days: f64) -> Duration {
    Duration::milliseconds((days * MS_PER_DAY).round() as i64)
}

/// Contribution of one dose at `at`, zero once the dose is past its model's cutoff.
pub fn dose_contribution(at: DateTime<Utc>, dose: &Dose) -> f64 {
    let model = dose.model().model();
    let t = elapsed_days(at, dose.timestamp());
    if t > horizon(&model).cutoff {
        return 0.0;
    }
    contribution(t, dose.amount(), &model)
}

/// Raw (uncalibrated) concentration at `at` from an unordered list of doses.
pub fn total_at(at: DateTime<Utc>, doses: &[Dose]) -> f64 {
    doses.iter().map(|dose| dose_contribution(at, dose)).sum()
}

/// Doses sorted by time, so that a query only scans the doses that can still
/// contribute.
#[derive(Debug, Clone, Default)]
pub struct DoseTimeline {
    doses: Vec<Dose>,
    cutoffs: [f64; ModelKey::ALL.len()],
    max_cutoff: f64,
}

impl DoseTimeline {
    pub fn new(mut doses: Vec<Dose>) -> Self {
        doses.sort_by_key(|dose| dose.timestamp());

        let mut cutoffs = [0.0; ModelKey::ALL.len()];
        for key in ModelKey::ALL {
            cutoffs[key.index()] = horizon(&key.model()).cutoff;
        }
        let max_cutoff = doses
            .iter()
            .map(|dose| cutoffs[dose.model().index()])
            .fold(0.0, f64::max);

        DoseTimeline {
            doses,
            cutoffs,
            max_cutoff,
        }
    }

    pub fn doses(&self) -> &[Dose] {
        &self.doses
    }

    pub fn len(&self) -> usize {
        self.doses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.doses.is_empty()
    }

    pub fn earliest(&self) -> Option<DateTime<Utc>> {
        self.doses.first().map(Dose::timestamp)
    }

    /// The slice of doses that may contribute at `at`.
    pub fn window(&self, at: DateTime<Utc>) -> &[Dose] {
        let oldest = at - days_to_duration(self.max_cutoff.ceil());
        let start = self.doses.partition_point(|dose| dose.timestamp() < oldest);
        let end = self.doses.partition_point(|dose| dose.timestamp() <= at);
        &self.doses[start..end.max(start)]
    }

    /// Raw (uncalibrated) concentration at `at`.
    pub fn total_at(&self, at: DateTime<Utc>) -> f64 {
        self.window(at)
            .iter()
            .map(|dose| {
                let t = elapsed_days(at, dose.timestamp());
                if t > self.cutoffs[dose.model().index()] {
                    0.0
                } else {
                    contribution(t, dose.amount(), &dose.model().model())
                }
            })
            .sum()
    }
}

/// Most past doses summed for one steady-state level. Intervals short enough to
/// exceed this are minutes apart and not a dosing schedule.
pub const MAX_STEADY_STATE_CYCLES: usize = 100_000;

/// Number of past doses that still matter at steady state.
pub fn steady_state_cycles(model: &SubstanceModel, interval: f64) -> Result<usize> {
    if !interval.is_finite() || interval <= 0.0 {
        return Err(HrtError::InvalidInterval(interval));
    }
    let cycles = (horizon(model).cutoff / interval).ceil() + 1.0;
    if !(cycles <= MAX_STEADY_STATE_CYCLES as f64) {
        return Err(HrtError::InvalidInterval(interval));
    }
    Ok(cycles as usize)
}

/// Level `offset` days after a dose, once the regimen has run long enough for
/// the start-up transient to vanish.
pub fn steady_state_level(
    model: &SubstanceModel,
    dose: f64,
    interval: f64,
    offset: f64,
) -> Result<f64> {
    let cycles = steady_state_cycles(model, interval)?;
    Ok(repeated_dose_level(offset, dose, interval, cycles, model))
}

/// Steady-state level immediately before the next dose.
pub fn steady_state_trough(model: &SubstanceModel, dose: f64, interval: f64) -> Result<f64> {
    steady_state_level(model, dose, interval, interval)
}

/// Concentrations at a list of instants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    times: Vec<DateTime<Utc>>,
    values: Vec<f64>,
    unit: ConcentrationUnit,
}

impl Series {
    /// A series in pg/mL, one value per time.
    pub fn new(times: Vec<DateTime<Utc>>, values: Vec<f64>) -> Result<Self> {
        if times.len() != values.len() {
            return Err(HrtError::SeriesLengthMismatch {
                times: times.len(),
                values: values.len(),
            });
        }
        Ok(Series {
            times,
            values,
            unit: ConcentrationUnit::PgPerMl,
        })
    }

    pub fn times(&self) -> &[DateTime<Utc>] {
        &self.times
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn unit(&self) -> ConcentrationUnit {
        self.unit
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (DateTime<Utc>, f64)> + '_ {
        self.times.iter().copied().zip(self.values.iter().copied())
    }

    pub fn max(&self) -> Option<f64> {
        self.values.iter().copied().reduce(f64::max)
    }

    pub fn to_unit(&self, unit: ConcentrationUnit) -> Series {
        let values = self
            .values
            .iter()
            .map(|v| unit.from_pg_per_ml(self.unit.to_pg_per_ml(*v)))
            .collect();
        Series {
            times: self.times.clone(),
            values,
            unit,
        }
    }
}

impl FromIterator<(DateTime<Utc>, f64)> for Series {
    fn from_iter<I: IntoIterator<Item = (DateTime<Utc>, f64)>>(iter: I) -> Self {
        let (times, values) = iter.into_iter().unzip();
        Series {
            times,
            values,
            unit: ConcentrationUnit::PgPerMl,
        }
    }
}
