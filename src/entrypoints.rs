use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde_derive::{Deserialize, Serialize};

use crate::error::Result;
use crate::prelude::*;

/// Calibrated concentrations at `times`.
///
/// Logged doses are combined with every regimen expanded over `window`, the raw
/// aggregate is calibrated when a state is given, and only the final value is
/// clamped to be non-negative. Query times are evaluated in parallel.
pub fn evaluate_series(
    times: &[DateTime<Utc>],
    doses: &[Dose],
    regimens: &[RegimenDefinition],
    calibration: Option<&CalibrationState>,
    window: &ScheduleWindow,
) -> Series {
    let mut all = doses.to_vec();
    for regimen in regimens {
        all.extend(expand_schedule(regimen, window).iter());
    }
    evaluate_timeline(times, &DoseTimeline::new(all), calibration)
}

fn evaluate_timeline(
    times: &[DateTime<Utc>],
    timeline: &DoseTimeline,
    calibration: Option<&CalibrationState>,
) -> Series {
    let values: Vec<(DateTime<Utc>, f64)> = times
        .par_iter()
        .map(|&at| {
            let raw = timeline.total_at(at);
            let estimate = match calibration {
                Some(state) => state.estimate(raw, at),
                None => raw,
            };
            (at, estimate.max(0.0))
        })
        .collect();
    values.into_iter().collect()
}

/// Everything the engine knows about one person.
///
/// Owned by the caller and passed in by value; the engine never persists it.
/// `model` is the person's primary model, whose terminal constant decays the
/// calibration baseline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonTimeline {
    model: ModelKey,
    doses: Vec<Dose>,
    regimens: Vec<RegimenDefinition>,
    measurements: Vec<LabMeasurement>,
    settings: Settings,
}

impl PersonTimeline {
    pub fn new(model: ModelKey, settings: Settings) -> Self {
        PersonTimeline {
            model,
            doses: Vec::new(),
            regimens: Vec::new(),
            measurements: Vec::new(),
            settings,
        }
    }

    pub fn add_dose(&mut self, dose: Dose) {
        self.doses.push(dose);
    }

    pub fn add_regimen(&mut self, regimen: RegimenDefinition) {
        self.regimens.push(regimen);
    }

    pub fn add_measurement(&mut self, measurement: LabMeasurement) {
        self.measurements.push(measurement);
    }

    pub fn model(&self) -> ModelKey {
        self.model
    }
    pub fn doses(&self) -> &[Dose] {
        &self.doses
    }
    pub fn regimens(&self) -> &[RegimenDefinition] {
        &self.regimens
    }
    pub fn measurements(&self) -> &[LabMeasurement] {
        &self.measurements
    }
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Logged doses together with the scheduled doses of every regimen, each
    /// expanded over its default window at `now`.
    pub fn all_doses(&self, now: DateTime<Utc>) -> Vec<Dose> {
        let mut all = self.doses.clone();
        for regimen in &self.regimens {
            let window = ScheduleWindow::around(now, &self.settings.schedule, regimen.mode());
            all.extend(expand_schedule(regimen, &window).iter());
        }
        all
    }

    /// Prediction for a measurement drawn before any logged dose while the
    /// person was already following their regimens: the regimens are expanded
    /// back far enough to reach steady state at the draw.
    fn on_schedule_prediction(&self, at: DateTime<Utc>) -> f64 {
        let mut doses = Vec::new();
        for regimen in &self.regimens {
            let model = regimen.model().model();
            let lookback = crate::simulator::cache::horizon(&model).cutoff;
            let start = at - crate::simulator::days_to_duration(lookback.ceil());
            if let Ok(window) = ScheduleWindow::new(start, at, at) {
                let backfilled = regimen.clone().with_mode(TrackingMode::Automatic);
                doses.extend(expand_schedule(&backfilled, &window).iter());
            }
        }
        total_at(at, &doses)
    }

    /// The calibration state after replaying every measurement in time order.
    pub fn calibration(&self, now: DateTime<Utc>) -> Result<CalibrationState> {
        let timeline = DoseTimeline::new(self.all_doses(now));
        let earliest = timeline.earliest();
        let initial =
            CalibrationState::from_settings(&self.settings.calibration, self.model.model().k3)?;

        initial.replay(&self.measurements, |measurement| {
            let at = measurement.timestamp();
            let before_first = earliest.map_or(true, |first| at < first);
            if measurement.is_on_schedule() && before_first {
                self.on_schedule_prediction(at)
            } else {
                timeline.total_at(at)
            }
        })
    }

    /// Calibrated series at `times`, in the configured display unit.
    pub fn series(&self, times: &[DateTime<Utc>], now: DateTime<Utc>) -> Result<Series> {
        let calibration = self.calibration(now)?;
        let timeline = DoseTimeline::new(self.all_doses(now));
        let series = evaluate_timeline(times, &timeline, Some(&calibration));
        Ok(series.to_unit(self.settings.units))
    }

    /// Calendar view of all doses.
    pub fn events(&self, now: DateTime<Utc>) -> Vec<DoseEvent> {
        merge_coincident(
            &self.all_doses(now),
            self.settings.schedule.merge_window_minutes,
        )
    }
}
