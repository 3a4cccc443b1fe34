use crate::error::{HrtError, Result};
use crate::routines::settings::SolverSettings;
use crate::simulator::steady_state_trough;
use crate::structs::model::ModelKey;
use crate::structs::regimen::GeneratedRegimen;

/// A dose/interval pair evaluated by the target-trough search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TroughCandidate {
    pub interval_days: f64,
    pub dose: f64,
    pub trough: f64,
}

/// Find the single regimen whose steady-state trough is closest to `target`.
///
/// Each suggested interval of the model is tried in order of preference; the
/// steady-state trough is linear in the dose, so the dose for an interval is the
/// target over the trough of a unit dose, rounded to the model's dose grid.
pub fn solve_target_trough(
    model: ModelKey,
    target: f64,
    settings: &SolverSettings,
) -> Result<GeneratedRegimen> {
    if !target.is_finite() || target <= 0.0 {
        return Err(HrtError::InvalidTarget(target));
    }
    let parameters = model.model();
    let limits = model.dose_limits();

    let mut best: Option<TroughCandidate> = None;
    for &interval in model.suggested_intervals() {
        if 7.0 / interval > settings.max_doses_per_week {
            tracing::trace!("Skipping {} d: more than {} doses a week", interval, settings.max_doses_per_week);
            continue;
        }
        let unit_trough = steady_state_trough(&parameters, 1.0, interval)?;
        if !(unit_trough > 0.0) {
            continue;
        }
        let dose = limits.round(target / unit_trough);
        let candidate = TroughCandidate {
            interval_days: interval,
            dose,
            trough: dose * unit_trough,
        };
        tracing::trace!(
            "{} every {} d: {} {} gives trough {:.1}",
            model,
            interval,
            dose,
            model.dose_unit(),
            candidate.trough
        );
        // Strictly closer, so ties keep the more recommended interval
        let closer = best.map_or(true, |b| {
            (candidate.trough - target).abs() < (b.trough - target).abs()
        });
        if closer {
            best = Some(candidate);
        }
    }

    let best = best.ok_or(HrtError::NoFeasibleRegimen)?;
    tracing::info!(
        "Target trough {:.0}: {} {} {} every {} days (trough {:.1})",
        target,
        best.dose,
        model.dose_unit(),
        model,
        best.interval_days,
        best.trough
    );
    Ok(GeneratedRegimen {
        model,
        amount: best.dose,
        interval_days: best.interval_days,
        phase_days: None,
    })
}
