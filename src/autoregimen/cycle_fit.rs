use ndarray::{Array1, Array2};
use rayon::prelude::*;
use serde_derive::{Deserialize, Serialize};

use crate::autoregimen::nnls::nnls;
use crate::error::{HrtError, Result};
use crate::routines::settings::SolverSettings;
use crate::simulator::steady_state_level;
use crate::structs::model::{ModelKey, SubstanceModel};
use crate::structs::reference::CYCLE_DAYS;
use crate::structs::regimen::GeneratedRegimen;

/// Intervals tried in addition to the model's suggested ones.
pub const BASIS_INTERVALS: [f64; 8] = [3.5, 4.0, 5.0, 7.0, 9.0, 10.0, 14.0, 28.0];
/// Upper bound on the number of combined schedules.
pub const MAX_SCHEDULES: usize = 4;
const INTERVAL_RANGE: (f64, f64) = (2.0, 28.0);

/// Result of fitting schedules to a reference cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleFit {
    /// At most four schedules; empty when no combination beats no regimen.
    pub schedules: Vec<GeneratedRegimen>,
    /// Steady-state level on each cycle day with the rounded doses.
    pub fitted_curve: Vec<f64>,
    pub residual_rms: f64,
}

#[derive(Debug, Clone)]
struct Candidate {
    interval: f64,
    phase: f64,
    column: Array1<f64>,
}

/// Steady-state level on each cycle day from a unit dose every `interval` days,
/// given on cycle day `phase`.
fn basis_vector(model: &SubstanceModel, interval: f64, phase: f64) -> Result<Array1<f64>> {
    (0..CYCLE_DAYS)
        .map(|day| {
            let offset = (day as f64 - phase).rem_euclid(interval);
            steady_state_level(model, 1.0, interval, offset)
        })
        .collect::<Result<Vec<f64>>>()
        .map(Array1::from)
}

fn candidate_intervals(model: ModelKey) -> Vec<f64> {
    let mut intervals: Vec<f64> = model
        .suggested_intervals()
        .iter()
        .chain(BASIS_INTERVALS.iter())
        .copied()
        .filter(|i| *i >= INTERVAL_RANGE.0 && *i <= INTERVAL_RANGE.1)
        .collect();
    intervals.sort_by(|a, b| a.total_cmp(b));
    intervals.dedup_by(|a, b| (*a - *b).abs() < 1e-9);
    intervals
}

fn build_candidates(model: ModelKey) -> Result<Vec<Candidate>> {
    let parameters = model.model();
    let pairs: Vec<(f64, f64)> = candidate_intervals(model)
        .into_iter()
        .flat_map(|interval| {
            let phases = (interval.ceil() as usize).max(1);
            (0..phases).map(move |phase| (interval, phase as f64))
        })
        .collect();
    pairs
        .into_par_iter()
        .map(|(interval, phase)| -> Result<Candidate> {
            Ok(Candidate {
                interval,
                phase,
                column: basis_vector(&parameters, interval, phase)?,
            })
        })
        .collect()
}

fn design_matrix(columns: &[&Array1<f64>]) -> Array2<f64> {
    Array2::from_shape_fn((CYCLE_DAYS, columns.len()), |(i, j)| columns[j][i])
}

fn mean_squared_error(target: &Array1<f64>, fitted: &Array1<f64>) -> f64 {
    (target - fitted).mapv(|r| r * r).sum() / target.len() as f64
}

/// Fit a combination of schedules for one model to a 28-day reference curve.
///
/// Columns are added greedily, each step keeping the candidate whose joint
/// non-negative fit has the lowest error, until `max_schedules` are chosen or a
/// further column improves the error by less than `min_improvement`.
pub fn solve_cycle_fit(
    model: ModelKey,
    reference: &[f64],
    settings: &SolverSettings,
) -> Result<CycleFit> {
    if reference.len() != CYCLE_DAYS {
        return Err(HrtError::InvalidReferenceCurve {
            expected: CYCLE_DAYS,
            found: reference.len(),
        });
    }
    if reference.iter().any(|v| !v.is_finite()) {
        return Err(HrtError::InvalidParameters(
            "reference curve contains non-finite values".to_string(),
        ));
    }
    let target = Array1::from(reference.to_vec());
    let candidates = build_candidates(model)?;
    let max_schedules = settings.max_schedules.min(MAX_SCHEDULES);
    tracing::debug!(
        "Cycle fit for {} over {} candidate schedules",
        model,
        candidates.len()
    );

    let mut selected: Vec<usize> = Vec::new();
    let mut previous_mse = target.mapv(|v| v * v).sum() / CYCLE_DAYS as f64;

    for step in 0..max_schedules {
        let mut best: Option<(usize, f64)> = None;
        for (index, candidate) in candidates.iter().enumerate() {
            if selected.contains(&index) {
                continue;
            }
            let mut columns: Vec<&Array1<f64>> =
                selected.iter().map(|&s| &candidates[s].column).collect();
            columns.push(&candidate.column);
            let a = design_matrix(&columns);
            let x = nnls(&a, &target);
            let mse = mean_squared_error(&target, &a.dot(&x));
            if mse < best.map_or(previous_mse, |(_, m)| m) {
                best = Some((index, mse));
            }
        }

        let Some((index, mse)) = best else {
            break;
        };
        if step > 0 && previous_mse > 0.0 && (previous_mse - mse) / previous_mse < settings.min_improvement {
            tracing::trace!("Stopping after {} schedules, improvement below threshold", step);
            break;
        }
        tracing::trace!(
            "Selected every {} d from day {} (MSE {:.2})",
            candidates[index].interval,
            candidates[index].phase,
            mse
        );
        selected.push(index);
        previous_mse = mse;
    }

    let columns: Vec<&Array1<f64>> = selected.iter().map(|&s| &candidates[s].column).collect();
    let weights = nnls(&design_matrix(&columns), &target);

    let limits = model.dose_limits();
    let mut fitted = Array1::<f64>::zeros(CYCLE_DAYS);
    let mut schedules = Vec::new();
    for (&index, &weight) in selected.iter().zip(weights.iter()) {
        if weight < settings.min_weight {
            continue;
        }
        let candidate = &candidates[index];
        let amount = limits.round(weight);
        fitted.scaled_add(amount, &candidate.column);
        schedules.push(GeneratedRegimen {
            model,
            amount,
            interval_days: candidate.interval,
            phase_days: Some(candidate.phase),
        });
    }

    let residual_rms = mean_squared_error(&target, &fitted).sqrt();
    tracing::info!(
        "Cycle fit for {}: {} schedule(s), residual RMS {:.2}",
        model,
        schedules.len(),
        residual_rms
    );
    Ok(CycleFit {
        schedules,
        fitted_curve: fitted.to_vec(),
        residual_rms,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidate_intervals() {
        let intervals = candidate_intervals(ModelKey::EvIm);
        assert_eq!(intervals, vec![3.5, 4.0, 5.0, 7.0, 9.0, 10.0, 14.0, 28.0]);
        let oral = candidate_intervals(ModelKey::EOral);
        assert!(!oral.contains(&1.0));
    }

    #[test]
    fn test_basis_is_periodic_in_phase() {
        let model = ModelKey::EenIm.model();
        let a = basis_vector(&model, 7.0, 0.0).unwrap();
        let b = basis_vector(&model, 7.0, 7.0).unwrap();
        for (x, y) in a.iter().zip(b.iter()) {
            assert!((x - y).abs() < 1e-9);
        }
        assert!(a.iter().all(|v| *v > 0.0));
    }

    #[test]
    fn test_wrong_reference_length() {
        let result = solve_cycle_fit(ModelKey::EvIm, &[100.0; 10], &SolverSettings::default());
        assert!(matches!(
            result,
            Err(HrtError::InvalidReferenceCurve { expected: 28, found: 10 })
        ));
    }

    #[test]
    fn test_zero_reference_gives_no_schedules() {
        let fit = solve_cycle_fit(ModelKey::EvIm, &[0.0; CYCLE_DAYS], &SolverSettings::default())
            .unwrap();
        assert!(fit.schedules.is_empty());
        assert_eq!(fit.residual_rms, 0.0);
    }
}
