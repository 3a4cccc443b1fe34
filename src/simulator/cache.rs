//! Negligibility horizons
//!
//! How long after a dose its contribution is worth computing. The horizon is a
//! property of the model alone, so it is solved once per parameter set and kept
//! in a process-wide map.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use argmin::core::{CostFunction, Error, Executor};
use argmin::solver::brent::{BrentOpt, BrentRoot};
use dashmap::DashMap;
use lazy_static::lazy_static;

use crate::simulator::analytical::contribution;
use crate::structs::model::SubstanceModel;

/// Fraction of the single-dose peak below which a dose is negligible.
pub const NEGLIGIBLE_FRACTION: f64 = 0.01;

/// Extra decay, in natural-log units of the slowest rate constant, applied on top
/// of the horizon before a dose is dropped from aggregation. Tails of many doses
/// add up, and one decade keeps the discarded total well under 1 %.
const TAIL_MARGIN: f64 = std::f64::consts::LN_10;

const CACHE_SIZE: usize = 64;
const MAX_ITERS: u64 = 200;

/// Timing of a single unit dose.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Horizon {
    /// Days from dose to peak level.
    pub peak_time: f64,
    /// Peak level of a unit dose.
    pub peak_level: f64,
    /// First time after the peak at which the level is at most
    /// [NEGLIGIBLE_FRACTION] of the peak.
    pub negligible_after: f64,
    /// Age beyond which aggregation skips the dose.
    pub cutoff: f64,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct ModelHash(u64);

impl ModelHash {
    fn new(model: &SubstanceModel) -> Self {
        let mut hasher = DefaultHasher::new();
        for value in [
            model.d,
            model.k1,
            model.k2,
            model.k3,
            model.wear_days.unwrap_or(0.0),
        ] {
            value.to_bits().hash(&mut hasher);
        }
        ModelHash(hasher.finish())
    }
}

lazy_static! {
    static ref HORIZONS: DashMap<ModelHash, Horizon> = DashMap::with_capacity(CACHE_SIZE);
}

/// The horizon of `model`, computed on first use.
pub fn horizon(model: &SubstanceModel) -> Horizon {
    let key = ModelHash::new(model);
    if let Some(entry) = HORIZONS.get(&key) {
        return *entry;
    }
    let computed = compute_horizon(model);
    HORIZONS.insert(key, computed);
    computed
}

struct PeakSearch<'a> {
    model: &'a SubstanceModel,
}

impl CostFunction for PeakSearch<'_> {
    type Param = f64;
    type Output = f64;

    fn cost(&self, t: &Self::Param) -> Result<Self::Output, Error> {
        Ok(-contribution(*t, 1.0, self.model))
    }
}

struct LevelCrossing<'a> {
    model: &'a SubstanceModel,
    level: f64,
}

impl CostFunction for LevelCrossing<'_> {
    type Param = f64;
    type Output = f64;

    fn cost(&self, t: &Self::Param) -> Result<Self::Output, Error> {
        Ok(contribution(*t, 1.0, self.model) - self.level)
    }
}

fn compute_horizon(model: &SubstanceModel) -> Horizon {
    let k_min = model.k_min();
    let search_end =
        model.wear_days.unwrap_or(0.0) + 5.0 * (1.0 / model.k1 + 1.0 / model.k2 + 1.0 / model.k3);

    let peak_time = locate_peak(model, search_end);
    let peak_level = contribution(peak_time, 1.0, model);
    let level = NEGLIGIBLE_FRACTION * peak_level;

    // Past the peak the slowest exponential dominates
    let estimate = peak_time + (1.0 / NEGLIGIBLE_FRACTION).ln() / k_min;
    let negligible_after = locate_crossing(model, peak_time, estimate, level);

    let horizon = Horizon {
        peak_time,
        peak_level,
        negligible_after,
        cutoff: negligible_after + TAIL_MARGIN / k_min,
    };
    tracing::debug!(
        "Horizon: peak {:.3} at {:.3} d, negligible after {:.2} d, cutoff {:.2} d",
        horizon.peak_level,
        horizon.peak_time,
        horizon.negligible_after,
        horizon.cutoff
    );
    horizon
}

fn locate_peak(model: &SubstanceModel, search_end: f64) -> f64 {
    let solver = BrentOpt::new(0.0, search_end);
    let result = Executor::new(PeakSearch { model }, solver)
        .configure(|state| state.max_iters(MAX_ITERS))
        .run();

    match result.ok().and_then(|res| res.state.best_param) {
        Some(t) if t.is_finite() => t,
        _ => {
            tracing::warn!("Brent peak search failed, scanning instead");
            scan_peak(model, search_end)
        }
    }
}

fn scan_peak(model: &SubstanceModel, search_end: f64) -> f64 {
    let steps = 10_000;
    (0..=steps)
        .map(|i| search_end * i as f64 / steps as f64)
        .fold((0.0, f64::NEG_INFINITY), |(best_t, best), t| {
            let level = contribution(t, 1.0, model);
            if level > best {
                (t, level)
            } else {
                (best_t, best)
            }
        })
        .0
}

fn locate_crossing(model: &SubstanceModel, peak_time: f64, estimate: f64, level: f64) -> f64 {
    let mut upper = estimate.max(peak_time + 1e-6);
    let mut widenings = 0;
    while contribution(upper, 1.0, model) > level && widenings < 32 {
        upper = peak_time + 2.0 * (upper - peak_time);
        widenings += 1;
    }
    if contribution(upper, 1.0, model) > level {
        return upper;
    }

    let solver = BrentRoot::new(peak_time, upper, 1e-9);
    let result = Executor::new(LevelCrossing { model, level }, solver)
        .configure(|state| state.max_iters(MAX_ITERS))
        .run();

    match result.ok().and_then(|res| res.state.best_param) {
        Some(t) if t.is_finite() => t,
        _ => {
            tracing::warn!("Brent root search failed, using the bracketing bound");
            upper
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structs::model::ModelKey;

    #[test]
    fn test_reference_model_horizon() {
        let model = SubstanceModel::new(1.0, 10.0, 1.0, 0.1).unwrap();
        let h = horizon(&model);
        assert!((h.peak_time - 2.664).abs() < 0.01, "{:?}", h);
        assert!(h.negligible_after > 45.0 && h.negligible_after < 55.0, "{:?}", h);
        let at = contribution(h.negligible_after, 1.0, &model);
        assert!((at - NEGLIGIBLE_FRACTION * h.peak_level).abs() < 1e-6 * h.peak_level);
    }

    #[test]
    fn test_cached_horizon_is_stable() {
        let model = ModelKey::EenIm.model();
        assert_eq!(horizon(&model), horizon(&model));
    }

    #[test]
    fn test_table_horizons_follow_the_peak() {
        for key in ModelKey::ALL {
            let model = key.model();
            let h = horizon(&model);
            assert!(h.peak_level > 0.0, "{}", key);
            assert!(h.negligible_after > h.peak_time, "{}", key);
            assert!(h.cutoff > h.negligible_after, "{}", key);
            assert!(
                contribution(h.negligible_after, 1.0, &model) <= 1.0001 * NEGLIGIBLE_FRACTION * h.peak_level,
                "{}",
                key
            );
        }
    }
}
