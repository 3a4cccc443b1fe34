//! Closed-form concentration curves
//!
//! A dose enters an absorption depot (`k1`), passes through an intermediate
//! compartment (`k2`) into the central compartment and is eliminated (`k3`). The
//! central level after a single dose is a sum of three exponentials:
//!
//! ```text
//! C(t) = dose·d·k1·k2 · [ e^(-k1 t)/((k1-k2)(k1-k3))
//!                        − e^(-k2 t)/((k1-k2)(k2-k3))
//!                        + e^(-k3 t)/((k1-k3)(k2-k3)) ]
//! ```
//!
//! The bracket is the second divided difference of `k ↦ e^(-k t)` over the three
//! rate constants. It is evaluated without subtracting nearly equal terms, so
//! coincident and nearly coincident constants reach their analytic limits
//! (e.g. `k²t²e^(-kt)/2` when all three agree) continuously.

use crate::structs::model::SubstanceModel;

/// Largest spread `(k_max − k_min)·t` summed as a power series.
const SERIES_SPREAD: f64 = 0.5;
/// Enough terms for full double precision at `SERIES_SPREAD`.
const SERIES_TERMS: usize = 18;

#[inline]
fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

/// `(e^x − 1)/x`, exact at zero.
#[inline]
fn exprel(x: f64) -> f64 {
    if x == 0.0 {
        1.0
    } else {
        x.exp_m1() / x
    }
}

/// `(e^(-b t) − e^(-a t))/(a − b)`, which tends to `t·e^(-a t)` as `b → a`.
#[inline]
fn decay_difference(a: f64, b: f64, t: f64) -> f64 {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    t * (-lo * t).exp() * exprel(-(hi - lo) * t)
}

/// Second divided difference of `k ↦ e^(-k t)` over `rates`.
fn decay_curvature(rates: [f64; 3], t: f64) -> f64 {
    let mut rates = rates;
    rates.sort_by(f64::total_cmp);
    let [lo, mid, hi] = rates;

    if (hi - lo) * t > SERIES_SPREAD {
        // The outer nodes are far apart, so the difference does not cancel
        return (decay_difference(lo, mid, t) - decay_difference(mid, hi, t)) / (hi - lo);
    }

    // Around the middle node: t²·e^(-mid t)·Σ h_j(a, b)/(j + 2)!, where h_j is the
    // complete homogeneous polynomial of degree j in the scaled offsets
    let a = (mid - lo) * t;
    let b = (mid - hi) * t;
    let mut power = 1.0;
    let mut homogeneous = 1.0;
    let mut factorial = 2.0;
    let mut sum = 0.5;
    for j in 1..SERIES_TERMS {
        power *= a;
        homogeneous = power + b * homogeneous;
        factorial *= (j + 2) as f64;
        sum += homogeneous / factorial;
    }
    t * t * (-mid * t).exp() * sum
}

/// Concentration contributed by one dose `t` days after it was taken.
///
/// Doses in the future (`t < 0`), non-positive doses and non-positive potency all
/// contribute nothing. Patches follow [patch] and everything else
/// [three_compartment].
#[inline]
pub fn contribution(t: f64, dose: f64, model: &SubstanceModel) -> f64 {
    match model.wear_days {
        Some(wear) => patch(t, dose, model, wear),
        None => three_compartment(t, dose, model),
    }
}

/// Single-dose level of the three-compartment chain.
pub fn three_compartment(t: f64, dose: f64, model: &SubstanceModel) -> f64 {
    // Written so that a NaN time also lands here
    if !(t >= 0.0) || dose <= 0.0 || model.d <= 0.0 {
        return 0.0;
    }
    let SubstanceModel { d, k1, k2, k3, .. } = *model;
    finite_or_zero(dose * d * k1 * k2 * decay_curvature([k1, k2, k3], t))
}

/// Level of the intermediate compartment after a single dose: the two-constant
/// Bateman curve over `k1` and `k2`.
pub fn absorption_level(t: f64, dose: f64, model: &SubstanceModel) -> f64 {
    if !(t >= 0.0) || dose <= 0.0 || model.d <= 0.0 {
        return 0.0;
    }
    let SubstanceModel { d, k1, k2, .. } = *model;
    finite_or_zero(dose * d * k1 * decay_difference(k1, k2, t))
}

/// Transdermal patch worn for `wear` days.
///
/// While the patch is on, the level follows the single-dose chain. After removal
/// the depot is gone: the intermediate and central compartments at `t = wear`
/// become initial conditions that drain under `k2` and `k3` alone.
pub fn patch(t: f64, dose: f64, model: &SubstanceModel, wear: f64) -> f64 {
    if !(t >= 0.0) {
        return 0.0;
    }
    if t <= wear {
        return three_compartment(t, dose, model);
    }
    let SubstanceModel { k2, k3, .. } = *model;
    let intermediate = absorption_level(wear, dose, model);
    let central = three_compartment(wear, dose, model);
    let after = t - wear;

    let mut level = 0.0;
    if intermediate > 0.0 {
        level += intermediate * k2 * decay_difference(k2, k3, after);
    }
    if central > 0.0 {
        level += central * (-k3 * after).exp();
    }
    finite_or_zero(level)
}

/// Level `t` days after the last of `count` equal doses spaced `interval` days apart.
pub fn repeated_dose_level(
    t: f64,
    dose: f64,
    interval: f64,
    count: usize,
    model: &SubstanceModel,
) -> f64 {
    (0..count)
        .map(|n| contribution(t + n as f64 * interval, dose, model))
        .sum()
}
