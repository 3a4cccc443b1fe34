use eyre::Result;
use hrtcore::autoregimen::nnls::nnls;
use hrtcore::prelude::*;
use hrtcore::routines::settings::SolverSettings;
use ndarray::{Array1, Array2};

#[test]
fn test_target_trough_is_near_target() -> Result<()> {
    let settings = SolverSettings::default();
    let injectables = [
        ModelKey::EbIm,
        ModelKey::EvIm,
        ModelKey::EenIm,
        ModelKey::EcIm,
        ModelKey::EunIm,
        ModelKey::EunCasubq,
    ];
    for key in injectables {
        let regimen = solve_target_trough(key, 200.0, &settings)?;
        assert_eq!(regimen.model, key);
        assert!(key.suggested_intervals().contains(&regimen.interval_days));

        let model = key.model();
        let unit = steady_state_trough(&model, 1.0, regimen.interval_days)?;
        let achieved = steady_state_trough(&model, regimen.amount, regimen.interval_days)?;
        let limits = key.dose_limits();
        // Off by at most half a rounding step, unless the dose was clamped
        if regimen.amount > limits.min && regimen.amount < limits.max {
            assert!(
                (achieved - 200.0).abs() <= 0.5 * limits.step * unit + 1e-9,
                "{}: {} {} every {} d gives {}",
                key,
                regimen.amount,
                key.dose_unit(),
                regimen.interval_days,
                achieved
            );
        }
    }
    Ok(())
}

#[test]
fn test_target_trough_for_patches_uses_patch_grid() -> Result<()> {
    let regimen = solve_target_trough(ModelKey::PatchTw, 100.0, &SolverSettings::default())?;
    let limits = ModelKey::PatchTw.dose_limits();
    assert!(regimen.amount >= limits.min && regimen.amount <= limits.max);
    assert_eq!((regimen.amount / limits.step).fract(), 0.0);
    assert_eq!(regimen.interval_days, 3.5);
    Ok(())
}

#[test]
fn test_daily_oral_needs_a_higher_frequency_limit() -> Result<()> {
    assert!(matches!(
        solve_target_trough(ModelKey::EOral, 100.0, &SolverSettings::default()),
        Err(HrtError::NoFeasibleRegimen)
    ));
    let relaxed = SolverSettings {
        max_doses_per_week: 7.0,
        ..SolverSettings::default()
    };
    let regimen = solve_target_trough(ModelKey::EOral, 100.0, &relaxed)?;
    assert_eq!(regimen.interval_days, 1.0);
    Ok(())
}

#[test]
fn test_cycle_fit_against_menstrual_reference() -> Result<()> {
    let reference = menstrual_reference();
    let baseline_rms = (reference.iter().map(|v| v * v).sum::<f64>() / reference.len() as f64).sqrt();

    for key in [ModelKey::EvIm, ModelKey::EbIm, ModelKey::EenIm] {
        let fit = solve_cycle_fit(key, &reference, &SolverSettings::default())?;
        assert!(!fit.schedules.is_empty(), "{}", key);
        assert!(fit.schedules.len() <= 4);
        assert_eq!(fit.fitted_curve.len(), 28);
        assert!(fit.fitted_curve.iter().all(|v| *v >= 0.0));
        assert!(fit.residual_rms < baseline_rms, "{}: {}", key, fit.residual_rms);

        let limits = key.dose_limits();
        for schedule in &fit.schedules {
            assert_eq!(schedule.model, key);
            assert!(schedule.amount >= limits.min && schedule.amount <= limits.max);
            assert!(schedule.interval_days >= 2.0 && schedule.interval_days <= 28.0);
            let phase = schedule.phase_days.unwrap_or(-1.0);
            assert!(phase >= 0.0 && phase < schedule.interval_days);
        }
    }
    Ok(())
}

#[test]
fn test_cycle_fit_respects_schedule_limit() -> Result<()> {
    let settings = SolverSettings {
        max_schedules: 10,
        min_improvement: 0.0,
        ..SolverSettings::default()
    };
    let fit = solve_cycle_fit(ModelKey::EvIm, &menstrual_reference(), &settings)?;
    assert!(fit.schedules.len() <= 4);
    Ok(())
}

#[test]
fn test_suggest_regimen_presets() -> Result<()> {
    let settings = SolverSettings::default();
    match suggest_regimen(ModelKey::EvIm, TargetPreset::TargetRange, &settings)? {
        Suggestion::Single(regimen) => assert_eq!(regimen.model, ModelKey::EvIm),
        other => panic!("expected a single regimen, got {:?}", other),
    }
    let cycle = suggest_regimen(ModelKey::EvIm, TargetPreset::MenstrualRange, &settings)?;
    assert!(matches!(cycle, Suggestion::Cycle(_)));
    assert!(cycle.regimens().len() <= 4);
    Ok(())
}

/// The target-range preset aims at the configured trough
#[test]
fn test_suggest_regimen_uses_configured_target() -> Result<()> {
    let settings = SolverSettings {
        target_trough: 120.0,
        ..SolverSettings::default()
    };
    let suggested = match suggest_regimen(ModelKey::EenIm, TargetPreset::TargetRange, &settings)? {
        Suggestion::Single(regimen) => regimen,
        other => panic!("expected a single regimen, got {:?}", other),
    };
    assert_eq!(suggested, solve_target_trough(ModelKey::EenIm, 120.0, &settings)?);

    let default = solve_target_trough(ModelKey::EenIm, 200.0, &settings)?;
    let model = ModelKey::EenIm.model();
    let suggested_trough = steady_state_trough(&model, suggested.amount, suggested.interval_days)?;
    let default_trough = steady_state_trough(&model, default.amount, default.interval_days)?;
    assert!((suggested_trough - 120.0).abs() < (default_trough - 120.0).abs());
    Ok(())
}

/// Accepted proposals become schedulable regimens
#[test]
fn test_generated_regimen_into_definition() -> Result<()> {
    let regimen = solve_target_trough(ModelKey::EenIm, 150.0, &SolverSettings::default())?;
    let definition = regimen.into_definition(
        chrono::NaiveTime::from_hms_opt(20, 0, 0).unwrap(),
        TrackingMode::Automatic,
    )?;
    assert_eq!(definition.amount(), regimen.amount);
    assert_eq!(definition.phase_days(), None);
    Ok(())
}

#[test]
fn test_nnls_never_returns_negative_weights() {
    // Deterministic pseudo-random design
    let mut seed: u64 = 12345;
    let mut next = || {
        seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        ((seed >> 33) as f64 / (1u64 << 31) as f64) - 0.5
    };
    for _ in 0..20 {
        let a = Array2::from_shape_fn((12, 5), |_| next());
        let b = Array1::from_shape_fn(12, |_| next());
        let x = nnls(&a, &b);
        assert!(x.iter().all(|v| *v >= 0.0), "{}", x);

        // No single coordinate step improves the objective
        let residual = &b - &a.dot(&x);
        let gradient = a.t().dot(&residual);
        for j in 0..5 {
            if x[j] == 0.0 {
                assert!(gradient[j] <= 1e-6, "{}", gradient);
            } else {
                assert!(gradient[j].abs() <= 1e-6, "{}", gradient);
            }
        }
    }
}
