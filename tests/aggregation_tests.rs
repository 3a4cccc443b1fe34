use chrono::{DateTime, Duration, TimeZone, Utc};
use eyre::Result;
use hrtcore::prelude::*;
use hrtcore::simulator::analytical::repeated_dose_level;
use hrtcore::simulator::elapsed_days;

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap()
}

fn weekly(model: ModelKey, amount: f64, count: i64, every_days: f64) -> Result<Vec<Dose>> {
    let step = Duration::minutes((every_days * 1440.0).round() as i64);
    (0..count)
        .map(|i| -> Result<Dose> { Ok(log_dose(model, amount, start() + step * i as i32)?) })
        .collect()
}

/// Sum of every dose without any pruning
fn unpruned_total(at: DateTime<Utc>, doses: &[Dose]) -> f64 {
    doses
        .iter()
        .map(|d| contribution(elapsed_days(at, d.timestamp()), d.amount(), &d.model().model()))
        .sum()
}

/// 3 mg every 7 days: the trough after 10 cycles matches the trough after 11
#[test]
fn test_steady_state_convergence() {
    let model = SubstanceModel::new(1.0, 10.0, 1.0, 0.1).unwrap();
    let ten = repeated_dose_level(7.0, 3.0, 7.0, 10, &model);
    let eleven = repeated_dose_level(7.0, 3.0, 7.0, 11, &model);
    assert!((ten - eleven).abs() / eleven < 1e-3, "{} vs {}", ten, eleven);

    let steady = steady_state_trough(&model, 3.0, 7.0).unwrap();
    let long_run = repeated_dose_level(7.0, 3.0, 7.0, 200, &model);
    assert!((steady - long_run).abs() / long_run < 1e-2);
}

#[test]
fn test_steady_state_is_linear_in_dose() {
    for key in ModelKey::ALL {
        let model = key.model();
        let interval = key.suggested_intervals()[0];
        let one = steady_state_trough(&model, 1.0, interval).unwrap();
        let five = steady_state_trough(&model, 5.0, interval).unwrap();
        assert!(one > 0.0, "{}", key);
        assert!((five - 5.0 * one).abs() < 1e-9 * five, "{}", key);
    }
}

/// Dropping doses past their horizon changes totals by well under 1 %
#[test]
fn test_horizon_pruning_error_is_small() -> Result<()> {
    for (key, every) in [
        (ModelKey::EvIm, 7.0),
        (ModelKey::EenIm, 7.0),
        (ModelKey::EunCasubq, 14.0),
        (ModelKey::PatchTw, 3.5),
    ] {
        let doses = weekly(key, 4.0, 52, every)?;
        let timeline = DoseTimeline::new(doses.clone());
        let span_hours = (52.0 * every * 24.0) as i64;
        for fraction in [0.5, 0.75, 0.99] {
            let at = start() + Duration::hours((span_hours as f64 * fraction) as i64);
            let pruned = timeline.total_at(at);
            let exact = unpruned_total(at, &doses);
            assert!(exact > 0.0);
            assert!(
                (exact - pruned) / exact < 1e-2,
                "{} at {}: {} vs {}",
                key,
                at,
                pruned,
                exact
            );
        }
    }
    Ok(())
}

#[test]
fn test_contributions_are_additive_across_models() -> Result<()> {
    let a = weekly(ModelKey::EvIm, 4.0, 10, 7.0)?;
    let b = weekly(ModelKey::PatchOw, 100.0, 10, 7.0)?;
    let both: Vec<Dose> = a.iter().chain(b.iter()).cloned().collect();
    let at = start() + Duration::days(40);
    let sum = total_at(at, &a) + total_at(at, &b);
    assert!((total_at(at, &both) - sum).abs() < 1e-9);
    assert!((DoseTimeline::new(both).total_at(at) - sum).abs() < 1e-9);
    Ok(())
}

#[test]
fn test_series_is_never_negative() -> Result<()> {
    let doses = weekly(ModelKey::EcIm, 5.0, 8, 7.0)?;
    let now = start() + Duration::days(60);
    let mut calibration = CalibrationState::new(30.0, 1.0, 0.669)?;
    // A zero measurement drives the factor to its lower bound
    let zero = log_measurement(0.0, start() + Duration::days(20), None)?;
    calibration.update(&zero, 150.0)?;
    assert_eq!(calibration.factor(), 0.0);

    let times: Vec<DateTime<Utc>> = (-10..80).map(|d| start() + Duration::days(d)).collect();
    let window = ScheduleWindow::new(now, now + Duration::days(7), now)?;
    let series = evaluate_series(&times, &doses, &[], Some(&calibration), &window);
    assert_eq!(series.len(), times.len());
    assert!(series.values().iter().all(|v| *v >= 0.0));

    let uncalibrated = evaluate_series(&times, &doses, &[], None, &window);
    assert!(uncalibrated.values().iter().all(|v| *v >= 0.0));
    assert_eq!(uncalibrated.values()[0], 0.0);
    assert!(uncalibrated.max().unwrap_or(0.0) > 0.0);
    Ok(())
}

#[test]
fn test_series_includes_scheduled_doses() -> Result<()> {
    let now = start() + Duration::days(30);
    let regimen = RegimenDefinition::new(ModelKey::EvIm, 4.0, 7.0)?.with_mode(TrackingMode::Automatic);
    let window = ScheduleWindow::new(now - Duration::days(28), now + Duration::days(7), now)?;
    let times = vec![now, now + Duration::days(3)];
    let series = evaluate_series(&times, &[], &[regimen], None, &window);
    assert!(series.values().iter().all(|v| *v > 0.0));
    Ok(())
}
