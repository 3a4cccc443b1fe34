use chrono::{DateTime, Duration, TimeZone, Utc};
use eyre::Result;
use hrtcore::prelude::*;
use hrtcore::routines::settings::CalibrationSettings;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 2, 1, 9, 0, 0).unwrap()
}

fn filter() -> Result<CalibrationState> {
    Ok(CalibrationState::from_settings(
        &CalibrationSettings::default(),
        ModelKey::EvIm.model().k3,
    )?)
}

/// A measurement equal to the prediction leaves the factor at 1
#[test]
fn test_matching_measurement_keeps_unit_factor() -> Result<()> {
    let mut cal = filter()?;
    let m = log_measurement(180.0, t0(), None)?;
    assert_eq!(cal.update(&m, 180.0)?, 1.0);
    assert_eq!(cal.variance(), 0.0);
    assert_eq!(cal.samples(), 1);
    Ok(())
}

#[test]
fn test_factor_stays_within_bounds() -> Result<()> {
    let mut cal = filter()?;
    let cases = [
        (1e9, 1.0),
        (5000.0, 2.0),
        (0.0, 500.0),
        (1e12, 1.0000001),
        (300.0, 1e-300),
        (0.0, 1e9),
        (150.0, 140.0),
    ];
    for (i, (measured, predicted)) in cases.iter().enumerate() {
        let m = log_measurement(*measured, t0() + Duration::days(i as i64), None)?;
        let factor = cal.update(&m, *predicted)?;
        assert!((0.0..=2.0).contains(&factor), "{} after {:?}", factor, (measured, predicted));
        assert!(cal.estimate(100.0, m.timestamp()).is_finite());
    }
    Ok(())
}

#[test]
fn test_adversarial_ratio_saturates() -> Result<()> {
    let mut cal = filter()?;
    let m = log_measurement(10_000.0, t0(), None)?;
    assert_eq!(cal.update(&m, 10.0)?, 2.0);
    Ok(())
}

#[test]
fn test_baseline_residual_when_nothing_contributes() -> Result<()> {
    let mut cal = filter()?;
    let m = log_measurement(60.0, t0(), Some("before first dose"))?;
    cal.update(&m, 0.0)?;
    assert_eq!(cal.factor(), 1.0);

    let k3 = ModelKey::EvIm.model().k3;
    let later = t0() + Duration::hours(12);
    let expected = 60.0 * (-k3 * 0.5f64).exp();
    assert!((cal.estimate(0.0, later) - expected).abs() < 1e-9);
    // The baseline is added unscaled on top of the calibrated aggregate
    assert!((cal.estimate(20.0, later) - (20.0 + expected)).abs() < 1e-9);
    Ok(())
}

#[test]
fn test_out_of_order_update_is_rejected() -> Result<()> {
    let mut cal = filter()?;
    cal.update(&log_measurement(100.0, t0(), None)?, 100.0)?;
    let earlier = log_measurement(100.0, t0() - Duration::days(2), None)?;
    assert!(matches!(
        cal.update(&earlier, 100.0),
        Err(HrtError::OutOfOrderMeasurement { .. })
    ));
    Ok(())
}

/// Replaying an unordered history equals applying it in order
#[test]
fn test_replay_sorts_history() -> Result<()> {
    let measurements = vec![
        log_measurement(220.0, t0() + Duration::days(30), None)?,
        log_measurement(90.0, t0(), None)?,
        log_measurement(160.0, t0() + Duration::days(10), None)?,
    ];
    let prediction = |m: &LabMeasurement| 100.0 + m.value() / 10.0;

    let mut sequential = filter()?;
    for i in [1, 2, 0] {
        let m = &measurements[i];
        sequential.update(m, prediction(m))?;
    }
    let replayed = filter()?.replay(&measurements, prediction)?;
    assert_eq!(replayed, sequential);
    Ok(())
}

#[test]
fn test_state_round_trips_through_json() -> Result<()> {
    let mut cal = filter()?;
    cal.update(&log_measurement(120.0, t0(), None)?, 100.0)?;
    let json = serde_json::to_string(&cal)?;
    let back: CalibrationState = serde_json::from_str(&json)?;
    assert!((back.factor() - cal.factor()).abs() < 1e-12);
    assert_eq!(back.samples(), cal.samples());
    assert_eq!(back.last_update(), cal.last_update());
    Ok(())
}

/// The timeline calibrates against its own doses and regimens
#[test]
fn test_person_timeline_calibration() -> Result<()> {
    let mut person = PersonTimeline::new(ModelKey::EvIm, Settings::default());
    for week in 0..8 {
        person.add_dose(log_dose(ModelKey::EvIm, 4.0, t0() + Duration::weeks(week))?);
    }
    let drawn = t0() + Duration::weeks(7) + Duration::days(6);
    let now = t0() + Duration::weeks(8);
    let predicted = total_at(drawn, person.doses());
    person.add_measurement(log_measurement(predicted, drawn, None)?);

    let cal = person.calibration(now)?;
    assert!((cal.factor() - 1.0).abs() < 1e-9);

    let series = person.series(&[drawn], now)?;
    assert!((series.values()[0] - predicted).abs() < 1e-6 * predicted);
    Ok(())
}

/// A measurement drawn while already on a regimen, before any logged dose,
/// is compared with the regimen's steady state
#[test]
fn test_on_schedule_measurement_before_first_dose() -> Result<()> {
    let mut person = PersonTimeline::new(ModelKey::EvIm, Settings::default());
    person.add_regimen(RegimenDefinition::new(ModelKey::EvIm, 4.0, 7.0)?);
    let drawn = t0() - Duration::days(30);
    person.add_measurement(log_measurement(200.0, drawn, None)?.on_schedule(true));

    let cal = person.calibration(t0())?;
    assert_eq!(cal.samples(), 1);
    assert!(cal.factor() > 0.0 && cal.factor() <= 2.0);
    Ok(())
}
