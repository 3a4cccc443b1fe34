use std::path::Path;

use config::Config as eConfig;
use serde_derive::{Deserialize, Serialize};

use crate::structs::units::ConcentrationUnit;

/// Effective engine configuration. Every field has a default, so an empty
/// file is a valid configuration.
#[derive(Debug, Deserialize, Clone, Serialize, PartialEq, Default)]
pub struct Settings {
    #[serde(default)]
    pub log: LogSettings,
    #[serde(default)]
    pub calibration: CalibrationSettings,
    #[serde(default)]
    pub schedule: ScheduleSettings,
    #[serde(default)]
    pub solver: SolverSettings,
    #[serde(default)]
    pub units: ConcentrationUnit,
}

#[derive(Debug, Deserialize, Clone, Serialize, PartialEq)]
pub struct LogSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    pub file: Option<String>,
}

impl Default for LogSettings {
    fn default() -> Self {
        LogSettings {
            level: default_log_level(),
            file: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Serialize, PartialEq)]
pub struct CalibrationSettings {
    /// Age at which a measurement carries half the weight of a fresh one.
    #[serde(default = "default_half_life")]
    pub half_life_days: f64,
    /// Predictions below this seed the baseline residual instead of a ratio.
    #[serde(default = "default_min_prediction")]
    pub min_prediction: f64,
}

impl Default for CalibrationSettings {
    fn default() -> Self {
        CalibrationSettings {
            half_life_days: default_half_life(),
            min_prediction: default_min_prediction(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Serialize, PartialEq)]
pub struct ScheduleSettings {
    /// Fill in scheduled doses before "now" for automatic regimens.
    #[serde(default = "default_false")]
    pub backfill: bool,
    #[serde(default = "default_lookback")]
    pub lookback_days: f64,
    /// Forward projection.
    #[serde(default = "default_horizon")]
    pub horizon_days: f64,
    #[serde(default = "default_merge_window")]
    pub merge_window_minutes: i64,
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        ScheduleSettings {
            backfill: default_false(),
            lookback_days: default_lookback(),
            horizon_days: default_horizon(),
            merge_window_minutes: default_merge_window(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Serialize, PartialEq)]
pub struct SolverSettings {
    #[serde(default = "default_target_trough")]
    pub target_trough: f64,
    #[serde(default = "default_max_schedules")]
    pub max_schedules: usize,
    #[serde(default = "default_max_doses_per_week")]
    pub max_doses_per_week: f64,
    /// Relative error reduction a further schedule must bring to be added.
    #[serde(default = "default_min_improvement")]
    pub min_improvement: f64,
    /// Cycle-fit weights below this are rejected.
    #[serde(default = "default_min_weight")]
    pub min_weight: f64,
}

impl Default for SolverSettings {
    fn default() -> Self {
        SolverSettings {
            target_trough: default_target_trough(),
            max_schedules: default_max_schedules(),
            max_doses_per_week: default_max_doses_per_week(),
            min_improvement: default_min_improvement(),
            min_weight: default_min_weight(),
        }
    }
}

/// Read settings from a TOML file, with `HRTCORE_` environment overrides
/// (`HRTCORE_SOLVER__TARGET_TROUGH=150`).
pub fn read_settings(path: impl AsRef<Path>) -> eyre::Result<Settings> {
    let parsed = eConfig::builder()
        .add_source(config::File::from(path.as_ref()).format(config::FileFormat::Toml))
        .add_source(
            config::Environment::with_prefix("HRTCORE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let settings: Settings = parsed.try_deserialize()?;
    Ok(settings)
}

/// Parse settings from TOML text, without environment overrides.
pub fn settings_from_str(toml: &str) -> eyre::Result<Settings> {
    let parsed = eConfig::builder()
        .add_source(config::File::from_str(toml, config::FileFormat::Toml))
        .build()?;
    Ok(parsed.try_deserialize()?)
}

/// Write the effective settings as JSON.
pub fn write_settings_to_file(settings: &Settings, path: impl AsRef<Path>) -> Result<(), std::io::Error> {
    let serialized = serde_json::to_string_pretty(settings)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;

    let mut file = std::fs::File::create(path)?;
    std::io::Write::write_all(&mut file, serialized.as_bytes())?;
    Ok(())
}

// *********************************
// Default values for deserializing
// *********************************
fn default_false() -> bool {
    false
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_half_life() -> f64 {
    std::f64::consts::LN_2 / 0.02
}

fn default_min_prediction() -> f64 {
    1.0
}

fn default_lookback() -> f64 {
    90.0
}

fn default_horizon() -> f64 {
    7.0
}

fn default_merge_window() -> i64 {
    60
}

fn default_target_trough() -> f64 {
    200.0
}

fn default_max_schedules() -> usize {
    4
}

fn default_max_doses_per_week() -> f64 {
    4.0
}

fn default_min_improvement() -> f64 {
    0.01
}

fn default_min_weight() -> f64 {
    0.25
}
