//! Estradiol pharmacokinetics engine
//!
//! Closed-form three-compartment concentration curves for estradiol esters,
//! aggregation of dose histories and schedules, calibration against lab results,
//! and auto-regimen solvers. The engine never reads a wall clock: every
//! operation that depends on "now" takes it as an argument.

pub mod autoregimen;
pub mod entrypoints;
pub mod error;
pub mod logger;
pub mod routines;
pub mod simulator;
pub mod structs;

pub use error::{HrtError, Result};

pub mod prelude {
    pub use crate::autoregimen::{
        solve_cycle_fit, solve_target_trough, suggest_regimen, CycleFit, Suggestion,
    };
    pub use crate::entrypoints::{evaluate_series, PersonTimeline};
    pub use crate::error::{HrtError, Result};
    pub use crate::logger::setup_log;
    pub use crate::routines::calibration::CalibrationState;
    pub use crate::routines::output;
    pub use crate::routines::schedule::{
        expand, expand_schedule, merge_coincident, DoseEvent, Schedule, ScheduleWindow,
    };
    pub use crate::routines::settings::{read_settings, Settings};
    pub use crate::simulator::analytical::contribution;
    pub use crate::simulator::{
        steady_state_level, steady_state_trough, total_at, DoseTimeline, Series,
    };
    pub use crate::structs::dose::{log_dose, log_measurement, Dose, DoseOrigin, LabMeasurement};
    pub use crate::structs::model::{resolve_model_key, Ester, Method, ModelKey, SubstanceModel};
    pub use crate::structs::reference::{menstrual_reference, TargetPreset, MENSTRUAL_CYCLE};
    pub use crate::structs::regimen::{GeneratedRegimen, RegimenDefinition, TrackingMode};
    pub use crate::structs::units::ConcentrationUnit;
}
