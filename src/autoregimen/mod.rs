//! # Auto-regimen
//!
//! Proposes dosing regimens from the curve engine alone, in two modes:
//!
//! - **Target trough**: one schedule whose steady-state trough is as close as
//!   possible to a target concentration ([solve_target_trough]).
//! - **Cycle fit**: up to four schedules of the same model whose combined
//!   steady-state curve follows a 28-day reference, fitted by non-negative least
//!   squares ([solve_cycle_fit]).
//!
//! Both work on steady state: every candidate schedule is assumed to have run long
//! enough that its first doses are past the negligibility horizon.

pub mod cycle_fit;
pub mod nnls;
pub mod trough;

pub use cycle_fit::{solve_cycle_fit, CycleFit};
pub use trough::solve_target_trough;

use serde_derive::{Deserialize, Serialize};

use crate::error::Result;
use crate::routines::settings::SolverSettings;
use crate::structs::model::ModelKey;
use crate::structs::reference::{menstrual_reference, TargetPreset};
use crate::structs::regimen::GeneratedRegimen;

/// What [suggest_regimen] proposes for a preset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Suggestion {
    Single(GeneratedRegimen),
    Cycle(CycleFit),
}

impl Suggestion {
    pub fn regimens(&self) -> Vec<GeneratedRegimen> {
        match self {
            Suggestion::Single(regimen) => vec![regimen.clone()],
            Suggestion::Cycle(fit) => fit.schedules.clone(),
        }
    }
}

/// Propose a regimen for a named target: a single schedule hitting the
/// configured `target_trough`, or a fit to the menstrual reference cycle.
pub fn suggest_regimen(
    model: ModelKey,
    preset: TargetPreset,
    settings: &SolverSettings,
) -> Result<Suggestion> {
    match preset {
        TargetPreset::TargetRange => {
            let target = preset.trough(settings.target_trough);
            solve_target_trough(model, target, settings).map(Suggestion::Single)
        }
        TargetPreset::MenstrualRange => {
            solve_cycle_fit(model, &menstrual_reference(), settings).map(Suggestion::Cycle)
        }
    }
}
