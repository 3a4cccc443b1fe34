//! Pharmacokinetic parameter table
//!
//! Every supported ester/route combination resolves to one [ModelKey], and every key
//! to one immutable [SubstanceModel]. The table is a closed `match`, so the hot
//! aggregation loop never dispatches on strings.

use std::fmt;
use std::str::FromStr;

use serde_derive::{Deserialize, Serialize};

use crate::error::{HrtError, Result};

/// Three-compartment model constants.
///
/// `k1`, `k2`, `k3` are rate constants in day⁻¹ and `d` the potency constant that
/// turns a dose into a concentration. Patches additionally carry the wear duration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SubstanceModel {
    pub d: f64,
    pub k1: f64,
    pub k2: f64,
    pub k3: f64,
    pub wear_days: Option<f64>,
}

impl SubstanceModel {
    /// Build a model, rejecting non-positive or non-finite constants.
    pub fn new(d: f64, k1: f64, k2: f64, k3: f64) -> Result<Self> {
        for (name, value) in [("d", d), ("k1", k1), ("k2", k2), ("k3", k3)] {
            if !value.is_finite() || value <= 0.0 {
                return Err(HrtError::InvalidParameters(format!(
                    "{} must be positive and finite, got {}",
                    name, value
                )));
            }
        }
        Ok(SubstanceModel {
            d,
            k1,
            k2,
            k3,
            wear_days: None,
        })
    }

    /// Turn the model into a patch worn for `days`.
    pub fn with_wear_days(mut self, days: f64) -> Result<Self> {
        if !days.is_finite() || days <= 0.0 {
            return Err(HrtError::InvalidParameters(format!(
                "wear duration must be positive, got {}",
                days
            )));
        }
        self.wear_days = Some(days);
        Ok(self)
    }

    const fn table(d: f64, k1: f64, k2: f64, k3: f64, wear_days: Option<f64>) -> Self {
        SubstanceModel {
            d,
            k1,
            k2,
            k3,
            wear_days,
        }
    }

    /// The slowest rate constant, which governs the terminal decay.
    pub fn k_min(&self) -> f64 {
        self.k1.min(self.k2).min(self.k3)
    }

    pub fn is_patch(&self) -> bool {
        self.wear_days.is_some()
    }
}

/// Identifier of an entry in the parameter table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ModelKey {
    EbIm,
    EvIm,
    EenIm,
    EcIm,
    EunIm,
    EunCasubq,
    PatchTw,
    PatchOw,
    EOral,
}

impl ModelKey {
    pub const ALL: [ModelKey; 9] = [
        ModelKey::EbIm,
        ModelKey::EvIm,
        ModelKey::EenIm,
        ModelKey::EcIm,
        ModelKey::EunIm,
        ModelKey::EunCasubq,
        ModelKey::PatchTw,
        ModelKey::PatchOw,
        ModelKey::EOral,
    ];

    /// Parameters (d, k1, k2, k3) estimated by Bayesian inference on published
    /// concentration curves. Oral uses a very large k1 so the chain collapses to a
    /// Bateman absorption/elimination curve.
    pub fn model(&self) -> SubstanceModel {
        match self {
            ModelKey::EbIm => SubstanceModel::table(1893.1, 0.67, 61.5, 4.34, None),
            ModelKey::EvIm => SubstanceModel::table(478.0, 0.236, 4.85, 1.24, None),
            ModelKey::EenIm => SubstanceModel::table(191.4, 0.119, 0.601, 0.402, None),
            ModelKey::EcIm => SubstanceModel::table(246.0, 0.0825, 3.57, 0.669, None),
            ModelKey::EunIm => SubstanceModel::table(471.5, 0.01729, 6.528, 2.285, None),
            ModelKey::EunCasubq => SubstanceModel::table(16.15, 0.046, 0.022, 0.101, None),
            ModelKey::PatchTw => SubstanceModel::table(16.792, 0.283, 5.592, 4.3, Some(3.5)),
            ModelKey::PatchOw => SubstanceModel::table(59.481, 0.107, 7.842, 5.193, Some(7.0)),
            ModelKey::EOral => SubstanceModel::table(51.5, 100.0, 8.88, 1.032, None),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKey::EbIm => "EB im",
            ModelKey::EvIm => "EV im",
            ModelKey::EenIm => "EEn im",
            ModelKey::EcIm => "EC im",
            ModelKey::EunIm => "EUn im",
            ModelKey::EunCasubq => "EUn casubq",
            ModelKey::PatchTw => "patch tw",
            ModelKey::PatchOw => "patch ow",
            ModelKey::EOral => "E oral",
        }
    }

    /// Recommended dosing intervals in days, most recommended first.
    pub fn suggested_intervals(&self) -> &'static [f64] {
        match self {
            ModelKey::EbIm => &[2.0, 3.0],
            ModelKey::EvIm => &[3.5, 5.0, 7.0],
            ModelKey::EenIm => &[7.0, 10.0],
            ModelKey::EcIm => &[7.0],
            ModelKey::EunIm | ModelKey::EunCasubq => &[14.0, 28.0],
            ModelKey::PatchTw => &[3.5],
            ModelKey::PatchOw => &[7.0],
            ModelKey::EOral => &[1.0],
        }
    }

    pub fn is_patch(&self) -> bool {
        matches!(self, ModelKey::PatchTw | ModelKey::PatchOw)
    }

    /// Position in [ModelKey::ALL], for per-model lookup arrays.
    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn ester(&self) -> Ester {
        match self {
            ModelKey::EbIm => Ester::EB,
            ModelKey::EvIm => Ester::EV,
            ModelKey::EenIm => Ester::EEn,
            ModelKey::EcIm => Ester::EC,
            ModelKey::EunIm | ModelKey::EunCasubq => Ester::EUn,
            ModelKey::PatchTw | ModelKey::PatchOw | ModelKey::EOral => Ester::E,
        }
    }

    pub fn dose_unit(&self) -> &'static str {
        if self.is_patch() {
            "mcg/day"
        } else {
            "mg"
        }
    }

    /// Rounding grid and bounds applied to solver-generated doses.
    pub fn dose_limits(&self) -> DoseLimits {
        if self.is_patch() {
            DoseLimits {
                step: 12.5,
                min: 25.0,
                max: 400.0,
            }
        } else {
            DoseLimits {
                step: 0.5,
                min: 0.5,
                max: 20.0,
            }
        }
    }
}

impl fmt::Display for ModelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelKey {
    type Err = HrtError;

    fn from_str(s: &str) -> Result<Self> {
        ModelKey::ALL
            .iter()
            .find(|key| key.as_str() == s.trim())
            .copied()
            .ok_or_else(|| HrtError::UnknownModel(s.to_string()))
    }
}

impl TryFrom<String> for ModelKey {
    type Error = HrtError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<ModelKey> for String {
    fn from(key: ModelKey) -> Self {
        key.as_str().to_string()
    }
}

/// Grid on which generated doses are rounded, in the model's dose unit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DoseLimits {
    pub step: f64,
    pub min: f64,
    pub max: f64,
}

impl DoseLimits {
    pub fn round(&self, dose: f64) -> f64 {
        ((dose / self.step).round() * self.step).clamp(self.min, self.max)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Ester {
    E,
    EB,
    EV,
    EEn,
    EC,
    EUn,
}

impl Ester {
    pub fn name(&self) -> &'static str {
        match self {
            Ester::E => "Estradiol",
            Ester::EB => "Estradiol Benzoate",
            Ester::EV => "Estradiol Valerate",
            Ester::EEn => "Estradiol Enanthate",
            Ester::EC => "Estradiol Cypionate",
            Ester::EUn => "Estradiol Undecylate",
        }
    }
}

impl FromStr for Ester {
    type Err = HrtError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "E" => Ok(Ester::E),
            "EB" => Ok(Ester::EB),
            "EV" => Ok(Ester::EV),
            "EEn" => Ok(Ester::EEn),
            "EC" => Ok(Ester::EC),
            "EUn" => Ok(Ester::EUn),
            other => Err(HrtError::UnknownEster(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    Im,
    Subq,
    Patch,
    Oral,
}

impl Method {
    pub fn name(&self) -> &'static str {
        match self {
            Method::Im => "Intramuscular",
            Method::Subq => "Subcutaneous",
            Method::Patch => "Transdermal Patch",
            Method::Oral => "Oral (micronized Estradiol)",
        }
    }
}

impl FromStr for Method {
    type Err = HrtError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "im" => Ok(Method::Im),
            "subq" => Ok(Method::Subq),
            "patch" => Ok(Method::Patch),
            "oral" => Ok(Method::Oral),
            other => Err(HrtError::UnknownMethod(other.to_string())),
        }
    }
}

/// Resolve an ester and route to its parameter-table entry.
///
/// Subcutaneous injections share the intramuscular parameters except for
/// undecylate, which has its own fit. Patches pick the twice-weekly model for
/// intervals up to five days and the once-weekly model otherwise.
pub fn resolve_model_key(ester: Ester, method: Method, interval_days: f64) -> Result<ModelKey> {
    let key = match (ester, method) {
        (Ester::EB, Method::Im | Method::Subq) => Some(ModelKey::EbIm),
        (Ester::EV, Method::Im | Method::Subq) => Some(ModelKey::EvIm),
        (Ester::EEn, Method::Im | Method::Subq) => Some(ModelKey::EenIm),
        (Ester::EC, Method::Im | Method::Subq) => Some(ModelKey::EcIm),
        (Ester::EUn, Method::Im) => Some(ModelKey::EunIm),
        (Ester::EUn, Method::Subq) => Some(ModelKey::EunCasubq),
        (Ester::E, Method::Patch) if interval_days <= 5.0 => Some(ModelKey::PatchTw),
        (Ester::E, Method::Patch) => Some(ModelKey::PatchOw),
        (Ester::E, Method::Oral) => Some(ModelKey::EOral),
        _ => None,
    };
    key.ok_or_else(|| HrtError::UnsupportedCombination {
        ester: format!("{:?}", ester),
        method: format!("{:?}", method),
    })
}
