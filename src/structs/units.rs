use std::fmt;
use std::str::FromStr;

use serde_derive::{Deserialize, Serialize};

use crate::error::HrtError;

/// Display unit for concentrations. The engine computes in pg/mL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ConcentrationUnit {
    #[default]
    #[serde(rename = "pg/mL")]
    PgPerMl,
    #[serde(rename = "pmol/L")]
    PmolPerL,
}

impl ConcentrationUnit {
    /// Multiplier from pg/mL into this unit.
    pub fn conversion_factor(&self) -> f64 {
        match self {
            ConcentrationUnit::PgPerMl => 1.0,
            ConcentrationUnit::PmolPerL => 3.6713,
        }
    }

    pub fn precision(&self) -> usize {
        0
    }

    pub fn from_pg_per_ml(&self, value: f64) -> f64 {
        value * self.conversion_factor()
    }

    pub fn to_pg_per_ml(&self, value: f64) -> f64 {
        value / self.conversion_factor()
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            ConcentrationUnit::PgPerMl => "pg/mL",
            ConcentrationUnit::PmolPerL => "pmol/L",
        }
    }
}

impl fmt::Display for ConcentrationUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for ConcentrationUnit {
    type Err = HrtError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "pg/mL" => Ok(ConcentrationUnit::PgPerMl),
            "pmol/L" => Ok(ConcentrationUnit::PmolPerL),
            other => Err(HrtError::InvalidParameters(format!("unknown unit {}", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pmol_conversion() {
        let unit = ConcentrationUnit::PmolPerL;
        assert!((unit.from_pg_per_ml(100.0) - 367.13).abs() < 1e-9);
        assert!((unit.to_pg_per_ml(367.13) - 100.0).abs() < 1e-9);
        assert_eq!("pmol/L".parse::<ConcentrationUnit>().unwrap(), unit);
    }
}
