//! Reference estradiol levels across a 28-day menstrual cycle (pg/mL), sampled
//! daily from cycle day 0 to 29: population mean with 5th and 95th percentiles.

/// Length of the cycle the cycle-fit solver works over.
pub const CYCLE_DAYS: usize = 28;

pub struct CycleReference {
    pub mean: [f64; 30],
    pub p5: [f64; 30],
    pub p95: [f64; 30],
}

pub const MENSTRUAL_CYCLE: CycleReference = CycleReference {
    mean: [
        37.99, 40.59, 37.49, 34.99, 35.49, 39.54, 41.99, 44.34, 53.43, 58.58, 71.43, 98.92, 132.31,
        177.35, 255.88, 182.80, 85.23, 70.98, 87.97, 109.92, 122.77, 132.56, 150.30, 133.81,
        137.16, 134.96, 92.73, 85.68, 46.34, 41.19,
    ],
    p5: [
        15.68, 17.99, 20.48, 21.63, 22.60, 23.86, 25.44, 30.64, 33.96, 42.95, 51.88, 50.79, 65.79,
        91.89, 137.25, 131.30, 43.55, 42.12, 56.83, 73.49, 79.70, 72.75, 79.46, 76.79, 76.05,
        80.22, 57.26, 47.62, 27.77, 25.60,
    ],
    p95: [
        52.97, 51.12, 51.58, 54.74, 53.59, 57.08, 61.20, 60.16, 72.79, 85.36, 94.46, 133.70,
        218.89, 314.28, 413.41, 388.28, 140.11, 108.52, 135.06, 181.42, 191.73, 196.05, 189.45,
        195.64, 208.23, 219.75, 174.38, 148.77, 135.58, 188.92,
    ],
};

/// The default cycle-fit target: the mean curve over one cycle.
pub fn menstrual_reference() -> Vec<f64> {
    MENSTRUAL_CYCLE.mean[..CYCLE_DAYS].to_vec()
}

/// Named targets a person can choose for the auto-regimen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde_derive::Serialize, serde_derive::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetPreset {
    /// Trough at the midpoint-to-upper end of the 100–200 pg/mL clinical range.
    TargetRange,
    /// Mimic the natural cycle.
    MenstrualRange,
}

impl TargetPreset {
    /// Trough aimed at, given the configured target for [TargetPreset::TargetRange].
    pub fn trough(&self, configured_target: f64) -> f64 {
        match self {
            TargetPreset::TargetRange => configured_target,
            TargetPreset::MenstrualRange => 100.0,
        }
    }
}
