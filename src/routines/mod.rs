// Calibration against lab results
pub mod calibration;
// CSV output
pub mod output;
// Schedule expansion and calendar merging
pub mod schedule;
// Settings
pub mod settings;
