pub mod dose;
pub mod model;
pub mod reference;
pub mod regimen;
pub mod units;
