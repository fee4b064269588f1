//! Default constants for the lag/window search and calendar policy.

pub const DEFAULT_LAG_START: f64 = 0.0;
pub const DEFAULT_LAG_END: f64 = 8.0;
pub const DEFAULT_LAG_STEP: f64 = 0.25;
/// Upper bound on the number of lag values in one grid.
pub const MAX_LAG_POINTS: usize = 10_000;
pub const DEFAULT_WINDOW_START: u32 = 8;
pub const DEFAULT_WINDOW_END: u32 = 16;
pub const DEFAULT_WINDOW_STEP: u32 = 1;
pub const DEFAULT_WORKDAY_END_HOUR: u32 = 18;
pub const DEFAULT_ENERGY_THRESHOLD: f64 = 2.0;
pub const DEFAULT_SEASON_START: u32 = 101;
pub const DEFAULT_SEASON_END: u32 = 1231;
/// Window bounds used by the supplementary settings file when it omits them.
pub const DEFAULT_SUPP_MIN_WINDOW: u32 = 5;
pub const DEFAULT_SUPP_MAX_WINDOW: u32 = 15;
/// Parameters of `a + b·t + c·t²`.
pub const MIN_REGRESSION_POINTS: usize = 3;
pub const WEAK_MODEL_R2: f64 = 0.5;
