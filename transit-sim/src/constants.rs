//! Centralized tuning constants for the transit line simulation.
//!
//! These values define the deterministic math for the core simulation and
//! seed the defaults of [`crate::config::TuningConfig`]. The dispatch and
//! travel factors are visual-tuning constants without physical units.

// Dispatch -----------------------------------------------------------------
/// Seconds before the very first train is dispatched.
pub const BOOTSTRAP_DELAY_SECS: f64 = 5.0;
/// Converts the interval lever value into a dispatch countdown.
pub const CADENCE_FACTOR: f64 = 2.0;

// Train motion -------------------------------------------------------------
/// Multiplier applied to `distance / speed` to obtain a travel duration.
pub const TRAVEL_TIME_SCALE: f64 = 20.0;
/// Multiplier applied to the stop-time lever to obtain a dwell duration.
pub const DWELL_TIME_SCALE: f64 = 0.1;
/// Track-relative position at which new trains appear.
pub const SPAWN_OFFSET: f64 = -50.0;
/// Distance a departing train travels past the end of the line.
pub const EXIT_OVERSHOOT: f64 = 100.0;
/// Modeled track length.
pub const LINE_LENGTH: f64 = 1_000.0;

// Passenger flow -----------------------------------------------------------
/// Passengers per second per station at zero pressure.
pub const BASE_ARRIVAL_RATE: f64 = 5.0;
/// Arrival multiplier gain: arrivals scale by `1 + gain * pressure`.
pub const ARRIVAL_PRESSURE_GAIN: f64 = 4.0;
/// Fraction of load remaining after one second without service.
pub const LOAD_DECAY_FACTOR: f64 = 0.1;
/// Lower bound of the per-station arrival jitter.
pub const ARRIVAL_JITTER_LOW: f64 = 0.8;
/// Upper bound (exclusive) of the per-station arrival jitter.
pub const ARRIVAL_JITTER_HIGH: f64 = 1.2;
/// Load at which a station is drawn fully saturated.
pub const DISPLAY_LOAD_CEILING: f64 = 200.0;

// Boarding -----------------------------------------------------------------
pub const TRAIN_CAPACITY: f64 = 250.0;
/// Passengers exchanged per second of stop time.
pub const EXCHANGE_RATE: f64 = 20.0;

// Policy -------------------------------------------------------------------
pub const AUTOMATION_MIN: f64 = 0.0;
pub const AUTOMATION_MAX: f64 = 100.0;
/// Number of sample points drawn for a lever's automation curve.
pub const CURVE_SAMPLE_COUNT: usize = 101;

// Outlook thresholds -------------------------------------------------------
pub(crate) const SATISFACTION_DELIGHTED: f64 = 0.75;
pub(crate) const SATISFACTION_CONTENT: f64 = 0.5;
pub(crate) const SATISFACTION_NEUTRAL: f64 = 0.25;
pub(crate) const EFFICIENCY_SIGNIFICANT: f64 = 0.6;
pub(crate) const LOAD_STABLE_PRESSURE: f64 = 0.5;

// Line setup ---------------------------------------------------------------
pub const DEFAULT_STATION_COUNT: usize = 5;
pub const DEFAULT_STATION_NAMES: [&str; DEFAULT_STATION_COUNT] = [
    "Central",
    "Expo Center",
    "Century City",
    "Financial City",
    "Incubator Park",
];

#[cfg(test)]
pub(crate) const FLOAT_EPSILON: f64 = 1e-9;
