//! Remote mirroring of the local pressure cache and threshold alerting.

pub mod engine;
pub mod last_log;
pub mod logger;
pub mod threshold;

pub use engine::{to_day_log, to_pressure_log, SyncEngine, SyncReport};
pub use last_log::{LastLogFile, LAST_LOG_FILE};
pub use logger::PressureLogger;
pub use threshold::{PartThreshold, ThresholdMonitor, DEFAULT_THRESHOLD_MINUTES};
