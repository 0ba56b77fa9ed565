pub mod accumulator;
pub mod models;
pub mod store;

pub use accumulator::{Accumulator, Observation};
pub use models::{day_id, session_id, DayCache, PressureCache, RegionSeconds};
pub use store::DayCacheStore;
