pub mod logging;
pub mod threads;
