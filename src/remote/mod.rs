pub mod alert;
pub mod memory;
pub mod models;
pub mod rest;
pub mod store;

#[cfg(test)]
pub(crate) mod test_server;

pub use alert::{LogAlertSender, WebhookAlertSender};
pub use memory::MemoryStore;
pub use models::{DayLog, DeviceId, DeviceRecord, PatientRecord, PressureLog, WriteOutcome};
pub use rest::RestStore;
pub use store::{alert_body, AlertSender, RemoteStore};
