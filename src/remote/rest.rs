//! [`RemoteStore`] over a PostgREST-style HTTP API.
//!
//! Tables: `devices`, `patients`, `day_logs`, `pressure_logs`, `heatmaps`.
//! Every request carries the `apikey` header plus a bearer token with the
//! same key, and writes ask for `return=representation` so an empty array
//! can be reported as [`WriteOutcome::NotFound`].

use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use log::{debug, info, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;

use super::models::{DayLog, DeviceId, DeviceRecord, PatientRecord, PressureLog, WriteOutcome};
use super::store::RemoteStore;

pub struct RestStore {
    base_url: String,
    api_key: String,
    agent: ureq::Agent,
}

impl RestStore {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            bail!("remote url must start with http:// or https://, got '{base_url}'");
        }
        let agent = ureq::AgentBuilder::new()
            .timeout(timeout)
            .user_agent(concat!("bedwatch/", env!("CARGO_PKG_VERSION")))
            .build();

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            agent,
        })
    }

    fn request(&self, method: &str, table: &str, query: &str) -> ureq::Request {
        let url = format!("{}/rest/v1/{table}{query}", self.base_url);
        self.agent
            .request(method, &url)
            .set("apikey", &self.api_key)
            .set("Authorization", &format!("Bearer {}", self.api_key))
            .set("Accept", "application/json")
    }

    fn send<T: DeserializeOwned>(
        &self,
        request: ureq::Request,
        body: Option<serde_json::Value>,
        what: &str,
    ) -> Result<T> {
        let result = match body {
            Some(body) => request.send_json(body),
            None => request.call(),
        };
        let response = match result {
            Ok(response) => response,
            Err(ureq::Error::Status(code, response)) => {
                let text = response.into_string().unwrap_or_default();
                bail!("{what} failed with HTTP {code}: {text}");
            }
            Err(err) => return Err(anyhow!("{what} failed: {err}")),
        };
        response
            .into_json()
            .with_context(|| format!("{what}: unexpected response body"))
    }

    fn select<T: DeserializeOwned>(&self, table: &str, filter: &str) -> Result<Vec<T>> {
        let query = if filter.is_empty() {
            "?select=*".to_string()
        } else {
            format!("?select=*&{filter}")
        };
        self.send(self.request("GET", table, &query), None, &format!("select {table}"))
    }

    fn insert<T: Serialize + DeserializeOwned>(&self, table: &str, row: &T) -> Result<WriteOutcome<T>> {
        let request = self
            .request("POST", table, "")
            .set("Prefer", "return=representation");
        let rows: Vec<T> = self.send(request, Some(serde_json::to_value(row)?), &format!("insert {table}"))?;
        Ok(rows.into_iter().next().map_or(WriteOutcome::NotFound, WriteOutcome::Created))
    }

    fn update<T: Serialize + DeserializeOwned>(
        &self,
        table: &str,
        id: i64,
        row: &T,
    ) -> Result<WriteOutcome<T>> {
        let request = self
            .request("PATCH", table, &format!("?id=eq.{id}"))
            .set("Prefer", "return=representation");
        let rows: Vec<T> = self.send(request, Some(serde_json::to_value(row)?), &format!("update {table}"))?;
        Ok(rows.into_iter().next().map_or(WriteOutcome::NotFound, WriteOutcome::Updated))
    }
}

impl RemoteStore for RestStore {
    fn fetch_device(&self, id: DeviceId) -> Result<Option<DeviceRecord>> {
        debug!("Fetching device {id}");
        let rows: Vec<DeviceRecord> = self.select("devices", &format!("id=eq.{id}"))?;
        Ok(rows.into_iter().next())
    }

    fn create_device(&self, device: &DeviceRecord) -> Result<WriteOutcome<DeviceRecord>> {
        info!("Creating device {}", device.id);
        self.insert("devices", device)
    }

    fn remove_device(&self, id: DeviceId) -> Result<Option<DeviceRecord>> {
        info!("Removing device {id}");
        let request = self
            .request("DELETE", "devices", &format!("?id=eq.{id}"))
            .set("Prefer", "return=representation");
        let rows: Vec<DeviceRecord> = self.send(request, None, "delete devices")?;
        if rows.is_empty() {
            warn!("No device found to remove: {id}");
        }
        Ok(rows.into_iter().next())
    }

    fn fetch_patient_by_device(&self, device_id: DeviceId) -> Result<Option<PatientRecord>> {
        let rows: Vec<PatientRecord> =
            self.select("patients", &format!("device_id=eq.{device_id}"))?;
        Ok(rows.into_iter().next())
    }

    fn create_day_log(&self, log: &DayLog) -> Result<WriteOutcome<DayLog>> {
        debug!("Creating day log {} for device {}", log.id, log.device_id);
        self.insert("day_logs", log)
    }

    fn update_day_log(&self, log: &DayLog) -> Result<WriteOutcome<DayLog>> {
        debug!("Updating day log {}", log.id);
        self.update("day_logs", log.id, log)
    }

    fn fetch_day_logs(&self) -> Result<Vec<DayLog>> {
        self.select("day_logs", "")
    }

    fn create_pressure_log(&self, log: &PressureLog) -> Result<WriteOutcome<PressureLog>> {
        debug!("Creating pressure log {} for day {}", log.id, log.day_id);
        self.insert("pressure_logs", log)
    }

    fn update_pressure_log(&self, log: &PressureLog) -> Result<WriteOutcome<PressureLog>> {
        debug!("Updating pressure log {}", log.id);
        self.update("pressure_logs", log.id, log)
    }

    fn fetch_pressure_logs(&self, day_id: i64) -> Result<Vec<PressureLog>> {
        self.select("pressure_logs", &format!("day_id=eq.{day_id}"))
    }

    fn broadcast_heatmap(&self, device_id: DeviceId, values: &[f64]) -> Result<()> {
        let request = self
            .request("POST", "heatmaps", "?on_conflict=device_id")
            .set("Prefer", "resolution=merge-duplicates,return=minimal");
        let body = json!({ "device_id": device_id, "sensors": values });
        match request.send_json(body) {
            Ok(_) => Ok(()),
            Err(ureq::Error::Status(code, response)) => {
                let text = response.into_string().unwrap_or_default();
                bail!("heatmap upload failed with HTTP {code}: {text}")
            }
            Err(err) => Err(anyhow!("heatmap upload failed: {err}")),
        }
    }
}
