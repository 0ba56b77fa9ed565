use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::Local;
use log::{info, warn};
use uuid::Uuid;

use crate::remote::{DeviceId, DeviceRecord, RemoteStore};
use crate::settings::ConfigProvider;
use crate::utils::threads::sleep_unless;

const SECTION: &str = "device";
const KEY: &str = "device_id";
const MAX_ATTEMPTS: usize = 8;

/// Low 16 bits of a v4 UUID.
fn random_device_id() -> DeviceId {
    (Uuid::new_v4().as_u128() & 0xFFFF) as DeviceId
}

/// Tracks this machine's device id in config and registers it remotely.
pub struct DeviceManager {
    config: Arc<dyn ConfigProvider>,
    store: Arc<dyn RemoteStore>,
}

impl DeviceManager {
    pub fn new(config: Arc<dyn ConfigProvider>, store: Arc<dyn RemoteStore>) -> Self {
        Self { config, store }
    }

    pub fn device_id(&self) -> Option<DeviceId> {
        self.config
            .get(SECTION, KEY)
            .and_then(|raw| raw.trim().parse().ok())
    }

    pub fn is_registered(&self) -> bool {
        self.device_id().is_some()
    }

    /// Returns the configured id, or creates a new device remotely and
    /// stores its id.
    pub fn register(&self) -> Result<DeviceId> {
        if let Some(id) = self.device_id() {
            return Ok(id);
        }

        for _ in 0..MAX_ATTEMPTS {
            let id = random_device_id();
            if self.store.fetch_device(id)?.is_some() {
                warn!("Device id {id} already taken; drawing another");
                continue;
            }

            let record = DeviceRecord {
                id,
                created_at: Local::now().naive_local(),
            };
            let Some(created) = self.store.create_device(&record)?.into_record() else {
                bail!("store returned no row creating device {id}");
            };
            self.config
                .set(SECTION, KEY, &created.id.to_string())
                .context("Failed to store device id")?;
            info!("Registered device {}", created.id);
            return Ok(created.id);
        }
        bail!("no free device id after {MAX_ATTEMPTS} attempts")
    }

    /// Keeps calling [`register`](Self::register) every `retry` until it
    /// succeeds. Returns `None` only once `stop` reports true.
    pub fn register_with_retry(&self, retry: Duration, stop: impl Fn() -> bool) -> Option<DeviceId> {
        let mut attempt = 0u32;
        while !stop() {
            attempt += 1;
            match self.register() {
                Ok(id) => return Some(id),
                Err(err) => {
                    warn!("Device registration attempt {attempt} failed: {err:#}; retrying in {retry:?}")
                }
            }
            sleep_unless(retry, &stop);
        }
        None
    }

    /// Removes the device remotely and forgets its id. Returns the id that
    /// was registered, if any.
    pub fn unregister(&self) -> Result<Option<DeviceId>> {
        let Some(id) = self.device_id() else {
            return Ok(None);
        };
        if self.store.remove_device(id)?.is_none() {
            warn!("Device {id} was not present remotely");
        }
        self.config.remove(SECTION, KEY)?;
        info!("Unregistered device {id}");
        Ok(Some(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MemoryStore;
    use crate::settings::SettingsStore;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    fn manager() -> (tempfile::TempDir, Arc<SettingsStore>, Arc<MemoryStore>, DeviceManager) {
        let dir = tempfile::tempdir().unwrap();
        let config = Arc::new(SettingsStore::new(dir.path().join("bedwatch.json")).unwrap());
        let store = Arc::new(MemoryStore::recording());
        let manager = DeviceManager::new(config.clone(), store.clone());
        (dir, config, store, manager)
    }

    #[test]
    fn register_creates_and_remembers_a_16_bit_id() {
        let (_dir, config, store, manager) = manager();
        assert!(!manager.is_registered());

        let id = manager.register().unwrap();
        assert!((0..=0xFFFF).contains(&id));
        assert!(manager.is_registered());
        assert_eq!(config.get("device", "device_id"), Some(id.to_string()));
        assert!(store.fetch_device(id).unwrap().is_some());

        assert_eq!(manager.register().unwrap(), id);
        let creates = store.calls().iter().filter(|c| **c == "create_device").count();
        assert_eq!(creates, 1);
    }

    #[test]
    fn unregister_removes_remote_row_and_config_key() {
        let (_dir, config, store, manager) = manager();
        let id = manager.register().unwrap();

        assert_eq!(manager.unregister().unwrap(), Some(id));
        assert!(!manager.is_registered());
        assert_eq!(config.get("device", "device_id"), None);
        assert!(store.fetch_device(id).unwrap().is_none());
        assert_eq!(manager.unregister().unwrap(), None);
    }

    #[test]
    fn registration_fails_while_store_is_offline() {
        let (_dir, _config, store, manager) = manager();
        store.set_offline(true);
        assert!(manager.register().is_err());
        assert!(!manager.is_registered());
    }

    #[test]
    fn registration_retries_until_the_store_comes_back() {
        let (_dir, _config, store, manager) = manager();
        store.set_offline(true);
        let checks = AtomicUsize::new(0);

        let id = manager.register_with_retry(Duration::from_millis(5), || {
            if checks.fetch_add(1, Ordering::SeqCst) == 3 {
                store.set_offline(false);
            }
            false
        });

        let id = id.unwrap();
        assert_eq!(manager.device_id(), Some(id));
        assert!(store.calls().iter().filter(|c| **c == "fetch_device").count() >= 2);
    }

    #[test]
    fn registration_retry_gives_up_when_stopped() {
        let (_dir, _config, store, manager) = manager();
        store.set_offline(true);
        let stopped = AtomicBool::new(false);

        let id = manager.register_with_retry(Duration::from_millis(5), || {
            let was = stopped.load(Ordering::SeqCst);
            stopped.store(true, Ordering::SeqCst);
            was
        });

        assert_eq!(id, None);
        assert!(!manager.is_registered());
        assert_eq!(store.calls(), ["fetch_device"]);
    }
}
