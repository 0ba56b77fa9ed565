use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs,
    path::PathBuf,
    str::FromStr,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
    time::Duration,
};

use crate::heatmap::InterpolationMethod;

/// Key/value configuration capability, addressed by `(section, key)`.
pub trait ConfigProvider: Send + Sync {
    fn get(&self, section: &str, key: &str) -> Option<String>;
    fn set(&self, section: &str, key: &str, value: &str) -> Result<()>;
    fn remove(&self, section: &str, key: &str) -> Result<()>;
}

/// Reads `section.key` and parses it, falling back when the key is missing,
/// blank or unparsable.
pub fn get_or<T: FromStr>(config: &dyn ConfigProvider, section: &str, key: &str, fallback: T) -> T {
    config
        .get(section, key)
        .filter(|raw| !raw.trim().is_empty())
        .and_then(|raw| raw.trim().parse().ok())
        .unwrap_or(fallback)
}

fn secs_or(config: &dyn ConfigProvider, section: &str, key: &str, fallback: f64) -> Duration {
    let secs: f64 = get_or(config, section, key, fallback);
    if secs.is_finite() && secs >= 0.0 {
        Duration::from_secs_f64(secs)
    } else {
        Duration::from_secs_f64(fallback)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct SettingsData {
    #[serde(flatten)]
    sections: BTreeMap<String, BTreeMap<String, String>>,
}

/// JSON-file backed settings, persisted on every write.
pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<SettingsData>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                log::warn!("Ignoring unreadable settings file {}: {err}", path.display());
                SettingsData::default()
            })
        } else {
            SettingsData::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, SettingsData> {
        self.data.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, SettingsData> {
        self.data.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn persist(&self, data: &SettingsData) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create settings directory {}", parent.display())
                })?;
            }
        }
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}

impl ConfigProvider for SettingsStore {
    fn get(&self, section: &str, key: &str) -> Option<String> {
        self.read()
            .sections
            .get(section)
            .and_then(|values| values.get(key))
            .cloned()
    }

    fn set(&self, section: &str, key: &str, value: &str) -> Result<()> {
        let mut guard = self.write();
        guard
            .sections
            .entry(section.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
        self.persist(&guard)
    }

    fn remove(&self, section: &str, key: &str) -> Result<()> {
        let mut guard = self.write();
        let removed = guard
            .sections
            .get_mut(section)
            .and_then(|values| values.remove(key))
            .is_some();
        if removed {
            self.persist(&guard)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct SerialSettings {
    pub baud_rate: u32,
    pub timeout: Duration,
    /// Boards reset when the port opens; input arriving before this is noise.
    pub settle_delay: Duration,
}

impl SerialSettings {
    pub fn from_config(config: &dyn ConfigProvider) -> Self {
        Self {
            baud_rate: get_or(config, "serial", "baud_rate", 9600),
            timeout: secs_or(config, "serial", "timeout", 2.0),
            settle_delay: secs_or(config, "serial", "settle_delay", 2.0),
        }
    }
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            baud_rate: 9600,
            timeout: Duration::from_secs(2),
            settle_delay: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StreamSettings {
    pub min_interval: Duration,
    pub timeout: Duration,
    pub min_revision_delta: u64,
}

impl StreamSettings {
    pub fn from_config(config: &dyn ConfigProvider) -> Self {
        Self {
            min_interval: secs_or(config, "stream", "min_interval", 0.1),
            timeout: secs_or(config, "stream", "timeout", 0.1),
            min_revision_delta: get_or(config, "stream", "min_revision_delta", 1u64).max(1),
        }
    }
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_millis(100),
            timeout: Duration::from_millis(100),
            min_revision_delta: 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub task_capacity: usize,
    pub result_capacity: usize,
    pub realtime_capacity: usize,
    pub join_timeout: Duration,
    pub interpolation: InterpolationMethod,
}

impl PipelineSettings {
    pub fn from_config(config: &dyn ConfigProvider) -> Self {
        let defaults = Self::default();
        Self {
            task_capacity: get_or(config, "pipeline", "task_capacity", defaults.task_capacity).max(1),
            result_capacity: get_or(config, "pipeline", "result_capacity", defaults.result_capacity)
                .max(1),
            realtime_capacity: get_or(
                config,
                "pipeline",
                "realtime_capacity",
                defaults.realtime_capacity,
            )
            .max(1),
            join_timeout: secs_or(config, "pipeline", "join_timeout", 2.0),
            interpolation: get_or(config, "pipeline", "interpolation", defaults.interpolation),
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            task_capacity: 64,
            result_capacity: 64,
            realtime_capacity: 10,
            join_timeout: Duration::from_secs(2),
            interpolation: InterpolationMethod::Cubic,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub dir: PathBuf,
}

impl CacheSettings {
    pub fn from_config(config: &dyn ConfigProvider) -> Self {
        let dir = config
            .get("cache", "dir")
            .filter(|raw| !raw.trim().is_empty())
            .unwrap_or_else(|| "pressure_cache".to_string());
        Self {
            dir: PathBuf::from(dir),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RemoteSettings {
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub webhook_url: Option<String>,
    pub timeout: Duration,
}

impl RemoteSettings {
    pub fn from_config(config: &dyn ConfigProvider) -> Self {
        let non_blank = |key: &str| config.get("remote", key).filter(|v| !v.trim().is_empty());
        Self {
            url: non_blank("url"),
            api_key: non_blank("api_key"),
            webhook_url: non_blank("webhook_url"),
            timeout: secs_or(config, "remote", "timeout", 10.0),
        }
    }
}
