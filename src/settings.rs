use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::PathBuf,
    sync::{PoisonError, RwLock},
    time::Duration,
};
use url::Url;

/// Overrides `cloud.base_url` when set, so a build can point at a staging service.
pub const CLOUD_URL_ENV: &str = "HABITAT_CLOUD_URL";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudSettings {
    /// Proxy root the command endpoint hangs off.
    pub base_url: String,
    /// Path of the identity probe, relative to `base_url`.
    pub probe_path: String,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for CloudSettings {
    fn default() -> Self {
        Self {
            base_url: "https://hd.hardocs.com/".into(),
            probe_path: "habitat-projects".into(),
            connect_timeout_secs: 15,
            request_timeout_secs: 60,
        }
    }
}

impl CloudSettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn base_url(&self) -> Result<Url> {
        Url::parse(&self.base_url).with_context(|| format!("invalid cloud url {}", self.base_url))
    }

    pub fn probe_address(&self) -> Result<Url> {
        self.base_url()?
            .join(&self.probe_path)
            .with_context(|| format!("invalid probe path {}", self.probe_path))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoginSettings {
    pub sign_in_path: String,
    /// Where the proxy lands a browser once sign-in is complete. Defaults to the proxy root.
    pub landing_url: Option<Url>,
    /// `None` waits for the user indefinitely.
    pub timeout_secs: Option<u64>,
}

impl Default for LoginSettings {
    fn default() -> Self {
        Self {
            sign_in_path: "sign_in".into(),
            landing_url: None,
            timeout_secs: Some(600),
        }
    }
}

impl LoginSettings {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    pub enabled: bool,
    pub interval_secs: u64,
    /// Locales reconciled on every tick.
    pub locales: Vec<String>,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: 300,
            locales: Vec::new(),
        }
    }
}

impl SyncSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HabitatSettings {
    pub cloud: CloudSettings,
    pub login: LoginSettings,
    pub sync: SyncSettings,
}

pub struct SettingsStore {
    path: PathBuf,
    /// Exactly what settings.json holds; the only thing ever written back.
    data: RwLock<HabitatSettings>,
    /// `HABITAT_CLOUD_URL`, applied to reads only.
    cloud_url_override: Option<String>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        Self::load(path, std::env::var(CLOUD_URL_ENV).ok())
    }

    fn load(path: PathBuf, cloud_url_override: Option<String>) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            match serde_json::from_str(&contents) {
                Ok(data) => data,
                Err(err) => {
                    log::warn!(
                        "Ignoring unreadable settings at {}: {err}",
                        path.display()
                    );
                    HabitatSettings::default()
                }
            }
        } else {
            HabitatSettings::default()
        };

        let cloud_url_override = cloud_url_override.and_then(|raw| match Url::parse(&raw) {
            Ok(url) => Some(String::from(url)),
            Err(err) => {
                log::warn!("Ignoring {CLOUD_URL_ENV}={raw}: {err}");
                None
            }
        });

        Ok(Self {
            path,
            data: RwLock::new(data),
            cloud_url_override,
        })
    }

    /// The effective settings, environment override included.
    pub fn snapshot(&self) -> HabitatSettings {
        let mut settings = self
            .data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(url) = &self.cloud_url_override {
            settings.cloud.base_url = url.clone();
        }
        settings
    }

    pub fn cloud(&self) -> CloudSettings {
        self.snapshot().cloud
    }

    pub fn sync(&self) -> SyncSettings {
        self.snapshot().sync
    }

    pub fn update_sync(&self, settings: SyncSettings) -> Result<()> {
        let mut guard = self.data.write().unwrap_or_else(PoisonError::into_inner);
        guard.sync = settings;
        self.persist(&guard)
    }

    fn persist(&self, data: &HabitatSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}
