//! Collaborators outside the protocol engine: the wireless driver, the
//! user-facing alert surface and the credential store.

use crate::key_processor::KeyInstall;
use anyhow::{anyhow, Result};
use dot1x_core::ClientStatus;
use pnet::datalink::MacAddr;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub trait Wireless: Send {
    fn bssid(&self) -> Option<MacAddr>;
    fn ssid(&self) -> Option<String>;
    fn set_key(&mut self, key: &KeyInstall) -> Result<()>;
    /// Caches `pmk` for `bssid`, or for the current association when `None`.
    fn set_pmk(&mut self, bssid: Option<MacAddr>, pmk: &[u8]) -> Result<()>;
    fn reassociate(&mut self) -> Result<()>;
}

/// Stand-in driver for wired ports and platforms without a wireless backend.
#[derive(Debug, Default)]
pub struct NoDriver;

impl Wireless for NoDriver {
    fn bssid(&self) -> Option<MacAddr> {
        None
    }

    fn ssid(&self) -> Option<String> {
        None
    }

    fn set_key(&mut self, key: &KeyInstall) -> Result<()> {
        Err(anyhow!("no wireless driver to install key index {}", key.index))
    }

    fn set_pmk(&mut self, _bssid: Option<MacAddr>, _pmk: &[u8]) -> Result<()> {
        debug!("No wireless driver, PMK not cached");
        Ok(())
    }

    fn reassociate(&mut self) -> Result<()> {
        Err(anyhow!("no wireless driver to reassociate"))
    }
}

pub trait Alerts: Send {
    fn show(&mut self, status: &ClientStatus);
    fn dismiss(&mut self);
}

/// Surfaces alerts through the log.
#[derive(Debug, Default)]
pub struct LogAlerts {
    showing: bool,
}

impl Alerts for LogAlerts {
    fn show(&mut self, status: &ClientStatus) {
        warn!("Authentication needs attention: {:?}", status);
        self.showing = true;
    }

    fn dismiss(&mut self) {
        if self.showing {
            info!("Authentication alert cleared");
            self.showing = false;
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct StoredCredentials {
    pub user_name: String,
    pub password: Option<String>,
}

pub trait CredentialStore: Send {
    fn save(&mut self, credentials: &StoredCredentials) -> Result<()>;
    fn load(&self) -> Result<Option<StoredCredentials>>;
}

/// Credentials kept as JSON in the daemon's state directory.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(statedir: impl AsRef<Path>, interface: &str) -> Self {
        FileCredentialStore {
            path: statedir.as_ref().join(format!("{}.credentials.json", interface)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialStore for FileCredentialStore {
    fn save(&mut self, credentials: &StoredCredentials) -> Result<()> {
        info!("Saving credentials to {}", self.path.display());
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }
        let data = serde_json::to_vec_pretty(credentials)?;
        fs::write(&self.path, data)?;
        Ok(())
    }

    fn load(&self) -> Result<Option<StoredCredentials>> {
        if !self.path.exists() {
            return Ok(None);
        }
        info!("Loading credentials from {}", self.path.display());
        let data = fs::read(&self.path)?;
        Ok(Some(serde_json::from_slice(&data)?))
    }
}
