//! Layered configuration for the billing server.
//!
//! Later layers override earlier ones, field by field:
//! 1. Built-in defaults
//! 2. Global settings (`<config dir>/hotspot/settings.json`)
//! 3. Project settings (`.hotspot/settings.json`)
//! 4. `HOTSPOT_*` environment variables
//! 5. CLI flags, applied by the binary

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// Default referral commission: 10%.
pub const DEFAULT_COMMISSION_RATE_BPS: u32 = 1_000;

const APP_DIR: &str = "hotspot";
const SETTINGS_FILE: &str = "settings.json";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Config {
    pub server: ServerConfig,
    pub commission: CommissionConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    /// Funding and credential import. Keep it off public interfaces.
    pub admin_listen_addr: SocketAddr,
    /// `None` selects [`database_path`].
    pub database_path: Option<PathBuf>,
    pub log_level: String,
    pub log_json: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            admin_listen_addr: SocketAddr::from(([127, 0, 0, 1], 8081)),
            database_path: None,
            log_level: "info".to_string(),
            log_json: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommissionConfig {
    /// Share of each purchase credited to the referrer, in basis points.
    pub rate_bps: u32,
    /// Seconds between background reconciliation passes.
    pub reconcile_interval_secs: u64,
    /// Purchases examined per reconciliation pass.
    pub reconcile_batch: u32,
}

impl Default for CommissionConfig {
    fn default() -> Self {
        Self {
            rate_bps: DEFAULT_COMMISSION_RATE_BPS,
            reconcile_interval_secs: 300,
            reconcile_batch: 500,
        }
    }
}

/// One settings file. Every field is optional so a file only overrides
/// what it names.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct SettingsFile {
    server: ServerSettings,
    commission: CommissionSettings,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ServerSettings {
    listen_addr: Option<SocketAddr>,
    admin_listen_addr: Option<SocketAddr>,
    database_path: Option<PathBuf>,
    log_level: Option<String>,
    log_json: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct CommissionSettings {
    rate_bps: Option<u32>,
    reconcile_interval_secs: Option<u64>,
    reconcile_batch: Option<u32>,
}

impl Config {
    fn apply(&mut self, file: SettingsFile) {
        let SettingsFile { server, commission } = file;

        if let Some(v) = server.listen_addr {
            self.server.listen_addr = v;
        }
        if let Some(v) = server.admin_listen_addr {
            self.server.admin_listen_addr = v;
        }
        if server.database_path.is_some() {
            self.server.database_path = server.database_path;
        }
        if let Some(v) = server.log_level {
            self.server.log_level = v;
        }
        if let Some(v) = server.log_json {
            self.server.log_json = v;
        }

        if let Some(v) = commission.rate_bps {
            self.commission.rate_bps = v;
        }
        if let Some(v) = commission.reconcile_interval_secs {
            self.commission.reconcile_interval_secs = v;
        }
        if let Some(v) = commission.reconcile_batch {
            self.commission.reconcile_batch = v;
        }
    }

    fn validate(&self) -> Result<()> {
        if self.commission.rate_bps > 10_000 {
            return Err(Error::Config(format!(
                "commission.rate_bps must be at most 10000, got {}",
                self.commission.rate_bps
            )));
        }
        if self.server.admin_listen_addr == self.server.listen_addr {
            return Err(Error::Config(format!(
                "server.admin_listen_addr must differ from server.listen_addr ({})",
                self.server.listen_addr
            )));
        }
        if self.commission.reconcile_batch == 0 {
            return Err(Error::Config("commission.reconcile_batch must be positive".into()));
        }
        Ok(())
    }
}

/// Resolve configuration from defaults, settings files, and the environment.
pub fn load_config(project_dir: Option<&Path>) -> Result<Config> {
    let mut config = Config::default();

    let files = global_config_path()
        .into_iter()
        .chain(project_dir.map(|d| d.join(".hotspot").join(SETTINGS_FILE)));
    for path in files {
        if path.exists() {
            debug!(path = %path.display(), "Applying settings file");
            config.apply(read_settings(&path)?);
        }
    }

    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    config.validate()?;
    Ok(config)
}

/// `<config dir>/hotspot/settings.json`, e.g. `~/.config/hotspot/settings.json`.
pub fn global_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join(APP_DIR).join(SETTINGS_FILE))
}

/// Default billing database location under the user's data directory.
pub fn database_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join(APP_DIR).join("billing.db"))
}

fn read_settings(path: &Path) -> Result<SettingsFile> {
    let raw = std::fs::read_to_string(path).map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| Error::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn apply_env_overrides(
    config: &mut Config,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<()> {
    if let Some(v) = parse_env(&lookup, "HOTSPOT_LISTEN_ADDR")? {
        config.server.listen_addr = v;
    }
    if let Some(v) = parse_env(&lookup, "HOTSPOT_ADMIN_LISTEN_ADDR")? {
        config.server.admin_listen_addr = v;
    }
    if let Some(v) = lookup("HOTSPOT_DATABASE_PATH") {
        config.server.database_path = Some(PathBuf::from(v));
    }
    if let Some(v) = lookup("HOTSPOT_LOG_LEVEL") {
        config.server.log_level = v;
    }
    if let Some(v) = parse_env(&lookup, "HOTSPOT_LOG_JSON")? {
        config.server.log_json = v;
    }
    if let Some(v) = parse_env(&lookup, "HOTSPOT_COMMISSION_RATE_BPS")? {
        config.commission.rate_bps = v;
    }
    if let Some(v) = parse_env(&lookup, "HOTSPOT_RECONCILE_INTERVAL_SECS")? {
        config.commission.reconcile_interval_secs = v;
    }
    if let Some(v) = parse_env(&lookup, "HOTSPOT_RECONCILE_BATCH")? {
        config.commission.reconcile_batch = v;
    }
    Ok(())
}

fn parse_env<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>> {
    lookup(key)
        .map(|val| {
            val.trim()
                .parse()
                .map_err(|_| Error::Config(format!("Invalid value for {key}: {val:?}")))
        })
        .transpose()
}
