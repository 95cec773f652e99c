//! Configuration loading and management.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::value::Value;
use serde::{Deserialize, Serialize};
use tc_core::{EmployeeId, EmployeeProfile, StationId};
use tc_store::{LeaseConfig, Profiles, StoreConfig};

/// Application configuration.
///
/// ```toml
/// [station]
/// label = "front-desk"
///
/// [store]
/// directory = "/mnt/share/attendance"
///
/// [defaults]
/// day_boundary = "04:00"
///
/// [employees."042".schedule]
/// friday = "4:00"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub station: StationConfig,
    pub store: StoreConfig,
    pub lease: LeaseConfig,
    /// Profile for employees without their own entry.
    pub defaults: EmployeeProfile,
    /// Per-employee overrides, layered on top of `defaults`.
    pub employees: BTreeMap<EmployeeId, Value>,
}

/// Identity of this terminal.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StationConfig {
    /// Label written into saved records and lease markers.
    /// Default: the sanitized hostname.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<StationId>,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs_data_path().unwrap_or_else(|| PathBuf::from("."));
        Self {
            station: StationConfig::default(),
            store: StoreConfig {
                directory: data_dir.join("records"),
                group: None,
            },
            lease: LeaseConfig::default(),
            defaults: EmployeeProfile::default(),
            employees: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Loads configuration from default locations, plus `config_path` if given.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        // Load from default config location
        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        // Load from specified config file
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // Load from environment variables (TC_*, nested with __)
        figment = figment.merge(Env::prefixed("TC_").split("__"));

        figment.extract()
    }

    /// Resolves every employee override against the defaults.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn profiles(&self) -> Result<Profiles, figment::Error> {
        let employees = self
            .employees
            .iter()
            .map(
                |(employee_id, overrides)| -> Result<(EmployeeId, EmployeeProfile), figment::Error> {
                    let profile = Figment::from(Serialized::defaults(&self.defaults))
                        .merge(Serialized::defaults(overrides))
                        .extract()?;
                    Ok((employee_id.clone(), profile))
                },
            )
            .collect::<Result<BTreeMap<_, _>, _>>()?;
        Ok(Profiles {
            default: self.defaults.clone(),
            employees,
        })
    }
}

/// Returns the platform-specific config directory for tc.
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("timeclock"))
}

/// Returns the platform-specific data directory for tc.
///
/// On Linux: `~/.local/share/timeclock`
pub fn dirs_data_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("timeclock"))
}
