//! Station identity.
//!
//! Every terminal writing to the shared store needs a label. It comes from
//! `station.label` in the configuration, falling back to the hostname.

use anyhow::{Context, Result};
use tc_core::StationId;

use crate::config::StationConfig;

/// Resolves the label this terminal writes into records and lease markers.
pub fn resolve(config: &StationConfig) -> Result<StationId> {
    if let Some(label) = &config.label {
        return Ok(label.clone());
    }
    let host = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string());
    from_hostname(&host)
}

/// Turns a hostname into a valid station label.
fn from_hostname(host: &str) -> Result<StationId> {
    let label: String = host
        .trim_start_matches('.')
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '-'
            }
        })
        .collect();
    let label = if label.is_empty() {
        "unknown".to_string()
    } else {
        label
    };
    StationId::new(label).context("could not derive a station label from the hostname")
}
