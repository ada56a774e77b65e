// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Layered YAML configuration for the `sessiond` daemon, composed the same
//! way `sven_config::Config` composes `ModelConfig`/`AgentConfig`/`ToolsConfig`
//! — one `DaemonConfig` struct nesting a section per subsystem, merged from
//! system → user → workspace-local files with later layers winning.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path to the SQLite database file. `None` opens an in-memory store
    /// (used by tests and `--ephemeral` runs).
    pub database_path: Option<PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { database_path: Some(PathBuf::from("sessiond.db")) }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubConfig {
    pub dedup_capacity: usize,
    pub dedup_ttl_secs: u64,
    pub request_timeout_secs: u64,
    /// Methods a connection is auto-subscribed to on joining the `global`
    /// scope.
    pub global_auto_subscribe: Vec<String>,
    /// Methods a connection is auto-subscribed to on joining a session.
    pub session_auto_subscribe: Vec<String>,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            dedup_capacity: sessiond_hub::DEFAULT_CAPACITY,
            dedup_ttl_secs: sessiond_hub::DEFAULT_TTL.as_secs(),
            request_timeout_secs: sessiond_hub::DEFAULT_REQUEST_TIMEOUT.as_secs(),
            global_auto_subscribe: vec!["session.updated".to_string(), "recurringJob.triggered".to_string()],
            session_auto_subscribe: vec!["sdk.message".to_string(), "state.sdkMessages.delta".to_string()],
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub hub: HubConfig,
}

/// Ordered list of config file locations searched from lowest to highest
/// priority. Later files override earlier ones — directly grounded in
/// `sven_config::loader::config_search_paths`, renamed to this daemon's
/// own directory names.
fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    paths.push(PathBuf::from("/etc/sessiond/config.yaml"));
    paths.push(PathBuf::from("/etc/sessiond/config.yml"));

    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(".config/sessiond/config.yaml"));
        paths.push(home.join(".config/sessiond/config.yml"));
    }
    if let Some(cfg) = dirs::config_dir() {
        paths.push(cfg.join("sessiond/config.yaml"));
        paths.push(cfg.join("sessiond/config.yml"));
    }

    paths.push(PathBuf::from(".sessiond/config.yaml"));
    paths.push(PathBuf::from(".sessiond/config.yml"));
    paths.push(PathBuf::from("sessiond.yaml"));
    paths.push(PathBuf::from("sessiond.yml"));

    paths
}

/// Load configuration by deep-merging every discovered YAML file, with an
/// optional explicit `--config` path applied last (highest priority).
pub fn load(extra: Option<&Path>) -> anyhow::Result<DaemonConfig> {
    let mut merged = serde_yaml::Value::Mapping(serde_yaml::Mapping::new());

    for path in config_search_paths() {
        if path.is_file() {
            debug!(path = %path.display(), "loading config layer");
            let text = std::fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
            let layer: serde_yaml::Value =
                serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
            merge_yaml(&mut merged, layer);
        }
    }

    if let Some(p) = extra {
        debug!(path = %p.display(), "loading explicit config");
        let text = std::fs::read_to_string(p).with_context(|| format!("reading {}", p.display()))?;
        let layer: serde_yaml::Value =
            serde_yaml::from_str(&text).with_context(|| format!("parsing {}", p.display()))?;
        merge_yaml(&mut merged, layer);
    }

    let config: DaemonConfig = if matches!(merged, serde_yaml::Value::Mapping(ref m) if m.is_empty()) {
        DaemonConfig::default()
    } else {
        serde_yaml::from_value(merged).unwrap_or_default()
    };
    Ok(config)
}

/// Deep-merge `src` into `dst`; `src` wins on scalar conflicts.
fn merge_yaml(dst: &mut serde_yaml::Value, src: serde_yaml::Value) {
    match (dst, src) {
        (serde_yaml::Value::Mapping(d), serde_yaml::Value::Mapping(s)) => {
            for (k, v) in s {
                match d.get_mut(&k) {
                    Some(existing) => merge_yaml(existing, v),
                    None => {
                        d.insert(k, v);
                    }
                }
            }
        }
        (dst, src) => *dst = src,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_nothing_found() {
        let merged = serde_yaml::Value::Mapping(serde_yaml::Mapping::new());
        let config: DaemonConfig = if matches!(merged, serde_yaml::Value::Mapping(ref m) if m.is_empty()) {
            DaemonConfig::default()
        } else {
            unreachable!()
        };
        assert_eq!(config.hub.dedup_capacity, sessiond_hub::DEFAULT_CAPACITY);
    }

    #[test]
    fn merge_yaml_overrides_scalars_and_keeps_untouched_keys() {
        let mut dst = serde_yaml::from_str("hub:\n  dedup_capacity: 500\n  request_timeout_secs: 30\n").unwrap();
        let src = serde_yaml::from_str("hub:\n  dedup_capacity: 10\n").unwrap();
        merge_yaml(&mut dst, src);
        let config: DaemonConfig = serde_yaml::from_value(dst).unwrap();
        assert_eq!(config.hub.dedup_capacity, 10);
        assert_eq!(config.hub.request_timeout_secs, 30);
    }
}
