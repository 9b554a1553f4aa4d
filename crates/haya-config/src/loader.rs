// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::{Config, ConfigError};

/// Ordered list of config file locations searched from lowest to highest priority.
/// Later files override earlier ones.
fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    // 1. System-wide default
    paths.push(PathBuf::from("/etc/haya/config.yaml"));
    paths.push(PathBuf::from("/etc/haya/config.yml"));

    // 2. XDG / home
    if let Some(cfg) = dirs::config_dir() {
        paths.push(cfg.join("haya/config.yaml"));
        paths.push(cfg.join("haya/config.yml"));
    }

    // 3. Workspace-local
    paths.push(PathBuf::from(".haya/config.yaml"));
    paths.push(PathBuf::from(".haya/config.yml"));
    paths.push(PathBuf::from("haya.yaml"));
    paths.push(PathBuf::from("haya.yml"));

    paths
}

/// Load configuration by merging all discovered YAML files, then validating
/// the result. `extra` may provide an explicit path (e.g. the `--config` CLI
/// flag), applied last so it wins over every search-path layer.
///
/// A config file that fails to read, parse, or validate is startup-fatal
/// (spec.md §7 Error Taxonomy: "Config (startup-fatal)") — unlike the merge
/// step, this never silently falls back to [`Config::default`].
pub fn load(extra: Option<&Path>) -> Result<Config, ConfigError> {
    let mut merged = serde_yaml::Value::Mapping(serde_yaml::Mapping::new());

    for path in config_search_paths() {
        if path.is_file() {
            debug!(path = %path.display(), "loading config layer");
            merge_layer(&mut merged, &path)?;
        }
    }

    if let Some(p) = extra {
        debug!(path = %p.display(), "loading explicit config");
        merge_layer(&mut merged, p)?;
    }

    let config: Config = if matches!(merged, serde_yaml::Value::Mapping(ref m) if m.is_empty()) {
        Config::default()
    } else {
        serde_yaml::from_value(merged).map_err(|source| ConfigError::Parse {
            path: "<merged config>".to_string(),
            source,
        })?
    };

    config.validate()?;
    Ok(config)
}

fn merge_layer(dst: &mut serde_yaml::Value, path: &Path) -> Result<(), ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    let layer: serde_yaml::Value = serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })?;
    merge_yaml(dst, layer);
    Ok(())
}

/// Deep-merge `src` into `dst`; src wins on scalar conflicts.
fn merge_yaml(dst: &mut serde_yaml::Value, src: serde_yaml::Value) {
    match (dst, src) {
        (serde_yaml::Value::Mapping(d), serde_yaml::Value::Mapping(s)) => {
            for (k, v) in s {
                let entry = d
                    .entry(k)
                    .or_insert(serde_yaml::Value::Mapping(serde_yaml::Mapping::new()));
                merge_yaml(entry, v);
            }
        }
        (dst, src) => *dst = src,
    }
}
