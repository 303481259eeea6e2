// src/config/validate.rs

use std::collections::BTreeSet;
use std::path::Path;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{BridgeError, Result};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = BridgeError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw.cache, raw.engine, raw.policy))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_paths_set(cfg)?;
    validate_cache_layout(cfg)?;
    validate_policy(cfg)?;
    Ok(())
}

fn ensure_paths_set(cfg: &RawConfigFile) -> Result<()> {
    let paths: [(&str, &Path); 8] = [
        ("[cache].regular", &cfg.cache.regular),
        ("[cache].dist_upgrade", &cfg.cache.dist_upgrade),
        ("[cache].redirect", &cfg.cache.redirect),
        ("[engine].root", &cfg.engine.root),
        ("[engine].repos_dir", &cfg.engine.repos_dir),
        ("[engine].installed_db", &cfg.engine.installed_db),
        ("[engine].keyring_dir", &cfg.engine.keyring_dir),
        ("[engine].rebuild_marker", &cfg.engine.rebuild_marker),
    ];

    for (key, path) in paths {
        if path.as_os_str().is_empty() {
            return Err(BridgeError::ConfigError(format!("{key} must not be empty")));
        }
    }

    if let Some(cmd) = &cfg.engine.recovery_command {
        if cmd.trim().is_empty() {
            return Err(BridgeError::ConfigError(
                "[engine].recovery_command must not be empty when set".to_string(),
            ));
        }
    }
    Ok(())
}

fn validate_cache_layout(cfg: &RawConfigFile) -> Result<()> {
    let cache = &cfg.cache;

    let distinct: BTreeSet<&Path> = [
        cache.regular.as_path(),
        cache.dist_upgrade.as_path(),
        cache.redirect.as_path(),
    ]
    .into_iter()
    .collect();
    if distinct.len() != 3 {
        return Err(BridgeError::ConfigError(
            "[cache].regular, dist_upgrade and redirect must be three different paths".to_string(),
        ));
    }

    for (key, root) in [
        ("regular", &cache.regular),
        ("dist_upgrade", &cache.dist_upgrade),
    ] {
        if cache.redirect.starts_with(root) {
            return Err(BridgeError::ConfigError(format!(
                "[cache].redirect '{}' must not be inside [cache].{key}",
                cache.redirect.display()
            )));
        }
    }

    if cache.regular.starts_with(&cache.dist_upgrade)
        || cache.dist_upgrade.starts_with(&cache.regular)
    {
        return Err(BridgeError::ConfigError(
            "[cache].regular and [cache].dist_upgrade must not be nested".to_string(),
        ));
    }
    Ok(())
}

fn validate_policy(cfg: &RawConfigFile) -> Result<()> {
    if let Some(pos) = cfg.policy.protected.iter().position(|p| p.trim().is_empty()) {
        return Err(BridgeError::ConfigError(format!(
            "[policy].protected entry {pos} is empty"
        )));
    }
    Ok(())
}
