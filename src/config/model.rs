// src/config/model.rs

use std::path::PathBuf;

use serde::Deserialize;

use crate::cache_root::CacheRoots;
use crate::engine::local::LocalEngineSettings;
use crate::job::JobSettings;

/// Configuration exactly as read from TOML, before validation.
///
/// ```toml
/// [cache]
/// regular = "/var/cache/pkbridge/regular"
/// dist_upgrade = "/var/cache/pkbridge/dist-upgrade"
/// redirect = "/var/cache/pkbridge/active"
///
/// [engine]
/// root = "/"
/// repos_dir = "/etc/pkbridge/repos.d"
///
/// [policy]
/// protected = ["glibc", "rpm", "pkbridge"]
/// ```
///
/// Every section is optional and falls back to the system defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfigFile {
    #[serde(default)]
    pub cache: CacheSection,

    #[serde(default)]
    pub engine: EngineSection,

    #[serde(default)]
    pub policy: PolicySection,
}

/// `[cache]`: the two cache roots and the redirect the engine reads through.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheSection {
    #[serde(default = "default_regular")]
    pub regular: PathBuf,
    #[serde(default = "default_dist_upgrade")]
    pub dist_upgrade: PathBuf,
    #[serde(default = "default_redirect")]
    pub redirect: PathBuf,
}

fn default_regular() -> PathBuf {
    PathBuf::from("/var/cache/pkbridge/regular")
}

fn default_dist_upgrade() -> PathBuf {
    PathBuf::from("/var/cache/pkbridge/dist-upgrade")
}

fn default_redirect() -> PathBuf {
    PathBuf::from("/var/cache/pkbridge/active")
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            regular: default_regular(),
            dist_upgrade: default_dist_upgrade(),
            redirect: default_redirect(),
        }
    }
}

/// `[engine]`: where the package database and repositories live.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineSection {
    #[serde(default = "default_root")]
    pub root: PathBuf,
    #[serde(default = "default_repos_dir")]
    pub repos_dir: PathBuf,
    #[serde(default = "default_installed_db")]
    pub installed_db: PathBuf,
    #[serde(default = "default_keyring_dir")]
    pub keyring_dir: PathBuf,
    /// Shell command run once when the package database looks broken.
    #[serde(default)]
    pub recovery_command: Option<String>,
    #[serde(default = "default_rebuild_marker")]
    pub rebuild_marker: PathBuf,
}

fn default_root() -> PathBuf {
    PathBuf::from("/")
}

fn default_repos_dir() -> PathBuf {
    PathBuf::from("/etc/pkbridge/repos.d")
}

fn default_installed_db() -> PathBuf {
    PathBuf::from("/var/lib/pkbridge/installed.toml")
}

fn default_keyring_dir() -> PathBuf {
    PathBuf::from("/var/lib/pkbridge/keys")
}

fn default_rebuild_marker() -> PathBuf {
    PathBuf::from("/var/lib/pkbridge/scheduled-rebuilddb")
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            root: default_root(),
            repos_dir: default_repos_dir(),
            installed_db: default_installed_db(),
            keyring_dir: default_keyring_dir(),
            recovery_command: None,
            rebuild_marker: default_rebuild_marker(),
        }
    }
}

/// `[policy]`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicySection {
    /// Packages no transaction may remove.
    #[serde(default = "default_protected")]
    pub protected: Vec<String>,

    /// Offer only patches from `get-updates`, never plain package updates.
    #[serde(default)]
    pub hide_packages: bool,
}

fn default_protected() -> Vec<String> {
    ["glibc", "rpm", "pkbridge"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for PolicySection {
    fn default() -> Self {
        Self {
            protected: default_protected(),
            hide_packages: false,
        }
    }
}

/// Validated configuration. Only obtainable through `TryFrom<RawConfigFile>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigFile {
    cache: CacheSection,
    engine: EngineSection,
    policy: PolicySection,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        cache: CacheSection,
        engine: EngineSection,
        policy: PolicySection,
    ) -> Self {
        Self {
            cache,
            engine,
            policy,
        }
    }

    pub fn cache(&self) -> &CacheSection {
        &self.cache
    }

    pub fn engine(&self) -> &EngineSection {
        &self.engine
    }

    pub fn policy(&self) -> &PolicySection {
        &self.policy
    }

    pub fn cache_roots(&self) -> CacheRoots {
        CacheRoots {
            regular: self.cache.regular.clone(),
            dist_upgrade: self.cache.dist_upgrade.clone(),
            redirect: self.cache.redirect.clone(),
        }
    }

    /// The engine always reads its cache through the redirect.
    pub fn engine_settings(&self) -> LocalEngineSettings {
        LocalEngineSettings {
            repos_dir: self.engine.repos_dir.clone(),
            installed_db: self.engine.installed_db.clone(),
            keyring_dir: self.engine.keyring_dir.clone(),
            cache_dir: self.cache.redirect.clone(),
        }
    }

    pub fn job_settings(&self) -> JobSettings {
        JobSettings {
            engine_root: self.engine.root.clone(),
            rebuild_marker: self.engine.rebuild_marker.clone(),
            recovery_command: self.engine.recovery_command.clone(),
            protected: self.policy.protected.clone(),
            hide_packages: self.policy.hide_packages,
        }
    }
}
