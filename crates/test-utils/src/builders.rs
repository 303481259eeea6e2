#![allow(dead_code)]

use pkbridge::config::{ConfigFile, RawConfigFile};
use pkbridge::engine::{
    ItemKind, KeyInfo, PackageId, PatchCategory, PatchInfo, PoolItem, RepoInfo, Transact,
};
use pkbridge::engine::pool::INSTALLED_REPO;

pub const ARCH: &str = "x86_64";
pub const REPO: &str = "oss";

/// Builder for `PoolItem`.
pub struct PoolItemBuilder {
    item: PoolItem,
}

impl PoolItemBuilder {
    pub fn new(kind: ItemKind, name: &str, version: &str) -> Self {
        Self {
            item: PoolItem {
                id: PackageId::new(name, version, ARCH, REPO),
                kind,
                summary: format!("{name} summary"),
                signed: true,
                ..PoolItem::default()
            },
        }
    }

    pub fn arch(mut self, arch: &str) -> Self {
        self.item.id.arch = arch.to_string();
        self
    }

    pub fn repo(mut self, alias: &str) -> Self {
        self.item.id.data = alias.to_string();
        self
    }

    /// Comes from the installed database.
    pub fn installed(mut self) -> Self {
        self.item.installed = true;
        self.item.id.data = INSTALLED_REPO.to_string();
        self
    }

    pub fn summary(mut self, summary: &str) -> Self {
        self.item.summary = summary.to_string();
        self
    }

    pub fn description(mut self, description: &str) -> Self {
        self.item.description = description.to_string();
        self
    }

    pub fn sizes(mut self, download: u64, install: u64) -> Self {
        self.item.download_size = download;
        self.item.install_size = install;
        self
    }

    pub fn cached(mut self) -> Self {
        self.item.cached = true;
        self
    }

    /// License agreement that must be accepted before installing.
    pub fn eula(mut self, vendor: &str, text: &str) -> Self {
        self.item.vendor = vendor.to_string();
        self.item.license_to_confirm = Some(text.to_string());
        self
    }

    pub fn details(mut self, license: &str, group: &str, url: &str) -> Self {
        self.item.license = license.to_string();
        self.item.group = group.to_string();
        self.item.url = url.to_string();
        self
    }

    pub fn obsoletes(mut self, capability: &str) -> Self {
        self.item.obsoletes.push(capability.to_string());
        self
    }

    /// Bug tracker and advisory links of a patch.
    pub fn references(mut self, bugzilla: &[&str], cve: &[&str]) -> Self {
        let patch = self.item.patch.get_or_insert_with(PatchInfo::default);
        patch.bugzilla = bugzilla.iter().map(|s| s.to_string()).collect();
        patch.cve = cve.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn provides(mut self, capability: &str) -> Self {
        self.item.provides.push(capability.to_string());
        self
    }

    pub fn requires(mut self, capability: &str) -> Self {
        self.item.requires.push(capability.to_string());
        self
    }

    pub fn file(mut self, path: &str) -> Self {
        self.item.files.push(path.to_string());
        self
    }

    pub fn status(mut self, status: Transact) -> Self {
        self.item.status = status;
        self
    }

    /// Shipped editions, each written `name-version.arch`.
    pub fn patch_contents(mut self, editions: &[&str]) -> Self {
        let patch = self.item.patch.get_or_insert_with(PatchInfo::default);
        patch.contents = editions
            .iter()
            .map(|e| e.parse().unwrap_or_else(|err| panic!("{err}")))
            .collect();
        self
    }

    /// Patch touching the package manager itself.
    pub fn restart_suggested(mut self) -> Self {
        self.item
            .patch
            .get_or_insert_with(PatchInfo::default)
            .restart_suggested = true;
        self
    }

    pub fn reboot_suggested(mut self) -> Self {
        self.item
            .patch
            .get_or_insert_with(PatchInfo::default)
            .reboot_suggested = true;
        self
    }

    pub fn build(self) -> PoolItem {
        self.item
    }
}

pub fn package(name: &str, version: &str) -> PoolItemBuilder {
    PoolItemBuilder::new(ItemKind::Package, name, version)
}

pub fn patch(name: &str, version: &str, category: PatchCategory) -> PoolItemBuilder {
    let mut builder = PoolItemBuilder::new(ItemKind::Patch, name, version).arch("noarch");
    builder.item.patch = Some(PatchInfo {
        category,
        ..PatchInfo::default()
    });
    builder
}

pub fn pattern(name: &str, version: &str) -> PoolItemBuilder {
    PoolItemBuilder::new(ItemKind::Pattern, name, version).arch("noarch")
}

/// Enabled, autorefreshed repository.
pub fn repo(alias: &str) -> RepoInfo {
    RepoInfo {
        alias: alias.to_string(),
        name: format!("{alias} repository"),
        enabled: true,
        autorefresh: true,
        baseurl: format!("https://download.example.org/{alias}"),
        gpgcheck: true,
        key_id: None,
        key_name: None,
        key_fingerprint: None,
        priority: 99,
        keep_packages: false,
    }
}

pub fn key(id: &str) -> KeyInfo {
    KeyInfo {
        id: id.to_string(),
        name: format!("{id} signing key"),
        fingerprint: format!("{id}-fingerprint"),
    }
}

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile::default(),
        }
    }

    pub fn with_cache_under(mut self, dir: &str) -> Self {
        self.config.cache.regular = format!("{dir}/regular").into();
        self.config.cache.dist_upgrade = format!("{dir}/dist-upgrade").into();
        self.config.cache.redirect = format!("{dir}/active").into();
        self
    }

    pub fn with_protected(mut self, names: &[&str]) -> Self {
        self.config.policy.protected = names.iter().map(|n| n.to_string()).collect();
        self
    }

    pub fn with_recovery_command(mut self, cmd: &str) -> Self {
        self.config.engine.recovery_command = Some(cmd.to_string());
        self
    }

    pub fn hide_packages(mut self) -> Self {
        self.config.policy.hide_packages = true;
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}
