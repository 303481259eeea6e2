// src/engine/local/record.rs

//! TOML records shared by repository metadata, the solv cache and the
//! installed database.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::engine::pool::{ItemKind, PackageId, PatchCategory, PatchInfo, PoolItem, INSTALLED_REPO};

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ItemRecord {
    pub name: String,
    pub version: String,
    pub arch: String,
    pub kind: ItemKind,
    pub summary: String,
    pub description: String,
    pub vendor: String,
    pub license: String,
    pub group: String,
    pub url: String,
    /// License agreement shown before installing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eula: Option<String>,
    pub download_size: u64,
    pub install_size: u64,
    pub requires: Vec<String>,
    pub provides: Vec<String>,
    pub conflicts: Vec<String>,
    pub obsoletes: Vec<String>,
    pub files: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    pub signed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patch: Option<PatchRecord>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct PatchRecord {
    pub category: PatchCategory,
    pub restart_suggested: bool,
    pub relogin_suggested: bool,
    pub reboot_suggested: bool,
    /// `name-version.arch` of every shipped package.
    pub contents: Vec<String>,
    pub bugzilla: Vec<String>,
    pub cve: Vec<String>,
}

/// A whole metadata / cache / database file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct RecordFile {
    /// Digest of the raw metadata a solv file was built from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cookie: Option<String>,

    #[serde(default, rename = "package")]
    pub items: Vec<ItemRecord>,
}

impl ItemRecord {
    pub fn into_item(self, data: &str, installed: bool) -> PoolItem {
        let arch = if self.arch.is_empty() {
            "noarch".to_string()
        } else {
            self.arch
        };
        let data = if installed { INSTALLED_REPO } else { data };

        PoolItem {
            id: PackageId::new(self.name, self.version, arch, data),
            kind: self.kind,
            summary: self.summary,
            description: self.description,
            vendor: self.vendor,
            license: self.license,
            group: self.group,
            url: self.url,
            license_to_confirm: self.eula.filter(|l| !l.is_empty()),
            installed,
            download_size: self.download_size,
            install_size: self.install_size,
            requires: self.requires,
            provides: self.provides,
            conflicts: self.conflicts,
            obsoletes: self.obsoletes,
            files: self.files,
            patch: self.patch.map(|p| PatchInfo {
                category: p.category,
                restart_suggested: p.restart_suggested,
                relogin_suggested: p.relogin_suggested,
                reboot_suggested: p.reboot_suggested,
                contents: p
                    .contents
                    .iter()
                    .filter_map(|entry| match entry.parse() {
                        Ok(content) => Some(content),
                        Err(e) => {
                            warn!("skipping patch content: {e}");
                            None
                        }
                    })
                    .collect(),
                bugzilla: p.bugzilla,
                cve: p.cve,
            }),
            location: self.location,
            checksum: self.checksum,
            signed: self.signed,
            ..PoolItem::default()
        }
    }

    pub fn from_item(item: &PoolItem) -> Self {
        Self {
            name: item.id.name.clone(),
            version: item.id.version.clone(),
            arch: item.id.arch.clone(),
            kind: item.kind,
            summary: item.summary.clone(),
            description: item.description.clone(),
            vendor: item.vendor.clone(),
            license: item.license.clone(),
            group: item.group.clone(),
            url: item.url.clone(),
            eula: None,
            download_size: item.download_size,
            install_size: item.install_size,
            requires: item.requires.clone(),
            provides: item.provides.clone(),
            conflicts: item.conflicts.clone(),
            obsoletes: item.obsoletes.clone(),
            files: item.files.clone(),
            location: None,
            checksum: None,
            signed: item.signed,
            patch: item.patch.as_ref().map(|p| PatchRecord {
                category: p.category,
                restart_suggested: p.restart_suggested,
                relogin_suggested: p.relogin_suggested,
                reboot_suggested: p.reboot_suggested,
                contents: p.contents.iter().map(ToString::to_string).collect(),
                bugzilla: p.bugzilla.clone(),
                cve: p.cve.clone(),
            }),
        }
    }
}
