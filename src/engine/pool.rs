// src/engine/pool.rs

//! In-memory pool of candidate items and their transactional state.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::types::RestartKind;

/// Repository alias reported for items that come from the installed database.
pub const INSTALLED_REPO: &str = "installed";

/// Front-end visible identity of an item: `name;version;arch;data`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct PackageId {
    pub name: String,
    pub version: String,
    pub arch: String,
    /// Origin repository alias, or `installed`.
    pub data: String,
}

impl PackageId {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        arch: impl Into<String>,
        data: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            arch: arch.into(),
            data: data.into(),
        }
    }

    /// Same name, version and arch; origin ignored.
    pub fn same_edition(&self, other: &PackageId) -> bool {
        self.name == other.name && self.version == other.version && self.arch == other.arch
    }

    /// Short form used in transaction step lists.
    pub fn ident(&self) -> String {
        format!("{}-{}.{}", self.name, self.version, self.arch)
    }
}

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{};{};{};{}", self.name, self.version, self.arch, self.data)
    }
}

impl FromStr for PackageId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(';').collect();
        match parts.as_slice() {
            [name, version, arch, data] if !name.is_empty() => {
                Ok(PackageId::new(*name, *version, *arch, *data))
            }
            _ => Err(format!(
                "invalid package id '{s}' (expected name;version;arch;data)"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    #[default]
    Package,
    Patch,
    Pattern,
}

/// Transactional status of a pool item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Transact {
    #[default]
    Untouched,
    ToInstall,
    ToRemove,
    /// Replaced by a newer edition being installed.
    ToRemoveDueToUpgrade,
    /// Replaced by an item that obsoletes it.
    ToRemoveDueToObsolete,
}

impl Transact {
    pub const fn is_to_install(self) -> bool {
        matches!(self, Transact::ToInstall)
    }

    pub const fn is_to_uninstall(self) -> bool {
        matches!(
            self,
            Transact::ToRemove | Transact::ToRemoveDueToUpgrade | Transact::ToRemoveDueToObsolete
        )
    }

    pub const fn is_pending(self) -> bool {
        !matches!(self, Transact::Untouched)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchCategory {
    Security,
    Recommended,
    Optional,
    Distupgrade,
    #[default]
    Other,
}

/// Patch specific metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatchInfo {
    pub category: PatchCategory,
    /// Updates the package management stack itself.
    pub restart_suggested: bool,
    pub relogin_suggested: bool,
    pub reboot_suggested: bool,
    /// Exact package editions the patch brings in.
    pub contents: Vec<PatchContent>,
    /// Bug tracker links.
    pub bugzilla: Vec<String>,
    /// Advisory links.
    pub cve: Vec<String>,
}

/// One package edition shipped by a patch, written `name-version.arch`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PatchContent {
    pub name: String,
    pub version: String,
    pub arch: String,
}

impl PatchContent {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        arch: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            arch: arch.into(),
        }
    }

    /// `id` is exactly this edition, whatever repository it comes from.
    pub fn is(&self, id: &PackageId) -> bool {
        self.name == id.name && self.version == id.version && self.arch == id.arch
    }
}

impl fmt::Display for PatchContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}.{}", self.name, self.version, self.arch)
    }
}

impl FromStr for PatchContent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parsed = s
            .rsplit_once('.')
            .and_then(|(rest, arch)| rest.rsplit_once('-').map(|(name, version)| (name, version, arch)));
        match parsed {
            Some((name, version, arch))
                if !name.is_empty() && !version.is_empty() && !arch.is_empty() =>
            {
                Ok(PatchContent::new(name, version, arch))
            }
            _ => Err(format!(
                "invalid patch content '{s}' (expected name-version.arch)"
            )),
        }
    }
}

impl PatchInfo {
    /// Strongest restart this patch asks for.
    pub fn restart(&self) -> RestartKind {
        if self.reboot_suggested {
            RestartKind::System
        } else if self.relogin_suggested {
            RestartKind::Session
        } else if self.restart_suggested {
            RestartKind::Application
        } else {
            RestartKind::None
        }
    }
}

/// One candidate unit of change.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PoolItem {
    pub id: PackageId,
    pub kind: ItemKind,
    pub summary: String,
    pub description: String,
    pub vendor: String,
    /// License name, e.g. `GPL-2.0-only`.
    pub license: String,
    pub group: String,
    pub url: String,
    /// License text the user must accept before installing.
    pub license_to_confirm: Option<String>,
    pub installed: bool,
    pub status: Transact,
    pub download_size: u64,
    pub install_size: u64,
    /// Payload already present in the package cache.
    pub cached: bool,
    pub requires: Vec<String>,
    pub provides: Vec<String>,
    pub conflicts: Vec<String>,
    pub obsoletes: Vec<String>,
    pub files: Vec<String>,
    pub patch: Option<PatchInfo>,
    /// Payload location relative to the repository base URL.
    pub location: Option<String>,
    pub checksum: Option<String>,
    pub signed: bool,
}

impl Default for PackageId {
    fn default() -> Self {
        PackageId::new("", "", "noarch", INSTALLED_REPO)
    }
}

impl PoolItem {
    pub fn name(&self) -> &str {
        &self.id.name
    }

    pub fn repo(&self) -> &str {
        &self.id.data
    }

    pub fn provides_name(&self, capability: &str) -> bool {
        self.id.name == capability || self.provides.iter().any(|p| p == capability)
    }

    pub fn reset_status(&mut self) {
        self.status = Transact::Untouched;
    }
}

/// All items known to the engine plus an optional saved status snapshot.
#[derive(Debug, Clone, Default)]
pub struct Pool {
    items: Vec<PoolItem>,
    saved: Option<Vec<(PackageId, Transact)>>,
}

impl Pool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn add(&mut self, item: PoolItem) {
        self.items.push(item);
    }

    pub fn extend(&mut self, items: impl IntoIterator<Item = PoolItem>) {
        self.items.extend(items);
    }

    pub fn iter(&self) -> impl Iterator<Item = &PoolItem> + Clone {
        self.items.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut PoolItem> {
        self.items.iter_mut()
    }

    pub fn get(&self, index: usize) -> Option<&PoolItem> {
        self.items.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut PoolItem> {
        self.items.get_mut(index)
    }

    pub fn position(&self, id: &PackageId) -> Option<usize> {
        self.items.iter().position(|item| &item.id == id)
    }

    pub fn find(&self, id: &PackageId) -> Option<&PoolItem> {
        self.items.iter().find(|item| &item.id == id)
    }

    pub fn find_mut(&mut self, id: &PackageId) -> Option<&mut PoolItem> {
        self.items.iter_mut().find(|item| &item.id == id)
    }

    /// Aliases of all repositories currently loaded, excluding `installed`.
    pub fn repo_aliases(&self) -> BTreeSet<String> {
        self.items
            .iter()
            .filter(|item| !item.installed)
            .map(|item| item.id.data.clone())
            .collect()
    }

    /// Drop every available item that came from `alias`.
    pub fn erase_repo(&mut self, alias: &str) -> usize {
        let before = self.items.len();
        self.items
            .retain(|item| item.installed || item.id.data != alias);
        before - self.items.len()
    }

    pub fn erase_installed(&mut self) {
        self.items.retain(|item| !item.installed);
    }

    pub fn pending(&self) -> impl Iterator<Item = &PoolItem> {
        self.items.iter().filter(|item| item.status.is_pending())
    }

    pub fn has_pending(&self) -> bool {
        self.pending().next().is_some()
    }

    /// Reset every item marked for installation.
    pub fn reset_pending_installs(&mut self) {
        for item in self.items.iter_mut().filter(|i| i.status.is_to_install()) {
            item.reset_status();
        }
    }

    pub fn reset_all(&mut self) {
        for item in self.items.iter_mut() {
            item.reset_status();
        }
    }

    /// The installed edition of `name` for a compatible arch.
    pub fn installed_named(&self, name: &str, arch: &str) -> Option<&PoolItem> {
        self.items
            .iter()
            .filter(|item| item.installed && item.id.name == name)
            .find(|item| arch_compatible(&item.id.arch, arch))
    }

    /// Newest available edition of `name` for a compatible arch.
    pub fn best_available(&self, name: &str, arch: &str) -> Option<&PoolItem> {
        self.items
            .iter()
            .filter(|item| !item.installed && item.id.name == name)
            .filter(|item| arch_compatible(&item.id.arch, arch))
            .max_by(|a, b| compare_versions(&a.id.version, &b.id.version))
    }

    /// Remember every item's status so it can be put back later.
    pub fn save_state(&mut self) {
        self.saved = Some(
            self.items
                .iter()
                .map(|item| (item.id.clone(), item.status))
                .collect(),
        );
    }

    pub fn restore_state(&mut self) {
        let Some(saved) = self.saved.take() else {
            return;
        };
        for item in self.items.iter_mut() {
            item.status = saved
                .iter()
                .find(|(id, _)| id == &item.id)
                .map(|(_, status)| *status)
                .unwrap_or_default();
        }
    }
}

/// `noarch` items install anywhere; everything else must match exactly.
pub fn arch_compatible(a: &str, b: &str) -> bool {
    a == b || a == "noarch" || b == "noarch"
}

/// Compare two version strings segment by segment.
///
/// Segments are maximal runs of digits or letters; everything else separates
/// them. Numeric segments compare numerically and sort above alphabetic ones.
/// When all shared segments are equal, the version with more segments wins.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let left = version_segments(a);
    let right = version_segments(b);

    for (l, r) in left.iter().zip(right.iter()) {
        let ord = match (l, r) {
            (Segment::Num(x), Segment::Num(y)) => {
                let x = x.trim_start_matches('0');
                let y = y.trim_start_matches('0');
                x.len().cmp(&y.len()).then_with(|| x.cmp(y))
            }
            (Segment::Alpha(x), Segment::Alpha(y)) => x.cmp(y),
            (Segment::Num(_), Segment::Alpha(_)) => Ordering::Greater,
            (Segment::Alpha(_), Segment::Num(_)) => Ordering::Less,
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }

    left.len().cmp(&right.len())
}

#[derive(Debug)]
enum Segment<'a> {
    Num(&'a str),
    Alpha(&'a str),
}

fn version_segments(v: &str) -> Vec<Segment<'_>> {
    let bytes = v.as_bytes();
    let mut segments = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        if !bytes[i].is_ascii_alphanumeric() {
            i += 1;
            continue;
        }
        let start = i;
        let numeric = bytes[i].is_ascii_digit();
        while i < bytes.len()
            && bytes[i].is_ascii_alphanumeric()
            && bytes[i].is_ascii_digit() == numeric
        {
            i += 1;
        }
        let part = &v[start..i];
        segments.push(if numeric {
            Segment::Num(part)
        } else {
            Segment::Alpha(part)
        });
    }

    segments
}
