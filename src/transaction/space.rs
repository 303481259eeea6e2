// src/transaction/space.rs

//! Byte and step accounting of a resolved plan, and the disk-space preflight.

use tracing::{debug, info};

use crate::engine::{ItemKind, Pool, Transact};
use crate::types::PerformType;

const MIB: f64 = 1024.0 * 1024.0;

/// What a resolved plan is going to do.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlanTotals {
    pub downloads: u32,
    pub installs: u32,
    pub removals: u32,
    /// Bytes still to fetch.
    pub download_bytes: u64,
    pub install_bytes: u64,
    pub remove_bytes: u64,
    /// Bytes of payloads already in the cache.
    pub cached_bytes: u64,
    pub biggest_download: u64,
}

impl PlanTotals {
    /// Walk the pending items of `pool`. Patterns are neither downloaded nor
    /// installed as such and are skipped.
    pub fn count(pool: &Pool, only_download: bool) -> Self {
        let mut totals = PlanTotals::default();

        for item in pool.iter().filter(|i| i.kind != ItemKind::Pattern) {
            if item.status.is_to_install() {
                if !only_download {
                    totals.installs += 1;
                    totals.install_bytes += item.install_size;
                }
                totals.downloads += 1;

                if item.kind == ItemKind::Package {
                    if item.cached {
                        totals.cached_bytes += item.download_size;
                    } else {
                        totals.download_bytes += item.download_size;
                        totals.biggest_download = totals.biggest_download.max(item.download_size);
                    }
                }
            } else if !only_download && item.status.is_to_uninstall() {
                if item.status != Transact::ToRemoveDueToUpgrade {
                    totals.removals += 1;
                }
                totals.remove_bytes += item.install_size;
            }
        }

        info!(
            downloads = totals.downloads,
            installs = totals.installs,
            removals = totals.removals,
            "before commit"
        );
        debug!(
            download = totals.download_bytes,
            install = totals.install_bytes,
            remove = totals.remove_bytes,
            cached = totals.cached_bytes,
            "byte sizes"
        );
        totals
    }

    /// Growth of the installed footprint.
    pub fn net_install_bytes(&self) -> u64 {
        self.install_bytes.saturating_sub(self.remove_bytes)
    }

    /// Space the install target needs.
    ///
    /// Worst case the biggest package is downloaded last and sits in the
    /// cache next to everything installed so far. A system upgrade downloads
    /// to its own cache root, so only the net growth counts there.
    pub fn required_install_bytes(&self, kind: PerformType) -> u64 {
        match kind {
            PerformType::UpgradeSystem => self.net_install_bytes(),
            _ => self.biggest_download + self.net_install_bytes(),
        }
    }
}

/// Outcome of the disk-space preflight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpaceCheck {
    pub required_download: u64,
    pub free_download: u64,
    pub required_install: u64,
    pub free_install: u64,
}

impl SpaceCheck {
    pub fn new(totals: &PlanTotals, kind: PerformType, free_download: u64, free_install: u64) -> Self {
        let check = Self {
            required_download: totals.download_bytes,
            free_download,
            required_install: totals.required_install_bytes(kind),
            free_install,
        };
        info!(
            required = check.required_download,
            available = check.free_download,
            "download space"
        );
        info!(
            required = check.required_install,
            available = check.free_install,
            "installation space"
        );
        check
    }

    pub fn download_fits(&self) -> bool {
        self.required_download <= self.free_download
    }

    pub fn install_fits(&self) -> bool {
        self.required_install <= self.free_install
    }

    pub fn download_message(&self) -> String {
        format!(
            "Not enough space for download. Need {:.2} MiB, have {:.2} MiB.",
            mib(self.required_download),
            mib(self.free_download)
        )
    }

    pub fn install_message(&self) -> String {
        format!(
            "Not enough space for installation. Need {:.2} MiB, have {:.2} MiB.",
            mib(self.required_install),
            mib(self.free_install)
        )
    }
}

pub fn mib(bytes: u64) -> f64 {
    bytes as f64 / MIB
}
