// src/types.rs

//! Enumerations shared between the front-end surface, the executor and the
//! engine collaborator.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Kind of change a Transaction Executor run performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PerformType {
    Install,
    Remove,
    Update,
    UpgradeSystem,
}

/// Transaction flag bitset as sent by the front-end.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TransactionFlags(u16);

impl TransactionFlags {
    pub const NONE: Self = Self(0);
    pub const ONLY_TRUSTED: Self = Self(1 << 0);
    pub const SIMULATE: Self = Self(1 << 1);
    pub const ONLY_DOWNLOAD: Self = Self(1 << 2);
    pub const ALLOW_REINSTALL: Self = Self(1 << 3);
    pub const JUST_REINSTALL: Self = Self(1 << 4);
    pub const ALLOW_DOWNGRADE: Self = Self(1 << 5);
    /// Simulate only to report the prospective change sizes.
    pub const EXT_DOWNLOAD_SIZE: Self = Self(1 << 6);

    pub const fn bits(self) -> u16 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub const fn with(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn is_simulate(self) -> bool {
        self.contains(Self::SIMULATE)
    }

    pub const fn is_only_download(self) -> bool {
        self.contains(Self::ONLY_DOWNLOAD)
    }

    /// Simulate + extended-size request: report sizes, change nothing.
    pub const fn is_size_query(self) -> bool {
        self.contains(Self::SIMULATE) && self.contains(Self::EXT_DOWNLOAD_SIZE)
    }
}

impl std::ops::BitOr for TransactionFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.with(rhs)
    }
}

impl fmt::Display for TransactionFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(TransactionFlags, &str); 7] = [
            (TransactionFlags::ONLY_TRUSTED, "only-trusted"),
            (TransactionFlags::SIMULATE, "simulate"),
            (TransactionFlags::ONLY_DOWNLOAD, "only-download"),
            (TransactionFlags::ALLOW_REINSTALL, "allow-reinstall"),
            (TransactionFlags::JUST_REINSTALL, "just-reinstall"),
            (TransactionFlags::ALLOW_DOWNGRADE, "allow-downgrade"),
            (TransactionFlags::EXT_DOWNLOAD_SIZE, "ext-download-size"),
        ];

        let names: Vec<&str> = NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();

        if names.is_empty() {
            write!(f, "none")
        } else {
            write!(f, "{}", names.join(","))
        }
    }
}

/// Job status reported to the front-end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Status {
    Unknown,
    /// Changing the repository setup.
    Setup,
    Query,
    DepResolve,
    Download,
    Install,
    Remove,
    Update,
    RefreshCache,
    SigCheck,
}

/// Per-package state in a package notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum InfoKind {
    Installed,
    Available,
    Downloading,
    Installing,
    Removing,
    Updating,
    Obsoleting,
    Finished,
    Low,
    Normal,
    Bugfix,
    Enhancement,
    Security,
}

/// Restart requirement attached to an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RestartKind {
    None,
    Application,
    Session,
    System,
}

/// Percentage as seen by the front-end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Percentage {
    Value(u8),
    /// Re-arms front-ends that drop updates moving backwards.
    Invalid,
}

impl fmt::Display for Percentage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Percentage::Value(v) => write!(f, "{v}%"),
            Percentage::Invalid => write!(f, "?"),
        }
    }
}

/// Typed error code of a failed Job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCode {
    RepoConfiguration,
    RepoNotFound,
    RepoNotAvailable,
    NoSpaceOnDevice,
    FailedInitialization,
    DepResolutionFailed,
    NoLicenseAgreement,
    TransactionError,
    TransactionCancelled,
    GpgFailure,
    InternalError,
    PackageNotFound,
    PackageAlreadyInstalled,
    AllPackagesAlreadyInstalled,
    NotAuthorized,
    CannotRemoveSystemPackage,
    PackageFailedToInstall,
    PackageDownloadFailed,
    NoDistroUpgradeData,
    NotSupported,
}

impl ErrorCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            ErrorCode::RepoConfiguration => "repo-configuration",
            ErrorCode::RepoNotFound => "repo-not-found",
            ErrorCode::RepoNotAvailable => "repo-not-available",
            ErrorCode::NoSpaceOnDevice => "no-space-on-device",
            ErrorCode::FailedInitialization => "failed-initialization",
            ErrorCode::DepResolutionFailed => "dep-resolution-failed",
            ErrorCode::NoLicenseAgreement => "no-license-agreement",
            ErrorCode::TransactionError => "transaction-error",
            ErrorCode::TransactionCancelled => "transaction-cancelled",
            ErrorCode::GpgFailure => "gpg-failure",
            ErrorCode::InternalError => "internal-error",
            ErrorCode::PackageNotFound => "package-not-found",
            ErrorCode::PackageAlreadyInstalled => "package-already-installed",
            ErrorCode::AllPackagesAlreadyInstalled => "all-packages-already-installed",
            ErrorCode::NotAuthorized => "not-authorized",
            ErrorCode::CannotRemoveSystemPackage => "cannot-remove-system-package",
            ErrorCode::PackageFailedToInstall => "package-failed-to-install",
            ErrorCode::PackageDownloadFailed => "package-download-failed",
            ErrorCode::NoDistroUpgradeData => "no-distro-upgrade-data",
            ErrorCode::NotSupported => "not-supported",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What `upgrade-system` should do with the computed upgrades.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpgradeKind {
    /// Only download upgrades.
    Minimal,
    /// Download and install upgrades.
    #[default]
    Default,
    /// Download and install upgrades plus the distro pattern.
    Complete,
}

impl FromStr for UpgradeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "minimal" => Ok(UpgradeKind::Minimal),
            "default" => Ok(UpgradeKind::Default),
            "complete" => Ok(UpgradeKind::Complete),
            other => Err(format!(
                "invalid upgrade kind: {other} (expected \"minimal\", \"default\" or \"complete\")"
            )),
        }
    }
}

/// Which field a search matches against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchKind {
    Name,
    Details,
    File,
}

/// Installed-state filter applied to query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Filter {
    #[default]
    None,
    Installed,
    NotInstalled,
}

impl Filter {
    pub const fn accepts(self, installed: bool) -> bool {
        match self {
            Filter::None => true,
            Filter::Installed => installed,
            Filter::NotInstalled => !installed,
        }
    }
}
