// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::engine::PackageId;
use crate::ops::Request;
use crate::types::{Filter, SearchKind, TransactionFlags, UpgradeKind};

/// Command-line arguments for `pkbridge`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "pkbridge",
    version,
    about = "Drive package transactions and report their progress.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    #[arg(long, value_name = "PATH", default_value = "Pkbridge.toml")]
    pub config: PathBuf,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `PKBRIDGE_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Print job events as JSON lines instead of text.
    #[arg(long)]
    pub json: bool,

    /// Trust this repository signing key (repeatable).
    #[arg(long = "trust", value_name = "KEY_ID")]
    pub trust: Vec<String>,

    /// Accept this license agreement (repeatable).
    #[arg(long = "accept-eula", value_name = "ID")]
    pub accept_eula: Vec<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Refresh repository metadata and caches.
    Refresh {
        /// Also refresh repositories without autorefresh.
        #[arg(long)]
        force: bool,
    },
    /// Install packages.
    Install {
        #[arg(required = true, value_name = "PACKAGE_ID")]
        ids: Vec<PackageId>,
        #[command(flatten)]
        flags: TransactionArgs,
    },
    /// Remove installed packages.
    Remove {
        #[arg(required = true, value_name = "PACKAGE_ID")]
        ids: Vec<PackageId>,
        /// Also remove packages that depend on them.
        #[arg(long)]
        allow_deps: bool,
        /// Also remove dependencies nothing else needs.
        #[arg(long)]
        autoremove: bool,
        #[command(flatten)]
        flags: TransactionArgs,
    },
    /// Update installed packages or apply patches.
    Update {
        #[arg(required = true, value_name = "PACKAGE_ID")]
        ids: Vec<PackageId>,
        #[command(flatten)]
        flags: TransactionArgs,
    },
    /// Upgrade the whole distribution.
    UpgradeSystem {
        #[arg(long, default_value = "default", value_name = "KIND")]
        kind: UpgradeKind,
        /// Distribution id; names the pattern a complete upgrade installs.
        #[arg(long, default_value = "", value_name = "ID")]
        distro_id: String,
        #[command(flatten)]
        flags: TransactionArgs,
    },
    /// List available updates.
    GetUpdates {
        #[arg(long, value_enum, default_value = "all")]
        filter: FilterArg,
    },
    /// Search packages.
    Search {
        #[arg(value_enum)]
        by: SearchBy,
        #[arg(required = true, value_name = "TERM")]
        terms: Vec<String>,
        #[arg(long, value_enum, default_value = "all")]
        filter: FilterArg,
    },
    /// Download packages into the package cache.
    Download {
        #[arg(required = true, value_name = "PACKAGE_ID")]
        ids: Vec<PackageId>,
    },
    /// Show metadata of local package files.
    DetailsLocal {
        #[arg(required = true, value_name = "FILE")]
        paths: Vec<PathBuf>,
    },
    /// Find packages, patches and patterns by exact name.
    Resolve {
        #[arg(required = true, value_name = "NAME")]
        names: Vec<String>,
        #[arg(long, value_enum, default_value = "all")]
        filter: FilterArg,
        /// Only the installed and the newest edition of each name.
        #[arg(long)]
        newest: bool,
    },
    /// Show package details.
    GetDetails {
        #[arg(required = true, value_name = "PACKAGE_ID")]
        ids: Vec<PackageId>,
    },
    /// List the files of installed packages.
    GetFiles {
        #[arg(required = true, value_name = "PACKAGE_ID")]
        ids: Vec<PackageId>,
    },
    /// List what packages need.
    DependsOn {
        #[arg(required = true, value_name = "PACKAGE_ID")]
        ids: Vec<PackageId>,
        #[arg(long, value_enum, default_value = "all")]
        filter: FilterArg,
    },
    /// List installed packages that need the given ones.
    RequiredBy {
        #[arg(required = true, value_name = "PACKAGE_ID")]
        ids: Vec<PackageId>,
        #[arg(long, value_enum, default_value = "all")]
        filter: FilterArg,
    },
    /// Find packages providing a capability.
    WhatProvides {
        #[arg(required = true, value_name = "CAPABILITY")]
        terms: Vec<String>,
        #[arg(long, value_enum, default_value = "all")]
        filter: FilterArg,
    },
    /// List all packages and patterns.
    GetPackages {
        #[arg(long, value_enum, default_value = "all")]
        filter: FilterArg,
    },
    /// Show what updates replace and which advisories they fix.
    GetUpdateDetail {
        #[arg(required = true, value_name = "PACKAGE_ID")]
        ids: Vec<PackageId>,
    },
    /// List configured repositories.
    RepoList {
        /// Leave out debug, source and development repositories.
        #[arg(long)]
        hide_development: bool,
    },
    /// Enable a repository.
    RepoEnable {
        alias: String,
        /// Disable it instead.
        #[arg(long)]
        disable: bool,
    },
    /// Change a repository property, or add or remove a repository.
    ///
    /// PARAMETER is one of add, remove, refresh, keep, url, name,
    /// refresh-now and prio.
    RepoSetData {
        alias: String,
        parameter: String,
        value: String,
    },
}

/// Transaction flags shared by the changing subcommands.
#[derive(Debug, Clone, Copy, Default, Args)]
pub struct TransactionArgs {
    /// Report what would change without changing anything.
    #[arg(long)]
    pub simulate: bool,
    /// Download only, do not install.
    #[arg(long)]
    pub only_download: bool,
    /// Refuse unsigned packages.
    #[arg(long)]
    pub only_trusted: bool,
    #[arg(long)]
    pub allow_downgrade: bool,
    #[arg(long)]
    pub allow_reinstall: bool,
    /// Refuse anything but reinstalling the installed edition.
    #[arg(long)]
    pub just_reinstall: bool,
    /// With --simulate, report download/install/remove sizes only.
    #[arg(long)]
    pub query_sizes: bool,
}

impl TransactionArgs {
    pub fn flags(&self) -> TransactionFlags {
        let mut flags = TransactionFlags::NONE;
        for (set, flag) in [
            (self.simulate, TransactionFlags::SIMULATE),
            (self.only_download, TransactionFlags::ONLY_DOWNLOAD),
            (self.only_trusted, TransactionFlags::ONLY_TRUSTED),
            (self.allow_downgrade, TransactionFlags::ALLOW_DOWNGRADE),
            (self.allow_reinstall, TransactionFlags::ALLOW_REINSTALL),
            (self.just_reinstall, TransactionFlags::JUST_REINSTALL),
            (self.query_sizes, TransactionFlags::EXT_DOWNLOAD_SIZE),
        ] {
            if set {
                flags.insert(flag);
            }
        }
        flags
    }
}

#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum SearchBy {
    Name,
    Details,
    File,
}

impl From<SearchBy> for SearchKind {
    fn from(by: SearchBy) -> Self {
        match by {
            SearchBy::Name => SearchKind::Name,
            SearchBy::Details => SearchKind::Details,
            SearchBy::File => SearchKind::File,
        }
    }
}

#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum FilterArg {
    All,
    Installed,
    Available,
}

impl From<FilterArg> for Filter {
    fn from(arg: FilterArg) -> Self {
        match arg {
            FilterArg::All => Filter::None,
            FilterArg::Installed => Filter::Installed,
            FilterArg::Available => Filter::NotInstalled,
        }
    }
}

impl Command {
    /// The request this subcommand stands for.
    pub fn to_request(&self) -> Request {
        match self {
            Command::Refresh { force } => Request::Refresh { force: *force },
            Command::Install { ids, flags } => Request::Install {
                package_ids: ids.clone(),
                flags: flags.flags(),
            },
            Command::Remove {
                ids,
                allow_deps,
                autoremove,
                flags,
            } => Request::Remove {
                package_ids: ids.clone(),
                flags: flags.flags(),
                allow_deps: *allow_deps,
                autoremove: *autoremove,
            },
            Command::Update { ids, flags } => Request::Update {
                package_ids: ids.clone(),
                flags: flags.flags(),
            },
            Command::UpgradeSystem {
                kind,
                distro_id,
                flags,
            } => Request::UpgradeSystem {
                distro_id: distro_id.clone(),
                kind: *kind,
                flags: flags.flags(),
            },
            Command::GetUpdates { filter } => Request::GetUpdates {
                filter: (*filter).into(),
            },
            Command::Search { by, terms, filter } => Request::Search {
                kind: (*by).into(),
                terms: terms.clone(),
                filter: (*filter).into(),
            },
            Command::Download { ids } => Request::Download {
                package_ids: ids.clone(),
            },
            Command::DetailsLocal { paths } => Request::DetailsLocal {
                paths: paths.clone(),
            },
            Command::Resolve {
                names,
                filter,
                newest,
            } => Request::Resolve {
                names: names.clone(),
                filter: (*filter).into(),
                newest: *newest,
            },
            Command::GetDetails { ids } => Request::GetDetails {
                package_ids: ids.clone(),
            },
            Command::GetFiles { ids } => Request::GetFiles {
                package_ids: ids.clone(),
            },
            Command::DependsOn { ids, filter } => Request::DependsOn {
                package_ids: ids.clone(),
                filter: (*filter).into(),
            },
            Command::RequiredBy { ids, filter } => Request::RequiredBy {
                package_ids: ids.clone(),
                filter: (*filter).into(),
            },
            Command::WhatProvides { terms, filter } => Request::WhatProvides {
                terms: terms.clone(),
                filter: (*filter).into(),
            },
            Command::GetPackages { filter } => Request::GetPackages {
                filter: (*filter).into(),
            },
            Command::GetUpdateDetail { ids } => Request::GetUpdateDetail {
                package_ids: ids.clone(),
            },
            Command::RepoList { hide_development } => Request::GetRepoList {
                hide_development: *hide_development,
            },
            Command::RepoEnable { alias, disable } => Request::RepoEnable {
                alias: alias.clone(),
                enabled: !*disable,
            },
            Command::RepoSetData {
                alias,
                parameter,
                value,
            } => Request::RepoSetData {
                alias: alias.clone(),
                parameter: parameter.clone(),
                value: value.clone(),
            },
        }
    }
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
