// src/cache_root.rs

//! Cache-Root Switch.
//!
//! Two package-cache directories exist on disk; exactly one is active. The
//! engine only ever sees the `redirect` path, a symlink pointing at the
//! active root, so switching is one atomic symlink replacement. Whenever the
//! redirect moves, everything the engine loaded from the previous root is
//! stale and [`reset_pool`] must run.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::engine::{Engine, EngineResult};
use crate::errors::{JobError, JobResult};
use crate::fs::FileSystem;
use crate::types::ErrorCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheRoot {
    Regular,
    /// Isolated root used while computing or running a distribution upgrade.
    DistUpgrade,
}

impl CacheRoot {
    pub fn for_dist_upgrade(dist_upgrade: bool) -> Self {
        if dist_upgrade {
            CacheRoot::DistUpgrade
        } else {
            CacheRoot::Regular
        }
    }

    pub fn other(self) -> Self {
        match self {
            CacheRoot::Regular => CacheRoot::DistUpgrade,
            CacheRoot::DistUpgrade => CacheRoot::Regular,
        }
    }
}

impl fmt::Display for CacheRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheRoot::Regular => write!(f, "regular"),
            CacheRoot::DistUpgrade => write!(f, "dist-upgrade"),
        }
    }
}

/// On-disk locations of both roots and of the redirect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheRoots {
    pub regular: PathBuf,
    pub dist_upgrade: PathBuf,
    pub redirect: PathBuf,
}

impl CacheRoots {
    pub fn path(&self, root: CacheRoot) -> &Path {
        match root {
            CacheRoot::Regular => &self.regular,
            CacheRoot::DistUpgrade => &self.dist_upgrade,
        }
    }

    pub fn root_at(&self, path: &Path) -> Option<CacheRoot> {
        if path == self.regular {
            Some(CacheRoot::Regular)
        } else if path == self.dist_upgrade {
            Some(CacheRoot::DistUpgrade)
        } else {
            None
        }
    }
}

/// What [`CacheRootSwitch::select_root`] had to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootSwitch {
    /// The redirect already pointed at the requested root.
    Unchanged,
    /// There was no redirect yet; it now points at the requested root.
    Created,
    /// The redirect moved and the pool was reset.
    Switched,
}

#[derive(Debug, Clone)]
pub struct CacheRootSwitch {
    fs: Arc<dyn FileSystem>,
    roots: CacheRoots,
}

fn configure_failed() -> JobError {
    JobError::new(
        ErrorCode::NoDistroUpgradeData,
        "Could not configure package cache.",
    )
}

impl CacheRootSwitch {
    pub fn new(fs: Arc<dyn FileSystem>, roots: CacheRoots) -> Self {
        Self { fs, roots }
    }

    pub fn roots(&self) -> &CacheRoots {
        &self.roots
    }

    /// Root the redirect currently points at, if any.
    pub fn active(&self) -> JobResult<Option<CacheRoot>> {
        let target = self.fs.read_link(&self.roots.redirect).map_err(|e| {
            error!(redirect = %self.roots.redirect.display(), "cannot read cache redirect: {e:#}");
            configure_failed()
        })?;
        Ok(target.and_then(|t| self.roots.root_at(&t)))
    }

    /// Real directory behind the redirect, or the redirect itself when it
    /// cannot be read.
    pub fn active_path(&self) -> PathBuf {
        match self.fs.read_link(&self.roots.redirect) {
            Ok(Some(target)) => target,
            Ok(None) => self.roots.redirect.clone(),
            Err(e) => {
                warn!(
                    redirect = %self.roots.redirect.display(),
                    "cannot read cache redirect, falling back to it: {e:#}"
                );
                self.roots.redirect.clone()
            }
        }
    }

    /// Make the redirect resolve to `wanted`.
    ///
    /// Idempotent: a second call with the same root neither repoints nor
    /// resets the pool. Fails closed: on any error the engine is left as it
    /// was and the caller must not run a transaction.
    pub fn select_root(&self, wanted: CacheRoot, engine: &mut dyn Engine) -> JobResult<RootSwitch> {
        let path = self.roots.path(wanted);

        if !self.fs.is_dir(path) {
            info!(root = %wanted, path = %path.display(), "creating cache directory");
            self.fs.create_dir_all(path).map_err(|e| {
                error!(path = %path.display(), "cannot create cache directory: {e:#}");
                configure_failed()
            })?;
        }

        let current = self.fs.read_link(&self.roots.redirect).map_err(|e| {
            error!(redirect = %self.roots.redirect.display(), "cannot read cache redirect: {e:#}");
            configure_failed()
        })?;

        let Some(current) = current else {
            info!(redirect = %self.roots.redirect.display(), target = %path.display(), "creating cache redirect");
            self.repoint(path)?;
            return Ok(RootSwitch::Created);
        };

        if current == path {
            debug!(root = %wanted, "cache root already active");
            return Ok(RootSwitch::Unchanged);
        }

        info!(
            from = %current.display(),
            to = %path.display(),
            "switching cache root"
        );
        self.repoint(path)?;

        if let Err(e) = reset_pool(engine) {
            error!("failed to reset pool after cache switch: {e}");
            // The pool still holds the previous root's data; point back at it
            // so the next selection switches and reloads again.
            match self.repoint(&current) {
                Ok(()) => warn!(root = %current.display(), "cache redirect restored"),
                Err(_) => error!(root = %current.display(), "cache redirect left on unloaded root"),
            }
            return Err(configure_failed());
        }

        Ok(RootSwitch::Switched)
    }

    fn repoint(&self, target: &Path) -> JobResult<()> {
        self.fs
            .replace_symlink(target, &self.roots.redirect)
            .map_err(|e| {
                error!(redirect = %self.roots.redirect.display(), "cannot create cache redirect: {e:#}");
                configure_failed()
            })
    }

    /// Copy the dist-upgrade root over the regular one.
    ///
    /// The alternate root stays in place, so this may run repeatedly.
    pub fn promote_alternate(&self) -> anyhow::Result<()> {
        let regular = &self.roots.regular;
        info!(
            from = %self.roots.dist_upgrade.display(),
            to = %regular.display(),
            "updating regular cache from dist-upgrade cache"
        );
        if self.fs.exists(regular) {
            self.fs.remove_dir_all(regular)?;
        }
        self.fs.create_dir_all(regular)?;
        self.fs
            .copy_dir_contents(&self.roots.dist_upgrade, regular)?;
        Ok(())
    }
}

/// Reload the pool after the cache root changed.
///
/// Every known repository is unloaded and, when cached under the new root,
/// loaded again. The resolver is reset, including upgrade and update mode,
/// which a plain reset keeps.
pub fn reset_pool(engine: &mut dyn Engine) -> EngineResult<()> {
    let repos = engine.known_repos()?;

    for repo in &repos {
        debug!(repo = %repo.alias, "reloading repository from disk cache");
        engine.pool_mut().erase_repo(&repo.alias);

        if engine.is_cached(repo) {
            if let Err(e) = engine.load_from_cache(repo) {
                error!(repo = %repo.alias, "failed to reload repository: {e}");
            }
        }
    }

    let resolver = engine.resolver_mut();
    resolver.reset();
    resolver.upgrade_mode = false;
    resolver.update_mode = false;

    info!(repos = repos.len(), "pool reset after cache root change");
    Ok(())
}
