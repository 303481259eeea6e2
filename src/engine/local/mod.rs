// src/engine/local/mod.rs

//! File-backed engine used by the CLI and the integration tests.
//!
//! - repository definitions: `repos_dir/*.toml`
//! - repository metadata: `<baseurl>/repodata.toml` (+ `.blake3` digest)
//! - cache: below `cache_dir`, normally the cache-root redirect
//! - installed database: a TOML file

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, info};

use crate::engine::pool::Pool;
use crate::engine::{
    CommitPolicy, CommitResult, Engine, EngineError, EngineEvents, EngineResult, PackageHeader,
    RepoInfo, Resolution, ResolverSettings,
};
use crate::fs::FileSystem;

pub mod commit;
pub mod installed;
pub mod record;
pub mod repo;
pub mod resolver;

use repo::CacheLayout;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalEngineSettings {
    pub repos_dir: PathBuf,
    pub installed_db: PathBuf,
    pub keyring_dir: PathBuf,
    /// Directory all cache paths are resolved against.
    pub cache_dir: PathBuf,
}

#[derive(Debug)]
pub struct LocalEngine {
    fs: Arc<dyn FileSystem>,
    settings: LocalEngineSettings,
    layout: CacheLayout,
    root: Option<PathBuf>,
    pool: Pool,
    resolver: ResolverSettings,
}

/// On-disk form of a local package file.
#[derive(Debug, Deserialize)]
struct PackageFile {
    header: PackageHeader,
}

impl LocalEngine {
    pub fn new(fs: Arc<dyn FileSystem>, settings: LocalEngineSettings) -> Self {
        let layout = CacheLayout::new(&settings.cache_dir);
        Self {
            fs,
            settings,
            layout,
            root: None,
            pool: Pool::new(),
            resolver: ResolverSettings::default(),
        }
    }

    pub fn settings(&self) -> &LocalEngineSettings {
        &self.settings
    }

    pub fn layout(&self) -> &CacheLayout {
        &self.layout
    }

    /// Root the target was last initialised against.
    pub fn target_root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    fn require_target(&self) -> EngineResult<()> {
        if self.root.is_none() {
            return Err(EngineError::Internal("target not initialised".to_string()));
        }
        Ok(())
    }
}

impl Engine for LocalEngine {
    fn initialize_target(&mut self, root: &Path) -> EngineResult<()> {
        let items = installed::read(self.fs.as_ref(), &self.settings.installed_db)?;
        info!(root = %root.display(), installed = items.len(), "initialised target");
        self.pool.erase_installed();
        self.pool.extend(items);
        self.root = Some(root.to_path_buf());
        Ok(())
    }

    fn load_installed(&mut self) -> EngineResult<()> {
        self.require_target()?;
        let items = installed::read(self.fs.as_ref(), &self.settings.installed_db)?;
        self.pool.erase_installed();
        self.pool.extend(items);
        Ok(())
    }

    fn pool(&self) -> &Pool {
        &self.pool
    }

    fn pool_mut(&mut self) -> &mut Pool {
        &mut self.pool
    }

    fn known_repos(&self) -> EngineResult<Vec<RepoInfo>> {
        repo::read_definitions(self.fs.as_ref(), &self.settings.repos_dir)
    }

    fn add_repo(&mut self, repo: &RepoInfo) -> EngineResult<()> {
        repo::add_definition(self.fs.as_ref(), &self.settings.repos_dir, repo)
    }

    fn modify_repo(&mut self, alias: &str, repo: &RepoInfo) -> EngineResult<()> {
        repo::modify_definition(self.fs.as_ref(), &self.settings.repos_dir, alias, repo)
    }

    fn remove_repo(&mut self, alias: &str) -> EngineResult<()> {
        repo::remove_definition(self.fs.as_ref(), &self.settings.repos_dir, alias)?;
        repo::clean_all(self.fs.as_ref(), &self.layout, alias)?;
        self.pool.erase_repo(alias);
        Ok(())
    }

    fn refresh_metadata(
        &mut self,
        repo: &RepoInfo,
        force: bool,
        events: &mut dyn EngineEvents,
    ) -> EngineResult<()> {
        repo::refresh_metadata(
            self.fs.as_ref(),
            &self.layout,
            &self.settings.keyring_dir,
            repo,
            force,
            events,
        )
    }

    fn build_cache(
        &mut self,
        repo: &RepoInfo,
        force: bool,
        events: &mut dyn EngineEvents,
    ) -> EngineResult<()> {
        repo::build_cache(self.fs.as_ref(), &self.layout, repo, force, events)
    }

    fn clean_cache(&mut self, repo: &RepoInfo) -> EngineResult<()> {
        let solv = self.layout.solv_file(&repo.alias);
        if self.fs.exists(&solv) {
            self.fs.remove_file(&solv)?;
        }
        debug!(repo = %repo.alias, "cleaned solv cache");
        Ok(())
    }

    fn is_cached(&self, repo: &RepoInfo) -> bool {
        self.fs.is_file(&self.layout.solv_file(&repo.alias))
    }

    fn load_from_cache(&mut self, repo: &RepoInfo) -> EngineResult<()> {
        let items = repo::load_from_cache(self.fs.as_ref(), &self.layout, repo)?;
        self.pool.erase_repo(&repo.alias);
        debug!(repo = %repo.alias, items = items.len(), "loaded repository from cache");
        self.pool.extend(items);
        Ok(())
    }

    fn resolver(&self) -> &ResolverSettings {
        &self.resolver
    }

    fn resolver_mut(&mut self) -> &mut ResolverSettings {
        &mut self.resolver
    }

    fn resolve(&mut self) -> EngineResult<Resolution> {
        Ok(resolver::resolve(&mut self.pool, &self.resolver))
    }

    fn commit(
        &mut self,
        policy: &CommitPolicy,
        events: &mut dyn EngineEvents,
    ) -> EngineResult<CommitResult> {
        self.require_target()?;
        let repos = self.known_repos()?;
        let target = commit::CommitTarget {
            fs: self.fs.as_ref(),
            layout: &self.layout,
            repos: &repos,
            installed_db: &self.settings.installed_db,
        };
        commit::commit(&target, &mut self.pool, policy, events)
    }

    fn free_space(&self, path: &Path) -> EngineResult<u64> {
        Ok(self.fs.available_space(path)?)
    }

    fn read_package_header(&self, path: &Path) -> EngineResult<PackageHeader> {
        if !self.fs.is_file(path) {
            return Err(EngineError::PackageNotFound(path.display().to_string()));
        }
        let contents = self.fs.read_to_string(path)?;
        let file: PackageFile = toml::from_str(&contents)
            .map_err(|e| EngineError::Rpm(format!("{}: not a package file: {e}", path.display())))?;
        Ok(file.header)
    }
}
