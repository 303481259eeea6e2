use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use pkbridge::engine::pool::compare_versions;
use pkbridge::engine::{
    CommitPolicy, CommitResult, CommitStep, DownloadMode, Engine, EngineError, EngineEvents,
    EngineResult, Flow, ItemKind, KeyInfo, PackageHeader, PackageId, Pool, PoolItem, Problem,
    RepoInfo, Resolution, ResolverSettings, StepAction, StepState, Trust,
};

/// Engine calls a test can assert on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    InitializeTarget(PathBuf),
    LoadInstalled,
    AddRepo(String),
    ModifyRepo(String),
    RemoveRepo(String),
    RefreshMetadata { alias: String, force: bool },
    BuildCache(String),
    CleanCache(String),
    LoadFromCache(String),
    Resolve,
    Commit(CommitPolicy),
    FreeSpace(PathBuf),
}

/// Shared view of what a [`FakeEngine`] was asked to do.
#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<EngineCall>>>);

impl Journal {
    pub fn push(&self, call: EngineCall) {
        self.0.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&EngineCall) -> bool) -> usize {
        self.0.lock().unwrap().iter().filter(|c| pred(c)).count()
    }

    pub fn commits(&self) -> Vec<CommitPolicy> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                EngineCall::Commit(policy) => Some(policy),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.0.lock().unwrap().clear();
    }
}

/// Scriptable in-memory engine.
///
/// - `installed` items are what `load_installed` puts back into the pool
/// - `caches` holds per-repository items `load_from_cache` loads
/// - `problems` makes every resolution unsatisfiable
/// - commit walks the plan and fires the events a real engine would
#[derive(Debug, Default)]
pub struct FakeEngine {
    pub pool: Pool,
    pub resolver: ResolverSettings,
    pub repos: Vec<RepoInfo>,
    pub installed: Vec<PoolItem>,
    pub caches: HashMap<String, Vec<PoolItem>>,
    pub problems: Vec<Problem>,
    /// Keys presented while refreshing a repository.
    pub repo_keys: HashMap<String, KeyInfo>,
    pub refresh_errors: HashMap<String, EngineError>,
    /// Repositories whose first cache load fails.
    pub corrupt_caches: HashSet<String>,
    pub repos_error: Option<EngineError>,
    /// Free bytes per path; unknown paths have plenty.
    pub free_space: HashMap<PathBuf, u64>,
    pub free_space_error: bool,
    /// Steps left in `Todo` state by commit.
    pub failing_steps: HashSet<PackageId>,
    /// Upcoming `initialize_target` results, consumed front to back.
    pub init_results: Vec<EngineResult<()>>,
    pub headers: HashMap<PathBuf, PackageHeader>,
    /// Download progress values reported per package.
    pub download_ticks: Vec<u32>,
    pub journal: Journal,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self {
            download_ticks: vec![50, 100],
            ..Self::default()
        }
    }

    pub fn journal(&self) -> Journal {
        self.journal.clone()
    }

    pub fn with_installed(mut self, items: impl IntoIterator<Item = PoolItem>) -> Self {
        let items: Vec<PoolItem> = items.into_iter().collect();
        self.pool.extend(items.iter().cloned());
        self.installed.extend(items);
        self
    }

    /// Configure `repo` and have it cached with `items`.
    pub fn with_repo(mut self, repo: RepoInfo, items: impl IntoIterator<Item = PoolItem>) -> Self {
        self.caches
            .insert(repo.alias.clone(), items.into_iter().collect());
        self.repos.push(repo);
        self
    }

    /// Put items straight into the pool as if already loaded.
    pub fn with_available(mut self, items: impl IntoIterator<Item = PoolItem>) -> Self {
        self.pool.extend(items);
        self
    }

    pub fn with_problems(mut self, problems: impl IntoIterator<Item = &'static str>) -> Self {
        self.problems = problems.into_iter().map(Problem::new).collect();
        self
    }

    pub fn with_free_space(mut self, path: impl Into<PathBuf>, bytes: u64) -> Self {
        self.free_space.insert(path.into(), bytes);
        self
    }

    fn mark_updates(&mut self) {
        let mut upgrades = Vec::new();
        for item in self.pool.iter().filter(|i| i.installed && i.kind == ItemKind::Package) {
            if let Some(best) = self.pool.best_available(&item.id.name, &item.id.arch) {
                if compare_versions(&best.id.version, &item.id.version).is_gt() {
                    upgrades.push(best.id.clone());
                }
            }
        }
        for id in upgrades {
            if let Some(item) = self.pool.find_mut(&id) {
                item.status = pkbridge::engine::Transact::ToInstall;
            }
        }
    }

    /// Installed items losing a requirement to a removal go as well.
    fn mark_dependents(&mut self) {
        loop {
            let present = |item: &PoolItem| {
                (item.installed && !item.status.is_to_uninstall()) || item.status.is_to_install()
            };
            let broken: Vec<PackageId> = self
                .pool
                .iter()
                .filter(|i| i.installed && !i.status.is_to_uninstall())
                .filter(|i| {
                    i.requires.iter().any(|cap| {
                        let mut providers = self.pool.iter().filter(|p| p.provides_name(cap));
                        let removed = providers.clone().any(|p| p.status.is_to_uninstall());
                        removed && !providers.any(|p| present(p))
                    })
                })
                .map(|i| i.id.clone())
                .collect();
            if broken.is_empty() {
                return;
            }
            for id in broken {
                if let Some(item) = self.pool.find_mut(&id) {
                    item.status = pkbridge::engine::Transact::ToRemove;
                }
            }
        }
    }

    fn mark_replacements(&mut self) {
        let names: Vec<(String, String)> = self
            .pool
            .iter()
            .filter(|i| !i.installed && i.status.is_to_install())
            .map(|i| (i.id.name.clone(), i.id.arch.clone()))
            .collect();
        for item in self.pool.iter_mut().filter(|i| i.installed) {
            if names
                .iter()
                .any(|(n, a)| n == &item.id.name && a == &item.id.arch)
            {
                item.status = pkbridge::engine::Transact::ToRemoveDueToUpgrade;
            }
        }
    }
}

impl Engine for FakeEngine {
    fn initialize_target(&mut self, root: &Path) -> EngineResult<()> {
        self.journal
            .push(EngineCall::InitializeTarget(root.to_path_buf()));
        if self.init_results.is_empty() {
            return Ok(());
        }
        self.init_results.remove(0)
    }

    fn load_installed(&mut self) -> EngineResult<()> {
        self.journal.push(EngineCall::LoadInstalled);
        self.pool.erase_installed();
        self.pool.extend(self.installed.iter().cloned());
        Ok(())
    }

    fn pool(&self) -> &Pool {
        &self.pool
    }

    fn pool_mut(&mut self) -> &mut Pool {
        &mut self.pool
    }

    fn known_repos(&self) -> EngineResult<Vec<RepoInfo>> {
        match &self.repos_error {
            Some(err) => Err(err.clone()),
            None => Ok(self.repos.clone()),
        }
    }

    fn add_repo(&mut self, repo: &RepoInfo) -> EngineResult<()> {
        self.journal.push(EngineCall::AddRepo(repo.alias.clone()));
        if self.repos.iter().any(|r| r.alias == repo.alias) {
            return Err(EngineError::RepoAlreadyExists(repo.alias.clone()));
        }
        self.repos.push(repo.clone());
        Ok(())
    }

    fn modify_repo(&mut self, alias: &str, repo: &RepoInfo) -> EngineResult<()> {
        self.journal.push(EngineCall::ModifyRepo(alias.to_string()));
        let slot = self
            .repos
            .iter_mut()
            .find(|r| r.alias == alias)
            .ok_or_else(|| EngineError::RepoNotFound(alias.to_string()))?;
        *slot = repo.clone();
        Ok(())
    }

    fn remove_repo(&mut self, alias: &str) -> EngineResult<()> {
        self.journal.push(EngineCall::RemoveRepo(alias.to_string()));
        let before = self.repos.len();
        self.repos.retain(|r| r.alias != alias);
        if self.repos.len() == before {
            return Err(EngineError::RepoNotFound(alias.to_string()));
        }
        self.caches.remove(alias);
        self.pool.erase_repo(alias);
        Ok(())
    }

    fn refresh_metadata(
        &mut self,
        repo: &RepoInfo,
        force: bool,
        events: &mut dyn EngineEvents,
    ) -> EngineResult<()> {
        self.journal.push(EngineCall::RefreshMetadata {
            alias: repo.alias.clone(),
            force,
        });
        if let Some(err) = self.refresh_errors.get(&repo.alias) {
            return Err(err.clone());
        }
        if let Some(key) = self.repo_keys.get(&repo.alias) {
            if events.accept_key(key) == Trust::AbortRefresh {
                return Err(EngineError::RefreshAborted);
            }
        }
        events.progress_start(&repo.alias);
        events.progress(&repo.alias, 100);
        events.progress_finish(&repo.alias);
        Ok(())
    }

    fn build_cache(
        &mut self,
        repo: &RepoInfo,
        _force: bool,
        _events: &mut dyn EngineEvents,
    ) -> EngineResult<()> {
        self.journal.push(EngineCall::BuildCache(repo.alias.clone()));
        Ok(())
    }

    fn clean_cache(&mut self, repo: &RepoInfo) -> EngineResult<()> {
        self.journal.push(EngineCall::CleanCache(repo.alias.clone()));
        Ok(())
    }

    fn is_cached(&self, repo: &RepoInfo) -> bool {
        self.caches.contains_key(&repo.alias)
    }

    fn load_from_cache(&mut self, repo: &RepoInfo) -> EngineResult<()> {
        self.journal
            .push(EngineCall::LoadFromCache(repo.alias.clone()));
        if self.corrupt_caches.remove(&repo.alias) {
            return Err(EngineError::Internal(format!(
                "cache of {} is corrupt",
                repo.alias
            )));
        }
        let Some(items) = self.caches.get(&repo.alias) else {
            return Err(EngineError::RepoNotFound(repo.alias.clone()));
        };
        self.pool.erase_repo(&repo.alias);
        self.pool.extend(items.iter().cloned());
        Ok(())
    }

    fn resolver(&self) -> &ResolverSettings {
        &self.resolver
    }

    fn resolver_mut(&mut self) -> &mut ResolverSettings {
        &mut self.resolver
    }

    fn resolve(&mut self) -> EngineResult<Resolution> {
        self.journal.push(EngineCall::Resolve);
        if !self.problems.is_empty() {
            return Ok(Resolution::Unsatisfiable(self.problems.clone()));
        }
        if self.resolver.upgrade_mode || self.resolver.update_mode {
            self.mark_updates();
        }
        self.mark_replacements();
        self.mark_dependents();
        Ok(Resolution::Solved)
    }

    fn commit(
        &mut self,
        policy: &CommitPolicy,
        events: &mut dyn EngineEvents,
    ) -> EngineResult<CommitResult> {
        self.journal.push(EngineCall::Commit(policy.clone()));
        let mut steps = Vec::new();

        let installs: Vec<PoolItem> = self
            .pool
            .iter()
            .filter(|i| i.status.is_to_install() && i.kind != ItemKind::Pattern)
            .cloned()
            .collect();
        let removals: Vec<PoolItem> = self
            .pool
            .iter()
            .filter(|i| i.status == pkbridge::engine::Transact::ToRemove)
            .cloned()
            .collect();

        for item in &installs {
            events.download_start(&item.id, &item.summary);
            for tick in &self.download_ticks {
                if events.download_progress(&item.id, *tick) == Flow::Cancel {
                    return Err(EngineError::Cancelled);
                }
            }
            events.download_finish(&item.id, None);
        }

        if policy.download_mode == DownloadMode::Only {
            for item in &installs {
                steps.push(CommitStep {
                    id: item.id.clone(),
                    action: StepAction::Install,
                    state: StepState::Todo,
                });
            }
            return Ok(CommitResult { steps });
        }

        for item in &removals {
            events.remove_start(&item.id);
            events.remove_progress(&item.id, 100);
            events.remove_finish(&item.id, None);
            steps.push(CommitStep {
                id: item.id.clone(),
                action: StepAction::Remove,
                state: StepState::Done,
            });
        }

        for item in &installs {
            let state = if self.failing_steps.contains(&item.id) {
                StepState::Todo
            } else {
                events.install_start(&item.id, &item.summary);
                events.install_progress(&item.id, 100);
                events.install_finish(&item.id, None);
                StepState::Done
            };
            steps.push(CommitStep {
                id: item.id.clone(),
                action: StepAction::Install,
                state,
            });
        }

        if policy.sync_pool_after_commit {
            self.pool.reset_all();
        }
        Ok(CommitResult { steps })
    }

    fn free_space(&self, path: &Path) -> EngineResult<u64> {
        self.journal.push(EngineCall::FreeSpace(path.to_path_buf()));
        if self.free_space_error {
            return Err(EngineError::Internal("statvfs failed".to_string()));
        }
        Ok(self.free_space.get(path).copied().unwrap_or(u64::MAX))
    }

    fn read_package_header(&self, path: &Path) -> EngineResult<PackageHeader> {
        self.headers
            .get(path)
            .cloned()
            .ok_or_else(|| EngineError::Rpm(format!("{}: no header", path.display())))
    }
}
