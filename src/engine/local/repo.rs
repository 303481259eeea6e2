// src/engine/local/repo.rs

//! Repository definitions, metadata refresh and the on-disk solv cache.
//!
//! Layout below the cache directory (which is the cache-root redirect):
//!
//! ```text
//! raw/<alias>/repodata.toml     copied repository metadata
//! solv/<alias>.toml             parsed cache, stamped with the raw digest
//! packages/<alias>/<file>.pkg   downloaded payloads
//! ```

use std::io::Read;
use std::path::{Path, PathBuf};

use blake3::Hasher;
use tracing::{debug, info};

use crate::engine::pool::{PackageId, PoolItem};
use crate::engine::{
    AuthReply, EngineError, EngineEvents, EngineResult, Flow, KeyInfo, MediaReply, RepoInfo,
    Trust,
};
use crate::fs::FileSystem;

use super::record::RecordFile;

pub const METADATA_FILE: &str = "repodata.toml";
pub const DIGEST_FILE: &str = "repodata.toml.blake3";

/// Paths inside one cache directory.
#[derive(Debug, Clone)]
pub struct CacheLayout {
    root: PathBuf,
}

impl CacheLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn raw_dir(&self, alias: &str) -> PathBuf {
        self.root.join("raw").join(alias)
    }

    pub fn raw_metadata(&self, alias: &str) -> PathBuf {
        self.raw_dir(alias).join(METADATA_FILE)
    }

    pub fn solv_file(&self, alias: &str) -> PathBuf {
        self.root.join("solv").join(format!("{alias}.toml"))
    }

    pub fn packages_dir(&self, alias: &str) -> PathBuf {
        self.root.join("packages").join(alias)
    }

    pub fn package_file(&self, id: &PackageId) -> PathBuf {
        self.packages_dir(&id.data).join(package_file_name(id))
    }
}

pub fn package_file_name(id: &PackageId) -> String {
    format!("{}.pkg", id.ident())
}

/// Hash a file through the filesystem abstraction.
pub fn hash_file(fs: &dyn FileSystem, path: &Path) -> EngineResult<String> {
    let mut reader = fs.open_read(path)?;
    let mut hasher = Hasher::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = reader
            .read(&mut buf)
            .map_err(|e| EngineError::Internal(format!("reading {}: {e}", path.display())))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().to_hex().to_string())
}

pub fn hash_bytes(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

/// All `*.toml` repository definitions in `dir`, sorted by file name.
pub fn read_definitions(fs: &dyn FileSystem, dir: &Path) -> EngineResult<Vec<RepoInfo>> {
    if !fs.is_dir(dir) {
        debug!(dir = %dir.display(), "no repository definitions directory");
        return Ok(Vec::new());
    }

    let mut repos = Vec::new();
    for path in fs.read_dir(dir)? {
        if path.extension().and_then(|e| e.to_str()) != Some("toml") {
            continue;
        }
        let contents = fs.read_to_string(&path)?;
        let repo: RepoInfo = toml::from_str(&contents).map_err(|e| {
            EngineError::RepoConfiguration(format!("{}: {}", path.display(), e))
        })?;
        if repo.alias.trim().is_empty() {
            return Err(EngineError::RepoConfiguration(format!(
                "{}: empty alias",
                path.display()
            )));
        }
        repos.push(repo);
    }
    Ok(repos)
}

/// File in `dir` whose definition carries `alias`.
fn definition_file(fs: &dyn FileSystem, dir: &Path, alias: &str) -> EngineResult<Option<PathBuf>> {
    if !fs.is_dir(dir) {
        return Ok(None);
    }
    for path in fs.read_dir(dir)? {
        if path.extension().and_then(|e| e.to_str()) != Some("toml") {
            continue;
        }
        let contents = fs.read_to_string(&path)?;
        if let Ok(repo) = toml::from_str::<RepoInfo>(&contents) {
            if repo.alias == alias {
                return Ok(Some(path));
            }
        }
    }
    Ok(None)
}

fn write_definition(fs: &dyn FileSystem, path: &Path, repo: &RepoInfo) -> EngineResult<()> {
    let contents = toml::to_string(repo)
        .map_err(|e| EngineError::Internal(format!("serialising repository '{}': {e}", repo.alias)))?;
    fs.write(path, contents.as_bytes())?;
    Ok(())
}

/// Write a new definition as `<alias>.toml`.
pub fn add_definition(fs: &dyn FileSystem, dir: &Path, repo: &RepoInfo) -> EngineResult<()> {
    if repo.alias.trim().is_empty() {
        return Err(EngineError::RepoConfiguration("empty alias".to_string()));
    }
    if definition_file(fs, dir, &repo.alias)?.is_some() {
        return Err(EngineError::RepoAlreadyExists(repo.alias.clone()));
    }
    fs.create_dir_all(dir)?;
    let path = dir.join(format!("{}.toml", repo.alias));
    write_definition(fs, &path, repo)?;
    info!(repo = %repo.alias, path = %path.display(), "added repository");
    Ok(())
}

/// Overwrite the definition of `alias` in place.
pub fn modify_definition(
    fs: &dyn FileSystem,
    dir: &Path,
    alias: &str,
    repo: &RepoInfo,
) -> EngineResult<()> {
    let path = definition_file(fs, dir, alias)?
        .ok_or_else(|| EngineError::RepoNotFound(alias.to_string()))?;
    write_definition(fs, &path, repo)?;
    debug!(repo = %alias, path = %path.display(), "modified repository");
    Ok(())
}

pub fn remove_definition(fs: &dyn FileSystem, dir: &Path, alias: &str) -> EngineResult<()> {
    let path = definition_file(fs, dir, alias)?
        .ok_or_else(|| EngineError::RepoNotFound(alias.to_string()))?;
    fs.remove_file(&path)?;
    info!(repo = %alias, "removed repository");
    Ok(())
}

/// Drop raw metadata, solv cache and payloads of `alias`.
pub fn clean_all(fs: &dyn FileSystem, layout: &CacheLayout, alias: &str) -> EngineResult<()> {
    let solv = layout.solv_file(alias);
    if fs.exists(&solv) {
        fs.remove_file(&solv)?;
    }
    for dir in [layout.raw_dir(alias), layout.packages_dir(alias)] {
        if fs.exists(&dir) {
            fs.remove_dir_all(&dir)?;
        }
    }
    Ok(())
}

/// Local directory behind a repository URL, asking the event sink when the
/// URL needs a medium or credentials.
pub(crate) fn source_dir(repo: &RepoInfo, events: &mut dyn EngineEvents) -> EngineResult<PathBuf> {
    let url = repo.baseurl.as_str();

    if repo.is_volatile() {
        let description = format!("Please insert medium for repository '{}'", repo.alias);
        return match events.media_change(url, &description) {
            MediaReply::Abort => Err(EngineError::Media(description)),
        };
    }

    if let Some(rest) = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
    {
        if rest.split('/').next().is_some_and(|host| host.contains('@')) {
            return match events.authenticate(url, "credentials required") {
                AuthReply::Abort => Err(EngineError::Media(
                    "Authentication failed (are repository credentials set up correctly?)"
                        .to_string(),
                )),
            };
        }
        return Err(EngineError::Media(format!(
            "cannot reach remote repository url '{url}'"
        )));
    }

    let path = url
        .strip_prefix("file://")
        .or_else(|| url.strip_prefix("dir://"))
        .unwrap_or(url);
    if !path.starts_with('/') {
        return Err(EngineError::Media(format!("unsupported repository url '{url}'")));
    }
    Ok(PathBuf::from(path))
}

fn trusted(reply: Trust) -> EngineResult<()> {
    match reply {
        Trust::Accept => Ok(()),
        Trust::AbortRefresh => Err(EngineError::RefreshAborted),
    }
}

/// Copy fresh metadata for `repo` into the cache, running the trust checks.
pub fn refresh_metadata(
    fs: &dyn FileSystem,
    layout: &CacheLayout,
    keyring: &Path,
    repo: &RepoInfo,
    force: bool,
    events: &mut dyn EngineEvents,
) -> EngineResult<()> {
    let source = source_dir(repo, events)?;
    let metadata = source.join(METADATA_FILE);
    if !fs.is_file(&metadata) {
        return Err(EngineError::Media(format!(
            "repository metadata not found at {}",
            metadata.display()
        )));
    }

    events.progress_start(&repo.alias);
    let found = hash_file(fs, &metadata)?;
    let raw = layout.raw_metadata(&repo.alias);

    if !force && fs.is_file(&raw) && hash_file(fs, &raw)? == found {
        debug!(repo = %repo.alias, "metadata up to date");
        events.progress(&repo.alias, 100);
        events.progress_finish(&repo.alias);
        return Ok(());
    }

    if repo.gpgcheck {
        let file = metadata.display().to_string();
        check_digest(fs, &source, &file, &found, events)?;
        check_key(fs, keyring, repo, &file, events)?;
    }

    if events.progress(&repo.alias, 50) == Flow::Cancel {
        return Err(EngineError::Cancelled);
    }

    let contents = fs.read_to_string(&metadata)?;
    fs.create_dir_all(&layout.raw_dir(&repo.alias))?;
    fs.write(&raw, contents.as_bytes())?;

    events.progress(&repo.alias, 100);
    events.progress_finish(&repo.alias);
    info!(repo = %repo.alias, digest = %found, "refreshed repository metadata");
    Ok(())
}

fn check_digest(
    fs: &dyn FileSystem,
    source: &Path,
    file: &str,
    found: &str,
    events: &mut dyn EngineEvents,
) -> EngineResult<()> {
    let digest = source.join(DIGEST_FILE);
    if !fs.is_file(&digest) {
        return trusted(events.accept_no_digest(file));
    }

    let requested = fs.read_to_string(&digest)?;
    let requested = requested.trim();
    if requested.is_empty() {
        return trusted(events.accept_unknown_digest(file, "blake3"));
    }
    if requested != found {
        return trusted(events.accept_wrong_digest(file, requested, found));
    }
    Ok(())
}

fn check_key(
    fs: &dyn FileSystem,
    keyring: &Path,
    repo: &RepoInfo,
    file: &str,
    events: &mut dyn EngineEvents,
) -> EngineResult<()> {
    let Some(key_id) = repo.key_id.as_deref() else {
        return trusted(events.accept_unsigned_file(file));
    };

    let stored = keyring.join(key_id);
    let fingerprint = repo.key_fingerprint.clone();

    if fs.is_file(&stored) {
        let known = fs.read_to_string(&stored)?;
        return match fingerprint {
            Some(fp) if known.trim() != fp => {
                let key = KeyInfo {
                    id: key_id.to_string(),
                    name: repo.key_name.clone().unwrap_or_else(|| key_id.to_string()),
                    fingerprint: fp,
                };
                trusted(events.accept_verification_failed(file, &key))
            }
            _ => Ok(()),
        };
    }

    let reply = match (&repo.key_name, &fingerprint) {
        (None, None) => events.accept_unknown_key(file, key_id),
        _ => {
            let key = KeyInfo {
                id: key_id.to_string(),
                name: repo.key_name.clone().unwrap_or_else(|| key_id.to_string()),
                fingerprint: fingerprint.clone().unwrap_or_else(|| "UNKNOWN".to_string()),
            };
            events.accept_key(&key)
        }
    };
    trusted(reply)?;

    fs.create_dir_all(keyring)?;
    fs.write(&stored, fingerprint.unwrap_or_default().as_bytes())?;
    info!(repo = %repo.alias, key = %key_id, "imported repository key");
    Ok(())
}

/// Parse the raw metadata of `repo` into its solv cache file.
pub fn build_cache(
    fs: &dyn FileSystem,
    layout: &CacheLayout,
    repo: &RepoInfo,
    force: bool,
    events: &mut dyn EngineEvents,
) -> EngineResult<()> {
    let raw = layout.raw_metadata(&repo.alias);
    if !fs.is_file(&raw) {
        return Err(EngineError::Internal(format!(
            "no metadata for repository '{}'; refresh it first",
            repo.alias
        )));
    }

    let cookie = hash_file(fs, &raw)?;
    let solv = layout.solv_file(&repo.alias);

    if !force && fs.is_file(&solv) {
        let current = fs
            .read_to_string(&solv)
            .ok()
            .and_then(|s| toml::from_str::<RecordFile>(&s).ok());
        if current.and_then(|f| f.cookie).as_deref() == Some(cookie.as_str()) {
            debug!(repo = %repo.alias, "solv cache up to date");
            return Ok(());
        }
    }

    let label = format!("Building cache for {}", repo.alias);
    events.progress_start(&label);

    let contents = fs.read_to_string(&raw)?;
    let mut file: RecordFile = toml::from_str(&contents).map_err(|e| {
        EngineError::Internal(format!("invalid metadata for repository '{}': {e}", repo.alias))
    })?;
    file.cookie = Some(cookie);

    let serialised = toml::to_string(&file)
        .map_err(|e| EngineError::Internal(format!("serialising cache: {e}")))?;
    fs.write(&solv, serialised.as_bytes())?;

    events.progress(&label, 100);
    events.progress_finish(&label);
    debug!(repo = %repo.alias, items = file.items.len(), "built solv cache");
    Ok(())
}

pub fn load_from_cache(
    fs: &dyn FileSystem,
    layout: &CacheLayout,
    repo: &RepoInfo,
) -> EngineResult<Vec<PoolItem>> {
    let solv = layout.solv_file(&repo.alias);
    let contents = fs.read_to_string(&solv)?;
    let file: RecordFile = toml::from_str(&contents).map_err(|e| {
        EngineError::Internal(format!("cache for repository '{}' is corrupt: {e}", repo.alias))
    })?;

    let items = file
        .items
        .into_iter()
        .map(|record| {
            let mut item = record.into_item(&repo.alias, false);
            item.cached = fs.is_file(&layout.package_file(&item.id));
            item
        })
        .collect();
    Ok(items)
}
