// src/fs/mock.rs

use super::FileSystem;
use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Space reported for paths with no explicit `set_available_space` entry.
pub const DEFAULT_AVAILABLE_SPACE: u64 = 1 << 40;

#[derive(Debug, Clone)]
pub enum MockEntry {
    File(Vec<u8>),
    Dir(Vec<String>), // List of child names
    Symlink(PathBuf),
}

#[derive(Debug, Clone, Default)]
pub struct MockFileSystem {
    files: Arc<Mutex<HashMap<PathBuf, MockEntry>>>,
    space: Arc<Mutex<HashMap<PathBuf, u64>>>,
}

type Entries = HashMap<PathBuf, MockEntry>;

impl MockFileSystem {
    pub fn new() -> Self {
        let mut files = HashMap::new();
        // Ensure roots exist
        files.insert(PathBuf::from("."), MockEntry::Dir(Vec::new()));
        files.insert(PathBuf::from("/"), MockEntry::Dir(Vec::new()));

        Self {
            files: Arc::new(Mutex::new(files)),
            space: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn entries(&self) -> MutexGuard<'_, Entries> {
        self.files.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_file(&self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) {
        let mut files = self.entries();
        let path = resolve_parent(&files, path.as_ref());
        insert_entry(&mut files, &path, MockEntry::File(content.into()));
    }

    pub fn add_dir(&self, path: impl AsRef<Path>) {
        let mut files = self.entries();
        let path = resolve(&files, path.as_ref());
        ensure_dir_entry(&mut files, &path);
    }

    pub fn add_symlink(&self, link: impl AsRef<Path>, target: impl AsRef<Path>) {
        let mut files = self.entries();
        let link = resolve_parent(&files, link.as_ref());
        insert_entry(
            &mut files,
            &link,
            MockEntry::Symlink(target.as_ref().to_path_buf()),
        );
    }

    /// Configure the free space reported for `path` and everything below it.
    pub fn set_available_space(&self, path: impl AsRef<Path>, bytes: u64) {
        let mut space = self.space.lock().unwrap_or_else(PoisonError::into_inner);
        space.insert(path.as_ref().to_path_buf(), bytes);
    }

    /// Paths of all entries (files, dirs and links) currently present.
    pub fn paths(&self) -> Vec<PathBuf> {
        let files = self.entries();
        let mut paths: Vec<PathBuf> = files.keys().cloned().collect();
        paths.sort();
        paths
    }
}

fn normalize_parent(parent: &Path) -> &Path {
    if parent.as_os_str().is_empty() {
        Path::new(".")
    } else {
        parent
    }
}

/// Follow symlinks in every component of `path`.
fn resolve(files: &Entries, path: &Path) -> PathBuf {
    let mut resolved = PathBuf::new();
    for component in path.components() {
        resolved.push(component);
        let mut hops = 0;
        while let Some(MockEntry::Symlink(target)) = files.get(&resolved) {
            resolved = target.clone();
            hops += 1;
            if hops > 16 {
                break;
            }
        }
    }
    resolved
}

/// Follow symlinks in every component except the last one.
fn resolve_parent(files: &Entries, path: &Path) -> PathBuf {
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) if !parent.as_os_str().is_empty() => {
            resolve(files, parent).join(name)
        }
        _ => path.to_path_buf(),
    }
}

fn link_into_parent(files: &mut Entries, path: &Path) {
    if let Some(parent) = path.parent() {
        let parent = normalize_parent(parent);
        if parent == path {
            return;
        }
        ensure_dir_entry(files, parent);
        if let Some(MockEntry::Dir(children)) = files.get_mut(parent) {
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                if !children.iter().any(|c| c == name) {
                    children.push(name.to_string());
                }
            }
        }
    }
}

fn insert_entry(files: &mut Entries, path: &Path, entry: MockEntry) {
    files.insert(path.to_path_buf(), entry);
    link_into_parent(files, path);
}

fn ensure_dir_entry(files: &mut Entries, path: &Path) {
    if !files.contains_key(path) {
        files.insert(path.to_path_buf(), MockEntry::Dir(Vec::new()));
        link_into_parent(files, path);
    }
}

fn remove_entry(files: &mut Entries, path: &Path) {
    files.retain(|p, _| !(p == path || p.starts_with(path)));
    if let Some(parent) = path.parent() {
        let parent = normalize_parent(parent);
        if let (Some(MockEntry::Dir(children)), Some(name)) =
            (files.get_mut(parent), path.file_name().and_then(|n| n.to_str()))
        {
            children.retain(|c| c != name);
        }
    }
}

impl FileSystem for MockFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String> {
        let files = self.entries();
        let path = resolve(&files, path);
        match files.get(&path) {
            Some(MockEntry::File(content)) => {
                String::from_utf8(content.clone()).map_err(|e| anyhow!("Invalid UTF-8: {}", e))
            }
            Some(_) => Err(anyhow!("Is a directory: {:?}", path)),
            None => Err(anyhow!("File not found: {:?}", path)),
        }
    }

    fn open_read(&self, path: &Path) -> Result<Box<dyn Read + Send>> {
        let files = self.entries();
        let path = resolve(&files, path);
        match files.get(&path) {
            Some(MockEntry::File(content)) => Ok(Box::new(Cursor::new(content.clone()))),
            Some(_) => Err(anyhow!("Is a directory: {:?}", path)),
            None => Err(anyhow!("File not found: {:?}", path)),
        }
    }

    fn write(&self, path: &Path, contents: &[u8]) -> Result<()> {
        self.add_file(path, contents);
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        let files = self.entries();
        files.contains_key(&resolve(&files, path))
    }

    fn is_file(&self, path: &Path) -> bool {
        let files = self.entries();
        matches!(files.get(&resolve(&files, path)), Some(MockEntry::File(_)))
    }

    fn is_dir(&self, path: &Path) -> bool {
        let files = self.entries();
        matches!(files.get(&resolve(&files, path)), Some(MockEntry::Dir(_)))
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        let mut files = self.entries();
        let path = resolve(&files, path);
        match files.get(&path) {
            Some(MockEntry::File(_)) => Err(anyhow!("File exists: {:?}", path)),
            _ => {
                ensure_dir_entry(&mut files, &path);
                Ok(())
            }
        }
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        let mut files = self.entries();
        let path = resolve_parent(&files, path);
        match files.get(&path) {
            Some(MockEntry::File(_)) | Some(MockEntry::Symlink(_)) => {
                remove_entry(&mut files, &path);
                Ok(())
            }
            Some(MockEntry::Dir(_)) => Err(anyhow!("Is a directory: {:?}", path)),
            None => Err(anyhow!("File not found: {:?}", path)),
        }
    }

    fn remove_dir_all(&self, path: &Path) -> Result<()> {
        let mut files = self.entries();
        let path = resolve(&files, path);
        remove_entry(&mut files, &path);
        Ok(())
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let files = self.entries();
        let resolved = resolve(&files, path);
        match files.get(&resolved) {
            Some(MockEntry::Dir(children)) => {
                let mut entries: Vec<PathBuf> =
                    children.iter().map(|name| path.join(name)).collect();
                entries.sort();
                Ok(entries)
            }
            _ => Err(anyhow!("Not a directory or not found: {:?}", path)),
        }
    }

    fn read_link(&self, path: &Path) -> Result<Option<PathBuf>> {
        let files = self.entries();
        let path = resolve_parent(&files, path);
        match files.get(&path) {
            Some(MockEntry::Symlink(target)) => Ok(Some(target.clone())),
            Some(_) => Err(anyhow!("Not a symlink: {:?}", path)),
            None => Ok(None),
        }
    }

    fn replace_symlink(&self, target: &Path, link: &Path) -> Result<()> {
        let mut files = self.entries();
        let link = resolve_parent(&files, link);
        if let Some(MockEntry::Dir(_) | MockEntry::File(_)) = files.get(&link) {
            return Err(anyhow!("Refusing to replace non-symlink {:?}", link));
        }
        insert_entry(&mut files, &link, MockEntry::Symlink(target.to_path_buf()));
        Ok(())
    }

    fn copy_dir_contents(&self, from: &Path, to: &Path) -> Result<()> {
        let mut files = self.entries();
        let from = resolve(&files, from);
        let to = resolve(&files, to);
        if !matches!(files.get(&from), Some(MockEntry::Dir(_))) {
            return Err(anyhow!("Not a directory or not found: {:?}", from));
        }

        let mut copied: Vec<(PathBuf, MockEntry)> = files
            .iter()
            .filter(|(p, _)| p.starts_with(&from) && **p != from)
            .filter_map(|(p, entry)| {
                let rel = p.strip_prefix(&from).ok()?;
                let entry = match entry {
                    MockEntry::Dir(_) => MockEntry::Dir(Vec::new()),
                    other => other.clone(),
                };
                Some((to.join(rel), entry))
            })
            .collect();
        // Parents before children.
        copied.sort_by(|a, b| a.0.cmp(&b.0));

        ensure_dir_entry(&mut files, &to);
        for (path, entry) in copied {
            match entry {
                MockEntry::Dir(_) => ensure_dir_entry(&mut files, &path),
                other => insert_entry(&mut files, &path, other),
            }
        }
        Ok(())
    }

    fn available_space(&self, path: &Path) -> Result<u64> {
        let space = self.space.lock().unwrap_or_else(PoisonError::into_inner);
        let found = path
            .ancestors()
            .find_map(|ancestor| space.get(ancestor).copied());
        Ok(found.unwrap_or(DEFAULT_AVAILABLE_SPACE))
    }
}
