// src/fs/mod.rs

use std::fmt::Debug;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

pub mod mock;

/// Abstract filesystem interface.
pub trait FileSystem: Send + Sync + Debug {
    fn read_to_string(&self, path: &Path) -> Result<String>;
    fn open_read(&self, path: &Path) -> Result<Box<dyn Read + Send>>;
    fn write(&self, path: &Path, contents: &[u8]) -> Result<()>;
    fn exists(&self, path: &Path) -> bool;
    fn is_file(&self, path: &Path) -> bool;
    fn is_dir(&self, path: &Path) -> bool;
    fn create_dir_all(&self, path: &Path) -> Result<()>;
    fn remove_file(&self, path: &Path) -> Result<()>;
    fn remove_dir_all(&self, path: &Path) -> Result<()>;

    /// Return a list of entries in a directory.
    /// Returns full paths.
    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>>;

    /// Target of the symlink at `path`, or `None` when nothing exists there.
    ///
    /// Fails when `path` exists but is not a symlink.
    fn read_link(&self, path: &Path) -> Result<Option<PathBuf>>;

    /// Point the symlink `link` at `target` in a single step, replacing any
    /// previous symlink.
    fn replace_symlink(&self, target: &Path, link: &Path) -> Result<()>;

    /// Recursively copy the contents of `from` into the existing directory `to`.
    fn copy_dir_contents(&self, from: &Path, to: &Path) -> Result<()>;

    /// Bytes available to an unprivileged writer on the filesystem holding `path`.
    fn available_space(&self, path: &Path) -> Result<u64>;
}

/// Implementation that uses `std::fs`.
#[derive(Debug, Clone, Default)]
pub struct RealFileSystem;

impl FileSystem for RealFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String> {
        fs::read_to_string(path).with_context(|| format!("reading file {:?}", path))
    }

    fn open_read(&self, path: &Path) -> Result<Box<dyn Read + Send>> {
        let file = fs::File::open(path).with_context(|| format!("opening file {:?}", path))?;
        Ok(Box::new(file))
    }

    fn write(&self, path: &Path, contents: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("creating dir {:?}", parent))?;
        }
        let mut file = fs::File::create(path).with_context(|| format!("creating file {:?}", path))?;
        file.write_all(contents).with_context(|| format!("writing to file {:?}", path))?;
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path).with_context(|| format!("creating dir {:?}", path))
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        fs::remove_file(path).with_context(|| format!("removing file {:?}", path))
    }

    fn remove_dir_all(&self, path: &Path) -> Result<()> {
        match fs::remove_dir_all(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("removing dir {:?}", path)),
        }
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(path).with_context(|| format!("reading dir {:?}", path))? {
            let entry = entry?;
            entries.push(entry.path());
        }
        entries.sort();
        Ok(entries)
    }

    fn read_link(&self, path: &Path) -> Result<Option<PathBuf>> {
        match fs::symlink_metadata(path) {
            Ok(_) => {
                let target =
                    fs::read_link(path).with_context(|| format!("reading symlink {:?}", path))?;
                Ok(Some(target))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("inspecting {:?}", path)),
        }
    }

    fn replace_symlink(&self, target: &Path, link: &Path) -> Result<()> {
        let mut staging = link.as_os_str().to_owned();
        staging.push(".new");
        let staging = PathBuf::from(staging);

        if fs::symlink_metadata(&staging).is_ok() {
            fs::remove_file(&staging)
                .with_context(|| format!("removing stale symlink {:?}", staging))?;
        }

        std::os::unix::fs::symlink(target, &staging)
            .with_context(|| format!("creating symlink {:?} -> {:?}", staging, target))?;

        // rename(2) swaps the link in one step.
        fs::rename(&staging, link)
            .with_context(|| format!("moving symlink {:?} over {:?}", staging, link))
    }

    fn copy_dir_contents(&self, from: &Path, to: &Path) -> Result<()> {
        for entry in fs::read_dir(from).with_context(|| format!("reading dir {:?}", from))? {
            let entry = entry?;
            let dest = to.join(entry.file_name());
            let file_type = entry.file_type()?;

            if file_type.is_dir() {
                fs::create_dir_all(&dest).with_context(|| format!("creating dir {:?}", dest))?;
                self.copy_dir_contents(&entry.path(), &dest)?;
            } else {
                fs::copy(entry.path(), &dest)
                    .with_context(|| format!("copying {:?} to {:?}", entry.path(), dest))?;
            }
        }
        Ok(())
    }

    fn available_space(&self, path: &Path) -> Result<u64> {
        fs2::available_space(path).with_context(|| format!("querying free space at {:?}", path))
    }
}
