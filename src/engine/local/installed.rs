// src/engine/local/installed.rs

//! Installed-package database: one TOML file listing every installed item.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::engine::pool::PoolItem;
use crate::engine::{EngineError, EngineResult};
use crate::fs::FileSystem;

use super::record::{ItemRecord, RecordFile};

/// Marker file held by another process writing the database.
pub fn lock_path(db: &Path) -> PathBuf {
    let mut lock = db.as_os_str().to_owned();
    lock.push(".lock");
    PathBuf::from(lock)
}

/// Read all installed items. A missing database is an empty system.
pub fn read(fs: &dyn FileSystem, db: &Path) -> EngineResult<Vec<PoolItem>> {
    if fs.exists(&lock_path(db)) {
        return Err(EngineError::Locked(format!(
            "{} is held by another process",
            db.display()
        )));
    }

    if !fs.exists(db) {
        debug!(db = %db.display(), "installed database missing; treating as empty");
        return Ok(Vec::new());
    }

    let contents = fs
        .read_to_string(db)
        .map_err(|e| EngineError::BrokenDatabase(format!("{e:#}")))?;
    let file: RecordFile = toml::from_str(&contents)
        .map_err(|e| EngineError::BrokenDatabase(format!("{}: {}", db.display(), e)))?;

    Ok(file
        .items
        .into_iter()
        .map(|record| record.into_item("", true))
        .collect())
}

pub fn write<'a>(
    fs: &dyn FileSystem,
    db: &Path,
    items: impl IntoIterator<Item = &'a PoolItem>,
) -> EngineResult<()> {
    let file = RecordFile {
        cookie: None,
        items: items.into_iter().map(ItemRecord::from_item).collect(),
    };
    let contents = toml::to_string(&file)
        .map_err(|e| EngineError::Internal(format!("serialising installed database: {e}")))?;
    fs.write(db, contents.as_bytes())?;
    Ok(())
}
