//! Dump and load of the registry to a snapshot directory.
//!
//! The directory holds one file per filter (see [`super::naming`]) containing
//! the filter's binary encoding. Files are staged as dot-files, `fsync`ed and
//! renamed into place, so a crash leaves either the previous or the new
//! snapshot of each filter, never a torn one.

use super::naming;
use crate::server::registry::Registry;
use core::time::Duration;
use cuckoo_tonic_core::{Error, Result, types::Filter};
use std::{
    collections::HashSet,
    io,
    path::{Path, PathBuf},
    sync::Arc,
    time::Instant,
};
use tokio::{fs, io::AsyncWriteExt, sync::Mutex};

/// Summary of a completed dump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DumpReport {
    /// Snapshot files written in this pass.
    pub written: usize,
    /// Files of deleted filters (and stale staging files) removed afterwards.
    pub removed: usize,
    pub elapsed: Duration,
}

/// Persists and restores the registry.
///
/// Dumps are serialized: a second call waits for the first to finish.
#[derive(Debug)]
pub struct SnapshotManager {
    registry: Arc<Registry>,
    dir: PathBuf,
    dump_lock: Mutex<()>,
}

impl SnapshotManager {
    pub fn new(registry: Arc<Registry>, dir: impl Into<PathBuf>) -> Self {
        Self {
            registry,
            dir: dir.into(),
            dump_lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Writes every registered filter to the snapshot directory.
    ///
    /// The directory is created if missing. Filters are copied out of the
    /// registry at the start of the pass and each one is encoded under its
    /// read lock. The first failing file aborts the pass; files written before
    /// it stay in place and nothing is pruned. After a complete pass, files of
    /// filters that no longer exist are removed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] when the directory cannot be created, listed or
    /// synced, or when a snapshot cannot be written.
    pub async fn dump(&self) -> Result<DumpReport> {
        let _guard = self.dump_lock.lock().await;
        let start = Instant::now();

        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| Error::io(format!("creating {}", self.dir.display()), e))?;

        let entries = self.registry.snapshot();
        let mut kept = HashSet::with_capacity(entries.len());

        for (name, entry) in entries {
            let bytes = entry.read().encode();
            let file_name = naming::to_file_name(&name);
            self.write_atomic(&file_name, &bytes).await?;
            kept.insert(file_name);
        }

        sync_dir(&self.dir).await?;
        let removed = self.prune(&kept).await?;

        Ok(DumpReport {
            written: kept.len(),
            removed,
            elapsed: start.elapsed(),
        })
    }

    /// Populates the registry from the snapshot directory.
    ///
    /// A missing directory is an empty snapshot. Dot-files (staging files)
    /// and anything that is not a regular file are ignored. Every file is
    /// decoded before the registry is touched, so a failure leaves the
    /// registry exactly as it was.
    ///
    /// Returns the number of filters loaded.
    ///
    /// # Errors
    ///
    /// - [`Error::Io`] if the directory or a file cannot be read.
    /// - [`Error::InvalidSnapshotName`] if a file name cannot be decoded.
    /// - [`Error::Decode`] if a file is not a valid filter encoding.
    pub async fn load(&self) -> Result<usize> {
        let mut dir = match fs::read_dir(&self.dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(Error::io(format!("reading {}", self.dir.display()), e)),
        };

        let mut filters = Vec::new();
        while let Some(dirent) = dir
            .next_entry()
            .await
            .map_err(|e| Error::io(format!("listing {}", self.dir.display()), e))?
        {
            let raw_name = dirent.file_name();
            let Some(file_name) = raw_name.to_str() else {
                return Err(Error::InvalidSnapshotName {
                    file_name: raw_name.to_string_lossy().into_owned(),
                });
            };
            if file_name.starts_with('.') {
                continue;
            }

            let path = dirent.path();
            let file_type = dirent
                .file_type()
                .await
                .map_err(|e| Error::io(format!("inspecting {}", path.display()), e))?;
            if !file_type.is_file() {
                continue;
            }

            let name = naming::from_file_name(file_name)?;
            let bytes = fs::read(&path)
                .await
                .map_err(|e| Error::io(format!("reading {}", path.display()), e))?;
            let filter = Filter::decode(&bytes).map_err(|source| Error::Decode {
                name: name.clone(),
                source,
            })?;

            tracing::debug!(filter = %name, count = filter.count(), "Decoded snapshot");
            filters.push((name, filter));
        }

        let loaded = filters.len();
        self.registry.restore(filters);
        Ok(loaded)
    }

    /// Stages `bytes` in a dot-file, syncs it and renames it over `file_name`.
    async fn write_atomic(&self, file_name: &str, bytes: &[u8]) -> Result<()> {
        let path = self.dir.join(file_name);
        let temp = self.dir.join(naming::temp_file_name(file_name));

        if let Err(e) = write_synced(&temp, bytes).await {
            // Best effort; a leftover staging file is pruned by the next pass.
            let _ = fs::remove_file(&temp).await;
            return Err(Error::io(format!("writing {}", temp.display()), e));
        }

        fs::rename(&temp, &path)
            .await
            .map_err(|e| Error::io(format!("renaming into {}", path.display()), e))
    }

    /// Removes snapshot files missing from `kept` and leftover staging files.
    async fn prune(&self, kept: &HashSet<String>) -> Result<usize> {
        let mut dir = fs::read_dir(&self.dir)
            .await
            .map_err(|e| Error::io(format!("reading {}", self.dir.display()), e))?;

        let mut removed = 0;
        while let Some(dirent) = dir
            .next_entry()
            .await
            .map_err(|e| Error::io(format!("listing {}", self.dir.display()), e))?
        {
            let raw_name = dirent.file_name();
            // Names the dump never produces are not ours to delete.
            let Some(file_name) = raw_name.to_str() else {
                continue;
            };

            let stale = if file_name.starts_with('.') {
                naming::is_temp_file(file_name)
            } else {
                !kept.contains(file_name) && naming::from_file_name(file_name).is_ok()
            };
            if !stale {
                continue;
            }

            let is_file = dirent
                .file_type()
                .await
                .map(|file_type| file_type.is_file())
                .unwrap_or(false);
            if !is_file {
                continue;
            }

            let path = dirent.path();
            match fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(Error::io(format!("removing {}", path.display()), e)),
            }
        }

        Ok(removed)
    }
}

async fn write_synced(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = fs::File::create(path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await
}

/// Persists directory entries (the renames) on Unix.
#[cfg(unix)]
async fn sync_dir(dir: &Path) -> Result<()> {
    let handle = fs::File::open(dir)
        .await
        .map_err(|e| Error::io(format!("opening {}", dir.display()), e))?;
    handle
        .sync_all()
        .await
        .map_err(|e| Error::io(format!("syncing {}", dir.display()), e))
}

#[cfg(not(unix))]
async fn sync_dir(_dir: &Path) -> Result<()> {
    Ok(())
}
