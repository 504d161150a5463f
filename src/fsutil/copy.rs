//! Transactional copies into a live working tree.
//!
//! [`copy_into_dir`] records every directory it creates and every file it
//! creates or replaces. If any step fails, everything done so far is undone
//! before the error is returned. On success the caller gets a [`Reversal`]
//! that undoes exactly those changes when invoked.
//!
//! File contents are always written to a temp file in the destination
//! directory and renamed into place, so a destination file is observed either
//! fully old or fully new.

use std::fs::{self, DirBuilder, File, Permissions};
use std::io;
use std::os::unix::fs::{DirBuilderExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tempfile::Builder;
use tracing::{debug, warn};
use walkdir::WalkDir;

use super::path::clean;
use crate::error::CopyError;

/// Mode for every directory created by a copy, regardless of the source.
const DIR_MODE: u32 = 0o755;

const COPY_PREFIX: &str = ".fsutil-copy-";
const BACKUP_PREFIX: &str = ".fsutil-backup-";
const UNDO_PREFIX: &str = ".fsutil-undo-";

/// Copies `src` (a file or a directory tree) into `dst_dir`.
///
/// `dst_dir` and any missing parents are created. A directory source has its
/// contents copied with relative structure and file modes preserved; a file
/// source lands at `dst_dir/<basename>`. With `overwrite == false` an existing
/// destination file is an error; otherwise it is backed up and replaced.
///
/// On error the filesystem is left as it was found.
pub fn copy_into_dir(src: &Path, dst_dir: &Path, overwrite: bool) -> Result<Reversal, CopyError> {
    let src_meta = fs::metadata(src).map_err(|e| CopyError::io(src, e))?;

    let mut txn = CopyTxn::new(overwrite);
    match txn.apply(src, &src_meta, dst_dir) {
        Ok(()) => {
            debug!(
                src = %src.display(),
                dst = %dst_dir.display(),
                created_dirs = txn.log.created_dirs.len(),
                created_files = txn.log.created_files.len(),
                overwritten = txn.log.overwritten.len(),
                "Copy committed"
            );
            Ok(txn.commit())
        }
        Err(err) => {
            warn!(src = %src.display(), dst = %dst_dir.display(), error = %err, "Copy failed, rolling back");
            txn.rollback();
            Err(err)
        }
    }
}

/// One-shot undo of a committed copy.
///
/// Invoking [`Reversal::revert`] more than once is a no-op. Reverting never
/// fails: cleanup errors are logged and skipped. Dropping a `Reversal`
/// without reverting keeps the copied files and their backups in place;
/// [`Reversal::keep`] keeps the files and deletes the backups.
#[must_use = "call revert(), guard() or keep() on a Reversal"]
#[derive(Debug, Default)]
pub struct Reversal {
    logs: Mutex<Vec<UndoLog>>,
}

impl Reversal {
    /// A reversal with nothing to undo.
    pub fn noop() -> Self {
        Self::default()
    }

    /// Combines reversals so that they are undone last-first.
    pub fn chain(parts: impl IntoIterator<Item = Reversal>) -> Self {
        let logs = parts
            .into_iter()
            .flat_map(|part| part.take_logs())
            .collect();
        Self {
            logs: Mutex::new(logs),
        }
    }

    /// Undoes the recorded changes. Safe to call any number of times.
    pub fn revert(&self) {
        let logs = self.take_logs();
        for log in logs.into_iter().rev() {
            log.undo();
        }
    }

    /// Makes the copy permanent: backups of overwritten files are deleted and
    /// nothing is left to undo.
    pub fn keep(self) {
        for log in self.take_logs() {
            log.discard_backups();
        }
    }

    /// Returns true when there is nothing (left) to undo.
    pub fn is_empty(&self) -> bool {
        self.lock().iter().all(UndoLog::is_empty)
    }

    /// Wraps this reversal so that it runs when the guard goes out of scope.
    pub fn guard(self) -> RevertOnDrop {
        RevertOnDrop(self)
    }

    fn take_logs(&self) -> Vec<UndoLog> {
        std::mem::take(&mut *self.lock())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<UndoLog>> {
        self.logs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Reverts the wrapped [`Reversal`] on drop, including during unwinding.
#[derive(Debug)]
pub struct RevertOnDrop(Reversal);

impl RevertOnDrop {
    /// Reverts now instead of at the end of scope.
    pub fn revert(self) {
        drop(self);
    }
}

impl Drop for RevertOnDrop {
    fn drop(&mut self) {
        self.0.revert();
    }
}

#[derive(Debug, Clone)]
struct OverwrittenFile {
    path: PathBuf,
    backup: PathBuf,
    mode: u32,
}

/// Changes made by one copy, in the order they happened.
#[derive(Debug, Default)]
struct UndoLog {
    created_dirs: Vec<PathBuf>,
    created_files: Vec<PathBuf>,
    overwritten: Vec<OverwrittenFile>,
}

impl UndoLog {
    fn is_empty(&self) -> bool {
        self.created_dirs.is_empty() && self.created_files.is_empty() && self.overwritten.is_empty()
    }

    fn discard_backups(self) {
        for entry in &self.overwritten {
            if let Err(e) = fs::remove_file(&entry.backup) {
                warn!(backup = %entry.backup.display(), error = %e, "Failed to remove backup");
            }
        }
    }

    /// Restores overwritten files, then removes created files, then created
    /// directories, each newest first.
    fn undo(self) {
        for entry in self.overwritten.iter().rev() {
            match restore_file(entry) {
                Ok(()) => {
                    if let Err(e) = fs::remove_file(&entry.backup) {
                        debug!(backup = %entry.backup.display(), error = %e, "Failed to remove backup");
                    }
                }
                Err(e) => {
                    warn!(
                        path = %entry.path.display(),
                        backup = %entry.backup.display(),
                        error = %e,
                        "Failed to restore file, keeping backup"
                    );
                }
            }
        }
        for path in self.created_files.iter().rev() {
            if let Err(e) = fs::remove_file(path) {
                debug!(path = %path.display(), error = %e, "Failed to remove created file");
            }
        }
        for dir in self.created_dirs.iter().rev() {
            // Left in place when something else now lives in it.
            if let Err(e) = fs::remove_dir(dir) {
                debug!(dir = %dir.display(), error = %e, "Failed to remove created directory");
            }
        }
    }
}

struct CopyTxn {
    overwrite: bool,
    log: UndoLog,
}

impl CopyTxn {
    fn new(overwrite: bool) -> Self {
        Self {
            overwrite,
            log: UndoLog::default(),
        }
    }

    fn apply(&mut self, src: &Path, src_meta: &fs::Metadata, dst_dir: &Path) -> Result<(), CopyError> {
        self.ensure_dir(dst_dir)?;

        let dst_meta = fs::metadata(dst_dir).map_err(|e| CopyError::io(dst_dir, e))?;
        if !dst_meta.is_dir() {
            return Err(CopyError::NotADirectory(dst_dir.to_path_buf()));
        }

        if src_meta.is_dir() {
            self.copy_dir_contents(src, dst_dir)
        } else {
            let name = src.file_name().ok_or_else(|| {
                CopyError::io(
                    src,
                    io::Error::new(io::ErrorKind::InvalidInput, "source has no file name"),
                )
            })?;
            self.copy_file(src, &dst_dir.join(name), src_meta.permissions().mode())
        }
    }

    fn copy_dir_contents(&mut self, src_dir: &Path, dst_dir: &Path) -> Result<(), CopyError> {
        for entry in WalkDir::new(src_dir).min_depth(1).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(src_dir).to_path_buf();
                CopyError::io(path, io::Error::from(e))
            })?;
            let rel = entry
                .path()
                .strip_prefix(src_dir)
                .map_err(|e| CopyError::io(entry.path(), io::Error::other(e)))?;
            let target = dst_dir.join(rel);

            if entry.file_type().is_dir() {
                self.ensure_dir(&target)?;
                continue;
            }

            let meta = fs::metadata(entry.path()).map_err(|e| CopyError::io(entry.path(), e))?;
            if meta.is_dir() {
                debug!(path = %entry.path().display(), "Skipping symlinked directory");
                continue;
            }
            self.copy_file(entry.path(), &target, meta.permissions().mode())?;
        }
        Ok(())
    }

    fn ensure_dir(&mut self, path: &Path) -> Result<(), CopyError> {
        let created = tracked_mkdir_all(path, DIR_MODE)?;
        self.log.created_dirs.extend(created);
        Ok(())
    }

    fn copy_file(&mut self, src: &Path, dst: &Path, mode: u32) -> Result<(), CopyError> {
        let parent = parent_or_cwd(dst);
        self.ensure_dir(parent)?;

        let existing_mode = match fs::metadata(dst) {
            Ok(meta) if meta.is_dir() => {
                return Err(CopyError::DestinationIsDirectory(dst.to_path_buf()))
            }
            Ok(_) if !self.overwrite => return Err(CopyError::AlreadyExists(dst.to_path_buf())),
            Ok(meta) => Some(meta.permissions().mode()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => return Err(CopyError::io(dst, e)),
        };

        // Dropping `tmp` on any early return removes it.
        let mut tmp = Builder::new()
            .prefix(COPY_PREFIX)
            .tempfile_in(parent)
            .map_err(|e| CopyError::io(parent, e))?;
        tmp.as_file()
            .set_permissions(Permissions::from_mode(mode & 0o7777))
            .map_err(|e| CopyError::io(tmp.path(), e))?;
        let mut reader = File::open(src).map_err(|e| CopyError::io(src, e))?;
        io::copy(&mut reader, tmp.as_file_mut()).map_err(|e| CopyError::io(src, e))?;
        tmp.as_file()
            .sync_all()
            .map_err(|e| CopyError::io(tmp.path(), e))?;

        // Record before the rename so a failed rename is still undone.
        match existing_mode {
            Some(mode) => {
                let backup = create_backup(dst)?;
                self.log.overwritten.push(OverwrittenFile {
                    path: dst.to_path_buf(),
                    backup,
                    mode,
                });
            }
            None => self.log.created_files.push(dst.to_path_buf()),
        }

        tmp.persist(dst).map_err(|e| CopyError::io(dst, e.error))?;
        Ok(())
    }

    fn rollback(&mut self) {
        std::mem::take(&mut self.log).undo();
    }

    fn commit(self) -> Reversal {
        Reversal {
            logs: Mutex::new(vec![self.log]),
        }
    }
}

fn parent_or_cwd(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

/// Snapshots `path` byte for byte into a hidden sibling file.
fn create_backup(path: &Path) -> Result<PathBuf, CopyError> {
    let parent = parent_or_cwd(path);
    let mut tmp = Builder::new()
        .prefix(BACKUP_PREFIX)
        .tempfile_in(parent)
        .map_err(|e| CopyError::io(parent, e))?;
    let mut src = File::open(path).map_err(|e| CopyError::io(path, e))?;
    io::copy(&mut src, tmp.as_file_mut()).map_err(|e| CopyError::io(path, e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| CopyError::io(tmp.path(), e))?;
    tmp.into_temp_path()
        .keep()
        .map_err(|e| CopyError::io(path, e.error))
}

fn restore_file(entry: &OverwrittenFile) -> io::Result<()> {
    let parent = parent_or_cwd(&entry.path);
    let mut tmp = Builder::new().prefix(UNDO_PREFIX).tempfile_in(parent)?;
    let mut backup = File::open(&entry.backup)?;
    io::copy(&mut backup, tmp.as_file_mut())?;
    tmp.as_file()
        .set_permissions(Permissions::from_mode(entry.mode & 0o7777))?;
    tmp.as_file().sync_all()?;
    tmp.persist(&entry.path).map_err(|e| e.error)?;
    Ok(())
}

/// Creates `path` and any missing parents, returning the directories that
/// were actually created, outermost first.
///
/// Nothing is created when some existing component is not a directory.
fn tracked_mkdir_all(path: &Path, mode: u32) -> Result<Vec<PathBuf>, CopyError> {
    let cleaned = clean(path);
    if cleaned == Path::new(".") {
        return Ok(Vec::new());
    }

    let mut missing = Vec::new();
    let mut current = cleaned.as_path();
    loop {
        match fs::metadata(current) {
            Ok(meta) if meta.is_dir() => break,
            Ok(_) => return Err(CopyError::NotADirectory(current.to_path_buf())),
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::NotFound | io::ErrorKind::NotADirectory
                ) =>
            {
                missing.push(current.to_path_buf());
                match current.parent() {
                    Some(parent) if !parent.as_os_str().is_empty() => current = parent,
                    _ => break,
                }
            }
            Err(e) => return Err(CopyError::io(current, e)),
        }
    }

    let mut created: Vec<PathBuf> = Vec::with_capacity(missing.len());
    for dir in missing.iter().rev() {
        match DirBuilder::new().mode(mode).create(dir) {
            Ok(()) => created.push(dir.clone()),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => {
                for done in created.iter().rev() {
                    let _ = fs::remove_dir(done);
                }
                return Err(CopyError::io(dir, e));
            }
        }
    }
    Ok(created)
}
