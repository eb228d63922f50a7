//! Completeness-gated, additive directory transfer.
//!
//! There is no ledger: a file counts as transferred exactly when it exists at
//! the destination. Each pass therefore only ever adds files, never
//! overwrites or deletes, and can be re-run at any time. A consequence is that
//! a source file replaced under the same name is never picked up again.
//!
//! Two modes share the same copy primitive:
//!
//! - [`Transfer::sync_complete`]: only children of the source root holding
//!   exactly the expected number of files are copied (input leg).
//! - [`Transfer::mirror`]: the whole tree is mirrored (output leg).
//!
//! Copies land in a temporary file next to the destination and are persisted
//! without clobbering, with the source modification time applied first.
//!
//! Only a lost connection or an unreadable source root ends a pass early. A
//! folder or file that fails is logged, recorded on the [`TransferReport`]
//! and retried on the next pass while the rest of the tree carries on.

use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use tracing::{debug, info, warn};

use crate::config::SourceConfig;
use crate::error::{PipelineError, Result};

pub mod local;
pub mod poller;
#[cfg(feature = "sftp")]
pub mod sftp;

pub use local::LocalConnector;
pub use poller::{PassKind, TransferPoller};
#[cfg(feature = "sftp")]
pub use sftp::SftpConnector;

/// Prefix of in-flight files. Entries carrying it are invisible to transfer
/// and view-set validation until they are renamed into place.
pub const PARTIAL_PREFIX: &str = ".trashscan-";

/// True for temporary files still being written.
pub fn is_partial(name: &str) -> bool {
    name.starts_with(PARTIAL_PREFIX)
}

/// Create a temporary file in `dir` that [`is_partial`] recognises.
pub fn partial_file_in(dir: &Path) -> Result<tempfile::NamedTempFile> {
    tempfile::Builder::new()
        .prefix(PARTIAL_PREFIX)
        .suffix(".part")
        .tempfile_in(dir)
        .map_err(|err| PipelineError::io_at(dir, err))
}

/// Build the connector and source root described by `source`.
pub fn connector_for(source: &SourceConfig) -> Result<(Arc<dyn SourceConnector>, PathBuf)> {
    match source {
        SourceConfig::Local { root } => Ok((Arc::new(LocalConnector::new()), root.clone())),
        #[cfg(feature = "sftp")]
        SourceConfig::Sftp {
            host,
            port,
            username,
            password,
            root,
        } => Ok((
            Arc::new(SftpConnector::new(
                host.clone(),
                *port,
                username.clone(),
                password.clone(),
            )),
            root.clone(),
        )),
        #[cfg(not(feature = "sftp"))]
        SourceConfig::Sftp { .. } => Err(PipelineError::Config(
            "sftp source requires the `sftp` feature".into(),
        )),
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
    Other,
}

/// One directory entry on the source side.
#[derive(Clone, Debug)]
pub struct SourceEntry {
    pub name: String,
    pub path: PathBuf,
    pub kind: EntryKind,
    pub len: u64,
    pub modified: Option<SystemTime>,
}

/// An open connection to a source filesystem.
pub trait SourceTree: Send {
    /// Entries directly inside `path`, sorted by name.
    fn read_dir(&mut self, path: &Path) -> Result<Vec<SourceEntry>>;

    /// Stream the file at `path` into `writer`, returning the byte count.
    fn read_into(&mut self, path: &Path, writer: &mut dyn Write) -> Result<u64>;
}

/// Opens a [`SourceTree`] for one pass.
pub trait SourceConnector: Send + Sync {
    fn connect(&self) -> Result<Box<dyn SourceTree>>;

    fn describe(&self) -> String;
}

/// What a single pass did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TransferReport {
    /// Candidate folders inspected (sync mode only).
    pub folders_seen: usize,
    /// Folders skipped because their file count did not match.
    pub folders_incomplete: Vec<String>,
    /// Destination paths written during this pass.
    pub copied: Vec<PathBuf>,
    /// Source files already present at the destination.
    pub files_present: usize,
    pub bytes_copied: u64,
    /// Complete folders that could not be transferred this pass.
    pub folders_failed: Vec<String>,
    /// Source entries that could not be copied this pass.
    pub failed: Vec<PathBuf>,
}

impl TransferReport {
    pub fn files_copied(&self) -> usize {
        self.copied.len()
    }

    pub fn is_noop(&self) -> bool {
        self.copied.is_empty()
    }

    pub fn has_failures(&self) -> bool {
        !self.folders_failed.is_empty() || !self.failed.is_empty()
    }
}

pub struct Transfer {
    connector: Arc<dyn SourceConnector>,
    source_root: PathBuf,
    dest_root: PathBuf,
}

impl Transfer {
    pub fn new(
        connector: Arc<dyn SourceConnector>,
        source_root: impl Into<PathBuf>,
        dest_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            connector,
            source_root: source_root.into(),
            dest_root: dest_root.into(),
        }
    }

    pub fn source_root(&self) -> &Path {
        &self.source_root
    }

    pub fn dest_root(&self) -> &Path {
        &self.dest_root
    }

    /// Copy every child folder of the source root that holds exactly
    /// `expected_files` files directly inside it.
    pub fn sync_complete(&self, expected_files: usize) -> Result<TransferReport> {
        let mut tree = self.connector.connect()?;
        let mut report = TransferReport::default();

        let children = tree.read_dir(&self.source_root)?;
        for child in children {
            if child.kind != EntryKind::Dir || is_partial(&child.name) {
                continue;
            }
            report.folders_seen += 1;

            let synced = self.sync_folder(tree.as_mut(), &child, expected_files, &mut report);
            if let Err(err) = synced {
                if err.is_connection() {
                    return Err(err);
                }
                warn!(
                    folder = %child.name,
                    error = %err,
                    "folder transfer failed; retrying next pass"
                );
                report.folders_failed.push(child.name);
            }
        }

        self.log_pass("sync", &report);
        Ok(report)
    }

    fn sync_folder(
        &self,
        tree: &mut dyn SourceTree,
        child: &SourceEntry,
        expected_files: usize,
        report: &mut TransferReport,
    ) -> Result<()> {
        let entries = tree.read_dir(&child.path)?;
        let file_count = entries
            .iter()
            .filter(|entry| entry.kind == EntryKind::File && !is_partial(&entry.name))
            .count();

        if file_count != expected_files {
            debug!(
                folder = %child.name,
                file_count,
                expected_files,
                "folder incomplete; skipped this pass"
            );
            report.folders_incomplete.push(child.name.clone());
            return Ok(());
        }

        copy_tree(tree, entries, &self.dest_root.join(&child.name), report)
    }

    /// Mirror the whole source tree into the destination, additive only.
    pub fn mirror(&self) -> Result<TransferReport> {
        let mut tree = self.connector.connect()?;
        let mut report = TransferReport::default();

        let entries = tree.read_dir(&self.source_root)?;
        copy_tree(tree.as_mut(), entries, &self.dest_root, &mut report)?;

        self.log_pass("mirror", &report);
        Ok(report)
    }

    fn log_pass(&self, mode: &str, report: &TransferReport) {
        if report.has_failures() {
            warn!(
                mode,
                source = %self.source_root.display(),
                folders_failed = report.folders_failed.len(),
                files_failed = report.failed.len(),
                copied = report.files_copied(),
                "transfer pass finished with failures"
            );
        } else if report.is_noop() {
            debug!(
                mode,
                source = %self.source_root.display(),
                present = report.files_present,
                incomplete = report.folders_incomplete.len(),
                "transfer pass: nothing new"
            );
        } else {
            info!(
                mode,
                source = %self.source_root.display(),
                dest = %self.dest_root.display(),
                copied = report.files_copied(),
                bytes = report.bytes_copied,
                "transfer pass copied files"
            );
        }
    }
}

impl fmt::Debug for Transfer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transfer")
            .field("connector", &self.connector.describe())
            .field("source_root", &self.source_root)
            .field("dest_root", &self.dest_root)
            .finish()
    }
}

fn copy_tree(
    tree: &mut dyn SourceTree,
    entries: Vec<SourceEntry>,
    dest_dir: &Path,
    report: &mut TransferReport,
) -> Result<()> {
    std::fs::create_dir_all(dest_dir).map_err(|err| PipelineError::io_at(dest_dir, err))?;

    for entry in entries {
        if is_partial(&entry.name) {
            continue;
        }
        let dest = dest_dir.join(&entry.name);
        let copied = match entry.kind {
            EntryKind::File => copy_if_absent(tree, &entry, &dest, report),
            EntryKind::Dir => match tree.read_dir(&entry.path) {
                Ok(children) => copy_tree(tree, children, &dest, report),
                Err(err) => Err(err),
            },
            EntryKind::Other => {
                debug!(path = %entry.path.display(), "skipping non-regular entry");
                Ok(())
            }
        };

        if let Err(err) = copied {
            if err.is_connection() {
                return Err(err);
            }
            warn!(path = %entry.path.display(), error = %err, "copy failed; retrying next pass");
            report.failed.push(entry.path);
        }
    }

    Ok(())
}

fn copy_if_absent(
    tree: &mut dyn SourceTree,
    entry: &SourceEntry,
    dest: &Path,
    report: &mut TransferReport,
) -> Result<()> {
    if dest
        .try_exists()
        .map_err(|err| PipelineError::io_at(dest, err))?
    {
        report.files_present += 1;
        return Ok(());
    }

    let dir = dest
        .parent()
        .ok_or_else(|| PipelineError::Internal(format!("{} has no parent", dest.display())))?;
    let mut partial = partial_file_in(dir)?;
    let bytes = tree.read_into(&entry.path, partial.as_file_mut())?;

    if let Some(modified) = entry.modified {
        partial
            .as_file()
            .set_modified(modified)
            .map_err(|err| PipelineError::io_at(partial.path(), err))?;
    }

    match partial.persist_noclobber(dest) {
        Ok(_) => {
            debug!(src = %entry.path.display(), dest = %dest.display(), bytes, "copied");
            report.bytes_copied += bytes;
            report.copied.push(dest.to_path_buf());
        }
        // Another writer got there first; existence is all that counts.
        Err(err) if err.error.kind() == std::io::ErrorKind::AlreadyExists => {
            report.files_present += 1;
        }
        Err(err) => return Err(PipelineError::io_at(dest, err.error)),
    }

    Ok(())
}
