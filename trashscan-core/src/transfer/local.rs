use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use super::{EntryKind, SourceConnector, SourceEntry, SourceTree};
use crate::error::{PipelineError, Result};

/// Source on a locally mounted filesystem.
#[derive(Clone, Copy, Debug, Default)]
pub struct LocalConnector;

impl LocalConnector {
    pub fn new() -> Self {
        Self
    }
}

impl SourceConnector for LocalConnector {
    fn connect(&self) -> Result<Box<dyn SourceTree>> {
        Ok(Box::new(LocalTree))
    }

    fn describe(&self) -> String {
        "local".to_string()
    }
}

struct LocalTree;

impl SourceTree for LocalTree {
    fn read_dir(&mut self, path: &Path) -> Result<Vec<SourceEntry>> {
        let reader = std::fs::read_dir(path).map_err(|err| PipelineError::io_at(path, err))?;

        let mut entries = Vec::new();
        for entry in reader {
            let entry = entry.map_err(|err| PipelineError::io_at(path, err))?;
            let entry_path = entry.path();
            // Follows symlinks, so a linked session folder is treated as a folder.
            let md = match std::fs::metadata(&entry_path) {
                Ok(md) => md,
                Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
                Err(err) => return Err(PipelineError::io_at(&entry_path, err)),
            };
            let kind = if md.is_dir() {
                EntryKind::Dir
            } else if md.is_file() {
                EntryKind::File
            } else {
                EntryKind::Other
            };
            entries.push(SourceEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                path: entry_path,
                kind,
                len: md.len(),
                modified: md.modified().ok(),
            });
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn read_into(&mut self, path: &Path, writer: &mut dyn Write) -> Result<u64> {
        let mut file = File::open(path).map_err(|err| PipelineError::io_at(path, err))?;
        io::copy(&mut file, writer).map_err(|err| PipelineError::io_at(path, err))
    }
}
