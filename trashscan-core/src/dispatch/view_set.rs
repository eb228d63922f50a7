use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{PipelineError, Result};
use crate::transfer::is_partial;
use crate::viewpoint::{Viewpoint, ViewpointSet};

/// Exactly one image per required viewpoint, in viewpoint order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ViewSet {
    folder: PathBuf,
    name: String,
    images: Vec<(Viewpoint, PathBuf)>,
}

/// Why a folder did not yield a [`ViewSet`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IncompleteViewSet {
    /// Viewpoints with no matching file.
    pub missing: Vec<String>,
    /// Viewpoints matched by more than one file.
    pub ambiguous: Vec<String>,
}

impl fmt::Display for IncompleteViewSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "missing [{}], ambiguous [{}]",
            self.missing.join(", "),
            self.ambiguous.join(", ")
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ViewSetScan {
    Complete(ViewSet),
    Incomplete(IncompleteViewSet),
}

impl ViewSet {
    /// Match the files directly inside `folder` against `views`.
    ///
    /// Subdirectories and in-flight partial files are ignored. A viewpoint
    /// matched by zero or several files voids the whole set.
    pub fn scan(folder: &Path, views: &ViewpointSet) -> Result<ViewSetScan> {
        let name = folder
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                PipelineError::Internal(format!("{} has no folder name", folder.display()))
            })?;

        let mut files = Vec::new();
        for entry in std::fs::read_dir(folder).map_err(|err| PipelineError::io_at(folder, err))? {
            let entry = entry.map_err(|err| PipelineError::io_at(folder, err))?;
            let is_file = entry
                .file_type()
                .map_err(|err| PipelineError::io_at(entry.path(), err))?
                .is_file();
            if is_file && !is_partial(&entry.file_name().to_string_lossy()) {
                files.push(entry.path());
            }
        }
        files.sort();

        let mut images = Vec::with_capacity(views.len());
        let mut incomplete = IncompleteViewSet::default();
        for view in views {
            let mut matches = files.iter().filter(|path| view.matches_file(path));
            match (matches.next(), matches.next()) {
                (Some(path), None) => images.push((view.clone(), path.clone())),
                (None, _) => incomplete.missing.push(view.name.clone()),
                (Some(_), Some(_)) => incomplete.ambiguous.push(view.name.clone()),
            }
        }

        if incomplete.missing.is_empty() && incomplete.ambiguous.is_empty() {
            Ok(ViewSetScan::Complete(ViewSet {
                folder: folder.to_path_buf(),
                name,
                images,
            }))
        } else {
            Ok(ViewSetScan::Incomplete(incomplete))
        }
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    /// Folder name; the render output is named after it.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn images(&self) -> impl Iterator<Item = (&Viewpoint, &Path)> {
        self.images.iter().map(|(view, path)| (view, path.as_path()))
    }

    pub fn image_for(&self, view: &str) -> Option<&Path> {
        self.images
            .iter()
            .find(|(v, _)| v.name == view)
            .map(|(_, path)| path.as_path())
    }
}

/// Canonical engine-side file name for one viewpoint, keeping the source extension.
pub fn canonical_input_name(view: &Viewpoint, source: &Path) -> String {
    match source.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if !ext.is_empty() => format!("{}.{ext}", view.name),
        _ => format!("{}.png", view.name),
    }
}
