use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("IO error at {path}: {source}")]
    IoAt {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Image encoding error: {0}")]
    Image(#[from] image::ImageError),

    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Watcher error: {0}")]
    Watch(#[from] notify::Error),

    #[error("Render engine rejected job ({status}): {body}")]
    Dispatch { status: u16, body: String },

    #[error("Malformed job template: {0}")]
    Template(String),

    #[error("Source connection failed: {0}")]
    Connection(String),

    #[error("Frame acquisition failed: {0}")]
    Acquisition(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// The source went away; the rest of the pass cannot succeed either.
    pub fn is_connection(&self) -> bool {
        matches!(self, PipelineError::Connection(_))
    }

    pub(crate) fn io_at(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PipelineError::IoAt {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
