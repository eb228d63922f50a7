//! Output mirror loop: engine output directory -> stable object directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::{DispatchConfig, MirrorConfig};
use crate::error::{PipelineError, Result};
use crate::transfer::{LocalConnector, PassKind, Transfer, TransferPoller, TransferReport};

/// Periodic, additive, non-deleting mirror of produced artifacts.
#[derive(Clone, Debug)]
pub struct OutputMirror {
    poller: TransferPoller,
}

impl OutputMirror {
    pub fn new(source_dir: impl Into<PathBuf>, config: &MirrorConfig) -> Self {
        let transfer = Transfer::new(
            Arc::new(LocalConnector::new()),
            source_dir,
            &config.dest_dir,
        );
        let poller =
            TransferPoller::new("mirror", transfer, PassKind::Mirror, config.poll_interval());
        Self { poller }
    }

    /// Mirror from `config.source_dir`, or the engine's output folder when unset.
    pub fn from_config(config: &MirrorConfig, dispatch: &DispatchConfig) -> Self {
        let source = config
            .source_dir
            .clone()
            .unwrap_or_else(|| dispatch.engine_output_dir());
        Self::new(source, config)
    }

    pub fn source_dir(&self) -> &Path {
        self.poller.transfer().source_root()
    }

    pub fn dest_dir(&self) -> &Path {
        self.poller.transfer().dest_root()
    }

    /// Create both ends so the first pass does not fail on a fresh host.
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [self.source_dir(), self.dest_dir()] {
            std::fs::create_dir_all(dir).map_err(|err| PipelineError::io_at(dir, err))?;
        }
        Ok(())
    }

    pub async fn run_once(&self) -> Result<TransferReport> {
        self.poller.run_once().await
    }

    /// Loop until cancelled; a failed pass never ends the loop.
    pub async fn run(self, cancel: CancellationToken) {
        self.poller.run(cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn defaults_to_engine_output_folder() {
        let tmp = tempfile::tempdir().unwrap();
        let dispatch = DispatchConfig {
            engine_root: tmp.path().join("engine"),
            ..DispatchConfig::default()
        };
        let mirror_cfg = MirrorConfig {
            dest_dir: tmp.path().join("object_out"),
            ..MirrorConfig::default()
        };
        let mirror = OutputMirror::from_config(&mirror_cfg, &dispatch);
        assert_eq!(mirror.source_dir(), tmp.path().join("engine/output/trashscans"));

        mirror.ensure_dirs().unwrap();
        std::fs::write(mirror.source_dir().join("object_1_00001_.glb"), b"glb").unwrap();

        let report = mirror.run_once().await.unwrap();
        assert_eq!(report.files_copied(), 1);
        assert!(tmp.path().join("object_out/object_1_00001_.glb").is_file());

        // Deleting at the source never deletes the mirrored copy.
        std::fs::remove_file(mirror.source_dir().join("object_1_00001_.glb")).unwrap();
        let report = mirror.run_once().await.unwrap();
        assert!(report.is_noop());
        assert!(tmp.path().join("object_out/object_1_00001_.glb").is_file());
    }
}
