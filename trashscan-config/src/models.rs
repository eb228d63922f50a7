use std::path::PathBuf;

use trashscan_core::ViewpointSet;
use trashscan_core::config::{CaptureConfig, DispatchConfig, MirrorConfig, TransferConfig};

/// Fully resolved configuration shared by every subcommand.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub viewpoints: ViewpointSet,
    pub capture: CaptureConfig,
    pub transfer: TransferConfig,
    pub dispatch: DispatchConfig,
    pub mirror: MirrorConfig,
    pub metadata: ConfigMetadata,
}

/// Where the configuration came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigMetadata {
    pub config_path: Option<PathBuf>,
    pub env_file_loaded: bool,
}
