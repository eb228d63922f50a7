use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use trashscan_core::Viewpoint;
use trashscan_core::config::{CaptureConfig, DispatchConfig, MirrorConfig, TransferConfig};

/// Raw configuration as written in `trashscan.toml`.
///
/// Every section is optional; missing sections take component defaults.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewpoints: Option<Vec<Viewpoint>>,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub transfer: TransferConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub mirror: MirrorConfig,
}

/// `TRASHSCAN_*` overrides gathered from the process environment.
#[derive(Default, Clone)]
pub struct EnvConfig {
    pub config_path: Option<PathBuf>,
    pub capture_root: Option<PathBuf>,
    pub watch_dir: Option<PathBuf>,
    pub engine_endpoint: Option<String>,
    pub engine_root: Option<PathBuf>,
    pub template_path: Option<PathBuf>,
    pub object_out: Option<PathBuf>,
    pub sftp_host: Option<String>,
    pub sftp_port: Option<u16>,
    /// Raw port value when it did not parse.
    pub sftp_port_invalid: Option<String>,
    pub sftp_user: Option<String>,
    pub sftp_password: Option<String>,
}

impl std::fmt::Debug for EnvConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvConfig")
            .field("config_path", &self.config_path)
            .field("capture_root", &self.capture_root)
            .field("watch_dir", &self.watch_dir)
            .field("engine_endpoint", &self.engine_endpoint)
            .field("engine_root", &self.engine_root)
            .field("template_path", &self.template_path)
            .field("object_out", &self.object_out)
            .field("sftp_host", &self.sftp_host)
            .field("sftp_port", &self.sftp_port)
            .field("sftp_user", &self.sftp_user)
            .field(
                "sftp_password",
                &self.sftp_password.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

impl EnvConfig {
    pub fn gather() -> Self {
        Self::gather_from(|name| std::env::var(name).ok())
    }

    /// Gather from an arbitrary lookup; empty values count as unset.
    pub fn gather_from<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        let path = |name: &str| var(name).map(PathBuf::from);

        let raw_port = var("TRASHSCAN_SFTP_PORT");
        let sftp_port = raw_port.as_deref().and_then(|raw| raw.trim().parse().ok());
        let sftp_port_invalid = raw_port.filter(|_| sftp_port.is_none());

        Self {
            config_path: path("TRASHSCAN_CONFIG"),
            capture_root: path("TRASHSCAN_CAPTURE_ROOT"),
            watch_dir: path("TRASHSCAN_WATCH_DIR"),
            engine_endpoint: var("TRASHSCAN_ENGINE_ENDPOINT"),
            engine_root: path("TRASHSCAN_ENGINE_ROOT"),
            template_path: path("TRASHSCAN_TEMPLATE"),
            object_out: path("TRASHSCAN_OBJECT_OUT"),
            sftp_host: var("TRASHSCAN_SFTP_HOST"),
            sftp_port,
            sftp_port_invalid,
            sftp_user: var("TRASHSCAN_SFTP_USER"),
            sftp_password: lookup("TRASHSCAN_SFTP_PASSWORD"),
        }
    }

    pub fn touches_sftp(&self) -> bool {
        self.sftp_host.is_some()
            || self.sftp_port.is_some()
            || self.sftp_user.is_some()
            || self.sftp_password.is_some()
    }
}
