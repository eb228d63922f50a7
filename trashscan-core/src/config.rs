//! Per-component tuning knobs.
//!
//! Every struct carries defaults matching the original scanning rig so a
//! deployment only needs to supply the paths that differ. Durations are stored
//! as `*_ms` integers and exposed through `Duration` accessors.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Capture station settings: timing of the sequencer and the auto-trigger.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Directory that receives one session folder per captured object.
    pub capture_root: PathBuf,
    /// Seconds between automatically triggered sessions (as milliseconds).
    pub auto_trigger_interval_ms: u64,
    /// Time the turntable needs to settle on a viewpoint.
    pub positioning_delay_ms: u64,
    /// Pause after each shot before moving to the next viewpoint.
    pub inter_shot_delay_ms: u64,
    /// Cooperative loop rate. Waiting states are re-evaluated on every tick.
    pub tick_rate_hz: u32,
    /// Cosmetic capacity used by the storage gauge; writes are never refused.
    pub max_capacity_mb: u64,
    /// Number of status lines kept for the operator display.
    pub status_lines: usize,
    pub camera: CameraConfig,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            capture_root: PathBuf::from("./trash_imgs"),
            auto_trigger_interval_ms: 45_000,
            positioning_delay_ms: 5_000,
            inter_shot_delay_ms: 1_000,
            tick_rate_hz: 30,
            max_capacity_mb: 2_048,
            status_lines: 8,
            camera: CameraConfig::default(),
        }
    }
}

impl CaptureConfig {
    pub fn auto_trigger_interval(&self) -> Duration {
        Duration::from_millis(self.auto_trigger_interval_ms)
    }

    pub fn positioning_delay(&self) -> Duration {
        Duration::from_millis(self.positioning_delay_ms)
    }

    pub fn inter_shot_delay(&self) -> Duration {
        Duration::from_millis(self.inter_shot_delay_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(1) / self.tick_rate_hz.max(1)
    }
}

/// Camera device selection.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// `/dev/video<N>` index for the V4L2 grabber.
    pub device_index: usize,
    pub width: u32,
    pub height: u32,
    /// Target acquisition rate; also paces the synthetic grabber.
    pub fps: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device_index: 0,
            width: 1280,
            height: 720,
            fps: 30,
        }
    }
}

/// Where the completeness-gated transfer pulls session folders from.
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceConfig {
    /// A directory reachable through the local filesystem (mounted share).
    Local { root: PathBuf },
    /// The capture device's filesystem over SFTP.
    Sftp {
        host: String,
        #[serde(default = "default_ssh_port")]
        port: u16,
        username: String,
        #[serde(default)]
        password: String,
        root: PathBuf,
    },
}

fn default_ssh_port() -> u16 {
    22
}

impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig::Local {
            root: PathBuf::from("./trash_imgs"),
        }
    }
}

impl fmt::Debug for SourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceConfig::Local { root } => f.debug_struct("Local").field("root", root).finish(),
            SourceConfig::Sftp {
                host,
                port,
                username,
                password,
                root,
            } => f
                .debug_struct("Sftp")
                .field("host", host)
                .field("port", port)
                .field("username", username)
                .field(
                    "password",
                    &if password.is_empty() { "<unset>" } else { "<redacted>" },
                )
                .field("root", root)
                .finish(),
        }
    }
}

/// Input leg: capture device -> processing machine.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    pub source: SourceConfig,
    /// Local directory receiving mirrored session folders (the watch directory).
    pub dest_root: PathBuf,
    pub poll_interval_ms: u64,
    /// Files a session folder must hold before it is copied. Defaults to the
    /// number of configured viewpoints.
    pub expected_files: Option<usize>,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            source: SourceConfig::default(),
            dest_root: PathBuf::from("./image_in"),
            poll_interval_ms: 10_000,
            expected_files: None,
        }
    }
}

impl TransferConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Node identifiers inside the engine's job template.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineNodes {
    /// Viewpoint name -> node id of its image-input node.
    pub images: BTreeMap<String, String>,
    /// Node id holding the output filename prefix.
    pub output: String,
    /// Input key written on image nodes.
    pub image_key: String,
    /// Input key written on the output node.
    pub prefix_key: String,
}

impl Default for EngineNodes {
    fn default() -> Self {
        let images = [("front", "56"), ("left", "85"), ("right", "87"), ("back", "82")]
            .into_iter()
            .map(|(view, node)| (view.to_string(), node.to_string()))
            .collect();

        Self {
            images,
            output: "67".into(),
            image_key: "image".into(),
            prefix_key: "filename_prefix".into(),
        }
    }
}

/// Watch-and-dispatch settings for the processing machine.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Directory observed for new session folders.
    pub watch_dir: PathBuf,
    /// Rendering engine installation root (`input/` and `output/` live here).
    pub engine_root: PathBuf,
    /// Sub-folder of the engine output directory that receives our models.
    pub output_folder: String,
    /// Job template (engine API format) rewritten per dispatch.
    pub template_path: PathBuf,
    /// Job submission endpoint.
    pub endpoint: String,
    /// Grace period between folder creation and enumeration.
    pub settle_delay_ms: u64,
    /// Optional HTTP timeout for submissions. Unset means no timeout.
    pub submit_timeout_ms: Option<u64>,
    pub nodes: EngineNodes,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            watch_dir: PathBuf::from("./image_in"),
            engine_root: PathBuf::from("./ComfyUI"),
            output_folder: "trashscans".into(),
            template_path: PathBuf::from("3d_hunyuan3d_multiview_to_model_turbo.json"),
            endpoint: "http://127.0.0.1:8000/prompt".into(),
            settle_delay_ms: 1_000,
            submit_timeout_ms: None,
            nodes: EngineNodes::default(),
        }
    }
}

impl DispatchConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn submit_timeout(&self) -> Option<Duration> {
        self.submit_timeout_ms.map(Duration::from_millis)
    }

    pub fn engine_input_dir(&self) -> PathBuf {
        self.engine_root.join("input")
    }

    pub fn engine_output_dir(&self) -> PathBuf {
        self.engine_root.join("output").join(&self.output_folder)
    }
}

/// Output leg: engine output -> stable serving directory.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorConfig {
    /// Overrides the engine output directory derived from [`DispatchConfig`].
    pub source_dir: Option<PathBuf>,
    pub dest_dir: PathBuf,
    pub poll_interval_ms: u64,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            source_dir: None,
            dest_dir: PathBuf::from("./object_out"),
            poll_interval_ms: 10_000,
        }
    }
}

impl MirrorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_interval_follows_rate() {
        let config = CaptureConfig::default();
        assert_eq!(config.tick_interval(), Duration::from_secs(1) / 30);

        let zero = CaptureConfig {
            tick_rate_hz: 0,
            ..CaptureConfig::default()
        };
        assert_eq!(zero.tick_interval(), Duration::from_secs(1));
    }

    #[test]
    fn sftp_password_is_redacted() {
        let source = SourceConfig::Sftp {
            host: "10.0.0.2".into(),
            port: 22,
            username: "scan".into(),
            password: "hunter2".into(),
            root: PathBuf::from("/home/scan/imgs"),
        };
        let rendered = format!("{source:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn source_config_is_tagged() {
        let parsed: SourceConfig = toml::from_str(
            r#"
kind = "sftp"
host = "pi.local"
username = "scan"
root = "/srv/imgs"
"#,
        )
        .unwrap();
        match parsed {
            SourceConfig::Sftp { port, password, .. } => {
                assert_eq!(port, 22);
                assert!(password.is_empty());
            }
            other => panic!("unexpected source {other:?}"),
        }
    }

    #[test]
    fn engine_layout_paths() {
        let config = DispatchConfig {
            engine_root: PathBuf::from("/opt/engine"),
            ..DispatchConfig::default()
        };
        assert_eq!(config.engine_input_dir(), PathBuf::from("/opt/engine/input"));
        assert_eq!(
            config.engine_output_dir(),
            PathBuf::from("/opt/engine/output/trashscans")
        );
    }
}
