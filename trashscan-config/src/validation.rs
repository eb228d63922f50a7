use thiserror::Error;
use trashscan_core::config::SourceConfig;

use super::models::Config;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigValidationError {
    #[error("invalid viewpoints: {0}")]
    Viewpoints(String),
    #[error("viewpoint '{view}' has no image node in [dispatch.nodes.images]")]
    MissingImageNode { view: String },
    #[error("{field} must be greater than zero")]
    ZeroInterval { field: &'static str },
    #[error("TRASHSCAN_SFTP_PORT is not a port number: '{value}'")]
    InvalidPort { value: String },
    #[error("sftp source requires a username")]
    MissingSftpUser,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigWarning {
    pub message: String,
    pub hint: Option<String>,
}

#[derive(Debug, Default, Clone)]
pub struct ConfigWarnings {
    pub items: Vec<ConfigWarning>,
}

impl ConfigWarnings {
    pub fn push<S: Into<String>>(&mut self, message: S) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: None,
        });
    }

    pub fn push_with_hint<S: Into<String>, H: Into<String>>(&mut self, message: S, hint: H) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: Some(hint.into()),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn extend(&mut self, other: ConfigWarnings) {
        self.items.extend(other.items);
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConfigWarning> {
        self.items.iter()
    }
}

/// Reject configurations the pipeline cannot run with; report the merely odd.
pub fn validate(config: &Config) -> Result<ConfigWarnings, ConfigValidationError> {
    let mut warnings = ConfigWarnings::default();

    for view in &config.viewpoints {
        if !config.dispatch.nodes.images.contains_key(&view.name) {
            return Err(ConfigValidationError::MissingImageNode {
                view: view.name.clone(),
            });
        }
    }

    for (field, value) in [
        ("capture.auto_trigger_interval_ms", config.capture.auto_trigger_interval_ms),
        ("transfer.poll_interval_ms", config.transfer.poll_interval_ms),
        ("mirror.poll_interval_ms", config.mirror.poll_interval_ms),
    ] {
        if value == 0 {
            return Err(ConfigValidationError::ZeroInterval { field });
        }
    }

    if let SourceConfig::Sftp { username, .. } = &config.transfer.source
        && username.trim().is_empty()
    {
        return Err(ConfigValidationError::MissingSftpUser);
    }

    if let Some(expected) = config.transfer.expected_files
        && expected != config.viewpoints.len()
    {
        warnings.push(format!(
            "transfer.expected_files = {expected} differs from the {} configured viewpoints",
            config.viewpoints.len()
        ));
    }

    if config.capture.tick_rate_hz == 0 {
        warnings.push("capture.tick_rate_hz = 0; running at 1 Hz");
    }

    if config.dispatch.settle_delay_ms == 0 {
        warnings.push_with_hint(
            "dispatch.settle_delay_ms = 0; folders are validated as soon as they appear",
            "Producers that write files after creating the folder will be skipped",
        );
    }

    let unused: Vec<&str> = config
        .dispatch
        .nodes
        .images
        .keys()
        .filter(|view| config.viewpoints.by_name(view).is_none())
        .map(String::as_str)
        .collect();
    if !unused.is_empty() {
        warnings.push(format!(
            "image nodes configured for unknown viewpoints: {}",
            unused.join(", ")
        ));
    }

    Ok(warnings)
}
