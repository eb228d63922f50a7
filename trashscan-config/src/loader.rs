use std::fs;
use std::path::PathBuf;

use thiserror::Error;
use trashscan_core::ViewpointSet;
use trashscan_core::config::SourceConfig;

use super::models::{Config, ConfigMetadata};
use super::sources::{EnvConfig, FileConfig};
use super::validation::{self, ConfigValidationError, ConfigWarnings};

const DEFAULT_CONFIG_LOCATIONS: [&str; 2] = ["trashscan.toml", "config/trashscan.toml"];

#[derive(Debug, Default, Clone)]
pub struct ConfigLoaderOptions {
    pub config_path: Option<PathBuf>,
    pub env_file: Option<PathBuf>,
    /// Skip reading the process environment and `.env` (tests, dry runs).
    pub ignore_env: bool,
}

#[derive(Debug, Default)]
pub struct ConfigLoader {
    options: ConfigLoaderOptions,
}

#[derive(Debug)]
pub struct ConfigLoad {
    pub config: Config,
    pub warnings: ConfigWarnings,
}

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("configuration file missing: {path}")]
    MissingConfig { path: PathBuf },
    #[error("failed to read configuration {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error(transparent)]
    Invalid(#[from] ConfigValidationError),
    #[error(transparent)]
    EnvFile(#[from] dotenvy::Error),
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ConfigLoaderOptions) -> Self {
        Self { options }
    }

    pub fn with_config_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.config_path = Some(path.into());
        self
    }

    pub fn with_env_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.env_file = Some(path.into());
        self
    }

    pub fn load(&self) -> Result<ConfigLoad, ConfigLoadError> {
        if self.options.ignore_env {
            return self.load_with_env(EnvConfig::default(), false);
        }

        let env_file_loaded = match &self.options.env_file {
            Some(path) => dotenvy::from_path(path).map(|_| true).or_else(|err| match err {
                dotenvy::Error::Io(_) => Ok(false),
                _ => Err(err),
            })?,
            None => dotenvy::dotenv().map(|_| true).or_else(|err| match err {
                dotenvy::Error::Io(_) => Ok(false),
                _ => Err(err),
            })?,
        };

        self.load_with_env(EnvConfig::gather(), env_file_loaded)
    }

    /// Compose from an already gathered environment.
    pub fn load_with_env(
        &self,
        env: EnvConfig,
        env_file_loaded: bool,
    ) -> Result<ConfigLoad, ConfigLoadError> {
        let mut warnings = ConfigWarnings::default();

        let (file, config_path) = self.load_file_config(&env)?;
        match &config_path {
            None => warnings.push_with_hint(
                "No trashscan.toml detected; using built-in defaults",
                "Pass --config or set TRASHSCAN_CONFIG to point at a configuration file",
            ),
            Some(path) => {
                if file_has_password(&file) {
                    warnings.push_with_hint(
                        format!("{} stores the SFTP password in plain text", path.display()),
                        "Prefer TRASHSCAN_SFTP_PASSWORD in the environment or .env",
                    );
                }
            }
        }

        let mut config = compose(file, &env)?;
        config.metadata = ConfigMetadata {
            config_path,
            env_file_loaded,
        };

        warnings.extend(validation::validate(&config)?);
        Ok(ConfigLoad { config, warnings })
    }

    fn load_file_config(
        &self,
        env: &EnvConfig,
    ) -> Result<(FileConfig, Option<PathBuf>), ConfigLoadError> {
        let explicit = self
            .options
            .config_path
            .clone()
            .or_else(|| env.config_path.clone());

        let path = match explicit {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigLoadError::MissingConfig { path });
                }
                path
            }
            None => match DEFAULT_CONFIG_LOCATIONS
                .iter()
                .map(PathBuf::from)
                .find(|candidate| candidate.exists())
            {
                Some(path) => path,
                None => return Ok((FileConfig::default(), None)),
            },
        };

        let contents = fs::read_to_string(&path).map_err(|source| ConfigLoadError::Io {
            path: path.clone(),
            source,
        })?;
        let file: FileConfig = toml::from_str(&contents).map_err(|source| {
            ConfigLoadError::Parse {
                path: path.clone(),
                source,
            }
        })?;

        Ok((file, Some(path)))
    }
}

fn file_has_password(file: &FileConfig) -> bool {
    matches!(&file.transfer.source, SourceConfig::Sftp { password, .. } if !password.is_empty())
}

fn compose(file: FileConfig, env: &EnvConfig) -> Result<Config, ConfigLoadError> {
    let FileConfig {
        viewpoints,
        mut capture,
        mut transfer,
        mut dispatch,
        mut mirror,
    } = file;

    let viewpoints = match viewpoints {
        Some(views) => ViewpointSet::new(views)
            .map_err(|err| ConfigValidationError::Viewpoints(err.to_string()))?,
        None => ViewpointSet::default(),
    };

    if let Some(root) = &env.capture_root {
        capture.capture_root = root.clone();
    }
    if let Some(dir) = &env.watch_dir {
        // The transfer lands where the watcher looks.
        dispatch.watch_dir = dir.clone();
        transfer.dest_root = dir.clone();
    }
    if let Some(endpoint) = &env.engine_endpoint {
        dispatch.endpoint = endpoint.clone();
    }
    if let Some(root) = &env.engine_root {
        dispatch.engine_root = root.clone();
    }
    if let Some(template) = &env.template_path {
        dispatch.template_path = template.clone();
    }
    if let Some(out) = &env.object_out {
        mirror.dest_dir = out.clone();
    }

    if let Some(value) = &env.sftp_port_invalid {
        return Err(ConfigValidationError::InvalidPort {
            value: value.clone(),
        }
        .into());
    }
    if env.touches_sftp() {
        transfer.source = apply_sftp_overrides(transfer.source, env);
    }

    Ok(Config {
        viewpoints,
        capture,
        transfer,
        dispatch,
        mirror,
        metadata: ConfigMetadata::default(),
    })
}

/// Environment SFTP settings override the file; a host alone switches a
/// local source to SFTP, keeping its root as the remote directory.
fn apply_sftp_overrides(source: SourceConfig, env: &EnvConfig) -> SourceConfig {
    match source {
        SourceConfig::Sftp {
            host,
            port,
            username,
            password,
            root,
        } => SourceConfig::Sftp {
            host: env.sftp_host.clone().unwrap_or(host),
            port: env.sftp_port.unwrap_or(port),
            username: env.sftp_user.clone().unwrap_or(username),
            password: env.sftp_password.clone().unwrap_or(password),
            root,
        },
        SourceConfig::Local { root } => match &env.sftp_host {
            Some(host) => SourceConfig::Sftp {
                host: host.clone(),
                port: env.sftp_port.unwrap_or(22),
                username: env.sftp_user.clone().unwrap_or_default(),
                password: env.sftp_password.clone().unwrap_or_default(),
                root,
            },
            None => SourceConfig::Local { root },
        },
    }
}
