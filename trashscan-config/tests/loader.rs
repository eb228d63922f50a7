use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use trashscan_config::{
    ConfigLoadError, ConfigLoader, ConfigLoaderOptions, ConfigValidationError, EnvConfig,
};
use trashscan_core::config::SourceConfig;
use trashscan_core::mirror::OutputMirror;

fn env(pairs: &[(&str, &str)]) -> EnvConfig {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    EnvConfig::gather_from(|name| map.get(name).cloned())
}

fn write_config(tmp: &TempDir, contents: &str) -> PathBuf {
    let path = tmp.path().join("trashscan.toml");
    std::fs::write(&path, contents).unwrap();
    path
}

#[test]
fn explicit_missing_file_is_an_error() {
    let tmp = TempDir::new().unwrap();
    let loader = ConfigLoader::new().with_config_path(tmp.path().join("nope.toml"));
    let err = loader.load_with_env(EnvConfig::default(), false).unwrap_err();
    assert!(matches!(err, ConfigLoadError::MissingConfig { .. }));
}

#[test]
fn missing_file_from_env_is_an_error() {
    let tmp = TempDir::new().unwrap();
    let missing = tmp.path().join("absent.toml");
    let err = ConfigLoader::new()
        .load_with_env(env(&[("TRASHSCAN_CONFIG", missing.to_str().unwrap())]), false)
        .unwrap_err();
    assert!(matches!(err, ConfigLoadError::MissingConfig { path } if path == missing));
}

#[test]
fn file_values_and_env_overrides_compose() {
    let tmp = TempDir::new().unwrap();
    let path = write_config(
        &tmp,
        r#"
        [capture]
        auto_trigger_interval_ms = 30000

        [dispatch]
        endpoint = "http://10.0.0.5:8188/prompt"
        settle_delay_ms = 2500

        [transfer.source]
        kind = "sftp"
        host = "10.12.194.1"
        username = "trash"
        root = "/home/trash/trash_imgs/"
        "#,
    );

    let load = ConfigLoader::new()
        .with_config_path(&path)
        .load_with_env(
            env(&[
                ("TRASHSCAN_ENGINE_ROOT", "/srv/comfy"),
                ("TRASHSCAN_SFTP_PASSWORD", "from-env"),
                ("TRASHSCAN_OBJECT_OUT", "/srv/objects"),
            ]),
            false,
        )
        .unwrap();
    let config = load.config;

    assert_eq!(config.capture.auto_trigger_interval_ms, 30_000);
    assert_eq!(config.capture.positioning_delay_ms, 5_000);
    assert_eq!(config.dispatch.endpoint, "http://10.0.0.5:8188/prompt");
    assert_eq!(config.dispatch.settle_delay_ms, 2_500);
    assert_eq!(config.dispatch.engine_root, PathBuf::from("/srv/comfy"));
    assert_eq!(config.mirror.dest_dir, PathBuf::from("/srv/objects"));
    let mirror = OutputMirror::from_config(&config.mirror, &config.dispatch);
    assert_eq!(mirror.source_dir(), Path::new("/srv/comfy/output/trashscans"));
    assert_eq!(config.metadata.config_path.as_deref(), Some(path.as_path()));

    match &config.transfer.source {
        SourceConfig::Sftp {
            host,
            port,
            password,
            ..
        } => {
            assert_eq!(host, "10.12.194.1");
            assert_eq!(*port, 22);
            assert_eq!(password, "from-env");
        }
        other => panic!("expected sftp source, got {other:?}"),
    }
    assert!(load.warnings.is_empty(), "{:?}", load.warnings);
}

#[test]
fn plain_text_password_in_file_warns() {
    let tmp = TempDir::new().unwrap();
    let path = write_config(
        &tmp,
        r#"
        [transfer.source]
        kind = "sftp"
        host = "pi.local"
        username = "trash"
        password = "trash"
        root = "/home/trash/trash_imgs/"
        "#,
    );

    let load = ConfigLoader::new()
        .with_config_path(&path)
        .load_with_env(EnvConfig::default(), false)
        .unwrap();
    assert_eq!(load.warnings.len(), 1);
    assert!(load.warnings.items[0].message.contains("password"));
    assert!(!format!("{:?}", load.config.transfer.source).contains("\"trash\""));
}

#[test]
fn sftp_host_in_env_switches_local_source() {
    let load = ConfigLoader::with_options(ConfigLoaderOptions {
        config_path: None,
        env_file: None,
        ignore_env: false,
    })
    .load_with_env(
        env(&[
            ("TRASHSCAN_SFTP_HOST", "10.12.194.1"),
            ("TRASHSCAN_SFTP_USER", "trash"),
            ("TRASHSCAN_SFTP_PORT", "2222"),
        ]),
        false,
    )
    .unwrap();

    match load.config.transfer.source {
        SourceConfig::Sftp { port, root, .. } => {
            assert_eq!(port, 2222);
            assert_eq!(root, PathBuf::from("./trash_imgs"));
        }
        other => panic!("expected sftp source, got {other:?}"),
    }
}

#[test]
fn duplicate_viewpoints_are_invalid() {
    let tmp = TempDir::new().unwrap();
    let path = write_config(
        &tmp,
        r#"
        [[viewpoints]]
        name = "front"

        [[viewpoints]]
        name = "front"
        "#,
    );
    let err = ConfigLoader::new()
        .with_config_path(&path)
        .load_with_env(EnvConfig::default(), false)
        .unwrap_err();
    assert!(matches!(
        err,
        ConfigLoadError::Invalid(ConfigValidationError::Viewpoints(_))
    ));
}

#[test]
fn unparseable_file_reports_its_path() {
    let tmp = TempDir::new().unwrap();
    let path = write_config(&tmp, "[capture\nbroken");
    let err = ConfigLoader::new()
        .with_config_path(&path)
        .load_with_env(EnvConfig::default(), false)
        .unwrap_err();
    assert!(matches!(err, ConfigLoadError::Parse { path: p, .. } if p == path));
}

#[test]
fn invalid_port_is_rejected() {
    let err = ConfigLoader::new()
        .load_with_env(env(&[("TRASHSCAN_SFTP_PORT", "abc")]), false)
        .unwrap_err();
    assert!(matches!(
        err,
        ConfigLoadError::Invalid(ConfigValidationError::InvalidPort { .. })
    ));
}
