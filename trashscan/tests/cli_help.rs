use assert_cmd::cargo::cargo_bin_cmd;

fn help_text(args: &[&str]) -> String {
    let mut cmd = cargo_bin_cmd!("trashscan");
    let output = cmd
        .args(args)
        .arg("--help")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    String::from_utf8_lossy(&output).into_owned()
}

#[test]
fn top_level_help_lists_every_role() {
    let text = help_text(&[]);
    for command in ["capture", "sync", "dispatch", "mirror"] {
        assert!(text.contains(command), "help missing '{command}'");
    }
    assert!(text.contains("--config"), "help missing --config");
}

#[test]
fn one_shot_flags_are_documented() {
    assert!(help_text(&["sync"]).contains("--once"));
    assert!(help_text(&["mirror"]).contains("--once"));
    assert!(help_text(&["capture"]).contains("--synthetic"));
}

#[test]
fn mirror_once_copies_engine_output() {
    let tmp = tempfile::tempdir().unwrap();
    let source = tmp.path().join("engine_out");
    let dest = tmp.path().join("object_out");
    std::fs::create_dir_all(&source).unwrap();
    std::fs::write(source.join("object_1_00001_.glb"), b"glTF").unwrap();

    let config = tmp.path().join("trashscan.toml");
    std::fs::write(
        &config,
        format!(
            "[mirror]\nsource_dir = {:?}\ndest_dir = {:?}\n",
            source.display().to_string(),
            dest.display().to_string()
        ),
    )
    .unwrap();

    let mut cmd = cargo_bin_cmd!("trashscan");
    let output = cmd
        .current_dir(tmp.path())
        .args(["--config", config.to_str().unwrap(), "mirror", "--once"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    assert!(String::from_utf8_lossy(&output).contains("1 copied"));
    assert_eq!(std::fs::read(dest.join("object_1_00001_.glb")).unwrap(), b"glTF");
}

#[test]
fn explicit_missing_config_fails() {
    let tmp = tempfile::tempdir().unwrap();
    let mut cmd = cargo_bin_cmd!("trashscan");
    cmd.current_dir(tmp.path())
        .args(["--config", "missing.toml", "mirror", "--once"])
        .assert()
        .failure();
}
