//! Behavioural smoke tests for the CLI entrypoint.
//!
//! Every case fails before any provider call, so no network access is
//! needed.

use assert_cmd::cargo::cargo_bin_cmd;
use cap_std::{ambient_authority, fs_utf8::Dir};
use camino::Utf8PathBuf;
use predicates::prelude::*;
use tempfile::TempDir;

const FLEET: &str = r#"{"droplets": {"name": "lab", "hosts": [{"name": "web", "count": 1, "roles": ["app"]}]}}"#;

fn isolated_dir() -> (TempDir, Utf8PathBuf) {
    let tmp = TempDir::new().expect("tempdir");
    let root = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf()).expect("utf8 temp path");
    (tmp, root)
}

fn write_fleet(root: &Utf8PathBuf) {
    Dir::open_ambient_dir(root, ambient_authority())
        .and_then(|dir| dir.write("cloud_shepard.json", FLEET))
        .expect("write fleet file");
}

fn shepard_cmd(root: &Utf8PathBuf) -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("cloud-shepard");
    cmd.current_dir(root)
        .env("HOME", root)
        .env("XDG_CONFIG_HOME", root)
        .env_remove("SHEPARD_API_KEY")
        .env_remove("SHEPARD_SSH_KEY")
        .env_remove("SHEPARD_CONFIG_PATH")
        .env_remove("SHEPARD_MAPPING_POLICY");
    cmd
}

#[test]
fn no_arguments_prints_usage() {
    let mut cmd = cargo_bin_cmd!("cloud-shepard");
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn help_lists_every_mode() {
    let mut cmd = cargo_bin_cmd!("cloud-shepard");
    cmd.arg("--help").assert().success().stdout(
        predicate::str::contains("create")
            .and(predicate::str::contains("destroy"))
            .and(predicate::str::contains("list"))
            .and(predicate::str::contains("inventory")),
    );
}

#[test]
fn create_help_documents_mode_flags() {
    let mut cmd = cargo_bin_cmd!("cloud-shepard");
    cmd.args(["create", "--help"]).assert().success().stdout(
        predicate::str::contains("--ssh-key")
            .and(predicate::str::contains("--write-inventory-to"))
            .and(predicate::str::contains("--policy")),
    );
}

#[test]
fn missing_fleet_file_exits_with_one() {
    let (_tmp, root) = isolated_dir();

    shepard_cmd(&root)
        .args(["list", "-c", "absent.json"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("absent.json"));
}

#[test]
fn missing_api_key_names_every_source() {
    let (_tmp, root) = isolated_dir();
    write_fleet(&root);

    shepard_cmd(&root)
        .arg("list")
        .assert()
        .code(1)
        .stdout("")
        .stderr(predicate::str::contains("--api-key").and(predicate::str::contains("SHEPARD_API_KEY")));
}

#[test]
fn unknown_policy_is_rejected_before_contacting_provider() {
    let (_tmp, root) = isolated_dir();
    write_fleet(&root);

    shepard_cmd(&root)
        .args(["inventory", "-p", "token", "--policy", "random"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("unknown mapping policy 'random'"));
}
