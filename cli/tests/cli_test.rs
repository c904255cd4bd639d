use assert_cmd::Command;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Writes a config file that keeps objects in a local store inside `dir`.
fn write_config(dir: &Path, extra: &str) -> PathBuf {
    let path = dir.join("config");
    let config = format!(
        "store:\n  local:\n    path: {}\n{}",
        dir.join("store").display(),
        extra
    );
    std::fs::write(&path, config).unwrap();
    path
}

fn pharmer(config: &Path, args: &[&str]) -> Command {
    let mut cmd = Command::cargo_bin("pharmer").unwrap();
    cmd.env_remove("RUST_LOG")
        .arg("--config-file")
        .arg(config)
        .args(args);
    cmd
}

fn stdout(config: &Path, args: &[&str]) -> String {
    let output = pharmer(config, args).assert().success().get_output().clone();
    String::from_utf8(output.stdout).unwrap()
}

#[test]
fn credential_is_stored_and_listed_without_data() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), "");
    pharmer(
        &config,
        &[
            "create",
            "credential",
            "do",
            "--provider",
            "DigitalOcean",
            "--data",
            "token=secret-token",
        ],
    )
    .assert()
    .success();

    let listed = stdout(&config, &["get", "credential", "-o", "json"]);
    let credentials: serde_json::Value = serde_json::from_str(&listed).unwrap();
    assert_eq!(credentials[0]["metadata"]["name"], "do");
    assert_eq!(credentials[0]["spec"]["provider"], "DigitalOcean");
    assert!(!listed.contains("secret-token"));
}

#[test]
fn incomplete_credential_is_rejected() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), "");
    pharmer(
        &config,
        &["create", "credential", "do", "--provider", "DigitalOcean"],
    )
    .assert()
    .failure();
    pharmer(
        &config,
        &[
            "create",
            "credential",
            "x",
            "--provider",
            "Linode",
            "--data",
            "token=t",
        ],
    )
    .assert()
    .failure();
}

#[test]
fn config_file_credentials_are_imported() {
    let dir = TempDir::new().unwrap();
    let credentials = "credentials:
  - metadata:
      name: from-config
    spec:
      provider: DigitalOcean
      data:
        token: abc
";
    let config = write_config(dir.path(), credentials);
    let listed = stdout(&config, &["get", "credential", "from-config", "-o", "yaml"]);
    assert!(listed.contains("from-config"));
    assert!(!listed.contains("abc"));
}

#[test]
fn cluster_and_node_groups_are_recorded_scaled_and_deleted() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), "");
    pharmer(
        &config,
        &[
            "create",
            "credential",
            "do",
            "--provider",
            "DigitalOcean",
            "--data",
            "token=t",
        ],
    )
    .assert()
    .success();
    pharmer(
        &config,
        &[
            "create",
            "cluster",
            "c1",
            "--provider",
            "dokube",
            "--zone",
            "nyc1",
            "--credential-uid",
            "do",
            "--nodes",
            "s-2vcpu-4gb=2",
        ],
    )
    .assert()
    .success();

    let clusters: serde_json::Value =
        serde_json::from_str(&stdout(&config, &["get", "cluster", "c1", "-o", "json"])).unwrap();
    assert_eq!(clusters[0]["status"]["phase"], "Pending");
    assert_eq!(clusters[0]["spec"]["config"]["cloud"]["region"], "nyc1");

    pharmer(
        &config,
        &[
            "edit",
            "nodegroup",
            "s-2vcpu-4gb-pool",
            "--cluster",
            "c1",
            "--nodes",
            "3",
        ],
    )
    .assert()
    .success();
    let node_groups: serde_json::Value = serde_json::from_str(&stdout(
        &config,
        &["get", "nodegroup", "--cluster", "c1", "-o", "json"],
    ))
    .unwrap();
    assert_eq!(node_groups[0]["metadata"]["name"], "s-2vcpu-4gb-pool");
    assert_eq!(node_groups[0]["spec"]["replicas"], 3);

    // The credential is still in use.
    pharmer(&config, &["delete", "credential", "do"])
        .assert()
        .failure();

    let deleted = stdout(&config, &["delete", "cluster", "c1"]);
    assert!(deleted.contains("Deleting"));
}

#[test]
fn unknown_provider_is_rejected() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), "");
    pharmer(
        &config,
        &[
            "create",
            "cluster",
            "c1",
            "--provider",
            "vultr",
            "--credential-uid",
            "x",
        ],
    )
    .assert()
    .failure();
    let listed = stdout(&config, &["get", "cluster", "-o", "json"]);
    assert_eq!(listed.trim(), "[]");
}

#[test]
fn missing_node_group_cannot_be_scaled() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), "");
    pharmer(
        &config,
        &["edit", "nodegroup", "nope", "--cluster", "c1", "--nodes", "1"],
    )
    .assert()
    .failure();
}

#[test]
fn cluster_output_masks_master_password() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), "");
    pharmer(
        &config,
        &[
            "create",
            "cluster",
            "g1",
            "--provider",
            "dokube",
            "--zone",
            "nyc1",
            "--credential-uid",
            "do",
        ],
    )
    .assert()
    .success();
    let path = dir.path().join("store").join("clusters").join("g1.json");
    let mut stored: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    stored["spec"]["config"]["cloud"]["gke"] = serde_json::json!({
        "userName": "admin",
        "password": "hunter2",
        "networkName": "default",
    });
    std::fs::write(&path, serde_json::to_vec_pretty(&stored).unwrap()).unwrap();

    let json = stdout(&config, &["get", "cluster", "g1", "-o", "json"]);
    assert!(!json.contains("hunter2"), "{}", json);
    let clusters: serde_json::Value = serde_json::from_str(&json).unwrap();
    let gke = &clusters[0]["spec"]["config"]["cloud"]["gke"];
    assert_eq!(gke["userName"], "admin");
    assert_eq!(gke["password"], "*****");
    let yaml = stdout(&config, &["get", "cluster", "-o", "yaml"]);
    assert!(!yaml.contains("hunter2"), "{}", yaml);
}
