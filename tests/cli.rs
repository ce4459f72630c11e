use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const CREDENTIAL_VARS: [&str; 6] = [
    "CLOUDSMITH_API_KEY",
    "CLOUDSMITH_API_HOST",
    "CLOUDSMITH_API_PROXY",
    "CLOUDSMITH_API_USER_AGENT",
    "CLOUDSMITH_LOGIN",
    "CLOUDSMITH_PASSWORD",
];

/// A command with a scrubbed environment: no CLOUDSMITH_* vars and an
/// empty config dir, so nothing leaks in from the host machine.
fn scrubbed_command() -> (Command, TempDir) {
    let config_home = TempDir::new().expect("temp config home");
    let mut cmd = Command::cargo_bin("cloudsmith").expect("binary exists");
    for var in CREDENTIAL_VARS {
        cmd.env_remove(var);
    }
    cmd.env("XDG_CONFIG_HOME", config_home.path());
    (cmd, config_home)
}

#[test]
fn help_lists_the_commands() {
    let (mut cmd, _home) = scrubbed_command();
    cmd.arg("--help");
    cmd.assert()
        .success()
        .stdout(
            predicate::str::contains("push")
                .and(predicate::str::contains("check"))
                .and(predicate::str::contains("list")),
        );
}

#[test]
fn check_without_credentials_exits_with_credential_code() {
    let (mut cmd, _home) = scrubbed_command();
    cmd.arg("check").arg("--no-prompt");
    cmd.assert()
        .failure()
        .code(3)
        .stderr(predicate::str::contains("credentials"));
}

#[test]
fn push_without_distribution_is_a_validation_failure() {
    let (mut cmd, _home) = scrubbed_command();
    let package_dir = TempDir::new().expect("temp package dir");
    let package = package_dir.path().join("demo.deb");
    std::fs::write(&package, b"bytes").expect("write package");

    // Credentials resolve from the flag; the missing distribution is
    // caught by pre-flight validation before any network call.
    cmd.arg("push")
        .arg("acme/widgets")
        .arg(&package)
        .arg("--no-prompt")
        .arg("--api-key")
        .arg("test-key");
    cmd.assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("validation"));
}

#[test]
fn push_to_malformed_repository_is_a_validation_failure() {
    let (mut cmd, _home) = scrubbed_command();
    let package_dir = TempDir::new().expect("temp package dir");
    let package = package_dir.path().join("demo.deb");
    std::fs::write(&package, b"bytes").expect("write package");

    cmd.arg("push")
        .arg("no-slash")
        .arg(&package)
        .arg("--distribution")
        .arg("ubuntu/focal")
        .arg("--no-prompt")
        .arg("--api-key")
        .arg("test-key");
    cmd.assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("OWNER/REPO"));
}

#[test]
fn missing_explicit_config_file_is_reported() {
    let (mut cmd, _home) = scrubbed_command();
    cmd.arg("--config")
        .arg("/definitely/not/here.yaml")
        .arg("check")
        .arg("--no-prompt");
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("does not exist"));
}
