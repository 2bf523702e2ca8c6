//! Integration tests for core CLI contract behavior.

use {predicates::prelude::*, std::fs, tempfile::tempdir};

fn cli_cmd() -> assert_cmd::Command {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("sfproot");
    cmd.env_remove("SFPROOT_PORT")
        .env_remove("SFPROOT_BAUD")
        .env_remove("SFPROOT_MODEL")
        .env_remove("SFPROOT_NON_INTERACTIVE");
    cmd
}

#[test]
fn help_exits_zero_and_writes_stdout_only() {
    let mut cmd = cli_cmd();
    cmd.arg("--help")
        .assert()
        .success()
        .code(0)
        .stdout(predicate::str::contains("sfproot"))
        .stderr(predicate::str::is_empty());
}

#[test]
fn help_lists_device_commands() {
    let mut cmd = cli_cmd();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("unlock")
                .and(predicate::str::contains("shell"))
                .and(predicate::str::contains("flash"))
                .and(predicate::str::contains("Examples:")),
        );
}

#[test]
fn version_exits_zero_and_writes_stdout_only() {
    let mut cmd = cli_cmd();
    cmd.arg("--version")
        .assert()
        .success()
        .code(0)
        .stdout(predicate::str::contains("sfproot"))
        .stderr(predicate::str::is_empty());
}

#[test]
fn completions_command_writes_to_stdout() {
    let mut cmd = cli_cmd();
    cmd.args(["completions", "bash"])
        .assert()
        .success()
        .code(0)
        .stdout(predicate::str::contains("sfproot"))
        .stderr(predicate::str::is_empty());
}

#[test]
fn list_ports_json_returns_valid_json() {
    let dir = tempdir().expect("tempdir should be created");
    let mut cmd = cli_cmd();
    let output = cmd
        .current_dir(dir.path())
        .args(["list-ports", "--json"])
        .output()
        .expect("command should execute");

    // Hosts without serial support may fail enumeration; success must be clean JSON
    if output.status.success() {
        let stdout = String::from_utf8_lossy(&output.stdout);
        let parsed: serde_json::Value =
            serde_json::from_str(&stdout).expect("stdout should be valid JSON");
        assert!(parsed.is_array());
    }
}

// ============================================================================
// Exit codes: 0 success, 1 runtime failure, 2 usage error, 130 interrupted
// ============================================================================

#[test]
fn exit_code_two_for_unknown_command() {
    let mut cmd = cli_cmd();
    cmd.arg("unknown-command-xyz")
        .assert()
        .failure()
        .code(2)
        .stdout(predicate::str::is_empty());
}

#[test]
fn exit_code_two_for_invalid_flag() {
    let mut cmd = cli_cmd();
    cmd.arg("--invalid-flag-xyz")
        .assert()
        .failure()
        .code(2);
}

#[test]
fn exit_code_two_for_missing_bank() {
    let mut cmd = cli_cmd();
    cmd.arg("commit")
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("--bank"));
}

#[test]
fn exit_code_two_for_invalid_bank() {
    let mut cmd = cli_cmd();
    cmd.args(["commit", "--bank", "7"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("Expected 0 or 1"));
}

#[test]
fn non_interactive_commit_without_yes_is_usage_error() {
    let dir = tempdir().expect("tempdir should be created");
    let mut cmd = cli_cmd();
    cmd.current_dir(dir.path())
        .args(["--non-interactive", "-p", "/dev/sfproot-test", "commit", "--bank", "1"])
        .assert()
        .failure()
        .code(2)
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("--yes"));
}

#[test]
fn non_interactive_environment_variable_works() {
    let dir = tempdir().expect("tempdir should be created");
    let mut cmd = cli_cmd();
    cmd.current_dir(dir.path())
        .env("SFPROOT_NON_INTERACTIVE", "true")
        .args(["-p", "/dev/sfproot-test", "commit", "--bank", "0"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("--yes"));
}

#[test]
fn upload_missing_image_is_runtime_error() {
    let dir = tempdir().expect("tempdir should be created");
    let missing = dir
        .path()
        .join("missing.bin");

    let mut cmd = cli_cmd();
    cmd.current_dir(dir.path())
        .args(["-q", "-p", "/dev/sfproot-test", "upload"])
        .arg(missing.as_os_str())
        .assert()
        .failure()
        .code(1)
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("Failed to read image"));
}

#[test]
fn flash_empty_image_fails_before_touching_device() {
    let dir = tempdir().expect("tempdir should be created");
    let image = dir
        .path()
        .join("empty.bin");
    fs::write(&image, b"").expect("write empty.bin");

    let mut cmd = cli_cmd();
    cmd.current_dir(dir.path())
        .args(["-p", "/dev/sfproot-test", "flash", "--bank", "1", "--yes"])
        .arg(image.as_os_str())
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("is empty"));
}

#[test]
fn option_terminator_allows_dash_prefixed_image() {
    let dir = tempdir().expect("tempdir should be created");
    let mut cmd = cli_cmd();
    cmd.current_dir(dir.path())
        .args(["-q", "-p", "/dev/sfproot-test", "upload", "--", "-image.bin"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("-image.bin"));
}

#[test]
fn colors_disabled_when_not_tty() {
    let dir = tempdir().expect("tempdir should be created");
    let mut cmd = cli_cmd();
    cmd.current_dir(dir.path())
        .args(["--non-interactive", "-p", "/dev/sfproot-test", "commit", "--bank", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("\x1b[").not());
}

#[test]
fn unknown_command_suggests_similar() {
    let mut cmd = cli_cmd();
    cmd.arg("unlokc")
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("unlock"));
}
