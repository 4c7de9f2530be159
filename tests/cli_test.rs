use assert_cmd::Command;
use predicates::prelude::*;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Writes a config that points the host command at `sh -c <script>`.
fn sh_host_config(dir: &TempDir, script: &str) -> PathBuf {
    let path = dir.path().join("config.toml");
    let contents = format!(
        "[host]\nprogram = \"sh\"\nargs = [\"-c\", {}]\n",
        toml_string(script)
    );
    std::fs::write(&path, contents).unwrap();
    path
}

fn toml_string(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

fn stratos(config: &Path) -> Command {
    let mut cmd = Command::cargo_bin("stratos").unwrap();
    cmd.env_remove("STRATOS_LOG")
        .env_remove("STRATOS_CONFIG")
        .arg("--config")
        .arg(config);
    cmd
}

#[test]
fn help_exits_zero() {
    Command::cargo_bin("stratos")
        .unwrap()
        .arg("--help")
        .assert()
        .success();
}

#[test]
fn no_args_shows_help() {
    Command::cargo_bin("stratos")
        .unwrap()
        .assert()
        .code(1);
}

#[test]
fn unknown_subcommand_is_usage_error() {
    Command::cargo_bin("stratos")
        .unwrap()
        .arg("frobnicate")
        .assert()
        .code(1);
}

#[cfg(unix)]
#[test]
fn prints_first_line_of_host_output() {
    let tmp = TempDir::new().unwrap();
    let config = sh_host_config(&tmp, r"printf 'a\nb\nc\n'");
    stratos(&config)
        .args(["script", "deploy.rb"])
        .assert()
        .success()
        .stdout("a\n");
}

#[cfg(unix)]
#[test]
fn empty_host_output_prints_nothing() {
    let tmp = TempDir::new().unwrap();
    let config = sh_host_config(&tmp, "true");
    stratos(&config)
        .args(["script", "deploy.rb"])
        .assert()
        .success()
        .stdout("");
}

#[cfg(unix)]
#[test]
fn crlf_output_is_split() {
    let tmp = TempDir::new().unwrap();
    let config = sh_host_config(&tmp, r"printf 'first\r\nsecond\r\n'");
    stratos(&config)
        .args(["script", "deploy.rb"])
        .assert()
        .success()
        .stdout("first\n");
}

#[cfg(unix)]
#[test]
fn json_output() {
    let tmp = TempDir::new().unwrap();
    let config = sh_host_config(&tmp, "echo hello; echo world");
    let out = stratos(&config)
        .args(["--json", "script", "deploy.rb"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let json: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(json["script"], "deploy.rb");
    assert_eq!(json["first_line"], "hello");
    assert_eq!(json["host_exit_code"], 0);
}

#[test]
fn missing_scriptname_is_usage_error() {
    let tmp = TempDir::new().unwrap();
    let config = sh_host_config(&tmp, "echo should-not-run");
    stratos(&config)
        .arg("script")
        .assert()
        .code(1)
        .stdout("")
        .stderr(predicate::str::contains("missing required argument"))
        .stderr(predicate::str::contains("Usage: stratos script <scriptname>"));
}

#[test]
fn unknown_flag_is_usage_error() {
    let tmp = TempDir::new().unwrap();
    let config = sh_host_config(&tmp, "echo should-not-run");
    stratos(&config)
        .args(["script", "--bogus", "deploy.rb"])
        .assert()
        .code(1)
        .stdout("")
        .stderr(predicate::str::contains("unknown flag"));
}

#[test]
fn script_help_prints_banner() {
    let tmp = TempDir::new().unwrap();
    let config = sh_host_config(&tmp, "echo should-not-run");
    stratos(&config)
        .args(["script", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("stratos script <scriptname>"));
}

#[test]
fn missing_host_executable_is_execution_error() {
    let tmp = TempDir::new().unwrap();
    let config = tmp.path().join("config.toml");
    std::fs::write(&config, "[host]\nprogram = \"stratos-no-such-host\"\n").unwrap();
    stratos(&config)
        .args(["script", "deploy.rb"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("executable not found: stratos-no-such-host"));
}

#[cfg(unix)]
#[test]
fn non_text_output_is_execution_error() {
    let tmp = TempDir::new().unwrap();
    let config = sh_host_config(&tmp, r"printf '\377\n'");
    stratos(&config)
        .args(["script", "deploy.rb"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("not valid UTF-8"));
}

#[cfg(unix)]
#[test]
fn nonzero_host_status_still_succeeds_by_default() {
    let tmp = TempDir::new().unwrap();
    let config = sh_host_config(&tmp, "echo usage-line; exit 1");
    stratos(&config)
        .args(["script", "deploy.rb"])
        .assert()
        .success()
        .stdout("usage-line\n");
}

#[cfg(unix)]
#[test]
fn nonzero_host_status_fails_when_configured() {
    let tmp = TempDir::new().unwrap();
    let config = tmp.path().join("config.toml");
    std::fs::write(
        &config,
        "[host]\nprogram = \"sh\"\nargs = [\"-c\", \"exit 5\"]\nfail_on_nonzero = true\n",
    )
    .unwrap();
    stratos(&config)
        .args(["script", "deploy.rb"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("exited with status 5"));
}

#[test]
fn invalid_config_is_reported() {
    let tmp = TempDir::new().unwrap();
    let config = tmp.path().join("config.toml");
    std::fs::write(&config, "[log]\nlevel = \"shouty\"\n").unwrap();
    stratos(&config)
        .args(["script", "deploy.rb"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("log.level"));
}

#[cfg(unix)]
#[test]
fn repeated_runs_are_identical() {
    let tmp = TempDir::new().unwrap();
    let config = sh_host_config(&tmp, "echo same");
    let first = stratos(&config).args(["script", "x.rb"]).output().unwrap();
    let second = stratos(&config).args(["script", "x.rb"]).output().unwrap();
    assert_eq!(first.status.code(), second.status.code());
    assert_eq!(first.stdout, second.stdout);
}

#[cfg(unix)]
#[test]
fn debug_logging_goes_to_stderr() {
    let tmp = TempDir::new().unwrap();
    let config = sh_host_config(&tmp, "echo only-this");
    stratos(&config)
        .args(["--log-level", "debug", "script", "deploy.rb"])
        .assert()
        .success()
        .stdout("only-this\n")
        .stderr(predicate::str::contains("spawning host command"))
        .stderr(predicate::str::contains("\x1b[").not());
}

#[cfg(unix)]
#[test]
fn closed_stdout_exits_quietly() {
    use std::process::Stdio;

    let tmp = TempDir::new().unwrap();
    // The host is slow enough that the reader below is gone before we print.
    let config = sh_host_config(&tmp, "sleep 0.3; yes | head -c 100000");

    let mut child = std::process::Command::new(assert_cmd::cargo::cargo_bin("stratos"))
        .arg("--config")
        .arg(&config)
        .args(["script", "deploy.rb"])
        .env_remove("STRATOS_LOG")
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();
    drop(child.stdout.take());

    let output = child.wait_with_output().unwrap();
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert_eq!(output.status.code(), Some(0), "stderr: {stderr}");
    assert!(!stderr.contains("panicked"), "stderr: {stderr}");
}

#[cfg(unix)]
#[test]
fn sigterm_is_forwarded_to_host_command() {
    use std::time::{Duration, Instant};

    let tmp = TempDir::new().unwrap();
    let config = sh_host_config(&tmp, "exec sleep 30");

    let mut child = std::process::Command::new(assert_cmd::cargo::cargo_bin("stratos"))
        .arg("--config")
        .arg(&config)
        .args(["script", "deploy.rb"])
        .env_remove("STRATOS_LOG")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .spawn()
        .unwrap();

    std::thread::sleep(Duration::from_millis(500));
    let started = Instant::now();
    unsafe {
        libc::kill(child.id() as i32, libc::SIGTERM);
    }
    let status = child.wait().unwrap();

    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(status.code(), Some(128 + libc::SIGTERM));
}
