#![cfg(test)]

use std::path::PathBuf;
use tempfile::TempDir;

/// Owned command line from string literals.
pub fn command_line(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|p| p.to_string()).collect()
}

/// Command line that runs `script` under `sh -c`.
pub fn sh(script: &str) -> Vec<String> {
    command_line(&["sh", "-c", script])
}

/// Host config that runs `script` under `sh -c` instead of the real host tool.
pub fn sh_host(script: &str) -> crate::config::HostConfig {
    crate::config::HostConfig {
        program: Some("sh".to_string()),
        args: vec!["-c".to_string(), script.to_string()],
        fail_on_nonzero: false,
    }
}

pub struct TestEnv {
    dir: TempDir,
}

impl TestEnv {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("failed to create temp dir");
        Self { dir }
    }

    pub fn config_path(&self) -> PathBuf {
        self.dir.path().join("config.toml")
    }

    pub fn write_config(&self, contents: &str) -> PathBuf {
        let path = self.config_path();
        std::fs::write(&path, contents).expect("failed to write config");
        path
    }
}
