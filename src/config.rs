use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_HOST_PROGRAM: &str = "vagrant";
pub const HOST_PROGRAM_ENV: &str = "STRATOS_HOST_PROGRAM";
pub const CONFIG_ENV: &str = "STRATOS_CONFIG";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub host: HostConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HostConfig {
    /// Host executable. Left unset, it is looked up when the command runs.
    pub program: Option<String>,
    pub args: Vec<String>,
    /// Treat a non-zero exit from the host command as an execution error.
    pub fail_on_nonzero: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogConfig {
    pub level: Option<String>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            program: None,
            args: vec!["help".to_string()],
            fail_on_nonzero: false,
        }
    }
}

impl HostConfig {
    /// The argument vector to spawn. The program comes from the config file,
    /// then `STRATOS_HOST_PROGRAM`, then falls back to `vagrant`.
    pub fn command_line(&self) -> Vec<String> {
        let program = self
            .program
            .clone()
            .or_else(|| {
                std::env::var(HOST_PROGRAM_ENV)
                    .ok()
                    .filter(|p| !p.trim().is_empty())
            })
            .unwrap_or_else(|| DEFAULT_HOST_PROGRAM.to_string());

        let mut line = Vec::with_capacity(self.args.len() + 1);
        line.push(expand_tilde(&program));
        line.extend(self.args.iter().cloned());
        line
    }
}

pub fn default_config_path() -> Result<PathBuf> {
    let proj = directories::ProjectDirs::from("", "", "stratos")
        .context("could not determine config directory")?;
    Ok(proj.config_dir().join("config.toml"))
}

/// Load config from `explicit`, else `STRATOS_CONFIG`, else the default path.
/// Only the default path is allowed to be missing.
pub fn load(explicit: Option<&Path>) -> Result<Config> {
    let named = explicit.map(Path::to_path_buf).or_else(|| {
        std::env::var_os(CONFIG_ENV)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
    });

    if let Some(path) = named {
        return load_config(&path);
    }

    let path = default_config_path()?;
    if !path.exists() {
        return Ok(Config::default());
    }
    load_config(&path)
}

pub fn load_config(path: &Path) -> Result<Config> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config from {}", path.display()))?;
    parse_config(&contents).with_context(|| format!("invalid config at {}", path.display()))
}

pub fn parse_config(contents: &str) -> Result<Config> {
    let config: Config = toml::from_str(contents).context("failed to parse config TOML")?;

    if let Some(program) = &config.host.program {
        if program.trim().is_empty() {
            bail!("host.program must not be empty");
        }
    }

    if let Some(level) = &config.log.level {
        if crate::logging::parse_level(level).is_none() {
            bail!(
                "unknown log.level {:?} (expected error, warn, info, debug or trace)",
                level
            );
        }
    }

    Ok(config)
}

fn expand_tilde(path: &str) -> String {
    let home = || std::env::var("HOME").ok();
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = home() {
            return Path::new(&home).join(rest).to_string_lossy().into_owned();
        }
    } else if path == "~" {
        if let Some(home) = home() {
            return home;
        }
    }
    path.to_string()
}
