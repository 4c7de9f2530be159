use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "stratos",
    version,
    about = "Script subcommand for the host orchestration tool"
)]
pub struct Cli {
    #[arg(long, global = true)]
    pub json: bool,

    /// Logging level (overrides STRATOS_LOG and the config file)
    #[arg(long, global = true, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Path to the config file (overrides STRATOS_CONFIG)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run a script against the host tool
    #[command(disable_help_flag = true)]
    Script {
        /// Raw arguments, parsed by the script command itself
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        argv: Vec<String>,
    },
    /// Print the default config path and exit
    ConfigPath,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}
