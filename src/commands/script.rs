use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::args::{self, OptionSpec, ParseError};
use crate::config::HostConfig;
use crate::runner::{ExternalCommandRunner, RunError};

pub const EXIT_OK: i32 = 0;
pub const EXIT_USAGE: i32 = 1;
pub const EXIT_EXEC: i32 = 2;

pub const SCRIPT_BANNER: &str = "stratos script <scriptname>";

#[derive(Debug, Serialize)]
pub struct ScriptResult {
    pub script: String,
    pub extra_args: Vec<String>,
    pub first_line: Option<String>,
    pub host_exit_code: i32,
}

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Run(#[from] RunError),
    #[error("host command exited with status {code}")]
    HostFailed { code: i32 },
}

impl ScriptError {
    pub fn exit_code(&self) -> i32 {
        match self {
            ScriptError::Parse(ParseError::HelpRequested(_)) => EXIT_OK,
            ScriptError::Parse(_) => EXIT_USAGE,
            ScriptError::Run(RunError::Interrupted { signal }) => 128 + signal,
            ScriptError::Run(_) | ScriptError::HostFailed { .. } => EXIT_EXEC,
        }
    }
}

pub fn script_option_spec() -> OptionSpec {
    OptionSpec {
        verb: "script",
        banner: SCRIPT_BANNER,
        flags: vec![],
        positional_name: "scriptname",
        min_positionals: 1,
    }
}

/// Parse the verb's arguments, run the host command once and keep the first
/// line of what it prints.
pub fn cmd_script(
    argv: &[String],
    host: &HostConfig,
    runner: &ExternalCommandRunner,
) -> Result<ScriptResult, ScriptError> {
    let parsed = args::parse(argv, &script_option_spec())?;
    debug!(options = ?parsed.options, "script options");

    let mut positionals = parsed.positionals.into_iter();
    let Some(script) = positionals.next() else {
        return Err(ParseError::MissingRequiredArgument("scriptname".to_string()).into());
    };
    let extra_args: Vec<String> = positionals.collect();
    info!(script = %script, extra_args = ?extra_args, "script arguments parsed");

    let result = runner.run(&host.command_line())?;

    if !result.success() {
        if host.fail_on_nonzero {
            return Err(ScriptError::HostFailed {
                code: result.exit_code,
            });
        }
        warn!(
            exit_code = result.exit_code,
            stderr = %result.stderr.trim_end(),
            "host command exited with non-zero status"
        );
    }

    Ok(ScriptResult {
        script,
        extra_args,
        first_line: result.first_line().map(str::to_string),
        host_exit_code: result.exit_code,
    })
}

pub fn format_script_human(result: &ScriptResult) -> String {
    result.first_line.clone().unwrap_or_default()
}

/// Diagnostic text for stderr. Help text is not a diagnostic and returns None.
pub fn format_script_error(err: &ScriptError) -> Option<String> {
    match err {
        ScriptError::Parse(ParseError::HelpRequested(_)) => None,
        ScriptError::Parse(e) => Some(format!("error: {}\nUsage: {}", e, SCRIPT_BANNER)),
        other => Some(format!("error: {}", render_chain(other))),
    }
}

fn render_chain(err: &dyn std::error::Error) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        text.push_str(": ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text
}
