mod args;
mod cli;
mod commands;
mod config;
mod logging;
mod runner;
mod signals;
mod testutil;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Command};
use commands::{EXIT_OK, EXIT_USAGE};
use runner::ExternalCommandRunner;
use std::io::{self, Write};

fn main() {
    if !signals::install() {
        eprintln!("warning: could not install signal handlers");
    }

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = if e.use_stderr() { EXIT_USAGE } else { EXIT_OK };
            let _ = e.print();
            std::process::exit(code);
        }
    };

    let code = match run(cli) {
        Ok(code) => code,
        Err(e) if is_broken_pipe(&e) => EXIT_OK,
        Err(e) => {
            eprintln!("error: {:#}", e);
            EXIT_USAGE
        }
    };
    let _ = io::stdout().flush();
    std::process::exit(code);
}

fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Command::ConfigPath => {
            write_line(&config::default_config_path()?.display().to_string())?;
            Ok(EXIT_OK)
        }
        Command::Script { argv } => {
            let config = config::load(cli.config.as_deref())?;
            logging::init_logging(cli.log_level, config.log.level.as_deref());

            match commands::cmd_script(&argv, &config.host, &ExternalCommandRunner::new()) {
                Ok(result) => {
                    output(&result, cli.json, commands::format_script_human)?;
                    Ok(EXIT_OK)
                }
                Err(commands::ScriptError::Parse(args::ParseError::HelpRequested(help))) => {
                    write_text(&help)?;
                    Ok(EXIT_OK)
                }
                Err(e) => {
                    if let Some(text) = commands::format_script_error(&e) {
                        eprintln!("{}", text);
                    }
                    Ok(e.exit_code())
                }
            }
        }
    }
}

fn output<T: serde::Serialize>(result: &T, json: bool, human_fn: fn(&T) -> String) -> Result<()> {
    let text = if json {
        serde_json::to_string_pretty(result)?
    } else {
        human_fn(result)
    };
    if !text.is_empty() {
        write_line(&text)?;
    }
    Ok(())
}

// Writes that fail (e.g. a reader that exited early) surface as errors
// instead of the panic `println!` would raise.
fn write_text(text: &str) -> io::Result<()> {
    let mut out = io::stdout().lock();
    out.write_all(text.as_bytes())?;
    out.flush()
}

fn write_line(text: &str) -> io::Result<()> {
    let mut out = io::stdout().lock();
    writeln!(out, "{}", text)?;
    out.flush()
}

/// A downstream reader that stops reading is not our failure.
fn is_broken_pipe(err: &anyhow::Error) -> bool {
    err.chain()
        .filter_map(|cause| cause.downcast_ref::<io::Error>())
        .any(|e| e.kind() == io::ErrorKind::BrokenPipe)
}
