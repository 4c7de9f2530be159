use clap::error::{ContextKind, ContextValue, ErrorKind};
use clap::{Arg, ArgAction};
use std::collections::BTreeMap;
use thiserror::Error;

const POSITIONALS_ID: &str = "positionals";

/// A flag recognised by a verb. Flags without a value are recorded as `"true"`.
#[derive(Debug, Clone)]
pub struct FlagSpec {
    pub long: &'static str,
    pub short: Option<char>,
    pub takes_value: bool,
    pub help: &'static str,
}

/// Describes what a verb accepts on its command line.
#[derive(Debug, Clone)]
pub struct OptionSpec {
    pub verb: &'static str,
    pub banner: &'static str,
    pub flags: Vec<FlagSpec>,
    pub positional_name: &'static str,
    pub min_positionals: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedArguments {
    pub positionals: Vec<String>,
    pub options: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unknown flag: {0}")]
    UnknownFlag(String),
    #[error("missing required argument: <{0}>")]
    MissingRequiredArgument(String),
    #[error("malformed value: {0}")]
    MalformedValue(String),
    /// `-h`/`--help` was given; carries the rendered help text.
    #[error("help requested")]
    HelpRequested(String),
}

impl OptionSpec {
    fn to_command(&self) -> clap::Command {
        let mut cmd = clap::Command::new(self.verb)
            .no_binary_name(true)
            .override_usage(self.banner)
            .disable_version_flag(true)
            .arg(
                Arg::new(POSITIONALS_ID)
                    .value_name(self.positional_name)
                    .num_args(0..)
                    .action(ArgAction::Append),
            );

        for flag in &self.flags {
            let mut arg = Arg::new(flag.long).long(flag.long).help(flag.help);
            if let Some(short) = flag.short {
                arg = arg.short(short);
            }
            arg = if flag.takes_value {
                arg.action(ArgAction::Set).num_args(1)
            } else {
                arg.action(ArgAction::SetTrue)
            };
            cmd = cmd.arg(arg);
        }

        cmd
    }
}

/// Split `args` into recognised options and positionals according to `spec`.
pub fn parse(args: &[String], spec: &OptionSpec) -> Result<ParsedArguments, ParseError> {
    let matches = spec
        .to_command()
        .try_get_matches_from(args)
        .map_err(classify)?;

    let positionals: Vec<String> = matches
        .get_many::<String>(POSITIONALS_ID)
        .map(|values| values.cloned().collect())
        .unwrap_or_default();

    if positionals.len() < spec.min_positionals {
        return Err(ParseError::MissingRequiredArgument(
            spec.positional_name.to_string(),
        ));
    }

    let mut options = BTreeMap::new();
    for flag in &spec.flags {
        if flag.takes_value {
            if let Some(value) = matches.get_one::<String>(flag.long) {
                options.insert(flag.long.to_string(), value.clone());
            }
        } else if matches.get_flag(flag.long) {
            options.insert(flag.long.to_string(), "true".to_string());
        }
    }

    Ok(ParsedArguments {
        positionals,
        options,
    })
}

fn classify(err: clap::Error) -> ParseError {
    match err.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
            ParseError::HelpRequested(err.to_string())
        }
        ErrorKind::UnknownArgument => ParseError::UnknownFlag(invalid_arg(&err)),
        ErrorKind::MissingRequiredArgument => {
            ParseError::MissingRequiredArgument(invalid_arg(&err))
        }
        _ => ParseError::MalformedValue(first_line(&err)),
    }
}

fn invalid_arg(err: &clap::Error) -> String {
    match err.get(ContextKind::InvalidArg) {
        Some(ContextValue::String(s)) => s.clone(),
        _ => first_line(err),
    }
}

fn first_line(err: &clap::Error) -> String {
    let rendered = err.to_string();
    rendered
        .lines()
        .next()
        .unwrap_or_default()
        .trim_start_matches("error: ")
        .to_string()
}
