use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{ArgAction, Parser};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::commands::{expand_command_abbrev, known_command_names};
use crate::config::Config;

/// Arguments left for clap plus the `rc.key=value` settings pulled out before parsing.
#[derive(Debug, Clone)]
pub struct PreprocessedArgs {
    pub cleaned_args: Vec<OsString>,
    pub rc_overrides: Vec<(String, String)>,
}

/// One `key=value` (or `key:value`) config setting from the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RcSetting {
    pub key: String,
    pub value: String,
}

impl RcSetting {
    fn split(raw: &str) -> Option<Self> {
        let (key, value) = raw.split_once('=').or_else(|| raw.split_once(':'))?;
        let key = key.trim();
        (!key.is_empty()).then(|| Self {
            key: key.to_string(),
            value: value.trim().to_string(),
        })
    }
}

impl std::str::FromStr for RcSetting {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::split(s).ok_or_else(|| anyhow!("expected KEY=VALUE, got: {s}"))
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "tasklane",
    version,
    about = "Tasklane: to-do lists with a chat assistant",
    disable_help_subcommand = true,
    arg_required_else_help = false
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count)]
    pub quiet: u8,

    #[arg(
        long = "rc",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<RcSetting>()),
        action = ArgAction::Append
    )]
    pub rc_overrides: Vec<RcSetting>,

    #[arg(long = "rcfile")]
    pub rcfile: Option<PathBuf>,

    #[arg(long = "data")]
    pub data: Option<PathBuf>,

    #[arg(long = "api-url")]
    pub api_url: Option<String>,

    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub rest: Vec<OsString>,
}

/// Log level used when `RUST_LOG` is unset. Quiet flags win over verbose ones.
fn default_level(verbose: u8, quiet: u8) -> &'static str {
    match (quiet, verbose) {
        (2.., _) => "error",
        (1, _) | (0, 0) => "warn",
        (0, 1) => "info",
        (0, 2) => "debug",
        (0, _) => "trace",
    }
}

pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let level = default_level(verbose, quiet);
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(level)
            .map_err(|e| anyhow!("invalid log filter {level}: {e}"))?,
    };

    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();
    if let Err(err) = installed {
        debug!(error = %err, "tracing subscriber already installed");
    }
    Ok(())
}

/// Splits positional `rc.key=value` (or `rc.key:value`) settings out of the raw arguments.
/// The binary name is always kept.
#[tracing::instrument(skip_all)]
pub fn preprocess_args(raw: &[OsString]) -> anyhow::Result<PreprocessedArgs> {
    let mut pre = PreprocessedArgs {
        cleaned_args: raw.iter().take(1).cloned().collect(),
        rc_overrides: Vec::new(),
    };

    for arg in raw.iter().skip(1) {
        let setting = arg
            .to_str()
            .and_then(|text| text.strip_prefix("rc."))
            .and_then(RcSetting::split);
        match setting {
            Some(RcSetting { key, value }) => {
                debug!(key = %key, value = %value, "positional rc override");
                pre.rc_overrides.push((format!("rc.{key}"), value));
            }
            None => pre.cleaned_args.push(arg.clone()),
        }
    }

    Ok(pre)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub command: String,
    pub command_args: Vec<String>,
}

impl Invocation {
    #[tracing::instrument(skip(cfg, rest))]
    pub fn parse(cfg: &Config, rest: Vec<OsString>) -> anyhow::Result<Self> {
        let mut tokens = rest
            .into_iter()
            .map(|arg| arg.to_string_lossy().to_string());

        let Some(first) = tokens.next() else {
            let cmd = cfg
                .get("default.command")
                .unwrap_or_else(|| "list".to_string());
            debug!(command = %cmd, "no explicit command, using default");
            return Ok(Self {
                command: cmd,
                command_args: vec![],
            });
        };

        let known = known_command_names();
        let command = expand_command_abbrev(&first, &known)
            .ok_or_else(|| anyhow!("unknown or ambiguous command: {first}"))?;
        debug!(token = %first, expanded = %command, "resolved command token");

        Ok(Self {
            command: command.to_string(),
            command_args: tokens.collect(),
        })
    }
}
