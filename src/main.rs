//! Purpose: `yogrt` CLI entry point for shell scripts and batch job wrappers.
//! Role: Binary crate root; parses args, runs one query, emits JSON on stdout.
//! Invariants: Errors go to stderr (JSON unless stderr is a terminal); stdout stays parseable.
//! Invariants: Process exit code is derived from `api::to_exit_code`.
//! Invariants: Logging goes to stderr and defaults to `warn`.
#![allow(clippy::result_large_err)]
use std::io::{self, IsTerminal};

use clap::{Parser, Subcommand};
use serde_json::Value;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing_subscriber::EnvFilter;

mod report_json;

use report_json::{
    capabilities_json, error_json, error_message, interval_json, location_json, remaining_json,
    status_json,
};
use yogrt::api::{Error, ErrorKind, Remaining, SearchConfig, Yogrt, to_exit_code};
use yogrt::core::resolve::PathResolver;
use yogrt::notice::{Notice, notice_json};

#[derive(Parser, Debug)]
#[command(name = "yogrt", version, about = "Query remaining batch-job time via libyogrt")]
struct Cli {
    #[arg(long, help = "Pretty-print JSON output")]
    pretty: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Seconds left in the current allocation.
    Remaining {
        #[arg(
            long,
            help = "Report no limit (with a notice) when libyogrt cannot be found or loaded"
        )]
        allow_unavailable: bool,
    },
    /// Job state as reported by the resource manager.
    Status,
    /// Suggested wait before querying again.
    Interval,
    /// Show where libyogrt and yogrt.h were found, without loading anything.
    Locate,
    /// List the optional libyogrt features the installed library provides.
    Capabilities,
}

#[derive(Copy, Clone, Debug)]
struct RunOutcome {
    exit_code: i32,
}

impl RunOutcome {
    fn ok() -> Self {
        Self { exit_code: 0 }
    }
}

fn main() {
    init_tracing();
    let exit_code = match run() {
        Ok(outcome) => outcome.exit_code,
        Err(err) => {
            emit_error(&err);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run() -> Result<RunOutcome, Error> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) if !err.use_stderr() => {
            err.print().map_err(|io_err| {
                Error::new(ErrorKind::Io)
                    .with_message("failed to write help")
                    .with_source(io_err)
            })?;
            return Ok(RunOutcome::ok());
        }
        Err(err) => {
            let rendered = err.to_string();
            let summary = rendered
                .lines()
                .next()
                .unwrap_or("invalid arguments")
                .trim_start_matches("error: ")
                .to_string();
            return Err(Error::new(ErrorKind::Usage)
                .with_message(summary)
                .with_hint("Run `yogrt --help` for usage."));
        }
    };

    let value = match cli.command {
        Command::Locate => {
            let config = SearchConfig::shared();
            let location = PathResolver::new(config).resolve()?;
            location_json(&location)
        }
        Command::Remaining { allow_unavailable } => {
            let yogrt = Yogrt::new();
            let remaining = match yogrt.get_remaining() {
                Ok(remaining) => remaining,
                Err(err) if allow_unavailable && is_unavailable(&err) => {
                    emit_notice(&unavailable_notice(&err));
                    Remaining::Unlimited
                }
                Err(err) => return Err(err),
            };
            remaining_json(remaining, OffsetDateTime::now_utc())
        }
        Command::Status => status_json(Yogrt::new().get_status()?),
        Command::Interval => interval_json(Yogrt::new().get_poll_interval()?),
        Command::Capabilities => {
            let yogrt = Yogrt::new();
            let caps = yogrt.capabilities()?;
            let location = yogrt.location()?;
            capabilities_json(caps, location.as_ref())
        }
    };

    emit_json(&value, cli.pretty)?;
    Ok(RunOutcome::ok())
}

fn is_unavailable(err: &Error) -> bool {
    matches!(
        err.kind(),
        ErrorKind::DiscoveryFailed | ErrorKind::LoadFailed | ErrorKind::BindingIncomplete
    )
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

fn emit_json(value: &Value, pretty: bool) -> Result<(), Error> {
    let text = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
    .map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("json encode failed")
            .with_source(err)
    })?;
    println!("{text}");
    Ok(())
}

fn emit_error(err: &Error) {
    if io::stderr().is_terminal() {
        eprintln!("error: {}", error_message(err));
        if let Some(hint) = err.hint() {
            eprintln!("hint: {hint}");
        }
        if let Some(path) = err.path() {
            eprintln!("path: {}", path.display());
        }
        return;
    }

    let json = serde_json::to_string(&error_json(err)).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn notice_time_now() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default()
}

fn unavailable_notice(err: &Error) -> Notice {
    Notice::new(
        "unavailable",
        "remaining",
        "libyogrt unavailable; reporting no time limit",
    )
    .at(notice_time_now())
    .with_detail("error_kind", format!("{:?}", err.kind()))
    .with_detail("error", error_message(err))
}

fn emit_notice(notice: &Notice) {
    if io::stderr().is_terminal() {
        eprintln!("notice: {}", notice.message);
        return;
    }
    let json = serde_json::to_string(&notice_json(notice)).unwrap_or_else(|_| {
        "{\"notice\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}
