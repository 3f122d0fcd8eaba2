//! Command-line argument parsing for portal-sync.
//!
//! This module turns the raw argument list into a [`CliCommand`].

use std::time::Duration;

/// Parsed CLI command to execute.
#[derive(Debug, Clone, PartialEq)]
pub enum CliCommand {
    /// Show version information
    Version,
    /// Show usage
    Help,
    /// One authenticated GET, printed as JSON
    Get { endpoint: String },
    /// Poll an endpoint and print every change
    Watch {
        endpoint: String,
        interval: Option<Duration>,
        channel: String,
    },
    /// Arguments could not be parsed
    Invalid(String),
}

/// Usage text printed by `--help` and on invalid arguments.
pub const USAGE: &str = "\
Usage:
  portal-sync get <endpoint>
  portal-sync watch <endpoint> [--interval <ms>] [--channel <name>]
  portal-sync --version";

/// Parse command-line arguments and return the appropriate command.
///
/// # Arguments
///
/// * `args` - Iterator of command-line arguments (typically `std::env::args()`)
///
/// # Examples
///
/// ```
/// use portal_sync::cli::args::{parse_args, CliCommand};
///
/// let args = vec!["portal-sync".to_string(), "--version".to_string()];
/// assert_eq!(parse_args(args.into_iter()), CliCommand::Version);
/// ```
pub fn parse_args<I>(args: I) -> CliCommand
where
    I: Iterator<Item = String>,
{
    // Skip the program name
    let mut args = args.skip(1);

    let Some(first) = args.next() else {
        return CliCommand::Help;
    };

    match first.as_str() {
        "--version" | "-V" => CliCommand::Version,
        "--help" | "-h" | "help" => CliCommand::Help,
        "get" => match args.next() {
            Some(endpoint) => CliCommand::Get { endpoint },
            None => CliCommand::Invalid("get requires an endpoint".to_string()),
        },
        "watch" => parse_watch(args),
        other => CliCommand::Invalid(format!("unknown command '{}'", other)),
    }
}

fn parse_watch<I>(mut args: I) -> CliCommand
where
    I: Iterator<Item = String>,
{
    let mut endpoint = None;
    let mut interval = None;
    let mut channel = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--interval" | "-i" => {
                let Some(value) = args.next() else {
                    return CliCommand::Invalid("--interval requires a value".to_string());
                };
                match value.parse::<u64>() {
                    Ok(ms) if ms > 0 => interval = Some(Duration::from_millis(ms)),
                    _ => {
                        return CliCommand::Invalid(format!("invalid interval '{}'", value));
                    }
                }
            }
            "--channel" | "-c" => match args.next() {
                Some(name) => channel = Some(name),
                None => return CliCommand::Invalid("--channel requires a value".to_string()),
            },
            _ if endpoint.is_none() => endpoint = Some(arg),
            _ => return CliCommand::Invalid(format!("unexpected argument '{}'", arg)),
        }
    }

    match endpoint {
        Some(endpoint) => CliCommand::Watch {
            channel: channel.unwrap_or_else(|| endpoint.clone()),
            endpoint,
            interval,
        },
        None => CliCommand::Invalid("watch requires an endpoint".to_string()),
    }
}
