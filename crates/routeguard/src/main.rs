mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "routeguard", version, about = "Route configuration and request validation CLI")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "info", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_check_subcommand() {
        let cli = Cli::try_parse_from([
            "routeguard",
            "check",
            "routeConfig",
            "/tmp/route.json",
            "--context",
            "/users",
        ])
        .expect("check args should parse");

        let Command::Check(args) = cli.command else {
            panic!("expected check");
        };
        assert_eq!(args.kind, "routeConfig");
        assert_eq!(args.context.as_deref(), Some("/users"));
    }

    #[test]
    fn parses_simulate_with_seed_and_global_format() {
        let cli = Cli::try_parse_from([
            "routeguard",
            "simulate",
            "route.json",
            "request.json",
            "--seed",
            "7",
            "--format",
            "json",
        ])
        .expect("simulate args should parse");

        assert!(matches!(cli.format, Some(OutputFormat::Json)));
        let Command::Simulate(args) = cli.command else {
            panic!("expected simulate");
        };
        assert_eq!(args.seed, Some(7));
        assert!(!args.strict);
    }

    #[test]
    fn check_requires_a_file() {
        let err = Cli::try_parse_from(["routeguard", "check", "server"])
            .expect_err("missing file should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }
}
