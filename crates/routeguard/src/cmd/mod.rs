use clap::{Args, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::exit::{io_error, json_error, CliResult};
use crate::output::OutputFormat;

pub mod check;
pub mod kinds;
pub mod simulate;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Validate a configuration document against a catalog kind.
    Check(CheckArgs),
    /// List the configuration kinds the registry knows.
    Kinds(KindsArgs),
    /// Run a request fixture through a route's validation policy.
    Simulate(SimulateArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Check(args) => check::run(args, format),
        Command::Kinds(args) => kinds::run(args, format),
        Command::Simulate(args) => simulate::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Configuration kind, e.g. `server`, `routeConfig`, `cachePolicy`.
    pub kind: String,
    /// JSON document to validate.
    pub file: PathBuf,
    /// Label included in the error message (a route path, a plugin name).
    #[arg(long)]
    pub context: Option<String>,
}

#[derive(Args, Debug, Default)]
pub struct KindsArgs {}

#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Route configuration (the `config` object of a route).
    pub route: PathBuf,
    /// Request fixture: headers, params, query, payload, connection, response.
    pub request: PathBuf,
    /// Seed for response sampling draws.
    #[arg(long)]
    pub seed: Option<u64>,
    /// Reject properties that JSON Schema documents do not declare.
    #[arg(long)]
    pub strict: bool,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub(crate) fn read_json(path: &Path) -> CliResult<Value> {
    let text = fs::read_to_string(path)
        .map_err(|err| io_error(&format!("failed reading {}", path.display()), err))?;
    serde_json::from_str(&text)
        .map_err(|err| json_error(&format!("{} is not valid JSON", path.display()), err))
}
