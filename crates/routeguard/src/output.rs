use std::io::IsTerminal;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use routeguard_schema::{ConfigError, Detail, SchemaKind};
use serde::Serialize;
use serde_json::Value;

use crate::cmd::simulate::SimulationReport;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct CheckOutput<'a> {
    kind: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    context: Option<&'a str>,
    valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<&'a Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<&'a [Detail]>,
}

#[derive(Serialize)]
struct KindOutput {
    kind: &'static str,
    description: &'static str,
}

pub fn print_check_passed(
    kind: SchemaKind,
    context: Option<&str>,
    value: &Value,
    format: OutputFormat,
) {
    match format {
        OutputFormat::Json => print_json(&CheckOutput {
            kind: kind.as_str(),
            context,
            valid: true,
            value: Some(value),
            details: None,
        }),
        OutputFormat::Table => {
            let mut table = new_table(vec!["KIND", "VALID"]);
            table.add_row(vec![kind.as_str().to_string(), "yes".to_string()]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!("{kind} options are valid");
            println!("{}", to_pretty(value));
        }
    }
}

pub fn print_check_failed(err: &ConfigError, context: Option<&str>, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&CheckOutput {
            kind: err.kind().as_str(),
            context,
            valid: false,
            value: None,
            details: Some(err.details()),
        }),
        OutputFormat::Table => {
            let mut table = new_table(vec!["#", "PATH", "MESSAGE"]);
            for (index, detail) in err.details().iter().enumerate() {
                table.add_row(vec![
                    (index + 1).to_string(),
                    detail.path.clone(),
                    detail.message.clone(),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => println!("{err}"),
    }
}

pub fn print_kinds(format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let kinds: Vec<KindOutput> = SchemaKind::ALL
                .into_iter()
                .map(|kind| KindOutput {
                    kind: kind.as_str(),
                    description: kind.description(),
                })
                .collect();
            print_json(&kinds);
        }
        OutputFormat::Table => {
            let mut table = new_table(vec!["KIND", "DESCRIPTION"]);
            for kind in SchemaKind::ALL {
                table.add_row(vec![kind.as_str(), kind.description()]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for kind in SchemaKind::ALL {
                println!("{:<16} {}", kind.as_str(), kind.description());
            }
        }
    }
}

pub fn print_simulation(report: &SimulationReport, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(report),
        OutputFormat::Table => {
            let mut table = new_table(vec!["STAGE", "OUTCOME", "STATUS", "MESSAGE"]);
            for step in &report.steps {
                table.add_row(vec![
                    step.stage.to_string(),
                    step.outcome.to_string(),
                    step.status.map(|s| s.to_string()).unwrap_or_default(),
                    step.message.clone().unwrap_or_default(),
                ]);
            }
            println!("{table}");
            println!("log events: {}", report.events.len());
        }
        OutputFormat::Pretty => {
            for step in &report.steps {
                match (&step.status, &step.message) {
                    (Some(status), Some(message)) => {
                        println!("{}: {} {status} {message}", step.stage, step.outcome)
                    }
                    (Some(status), None) => println!("{}: {} {status}", step.stage, step.outcome),
                    _ => println!("{}: {}", step.stage, step.outcome),
                }
            }
            for event in &report.events {
                println!("[{}] {}", event.tags.join(","), event.data);
            }
        }
    }
}

fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

fn print_json<T: Serialize + ?Sized>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

fn to_pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}
