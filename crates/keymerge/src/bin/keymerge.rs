#![forbid(unsafe_code)]

use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgGroup, Parser, ValueEnum};
use keymerge::{
    InputSource, MergeOptions, load_options, merge_sources, write_csv_string,
    write_json_records_string,
};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Csv,
    Json,
}

/// Merge two or more CSV or JSON-record files on shared key columns.
///
/// Every key found in any input yields an output row (a full outer union).
/// Warnings about duplicate or missing keys go to stderr.
#[derive(Debug, Parser)]
#[command(name = "keymerge", version, about)]
#[command(group(ArgGroup::new("inputs").required(true).args(["path", "json"])))]
struct CliArgs {
    /// Key column shared by every input; repeat for composite keys
    #[arg(short = 'k', long = "key", value_name = "COLUMN")]
    keys: Vec<String>,

    /// Delimited-text input files, in dataset order
    #[arg(short = 'p', long = "path", value_name = "FILE", num_args = 1..)]
    path: Vec<PathBuf>,

    /// JSON files holding arrays of flat records, in dataset order
    #[arg(long = "json", value_name = "FILE", num_args = 1..)]
    json: Vec<PathBuf>,

    /// Field delimiter for delimited-text input and output [default: ,]
    #[arg(short = 'd', long, value_parser = parse_delimiter)]
    delimiter: Option<u8>,

    /// Token used when rendering composite keys as a single string
    #[arg(long)]
    separator: Option<String>,

    /// Keep every row of a repeated key and expand them in the output
    #[arg(long)]
    allow_duplicates: bool,

    /// JSON file with merge options; explicit flags take precedence
    #[arg(long, value_name = "FILE")]
    options: Option<PathBuf>,

    /// Write merged rows here instead of stdout
    #[arg(short = 'o', long, value_name = "FILE")]
    output: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Csv)]
    output_format: OutputFormat,

    /// Also write the warnings as JSON to this file
    #[arg(long, value_name = "FILE")]
    diagnostics: Option<PathBuf>,
}

fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "\\t" | "tab" => Ok(b'\t'),
        _ => match value.as_bytes() {
            [byte] => Ok(*byte),
            _ => Err(format!("delimiter must be a single byte, got {value:?}")),
        },
    }
}

impl CliArgs {
    fn merge_options(&self) -> Result<MergeOptions, Box<dyn std::error::Error>> {
        let mut options = match &self.options {
            Some(path) => load_options(path)?,
            None => MergeOptions::default(),
        };
        if !self.keys.is_empty() {
            options.key_columns = self.keys.clone();
        }
        if let Some(delimiter) = self.delimiter {
            options.delimiter = delimiter;
        }
        if let Some(separator) = &self.separator {
            options.key_separator = separator.clone();
        }
        if self.allow_duplicates {
            options.allow_duplicates = true;
        }
        Ok(options)
    }

    fn input_source(&self, options: &MergeOptions) -> InputSource {
        if self.json.is_empty() {
            InputSource::CsvFiles {
                paths: self.path.clone(),
                delimiter: options.delimiter,
            }
        } else {
            InputSource::JsonFiles {
                paths: self.json.clone(),
            }
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("error")),
        )
        .with_writer(io::stderr)
        .init();

    match run(CliArgs::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("keymerge error: {error}");
            ExitCode::from(1)
        }
    }
}

fn run(args: CliArgs) -> Result<(), Box<dyn std::error::Error>> {
    let options = args.merge_options()?;
    let source = args.input_source(&options);
    tracing::debug!(inputs = source.len(), keys = ?options.key_columns, "starting merge");

    let outcome = merge_sources(source, &options)?;

    for warning in outcome.diagnostics.warnings() {
        eprintln!("WARNING: {warning}");
    }
    if let Some(path) = &args.diagnostics {
        let records = outcome.diagnostics.to_records(&options.key_separator);
        fs::write(path, serde_json::to_string_pretty(&records)?)?;
    }

    let rendered = match args.output_format {
        OutputFormat::Csv => write_csv_string(&outcome.table, options.delimiter)?,
        OutputFormat::Json => write_json_records_string(&outcome.table)?,
    };
    match &args.output {
        Some(path) => fs::write(path, rendered)?,
        None => io::stdout().lock().write_all(rendered.as_bytes())?,
    }

    Ok(())
}
