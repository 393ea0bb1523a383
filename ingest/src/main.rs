use std::{io, path::PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use junit_ingest::junit::{capture::CapturePolicy, codec, parser};
use tracing_subscriber::prelude::*;

#[derive(Debug, Parser)]
#[command(version, about = "Utilities for working with JUnit reports.")]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
    /// Log recovered dialect quirks while parsing
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum OutputFormat {
    #[default]
    Debug,
    Json,
    Xml,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    Junit {
        /// JUnit XML file to parse
        junit_xml_file: PathBuf,
        /// Keep console output of any length instead of truncating it
        #[arg(long, env = "JUNIT_KEEP_LONG_STDIO")]
        keep_long_stdio: bool,
        /// How to print the parsed suites
        #[arg(long, value_enum, default_value_t)]
        format: OutputFormat,
        /// Also print the recovered dialect quirks
        #[arg(long)]
        diagnostics: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let Cli { command, verbose } = Cli::parse();
    let level = if verbose {
        tracing::metadata::LevelFilter::DEBUG
    } else {
        tracing::metadata::LevelFilter::INFO
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(level)
        .init();

    match command {
        Command::Junit {
            junit_xml_file,
            keep_long_stdio,
            format,
            diagnostics,
        } => {
            let report = parser::parse_with_policy(
                &junit_xml_file,
                CapturePolicy::new(keep_long_stdio),
            )?;
            tracing::info!(
                shape = ?report.shape,
                suites = report.suites.len(),
                "parsed {}",
                junit_xml_file.display()
            );

            match format {
                OutputFormat::Debug => println!("{:#?}", report.suites),
                OutputFormat::Json => {
                    serde_json::to_writer_pretty(io::stdout(), &report.suites)?;
                    println!();
                }
                OutputFormat::Xml => {
                    for suite in &report.suites {
                        codec::write_suite(suite, io::stdout())?;
                        println!();
                    }
                }
            }

            if diagnostics {
                println!("Diagnostics:");
                for diagnostic in &report.diagnostics {
                    println!("  {diagnostic}");
                }
            }
        }
    }

    Ok(())
}
