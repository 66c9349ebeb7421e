use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use sql_activity::{
    ExecutionCollection, FrameworkSuggestions, PersistenceFramework, QueryType, ReportBuilder,
    ReportConfig, ReportFormat, ReportSink, SuggestionProvider,
};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sqlactivity")]
#[command(about = "Report on the SQL statements a test executed.")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Render the activity report for captured executions (JSON Lines, `-` for stdin)
    Report {
        input: PathBuf,
        /// Template wrapping the report; `%s` is replaced by the report body
        #[arg(long, default_value = sql_activity::DEFAULT_FORMAT)]
        format: String,
        /// Write the report to this file instead of stdout
        #[arg(long, conflicts_with = "stderr")]
        output: Option<PathBuf>,
        /// Write the report to stderr instead of stdout
        #[arg(long)]
        stderr: bool,
        /// Persistence framework used by the code under test (repeatable)
        #[arg(long = "framework")]
        frameworks: Vec<PersistenceFramework>,
        /// Leave the HINTS block empty
        #[arg(long)]
        no_hints: bool,
    },
    /// Print the literal-free shape of a statement
    Shape { query: String },
    /// Print the detected query type of a statement
    Classify { query: String },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Report {
            input,
            format,
            output,
            stderr,
            frameworks,
            no_hints,
        } => {
            let sink = match (output, stderr) {
                (Some(path), _) => ReportSink::File(path),
                (None, true) => ReportSink::Stderr,
                (None, false) => ReportSink::Stdout,
            };
            let config = ReportConfig {
                format: ReportFormat::parse(&format)?,
                sink,
            };

            let contents = read_input(&input)?;
            let executions = ExecutionCollection::from_json_lines(&contents)
                .with_context(|| format!("failed to decode executions from {}", input.display()))?;
            info!(executions = executions.count(), "loaded captured executions");

            let suggestions = FrameworkSuggestions::new(frameworks);
            let provider = move || {
                if no_hints {
                    Vec::new()
                } else {
                    suggestions.suggestions()
                }
            };
            let builder = ReportBuilder::new(config, provider);
            let rendered = builder.render(&executions);
            write_report(&builder.config().sink, &rendered)?;
        }
        Command::Shape { query } => {
            println!("{}", sql_activity::normalize(&query));
        }
        Command::Classify { query } => {
            let query_type = QueryType::classify(&query);
            println!("{query_type}");
        }
    }

    Ok(())
}

fn read_input(input: &Path) -> anyhow::Result<String> {
    if input.as_os_str() == "-" {
        let mut contents = String::new();
        io::stdin()
            .read_to_string(&mut contents)
            .context("failed to read executions from stdin")?;
        return Ok(contents);
    }
    fs::read_to_string(input)
        .with_context(|| format!("failed to read executions file {}", input.display()))
}

fn write_report(sink: &ReportSink, rendered: &str) -> anyhow::Result<()> {
    debug!(?sink, bytes = rendered.len(), "writing report");
    match sink {
        ReportSink::Stdout => write_verbatim(io::stdout().lock(), rendered)
            .context("failed to write report to stdout")?,
        ReportSink::Stderr => write_verbatim(io::stderr().lock(), rendered)
            .context("failed to write report to stderr")?,
        ReportSink::File(path) => fs::write(path, rendered)
            .with_context(|| format!("failed to write report to {}", path.display()))?,
    }
    Ok(())
}

fn write_verbatim(mut out: impl Write, rendered: &str) -> io::Result<()> {
    out.write_all(rendered.as_bytes())?;
    out.flush()
}
