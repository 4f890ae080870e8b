use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tally_engine::{Engine, EngineConfig, EngineError, ProcessingRequest, Projection};
use tracing_subscriber::EnvFilter;

/// Exit status for requests the engine rejected.
pub const EXIT_ENGINE_ERROR: u8 = 2;
/// Exit status for I/O, argument and configuration failures.
pub const EXIT_FAILURE: u8 = 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Text,
}

#[derive(Debug, Parser)]
#[command(
    name = "tally",
    about = "Redistribute an invoice's total weight across its bags and stamp the workbook."
)]
pub struct Args {
    /// Engine configuration (TOML). Built-in defaults apply when omitted.
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log at debug level (overrides `RUST_LOG`).
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Output format.
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Stamp the workbook and write the processed copy.
    Process {
        #[command(flatten)]
        request: RequestArgs,

        /// Where to write the workbook. Defaults to `<stem>_processed.xlsx` next to the input.
        #[arg(long, short, value_name = "PATH")]
        out: Option<PathBuf>,
    },
    /// Stamp the workbook in memory and print its projection.
    Preview {
        #[command(flatten)]
        request: RequestArgs,
    },
}

#[derive(Debug, clap::Args)]
pub struct RequestArgs {
    /// Invoice workbook (.xlsx).
    pub input: PathBuf,

    /// Registered template type.
    #[arg(long = "template", default_value = "default")]
    pub template_type: String,

    /// Number of bags. Inferred from the template when omitted.
    #[arg(long = "bags")]
    pub bag_count: Option<u64>,

    /// Total weight to distribute. Inferred from pre-filled weights when omitted.
    #[arg(long = "weight")]
    pub target_weight: Option<f64>,

    #[arg(long, default_value_t = -2.0, allow_negative_numbers = true)]
    pub min_percent: f64,

    #[arg(long, default_value_t = 2.0, allow_negative_numbers = true)]
    pub max_percent: f64,

    /// Turn off text wrapping in the cells the engine writes.
    #[arg(long)]
    pub no_wrap: bool,

    /// Invoice date (YYYY-MM-DD, MM/DD/YYYY or DD-MM-YYYY).
    #[arg(long)]
    pub date: Option<String>,

    #[arg(long = "lot")]
    pub lot_number: Option<String>,

    #[arg(long)]
    pub name: Option<String>,

    #[arg(long)]
    pub address: Option<String>,

    /// Extra template label (repeatable).
    #[arg(long = "label", value_name = "NAME=VALUE", value_parser = parse_label)]
    pub labels: Vec<(String, String)>,

    /// Seed for the weight generator. A fresh seed is drawn and reported when omitted.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Include the paginated text rendering.
    #[arg(long)]
    pub render: bool,
}

impl RequestArgs {
    pub fn to_request(&self) -> ProcessingRequest {
        ProcessingRequest {
            template_type: self.template_type.clone(),
            bag_count: self.bag_count,
            target_weight: self.target_weight,
            min_percent: self.min_percent,
            max_percent: self.max_percent,
            preserve_wrapping: !self.no_wrap,
            date: self.date.clone(),
            lot_number: self.lot_number.clone(),
            name: self.name.clone(),
            address: self.address.clone(),
            labels: self.labels.iter().cloned().collect(),
            seed: self.seed,
            filename: self
                .input
                .file_name()
                .map(|name| name.to_string_lossy().into_owned()),
            render_text: self.render,
        }
    }
}

fn parse_label(input: &str) -> std::result::Result<(String, String), String> {
    match input.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected NAME=VALUE, got {input:?}")),
    }
}

#[derive(Debug, Serialize)]
struct ProcessReport<'a> {
    output: String,
    seed: u64,
    weights: &'a [f64],
    projection: &'a Projection,
    #[serde(skip_serializing_if = "Option::is_none")]
    rendering: Option<String>,
}

pub fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    match run_with_args(args, &mut handle) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) if is_broken_pipe(&err) => ExitCode::SUCCESS,
        Err(err) => {
            match err.downcast_ref::<EngineError>() {
                Some(engine) => eprintln!("{}: {engine}", engine.kind()),
                None => eprintln!("error: {err:#}"),
            }
            ExitCode::from(exit_code(&err))
        }
    }
}

/// `RUST_LOG` filtering with an `info` default; `--verbose` forces `debug`.
fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

pub fn exit_code(err: &anyhow::Error) -> u8 {
    if err.downcast_ref::<EngineError>().is_some() {
        EXIT_ENGINE_ERROR
    } else {
        EXIT_FAILURE
    }
}

fn is_broken_pipe(err: &anyhow::Error) -> bool {
    err.downcast_ref::<io::Error>()
        .is_some_and(|e| e.kind() == io::ErrorKind::BrokenPipe)
}

pub fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    let Some(path) = path else {
        return Ok(EngineConfig::default());
    };
    let config = EngineConfig::from_path(path)?;
    config
        .validate()
        .with_context(|| format!("invalid configuration in {}", path.display()))?;
    Ok(config)
}

pub fn run_with_args<W: Write>(args: Args, out: &mut W) -> Result<()> {
    let engine = Engine::new(load_config(args.config.as_deref())?);

    match &args.command {
        Command::Process { request, out: target } => {
            let bytes = read_input(&request.input)?;
            let mut req = request.to_request();
            req.render_text |= args.format == OutputFormat::Text;
            let result = engine.process(&bytes, &req)?;

            let path = target.clone().unwrap_or_else(|| {
                request
                    .input
                    .parent()
                    .unwrap_or_else(|| Path::new(""))
                    .join(&result.filename)
            });
            std::fs::write(&path, &result.bytes)
                .with_context(|| format!("write {}", path.display()))?;
            tracing::info!(
                "wrote {} ({} bags, seed {})",
                path.display(),
                result.weights.len(),
                result.seed
            );

            match args.format {
                OutputFormat::Json => {
                    let report = ProcessReport {
                        output: path.display().to_string(),
                        seed: result.seed,
                        weights: &result.weights,
                        projection: &result.projection,
                        rendering: result.rendering.as_ref().map(ToString::to_string),
                    };
                    serde_json::to_writer(&mut *out, &report)?;
                    out.write_all(b"\n")?;
                }
                OutputFormat::Text => {
                    writeln!(out, "Wrote {}", path.display())?;
                    write_summary(out, &result.projection, result.seed)?;
                    if let Some(rendering) = &result.rendering {
                        writeln!(out)?;
                        writeln!(out, "{rendering}")?;
                    }
                }
            }
        }
        Command::Preview { request } => {
            let bytes = read_input(&request.input)?;
            let mut req = request.to_request();
            req.render_text |= args.format == OutputFormat::Text;
            let result = engine.preview(&bytes, &req)?;

            match args.format {
                OutputFormat::Json => {
                    serde_json::to_writer(&mut *out, &result)?;
                    out.write_all(b"\n")?;
                }
                OutputFormat::Text => {
                    write_summary(out, &result.projection, result.seed)?;
                    if let Some(rendering) = &result.rendering {
                        writeln!(out)?;
                        writeln!(out, "{rendering}")?;
                    }
                }
            }
        }
    }
    Ok(())
}

fn read_input(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("read {}", path.display()))
}

fn write_summary<W: Write>(out: &mut W, projection: &Projection, seed: u64) -> io::Result<()> {
    let meta = &projection.metadata;
    writeln!(
        out,
        "{} ({}): {} bags, total {:.2}, seed {seed}",
        meta.sheet_name, meta.template_type, meta.bag_count, meta.total
    )?;
    if let (Some(min), Some(max), Some(avg)) = (meta.min, meta.max, meta.average) {
        writeln!(out, "  min {min:.2}  max {max:.2}  avg {avg:.2}")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(argv: &[&str]) -> Args {
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn request_flags_map_onto_the_processing_request() {
        let args = parse(&[
            "tally",
            "preview",
            "in/march.xlsx",
            "--bags",
            "25",
            "--weight",
            "1000.5",
            "--min-percent",
            "-1.5",
            "--no-wrap",
            "--label",
            "vessel=MV Tally",
            "--seed",
            "7",
        ]);
        let Command::Preview { request } = &args.command else {
            panic!("expected preview");
        };
        let req = request.to_request();
        assert_eq!(req.template_type, "default");
        assert_eq!(req.bag_count, Some(25));
        assert_eq!(req.target_weight, Some(1000.5));
        assert_eq!(req.min_percent, -1.5);
        assert_eq!(req.max_percent, 2.0);
        assert!(!req.preserve_wrapping);
        assert_eq!(req.labels["vessel"], "MV Tally");
        assert_eq!(req.seed, Some(7));
        assert_eq!(req.filename.as_deref(), Some("march.xlsx"));
    }

    #[test]
    fn labels_need_a_name() {
        assert_eq!(parse_label("a=b=c"), Ok(("a".into(), "b=c".into())));
        assert!(parse_label("=x").is_err());
        assert!(parse_label("novalue").is_err());
    }

    #[test]
    fn engine_errors_exit_with_two() {
        let err = anyhow::Error::from(EngineError::UnknownTemplate("ledger".into()));
        assert_eq!(exit_code(&err), EXIT_ENGINE_ERROR);
        let err = anyhow::anyhow!("read missing.xlsx");
        assert_eq!(exit_code(&err), EXIT_FAILURE);
    }
}
