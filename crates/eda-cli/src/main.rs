use std::fs;
use std::io::{self, BufWriter, Read, Write};
use std::num::ParseFloatError;
use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use eda_signals::{CvxEdaOutput, DecompositionMethod, DecompositionResult, EdaConfig, EdaDecomposer, SolverVariant};
use ndarray::ArrayView1;
use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "eda-cli", version, about = "Split EDA recordings into tonic and phasic components")]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decompose one signal and print its components
    Decompose {
        /// Sample file, one value per line or CSV; `-` reads stdin
        #[arg(short, long)]
        input: String,
        #[arg(short, long)]
        sampling_rate: Option<u32>,
        /// cvxeda, median, smoothmedian, highpass, biopac, acqknowledge
        #[arg(short, long)]
        method: Option<String>,
        /// TOML configuration (EDA_* environment variables still apply)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// cvxEDA problem form: qp or cone
        #[arg(long)]
        solver: Option<String>,
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Csv)]
        format: OutputFormat,
        /// Also print driver and residual (cvxEDA only)
        #[arg(long)]
        diagnostics: bool,
        /// CSV column holding the signal, by header name or zero-based index
        #[arg(long)]
        column: Option<String>,
    },
    /// Print the effective configuration as TOML
    Config {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Csv,
    Json,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Commands::Decompose {
            input,
            sampling_rate,
            method,
            config,
            solver,
            format,
            diagnostics,
            column,
        } => {
            let mut cfg = load_config(config)?;
            if let Some(rate) = sampling_rate {
                cfg.sampling_rate = rate;
            }
            if let Some(m) = method {
                cfg.method = m.parse()?;
            }
            if let Some(s) = solver {
                cfg.cvxeda.solver = s.parse::<SolverVariant>()?;
            }
            cfg.validate()?;

            let text = read_input(&input)?;
            let signal = parse_signal(text.as_bytes(), column.as_deref())?;
            info!(samples = signal.len(), method = %cfg.method, sampling_rate = cfg.sampling_rate, "input loaded");

            let decomposer = EdaDecomposer::new(cfg.decompose_params());
            let stdout = io::stdout();
            let mut out = BufWriter::new(stdout.lock());

            if diagnostics {
                if cfg.method != DecompositionMethod::CvxEda {
                    return Err("--diagnostics is only available for the cvxeda method".into());
                }
                let fit = decomposer.decompose_cvxeda(&signal, cfg.sampling_rate)?;
                write_fit(&mut out, format, &fit)?;
                eprintln!(
                    "status: {}, iterations: {}, objective: {:.6e}",
                    fit.status, fit.iterations, fit.objective
                );
            } else {
                let result = decomposer.decompose_with(&signal, cfg.sampling_rate, cfg.method)?;
                write_result(&mut out, format, &result)?;
            }
            out.flush()?;
        }
        Commands::Config { config } => {
            let cfg = load_config(config)?;
            print!("{}", cfg.to_toml_string()?);
        }
    }
    Ok(())
}

fn load_config(path: Option<PathBuf>) -> Result<EdaConfig, Box<dyn std::error::Error>> {
    let cfg = match path {
        Some(path) => EdaConfig::from_file_with_env(path)?,
        None => {
            let mut cfg = EdaConfig::default();
            cfg.apply_env_overrides()?;
            cfg.validate()?;
            cfg
        }
    };
    Ok(cfg)
}

fn read_input(input: &str) -> io::Result<String> {
    if input == "-" {
        let mut text = String::new();
        io::stdin().read_to_string(&mut text)?;
        Ok(text)
    } else {
        fs::read_to_string(input)
    }
}

#[derive(Debug, Error)]
enum InputError {
    #[error("malformed CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("no column named '{0}'")]
    UnknownColumn(String),
    #[error("column '{0}' needs a header line")]
    NoHeader(String),
    #[error("line {line}: missing column {index}")]
    MissingField { line: u64, index: usize },
    #[error("line {line}: '{value}': {source}")]
    BadValue {
        line: u64,
        value: String,
        source: ParseFloatError,
    },
}

/// Read samples from plain or comma-separated text.
///
/// A first record whose selected field is not a number is a header. `column`
/// picks a field by header name or index; without it the first field is used.
fn parse_signal<R: Read>(input: R, column: Option<&str>) -> Result<Vec<f64>, InputError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(input);

    let mut index = column.and_then(|c| c.parse::<usize>().ok());
    let mut values = Vec::new();
    let mut first = true;
    for record in reader.records() {
        let record = record?;
        if record.iter().all(str::is_empty) {
            continue;
        }
        let line = record.position().map_or(0, |p| p.line());

        if first {
            first = false;
            let is_header = record.get(index.unwrap_or(0)).map_or(true, |f| f.parse::<f64>().is_err());
            if is_header {
                if let (Some(name), None) = (column, index) {
                    let pos = record
                        .iter()
                        .position(|h| h == name)
                        .ok_or_else(|| InputError::UnknownColumn(name.to_string()))?;
                    index = Some(pos);
                }
                continue;
            }
            if let (Some(name), None) = (column, index) {
                return Err(InputError::NoHeader(name.to_string()));
            }
        }

        let i = index.unwrap_or(0);
        let field = record.get(i).ok_or(InputError::MissingField { line, index: i })?;
        let value = field.parse::<f64>().map_err(|source| InputError::BadValue {
            line,
            value: field.to_string(),
            source,
        })?;
        values.push(value);
    }
    Ok(values)
}

fn write_csv<W: Write>(out: W, header: &[&str], columns: &[ArrayView1<f64>]) -> Result<(), csv::Error> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(header)?;
    let rows = columns.first().map_or(0, |c| c.len());
    for i in 0..rows {
        writer.write_record(columns.iter().map(|c| c[i].to_string()))?;
    }
    writer.flush()?;
    Ok(())
}

fn write_result<W: Write>(out: &mut W, format: OutputFormat, result: &DecompositionResult) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut *out, result)?;
            writeln!(out)?;
        }
        OutputFormat::Csv => write_csv(
            &mut *out,
            &["EDA_Tonic", "EDA_Phasic"],
            &[result.tonic.view(), result.phasic.view()],
        )?,
    }
    Ok(())
}

fn write_fit<W: Write>(out: &mut W, format: OutputFormat, fit: &CvxEdaOutput) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut *out, fit)?;
            writeln!(out)?;
        }
        OutputFormat::Csv => write_csv(
            &mut *out,
            &["EDA_Tonic", "EDA_Phasic", "EDA_Driver", "EDA_Residual"],
            &[fit.tonic.view(), fit.phasic.view(), fit.driver.view(), fit.residual.view()],
        )?,
    }
    Ok(())
}
