use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use acmr::utils::n_threads;
use anyhow::{anyhow, bail, Context};
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, LevelFilter};

#[derive(Args, Debug, Clone)]
pub struct UtilsArgs {
    #[arg(
        long,
        short = 'T',
        default_value_t = 0,
        help = "Number of threads to use. 0 selects all available cores."
    )]
    pub threads: usize,

    #[arg(long, short = 'v', default_value_t = false, help = "Verbose logging.")]
    pub verbose: bool,

    #[arg(long, default_value_t = false, help = "Display progress bar.")]
    pub progress: bool,
}

impl UtilsArgs {
    pub fn setup(&self) -> anyhow::Result<()> {
        if self.threads > 0 {
            // read once by the library thread pool on first use
            std::env::set_var("ACMR_NUM_THREADS", self.threads.to_string());
        }
        let level = if self.verbose {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        };
        pretty_env_logger::formatted_builder()
            .filter_level(level)
            .parse_default_env()
            .try_init()
            .map_err(|e| anyhow!("Failed to initialize logger: {}", e))?;
        debug!("Using {} worker threads", n_threads());
        Ok(())
    }

    pub fn pbar(&self, total: usize) -> anyhow::Result<ProgressBar> {
        if self.progress {
            init_pbar(total)
        } else {
            Ok(ProgressBar::hidden())
        }
    }
}

pub fn init_pbar(total: usize) -> anyhow::Result<ProgressBar> {
    let progress_bar = ProgressBar::new(total as u64);
    progress_bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}, ETA: {eta}] [{bar:40.cyan/blue}] {pos:>5.green}/{len:5} {msg}")?
            .progress_chars("#>-"),
    );
    progress_bar.set_message("Processing...");
    Ok(progress_bar)
}

/// Tab for `.tsv`/`.tab` files, comma otherwise.
pub fn delimiter_for(path: &Path) -> u8 {
    match path.extension().and_then(|e| e.to_str()) {
        Some("tsv") | Some("tab") | Some("txt") => b'\t',
        _ => b',',
    }
}

/// Reads one numeric column from a delimited file with a header row.
///
/// Without `column` the first column is used.
pub fn read_series(path: &PathBuf, column: Option<&str>) -> anyhow::Result<Vec<f64>> {
    let mut reader = csv::ReaderBuilder::default()
        .delimiter(delimiter_for(path))
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    let headers = reader.headers()?.clone();
    let col_idx = match column {
        Some(name) => headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| anyhow!("Column '{}' not found in {}", name, path.display()))?,
        None => 0,
    };

    let mut values = Vec::new();
    for (row_idx, record) in reader.records().enumerate() {
        let record = record?;
        let field = record
            .get(col_idx)
            .ok_or_else(|| anyhow!("Row {} has no column {}", row_idx + 1, col_idx))?;
        let value = field
            .parse::<f64>()
            .with_context(|| format!("Row {}: cannot parse '{}' as a number", row_idx + 1, field))?;
        values.push(value);
    }
    if values.is_empty() {
        bail!("No values read from {}", path.display());
    }
    Ok(values)
}

/// Writes pretty JSON to `path`, or to stdout when `path` is `None`.
pub fn write_json<T: serde::Serialize>(value: &T, path: Option<&PathBuf>) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    match path {
        Some(path) => {
            let mut file = File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            writeln!(file, "{}", json)?;
        },
        None => println!("{}", json),
    }
    Ok(())
}

pub fn tsv_writer(path: &PathBuf) -> anyhow::Result<csv::Writer<File>> {
    csv::WriterBuilder::default()
        .delimiter(b'\t')
        .has_headers(true)
        .from_path(path)
        .with_context(|| format!("Failed to create output file {}", path.display()))
}
