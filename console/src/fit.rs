use std::path::PathBuf;

use acmr::prelude::*;
use clap::Args;
use console::style;
use log::info;
use serde::Serialize;

use crate::utils::{read_series, tsv_writer, write_json, UtilsArgs};

#[derive(Args, Debug, Clone)]
pub struct FitArgs {
    #[arg(value_parser, help = "Delimited file with a header row.")]
    input: PathBuf,

    #[arg(long, short = 'c', help = "Column holding the series. Defaults to the first column.")]
    column: Option<String>,

    #[arg(
        long,
        short = 'k',
        conflicts_with = "penalty",
        help = "Fit exactly this many monotone segments."
    )]
    segments: Option<usize>,

    #[arg(
        long,
        short = 'p',
        default_value = "bic",
        help = "Per-segment penalty: bic, aic or a non-negative number."
    )]
    penalty: Penalty,

    #[arg(long = "min-len", default_value_t = 1, help = "Minimal segment length.")]
    min_len: usize,

    #[arg(
        long = "min-prominence",
        default_value_t = 0.0,
        help = "Drop extrema whose swing is smaller than this value."
    )]
    min_prominence: f64,

    #[arg(long, short = 'o', help = "Output TSV with the decomposition.")]
    output: PathBuf,

    #[arg(long, help = "Write a JSON summary of the fit to this path.")]
    summary: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct FitRow {
    index:     usize,
    observed:  f64,
    fitted:    f64,
    residual:  f64,
    segment:   usize,
    direction: Direction,
}

#[derive(Debug, Serialize)]
struct FitSummary<'a> {
    n:              usize,
    objective:      f64,
    penalty:        Option<f64>,
    breakpoints:    Vec<usize>,
    turning_points: Vec<(usize, ExtremumKind)>,
    segments:       &'a [Segment],
}

impl FitArgs {
    fn config(&self) -> SegmentationConfig {
        let stopping = match self.segments {
            Some(k) => Stopping::KnownSegments(k),
            None => Stopping::Penalized(self.penalty),
        };
        SegmentationConfig::default()
            .with_stopping(stopping)
            .with_min_segment_len(self.min_len)
            .with_min_prominence(self.min_prominence)
    }

    pub fn run(&self, _utils: &UtilsArgs) -> anyhow::Result<()> {
        let y = read_series(&self.input, self.column.as_deref())?;
        info!("Read {} values from {}", y.len(), self.input.display());

        let segmenter = Segmenter::new(self.config())?;
        let decomposition = segmenter.fit(&y)?;

        let mut writer = tsv_writer(&self.output)?;
        let labels = decomposition.segment_labels();
        for idx in 0..decomposition.len() {
            let segment = &decomposition.segments()[labels[idx]];
            writer.serialize(FitRow {
                index:     idx,
                observed:  decomposition.observed()[idx],
                fitted:    decomposition.fitted()[idx],
                residual:  decomposition.residuals()[idx],
                segment:   labels[idx],
                direction: segment.direction,
            })?;
        }
        writer.flush()?;

        if let Some(path) = &self.summary {
            let summary = FitSummary {
                n:              decomposition.len(),
                objective:      decomposition.objective(),
                penalty:        decomposition.penalty(),
                breakpoints:    decomposition.breakpoints(),
                turning_points: decomposition.turning_points(),
                segments:       decomposition.segments(),
            };
            write_json(&summary, Some(path))?;
        }

        eprintln!(
            "{} {} segments, SSE {:.4} -> {}",
            style("Done:").green().bold(),
            style(decomposition.segments().len()).cyan(),
            decomposition.objective(),
            style(self.output.display()).blue(),
        );
        Ok(())
    }
}
