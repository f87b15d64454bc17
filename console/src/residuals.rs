use std::path::PathBuf;

use acmr::prelude::*;
use clap::{Args, ValueEnum};
use console::style;
use log::info;

use crate::utils::{read_series, write_json, UtilsArgs};

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum CorrectionArg {
    None,
    Bh,
    Bonferroni,
}

impl From<CorrectionArg> for Correction {
    fn from(value: CorrectionArg) -> Self {
        match value {
            CorrectionArg::None => Correction::None,
            CorrectionArg::Bh => Correction::BenjaminiHochberg,
            CorrectionArg::Bonferroni => Correction::Bonferroni,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct ResidualsArgs {
    #[arg(value_parser, help = "Delimited file with a header row, e.g. the output of `acmr fit`.")]
    input: PathBuf,

    #[arg(long, short = 'c', default_value = "residual", help = "Column holding the residuals.")]
    column: String,

    #[arg(long, short = 'a', default_value_t = 0.05, help = "Significance level.")]
    alpha: f64,

    #[arg(long, help = "Ljung-Box lags. Defaults to min(10, n / 5).")]
    lags: Option<usize>,

    #[arg(long, value_enum, default_value_t = CorrectionArg::Bh, help = "Multiple testing correction.")]
    correction: CorrectionArg,

    #[arg(long, short = 'o', help = "Write the JSON report here instead of stdout.")]
    output: Option<PathBuf>,
}

impl ResidualsArgs {
    pub fn run(&self, _utils: &UtilsArgs) -> anyhow::Result<()> {
        let residuals = read_series(&self.input, Some(&self.column))?;
        info!("Testing {} residuals from {}", residuals.len(), self.input.display());

        let report = ResidualTester::default()
            .with_alpha(self.alpha)
            .with_lags(self.lags)
            .with_correction(self.correction.into())
            .run(&residuals)?;

        for result in report.tests.iter() {
            let verdict = if result.rejected {
                style("reject").red().bold()
            } else {
                style("ok").green()
            };
            eprintln!(
                "{:<22} stat={:>10.4} p={:.4} adj={:.4} {}",
                result.test.to_string(),
                result.statistic,
                result.p_value,
                result.adjusted_p_value,
                verdict
            );
        }
        write_json(&report, self.output.as_ref())
    }
}
