mod fit;
mod residuals;
mod simulate;
pub mod utils;

use clap::{Parser, Subcommand};
use fit::FitArgs;
use residuals::ResidualsArgs;
use simulate::SimulateArgs;
use utils::UtilsArgs;
use wild::ArgsOs;

#[derive(Parser, Debug)]
#[command(
    author = env!("CARGO_PKG_AUTHORS"),
    version = env!("CARGO_PKG_VERSION"),
    about = env!("CARGO_PKG_DESCRIPTION"),
    long_about = None,)]
struct Cli {
    #[command(subcommand)]
    command: MainMenu,
}

#[derive(Subcommand, Debug)]
enum MainMenu {
    /// Decompose a series into monotone segments and residuals.
    Fit {
        #[clap(flatten)]
        utils: UtilsArgs,
        #[clap(flatten)]
        args:  FitArgs,
    },

    /// Run the residual test battery on a column of residuals.
    Residuals {
        #[clap(flatten)]
        utils: UtilsArgs,
        #[clap(flatten)]
        args:  ResidualsArgs,
    },

    /// Monte Carlo study over the nine noise scenarios.
    Simulate {
        #[clap(flatten)]
        utils: UtilsArgs,
        #[clap(flatten)]
        args:  SimulateArgs,
    },
}

fn main() -> anyhow::Result<()> {
    let args: ArgsOs = wild::args_os();
    let cli = Cli::parse_from(args);

    match cli.command {
        MainMenu::Fit { utils, args } => {
            utils.setup()?;
            args.run(&utils)?;
        },
        MainMenu::Residuals { utils, args } => {
            utils.setup()?;
            args.run(&utils)?;
        },
        MainMenu::Simulate { utils, args } => {
            utils.setup()?;
            args.run(&utils)?;
        },
    }
    Ok(())
}
