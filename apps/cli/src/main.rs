mod cli;
mod main_lib;

use std::process::ExitCode;

use clap::Parser;

use cli::{Cli, Command};
use main_lib::{init_tracing, load_config, run_batch, run_company, run_config, run_verify};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing();
    let config = load_config(&cli)?;

    let ok = match cli.command {
        Command::Company {
            ticker,
            exchange,
            json,
        } => run_company(&config, ticker, exchange, json).await?,
        Command::Batch {
            file,
            exchange,
            json,
        } => run_batch(&config, &file, exchange, json).await?,
        Command::Verify => run_verify(&config).await?,
        Command::Config => run_config(&config)?,
    };

    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}
