use std::convert::Infallible;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use fingraph_market_data::Exchange;

#[derive(Parser, Debug)]
#[command(
    name = "fingraph",
    version,
    about = "Ingest market data, news and filings into a graph"
)]
pub struct Cli {
    /// JSON configuration file.
    #[arg(long, global = true, env = "FINGRAPH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Fetch and cache only; never write to the graph.
    #[arg(long, global = true, default_value_t = false)]
    pub no_persistence: bool,

    /// Entities processed concurrently by `batch`.
    #[arg(long, global = true)]
    pub workers: Option<usize>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Ingest a single company.
    Company {
        /// Ticker, optionally with a Yahoo suffix (e.g. AAPL, TCS.NS).
        ticker: String,

        /// Listing exchange (e.g. NSE, BSE, NYSE).
        #[arg(long, value_parser = parse_exchange)]
        exchange: Option<Exchange>,

        /// Print the outcome as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Ingest every ticker listed in a file, one per line.
    Batch {
        file: PathBuf,

        /// Exchange applied to every ticker in the file.
        #[arg(long, value_parser = parse_exchange)]
        exchange: Option<Exchange>,

        /// Print the summary as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Connect to the graph and declare the schema.
    Verify,
    /// Print the effective configuration, password redacted.
    Config,
}

fn parse_exchange(code: &str) -> Result<Exchange, Infallible> {
    code.parse()
}

/// Tickers from a batch file. Blank lines and `#` comments are ignored.
pub fn parse_batch(contents: &str) -> Vec<String> {
    contents
        .lines()
        .filter_map(|line| line.split('#').next())
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_batch_skips_comments() {
        let tickers = parse_batch("# watchlist\nAAPL\n\n  MSFT  # cloud\nTCS.NS\n#INFY\n");
        assert_eq!(tickers, vec!["AAPL", "MSFT", "TCS.NS"]);
    }

    #[test]
    fn test_company_command() {
        let cli = Cli::parse_from(["fingraph", "company", "TCS", "--exchange", "nse", "--json"]);
        match cli.command {
            Command::Company {
                ticker,
                exchange,
                json,
            } => {
                assert_eq!(ticker, "TCS");
                assert_eq!(exchange, Some(Exchange::Nse));
                assert!(json);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from([
            "fingraph",
            "batch",
            "tickers.txt",
            "--no-persistence",
            "--workers",
            "8",
        ]);
        assert!(cli.no_persistence);
        assert_eq!(cli.workers, Some(8));
        assert!(matches!(cli.command, Command::Batch { .. }));
    }
}
