//! Command-line interface for stock-rater
//!
//! # Usage
//!
//! ```bash
//! stock-rater analyze AAPL MSFT --universe data/universe.sample.json
//! stock-rater analyze AAPL --universe data/universe.sample.json --json
//! stock-rater repl --universe data/universe.sample.json
//! ```

mod report;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use stock_rater::{AnalysisPipeline, RaterConfig, StaticUniverse, YahooMetricSource};
use stock_rater_utils::{LogFormat, init_tracing};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "stock-rater")]
#[command(about = "Rate stocks 1-10 against fixed thresholds and sector peers", long_about = None)]
struct Cli {
    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Rate one or more tickers
    Analyze {
        /// Ticker symbols, e.g. AAPL BRK-B
        #[arg(required = true)]
        tickers: Vec<String>,

        #[command(flatten)]
        setup: Setup,

        /// Print analyses as JSON instead of tables
        #[arg(long)]
        json: bool,
    },
    /// Read tickers from stdin, sharing the sector cache between lines
    Repl {
        #[command(flatten)]
        setup: Setup,
    },
}

#[derive(Args, Debug)]
struct Setup {
    /// JSON file mapping sector names to peer tickers
    #[arg(long)]
    universe: PathBuf,

    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,
}

impl Setup {
    fn pipeline(&self) -> anyhow::Result<AnalysisPipeline> {
        let config = match &self.config {
            Some(path) => RaterConfig::from_json_file(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => RaterConfig::default(),
        }
        .with_env_overrides()?;

        let universe = load_universe(&self.universe)?;
        let source = YahooMetricSource::new(&config)?;

        Ok(AnalysisPipeline::from_config(
            Arc::new(source),
            Arc::new(universe),
            &config,
        ))
    }
}

fn load_universe(path: &Path) -> anyhow::Result<StaticUniverse> {
    let universe = StaticUniverse::from_json_file(path)
        .with_context(|| format!("loading universe {}", path.display()))?;
    info!(
        sectors = universe.sector_count(),
        tickers = universe.ticker_count(),
        "Peer universe loaded"
    );
    Ok(universe)
}

async fn analyze(
    pipeline: &AnalysisPipeline,
    tickers: &[String],
    json: bool,
) -> anyhow::Result<bool> {
    let mut all_ok = true;
    let mut documents = Vec::with_capacity(tickers.len());

    for ticker in tickers {
        match pipeline.analyze(ticker).await {
            Ok(analysis) if json => documents.push(serde_json::to_value(&analysis)?),
            Ok(analysis) => println!("{}", report::render_analysis(&analysis)),
            Err(e) => {
                all_ok = false;
                let report = e.report();
                if json {
                    documents.push(serde_json::json!({ "ticker": ticker, "error": report }));
                } else {
                    eprintln!("{}", report::render_error(ticker, &report));
                }
            }
        }
    }

    if json {
        let output = if documents.len() == 1 {
            documents.remove(0)
        } else {
            serde_json::Value::Array(documents)
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    }

    Ok(all_ok)
}

async fn repl(pipeline: &AnalysisPipeline) -> anyhow::Result<()> {
    println!("Enter a ticker to rate it. /clear empties the sector cache, /exit quits.");

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("> ");
        stdout.flush()?;

        let mut input = String::new();
        if stdin.lock().read_line(&mut input)? == 0 {
            break;
        }

        match input.trim() {
            "" => {}
            "/exit" | "/quit" => break,
            "/clear" => {
                pipeline.clear_cache().await;
                println!("Sector cache cleared.");
            }
            ticker => match pipeline.analyze(ticker).await {
                Ok(analysis) => println!("{}", report::render_analysis(&analysis)),
                Err(e) => eprintln!("{}", report::render_error(ticker, &e.report())),
            },
        }
    }

    println!("Goodbye!");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    match cli.command {
        Command::Analyze {
            tickers,
            setup,
            json,
        } => {
            let pipeline = setup.pipeline()?;
            if analyze(&pipeline, &tickers, json).await? {
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::FAILURE)
            }
        }
        Command::Repl { setup } => {
            let pipeline = setup.pipeline()?;
            repl(&pipeline).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}
