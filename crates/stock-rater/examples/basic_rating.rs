//! Basic rating example
//!
//! Rates one ticker live against a small hand-written peer universe.
//!
//! To run this example:
//! ```bash
//! cargo run -p stock-rater --example basic_rating MSFT
//! ```

use std::env;
use std::sync::Arc;
use stock_rater::format::format_score;
use stock_rater::{AnalysisPipeline, RaterConfig, StaticUniverse, YahooMetricSource};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let ticker = env::args().nth(1).unwrap_or_else(|| "AAPL".to_string());

    let config = RaterConfig::builder()
        .max_concurrent_fetches(4)
        .build()?;
    let universe = StaticUniverse::new([
        ("Technology", vec!["AAPL", "MSFT", "NVDA", "ORCL", "ADBE", "CRM"]),
        ("Healthcare", vec!["JNJ", "UNH", "PFE", "MRK", "ABBV", "LLY"]),
    ]);
    let source = YahooMetricSource::new(&config)?;
    let pipeline = AnalysisPipeline::from_config(Arc::new(source), Arc::new(universe), &config);

    let analysis = pipeline.analyze(&ticker).await?;
    println!("{}\n", analysis.summary());

    for row in &analysis.comparison {
        println!(
            "  {:<16} {:>10} vs {:>10}  score {}",
            row.display_name,
            row.stock_value,
            row.sector_median,
            format_score(row.combined)
        );
    }

    Ok(())
}
