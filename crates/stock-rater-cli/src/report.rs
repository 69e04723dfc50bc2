//! Terminal rendering of analyses

use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, CellAlignment, ContentArrangement, Table};
use stock_rater::format::format_score;
use stock_rater::{ErrorReport, StockAnalysis};

/// Header block, sub-scores and the KPI comparison table
pub fn render_analysis(analysis: &StockAnalysis) -> String {
    let mut out = String::new();

    out.push_str(&format!("{} - {}\n", analysis.ticker, analysis.company_name));
    match (&analysis.sector, &analysis.industry) {
        (Some(sector), Some(industry)) => out.push_str(&format!("Sector: {sector} / {industry}\n")),
        (Some(sector), None) => out.push_str(&format!("Sector: {sector}\n")),
        (None, _) => out.push_str("Sector: unclassified (absolute rating only)\n"),
    }
    out.push_str(&format!(
        "Rating: {}/10  (absolute {}, relative {}, {} sector peers)\n",
        format_score(Some(analysis.rating.overall)),
        format_score(analysis.rating.absolute),
        format_score(analysis.rating.relative),
        analysis.sector_peer_count
    ));

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            "KPI", "Weight", "Value", "Sector median", "Difference", "Better", "Score",
        ]);

    for row in &analysis.comparison {
        table.add_row(vec![
            Cell::new(&row.display_name),
            Cell::new(&row.weight).set_alignment(CellAlignment::Right),
            Cell::new(&row.stock_value).set_alignment(CellAlignment::Right),
            Cell::new(&row.sector_median).set_alignment(CellAlignment::Right),
            Cell::new(&row.difference).set_alignment(CellAlignment::Right),
            Cell::new(if row.lower_is_better { "lower" } else { "higher" }),
            Cell::new(format_score(row.combined)).set_alignment(CellAlignment::Right),
        ]);
    }

    out.push_str(&table.to_string());
    out.push('\n');
    out
}

pub fn render_error(ticker: &str, report: &ErrorReport) -> String {
    let kind = serde_json::to_value(report.kind)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default();
    format!("{ticker}: [{kind}] {}", report.message)
}
