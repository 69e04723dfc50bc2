//! Display formatting for KPI values and scores

use crate::kpi::{KpiDefinition, ValueFormat};

const MISSING: &str = "N/A";

/// Render a KPI reading the way its definition asks for
pub fn format_value(def: &KpiDefinition, value: Option<f64>) -> String {
    let Some(value) = value else {
        return MISSING.to_string();
    };
    let decimals = usize::from(def.decimals);
    match def.format {
        ValueFormat::Percent => format!("{:.decimals$}%", value * 100.0),
        ValueFormat::Decimal => format!("{value:.decimals$}"),
    }
}

/// Render a signed company-minus-median difference
pub fn format_difference(def: &KpiDefinition, difference: Option<f64>) -> String {
    let Some(difference) = difference else {
        return MISSING.to_string();
    };
    let decimals = usize::from(def.decimals);
    match def.format {
        ValueFormat::Percent => format!("{:+.decimals$}%", difference * 100.0),
        ValueFormat::Decimal => format!("{difference:+.decimals$}"),
    }
}

/// Weight as a whole percentage, e.g. `15%`
pub fn format_weight(weight: f64) -> String {
    format!("{:.0}%", weight * 100.0)
}

/// Score with one decimal, or `N/A`
pub fn format_score(score: Option<f64>) -> String {
    score.map_or_else(|| MISSING.to_string(), |s| format!("{s:.1}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kpi::{Kpi, KpiCatalog};

    fn def(kpi: Kpi) -> KpiDefinition {
        KpiCatalog::standard().get(kpi).cloned().unwrap()
    }

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(&def(Kpi::TrailingPe), Some(28.456)), "28.46");
        assert_eq!(format_value(&def(Kpi::ReturnOnEquity), Some(0.1534)), "15.34%");
        assert_eq!(format_value(&def(Kpi::ReturnOnEquity), None), "N/A");
    }

    #[test]
    fn test_format_difference_is_signed() {
        assert_eq!(format_difference(&def(Kpi::TrailingPe), Some(3.0)), "+3.00");
        assert_eq!(format_difference(&def(Kpi::TrailingPe), Some(-1.25)), "-1.25");
        assert_eq!(format_difference(&def(Kpi::DividendYield), Some(0.005)), "+0.50%");
        assert_eq!(format_difference(&def(Kpi::DividendYield), None), "N/A");
    }

    #[test]
    fn test_format_weight_and_score() {
        assert_eq!(format_weight(0.15), "15%");
        assert_eq!(format_weight(0.05), "5%");
        assert_eq!(format_score(Some(7.2999)), "7.3");
        assert_eq!(format_score(None), "N/A");
    }
}
