use crate::domain::MarketIndicators;
use anyhow::{Context, Result};
use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndicatorKind {
    AvgYieldRate,
    AvgPer,
    AvgProfitabilityRate,
    MarketRiskPremium,
}

// Label-to-value patterns for the French bulletin text. Labels tolerate
// accented and unaccented spellings and arbitrary punctuation between the
// label and the number; the decimal separator may be a comma or a point.
// New indicators or spelling variants go here, not in the matching loop.
// Upstream label phrasing may drift; revisit this table if match rates drop.
const PATTERNS: &[(IndicatorKind, &str)] = &[
    (
        IndicatorKind::AvgPer,
        r"(?i)PER\s+moyen\s+du\s+march[eé]\s*(?:\([^)]*\))?.{0,100}?([0-9]+[,.][0-9]+)",
    ),
    (
        IndicatorKind::AvgYieldRate,
        r"(?i)Taux\s+de\s+rendement\s+moyen\s+du\s+march[eé]\s*[:\s]*([0-9]+[,.][0-9]+)",
    ),
    (
        IndicatorKind::AvgProfitabilityRate,
        r"(?i)Taux\s+de\s+rentabilit[ée]\s+moyen\s+du\s+march[eé]\s*[:\s]*([0-9]+[,.][0-9]+)",
    ),
    (
        IndicatorKind::MarketRiskPremium,
        r"(?i)Prime\s+de\s+risque\s+du\s+march[eé]\s*[:\s]*([0-9]+[,.][0-9]+)",
    ),
];

pub fn compile_pattern_table() -> Result<Vec<(IndicatorKind, Regex)>> {
    PATTERNS
        .iter()
        .map(|(kind, src)| {
            Regex::new(src)
                .with_context(|| format!("invalid indicator pattern for {kind:?}"))
                .map(|re| (*kind, re))
        })
        .collect()
}

/// Applies the pattern table to raw page text. First match wins per
/// indicator; unmatched indicators stay absent.
pub fn match_indicators(table: &[(IndicatorKind, Regex)], text: &str) -> MarketIndicators {
    // Page breaks and column layout arrive as arbitrary whitespace runs.
    let collapsed = collapse_whitespace(text);

    let mut out = MarketIndicators::default();
    for (kind, re) in table {
        let slot = match kind {
            IndicatorKind::AvgYieldRate => &mut out.avg_yield_rate,
            IndicatorKind::AvgPer => &mut out.avg_per,
            IndicatorKind::AvgProfitabilityRate => &mut out.avg_profitability_rate,
            IndicatorKind::MarketRiskPremium => &mut out.market_risk_premium,
        };
        if slot.is_some() {
            continue;
        }

        if let Some(m) = re.captures(&collapsed).and_then(|caps| caps.get(1)) {
            match m.as_str().replace(',', ".").parse::<f64>() {
                Ok(v) => *slot = Some(v),
                Err(err) => {
                    tracing::warn!(?kind, value = m.as_str(), error = %err, "indicator value did not parse");
                }
            }
        }
    }

    out
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> Vec<(IndicatorKind, Regex)> {
        compile_pattern_table().unwrap()
    }

    #[test]
    fn matches_all_four_indicators() {
        let text = "Synthèse du marché\n\
            Taux de rendement moyen du marché : 6,12\n\
            PER moyen du marché (x) 12,45\n\
            Taux de rentabilité moyen du marché : 8,90\n\
            Prime de risque du marché : 3,20";
        let found = match_indicators(&table(), text);
        assert_eq!(found.avg_yield_rate, Some(6.12));
        assert_eq!(found.avg_per, Some(12.45));
        assert_eq!(found.avg_profitability_rate, Some(8.9));
        assert_eq!(found.market_risk_premium, Some(3.2));
    }

    #[test]
    fn partial_match_leaves_others_absent() {
        let text = "Taux de rendement moyen du marche 5.05 \
                    Prime de risque du marche 2.10";
        let found = match_indicators(&table(), text);
        assert_eq!(found.found_count(), 2);
        assert_eq!(found.avg_yield_rate, Some(5.05));
        assert_eq!(found.market_risk_premium, Some(2.1));
        assert_eq!(found.avg_per, None);
        assert_eq!(found.avg_profitability_rate, None);
    }

    #[test]
    fn no_labels_yields_all_absent() {
        let found = match_indicators(&table(), "rien d'utile ici 12,34");
        assert!(found.is_empty());
    }

    #[test]
    fn tolerates_collapsed_whitespace_and_case() {
        let text = "TAUX  DE\nRENDEMENT\tMOYEN  DU  MARCHÉ :   4,00";
        let found = match_indicators(&table(), text);
        assert_eq!(found.avg_yield_rate, Some(4.0));
    }
}
