use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Latest trading data for one listed instrument. Identity is the symbol;
/// every scrape cycle overwrites the mutable fields in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: String,
    pub name: String,
    pub volume: i64,
    pub previous_close: Option<f64>,
    pub open_price: Option<f64>,
    pub close_price: Option<f64>,
    pub variation: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScrapeStats {
    pub inserted: u64,
    pub updated: u64,
    pub errors: u64,
}

/// The four market-wide statistics extracted from a daily bulletin.
/// An unmatched indicator stays `None`; that is absence, not zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketIndicators {
    pub avg_yield_rate: Option<f64>,
    pub avg_per: Option<f64>,
    pub avg_profitability_rate: Option<f64>,
    pub market_risk_premium: Option<f64>,
}

impl MarketIndicators {
    pub fn found_count(&self) -> usize {
        [
            self.avg_yield_rate,
            self.avg_per,
            self.avg_profitability_rate,
            self.market_risk_premium,
        ]
        .iter()
        .filter(|v| v.is_some())
        .count()
    }

    pub fn is_empty(&self) -> bool {
        self.found_count() == 0
    }
}

/// One persisted bulletin extraction, unique per report date.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndicatorReport {
    pub report_date: NaiveDate,
    #[serde(flatten)]
    pub indicators: MarketIndicators,
    pub source_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct WebhookSubscriber {
    pub id: Uuid,
    pub url: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub last_delivered_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BroadcastStats {
    pub success: u64,
    pub failed: u64,
}
