use crate::domain::{IndicatorReport, MarketIndicators};
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};

/// Upserts the report for a date. The date is the key; a re-run for the same
/// date overwrites rather than duplicates.
pub async fn upsert_report(
    pool: &sqlx::PgPool,
    report_date: NaiveDate,
    indicators: &MarketIndicators,
    source_url: &str,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO market_indicators \
           (report_date, avg_yield_rate, avg_per, avg_profitability_rate, market_risk_premium, source_url) \
         VALUES ($1, $2, $3, $4, $5, $6) \
         ON CONFLICT (report_date) DO UPDATE SET \
           avg_yield_rate = EXCLUDED.avg_yield_rate, \
           avg_per = EXCLUDED.avg_per, \
           avg_profitability_rate = EXCLUDED.avg_profitability_rate, \
           market_risk_premium = EXCLUDED.market_risk_premium, \
           source_url = EXCLUDED.source_url",
    )
    .persistent(false)
    .bind(report_date)
    .bind(indicators.avg_yield_rate)
    .bind(indicators.avg_per)
    .bind(indicators.avg_profitability_rate)
    .bind(indicators.market_risk_premium)
    .bind(source_url)
    .execute(pool)
    .await
    .context("upsert market_indicators failed")?;

    Ok(())
}

pub async fn fetch_latest(pool: &sqlx::PgPool) -> Result<Option<IndicatorReport>> {
    type Row = (
        NaiveDate,
        Option<f64>,
        Option<f64>,
        Option<f64>,
        Option<f64>,
        Option<String>,
        DateTime<Utc>,
    );

    let row: Option<Row> = sqlx::query_as(
        "SELECT report_date, avg_yield_rate, avg_per, avg_profitability_rate, \
                market_risk_premium, source_url, created_at \
         FROM market_indicators \
         ORDER BY report_date DESC \
         LIMIT 1",
    )
    .persistent(false)
    .fetch_optional(pool)
    .await
    .context("select latest market_indicators failed")?;

    Ok(row.map(
        |(report_date, avg_yield_rate, avg_per, avg_profitability_rate, market_risk_premium, source_url, created_at)| {
            IndicatorReport {
                report_date,
                indicators: MarketIndicators {
                    avg_yield_rate,
                    avg_per,
                    avg_profitability_rate,
                    market_risk_premium,
                },
                source_url,
                created_at,
            }
        },
    ))
}

/// Deletes reports with a date strictly before today minus the retention
/// window. Returns the number of rows removed.
pub async fn apply_retention(pool: &sqlx::PgPool, retention_days: i64) -> Result<u64> {
    let cutoff = Utc::now().date_naive() - chrono::Duration::days(retention_days);

    let res = sqlx::query("DELETE FROM market_indicators WHERE report_date < $1")
        .persistent(false)
        .bind(cutoff)
        .execute(pool)
        .await
        .context("delete expired market_indicators failed")?;

    Ok(res.rows_affected())
}
