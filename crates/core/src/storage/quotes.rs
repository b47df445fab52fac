use crate::domain::{Quote, ScrapeStats};
use anyhow::{Context, Result};

/// Upserts one quote and appends its history snapshot in a single
/// transaction. Returns true when the symbol was newly inserted.
async fn persist_one(pool: &sqlx::PgPool, quote: &Quote) -> Result<bool> {
    let snapshot = serde_json::to_value(quote).context("quote snapshot serialize failed")?;

    let mut tx = pool.begin().await.context("begin transaction failed")?;

    let existing: Option<(String,)> = sqlx::query_as("SELECT symbol FROM quotes WHERE symbol = $1")
        .persistent(false)
        .bind(&quote.symbol)
        .fetch_optional(&mut *tx)
        .await
        .context("select quote failed")?;

    let inserted = existing.is_none();
    if inserted {
        sqlx::query(
            "INSERT INTO quotes (symbol, name, volume, previous_close, open_price, close_price, variation, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, now())",
        )
        .persistent(false)
        .bind(&quote.symbol)
        .bind(&quote.name)
        .bind(quote.volume)
        .bind(quote.previous_close)
        .bind(quote.open_price)
        .bind(quote.close_price)
        .bind(quote.variation)
        .execute(&mut *tx)
        .await
        .context("insert quote failed")?;
    } else {
        sqlx::query(
            "UPDATE quotes SET name = $2, volume = $3, previous_close = $4, open_price = $5, \
             close_price = $6, variation = $7, updated_at = now() \
             WHERE symbol = $1",
        )
        .persistent(false)
        .bind(&quote.symbol)
        .bind(&quote.name)
        .bind(quote.volume)
        .bind(quote.previous_close)
        .bind(quote.open_price)
        .bind(quote.close_price)
        .bind(quote.variation)
        .execute(&mut *tx)
        .await
        .context("update quote failed")?;
    }

    // History snapshot is appended on every cycle, insert or update alike.
    sqlx::query("INSERT INTO quote_history (symbol, snapshot) VALUES ($1, $2)")
        .persistent(false)
        .bind(&quote.symbol)
        .bind(snapshot)
        .execute(&mut *tx)
        .await
        .context("insert quote_history failed")?;

    tx.commit().await.context("commit transaction failed")?;
    Ok(inserted)
}

/// Persists a parsed batch, one unit of work per quote: a failing quote rolls
/// back only its own upsert + snapshot and is counted as an error.
pub async fn persist_quotes(pool: &sqlx::PgPool, quotes: &[Quote]) -> ScrapeStats {
    let mut stats = ScrapeStats::default();

    for quote in quotes {
        match persist_one(pool, quote).await {
            Ok(true) => stats.inserted += 1,
            Ok(false) => stats.updated += 1,
            Err(err) => {
                tracing::error!(symbol = %quote.symbol, error = %err, "failed to persist quote");
                stats.errors += 1;
            }
        }
    }

    tracing::info!(
        inserted = stats.inserted,
        updated = stats.updated,
        errors = stats.errors,
        "quote persistence finished"
    );
    stats
}
