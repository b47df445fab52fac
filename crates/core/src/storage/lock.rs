use anyhow::Context;
use chrono::{Datelike, NaiveDate};

// Advisory locks are scoped to the Postgres session. This is used as a best-effort guard against
// two workers processing the bulletin for the same report date at once.
const LOCK_NAMESPACE: i64 = 0x4252_564D; // "BRVM" bytes.

fn lock_key_for_date(report_date: NaiveDate) -> i64 {
    LOCK_NAMESPACE ^ (report_date.num_days_from_ce() as i64)
}

pub async fn try_acquire_report_date_lock(
    pool: &sqlx::PgPool,
    report_date: NaiveDate,
) -> anyhow::Result<bool> {
    let key = lock_key_for_date(report_date);
    let acquired: (bool,) = sqlx::query_as("SELECT pg_try_advisory_lock($1)")
        .persistent(false)
        .bind(key)
        .fetch_one(pool)
        .await
        .with_context(|| format!("failed to acquire advisory lock (key={key})"))?;
    Ok(acquired.0)
}

pub async fn release_report_date_lock(
    pool: &sqlx::PgPool,
    report_date: NaiveDate,
) -> anyhow::Result<()> {
    let key = lock_key_for_date(report_date);
    sqlx::query("SELECT pg_advisory_unlock($1)")
        .persistent(false)
        .bind(key)
        .execute(pool)
        .await
        .with_context(|| format!("failed to release advisory lock (key={key})"))?;
    Ok(())
}
