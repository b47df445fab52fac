use crate::domain::WebhookSubscriber;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub async fn list_active(pool: &sqlx::PgPool) -> Result<Vec<WebhookSubscriber>> {
    type Row = (
        Uuid,
        String,
        Option<String>,
        bool,
        DateTime<Utc>,
        Option<DateTime<Utc>>,
    );

    let rows: Vec<Row> = sqlx::query_as(
        "SELECT id, url, description, is_active, created_at, last_delivered_at \
         FROM webhook_subscriptions \
         WHERE is_active \
         ORDER BY created_at",
    )
    .persistent(false)
    .fetch_all(pool)
    .await
    .context("select webhook_subscriptions failed")?;

    Ok(rows
        .into_iter()
        .map(
            |(id, url, description, is_active, created_at, last_delivered_at)| WebhookSubscriber {
                id,
                url,
                description,
                is_active,
                created_at,
                last_delivered_at,
            },
        )
        .collect())
}

/// Records a successful delivery. Delivery failures never touch this column;
/// the subscription itself is only removed by explicit operator action.
pub async fn mark_delivered(pool: &sqlx::PgPool, id: Uuid) -> Result<()> {
    sqlx::query("UPDATE webhook_subscriptions SET last_delivered_at = now() WHERE id = $1")
        .persistent(false)
        .bind(id)
        .execute(pool)
        .await
        .context("update webhook_subscriptions failed")?;
    Ok(())
}
