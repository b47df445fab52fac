use crate::config::Settings;
use crate::domain::{BroadcastStats, IndicatorReport};
use crate::storage;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::task::JoinSet;

const WEBHOOK_USER_AGENT: &str = "BRVM-Webhook/1.0";
const SOURCE_TAG: &str = "BRVM";

/// Wire shape sent to subscriber endpoints. Stable contract; field names must
/// not change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookPayload {
    pub timestamp: DateTime<Utc>,
    pub source: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data_type: String,
    pub data: Value,
}

/// Fans out event payloads to subscriber endpoints with per-endpoint retry
/// and backoff. Unlike the site-facing clients this one verifies TLS.
#[derive(Clone)]
pub struct WebhookDispatcher {
    http: reqwest::Client,
    max_retries: u32,
}

impl WebhookDispatcher {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.webhook_timeout_secs))
            .user_agent(WEBHOOK_USER_AGENT)
            .build()
            .context("failed to build webhook http client")?;

        Ok(Self {
            http,
            max_retries: settings.webhook_max_retries,
        })
    }

    /// POSTs the payload to one endpoint. Timeouts, transport errors, and
    /// non-2xx responses are retried up to the configured maximum with
    /// exponential backoff; exhaustion is a `false`, never an error.
    pub async fn deliver(&self, url: &str, payload: &Value) -> bool {
        for attempt in 1..=self.max_retries {
            tracing::info!(url, attempt, max = self.max_retries, "sending webhook");

            match self.http.post(url).json(payload).send().await {
                Ok(res) if res.status().is_success() => {
                    tracing::info!(url, status = %res.status(), "webhook delivered");
                    return true;
                }
                Ok(res) => {
                    tracing::warn!(url, attempt, status = %res.status(), "webhook endpoint returned error status");
                }
                Err(err) if err.is_timeout() => {
                    tracing::warn!(url, attempt, "webhook delivery timed out");
                }
                Err(err) => {
                    tracing::warn!(url, attempt, error = %err, "webhook delivery failed");
                }
            }

            if attempt < self.max_retries {
                let backoff = backoff_delay(attempt);
                tracing::debug!(url, ?backoff, "waiting before webhook retry");
                tokio::time::sleep(backoff).await;
            }
        }

        tracing::error!(url, retries = self.max_retries, "webhook delivery gave up");
        false
    }

    /// Delivers the payload to every active subscriber. Each subscriber gets
    /// its own task, so one endpoint's backoff never delays the others, and
    /// its own last-delivery update, so one persistence error never leaks
    /// into another subscriber's outcome.
    pub async fn broadcast(&self, pool: &sqlx::PgPool, payload: WebhookPayload) -> BroadcastStats {
        let subscribers = match storage::subscribers::list_active(pool).await {
            Ok(subs) => subs,
            Err(err) => {
                tracing::error!(error = %err, "failed to load webhook subscribers");
                return BroadcastStats::default();
            }
        };

        if subscribers.is_empty() {
            tracing::info!("no active webhook subscribers");
            return BroadcastStats::default();
        }

        let body = match serde_json::to_value(&payload) {
            Ok(v) => v,
            Err(err) => {
                tracing::error!(error = %err, "failed to serialize webhook payload");
                return BroadcastStats {
                    success: 0,
                    failed: subscribers.len() as u64,
                };
            }
        };

        tracing::info!(
            subscribers = subscribers.len(),
            data_type = %payload.data_type,
            event_type = %payload.event_type,
            "broadcasting webhook payload"
        );

        let mut set = JoinSet::new();
        for sub in subscribers {
            let dispatcher = self.clone();
            let pool = pool.clone();
            let body = body.clone();
            set.spawn(async move {
                let delivered = dispatcher.deliver(&sub.url, &body).await;
                if delivered {
                    if let Err(err) = storage::subscribers::mark_delivered(&pool, sub.id).await {
                        tracing::error!(url = %sub.url, error = %err, "failed to record delivery time");
                    }
                }
                delivered
            });
        }

        let mut stats = BroadcastStats::default();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(true) => stats.success += 1,
                Ok(false) => stats.failed += 1,
                Err(err) => {
                    tracing::error!(error = %err, "webhook delivery task failed");
                    stats.failed += 1;
                }
            }
        }

        tracing::info!(success = stats.success, failed = stats.failed, "broadcast finished");
        stats
    }

    pub fn quotes_payload(data: Value, event_type: &str) -> WebhookPayload {
        WebhookPayload {
            timestamp: Utc::now(),
            source: SOURCE_TAG.to_string(),
            event_type: event_type.to_string(),
            data_type: "quotes".to_string(),
            data,
        }
    }

    pub fn indicators_payload(data: Value, event_type: &str) -> WebhookPayload {
        WebhookPayload {
            timestamp: Utc::now(),
            source: SOURCE_TAG.to_string(),
            event_type: event_type.to_string(),
            data_type: "indicators".to_string(),
            data,
        }
    }

    /// Notifies subscribers that a scrape cycle changed `count` quotes.
    pub async fn notify_quotes_update(&self, pool: &sqlx::PgPool, count: u64) -> BroadcastStats {
        let payload = Self::quotes_payload(
            json!({
                "message": format!("{count} quotes updated"),
                "count": count,
            }),
            "bulk_update",
        );
        self.broadcast(pool, payload).await
    }

    /// Notifies subscribers of a freshly persisted indicator report.
    pub async fn notify_indicators_update(
        &self,
        pool: &sqlx::PgPool,
        report: &IndicatorReport,
    ) -> BroadcastStats {
        let data = match serde_json::to_value(report) {
            Ok(v) => v,
            Err(err) => {
                tracing::error!(error = %err, "failed to serialize indicator report");
                return BroadcastStats::default();
            }
        };
        self.broadcast(pool, Self::indicators_payload(data, "update")).await
    }
}

fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(1u64 << attempt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_per_attempt() {
        assert_eq!(backoff_delay(1), Duration::from_secs(2));
        assert_eq!(backoff_delay(2), Duration::from_secs(4));
        assert_eq!(backoff_delay(3), Duration::from_secs(8));
    }

    #[test]
    fn payload_wire_shape_is_stable() {
        let payload = WebhookDispatcher::quotes_payload(json!({"count": 3}), "bulk_update");
        let v = serde_json::to_value(&payload).unwrap();

        assert_eq!(v["source"], "BRVM");
        assert_eq!(v["type"], "bulk_update");
        assert_eq!(v["data_type"], "quotes");
        assert_eq!(v["data"]["count"], 3);
        assert!(v["timestamp"].is_string());
    }

    #[test]
    fn indicators_payload_tags_data_type() {
        let payload = WebhookDispatcher::indicators_payload(json!({}), "update");
        assert_eq!(payload.data_type, "indicators");
        assert_eq!(payload.event_type, "update");
    }
}
