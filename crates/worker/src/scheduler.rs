use anyhow::Result;
use brvm_core::bulletin::BulletinExtractor;
use brvm_core::config::Settings;
use brvm_core::scrape::QuotePageScraper;
use brvm_core::storage;
use brvm_core::time::market::resolve_report_date;
use brvm_core::webhook::WebhookDispatcher;
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;

/// The long-lived service objects, constructed once at startup and shared by
/// reference with the task loops.
pub struct Services {
    pub pool: sqlx::PgPool,
    pub scraper: QuotePageScraper,
    pub extractor: BulletinExtractor,
    pub dispatcher: WebhookDispatcher,
}

impl Services {
    pub fn from_settings(settings: &Settings, pool: sqlx::PgPool) -> Result<Self> {
        Ok(Self {
            pool,
            scraper: QuotePageScraper::from_settings(settings)?,
            extractor: BulletinExtractor::from_settings(settings)?,
            dispatcher: WebhookDispatcher::from_settings(settings)?,
        })
    }
}

/// Runs both timer loops until ctrl-c. The scrape and extract tasks are
/// independent and may overlap each other, but each loop awaits its own cycle
/// before the next tick, so there is never more than one run per task; missed
/// firings are dropped, not queued.
pub async fn run(services: Services, settings: &Settings) -> Result<()> {
    let services = Arc::new(services);
    let interval_minutes = settings.scrape_interval_minutes;
    let hours = settings.extraction_hours.clone();

    tracing::info!(
        interval_minutes,
        extraction_hours = ?hours,
        "scheduler starting"
    );

    let scrape_services = services.clone();
    let scrape_loop = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_minutes * 60));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // First tick fires immediately; that doubles as the startup scrape.
        loop {
            ticker.tick().await;
            run_scrape_cycle(&scrape_services).await;
        }
    });

    let extract_services = services.clone();
    let extract_loop = tokio::spawn(async move {
        loop {
            let now = Utc::now();
            let next = next_extraction_instant(now, &hours);
            tracing::info!(%next, "next bulletin extraction scheduled");
            let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
            tokio::time::sleep(wait).await;
            run_extract_cycle(&extract_services, None).await;
        }
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => tracing::info!("shutdown signal received"),
        res = scrape_loop => tracing::error!(?res, "scrape loop exited"),
        res = extract_loop => tracing::error!(?res, "extract loop exited"),
    }

    Ok(())
}

/// One scrape cycle. Absorbs all failures: a bad cycle must not kill the
/// scheduler, and the next firing is the retry.
pub async fn run_scrape_cycle(services: &Services) {
    tracing::info!("scrape cycle starting");

    let stats = services.scraper.scrape_and_persist(&services.pool).await;
    tracing::info!(
        inserted = stats.inserted,
        updated = stats.updated,
        errors = stats.errors,
        "scrape cycle finished"
    );

    let changed = stats.inserted + stats.updated;
    if changed > 0 {
        let sent = services
            .dispatcher
            .notify_quotes_update(&services.pool, changed)
            .await;
        tracing::info!(success = sent.success, failed = sent.failed, "quote webhooks notified");
    }
}

/// One bulletin extraction cycle for the given date (publication rules apply
/// when none is given). A re-run for the same date upserts; the advisory lock
/// keeps two workers off the same date.
pub async fn run_extract_cycle(services: &Services, report_date: Option<NaiveDate>) {
    let date = report_date.unwrap_or_else(|| resolve_report_date(Utc::now()));
    tracing::info!(%date, "extract cycle starting");

    match storage::lock::try_acquire_report_date_lock(&services.pool, date).await {
        Ok(true) => {}
        Ok(false) => {
            tracing::warn!(%date, "report date lock not acquired; another run in progress");
            return;
        }
        Err(err) => {
            sentry_anyhow::capture_anyhow(&err);
            tracing::error!(%date, error = %err, "failed to acquire report date lock");
            return;
        }
    }

    let persisted = services
        .extractor
        .run_daily_cycle(&services.pool, Some(date))
        .await;

    if persisted {
        match storage::indicators::fetch_latest(&services.pool).await {
            Ok(Some(report)) => {
                let sent = services
                    .dispatcher
                    .notify_indicators_update(&services.pool, &report)
                    .await;
                tracing::info!(success = sent.success, failed = sent.failed, "indicator webhooks notified");
            }
            Ok(None) => {}
            Err(err) => {
                sentry_anyhow::capture_anyhow(&err);
                tracing::error!(error = %err, "failed to load latest indicator report");
            }
        }
    } else {
        tracing::warn!(%date, "extract cycle finished without a persisted report");
    }

    let _ = storage::lock::release_report_date_lock(&services.pool, date).await;
}

/// Next wall-clock firing among the configured hours. Site-local time is
/// Abidjan (UTC+0), so scheduling happens directly in UTC.
fn next_extraction_instant(now: DateTime<Utc>, hours: &[u32]) -> DateTime<Utc> {
    let mut hours: Vec<u32> = hours.iter().copied().filter(|h| *h < 24).collect();
    if hours.is_empty() {
        hours.extend([12, 18]);
    }
    hours.sort_unstable();

    let today = now.date_naive();
    for h in &hours {
        let time = NaiveTime::from_hms_opt(*h, 0, 0).unwrap_or(NaiveTime::MIN);
        let candidate = Utc.from_utc_datetime(&today.and_time(time));
        if candidate > now {
            return candidate;
        }
    }

    let tomorrow = today + chrono::Duration::days(1);
    let time = NaiveTime::from_hms_opt(hours[0], 0, 0).unwrap_or(NaiveTime::MIN);
    Utc.from_utc_datetime(&tomorrow.and_time(time))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn picks_first_upcoming_hour_today() {
        let now = Utc.with_ymd_and_hms(2026, 1, 7, 9, 30, 0).unwrap();
        let next = next_extraction_instant(now, &[12, 18]);
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 1, 7, 12, 0, 0).unwrap());
    }

    #[test]
    fn skips_past_hours() {
        let now = Utc.with_ymd_and_hms(2026, 1, 7, 15, 0, 0).unwrap();
        let next = next_extraction_instant(now, &[12, 18]);
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 1, 7, 18, 0, 0).unwrap());
    }

    #[test]
    fn wraps_to_tomorrow_after_last_hour() {
        let now = Utc.with_ymd_and_hms(2026, 1, 7, 20, 0, 0).unwrap();
        let next = next_extraction_instant(now, &[12, 18]);
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 1, 8, 12, 0, 0).unwrap());
    }

    #[test]
    fn exact_firing_time_moves_to_next_slot() {
        let now = Utc.with_ymd_and_hms(2026, 1, 7, 12, 0, 0).unwrap();
        let next = next_extraction_instant(now, &[12, 18]);
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 1, 7, 18, 0, 0).unwrap());
    }
}
