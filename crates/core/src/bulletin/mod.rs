pub mod patterns;

use crate::config::Settings;
use crate::domain::MarketIndicators;
use crate::storage;
use crate::time::market::resolve_report_date;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use patterns::IndicatorKind;
use regex::Regex;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const DOWNLOAD_TIMEOUT_SECS: u64 = 60;

#[derive(Debug)]
pub enum DownloadError {
    /// The exchange answered 404: the bulletin for that date is not out yet.
    /// Callers report "try later" instead of "broken".
    NotPublished,
    Failed(anyhow::Error),
}

impl fmt::Display for DownloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DownloadError::NotPublished => write!(f, "bulletin not yet published (404)"),
            DownloadError::Failed(err) => write!(f, "bulletin download failed: {err:#}"),
        }
    }
}

impl std::error::Error for DownloadError {}

/// Downloads the daily bulletin PDF and extracts the four market indicators
/// from its text.
pub struct BulletinExtractor {
    http: reqwest::Client,
    url_template: String,
    downloads_dir: PathBuf,
    retention_days: i64,
    patterns: Vec<(IndicatorKind, Regex)>,
}

impl BulletinExtractor {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        // Same broken certificate chain as the quotes page.
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(DOWNLOAD_TIMEOUT_SECS))
            .user_agent(BROWSER_USER_AGENT)
            .danger_accept_invalid_certs(true)
            .build()
            .context("failed to build bulletin http client")?;

        Ok(Self {
            http,
            url_template: settings.bulletin_url_template.clone(),
            downloads_dir: settings.downloads_dir.clone(),
            retention_days: settings.retention_days,
            patterns: patterns::compile_pattern_table()?,
        })
    }

    /// URL and local filename for a report date's bulletin.
    pub fn document_location(&self, date: NaiveDate) -> (String, String) {
        build_document_location(&self.url_template, date)
    }

    /// Returns the local path of the bulletin, downloading it first when it is
    /// not already on disk. Published bulletins are immutable, so an existing
    /// file is trusted without a staleness check. A failed write may leave a
    /// partial file behind that a later run will treat as complete; known gap.
    pub async fn ensure_local_copy(
        &self,
        url: &str,
        filename: &str,
    ) -> Result<PathBuf, DownloadError> {
        let path = self.downloads_dir.join(filename);
        if path.exists() {
            tracing::info!(path = %path.display(), "bulletin already downloaded");
            return Ok(path);
        }

        tokio::fs::create_dir_all(&self.downloads_dir)
            .await
            .map_err(|err| {
                DownloadError::Failed(
                    anyhow::Error::new(err).context("failed to create downloads directory"),
                )
            })?;

        tracing::info!(url, "downloading bulletin");
        let res = self.http.get(url).send().await.map_err(|err| {
            DownloadError::Failed(anyhow::Error::new(err).context("bulletin request failed"))
        })?;

        let status = res.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(DownloadError::NotPublished);
        }
        if !status.is_success() {
            return Err(DownloadError::Failed(anyhow::anyhow!(
                "bulletin HTTP {status}"
            )));
        }

        let bytes = res.bytes().await.map_err(|err| {
            DownloadError::Failed(anyhow::Error::new(err).context("failed to read bulletin body"))
        })?;

        tokio::fs::write(&path, &bytes).await.map_err(|err| {
            DownloadError::Failed(anyhow::Error::new(err).context("failed to write bulletin file"))
        })?;

        tracing::info!(path = %path.display(), bytes = bytes.len(), "bulletin downloaded");
        Ok(path)
    }

    /// Extracts the four indicators from a bulletin file. Extraction problems
    /// collapse to an all-absent map; they never propagate.
    pub async fn extract_indicators(&self, path: &Path) -> MarketIndicators {
        let owned = path.to_path_buf();
        // PDF text extraction is blocking and CPU-bound.
        let text = match tokio::task::spawn_blocking(move || pdf_extract::extract_text(&owned)).await
        {
            Ok(Ok(text)) => text,
            Ok(Err(err)) => {
                tracing::error!(path = %path.display(), error = %err, "pdf text extraction failed");
                return MarketIndicators::default();
            }
            Err(err) => {
                tracing::error!(path = %path.display(), error = %err, "pdf extraction task failed");
                return MarketIndicators::default();
            }
        };

        if text.trim().is_empty() {
            tracing::warn!(path = %path.display(), "no text extracted from bulletin");
            return MarketIndicators::default();
        }

        let found = patterns::match_indicators(&self.patterns, &text);
        tracing::info!(found = found.found_count(), "indicator extraction finished");
        if found.is_empty() {
            tracing::warn!(path = %path.display(), "none of the four indicators matched");
        }
        found
    }

    /// One full extraction cycle: resolve the report date, ensure the local
    /// copy, extract, upsert by date, prune expired reports. Returns whether
    /// a report was persisted.
    pub async fn run_daily_cycle(
        &self,
        pool: &sqlx::PgPool,
        reference_date: Option<NaiveDate>,
    ) -> bool {
        let date = reference_date.unwrap_or_else(|| resolve_report_date(chrono::Utc::now()));
        let (url, filename) = self.document_location(date);

        let path = match self.ensure_local_copy(&url, &filename).await {
            Ok(path) => path,
            Err(DownloadError::NotPublished) => {
                tracing::warn!(%date, "bulletin not yet published; will retry next cycle");
                return false;
            }
            Err(err) => {
                tracing::error!(%date, error = %err, "bulletin download failed");
                return false;
            }
        };

        let indicators = self.extract_indicators(&path).await;
        if indicators.is_empty() {
            // A bulletin with zero recognizable indicators is a failed cycle,
            // not a valid empty report.
            tracing::warn!(%date, "no indicators extracted; skipping persistence");
            return false;
        }

        let persisted =
            match storage::indicators::upsert_report(pool, date, &indicators, &url).await {
                Ok(()) => {
                    tracing::info!(%date, found = indicators.found_count(), "indicator report persisted");
                    true
                }
                Err(err) => {
                    tracing::error!(%date, error = %err, "failed to persist indicator report");
                    false
                }
            };

        match storage::indicators::apply_retention(pool, self.retention_days).await {
            Ok(0) => {}
            Ok(removed) => tracing::info!(removed, "expired indicator reports pruned"),
            Err(err) => tracing::error!(error = %err, "retention prune failed"),
        }

        persisted
    }
}

fn build_document_location(template: &str, date: NaiveDate) -> (String, String) {
    let date_str = date.format("%Y%m%d").to_string();
    let url = template.replace("{date}", &date_str);
    let filename = format!("boc_{date_str}_2.pdf");
    (url, filename)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_url_and_filename_from_date() {
        let date = NaiveDate::from_ymd_opt(2026, 1, 7).unwrap();
        let (url, filename) = build_document_location(
            "https://www.brvm.org/sites/default/files/boc_{date}_2.pdf",
            date,
        );
        assert_eq!(
            url,
            "https://www.brvm.org/sites/default/files/boc_20260107_2.pdf"
        );
        assert_eq!(filename, "boc_20260107_2.pdf");
    }
}
