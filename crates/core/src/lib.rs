pub mod bulletin;
pub mod domain;
pub mod scrape;
pub mod storage;
pub mod time;
pub mod webhook;

pub mod config {
    use anyhow::Context;
    use std::path::PathBuf;
    use std::str::FromStr;

    const DEFAULT_QUOTES_URL: &str = "https://www.brvm.org/fr/cours-actions/0";
    const DEFAULT_BULLETIN_URL_TEMPLATE: &str =
        "https://www.brvm.org/sites/default/files/boc_{date}_2.pdf";
    const DEFAULT_DOWNLOADS_DIR: &str = "downloads";
    const DEFAULT_SCRAPE_INTERVAL_MINUTES: u64 = 30;
    const DEFAULT_EXTRACTION_HOURS: [u32; 2] = [12, 18];
    const DEFAULT_WEBHOOK_TIMEOUT_SECS: u64 = 10;
    const DEFAULT_WEBHOOK_MAX_RETRIES: u32 = 3;
    const DEFAULT_RETENTION_DAYS: i64 = 60;

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub database_url: Option<String>,
        pub sentry_dsn: Option<String>,
        pub quotes_url: String,
        pub bulletin_url_template: String,
        pub downloads_dir: PathBuf,
        pub scrape_interval_minutes: u64,
        pub extraction_hours: Vec<u32>,
        pub webhook_timeout_secs: u64,
        pub webhook_max_retries: u32,
        pub retention_days: i64,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            Ok(Self {
                database_url: std::env::var("DATABASE_URL").ok(),
                sentry_dsn: std::env::var("SENTRY_DSN").ok(),
                quotes_url: std::env::var("BRVM_QUOTES_URL")
                    .unwrap_or_else(|_| DEFAULT_QUOTES_URL.to_string()),
                bulletin_url_template: std::env::var("BRVM_BULLETIN_URL_TEMPLATE")
                    .unwrap_or_else(|_| DEFAULT_BULLETIN_URL_TEMPLATE.to_string()),
                downloads_dir: std::env::var("BRVM_DOWNLOADS_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from(DEFAULT_DOWNLOADS_DIR)),
                scrape_interval_minutes: env_parse("BRVM_SCRAPE_INTERVAL_MINUTES")
                    .filter(|m| *m > 0)
                    .unwrap_or(DEFAULT_SCRAPE_INTERVAL_MINUTES),
                extraction_hours: std::env::var("BRVM_EXTRACTION_HOURS")
                    .ok()
                    .map(|s| parse_hours(&s))
                    .filter(|h| !h.is_empty())
                    .unwrap_or_else(|| DEFAULT_EXTRACTION_HOURS.to_vec()),
                webhook_timeout_secs: env_parse("WEBHOOK_TIMEOUT_SECS")
                    .filter(|t| *t > 0)
                    .unwrap_or(DEFAULT_WEBHOOK_TIMEOUT_SECS),
                webhook_max_retries: env_parse("WEBHOOK_MAX_RETRIES")
                    .filter(|r| *r > 0)
                    .unwrap_or(DEFAULT_WEBHOOK_MAX_RETRIES),
                retention_days: env_parse("DATA_RETENTION_DAYS")
                    .filter(|d| *d > 0)
                    .unwrap_or(DEFAULT_RETENTION_DAYS),
            })
        }

        pub fn require_database_url(&self) -> anyhow::Result<&str> {
            self.database_url
                .as_deref()
                .context("DATABASE_URL is required")
        }
    }

    fn env_parse<T: FromStr>(key: &str) -> Option<T> {
        std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
    }

    fn parse_hours(raw: &str) -> Vec<u32> {
        let mut out: Vec<u32> = raw
            .split(',')
            .filter_map(|part| part.trim().parse::<u32>().ok())
            .filter(|h| *h < 24)
            .collect();
        out.sort_unstable();
        out.dedup();
        out
    }

    #[cfg(test)]
    mod tests {
        use super::parse_hours;

        #[test]
        fn parses_hour_list_with_spaces_and_junk() {
            assert_eq!(parse_hours("18, 12"), vec![12, 18]);
            assert_eq!(parse_hours("12,12,99,abc"), vec![12]);
            assert!(parse_hours("nope").is_empty());
        }
    }
}
