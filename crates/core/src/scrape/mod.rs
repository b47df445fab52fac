pub mod numeric;

use crate::config::Settings;
use crate::domain::{Quote, ScrapeStats};
use crate::storage;
use anyhow::{Context, Result};
use scraper::{ElementRef, Html, Selector};
use std::time::Duration;

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const FETCH_TIMEOUT_SECS: u64 = 30;

// Symbol, name, volume, previous close, open, close, variation.
const MIN_ROW_CELLS: usize = 7;

/// Scraper for the exchange's quotes page. One fixed page structure; markup
/// drift degrades to an empty result rather than an error.
pub struct QuotePageScraper {
    http: reqwest::Client,
    url: String,
    sel: Selectors,
}

struct Selectors {
    main_section: Selector,
    preferred_table: Selector,
    any_table: Selector,
    row: Selector,
    header_cell: Selector,
    cell: Selector,
    variation_span: Selector,
}

impl Selectors {
    fn new() -> Result<Self> {
        Ok(Self {
            // The sidebar carries decoy "Top 5" / "Flop 5" tables; only the
            // main content section holds the full quote list.
            main_section: selector("section#block-system-main")?,
            preferred_table: selector("table.table-striped")?,
            any_table: selector("table")?,
            row: selector("tr")?,
            header_cell: selector("th")?,
            cell: selector("td")?,
            variation_span: selector("span.text-good, span.text-bad, span.text-nul")?,
        })
    }
}

fn selector(src: &str) -> Result<Selector> {
    Selector::parse(src).map_err(|err| anyhow::anyhow!("invalid selector {src:?}: {err}"))
}

impl QuotePageScraper {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        // The exchange serves an incomplete certificate chain; verification
        // stays off for this one origin.
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(FETCH_TIMEOUT_SECS))
            .user_agent(BROWSER_USER_AGENT)
            .danger_accept_invalid_certs(true)
            .build()
            .context("failed to build scraper http client")?;

        Ok(Self {
            http,
            url: settings.quotes_url.clone(),
            sel: Selectors::new()?,
        })
    }

    /// Single GET of the quotes page. No retry at this layer; the next
    /// scheduled cycle is the retry.
    pub async fn fetch(&self) -> Result<String> {
        tracing::info!(url = %self.url, "fetching quotes page");
        let res = self
            .http
            .get(&self.url)
            .send()
            .await
            .context("quotes page request failed")?;

        let status = res.status();
        if !status.is_success() {
            anyhow::bail!("quotes page HTTP {status}");
        }

        res.text().await.context("failed to read quotes page body")
    }

    pub fn parse(&self, html: &str) -> Vec<Quote> {
        parse_quotes(&self.sel, html)
    }

    /// Fetch, parse, and persist one cycle. A fetch failure or an empty parse
    /// short-circuits with one error and no partial commit.
    pub async fn scrape_and_persist(&self, pool: &sqlx::PgPool) -> ScrapeStats {
        let html = match self.fetch().await {
            Ok(html) => html,
            Err(err) => {
                tracing::error!(error = %err, "quotes page fetch failed");
                return ScrapeStats {
                    errors: 1,
                    ..Default::default()
                };
            }
        };

        let quotes = self.parse(&html);
        if quotes.is_empty() {
            tracing::warn!("no quotes parsed from page");
            return ScrapeStats {
                errors: 1,
                ..Default::default()
            };
        }

        storage::quotes::persist_quotes(pool, &quotes).await
    }
}

fn parse_quotes(sel: &Selectors, html: &str) -> Vec<Quote> {
    let doc = Html::parse_document(html);
    let root = doc.root_element();

    let region = match root.select(&sel.main_section).next() {
        Some(section) => section,
        None => {
            tracing::warn!("main content section not found; scanning whole document");
            root
        }
    };

    let table = region
        .select(&sel.preferred_table)
        .next()
        .or_else(|| region.select(&sel.any_table).next());
    let Some(table) = table else {
        tracing::warn!("no table found in content region");
        return Vec::new();
    };

    let mut out = Vec::new();
    for row in table.select(&sel.row) {
        // Header rows carry th cells wherever the tree builder put them.
        if row.select(&sel.header_cell).next().is_some() {
            continue;
        }

        let cells: Vec<ElementRef> = row.select(&sel.cell).collect();
        if cells.len() < MIN_ROW_CELLS {
            tracing::debug!(cells = cells.len(), "skipping short row");
            continue;
        }

        let symbol = cell_text(cells[0]).to_uppercase();
        if symbol.is_empty() {
            tracing::warn!("skipping row with empty symbol");
            continue;
        }

        // Variation is usually wrapped in a colored span; fall back to the
        // cell's own text when it is not.
        let variation_text = cells[6]
            .select(&sel.variation_span)
            .next()
            .map(cell_text)
            .unwrap_or_else(|| cell_text(cells[6]));

        out.push(Quote {
            symbol,
            name: cell_text(cells[1]),
            volume: numeric::parse_volume(&cell_text(cells[2])),
            previous_close: numeric::parse_decimal(&cell_text(cells[3])),
            open_price: numeric::parse_decimal(&cell_text(cells[4])),
            close_price: numeric::parse_decimal(&cell_text(cells[5])),
            variation: numeric::parse_decimal(&variation_text),
        });
    }

    tracing::info!(quotes = out.len(), "quotes page parsed");
    out
}

fn cell_text(el: ElementRef) -> String {
    el.text().collect::<String>().trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(html: &str) -> Vec<Quote> {
        parse_quotes(&Selectors::new().unwrap(), html)
    }

    const PAGE: &str = r#"
        <html><body>
        <aside>
          <table><tbody>
            <tr><td>DECOY</td><td>Top mover</td><td>1</td><td>1</td><td>1</td><td>1</td><td>1</td></tr>
          </tbody></table>
        </aside>
        <section id="block-system-main">
          <table class="table-striped">
            <thead><tr><th>Symbole</th><th>Nom</th><th>Volume</th><th>Veille</th><th>Ouverture</th><th>Clôture</th><th>Variation</th></tr></thead>
            <tbody>
              <tr>
                <td>abcd</td><td>Alpha Corp</td><td>12 500</td>
                <td>1 000,00</td><td>1 010,00</td><td>1 020,50</td>
                <td><span class="text-good">+2,05</span></td>
              </tr>
              <tr><td>SHRT</td><td>Too short</td><td>1</td><td>2</td></tr>
              <tr>
                <td></td><td>No symbol</td><td>5</td><td>1</td><td>1</td><td>1</td><td>1</td>
              </tr>
              <tr>
                <td>efgh</td><td>Beta SA</td><td>-</td>
                <td>-</td><td>-</td><td>750,00</td>
                <td>-1,30</td>
              </tr>
            </tbody>
          </table>
        </section>
        </body></html>
    "#;

    #[test]
    fn parses_rows_from_main_section_only() {
        let quotes = parse(PAGE);
        assert_eq!(quotes.len(), 2);
        assert!(quotes.iter().all(|q| q.symbol != "DECOY"));
    }

    #[test]
    fn parses_well_formed_row() {
        let quotes = parse(PAGE);
        let q = &quotes[0];
        assert_eq!(q.symbol, "ABCD");
        assert_eq!(q.name, "Alpha Corp");
        assert_eq!(q.volume, 12_500);
        assert_eq!(q.previous_close, Some(1000.0));
        assert_eq!(q.open_price, Some(1010.0));
        assert_eq!(q.close_price, Some(1020.5));
        assert_eq!(q.variation, Some(2.05));
    }

    #[test]
    fn variation_without_span_and_placeholders() {
        let quotes = parse(PAGE);
        let q = &quotes[1];
        assert_eq!(q.symbol, "EFGH");
        assert_eq!(q.volume, 0);
        assert_eq!(q.previous_close, None);
        assert_eq!(q.close_price, Some(750.0));
        assert_eq!(q.variation, Some(-1.3));
    }

    #[test]
    fn falls_back_to_whole_document_without_main_section() {
        let html = r#"
            <table>
              <tr><th>h</th><th>h</th><th>h</th><th>h</th><th>h</th><th>h</th><th>h</th></tr>
              <tr><td>wxyz</td><td>Gamma</td><td>10</td><td>1,00</td><td>1,00</td><td>1,10</td><td>0,10</td></tr>
            </table>
        "#;
        let quotes = parse(html);
        assert_eq!(quotes.len(), 1);
        assert_eq!(quotes[0].symbol, "WXYZ");
    }

    #[test]
    fn missing_table_yields_empty_list() {
        assert!(parse("<html><body><p>maintenance</p></body></html>").is_empty());
    }
}
