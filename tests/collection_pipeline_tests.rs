//! End-to-end runs of the collector with scripted in-memory fetchers

use agro_price_digest::application::{Collector, CollectorSettings, build_summary_now};
use agro_price_digest::domain::{CollectionMethod, Commodity, CommodityQuote, FetchMode, ParseTier};
use agro_price_digest::infrastructure::{CollectionError, CollectionResult, PageFetcher, PageParser, QuoteCache};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const TZ: chrono_tz::Tz = chrono_tz::America::Sao_Paulo;

#[derive(Clone)]
enum Script {
    Page(String),
    Hang,
}

struct ScriptedFetcher {
    mode: FetchMode,
    scripts: HashMap<&'static str, Script>,
}

impl ScriptedFetcher {
    fn new(mode: FetchMode, scripts: Vec<(Commodity, Script)>) -> Arc<dyn PageFetcher> {
        Arc::new(Self {
            mode,
            scripts: scripts.into_iter().map(|(c, s)| (c.source_url(), s)).collect(),
        })
    }
}

#[async_trait]
impl PageFetcher for ScriptedFetcher {
    fn mode(&self) -> FetchMode {
        self.mode
    }

    async fn fetch(&self, url: &str) -> CollectionResult<String> {
        match self.scripts.get(url).cloned() {
            Some(Script::Page(html)) => Ok(html),
            Some(Script::Hang) => std::future::pending().await,
            None => Err(CollectionError::fetch_failure(self.mode, url, "connection reset")),
        }
    }
}

fn indicator_page(date: &str, brl: &str, usd: &str) -> String {
    format!(
        r#"<html><body>
            <h1>Indicador</h1>
            <table>
                <thead><tr><th>Data</th><th>À vista R$</th><th>À vista US$</th></tr></thead>
                <tbody><tr><td>{date}</td><td>{brl}</td><td>{usd}</td></tr></tbody>
            </table>
        </body></html>"#
    )
}

struct Harness {
    _dir: TempDir,
    cache: Arc<QuoteCache>,
}

impl Harness {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let cache = Arc::new(QuoteCache::new(dir.path().join("quotes_cache.json"), TZ));
        Self { _dir: dir, cache }
    }

    fn collector(&self, fetchers: Vec<Arc<dyn PageFetcher>>, settings: CollectorSettings) -> Collector {
        Collector::new(
            fetchers,
            PageParser::new(TZ).unwrap(),
            Arc::clone(&self.cache),
            settings,
            CancellationToken::new(),
        )
    }

    async fn seed(&self, name: &str, value: f64) {
        let quote = CommodityQuote::fresh(
            name,
            value,
            "16/10/2026",
            CollectionMethod::new(FetchMode::Http, ParseTier::Table),
        );
        self.cache.store_fresh(&[quote]).await.unwrap();
    }
}

#[tokio::test]
async fn test_failed_commodity_falls_back_to_cache() {
    let harness = Harness::new();
    harness.seed("Milho", 64.9).await;

    let http = ScriptedFetcher::new(
        FetchMode::Http,
        vec![
            (Commodity::Soja, Script::Page(indicator_page("17/10/2026", "131,40", "24,10"))),
            (Commodity::BoiGordo, Script::Page(indicator_page("17/10/2026", "312,45", "57,30"))),
        ],
    );
    let browser = ScriptedFetcher::new(FetchMode::Browser, vec![]);
    let collector = harness.collector(vec![http, browser], CollectorSettings::default());

    let run = collector.collect_all().await;
    assert!(!run.timed_out);
    assert_eq!(run.quotes.len(), 3);

    let milho = &run.quotes[1];
    assert_eq!(milho.name, "Milho");
    assert!(milho.from_cache);
    assert_eq!(milho.value, Some(64.9));

    let summary = build_summary_now(&run.quotes, TZ);
    let lines: Vec<&str> = summary.lines().collect();
    assert_eq!(lines.len(), 4);
    assert!(lines[1].starts_with("🟢 Soja: R$ 131,40"));
    assert!(lines[2].starts_with("🟡 Milho: R$ 64,90"));
    assert!(lines[2].contains("[cache "));
    assert!(lines[3].starts_with("🟢 Boi Gordo: R$ 312,45"));

    // Fresh values were written back; the cached Milho entry is untouched.
    let entries = harness.cache.load().await;
    assert_eq!(entries["Soja"].value, 131.4);
    assert_eq!(entries["Milho"].value, 64.9);
    assert_eq!(entries["Boi Gordo"].value, 312.45);
}

#[tokio::test]
async fn test_browser_rescues_unparseable_http_page() {
    let harness = Harness::new();
    let http = ScriptedFetcher::new(
        FetchMode::Http,
        vec![(Commodity::Soja, Script::Page("<html><body>Carregando...</body></html>".to_string()))],
    );
    let browser = ScriptedFetcher::new(
        FetchMode::Browser,
        vec![(Commodity::Soja, Script::Page(indicator_page("17/10/2026", "131,40", "24,10")))],
    );
    let collector = harness.collector(vec![http, browser], CollectorSettings::default());

    let quote = collector.collect_single(Commodity::Soja).await;
    assert_eq!(quote.value, Some(131.4));
    assert_eq!(quote.method, "browser_table");
    assert!(harness.cache.load().await.is_empty());
}

#[tokio::test]
async fn test_dollar_only_page_is_never_accepted() {
    let harness = Harness::new();
    let usd_only = r#"<html><body>
        <table><tr><th>Data</th><th>US$</th></tr><tr><td>17/10/2026</td><td>US$ 24,10</td></tr></table>
        <p>Cotação: US$ 24,10</p>
    </body></html>"#;
    let http = ScriptedFetcher::new(FetchMode::Http, vec![(Commodity::Soja, Script::Page(usd_only.to_string()))]);
    let collector = harness.collector(vec![http], CollectorSettings::default());

    // The whole-page regex finds 24,10, which is outside the soja band.
    let quote = collector.collect_single(Commodity::Soja).await;
    assert_eq!(quote, CommodityQuote::missing("Soja"));
}

#[tokio::test]
async fn test_hanging_commodity_hits_its_own_timeout() {
    let harness = Harness::new();
    harness.seed("Boi Gordo", 305.0).await;

    let http = ScriptedFetcher::new(
        FetchMode::Http,
        vec![
            (Commodity::Soja, Script::Page(indicator_page("17/10/2026", "131,40", "24,10"))),
            (Commodity::Milho, Script::Page(indicator_page("17/10/2026", "65,20", "12,00"))),
            (Commodity::BoiGordo, Script::Hang),
        ],
    );
    let settings = CollectorSettings {
        commodity_timeout: Duration::from_millis(200),
        global_timeout: Duration::from_secs(10),
    };
    let collector = harness.collector(vec![http], settings);

    let run = collector.collect_all().await;
    assert!(!run.timed_out);
    assert!(run.quotes[0].is_fresh());
    assert!(run.quotes[1].is_fresh());
    assert!(run.quotes[2].from_cache);
    assert_eq!(run.quotes[2].value, Some(305.0));
}

#[tokio::test]
async fn test_global_timeout_returns_cache_only_results() {
    let harness = Harness::new();
    harness.seed("Boi Gordo", 305.0).await;

    let http = ScriptedFetcher::new(
        FetchMode::Http,
        vec![
            (Commodity::Soja, Script::Page(indicator_page("17/10/2026", "131,40", "24,10"))),
            (Commodity::Milho, Script::Hang),
            (Commodity::BoiGordo, Script::Hang),
        ],
    );
    let settings = CollectorSettings {
        commodity_timeout: Duration::from_secs(30),
        global_timeout: Duration::from_millis(300),
    };
    let collector = harness.collector(vec![http], settings);

    let started = Instant::now();
    let run = collector.collect_all().await;
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(run.timed_out);
    assert_eq!(run.quotes.len(), 3);

    // Soja was accepted before the deadline, persisted, then re-read from cache.
    assert!(run.quotes[0].from_cache);
    assert_eq!(run.quotes[0].value, Some(131.4));
    assert_eq!(run.quotes[1], CommodityQuote::missing("Milho"));
    assert!(run.quotes[2].from_cache);
    assert_eq!(run.quotes[2].value, Some(305.0));
}
