//! Collection orchestrator
//!
//! Per commodity: fetch, parse, validate, regex retry, next fetcher, cache.
//! Commodities run one after another so at most one network operation (and at
//! most one browser session) is in flight per run. Three timeout levels nest:
//! each fetcher bounds itself, a per-commodity bound wraps every fetcher for
//! that commodity, and a global bound wraps the whole loop.

use crate::domain::{CollectionMethod, Commodity, CommodityQuote, FetchMode, is_plausible};
use crate::infrastructure::collection_error::{CollectionError, CollectionResult};
use crate::infrastructure::config::AppConfig;
use crate::infrastructure::fetching::PageFetcher;
use crate::infrastructure::parsing::{PageParser, ParseDiagnostics};
use crate::infrastructure::quote_cache::{CacheSnapshot, QuoteCache};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Timeout bounds for one run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectorSettings {
    pub commodity_timeout: Duration,
    pub global_timeout: Duration,
}

impl CollectorSettings {
    #[must_use]
    pub const fn from_app_config(config: &AppConfig) -> Self {
        Self {
            commodity_timeout: Duration::from_secs(config.commodity_timeout_seconds),
            global_timeout: Duration::from_secs(config.global_timeout_seconds),
        }
    }
}

impl Default for CollectorSettings {
    fn default() -> Self {
        Self {
            commodity_timeout: Duration::from_secs(60),
            global_timeout: Duration::from_secs(180),
        }
    }
}

/// Outcome of one run: always one quote per commodity, in report order
#[derive(Debug, Clone)]
pub struct CollectionRun {
    pub quotes: Vec<CommodityQuote>,
    /// The global bound fired and every quote was answered from the cache
    pub timed_out: bool,
    /// Ctrl-C (or another owner of the token) stopped the run early
    pub cancelled: bool,
}

impl CollectionRun {
    #[must_use]
    pub fn fresh_count(&self) -> usize {
        self.quotes.iter().filter(|q| q.is_fresh()).count()
    }
}

pub struct Collector {
    fetchers: Vec<Arc<dyn PageFetcher>>,
    parser: PageParser,
    cache: Arc<QuoteCache>,
    settings: CollectorSettings,
    cancel: CancellationToken,
}

impl Collector {
    /// `fetchers` are tried in the given order for every commodity
    pub fn new(
        fetchers: Vec<Arc<dyn PageFetcher>>,
        parser: PageParser,
        cache: Arc<QuoteCache>,
        settings: CollectorSettings,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            fetchers,
            parser,
            cache,
            settings,
            cancel,
        }
    }

    #[must_use]
    pub fn diagnostics(&self) -> ParseDiagnostics {
        self.parser.diagnostics()
    }

    /// Collect every commodity, persist the fresh values and return the run.
    ///
    /// Never fails: every error degrades to a cached or missing quote.
    pub async fn collect_all(&self) -> CollectionRun {
        let snapshot = self.cache.snapshot().await;
        info!(
            "🚀 Collecting {} commodities ({} cached entries available)",
            Commodity::ALL.len(),
            snapshot.entries().len()
        );

        let mut collected = Vec::with_capacity(Commodity::ALL.len());
        let outcome = timeout(
            self.settings.global_timeout,
            self.collect_loop(&snapshot, &mut collected),
        )
        .await;

        let run = match outcome {
            Ok(cancelled) => {
                self.persist(&collected).await;
                if cancelled {
                    warn!("🛑 Collection cancelled after {} commodities", collected.len());
                    for commodity in Commodity::ALL.iter().skip(collected.len()) {
                        collected.push(cache_or_missing(&snapshot, *commodity));
                    }
                }
                CollectionRun {
                    quotes: collected,
                    timed_out: false,
                    cancelled,
                }
            }
            Err(_) => {
                error!(
                    "⏰ Global timeout of {:?} reached, answering every commodity from cache",
                    self.settings.global_timeout
                );
                self.persist(&collected).await;
                let refreshed = self.cache.snapshot().await;
                CollectionRun {
                    quotes: Commodity::ALL
                        .iter()
                        .map(|c| cache_or_missing(&refreshed, *c))
                        .collect(),
                    timed_out: true,
                    cancelled: false,
                }
            }
        };

        debug!("Parser diagnostics: {:?}", self.parser.diagnostics());
        info!(
            "✅ Run finished: {} fresh, {} cached, {} missing",
            run.fresh_count(),
            run.quotes.iter().filter(|q| q.from_cache).count(),
            run.quotes.iter().filter(|q| !q.has_value()).count()
        );
        run
    }

    /// Fresh attempt for one commodity with the cache fallback, without
    /// writing anything back
    pub async fn collect_single(&self, commodity: Commodity) -> CommodityQuote {
        let snapshot = self.cache.snapshot().await;
        if self.cancel.is_cancelled() {
            return cache_or_missing(&snapshot, commodity);
        }
        self.collect_bounded(commodity, &snapshot).await
    }

    /// Returns whether the run was cancelled before the last commodity.
    /// A fetch already running when the token fires is allowed to finish.
    async fn collect_loop(&self, snapshot: &CacheSnapshot, collected: &mut Vec<CommodityQuote>) -> bool {
        for commodity in Commodity::ALL {
            if self.cancel.is_cancelled() {
                return true;
            }
            collected.push(self.collect_bounded(commodity, snapshot).await);
        }
        self.cancel.is_cancelled()
    }

    async fn collect_bounded(&self, commodity: Commodity, snapshot: &CacheSnapshot) -> CommodityQuote {
        match timeout(self.settings.commodity_timeout, self.collect_fresh(commodity)).await {
            Ok(Ok(quote)) => quote,
            Ok(Err(CollectionError::Cancelled)) => {
                info!("🛑 {}: stopped before the next fetcher", commodity);
                cache_or_missing(snapshot, commodity)
            }
            Ok(Err(e)) => {
                warn!("⚠️ {}: {}", commodity, e);
                cache_or_missing(snapshot, commodity)
            }
            Err(_) => {
                let e = CollectionError::timeout(
                    format!("collection of {commodity}"),
                    self.settings.commodity_timeout.as_secs(),
                );
                warn!("⏰ {}", e);
                cache_or_missing(snapshot, commodity)
            }
        }
    }

    /// Try each fetcher in turn until one yields a plausible value
    async fn collect_fresh(&self, commodity: Commodity) -> CollectionResult<CommodityQuote> {
        let name = commodity.display_name();
        let url = commodity.source_url();
        let mut last_error = CollectionError::CacheMiss {
            commodity: name.to_string(),
        };

        for fetcher in &self.fetchers {
            if self.cancel.is_cancelled() {
                return Err(CollectionError::Cancelled);
            }
            let mode = fetcher.mode();
            let html = match fetcher.fetch(url).await {
                Ok(html) => html,
                Err(e) => {
                    warn!("⚠️ {}: {}", name, e);
                    last_error = e;
                    continue;
                }
            };

            match self.evaluate_page(commodity, &html, mode) {
                Ok(quote) => {
                    info!("🟢 {}: {:?} via {}", name, quote.value, quote.method);
                    return Ok(quote);
                }
                Err(e) => {
                    warn!("⚠️ {}", e);
                    last_error = e;
                }
            }
        }

        Err(last_error)
    }

    /// Parse and validate one fetched page, with a single regex retry
    fn evaluate_page(
        &self,
        commodity: Commodity,
        html: &str,
        mode: FetchMode,
    ) -> CollectionResult<CommodityQuote> {
        let name = commodity.display_name();
        let Some(parsed) = self.parser.parse(html) else {
            return Err(CollectionError::ParseFailure {
                commodity: name.to_string(),
                mode,
            });
        };

        if is_plausible(name, Some(parsed.value)) {
            return Ok(CommodityQuote::fresh(
                name,
                parsed.value,
                &parsed.date,
                CollectionMethod::new(mode, parsed.tier),
            ));
        }

        debug!(
            "{}: {} from {} tier outside band, retrying with regex",
            name, parsed.value, parsed.tier
        );
        match self.parser.regex_fallback(html) {
            Some(retry) if is_plausible(name, Some(retry.value)) => Ok(CommodityQuote::fresh(
                name,
                retry.value,
                &parsed.date,
                CollectionMethod::regex_fallback(mode),
            )),
            _ => Err(CollectionError::ValidationFailure {
                commodity: name.to_string(),
                value: parsed.value,
            }),
        }
    }

    async fn persist(&self, quotes: &[CommodityQuote]) {
        if let Err(e) = self.cache.store_fresh(quotes).await {
            error!("❌ Failed to update quote cache: {:#}", e);
        }
    }
}

fn cache_or_missing(snapshot: &CacheSnapshot, commodity: Commodity) -> CommodityQuote {
    let name = commodity.display_name();
    snapshot.lookup(name).unwrap_or_else(|e| {
        debug!("{}", e);
        CommodityQuote::missing(name)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    const TZ: chrono_tz::Tz = chrono_tz::America::Sao_Paulo;

    /// Serves canned pages keyed by URL, errors for anything else
    struct ScriptedFetcher {
        mode: FetchMode,
        pages: HashMap<&'static str, String>,
        calls: AtomicUsize,
    }

    impl ScriptedFetcher {
        fn new(mode: FetchMode, pages: &[(Commodity, String)]) -> Arc<Self> {
            Arc::new(Self {
                mode,
                pages: pages.iter().map(|(c, html)| (c.source_url(), html.clone())).collect(),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl PageFetcher for ScriptedFetcher {
        fn mode(&self) -> FetchMode {
            self.mode
        }

        async fn fetch(&self, url: &str) -> CollectionResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.pages
                .get(url)
                .cloned()
                .ok_or_else(|| CollectionError::fetch_failure(self.mode, url, "HTTP 503"))
        }
    }

    fn table_page(value: &str) -> String {
        format!(
            "<html><body><table><tr><th>Data</th><th>Valor R$</th></tr>\
             <tr><td>17/10/2026</td><td>{value}</td></tr></table></body></html>"
        )
    }

    fn collector(dir: &TempDir, fetchers: Vec<Arc<dyn PageFetcher>>) -> (Collector, Arc<QuoteCache>) {
        let cache = Arc::new(QuoteCache::new(dir.path().join("quotes_cache.json"), TZ));
        let collector = Collector::new(
            fetchers,
            PageParser::new(TZ).unwrap(),
            Arc::clone(&cache),
            CollectorSettings::default(),
            CancellationToken::new(),
        );
        (collector, cache)
    }

    #[tokio::test]
    async fn test_http_success_skips_browser() {
        let dir = TempDir::new().unwrap();
        let http = ScriptedFetcher::new(FetchMode::Http, &[(Commodity::Soja, table_page("131,40"))]);
        let browser = ScriptedFetcher::new(FetchMode::Browser, &[]);
        let (collector, _) = collector(&dir, vec![http.clone(), browser.clone()]);

        let quote = collector.collect_single(Commodity::Soja).await;
        assert_eq!(quote.value, Some(131.4));
        assert_eq!(quote.method, "http_table");
        assert!(!quote.from_cache);
        assert_eq!(browser.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_browser_used_after_http_failure() {
        let dir = TempDir::new().unwrap();
        let http = ScriptedFetcher::new(FetchMode::Http, &[]);
        let browser = ScriptedFetcher::new(FetchMode::Browser, &[(Commodity::Milho, table_page("65,20"))]);
        let (collector, _) = collector(&dir, vec![http, browser]);

        let quote = collector.collect_single(Commodity::Milho).await;
        assert_eq!(quote.value, Some(65.2));
        assert_eq!(quote.method, "browser_table");
    }

    #[tokio::test]
    async fn test_implausible_table_value_retries_with_regex() {
        let dir = TempDir::new().unwrap();
        // The table column holds a daily change; the prose holds the price.
        let page = "<html><body><table><tr><th>Data</th><th>Variação R$</th></tr>\
                    <tr><td>17/10/2026</td><td>3,10</td></tr></table>\
                    <p>Fechamento: R$ 312,45</p></body></html>"
            .to_string();
        let http = ScriptedFetcher::new(FetchMode::Http, &[(Commodity::BoiGordo, page)]);
        let (collector, _) = collector(&dir, vec![http]);

        let quote = collector.collect_single(Commodity::BoiGordo).await;
        assert_eq!(quote.value, Some(312.45));
        assert_eq!(quote.method, "http_regex_fallback");
        assert!(quote.source.contains("17/10/2026"));
        assert!(quote.source.ends_with("[regex fallback]"));
    }

    #[tokio::test]
    async fn test_rejected_everywhere_yields_missing() {
        let dir = TempDir::new().unwrap();
        let http = ScriptedFetcher::new(FetchMode::Http, &[(Commodity::Soja, table_page("1.500,00"))]);
        let (collector, _) = collector(&dir, vec![http]);

        let quote = collector.collect_single(Commodity::Soja).await;
        assert_eq!(quote, CommodityQuote::missing("Soja"));
    }

    #[tokio::test]
    async fn test_collect_all_persists_only_fresh_values() {
        let dir = TempDir::new().unwrap();
        let http = ScriptedFetcher::new(
            FetchMode::Http,
            &[
                (Commodity::Soja, table_page("131,40")),
                (Commodity::Milho, table_page("65,20")),
            ],
        );
        let (collector, cache) = collector(&dir, vec![http]);

        let run = collector.collect_all().await;
        assert!(!run.timed_out);
        assert!(!run.cancelled);
        assert_eq!(run.quotes.len(), 3);
        assert_eq!(run.fresh_count(), 2);
        assert_eq!(run.quotes[2], CommodityQuote::missing("Boi Gordo"));

        let entries = cache.load().await;
        assert_eq!(entries.len(), 2);
        assert!(!entries.contains_key("Boi Gordo"));
        assert_eq!(collector.diagnostics().table.hits, 2);
    }

    #[tokio::test]
    async fn test_cancelled_run_answers_from_cache() {
        let dir = TempDir::new().unwrap();
        let http = ScriptedFetcher::new(FetchMode::Http, &[(Commodity::Soja, table_page("131,40"))]);
        let (collector, _) = collector(&dir, vec![http.clone()]);
        collector.cancel.cancel();

        let run = collector.collect_all().await;
        assert!(run.cancelled);
        assert_eq!(run.quotes.len(), 3);
        assert!(run.quotes.iter().all(|q| !q.has_value()));
        assert_eq!(http.calls.load(Ordering::SeqCst), 0);
    }

    /// Answers every URL with the same page after a delay
    struct SlowFetcher {
        delay: Duration,
        page: String,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PageFetcher for SlowFetcher {
        fn mode(&self) -> FetchMode {
            FetchMode::Http
        }

        async fn fetch(&self, _url: &str) -> CollectionResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok(self.page.clone())
        }
    }

    #[tokio::test]
    async fn test_cancel_during_fetch_keeps_the_running_commodity() {
        let dir = TempDir::new().unwrap();
        let slow = Arc::new(SlowFetcher {
            delay: Duration::from_millis(300),
            page: table_page("131,40"),
            calls: AtomicUsize::new(0),
        });
        let browser = ScriptedFetcher::new(FetchMode::Browser, &[]);
        let (collector, cache) = collector(&dir, vec![slow.clone(), browser.clone()]);

        let token = collector.cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            token.cancel();
        });

        let run = collector.collect_all().await;
        assert!(run.cancelled);
        assert!(!run.timed_out);
        assert_eq!(run.quotes.len(), 3);
        assert_eq!(run.quotes[0].value, Some(131.4));
        assert!(run.quotes[0].is_fresh());
        assert_eq!(run.quotes[1], CommodityQuote::missing("Milho"));
        assert_eq!(run.quotes[2], CommodityQuote::missing("Boi Gordo"));
        assert_eq!(slow.calls.load(Ordering::SeqCst), 1);
        assert_eq!(browser.calls.load(Ordering::SeqCst), 0);
        assert_eq!(cache.load().await["Soja"].value, 131.4);
    }

    #[tokio::test]
    async fn test_cancel_stops_before_the_next_fetcher() {
        let dir = TempDir::new().unwrap();
        let http = ScriptedFetcher::new(FetchMode::Http, &[]);
        let browser = ScriptedFetcher::new(FetchMode::Browser, &[(Commodity::Soja, table_page("131,40"))]);
        let (collector, _) = collector(&dir, vec![http.clone(), browser.clone()]);
        collector.cancel.cancel();

        let err = collector.collect_fresh(Commodity::Soja).await.unwrap_err();
        assert!(matches!(err, CollectionError::Cancelled));
        assert!(!err.is_recoverable());
        assert_eq!(http.calls.load(Ordering::SeqCst), 0);
        assert_eq!(browser.calls.load(Ordering::SeqCst), 0);
    }
}
