//! Command handlers behind the CLI
//!
//! Each handler takes an `AppContext` (loaded configuration plus the run's
//! cancellation token) and wires fetchers, parser, cache and delivery for one
//! invocation.

use crate::application::collector::{CollectionRun, Collector, CollectorSettings};
use crate::application::report::{build_summary_now, format_brl};
use crate::application::scheduler::run_daily;
use crate::domain::Commodity;
use crate::infrastructure::config::AppConfig;
use crate::infrastructure::delivery::{MessageDelivery, deliver_once, write_preview};
use crate::infrastructure::fetching::PageFetcher;
use crate::infrastructure::parsing::PageParser;
use crate::infrastructure::quote_cache::QuoteCache;
use crate::infrastructure::simple_http_client::HttpClient;
use anyhow::{Context, Result};
use chrono_tz::Tz;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Everything one invocation needs
pub struct AppContext {
    pub config: AppConfig,
    pub config_path: PathBuf,
    pub timezone: Tz,
    pub cancel: CancellationToken,
    /// Browser fallback allowed for this invocation
    pub use_browser: bool,
}

impl AppContext {
    pub fn new(config: AppConfig, config_path: PathBuf, cancel: CancellationToken, allow_browser: bool) -> Result<Self> {
        let timezone = config.tz()?;
        let use_browser = allow_browser && config.browser_enabled;
        Ok(Self {
            config,
            config_path,
            timezone,
            cancel,
            use_browser,
        })
    }

    /// HTTP first, then the browser when enabled and compiled in
    pub fn fetchers(&self) -> Result<Vec<Arc<dyn PageFetcher>>> {
        let mut fetchers: Vec<Arc<dyn PageFetcher>> = vec![Arc::new(HttpClient::from_app_config(&self.config)?)];

        if self.use_browser {
            #[cfg(feature = "browser")]
            fetchers.push(Arc::new(
                crate::infrastructure::browser_client::BrowserClient::from_app_config(&self.config),
            ));
            #[cfg(not(feature = "browser"))]
            warn!("Browser fallback requested but this build has no browser support");
        }

        Ok(fetchers)
    }

    pub fn collector(&self) -> Result<Collector> {
        let parser = PageParser::new(self.timezone).context("Failed to build page parser")?;
        let cache = Arc::new(QuoteCache::new(self.config.cache_path(), self.timezone));
        Ok(Collector::new(
            self.fetchers()?,
            parser,
            cache,
            CollectorSettings::from_app_config(&self.config),
            self.cancel.clone(),
        ))
    }
}

/// Collect, format and write the preview file
async fn build_digest(ctx: &AppContext) -> Result<(CollectionRun, String)> {
    let run = ctx.collector()?.collect_all().await;
    if run.timed_out {
        warn!("⏰ Digest built from cache only");
    }

    let summary = build_summary_now(&run.quotes, ctx.timezone);
    if let Err(e) = write_preview(&ctx.config.preview_path(), &summary).await {
        error!("❌ {:#}", e);
    }
    Ok((run, summary))
}

/// `collect`: print the summary
pub async fn collect(ctx: &AppContext) -> Result<CollectionRun> {
    let (run, summary) = build_digest(ctx).await?;
    println!("{summary}");
    Ok(run)
}

/// `send`: deliver the summary once; the result is the delivery outcome
pub async fn send(ctx: &AppContext, delivery: &dyn MessageDelivery) -> Result<bool> {
    let (_, summary) = build_digest(ctx).await?;
    if ctx.cancel.is_cancelled() {
        warn!("🛑 Cancelled before delivery");
        return Ok(false);
    }
    Ok(deliver_once(delivery, &summary, &ctx.config.destination_identifier).await)
}

/// `schedule`: send every day at `send_time_local` until cancelled
pub async fn schedule(ctx: &AppContext, delivery: &dyn MessageDelivery) -> Result<()> {
    let send_time = ctx.config.send_time()?;
    info!(
        "📅 Daily digest for '{}' at {} ({})",
        ctx.config.destination_identifier, ctx.config.send_time_local, ctx.config.timezone
    );

    run_daily(send_time, ctx.timezone, ctx.cancel.clone(), move || async move {
        match send(ctx, delivery).await {
            Ok(true) => {}
            Ok(false) => warn!("⚠️ Scheduled digest was not delivered"),
            Err(e) => error!("❌ Scheduled digest failed: {:#}", e),
        }
    })
    .await;
    Ok(())
}

/// `test <commodity>`: one commodity, nothing written to the cache
pub async fn test_commodity(ctx: &AppContext, commodity: Commodity) -> Result<bool> {
    let collector = ctx.collector()?;
    let quote = collector.collect_single(commodity).await;

    match quote.value {
        Some(value) => println!(
            "{}: R$ {} / {}\n  method: {}\n  source: {}\n  cached: {}",
            quote.name,
            format_brl(value),
            commodity.unit(),
            quote.method,
            quote.source,
            quote.from_cache
        ),
        None => println!("{}: sem dados", quote.name),
    }

    let diagnostics = serde_json::to_string(&collector.diagnostics()).context("Failed to serialize diagnostics")?;
    println!("  parser: {diagnostics}");
    Ok(quote.has_value())
}

/// `config`: effective configuration and where it lives
pub fn show_config(ctx: &AppContext) -> Result<()> {
    let rendered = serde_json::to_string_pretty(&ctx.config).context("Failed to serialize configuration")?;
    println!("# {}", ctx.config_path.display());
    println!("{rendered}");
    Ok(())
}
