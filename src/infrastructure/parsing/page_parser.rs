//! Ordered three-tier page parser with per-tier diagnostics

use super::context::ParseContext;
use super::strategies::{ParsedPrice, PriceStrategy, RegexStrategy, TableStrategy, TextStrategy};
use crate::domain::ParseTier;
use crate::infrastructure::parsing_error::{ParsingError, ParsingResult};
use chrono_tz::Tz;
use scraper::Html;
use serde::Serialize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, error, warn};

#[derive(Debug, Default)]
struct TierCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    errors: AtomicU64,
}

/// Point-in-time copy of one tier's counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TierStats {
    /// Pages where this tier produced the value
    pub hits: u64,
    /// Pages where this tier ran and matched nothing
    pub misses: u64,
    /// Pages where this tier failed structurally or panicked
    pub errors: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ParseDiagnostics {
    pub table: TierStats,
    pub text: TierStats,
    pub regex: TierStats,
}

/// Locates a value+date pair in a page, first successful tier wins
pub struct PageParser {
    strategies: Vec<Box<dyn PriceStrategy>>,
    counters: [TierCounters; 3],
    timezone: Tz,
}

impl PageParser {
    /// Parser with the default tier order: table, text, regex
    pub fn new(timezone: Tz) -> ParsingResult<Self> {
        Ok(Self::with_strategies(
            vec![
                Box::new(TableStrategy::new()?),
                Box::new(TextStrategy::new()?),
                Box::new(RegexStrategy),
            ],
            timezone,
        ))
    }

    #[must_use]
    pub fn with_strategies(strategies: Vec<Box<dyn PriceStrategy>>, timezone: Tz) -> Self {
        Self {
            strategies,
            counters: Default::default(),
            timezone,
        }
    }

    fn counters_for(&self, tier: ParseTier) -> &TierCounters {
        match tier {
            ParseTier::Table => &self.counters[0],
            ParseTier::Text => &self.counters[1],
            ParseTier::Regex => &self.counters[2],
        }
    }

    /// Run the tiers in order against `html`.
    ///
    /// Tier failures, including panics inside a tier, are logged and counted
    /// and never escape this call.
    pub fn parse(&self, html: &str) -> Option<ParsedPrice> {
        let document = Html::parse_document(html);
        let context = ParseContext::for_timezone(self.timezone);

        for strategy in &self.strategies {
            let tier = strategy.tier();
            let counters = self.counters_for(tier);

            match Self::run_guarded(strategy.as_ref(), &document, &context) {
                Ok(Some(parsed)) => {
                    counters.hits.fetch_add(1, Ordering::Relaxed);
                    debug!("✅ {} tier found {} ({})", tier, parsed.value, parsed.date);
                    return Some(parsed);
                }
                Ok(None) => {
                    counters.misses.fetch_add(1, Ordering::Relaxed);
                    debug!("{} tier: no match", tier);
                }
                Err(e) if e.is_page_drift() => {
                    counters.errors.fetch_add(1, Ordering::Relaxed);
                    warn!("⚠️ {} tier failed: {}", tier, e);
                }
                Err(e) => {
                    counters.errors.fetch_add(1, Ordering::Relaxed);
                    error!("❌ {} tier cannot run: {}", tier, e);
                }
            }
        }

        None
    }

    /// Regex-only re-extraction over the whole page text.
    ///
    /// Used after a tier result fails plausibility validation.
    pub fn regex_fallback(&self, html: &str) -> Option<ParsedPrice> {
        let document = Html::parse_document(html);
        let context = ParseContext::for_timezone(self.timezone);
        match Self::run_guarded(&RegexStrategy, &document, &context) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("⚠️ regex fallback failed: {}", e);
                None
            }
        }
    }

    fn run_guarded(
        strategy: &dyn PriceStrategy,
        document: &Html,
        context: &ParseContext,
    ) -> ParsingResult<Option<ParsedPrice>> {
        panic::catch_unwind(AssertUnwindSafe(|| strategy.extract(document, context))).unwrap_or_else(
            |payload| {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(ToString::to_string)
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                Err(ParsingError::Panicked {
                    tier: strategy.tier().to_string(),
                    message,
                })
            },
        )
    }

    #[must_use]
    pub fn diagnostics(&self) -> ParseDiagnostics {
        let snapshot = |c: &TierCounters| TierStats {
            hits: c.hits.load(Ordering::Relaxed),
            misses: c.misses.load(Ordering::Relaxed),
            errors: c.errors.load(Ordering::Relaxed),
        };
        ParseDiagnostics {
            table: snapshot(&self.counters[0]),
            text: snapshot(&self.counters[1]),
            regex: snapshot(&self.counters[2]),
        }
    }
}
