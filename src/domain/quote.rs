//! Collection results and their provenance tags

use serde::{Deserialize, Serialize};
use std::fmt;

/// How the page HTML was retrieved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchMode {
    Http,
    Browser,
}

impl FetchMode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Browser => "browser",
        }
    }
}

impl fmt::Display for FetchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which parser tier located the value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParseTier {
    Table,
    Text,
    Regex,
}

impl ParseTier {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Table => "table",
            Self::Text => "text",
            Self::Regex => "regex",
        }
    }
}

impl fmt::Display for ParseTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provenance tag, rendered as `http_table`, `browser_regex_fallback`, ...
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CollectionMethod {
    pub fetch: FetchMode,
    pub tier: ParseTier,
    /// Set when the value came from the regex retry after a validation failure
    pub fallback: bool,
}

impl CollectionMethod {
    #[must_use]
    pub const fn new(fetch: FetchMode, tier: ParseTier) -> Self {
        Self {
            fetch,
            tier,
            fallback: false,
        }
    }

    /// Regex re-extraction accepted after the primary tier failed validation
    #[must_use]
    pub const fn regex_fallback(fetch: FetchMode) -> Self {
        Self {
            fetch,
            tier: ParseTier::Regex,
            fallback: true,
        }
    }

    #[must_use]
    pub fn tag(&self) -> String {
        if self.fallback {
            format!("{}_{}_fallback", self.fetch, self.tier)
        } else {
            format!("{}_{}", self.fetch, self.tier)
        }
    }
}

impl fmt::Display for CollectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.tag())
    }
}

/// Result of one collection attempt for one commodity.
///
/// Built once per commodity per run and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommodityQuote {
    /// Display label, one of the fixed commodities
    pub name: String,
    /// Price in R$; `None` means nothing fresh and nothing cached
    pub value: Option<f64>,
    /// Human-readable provenance: method, quote date and fallback markers
    pub source: String,
    /// True when the value was reused from a previous run
    pub from_cache: bool,
    /// Provenance tag (`http_table`, `browser_text`, `http_regex_fallback`, ...)
    pub method: String,
}

impl CommodityQuote {
    /// Freshly collected quote
    #[must_use]
    pub fn fresh(name: &str, value: f64, quote_date: &str, method: CollectionMethod) -> Self {
        let mut source = format!("CEPEA/ESALQ {quote_date} ({}/{})", method.fetch, method.tier);
        if method.fallback {
            source.push_str(" [regex fallback]");
        }

        Self {
            name: name.to_string(),
            value: Some(value),
            source,
            from_cache: false,
            method: method.tag(),
        }
    }

    /// Placeholder for a commodity with neither a fresh nor a cached value
    #[must_use]
    pub fn missing(name: &str) -> Self {
        Self {
            name: name.to_string(),
            value: None,
            source: "sem dados".to_string(),
            from_cache: false,
            method: "none".to_string(),
        }
    }

    #[must_use]
    pub const fn has_value(&self) -> bool {
        self.value.is_some()
    }

    /// Fresh quote carrying a value, the only kind written back to the cache
    #[must_use]
    pub const fn is_fresh(&self) -> bool {
        !self.from_cache && self.value.is_some()
    }
}
