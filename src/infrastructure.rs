//! Infrastructure layer for page retrieval, parsing, caching and delivery
//!
//! Everything here touches the network, the filesystem or a browser. The
//! collector in `application` only sees the `PageFetcher` and
//! `MessageDelivery` seams.

#[cfg(feature = "browser")]
pub mod browser_client; // Chromium fallback fetcher
pub mod collection_error;
pub mod config;
pub mod delivery;
pub mod fetching;
pub mod logging;
pub mod parsing;
pub mod parsing_error;
pub mod quote_cache;
pub mod simple_http_client;

// Re-export commonly used items
#[cfg(feature = "browser")]
pub use browser_client::{BrowserClient, BrowserClientConfig};
pub use collection_error::{CollectionError, CollectionResult};
pub use config::{AppConfig, ConfigManager};
pub use delivery::{MessageDelivery, StdoutDelivery, deliver_once, write_preview};
pub use fetching::PageFetcher;
pub use logging::{LoggingConfig, init_logging_with_config};
pub use parsing::{PageParser, ParseDiagnostics, ParsedPrice};
pub use quote_cache::{CacheEntry, CacheSnapshot, QuoteCache};
pub use simple_http_client::{HttpClient, HttpClientConfig};
