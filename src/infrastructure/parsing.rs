//! HTML price extraction
//!
//! `currency` turns text fragments into R$ values, `strategies` holds the
//! three extraction tiers and `page_parser` runs them in order.

pub mod context;
pub mod currency;
pub mod page_parser;
pub mod strategies;

pub use crate::infrastructure::parsing_error::{ParsingError, ParsingResult};
pub use context::ParseContext;
pub use page_parser::{PageParser, ParseDiagnostics, TierStats};
pub use strategies::{ParsedPrice, PriceStrategy};
