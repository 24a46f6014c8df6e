//! Domain module - commodities, quotes and plausibility rules
//!
//! Pure types with no I/O. Everything that talks to the network, the
//! filesystem or a browser lives in `infrastructure`.

pub mod commodity;
pub mod quote;

pub use commodity::{Commodity, is_plausible};
pub use quote::{CollectionMethod, CommodityQuote, FetchMode, ParseTier};
