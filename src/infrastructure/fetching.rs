//! Page retrieval seam shared by the HTTP and browser fetchers
//!
//! The collector holds an ordered list of fetchers and tries them one after
//! another; a fetcher never falls back internally.

use crate::domain::FetchMode;
use crate::infrastructure::collection_error::CollectionResult;
use async_trait::async_trait;

/// Retrieves the HTML of an indicator page.
///
/// Implementations enforce their own timeout independently of the caller.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    fn mode(&self) -> FetchMode;

    async fn fetch(&self, url: &str) -> CollectionResult<String>;
}
