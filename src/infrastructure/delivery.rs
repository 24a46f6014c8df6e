//! Delivery collaborator contract and the built-in stdout delivery
//!
//! A delivery takes a pre-formatted multi-line summary plus a destination and
//! reports success or failure. Session setup, destination lookup and message
//! submission for a chat client all live behind this trait.

use crate::infrastructure::collection_error::{CollectionError, CollectionResult};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::io::Write;
use std::path::Path;
use tokio::fs;
use tracing::{error, info};

#[async_trait]
pub trait MessageDelivery: Send + Sync {
    /// Human-readable name for logs
    fn name(&self) -> &str;

    /// Deliver once, no retries
    async fn deliver(&self, message: &str, destination: &str) -> CollectionResult<()>;
}

/// Prints the summary framed with its destination
pub struct StdoutDelivery;

#[async_trait]
impl MessageDelivery for StdoutDelivery {
    fn name(&self) -> &str {
        "stdout"
    }

    async fn deliver(&self, message: &str, destination: &str) -> CollectionResult<()> {
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "── para: {destination} ──")
            .and_then(|()| writeln!(stdout, "{message}"))
            .and_then(|()| stdout.flush())
            .map_err(|e| CollectionError::delivery_failure(destination, e))
    }
}

/// Run one delivery attempt and reduce the outcome to a boolean
pub async fn deliver_once(delivery: &dyn MessageDelivery, message: &str, destination: &str) -> bool {
    match delivery.deliver(message, destination).await {
        Ok(()) => {
            info!("📨 Summary delivered to '{}' via {}", destination, delivery.name());
            true
        }
        Err(e) => {
            error!("❌ {}", e);
            false
        }
    }
}

/// Overwrite the preview file with the latest summary
pub async fn write_preview(path: &Path, message: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .context("Failed to create preview directory")?;
    }
    fs::write(path, format!("{message}\n"))
        .await
        .with_context(|| format!("Failed to write preview {path:?}"))?;
    info!("📝 Preview written to {:?}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct FailingDelivery;

    #[async_trait]
    impl MessageDelivery for FailingDelivery {
        fn name(&self) -> &str {
            "failing"
        }

        async fn deliver(&self, _message: &str, destination: &str) -> CollectionResult<()> {
            Err(CollectionError::delivery_failure(destination, "message box not found"))
        }
    }

    #[tokio::test]
    async fn test_deliver_once_reports_outcome() {
        assert!(deliver_once(&StdoutDelivery, "Soja: R$ 131,40", "Grupo").await);
        assert!(!deliver_once(&FailingDelivery, "Soja: R$ 131,40", "Grupo").await);
    }

    #[tokio::test]
    async fn test_preview_is_overwritten() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out").join("last_message.txt");

        write_preview(&path, "first").await.unwrap();
        write_preview(&path, "second").await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "second\n");
    }
}
