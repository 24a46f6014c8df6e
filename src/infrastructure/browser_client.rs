//! Full browser fetcher used when the plain HTTP path fails
//!
//! Launches Chromium against a persisted profile directory, dismisses cookie
//! prompts, scrolls to trigger lazy content and returns the rendered DOM.
//! Only one session may use a profile directory at a time; concurrent runs
//! against the same profile are unsupported.

use crate::domain::FetchMode;
use crate::infrastructure::collection_error::{CollectionError, CollectionResult};
use crate::infrastructure::config::AppConfig;
use crate::infrastructure::fetching::PageFetcher;
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chromiumoxide::Page;
use chromiumoxide::browser::{Browser, BrowserConfig};
use futures::StreamExt;
use std::path::PathBuf;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, info, warn};

/// CSS selectors of common consent banners' accept buttons
const CONSENT_SELECTORS: [&str; 6] = [
    "#onetrust-accept-btn-handler",
    "#adopt-accept-all-button",
    "button#cookie-accept",
    ".cc-allow",
    ".cookie-consent button",
    "[data-testid='cookie-accept']",
];

/// Button labels clicked when no selector matched
const CONSENT_TEXTS: [&str; 7] = ["aceitar", "aceito", "aceitar todos", "concordo", "accept", "ok", "entendi"];

const SCROLL_STEPS: usize = 3;
const SCROLL_PAUSE: Duration = Duration::from_millis(700);
const POLL_INTERVAL: Duration = Duration::from_millis(250);
const NETWORK_IDLE_WINDOW: Duration = Duration::from_millis(500);

/// "Page ready" conditions, tried in this order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyCondition {
    DomContentLoaded,
    Load,
    NetworkIdle,
}

impl ReadyCondition {
    pub const SEQUENCE: [Self; 3] = [Self::DomContentLoaded, Self::Load, Self::NetworkIdle];
}

#[derive(Debug, Clone)]
pub struct BrowserClientConfig {
    /// Persisted Chromium profile (cookies, consent choices)
    pub profile_dir: PathBuf,
    /// Budget for the whole session, launch to close
    pub timeout_seconds: u64,
    /// Budget for each navigation / ready-condition wait
    pub step_timeout: Duration,
    pub headless: bool,
}

impl BrowserClientConfig {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            profile_dir: config.browser_profile_dir(),
            timeout_seconds: config.browser_timeout_seconds,
            step_timeout: Duration::from_secs(config.browser_timeout_seconds.clamp(3, 60) / 3),
            headless: config.browser_headless,
        }
    }
}

/// A launched browser plus its CDP event loop.
///
/// Dropping the session (e.g. when an outer timeout abandons the fetch) aborts
/// the event loop; `Browser` itself kills the engine process on drop.
struct BrowserSession {
    browser: Browser,
    handler: JoinHandle<()>,
}

impl BrowserSession {
    async fn launch(config: &BrowserClientConfig) -> Result<Self> {
        tokio::fs::create_dir_all(&config.profile_dir)
            .await
            .with_context(|| format!("Failed to create browser profile dir {:?}", config.profile_dir))?;

        let mut builder = BrowserConfig::builder()
            .user_data_dir(&config.profile_dir)
            .request_timeout(config.step_timeout)
            .window_size(1366, 900)
            .arg("--lang=pt-BR")
            .arg("--disable-blink-features=AutomationControlled");
        if !config.headless {
            builder = builder.with_head();
        }
        let browser_config = builder.build().map_err(|e| anyhow!("Invalid browser config: {}", e))?;

        let (browser, mut events) = Browser::launch(browser_config)
            .await
            .context("Failed to launch browser")?;

        let handler = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        info!("🧭 Browser session started (profile {:?})", config.profile_dir);
        Ok(Self { browser, handler })
    }

    async fn close(mut self) {
        if let Err(e) = self.browser.close().await {
            warn!("⚠️ Browser close failed: {}", e);
        }
        if let Err(e) = self.browser.wait().await {
            warn!("⚠️ Browser process did not exit cleanly: {}", e);
        }
        self.handler.abort();
        debug!("Browser session closed");
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        self.handler.abort();
    }
}

/// Chromium-backed page fetcher
pub struct BrowserClient {
    config: BrowserClientConfig,
}

impl BrowserClient {
    #[must_use]
    pub const fn new(config: BrowserClientConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self::new(BrowserClientConfig::from_app_config(config))
    }

    async fn render(&self, url: &str) -> Result<String> {
        let session = BrowserSession::launch(&self.config).await?;
        let result = self.render_in(&session.browser, url).await;
        session.close().await;
        result
    }

    async fn render_in(&self, browser: &Browser, url: &str) -> Result<String> {
        let page = browser.new_page("about:blank").await.context("Failed to open tab")?;

        info!("🧭 Browser GET: {}", url);
        match timeout(self.config.step_timeout, page.goto(url)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => return Err(anyhow!("Navigation to {} failed: {}", url, e)),
            // Slow pages still get a chance through the ready conditions.
            Err(_) => warn!("⏱️ Navigation to {} still pending, continuing", url),
        }

        dismiss_cookie_prompt(&page).await;
        scroll_for_lazy_content(&page).await;

        for condition in ReadyCondition::SEQUENCE {
            if !self.wait_for(&page, condition).await {
                debug!("{:?} not reached for {}", condition, url);
                continue;
            }
            match page.content().await {
                Ok(html) if !html.trim().is_empty() => {
                    debug!("Rendered {} bytes after {:?}", html.len(), condition);
                    return Ok(html);
                }
                Ok(_) => debug!("Empty document after {:?}", condition),
                Err(e) => warn!("⚠️ Reading content after {:?} failed: {}", condition, e),
            }
        }

        Err(anyhow!("No rendered content for {}", url))
    }

    async fn wait_for(&self, page: &Page, condition: ReadyCondition) -> bool {
        let deadline = Instant::now() + self.config.step_timeout;
        let mut last_resources: Option<u64> = None;

        while Instant::now() < deadline {
            let reached = match condition {
                ReadyCondition::DomContentLoaded => ready_state(page).await.is_some_and(|s| s != "loading"),
                ReadyCondition::Load => ready_state(page).await.is_some_and(|s| s == "complete"),
                ReadyCondition::NetworkIdle => {
                    let count = resource_count(page).await;
                    let stable = count.is_some() && count == last_resources;
                    last_resources = count;
                    stable
                }
            };
            if reached {
                return true;
            }

            let pause = if condition == ReadyCondition::NetworkIdle {
                NETWORK_IDLE_WINDOW
            } else {
                POLL_INTERVAL
            };
            sleep(pause).await;
        }

        false
    }
}

async fn ready_state(page: &Page) -> Option<String> {
    page.evaluate("document.readyState")
        .await
        .ok()?
        .into_value::<String>()
        .ok()
}

async fn resource_count(page: &Page) -> Option<u64> {
    page.evaluate("performance.getEntriesByType('resource').length")
        .await
        .ok()?
        .into_value::<u64>()
        .ok()
}

async fn dismiss_cookie_prompt(page: &Page) {
    for selector in CONSENT_SELECTORS {
        if let Ok(element) = page.find_element(selector).await {
            match element.click().await {
                Ok(_) => {
                    debug!("🍪 Dismissed consent prompt via {}", selector);
                    return;
                }
                Err(e) => debug!("Consent button {} not clickable: {}", selector, e),
            }
        }
    }

    let labels = serde_json::to_string(&CONSENT_TEXTS).unwrap_or_else(|_| "[]".to_string());
    let script = format!(
        "(() => {{
            const labels = {labels};
            const buttons = Array.from(document.querySelectorAll('button, a, [role=\"button\"]'));
            const hit = buttons.find(b => labels.includes((b.innerText || '').trim().toLowerCase()));
            if (hit) {{ hit.click(); return true; }}
            return false;
        }})()"
    );
    match page.evaluate(script).await.map(|r| r.into_value::<bool>()) {
        Ok(Ok(true)) => debug!("🍪 Dismissed consent prompt by button text"),
        Ok(_) => debug!("No consent prompt found"),
        Err(e) => debug!("Consent script failed: {}", e),
    }
}

async fn scroll_for_lazy_content(page: &Page) {
    for step in 0..SCROLL_STEPS {
        if let Err(e) = page
            .evaluate("window.scrollBy(0, Math.max(400, document.body.scrollHeight / 3))")
            .await
        {
            debug!("Scroll step {} failed: {}", step, e);
            return;
        }
        sleep(SCROLL_PAUSE).await;
    }
}

#[async_trait]
impl PageFetcher for BrowserClient {
    fn mode(&self) -> FetchMode {
        FetchMode::Browser
    }

    async fn fetch(&self, url: &str) -> CollectionResult<String> {
        let limit = Duration::from_secs(self.config.timeout_seconds);
        match timeout(limit, self.render(url)).await {
            Ok(Ok(html)) => Ok(html),
            Ok(Err(e)) => Err(CollectionError::fetch_failure(FetchMode::Browser, url, format!("{e:#}"))),
            Err(_) => Err(CollectionError::timeout(
                format!("browser fetch of {url}"),
                self.config.timeout_seconds,
            )),
        }
    }
}
