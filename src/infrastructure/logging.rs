//! Logging system configuration and initialization
//!
//! - Console output on stderr, so stdout stays clean for the summary
//! - Append-only debug log under `<data_dir>/logs/debug.log`
//! - Timestamps in the configured IANA timezone
//! - `RUST_LOG` overrides the configured level

use crate::infrastructure::config::AppConfig;
use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use chrono_tz::Tz;
use lazy_static::lazy_static;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::info;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{
    EnvFilter, Registry,
    fmt::{self, time::FormatTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

pub const LOG_FILE_NAME: &str = "debug.log";

// Global guard to keep the log file writer alive
lazy_static! {
    static ref LOG_GUARDS: Mutex<Vec<tracing_appender::non_blocking::WorkerGuard>> = Mutex::new(Vec::new());
}

/// Log timestamps in a fixed IANA timezone
#[derive(Debug, Clone, Copy)]
pub struct ZonedTimeFormatter(pub Tz);

impl FormatTime for ZonedTimeFormatter {
    fn format_time(&self, w: &mut fmt::format::Writer<'_>) -> std::fmt::Result {
        let now = Utc::now().with_timezone(&self.0);
        write!(w, "{}", now.format("%Y-%m-%d %H:%M:%S%.3f %Z"))
    }
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    pub level: String,
    pub console_output: bool,
    pub file_output: bool,
    pub log_dir: PathBuf,
    pub timezone: Tz,
}

impl LoggingConfig {
    pub fn from_app_config(config: &AppConfig) -> Result<Self> {
        Ok(Self {
            level: config.log_level.clone(),
            console_output: true,
            file_output: true,
            log_dir: config.log_dir(),
            timezone: config.tz()?,
        })
    }
}

/// Filter for our crate at `level`, with chatty dependencies held back unless tracing
fn build_filter(level: &str) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    let mut directives = vec![level.to_string()];
    if !level.to_lowercase().contains("trace") {
        directives.extend(
            [
                "reqwest=info",
                "hyper=warn",
                "hyper_util=warn",
                "h2=warn",
                "rustls=warn",
                "tokio=info",
                "runtime=warn",
                "chromiumoxide=warn",
                "tungstenite=warn",
                "html5ever=warn",
                "selectors=warn",
            ]
            .map(String::from),
        );
        directives.push(format!("agro_price_digest={level}"));
    }

    EnvFilter::try_new(directives.join(",")).map_err(|e| anyhow!("Invalid log level '{}': {}", level, e))
}

/// Initialize logging with custom configuration
pub fn init_logging_with_config(config: &LoggingConfig) -> Result<()> {
    let env_filter = build_filter(&config.level)?;
    let registry = Registry::default().with(env_filter);
    let timer = ZonedTimeFormatter(config.timezone);

    match (config.file_output, config.console_output) {
        (true, console) => {
            std::fs::create_dir_all(&config.log_dir)
                .with_context(|| format!("Failed to create log directory {:?}", config.log_dir))?;

            let file_appender = rolling::never(&config.log_dir, LOG_FILE_NAME);
            let (file_writer, file_guard) = non_blocking(file_appender);
            LOG_GUARDS
                .lock()
                .map_err(|_| anyhow!("Log guard registry poisoned"))?
                .push(file_guard);

            let file_layer = fmt::Layer::new()
                .with_writer(file_writer)
                .with_timer(timer)
                .with_target(true)
                .with_ansi(false);
            let console_layer = console.then(|| {
                fmt::Layer::new()
                    .with_writer(std::io::stderr)
                    .with_timer(timer)
                    .with_target(false)
            });

            registry
                .with(file_layer)
                .with(console_layer)
                .try_init()
                .context("Logging already initialized")?;
        }
        (false, true) => {
            let console_layer = fmt::Layer::new()
                .with_writer(std::io::stderr)
                .with_timer(timer)
                .with_target(false);

            registry.with(console_layer).try_init().context("Logging already initialized")?;
        }
        (false, false) => {
            return Err(anyhow!("No logging output configured"));
        }
    }

    info!("Logging system initialized (level {}, tz {})", config.level, config.timezone);
    if config.file_output {
        info!("Debug log: {:?}", config.log_dir.join(LOG_FILE_NAME));
    }
    Ok(())
}
