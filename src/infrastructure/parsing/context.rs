//! Parsing context shared by every strategy during one `parse` call

use chrono::Utc;
use chrono_tz::Tz;

/// Display format for quote dates, matching the indicator tables
pub const DATE_FORMAT: &str = "%d/%m/%Y";

/// Context information for parsing operations
#[derive(Debug, Clone)]
pub struct ParseContext {
    /// Date reported when a tier finds a value but no nearby date
    pub fallback_date: String,
}

impl ParseContext {
    /// Context whose fallback date is "today" in the given timezone
    #[must_use]
    pub fn for_timezone(timezone: Tz) -> Self {
        Self {
            fallback_date: today_in(timezone),
        }
    }

    #[must_use]
    pub fn with_fallback_date(date: impl Into<String>) -> Self {
        Self {
            fallback_date: date.into(),
        }
    }
}

/// Current local date in `DD/MM/YYYY`
#[must_use]
pub fn today_in(timezone: Tz) -> String {
    Utc::now().with_timezone(&timezone).format(DATE_FORMAT).to_string()
}
