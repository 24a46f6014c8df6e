//! Summary text sent to the destination and written to the preview file

use crate::domain::{Commodity, CommodityQuote};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;

pub const FRESH_MARKER: &str = "🟢";
pub const CACHE_MARKER: &str = "🟡";
pub const MISSING_MARKER: &str = "⚪";
pub const MISSING_TEXT: &str = "sem dados";

/// `1234.5` -> `1.234,50`
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn format_brl(value: f64) -> String {
    let cents = (value.abs() * 100.0).round() as u64;
    let integer = (cents / 100).to_string();
    let fraction = cents % 100;

    let mut grouped = String::with_capacity(integer.len() + integer.len() / 3);
    for (i, digit) in integer.chars().enumerate() {
        if i > 0 && (integer.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(digit);
    }

    let sign = if value < 0.0 && cents > 0 { "-" } else { "" };
    format!("{sign}{grouped},{fraction:02}")
}

fn quote_line(quote: &CommodityQuote) -> String {
    match quote.value {
        Some(value) => {
            let marker = if quote.from_cache { CACHE_MARKER } else { FRESH_MARKER };
            format!("{marker} {}: R$ {} - {}", quote.name, format_brl(value), quote.source)
        }
        None => format!("{MISSING_MARKER} {}: {MISSING_TEXT}", quote.name),
    }
}

/// Header plus one line per commodity in report order.
///
/// A commodity absent from `quotes` is rendered as missing, so the report
/// always has the same shape.
#[must_use]
pub fn build_summary(quotes: &[CommodityQuote], now: DateTime<Tz>) -> String {
    let mut lines = Vec::with_capacity(Commodity::ALL.len() + 1);
    lines.push(format!(
        "Cotações agro - {} ({})",
        now.format("%d/%m/%Y %H:%M"),
        now.timezone().name()
    ));

    for commodity in Commodity::ALL {
        let name = commodity.display_name();
        let line = quotes
            .iter()
            .find(|q| q.name == name)
            .map_or_else(|| quote_line(&CommodityQuote::missing(name)), quote_line);
        lines.push(line);
    }

    lines.join("\n")
}

/// `build_summary` stamped with the current time in `timezone`
#[must_use]
pub fn build_summary_now(quotes: &[CommodityQuote], timezone: Tz) -> String {
    build_summary(quotes, Utc::now().with_timezone(&timezone))
}
