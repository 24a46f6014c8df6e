//! The three extraction tiers, tried in order by `PageParser`
//!
//! 1. `TableStrategy` - indicator tables with a date column and an R$ column
//! 2. `TextStrategy` - the first text element carrying an R$ value
//! 3. `RegexStrategy` - both value patterns over the whole visible page text

use super::context::ParseContext;
use super::currency;
use crate::domain::ParseTier;
use crate::infrastructure::parsing_error::{ParsingError, ParsingResult};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, trace};

/// `D/M/YYYY`-like dates as printed by the indicator pages
static DATE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\d{1,2}/\d{1,2}/\d{2,4}\b").expect("date pattern is valid"));

/// Candidates scanned by the free-text tier
pub const MAX_TEXT_CANDIDATES: usize = 400;

/// Ancestors searched for a date around a free-text hit
pub const MAX_DATE_ANCESTORS: usize = 3;

const TEXT_BEARING_ELEMENTS: &str = "p, span, div, td, li, strong, b, em, h1, h2, h3, h4, h5, dd, label";

/// A value+date pair located in a page
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedPrice {
    pub date: String,
    pub value: f64,
    pub tier: ParseTier,
}

/// One extraction tier.
///
/// `Ok(None)` means "nothing matched on this page"; `Err` means the tier could
/// not run against the page at all.
pub trait PriceStrategy: Send + Sync {
    fn tier(&self) -> ParseTier;

    fn extract(&self, document: &Html, context: &ParseContext) -> ParsingResult<Option<ParsedPrice>>;
}

fn compile(selector: &str) -> ParsingResult<Selector> {
    Selector::parse(selector).map_err(|e| ParsingError::invalid_selector(selector, e))
}

/// Text of an element with whitespace collapsed
fn element_text(element: &ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Text of the element's own text nodes, children excluded
fn own_text(element: &ElementRef<'_>) -> String {
    element
        .children()
        .filter_map(|node| node.value().as_text().map(|text| &**text))
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

fn find_date(text: &str) -> Option<String> {
    DATE_PATTERN.find(text).map(|m| m.as_str().to_string())
}

/// Visible page text, skipping script and style contents
#[must_use]
pub fn visible_text(document: &Html) -> String {
    document
        .root_element()
        .descendants()
        .filter(|node| {
            node.parent()
                .and_then(|parent| parent.value().as_element())
                .is_none_or(|el| !matches!(el.name(), "script" | "style" | "noscript" | "template"))
        })
        .filter_map(|node| node.value().as_text().map(|text| &**text))
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Tier 1: structured indicator tables
pub struct TableStrategy {
    table: Selector,
    header_row: Selector,
    row: Selector,
}

impl TableStrategy {
    pub fn new() -> ParsingResult<Self> {
        Ok(Self {
            table: compile("table")?,
            header_row: compile("thead tr")?,
            row: compile("tr")?,
        })
    }

    fn cells<'a>(row: &ElementRef<'a>) -> Vec<ElementRef<'a>> {
        row.children()
            .filter_map(ElementRef::wrap)
            .filter(|cell| matches!(cell.value().name(), "td" | "th"))
            .collect()
    }

    /// Nearest enclosing `<table>`, so nested tables do not leak rows upwards
    fn owning_table<'a>(row: &ElementRef<'a>) -> Option<ElementRef<'a>> {
        row.ancestors()
            .filter_map(ElementRef::wrap)
            .find(|el| el.value().name() == "table")
    }

    fn inside_thead(row: &ElementRef<'_>) -> bool {
        row.ancestors()
            .filter_map(ElementRef::wrap)
            .take_while(|el| el.value().name() != "table")
            .any(|el| el.value().name() == "thead")
    }

    fn locate_columns(headers: &[String]) -> Option<(usize, usize)> {
        let lowered: Vec<String> = headers.iter().map(|h| h.to_lowercase()).collect();

        let date_col = lowered
            .iter()
            .position(|h| h == "data" || h == "date")
            .or_else(|| lowered.iter().position(|h| h.contains("data") || h.contains("date")))?;

        let value_col = headers
            .iter()
            .position(|h| currency::is_target_currency_label(h))?;

        Some((date_col, value_col))
    }

    fn scan_table(&self, table: &ElementRef<'_>) -> Option<ParsedPrice> {
        let rows: Vec<ElementRef<'_>> = table
            .select(&self.row)
            .filter(|row| Self::owning_table(row).is_some_and(|owner| owner.id() == table.id()))
            .collect();

        let (header, data_rows): (ElementRef<'_>, Vec<ElementRef<'_>>) =
            match table.select(&self.header_row).next() {
                Some(header) => (
                    header,
                    rows.iter().copied().filter(|row| !Self::inside_thead(row)).collect(),
                ),
                None => {
                    let (first, rest) = rows.split_first()?;
                    (*first, rest.to_vec())
                }
            };

        let headers: Vec<String> = Self::cells(&header).iter().map(element_text).collect();
        let (date_col, value_col) = Self::locate_columns(&headers)?;
        trace!("table columns: date={} value={} headers={:?}", date_col, value_col, headers);

        // The source lists the most recent date last.
        data_rows.iter().rev().find_map(|row| {
            let cells = Self::cells(row);
            let date = find_date(&element_text(cells.get(date_col)?))?;
            let value_text = element_text(cells.get(value_col)?);
            if currency::contains_excluded_marker(&value_text) {
                return None;
            }
            let value = currency::extract(&value_text).or_else(|| currency::parse_numeral(&value_text))?;
            Some(ParsedPrice {
                date,
                value,
                tier: ParseTier::Table,
            })
        })
    }
}

impl PriceStrategy for TableStrategy {
    fn tier(&self) -> ParseTier {
        ParseTier::Table
    }

    fn extract(&self, document: &Html, _context: &ParseContext) -> ParsingResult<Option<ParsedPrice>> {
        let tables: Vec<ElementRef<'_>> = document.select(&self.table).collect();
        debug!("table tier: {} tables on page", tables.len());
        Ok(tables.iter().find_map(|table| self.scan_table(table)))
    }
}

/// Tier 2: free text near an R$ figure
pub struct TextStrategy {
    candidates: Selector,
}

impl TextStrategy {
    pub fn new() -> ParsingResult<Self> {
        Ok(Self {
            candidates: compile(TEXT_BEARING_ELEMENTS)?,
        })
    }

    fn nearby_date(element: &ElementRef<'_>) -> Option<String> {
        element
            .ancestors()
            .filter_map(ElementRef::wrap)
            .take(MAX_DATE_ANCESTORS)
            .find_map(|ancestor| find_date(&element_text(&ancestor)))
    }
}

impl PriceStrategy for TextStrategy {
    fn tier(&self) -> ParseTier {
        ParseTier::Text
    }

    fn extract(&self, document: &Html, context: &ParseContext) -> ParsingResult<Option<ParsedPrice>> {
        let hit = document
            .select(&self.candidates)
            .take(MAX_TEXT_CANDIDATES)
            .find_map(|element| {
                // Containers only contribute their own text; nested elements are candidates too.
                let text = own_text(&element);
                if text.is_empty() || currency::contains_excluded_marker(&element_text(&element)) {
                    return None;
                }
                currency::extract(&text).map(|value| (element, value))
            });

        Ok(hit.map(|(element, value)| ParsedPrice {
            date: Self::nearby_date(&element).unwrap_or_else(|| context.fallback_date.clone()),
            value,
            tier: ParseTier::Text,
        }))
    }
}

/// Tier 3: value patterns over the whole page, ignoring structure
pub struct RegexStrategy;

impl PriceStrategy for RegexStrategy {
    fn tier(&self) -> ParseTier {
        ParseTier::Regex
    }

    fn extract(&self, document: &Html, context: &ParseContext) -> ParsingResult<Option<ParsedPrice>> {
        let text = visible_text(document);
        if text.is_empty() {
            return Err(ParsingError::structure_changed("page has no visible text"));
        }

        Ok(currency::scan_patterns(&text).map(|value| ParsedPrice {
            date: context.fallback_date.clone(),
            value,
            tier: ParseTier::Regex,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> ParseContext {
        ParseContext::with_fallback_date("19/10/2026")
    }

    fn run(strategy: &dyn PriceStrategy, html: &str) -> Option<ParsedPrice> {
        strategy.extract(&Html::parse_document(html), &ctx()).unwrap()
    }

    #[test]
    fn test_table_picks_latest_row() {
        let html = r#"
            <table>
                <tr><th>Data</th><th>R$</th><th>US$</th></tr>
                <tr><td>01/01/2024</td><td>150,00</td><td>30,00</td></tr>
                <tr><td>02/01/2024</td><td>155,00</td><td>31,00</td></tr>
            </table>
        "#;
        let parsed = run(&TableStrategy::new().unwrap(), html).unwrap();
        assert_eq!(parsed.date, "02/01/2024");
        assert!((parsed.value - 155.0).abs() < 1e-9);
        assert_eq!(parsed.tier, ParseTier::Table);
    }

    #[test]
    fn test_table_with_thead_and_substring_headers() {
        let html = r#"
            <table class="cot-fisicas">
                <thead><tr><th>Data de referência</th><th>À vista US$</th><th>À vista R$</th><th>Var. (%)</th></tr></thead>
                <tbody>
                    <tr><td>16/10/2026</td><td>24,01</td><td>130,15</td><td>-0,30</td></tr>
                    <tr><td>17/10/2026</td><td>24,10</td><td>131,40</td><td>0,96</td></tr>
                </tbody>
            </table>
        "#;
        let parsed = run(&TableStrategy::new().unwrap(), html).unwrap();
        assert_eq!(parsed.date, "17/10/2026");
        assert!((parsed.value - 131.40).abs() < 1e-9);
    }

    #[test]
    fn test_table_skips_rows_without_date_or_with_excluded_marker() {
        let html = r#"
            <table>
                <tr><td>Data</td><td>Preço R$</td></tr>
                <tr><td>10/10/2026</td><td>R$ 128,00</td></tr>
                <tr><td>11/10/2026</td><td>US$ 24,00</td></tr>
                <tr><td>Média</td><td>R$ 129,00</td></tr>
            </table>
        "#;
        let parsed = run(&TableStrategy::new().unwrap(), html).unwrap();
        assert_eq!(parsed.date, "10/10/2026");
        assert!((parsed.value - 128.0).abs() < 1e-9);
    }

    #[test]
    fn test_table_without_currency_column_is_ignored() {
        let html = r#"
            <table>
                <tr><th>Data</th><th>Volume</th></tr>
                <tr><td>10/10/2026</td><td>150,00</td></tr>
            </table>
        "#;
        assert_eq!(run(&TableStrategy::new().unwrap(), html), None);
    }

    #[test]
    fn test_text_tier_finds_date_in_ancestor() {
        let html = r#"
            <div class="cotacao">
                <h3>Fechamento 17/10/2026</h3>
                <div><p>Indicador <strong>R$ 312,45</strong></p></div>
            </div>
        "#;
        let parsed = run(&TextStrategy::new().unwrap(), html).unwrap();
        assert_eq!(parsed.date, "17/10/2026");
        assert!((parsed.value - 312.45).abs() < 1e-9);
        assert_eq!(parsed.tier, ParseTier::Text);
    }

    #[test]
    fn test_text_tier_skips_excluded_currency_and_defaults_date() {
        let html = r#"
            <section>
                <p>Em dólar: US$ 24,10</p>
                <p>Em reais: R$ 131,40</p>
            </section>
        "#;
        let parsed = run(&TextStrategy::new().unwrap(), html).unwrap();
        assert!((parsed.value - 131.40).abs() < 1e-9);
        assert_eq!(parsed.date, "19/10/2026");
    }

    #[test]
    fn test_text_tier_reads_own_text_of_wrappers() {
        let html = r#"
            <div>
                <p>Soja R$ 131,40</p>
                <p>Volume 1.500,00 sacas</p>
            </div>
        "#;
        let parsed = run(&TextStrategy::new().unwrap(), html).unwrap();
        assert!((parsed.value - 131.40).abs() < 1e-9);
    }

    #[test]
    fn test_text_tier_date_search_stops_after_three_ancestors() {
        let html = r#"
            <section>
                <h3>Fechamento 17/10/2026</h3>
                <div><div><div><span>R$ 131,40</span></div></div></div>
            </section>
        "#;
        let parsed = run(&TextStrategy::new().unwrap(), html).unwrap();
        assert!((parsed.value - 131.40).abs() < 1e-9);
        assert_eq!(parsed.date, "19/10/2026");
    }

    fn page_after_fillers(fillers: usize) -> String {
        format!("<body>{}<p>R$ 131,40</p></body>", "<span>-</span>".repeat(fillers))
    }

    #[test]
    fn test_text_tier_scans_at_most_400_candidates() {
        let strategy = TextStrategy::new().unwrap();
        let parsed = run(&strategy, &page_after_fillers(MAX_TEXT_CANDIDATES - 1)).unwrap();
        assert!((parsed.value - 131.40).abs() < 1e-9);

        assert_eq!(run(&strategy, &page_after_fillers(MAX_TEXT_CANDIDATES)), None);
    }

    #[test]
    fn test_regex_tier_ignores_scripts() {
        let html = r#"
            <html><head><script>var price = "999,99";</script></head>
            <body>Preço hoje 65,20 por saca</body></html>
        "#;
        let parsed = run(&RegexStrategy, html).unwrap();
        assert!((parsed.value - 65.20).abs() < 1e-9);
        assert_eq!(parsed.date, "19/10/2026");
    }

    #[test]
    fn test_regex_tier_reports_empty_pages_as_structural() {
        let document = Html::parse_document("<html><body></body></html>");
        assert!(RegexStrategy.extract(&document, &ctx()).is_err());
    }
}
