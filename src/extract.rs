//! Structured extraction from rendered markup.
//!
//! Walks priority-ordered selector tables to pull typed facts (price
//! candidates) out of a snapshot, and derives cleaned visible text by
//! dropping non-content subtrees before text derivation. Selector priority
//! ranks candidates; there is no confidence scoring.

use anyhow::{bail, Result};
use async_trait::async_trait;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use tracing::warn;

use crate::fallback::Strategy;

/// Subtrees that never contribute visible text.
const SKIP_TAGS: &[&str] = &[
    "script", "style", "svg", "nav", "footer", "iframe", "noscript", "head", "template",
];

/// Elements whose boundaries become line breaks in derived text.
const BLOCK_TAGS: &[&str] = &[
    "p", "div", "section", "article", "li", "tr", "br", "h1", "h2", "h3", "h4", "h5", "h6",
    "ul", "ol", "table", "blockquote", "pre", "form",
];

/// A priority-ordered list of extraction selectors for one fact type.
///
/// Versioned so the table can be tuned without touching control flow.
#[derive(Debug, Clone)]
pub struct SelectorTable {
    pub version: u32,
    pub selectors: Vec<String>,
}

impl SelectorTable {
    /// Default price selector table for marketplace surfaces.
    pub fn price_defaults() -> Self {
        Self {
            version: 1,
            selectors: vec![
                "span.a-price-whole".into(),
                "span.a-offscreen".into(),
                "#corePrice_feature_div".into(),
                "div.price-box".into(),
                ".product-price".into(),
                r#"[data-test="product-price"]"#.into(),
                ".shopee-price".into(),
                ".price-amount".into(),
            ],
        }
    }
}

/// One selector match, ranked by selector priority and document order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractionCandidate {
    pub selector: String,
    pub raw_text: String,
}

/// Final price signal selected from a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum PriceSignal {
    /// A selector yielded this text; authoritative for display.
    Selected { selector: String, text: String },
    /// Only the free-text currency scan matched. Non-authoritative: the
    /// amount is left for a downstream semantic reader, since multi-currency
    /// parsing is out of scope here.
    Marker { matched: String },
}

impl PriceSignal {
    /// Display form used by operation results.
    pub fn display(&self) -> String {
        match self {
            Self::Selected { text, .. } => text.clone(),
            Self::Marker { matched } => matched.clone(),
        }
    }
}

/// Collect every non-empty candidate across the whole table, in selector
/// priority order, then document order within a selector.
pub fn collect_candidates(html: &str, table: &SelectorTable) -> Vec<ExtractionCandidate> {
    let document = Html::parse_document(html);
    let mut candidates = Vec::new();

    for raw_selector in &table.selectors {
        let selector = match Selector::parse(raw_selector) {
            Ok(s) => s,
            Err(e) => {
                warn!("skipping unparseable selector '{raw_selector}': {e:?}");
                continue;
            }
        };
        for element in document.select(&selector) {
            let text = element_text(element);
            if !text.is_empty() {
                candidates.push(ExtractionCandidate {
                    selector: raw_selector.clone(),
                    raw_text: text,
                });
            }
        }
    }

    candidates
}

/// Select the final candidate: first selector that yields at least one
/// non-empty candidate, first candidate in document order within it.
pub fn select_candidate(candidates: &[ExtractionCandidate]) -> Option<&ExtractionCandidate> {
    candidates.first()
}

/// Currency-like pattern for the free-text fallback scan.
pub fn currency_pattern() -> Regex {
    // Symbol or ISO-ish code, then digits with optional grouping/decimals.
    Regex::new(r"(?i)(?:[$€£¥₹]|usd|eur|gbp|rm|myr|idr|php)\s*\d{1,3}(?:[,.]\d{3})*(?:[.,]\d{1,2})?")
        .unwrap_or_else(|e| panic!("currency pattern is invalid: {e}"))
}

/// Strategy 1 of the market-data chain: walk the selector table.
pub struct SelectorScan {
    pub html: String,
    pub table: SelectorTable,
}

#[async_trait]
impl Strategy<PriceSignal> for SelectorScan {
    fn name(&self) -> &'static str {
        "selector-table-scan"
    }

    async fn attempt(&self) -> Result<PriceSignal> {
        let candidates = collect_candidates(&self.html, &self.table);
        match select_candidate(&candidates) {
            Some(c) => Ok(PriceSignal::Selected {
                selector: c.selector.clone(),
                text: c.raw_text.clone(),
            }),
            None => bail!(
                "no selector in table v{} yielded a candidate",
                self.table.version
            ),
        }
    }
}

/// Strategy 2 of the market-data chain: scan visible text for a currency
/// pattern. Yields a marker, never a parsed amount.
pub struct CurrencyScan {
    pub text: String,
}

#[async_trait]
impl Strategy<PriceSignal> for CurrencyScan {
    fn name(&self) -> &'static str {
        "currency-pattern-scan"
    }

    async fn attempt(&self) -> Result<PriceSignal> {
        match currency_pattern().find(&self.text) {
            Some(m) => Ok(PriceSignal::Marker {
                matched: m.as_str().to_string(),
            }),
            None => bail!("no currency-like pattern in visible text"),
        }
    }
}

/// Derive visible text from raw markup.
///
/// Non-content subtrees are skipped entirely; block-level boundaries become
/// newlines; runs of whitespace collapse to single spaces.
pub fn visible_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let body_selector = Selector::parse("body").ok();
    let root = body_selector
        .as_ref()
        .and_then(|s| document.select(s).next())
        .unwrap_or_else(|| document.root_element());

    let mut out = String::new();
    walk_element(root, &mut out);
    // Collapse blank lines introduced by nested block elements.
    let cleaned: Vec<&str> = out
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    cleaned.join("\n")
}

fn walk_element(element: ElementRef<'_>, out: &mut String) {
    let name = element.value().name();
    if SKIP_TAGS.contains(&name) {
        return;
    }
    let block = BLOCK_TAGS.contains(&name);
    if block && !out.ends_with('\n') {
        out.push('\n');
    }
    for child in element.children() {
        if let Some(child_el) = ElementRef::wrap(child) {
            walk_element(child_el, out);
        } else if let Some(text) = child.value().as_text() {
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                if !out.is_empty() && !out.ends_with('\n') && !out.ends_with(' ') {
                    out.push(' ');
                }
                push_collapsed(trimmed, out);
            }
        }
    }
    if block && !out.ends_with('\n') {
        out.push('\n');
    }
}

/// Append text with internal whitespace runs collapsed to single spaces.
fn push_collapsed(text: &str, out: &mut String) {
    let mut first = true;
    for word in text.split_whitespace() {
        if !first {
            out.push(' ');
        }
        out.push_str(word);
        first = false;
    }
}

/// Text content of one element with whitespace collapsed.
fn element_text(element: ElementRef<'_>) -> String {
    let mut out = String::new();
    for piece in element.text() {
        let trimmed = piece.trim();
        if trimmed.is_empty() {
            continue;
        }
        if !out.is_empty() {
            out.push(' ');
        }
        push_collapsed(trimmed, &mut out);
    }
    out
}

/// Truncate to at most `max` bytes without splitting a UTF-8 character.
///
/// The cap is a contract with the consumer, not a performance knob:
/// downstream readers must not assume full-page text is returned.
pub fn cap_utf8(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fallback;

    const PRODUCT_PAGE: &str = r#"
    <html><head><script>tracking();</script><style>.x{}</style></head>
    <body>
      <nav><a href="/">Home</a></nav>
      <h1>Wireless Mouse</h1>
      <div class="price-box">RM 129.00</div>
      <span class="a-offscreen">$29.99</span>
      <p>Ergonomic   and
         quiet.</p>
      <svg><path d="M0 0"/></svg>
      <footer>© Example</footer>
    </body></html>
    "#;

    #[test]
    fn test_visible_text_drops_non_content_subtrees() {
        let text = visible_text(PRODUCT_PAGE);
        assert!(text.contains("Wireless Mouse"));
        assert!(text.contains("Ergonomic and quiet."));
        assert!(!text.contains("tracking"));
        assert!(!text.contains(".x{}"));
        assert!(!text.contains("Home"));
        assert!(!text.contains("© Example"));
        assert!(!text.contains("M0 0"));
    }

    #[test]
    fn test_visible_text_preserves_block_breaks() {
        let text = visible_text("<body><p>one</p><p>two</p><div>three</div></body>");
        assert_eq!(text, "one\ntwo\nthree");
    }

    #[test]
    fn test_candidates_respect_selector_priority_then_document_order() {
        let table = SelectorTable::price_defaults();
        let candidates = collect_candidates(PRODUCT_PAGE, &table);
        // a-offscreen outranks price-box in the table even though price-box
        // appears earlier in the document.
        assert_eq!(candidates[0].selector, "span.a-offscreen");
        assert_eq!(candidates[0].raw_text, "$29.99");
        assert_eq!(candidates.len(), 2);

        let selected = select_candidate(&candidates).expect("candidate expected");
        assert_eq!(selected.raw_text, "$29.99");
    }

    #[test]
    fn test_empty_elements_yield_no_candidates() {
        let html = r#"<body><span class="a-offscreen">  </span></body>"#;
        let candidates = collect_candidates(html, &SelectorTable::price_defaults());
        assert!(candidates.is_empty());
    }

    #[tokio::test]
    async fn test_market_chain_falls_back_to_currency_marker() {
        let html = "<body><p>Deal of the day: RM 1,299.00 only!</p></body>".to_string();
        let text = visible_text(&html);
        let chain: Vec<Box<dyn Strategy<PriceSignal>>> = vec![
            Box::new(SelectorScan {
                html,
                table: SelectorTable::price_defaults(),
            }),
            Box::new(CurrencyScan { text }),
        ];

        let result = fallback::run("market", chain).await.expect("chain succeeds");
        assert_eq!(result.attempts.len(), 2);
        match result.payload {
            PriceSignal::Marker { matched } => assert_eq!(matched, "RM 1,299.00"),
            other => panic!("expected marker, got {other:?}"),
        }
    }

    #[test]
    fn test_currency_pattern_shapes() {
        let re = currency_pattern();
        assert!(re.is_match("only $19.99 today"));
        assert!(re.is_match("price: EUR 1.299,00"));
        assert!(re.is_match("₹499"));
        assert!(!re.is_match("nothing for sale here"));
    }

    #[test]
    fn test_cap_utf8_respects_char_boundaries() {
        let s = "ab€cd";
        // "ab" is 2 bytes, '€' is 3; a cap of 4 must not split the euro sign.
        assert_eq!(cap_utf8(s, 4), "ab");
        assert_eq!(cap_utf8(s, 5), "ab€");
        assert_eq!(cap_utf8(s, 100), s);
    }
}
