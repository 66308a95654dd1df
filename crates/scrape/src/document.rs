// ABOUTME: Parsed HTML document with a small selector-query interface.
// ABOUTME: Document::parse rejects bodies with no markup; malformed markup still parses.

use scraper::{ElementRef, Html};
use tracing::warn;

use crate::error::ScrapeError;
use crate::extractors::compiled::get_or_compile;

/// Selector-based lookup over a parsed tree.
///
/// Locators are opaque CSS strings. An invalid locator selects nothing.
pub trait Select {
    fn select(&self, locator: &str) -> Vec<Node<'_>>;

    /// First element matching `locator`, if any.
    fn select_first(&self, locator: &str) -> Option<Node<'_>> {
        self.select(locator).into_iter().next()
    }
}

/// A parsed HTML document.
pub struct Document {
    html: Html,
}

impl Document {
    /// Parse raw markup.
    ///
    /// Fails only when the body is empty or carries no markup at all.
    pub fn parse(raw: &str) -> Result<Self, ScrapeError> {
        if raw.trim().is_empty() {
            return Err(ScrapeError::parse(
                "",
                "Parse",
                Some(anyhow::anyhow!("empty document")),
            ));
        }
        if !raw.contains('<') {
            return Err(ScrapeError::parse(
                "",
                "Parse",
                Some(anyhow::anyhow!("document contains no markup")),
            ));
        }
        Ok(Self {
            html: Html::parse_document(raw),
        })
    }

    /// Parse errors recovered by the HTML parser, for diagnostics.
    pub fn recovered_errors(&self) -> usize {
        self.html.errors.len()
    }
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("recovered_errors", &self.recovered_errors())
            .finish()
    }
}

impl Select for Document {
    fn select(&self, locator: &str) -> Vec<Node<'_>> {
        match get_or_compile(locator) {
            Some(selector) => self.html.select(&selector).map(Node).collect(),
            None => {
                warn!(locator, "invalid selector");
                Vec::new()
            }
        }
    }
}

/// An element within a [`Document`].
#[derive(Debug, Clone, Copy)]
pub struct Node<'a>(ElementRef<'a>);

impl<'a> Node<'a> {
    /// Text content with whitespace runs collapsed to single spaces and trimmed.
    pub fn text(&self) -> String {
        let raw: String = self.0.text().collect();
        raw.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    /// Attribute value, trimmed.
    pub fn attr(&self, name: &str) -> Option<String> {
        self.0.value().attr(name).map(|v| v.trim().to_string())
    }

    /// Tag name of the element.
    pub fn tag(&self) -> &str {
        self.0.value().name()
    }
}

impl Select for Node<'_> {
    fn select(&self, locator: &str) -> Vec<Node<'_>> {
        match get_or_compile(locator) {
            Some(selector) => self.0.select(&selector).map(Node).collect(),
            None => {
                warn!(locator, "invalid selector");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_HTML: &str = r#"
        <html>
        <body>
            <h1>  上海黄金交易所   2024年03月15日 延时行情 </h1>
            <ul class="list">
                <li><a href="/a/1.shtml"> First </a><span>2024-03-01</span></li>
                <li><a href="https://other.example/2">Second</a><span>2024-03-02</span></li>
            </ul>
        </body>
        </html>
    "#;

    #[test]
    fn parse_rejects_empty_body() {
        assert!(Document::parse("").unwrap_err().is_parse());
        assert!(Document::parse("   \n\t").unwrap_err().is_parse());
    }

    #[test]
    fn parse_rejects_non_markup() {
        let err = Document::parse("{\"error\": \"rate limited\"}").unwrap_err();
        assert!(err.is_parse());
    }

    #[test]
    fn parse_accepts_malformed_markup() {
        let doc = Document::parse("<table><tr><td>AU9999<td>512.30</table").unwrap();
        let cells = doc.select("td");
        assert_eq!(cells.len(), 2);
        assert_eq!(cells[1].text(), "512.30");
    }

    #[test]
    fn text_collapses_whitespace() {
        let doc = Document::parse(SAMPLE_HTML).unwrap();
        let h1 = doc.select_first("h1").unwrap();
        assert_eq!(h1.text(), "上海黄金交易所 2024年03月15日 延时行情");
    }

    #[test]
    fn nested_select_is_scoped_to_node() {
        let doc = Document::parse(SAMPLE_HTML).unwrap();
        let items = doc.select("ul.list li");
        assert_eq!(items.len(), 2);

        let link = items[0].select_first("a").unwrap();
        assert_eq!(link.text(), "First");
        assert_eq!(link.attr("href").as_deref(), Some("/a/1.shtml"));
        assert_eq!(link.tag(), "a");

        let spans = items[1].select("span");
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].text(), "2024-03-02");
    }

    #[test]
    fn missing_and_invalid_selectors_select_nothing() {
        let doc = Document::parse(SAMPLE_HTML).unwrap();
        assert!(doc.select("table").is_empty());
        assert!(doc.select("[[[invalid").is_empty());
        assert!(doc.select_first("table").is_none());
    }
}
