// ABOUTME: Declarative locator definitions describing where records and their fields live in a page.
// ABOUTME: Defines SelectorSpec, FieldLocator, and LocatorSet with validation of selector strings.

//! Locator sets for record extraction.
//!
//! A locator set names the element(s) holding the record list, the selector
//! for a row inside them, and one sub-selector per field. Locator sets are
//! supplied per route (usually as JSON) and treated as immutable input.

use serde::{Deserialize, Serialize};

use crate::extractors::compiled::is_valid_selector;

/// Specifies how to read a value from the DOM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SelectorSpec {
    /// A CSS selector whose text content is the value, e.g. "td:nth-of-type(2)"
    Css(String),
    /// A CSS selector with attribute extraction, e.g. ["a", "href"]
    CssAttr(Vec<String>),
}

impl Default for SelectorSpec {
    fn default() -> Self {
        SelectorSpec::Css(String::new())
    }
}

impl SelectorSpec {
    /// Parses a selector spec into a CSS selector string and optional attribute name.
    pub fn parts(&self) -> (&str, Option<&str>) {
        match self {
            SelectorSpec::Css(css) => (css.as_str(), None),
            SelectorSpec::CssAttr(parts) => match parts.as_slice() {
                [css, attr, ..] => (css.as_str(), Some(attr.as_str())),
                [css] => (css.as_str(), None),
                [] => ("", None),
            },
        }
    }
}

/// One named field of a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldLocator {
    pub name: String,
    pub selector: SelectorSpec,
}

impl FieldLocator {
    /// A field read from the text of the first element matching `css`.
    pub fn text(name: impl Into<String>, css: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            selector: SelectorSpec::Css(css.into()),
        }
    }

    /// A field read from attribute `attr` of the first element matching `css`.
    pub fn attr(name: impl Into<String>, css: impl Into<String>, attr: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            selector: SelectorSpec::CssAttr(vec![css.into(), attr.into()]),
        }
    }
}

fn default_row() -> String {
    "tr".to_string()
}

/// Where the record list lives and how to read each record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocatorSet {
    /// Selector for the list/table element(s).
    pub root: String,
    /// Selector for a record row inside the root.
    #[serde(default = "default_row")]
    pub row: String,
    /// Field locators, in field order.
    pub fields: Vec<FieldLocator>,
    /// Leading rows to skip, e.g. 1 for a header row.
    #[serde(default)]
    pub skip_rows: usize,
    /// Rows resolving fewer fields than this are dropped. Defaults to all fields.
    #[serde(default)]
    pub min_fields: Option<usize>,
}

impl LocatorSet {
    /// A table whose first row is a header and whose cells map to `names` in order.
    pub fn table<I, S>(root: impl Into<String>, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fields = names
            .into_iter()
            .enumerate()
            .map(|(i, name)| FieldLocator::text(name, format!("td:nth-of-type({})", i + 1)))
            .collect();
        Self {
            root: root.into(),
            row: default_row(),
            fields,
            skip_rows: 1,
            min_fields: None,
        }
    }

    /// Minimum resolved field count for a row to be kept.
    pub fn required_fields(&self) -> usize {
        self.min_fields.unwrap_or(self.fields.len())
    }

    /// Field names in field order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Every selector string this locator set uses.
    pub fn selectors(&self) -> Vec<&str> {
        let mut out = vec![self.root.as_str(), self.row.as_str()];
        out.extend(self.fields.iter().map(|f| f.selector.parts().0));
        out
    }

    /// Checks selectors and field configuration, returning one message per problem.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut problems = Vec::new();

        for css in self.selectors() {
            if css.trim().is_empty() {
                problems.push("empty selector".to_string());
            } else if !is_valid_selector(css) {
                problems.push(format!("invalid selector: {}", css));
            }
        }

        for field in &self.fields {
            if let SelectorSpec::CssAttr(parts) = &field.selector {
                if parts.len() != 2 {
                    problems.push(format!(
                        "field {}: attribute selector must be [css, attr]",
                        field.name
                    ));
                }
            }
        }

        let mut seen = std::collections::HashSet::new();
        for name in self.field_names() {
            if !seen.insert(name) {
                problems.push(format!("duplicate field name: {}", name));
            }
        }

        if self.required_fields() > self.fields.len() {
            problems.push(format!(
                "min_fields {} exceeds field count {}",
                self.required_fields(),
                self.fields.len()
            ));
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(problems)
        }
    }
}
