// ABOUTME: Record extraction from a parsed document using a LocatorSet.
// ABOUTME: Resolves fields per row, then validates the row against the minimum field count.

//! Record extraction.
//!
//! Extraction runs in two stages per row:
//! - [`resolve_row`] reads every configured field, in field order, yielding
//!   `None` for fields whose selector matched nothing.
//! - [`validate_row`] counts resolved fields and discards the row when the
//!   count is below the locator set's minimum.
//!
//! Rows come out in document order; that order becomes feed item order.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::document::{Document, Node, Select};
use crate::extractors::locators::{FieldLocator, LocatorSet};

/// A single named, trimmed value within a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordField {
    pub name: String,
    pub value: String,
}

/// One row's worth of extracted field values, in field order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub fields: Vec<RecordField>,
}

impl Record {
    /// Value of the named field.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.value.as_str())
    }

    /// All values in field order.
    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.value.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Reads one field from a row. `None` when the selector matched nothing.
fn resolve_field(row: &Node<'_>, field: &FieldLocator) -> Option<RecordField> {
    let (css, attr) = field.selector.parts();
    let el = row.select_first(css)?;
    let value = match attr {
        Some(attr) => el.attr(attr)?,
        None => el.text(),
    };
    Some(RecordField {
        name: field.name.clone(),
        value,
    })
}

/// Stage one: resolve every configured field of `row`, in field order.
pub fn resolve_row(row: &Node<'_>, locators: &LocatorSet) -> Vec<Option<RecordField>> {
    locators
        .fields
        .iter()
        .map(|field| resolve_field(row, field))
        .collect()
}

/// Stage two: keep the row only if at least `min_fields` fields resolved.
///
/// Unresolved fields of a kept row become empty values so positions stay fixed.
pub fn validate_row(
    resolved: Vec<Option<RecordField>>,
    locators: &LocatorSet,
) -> Option<Record> {
    let count = resolved.iter().filter(|f| f.is_some()).count();
    if count < locators.required_fields() {
        return None;
    }

    let fields = resolved
        .into_iter()
        .zip(&locators.fields)
        .map(|(field, locator)| {
            field.unwrap_or_else(|| RecordField {
                name: locator.name.clone(),
                value: String::new(),
            })
        })
        .collect();
    Some(Record { fields })
}

/// Extracts records from `doc`.
///
/// A missing root yields an empty vector. Header rows are skipped across
/// the combined rows of every root match.
pub fn extract_records(doc: &Document, locators: &LocatorSet) -> Vec<Record> {
    let mut records = Vec::new();
    let mut seen = 0usize;
    let mut dropped = 0usize;

    for root in doc.select(&locators.root) {
        for row in root.select(&locators.row) {
            seen += 1;
            if seen <= locators.skip_rows {
                continue;
            }
            match validate_row(resolve_row(&row, locators), locators) {
                Some(record) => records.push(record),
                None => dropped += 1,
            }
        }
    }

    debug!(
        root = %locators.root,
        rows = seen,
        records = records.len(),
        dropped,
        "extracted records"
    );
    records
}

/// Text of the first element matching `css`, if any and non-empty.
pub fn extract_text(doc: &Document, css: &str) -> Option<String> {
    doc.select(css)
        .iter()
        .map(|el| el.text())
        .find(|text| !text.is_empty())
}
