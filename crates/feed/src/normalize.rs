// ABOUTME: Converts extracted records into feed items.
// ABOUTME: Renders title/description templates, resolves links and dates, and computes stable guids.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sitefeed_scrape::Record;
use url::Url;

use crate::html_utils::{collapse_whitespace, escape_html, strip_whitespace};
use crate::models::FeedItem;
use crate::time_parse::parse_date;

/// Delimiter between the parts hashed into a guid.
pub const GUID_DELIMITER: &str = "|";

/// Per-route title and description templates.
///
/// `{name}` is replaced by the value of field `name`, `{link}` by the item link.
/// Unknown placeholders are left as written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemTemplate {
    pub title: String,
    /// HTML description. Field values are escaped. Defaults to one line per field.
    #[serde(default)]
    pub description: Option<String>,
}

impl ItemTemplate {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Placeholder names used by the title and description.
    pub fn placeholders(&self) -> Vec<&str> {
        let mut names = placeholder_names(&self.title);
        if let Some(desc) = &self.description {
            names.extend(placeholder_names(desc));
        }
        names
    }
}

fn placeholder_names(template: &str) -> Vec<&str> {
    let mut names = Vec::new();
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) => {
                names.push(&after[..close]);
                rest = &after[close + 1..];
            }
            None => break,
        }
    }
    names
}

/// Everything the normalizer needs besides the record itself.
#[derive(Debug, Clone)]
pub struct NormalizeContext<'a> {
    /// Page the records came from; default item link and base for relative hrefs.
    pub source_link: &'a str,
    pub template: &'a ItemTemplate,
    /// Field holding the item's href, if items link somewhere other than the page.
    pub link_field: Option<&'a str>,
    /// Field holding a per-item date.
    pub date_field: Option<&'a str>,
    /// Date used when no per-item date parses: the page date or the run's fallback time.
    pub default_date: DateTime<Utc>,
}

/// Converts a record into a feed item.
pub fn normalize(record: &Record, ctx: &NormalizeContext<'_>) -> FeedItem {
    let link = match ctx.link_field.and_then(|f| record.get(f)) {
        Some(href) => resolve_link(ctx.source_link, href),
        None => ctx.source_link.to_string(),
    };

    let pub_date = ctx
        .date_field
        .and_then(|f| record.get(f))
        .and_then(parse_date)
        .unwrap_or(ctx.default_date);

    let title = collapse_whitespace(&render(&ctx.template.title, record, &link, false));
    let description = match &ctx.template.description {
        Some(template) => render(template, record, &link, true).trim().to_string(),
        None => default_description(record),
    };

    FeedItem {
        title,
        link,
        pub_date,
        guid: compute_guid(record.values(), pub_date),
        description,
    }
}

/// Computes the content-derived identifier of an item.
///
/// Every value is stripped of all whitespace, the date is rendered as a calendar day,
/// and the parts are joined with [`GUID_DELIMITER`] and hashed with SHA-256.
pub fn compute_guid<'a, I>(values: I, pub_date: DateTime<Utc>) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let mut parts: Vec<String> = values.into_iter().map(strip_whitespace).collect();
    parts.push(pub_date.format("%Y-%m-%d").to_string());

    let mut hasher = Sha256::new();
    hasher.update(parts.join(GUID_DELIMITER).as_bytes());
    hex::encode(hasher.finalize())
}

/// Resolves `href` against `base`. Absolute hrefs are returned unchanged.
pub fn resolve_link(base: &str, href: &str) -> String {
    let href = href.trim();
    if href.is_empty() {
        return base.to_string();
    }
    if let Ok(abs) = Url::parse(href) {
        return abs.to_string();
    }
    Url::parse(base)
        .and_then(|b| b.join(href))
        .map(|u| u.to_string())
        .unwrap_or_else(|_| href.to_string())
}

fn render(template: &str, record: &Record, link: &str, escape: bool) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            out.push_str(&rest[open..]);
            return out;
        };
        let name = &after[..close];
        let value = if name == "link" {
            Some(link)
        } else {
            record.get(name)
        };
        match value {
            Some(v) if escape => out.push_str(&escape_html(v)),
            Some(v) => out.push_str(v),
            None => out.push_str(&rest[open..open + close + 2]),
        }
        rest = &after[close + 1..];
    }
    out.push_str(rest);
    out
}

fn default_description(record: &Record) -> String {
    record
        .fields
        .iter()
        .map(|f| format!("<b>{}:</b> {}", escape_html(&f.name), escape_html(&f.value)))
        .collect::<Vec<_>>()
        .join("<br/>")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use sitefeed_scrape::RecordField;

    fn record(pairs: &[(&str, &str)]) -> Record {
        Record {
            fields: pairs
                .iter()
                .map(|(name, value)| RecordField {
                    name: name.to_string(),
                    value: value.to_string(),
                })
                .collect(),
        }
    }

    fn quote(latest: &str) -> Record {
        record(&[
            ("contract", "AU9999"),
            ("latest", latest),
            ("high", "515.00"),
            ("low", "510.00"),
            ("open", "511.00"),
        ])
    }

    fn day() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 15, 0, 0, 0).unwrap()
    }

    fn ctx<'a>(template: &'a ItemTemplate) -> NormalizeContext<'a> {
        NormalizeContext {
            source_link: "https://www.sge.com.cn/sjzx/yshqbg",
            template,
            link_field: None,
            date_field: None,
            default_date: day(),
        }
    }

    #[test]
    fn guid_is_reproducible() {
        let r = quote("512.30");
        assert_eq!(compute_guid(r.values(), day()), compute_guid(r.values(), day()));
        assert_eq!(compute_guid(r.values(), day()).len(), 64);
    }

    #[test]
    fn guid_changes_with_any_field() {
        let base = compute_guid(quote("512.30").values(), day());
        assert_ne!(base, compute_guid(quote("512.31").values(), day()));
    }

    #[test]
    fn guid_ignores_whitespace() {
        let base = compute_guid(quote("512.30").values(), day());
        assert_eq!(base, compute_guid(quote(" 512 .30\n").values(), day()));
    }

    #[test]
    fn guid_changes_with_day_but_not_time_of_day() {
        let r = quote("512.30");
        let later_same_day = Utc.with_ymd_and_hms(2024, 3, 15, 18, 0, 0).unwrap();
        let next_day = Utc.with_ymd_and_hms(2024, 3, 16, 0, 0, 0).unwrap();
        assert_eq!(
            compute_guid(r.values(), day()),
            compute_guid(r.values(), later_same_day)
        );
        assert_ne!(
            compute_guid(r.values(), day()),
            compute_guid(r.values(), next_day)
        );
    }

    #[test]
    fn guid_keeps_field_boundaries() {
        let a = compute_guid(["AB", "C"], day());
        let b = compute_guid(["A", "BC"], day());
        assert_ne!(a, b);
    }

    #[test]
    fn normalize_renders_title_and_description() {
        let template = ItemTemplate::new("{contract} 最新价 {latest}")
            .with_description("<b>合约:</b> {contract}<br/><b>最新价:</b> {latest}");
        let item = normalize(&quote("512.30"), &ctx(&template));

        assert_eq!(item.title, "AU9999 最新价 512.30");
        assert_eq!(
            item.description,
            "<b>合约:</b> AU9999<br/><b>最新价:</b> 512.30"
        );
        assert_eq!(item.link, "https://www.sge.com.cn/sjzx/yshqbg");
        assert_eq!(item.pub_date, day());
        assert_eq!(item.guid, compute_guid(quote("512.30").values(), day()));
    }

    #[test]
    fn description_escapes_values_but_title_does_not() {
        let template = ItemTemplate::new("{contract}").with_description("<p>{contract}</p>");
        let r = record(&[("contract", "A&B <x>")]);
        let item = normalize(&r, &ctx(&template));
        assert_eq!(item.title, "A&B <x>");
        assert_eq!(item.description, "<p>A&amp;B &lt;x&gt;</p>");
    }

    #[test]
    fn unknown_placeholders_are_kept() {
        let template = ItemTemplate::new("{contract} {missing} {unterminated");
        let item = normalize(&quote("512.30"), &ctx(&template));
        assert_eq!(item.title, "AU9999 {missing} {unterminated");
    }

    #[test]
    fn default_description_lists_fields() {
        let template = ItemTemplate::new("{contract}");
        let item = normalize(&record(&[("contract", "AU9999"), ("latest", "512.30")]), &ctx(&template));
        assert_eq!(
            item.description,
            "<b>contract:</b> AU9999<br/><b>latest:</b> 512.30"
        );
    }

    #[test]
    fn link_and_date_fields_are_used() {
        let template = ItemTemplate::new("{title}");
        let context = NormalizeContext {
            source_link: "https://zrzyt.xinjiang.gov.cn/xjgtzy/tzgg/common_list.shtml",
            template: &template,
            link_field: Some("href"),
            date_field: Some("date"),
            default_date: day(),
        };
        let r = record(&[
            ("title", "关于征求意见的通知"),
            ("href", "/xjgtzy/tzgg/202403/t1.shtml"),
            ("date", "2024-03-01"),
        ]);
        let item = normalize(&r, &context);
        assert_eq!(
            item.link,
            "https://zrzyt.xinjiang.gov.cn/xjgtzy/tzgg/202403/t1.shtml"
        );
        assert_eq!(item.pub_date, Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap());

        let undated = record(&[("title", "x"), ("href", ""), ("date", "近期")]);
        let item = normalize(&undated, &context);
        assert_eq!(item.pub_date, day());
        assert_eq!(item.link, context.source_link);
    }

    #[test]
    fn resolve_link_handles_absolute_relative_and_empty() {
        let base = "https://zrzyt.xinjiang.gov.cn/xjgtzy/tzgg/common_list.shtml";
        assert_eq!(resolve_link(base, "https://other.example/a"), "https://other.example/a");
        assert_eq!(
            resolve_link(base, "./t2.shtml"),
            "https://zrzyt.xinjiang.gov.cn/xjgtzy/tzgg/t2.shtml"
        );
        assert_eq!(resolve_link(base, "  "), base);
    }

    #[test]
    fn template_placeholders_are_listed() {
        let template = ItemTemplate::new("{contract} 最新价 {latest}").with_description("{link} {high}");
        assert_eq!(template.placeholders(), vec!["contract", "latest", "link", "high"]);
    }
}
