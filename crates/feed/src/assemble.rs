// ABOUTME: Packages feed metadata and items into the final Feed value.
// ABOUTME: Validates title/link and enforces the allow-empty policy.

use crate::error::FeedError;
use crate::models::{Feed, FeedItem};

/// Builds a [`Feed`].
///
/// Fails with `Invalid` when the title or link is blank, and with `Empty` when there
/// are no items and `allow_empty` is false.
pub fn assemble(
    title: &str,
    link: &str,
    items: Vec<FeedItem>,
    ttl: Option<u32>,
    allow_empty: bool,
) -> Result<Feed, FeedError> {
    let title = title.trim();
    let link = link.trim();
    if title.is_empty() {
        return Err(FeedError::invalid("feed title is empty"));
    }
    if link.is_empty() {
        return Err(FeedError::invalid("feed link is empty"));
    }
    if items.is_empty() && !allow_empty {
        return Err(FeedError::Empty);
    }

    Ok(Feed {
        title: title.to_string(),
        link: link.to_string(),
        items,
        ttl,
        allow_empty,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn item(title: &str) -> FeedItem {
        FeedItem {
            title: title.to_string(),
            link: "https://www.sge.com.cn/sjzx/yshqbg".to_string(),
            pub_date: Utc::now(),
            guid: "g".to_string(),
            description: String::new(),
        }
    }

    #[test]
    fn assembles_feed_with_hints() {
        let feed = assemble(
            " 上海黄金交易所 - 延时行情 ",
            "https://www.sge.com.cn/sjzx/yshqbg",
            vec![item("a"), item("b")],
            Some(5),
            true,
        )
        .unwrap();
        assert_eq!(feed.title, "上海黄金交易所 - 延时行情");
        assert_eq!(feed.items.len(), 2);
        assert_eq!(feed.items[0].title, "a");
        assert_eq!(feed.ttl, Some(5));
        assert!(feed.allow_empty);
    }

    #[test]
    fn empty_items_allowed_when_flag_set() {
        let feed = assemble("t", "https://example.com", vec![], None, true).unwrap();
        assert!(feed.is_empty());
    }

    #[test]
    fn empty_items_rejected_without_flag() {
        let err = assemble("t", "https://example.com", vec![], None, false).unwrap_err();
        assert!(matches!(err, FeedError::Empty));
    }

    #[test]
    fn blank_title_or_link_is_invalid() {
        assert!(matches!(
            assemble("  ", "https://example.com", vec![item("a")], None, true),
            Err(FeedError::Invalid(_))
        ));
        assert!(matches!(
            assemble("t", "", vec![item("a")], None, true),
            Err(FeedError::Invalid(_))
        ));
    }
}
