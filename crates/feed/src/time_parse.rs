// ABOUTME: Publish-date resolution for scraped items, with an injectable clock.
// ABOUTME: Matches year/month/day patterns, then common datetime formats, then falls back to now.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock frozen at one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Year, month and day separated by 年/月(/日), '-', '/' or '.'.
static YMD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d{4})\s*[年\-/.]\s*(\d{1,2})\s*[月\-/.]\s*(\d{1,2})").expect("valid date regex")
});

/// Finds a year/month/day date anywhere in `text`, e.g. "2024年03月15日 延时行情".
///
/// Returns UTC midnight of that day.
pub fn match_ymd(text: &str) -> Option<DateTime<Utc>> {
    let caps = YMD_RE.captures(text)?;
    let year = caps[1].parse().ok()?;
    let month = caps[2].parse().ok()?;
    let day = caps[3].parse().ok()?;
    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?))
}

/// Parses a datetime string using common RSS/Atom and CMS formats.
/// Returns UTC datetime if successful, None if no format matches.
pub fn parse_flexible_time(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.with_timezone(&Utc));
    }

    let formats_with_tz = [
        // "2024-03-15T09:30:00+0800"
        "%Y-%m-%dT%H:%M:%S%z",
        // "2024-03-15 09:30:00 +08:00"
        "%Y-%m-%d %H:%M:%S %:z",
        // "15 Mar 2024 09:30:00 +0800"
        "%d %b %Y %H:%M:%S %z",
    ];

    for fmt in &formats_with_tz {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }

    // No timezone: assume UTC.
    let formats_naive = [
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y/%m/%d %H:%M:%S",
        "%Y/%m/%d %H:%M",
        "%d %b %Y %H:%M:%S",
    ];

    for fmt in &formats_naive {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }

    let date_formats = ["%d %b %Y", "%b %d, %Y", "%B %d, %Y"];
    for fmt in &date_formats {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?));
        }
    }

    None
}

/// Resolves the publish date carried by `text`, or `clock.now()` when there is none.
///
/// Full datetimes keep their time of day; bare dates become UTC midnight.
pub fn parse_date_or_now(text: &str, clock: &dyn Clock) -> DateTime<Utc> {
    parse_date(text).unwrap_or_else(|| clock.now())
}

/// Like [`parse_date_or_now`] without the fallback.
pub fn parse_date(text: &str) -> Option<DateTime<Utc>> {
    parse_flexible_time(text).or_else(|| match_ymd(text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Duration, Timelike};

    fn fixed() -> FixedClock {
        FixedClock(Utc.with_ymd_and_hms(2024, 6, 1, 8, 30, 0).unwrap())
    }

    #[test]
    fn test_match_chinese_title() {
        let dt = match_ymd("上海黄金交易所2024年03月15日延时行情").unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2024, 3, 15, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_match_separators_and_single_digits() {
        let expected = Utc.with_ymd_and_hms(2024, 3, 5, 0, 0, 0).unwrap();
        assert_eq!(match_ymd("2024-03-05"), Some(expected));
        assert_eq!(match_ymd("发布于 2024/3/5"), Some(expected));
        assert_eq!(match_ymd("2024.03.05"), Some(expected));
        assert_eq!(match_ymd("2024年3月5日"), Some(expected));
    }

    #[test]
    fn test_match_rejects_impossible_dates() {
        assert!(match_ymd("2024年13月40日").is_none());
        assert!(match_ymd("延时行情").is_none());
    }

    #[test]
    fn test_rfc3339_keeps_time() {
        let dt = parse_flexible_time("2024-03-15T09:30:00+08:00").unwrap();
        assert_eq!(dt.hour(), 1);
        assert_eq!(dt.day(), 15);
    }

    #[test]
    fn test_rfc2822() {
        assert!(parse_flexible_time("Fri, 15 Mar 2024 09:30:00 +0800").is_some());
    }

    #[test]
    fn test_naive_datetime_assumes_utc() {
        let dt = parse_flexible_time("2024-03-15 09:30").unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2024, 3, 15, 9, 30, 0).unwrap());
    }

    #[test]
    fn test_empty_and_invalid_return_none() {
        assert!(parse_flexible_time("").is_none());
        assert!(parse_flexible_time("   ").is_none());
        assert!(parse_flexible_time("not a date").is_none());
    }

    #[test]
    fn test_parse_date_or_now_prefers_page_date() {
        let dt = parse_date_or_now("2024年03月15日 延时行情", &fixed());
        assert_eq!(dt.year(), 2024);
        assert_eq!(dt.month(), 3);
        assert_eq!(dt.day(), 15);
        assert_eq!(dt.hour(), 0);
    }

    #[test]
    fn test_parse_date_or_now_falls_back_to_clock() {
        assert_eq!(parse_date_or_now("延时行情", &fixed()), fixed().now());
        assert_eq!(parse_date_or_now("", &fixed()), fixed().now());
    }

    #[test]
    fn test_system_clock_fallback_is_recent() {
        let before = Utc::now();
        let dt = parse_date_or_now("no date here", &SystemClock);
        let after = Utc::now();
        assert!(dt >= before - Duration::seconds(1));
        assert!(dt <= after + Duration::seconds(1));
    }
}
