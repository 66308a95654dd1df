// ABOUTME: Pre-compiled CSS selector cache for O(1) selector lookup.
// ABOUTME: Eliminates repeated parsing of locator strings on every row of every run.

//! Selector caching for efficient repeated DOM queries.
//!
//! Locators are applied once per row, so the same handful of selector strings
//! is parsed thousands of times over a process lifetime. This module compiles
//! each string once and hands out clones of the compiled selector.

use std::collections::HashMap;
use std::sync::RwLock;

use once_cell::sync::Lazy;
use scraper::Selector;

/// Thread-safe cache of compiled CSS selectors. Invalid selectors are cached as `None`.
static SELECTOR_CACHE: Lazy<RwLock<HashMap<String, Option<Selector>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Gets or compiles a CSS selector, caching the result.
///
/// Returns `Some(Selector)` if the selector is valid, `None` if invalid.
pub fn get_or_compile(css: &str) -> Option<Selector> {
    {
        let cache = SELECTOR_CACHE.read().unwrap_or_else(|e| e.into_inner());
        if let Some(cached) = cache.get(css) {
            return cached.clone();
        }
    }

    let compiled = Selector::parse(css).ok();
    let mut cache = SELECTOR_CACHE.write().unwrap_or_else(|e| e.into_inner());
    // Another thread may have inserted while we were compiling.
    if let Some(cached) = cache.get(css) {
        return cached.clone();
    }
    cache.insert(css.to_string(), compiled.clone());
    compiled
}

/// Returns true if `css` compiles to a valid selector.
pub fn is_valid_selector(css: &str) -> bool {
    get_or_compile(css).is_some()
}

/// Precompiles a batch of selectors into the cache.
///
/// Call this after loading route definitions to warm the cache.
pub fn precompile_selectors<I, S>(selectors: I)
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut cache = SELECTOR_CACHE.write().unwrap_or_else(|e| e.into_inner());
    for css in selectors {
        let css = css.as_ref();
        if !cache.contains_key(css) {
            cache.insert(css.to_string(), Selector::parse(css).ok());
        }
    }
}
