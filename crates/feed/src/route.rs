// ABOUTME: Route definitions tying a source page to its locators, templates, and freshness settings.
// ABOUTME: Provides RouteSpec validation, a RouteRegistry, and the builtin routes embedded as JSON.

//! Route definitions.
//!
//! A route is one instantiation of the pipeline for one source page. Routes
//! are plain data, normally loaded from JSON, and validated before use so a
//! bad selector or a typo in a template placeholder is reported up front
//! rather than producing silently empty feeds.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sitefeed_scrape::{is_valid_selector, precompile_selectors, LocatorSet};

use crate::error::FeedError;
use crate::normalize::ItemTemplate;

/// Embedded JSON containing the builtin routes.
const BUILTIN_ROUTES_JSON: &str = include_str!("../data/routes.json");

/// Where an item's publish date comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "from", rename_all = "snake_case")]
pub enum DateSource {
    /// Text of a page-level element, e.g. a heading carrying the report date.
    Page { selector: String },
    /// A record field.
    Field { name: String },
}

/// One source page and how to turn it into a feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteSpec {
    pub name: String,
    pub title: String,
    /// Canonical link of the feed.
    pub link: String,
    /// Page to fetch, when it differs from `link`.
    #[serde(default)]
    pub url: Option<String>,
    pub locators: LocatorSet,
    pub template: ItemTemplate,
    #[serde(default)]
    pub link_field: Option<String>,
    #[serde(default)]
    pub date: Option<DateSource>,
    /// How long extracted items stay cached. Zero disables caching.
    #[serde(default)]
    pub cache_ttl_secs: u64,
    /// Polling hint for feed consumers, in minutes.
    #[serde(default)]
    pub ttl: Option<u32>,
    #[serde(default)]
    pub allow_empty: bool,
}

impl RouteSpec {
    /// URL fetched for this route.
    pub fn source_url(&self) -> &str {
        self.url.as_deref().unwrap_or(&self.link)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// Field holding per-item dates, if any.
    pub fn date_field(&self) -> Option<&str> {
        match &self.date {
            Some(DateSource::Field { name }) => Some(name),
            _ => None,
        }
    }

    /// Page-level date selector, if any.
    pub fn page_date_selector(&self) -> Option<&str> {
        match &self.date {
            Some(DateSource::Page { selector }) => Some(selector),
            _ => None,
        }
    }

    /// Checks the route for configuration mistakes, reporting all of them at once.
    pub fn validate(&self) -> Result<(), FeedError> {
        let mut problems = Vec::new();

        if self.name.trim().is_empty() {
            problems.push("name is empty".to_string());
        }
        if self.title.trim().is_empty() {
            problems.push("title is empty".to_string());
        }
        for (label, url) in [("link", self.link.as_str()), ("url", self.source_url())] {
            match url::Url::parse(url) {
                Ok(u) if matches!(u.scheme(), "http" | "https") => {}
                _ => problems.push(format!("{} is not an http(s) URL: {}", label, url)),
            }
        }

        if let Err(locator_problems) = self.locators.validate() {
            problems.extend(locator_problems);
        }

        let fields: Vec<&str> = self.locators.field_names().collect();
        for name in self.template.placeholders() {
            if name != "link" && !fields.contains(&name) {
                problems.push(format!("template placeholder {{{}}} is not a field", name));
            }
        }
        if let Some(name) = self.link_field.as_deref() {
            if !fields.contains(&name) {
                problems.push(format!("link_field {} is not a field", name));
            }
        }
        match &self.date {
            Some(DateSource::Field { name }) if !fields.contains(&name.as_str()) => {
                problems.push(format!("date field {} is not a field", name));
            }
            Some(DateSource::Page { selector }) if !is_valid_selector(selector) => {
                problems.push(format!("invalid date selector: {}", selector));
            }
            _ => {}
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(FeedError::Route {
                name: self.name.clone(),
                problems,
            })
        }
    }
}

/// Registry for looking up routes by name.
#[derive(Debug, Default, Clone)]
pub struct RouteRegistry {
    routes: BTreeMap<String, RouteSpec>,
}

impl RouteRegistry {
    /// Creates a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a JSON array of routes, validating each and warming the selector cache.
    pub fn from_json(json: &str) -> Result<Self, FeedError> {
        let routes: Vec<RouteSpec> = serde_json::from_str(json)
            .map_err(|e| FeedError::route("<json>", e.to_string()))?;

        let mut registry = Self::new();
        for route in routes {
            route.validate()?;
            precompile_selectors(route.locators.selectors());
            registry.register(route);
        }
        Ok(registry)
    }

    /// Registers a route under its name, replacing any previous route of that name.
    pub fn register(&mut self, route: RouteSpec) {
        self.routes.insert(route.name.clone(), route);
    }

    /// Looks up a route by name.
    pub fn get(&self, name: &str) -> Option<&RouteSpec> {
        self.routes.get(name)
    }

    /// Route names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.routes.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RouteSpec> {
        self.routes.values()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Loads the builtin routes from embedded JSON.
pub fn load_builtin_routes() -> Result<RouteRegistry, FeedError> {
    RouteRegistry::from_json(BUILTIN_ROUTES_JSON)
}
