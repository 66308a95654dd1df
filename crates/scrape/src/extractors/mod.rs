// ABOUTME: Record extraction from parsed pages driven by declarative locators.
// ABOUTME: Includes the locator model, the row extractor, and the compiled selector cache.

//! Record extraction module.
//!
//! Submodules:
//! - `locators`: Locator sets with per-field selectors.
//! - `records`: Row resolution and validation.
//! - `compiled`: Process-wide compiled selector cache.

pub mod compiled;
pub mod locators;
pub mod records;
