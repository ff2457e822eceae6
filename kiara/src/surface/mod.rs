//! The boundary between the reconciliation engine and a live document.
//!
//! Every method is one round trip to the remote page. Element operations
//! wait up to `timeout` for the selector to match and then act on the first
//! match.

use crate::errors::SurfaceError;
use crate::selector::Selector;
use regex::Regex;
use std::fmt;
use std::time::Duration;

pub mod cdp;

pub use cdp::CdpSurface;

/// What a page URL is waited for to become.
#[derive(Debug, Clone)]
pub enum UrlPattern {
    Exact(String),
    Regex(Regex),
}

impl UrlPattern {
    pub fn exact(url: impl Into<String>) -> Self {
        UrlPattern::Exact(url.into())
    }

    pub fn regex(pattern: &str) -> Result<Self, regex::Error> {
        Ok(UrlPattern::Regex(Regex::new(pattern)?))
    }

    pub fn matches(&self, url: &str) -> bool {
        match self {
            UrlPattern::Exact(expected) => expected == url,
            UrlPattern::Regex(re) => re.is_match(url),
        }
    }
}

impl fmt::Display for UrlPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UrlPattern::Exact(url) => write!(f, "{url}"),
            UrlPattern::Regex(re) => write!(f, "/{}/", re.as_str()),
        }
    }
}

/// The common trait that every document backend must implement
#[async_trait::async_trait]
pub trait FormSurface: Send + Sync {
    /// Number of elements currently matching the selector. Never waits.
    async fn count(&self, selector: &Selector) -> Result<usize, SurfaceError>;

    /// Read an attribute of the first match. `value` on inputs is the live value.
    async fn attribute(
        &self,
        selector: &Selector,
        name: &str,
        timeout: Duration,
    ) -> Result<Option<String>, SurfaceError>;

    async fn inner_html(&self, selector: &Selector, timeout: Duration)
        -> Result<String, SurfaceError>;

    async fn inner_text(&self, selector: &Selector, timeout: Duration)
        -> Result<String, SurfaceError>;

    /// Replace the value of the first matching input.
    async fn fill(
        &self,
        selector: &Selector,
        value: &str,
        timeout: Duration,
    ) -> Result<(), SurfaceError>;

    /// Move focus away from the first match, firing its blur/change handlers.
    async fn blur(&self, selector: &Selector, timeout: Duration) -> Result<(), SurfaceError>;

    async fn click(&self, selector: &Selector, timeout: Duration) -> Result<(), SurfaceError>;

    /// Tick a checkbox; a no-op when it is already checked.
    async fn check(&self, selector: &Selector, timeout: Duration) -> Result<(), SurfaceError>;

    /// Whether the selector matches within `timeout`. Absence is not an error.
    async fn is_present(&self, selector: &Selector, timeout: Duration)
        -> Result<bool, SurfaceError>;

    async fn wait_for_url(&self, pattern: &UrlPattern, timeout: Duration)
        -> Result<(), SurfaceError>;

    async fn goto(&self, url: &str, timeout: Duration) -> Result<(), SurfaceError>;

    async fn current_url(&self) -> Result<String, SurfaceError>;
}
