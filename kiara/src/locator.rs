use tracing::{debug, instrument};

use crate::errors::SurfaceError;
use crate::selector::Selector;
use crate::surface::FormSurface;
use std::sync::Arc;
use std::time::Duration;

// Default timeout if none is specified on the locator itself
pub const DEFAULT_LOCATOR_TIMEOUT: Duration = Duration::from_secs(30);

/// A lazily resolved handle on elements of the live document.
///
/// A locator is re-resolved on every call, so it stays valid across page
/// reloads as long as its selector still describes the wanted element.
#[derive(Clone)]
pub struct Locator {
    surface: Arc<dyn FormSurface>,
    selector: Selector,
    timeout: Duration,
}

impl Locator {
    /// Create a new locator with the given selector
    pub(crate) fn new(surface: Arc<dyn FormSurface>, selector: Selector) -> Self {
        Self {
            surface,
            selector,
            timeout: DEFAULT_LOCATOR_TIMEOUT,
        }
    }

    /// Set a default timeout for waiting operations on this locator instance.
    pub fn set_default_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn selector(&self) -> &Selector {
        &self.selector
    }

    fn append_selector(&self, selector_to_append: Selector) -> Locator {
        Locator {
            surface: self.surface.clone(),
            selector: self.selector.clone().then(selector_to_append),
            timeout: self.timeout,
        }
    }

    /// Get a nested locator
    pub fn locator(&self, selector: impl Into<Selector>) -> Locator {
        self.append_selector(selector.into())
    }

    /// Nested role lookup, like `Page::get_by_role` but scoped to this locator.
    pub fn get_by_role(&self, role: &str, name: &str, exact: bool) -> Locator {
        self.append_selector(Selector::role(role, name, exact))
    }

    /// The parent element of each match.
    pub fn parent(&self) -> Locator {
        self.append_selector(Selector::Parent)
    }

    pub fn nth(&self, index: usize) -> Locator {
        self.append_selector(Selector::Nth(index))
    }

    /// One locator per element matching right now. Does not wait.
    pub async fn all(&self) -> Result<Vec<Locator>, SurfaceError> {
        let count = self.surface.count(&self.selector).await?;
        debug!(count, "Resolved all matches for {}", self.selector);
        Ok((0..count).map(|i| self.nth(i)).collect())
    }

    #[instrument(level = "debug", skip(self), fields(selector = %self.selector))]
    pub async fn attribute(&self, name: &str) -> Result<Option<String>, SurfaceError> {
        self.surface
            .attribute(&self.selector, name, self.timeout)
            .await
    }

    pub async fn inner_html(&self) -> Result<String, SurfaceError> {
        self.surface.inner_html(&self.selector, self.timeout).await
    }

    pub async fn inner_text(&self) -> Result<String, SurfaceError> {
        self.surface.inner_text(&self.selector, self.timeout).await
    }

    #[instrument(level = "debug", skip(self), fields(selector = %self.selector))]
    pub async fn fill(&self, value: &str) -> Result<(), SurfaceError> {
        self.surface.fill(&self.selector, value, self.timeout).await
    }

    pub async fn blur(&self) -> Result<(), SurfaceError> {
        self.surface.blur(&self.selector, self.timeout).await
    }

    #[instrument(level = "debug", skip(self), fields(selector = %self.selector))]
    pub async fn click(&self) -> Result<(), SurfaceError> {
        self.surface.click(&self.selector, self.timeout).await
    }

    pub async fn check(&self) -> Result<(), SurfaceError> {
        self.surface.check(&self.selector, self.timeout).await
    }

    /// Whether the element shows up within `timeout` (defaults to the locator's).
    pub async fn is_present(&self, timeout: Option<Duration>) -> Result<bool, SurfaceError> {
        let effective_timeout = timeout.unwrap_or(self.timeout);
        self.surface
            .is_present(&self.selector, effective_timeout)
            .await
    }

    pub fn selector_string(&self) -> String {
        self.selector.to_string()
    }
}

impl std::fmt::Debug for Locator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Locator")
            .field("selector", &self.selector)
            .field("timeout", &self.timeout)
            .finish()
    }
}
