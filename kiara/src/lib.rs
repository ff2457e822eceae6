//! Timesheet reconciliation for the Kiara weekly grid
//!
//! This crate fills a server-rendered weekly timesheet whose inputs are only
//! addressable through positional names such as
//! `taak[3].prestatie[2].dagPrestatie[4].gepresteerdeTijd`. Desired entries are
//! reconciled against the rows already on the page: matching rows are
//! updated in place, missing rows are created with the form's clone action.
//!
//! The live document is reached through the [`FormSurface`] trait, with a
//! Chrome DevTools Protocol backend in [`surface::CdpSurface`].

use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

pub mod addressing;
pub mod addressor;
pub mod authentication;
pub mod errors;
pub mod locator;
pub mod matcher;
pub mod navigation;
pub mod orchestrator;
pub mod selector;
pub mod surface;
pub mod synthesizer;
#[cfg(test)]
mod tests;
pub mod work_item;
pub mod writer;

pub use errors::{KiaraError, KiaraResult, SurfaceError};
pub use locator::Locator;
pub use orchestrator::{ProjectReport, Reconciler, RunReport, Settings};
pub use selector::Selector;
pub use surface::{FormSurface, UrlPattern};
pub use work_item::{
    group_work_items, DateColumnIndex, MatchResult, MonthDay, Project, RowIndex, WorkItem,
};

/// The main entry point for driving the timesheet document
#[derive(Clone)]
pub struct Page {
    surface: Arc<dyn FormSurface>,
    timeout: Duration,
}

impl Page {
    pub fn new(surface: Arc<dyn FormSurface>) -> Self {
        Self {
            surface,
            timeout: locator::DEFAULT_LOCATOR_TIMEOUT,
        }
    }

    /// Bound applied to every locator created from this page.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn locator(&self, selector: impl Into<Selector>) -> Locator {
        Locator::new(self.surface.clone(), selector.into()).set_default_timeout(self.timeout)
    }

    pub fn get_by_role(&self, role: &str, name: &str, exact: bool) -> Locator {
        self.locator(Selector::role(role, name, exact))
    }

    /// Locator for the input whose `name` attribute is exactly `name`.
    pub fn input(&self, name: &str) -> Locator {
        self.locator(Selector::input_name(name))
    }

    #[instrument(skip(self))]
    pub async fn goto(&self, url: &str) -> Result<(), SurfaceError> {
        self.surface.goto(url, self.timeout).await
    }

    #[instrument(skip(self, pattern), fields(pattern = %pattern))]
    pub async fn wait_for_url(
        &self,
        pattern: &UrlPattern,
        timeout: Option<Duration>,
    ) -> Result<(), SurfaceError> {
        self.surface
            .wait_for_url(pattern, timeout.unwrap_or(self.timeout))
            .await
    }

    pub async fn current_url(&self) -> Result<String, SurfaceError> {
        self.surface.current_url().await
    }
}
