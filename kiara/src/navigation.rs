use std::time::Duration;
use tracing::{debug, info, Instrument, Span};

use crate::errors::{KiaraError, KiaraResult};
use crate::selector::Selector;
use crate::surface::UrlPattern;
use crate::Page;

/// Section of tasks that belong to client projects.
pub const PROJECT_SECTION: &str = "Project-gerelateerde Taken";
/// Section of tasks that are not tied to a project.
pub const GENERAL_SECTION: &str = "Algemene Taken";

const START_CELL: &str = "knop ga verder";

/// Page-level navigation around the grid: entering the timesheet, folding
/// sections and projects, saving.
#[derive(Clone)]
pub struct Navigator {
    page: Page,
    timesheet_url: UrlPattern,
    save_button_alt: String,
    toggle_timeout: Duration,
    navigation_timeout: Duration,
    span: Span,
}

impl Navigator {
    pub fn new(
        page: Page,
        timesheet_url: UrlPattern,
        save_button_alt: &str,
        toggle_timeout: Duration,
        navigation_timeout: Duration,
        parent: &Span,
    ) -> Self {
        Self {
            page,
            timesheet_url,
            save_button_alt: save_button_alt.to_string(),
            toggle_timeout,
            navigation_timeout,
            span: tracing::debug_span!(parent: parent, "navigator"),
        }
    }

    /// Follow the start link from the landing page to the timesheet.
    pub async fn open_timesheet_page(&self) -> KiaraResult<()> {
        async {
            self.page
                .get_by_role("cell", START_CELL, true)
                .locator(Selector::css("a"))
                .click()
                .await
                .map_err(|e| KiaraError::navigation("timesheet start link", e))?;
            self.page
                .wait_for_url(&self.timesheet_url, Some(self.navigation_timeout))
                .await
                .map_err(|e| KiaraError::navigation("timesheet page", e))?;
            info!("Opened timesheet page");
            Ok(())
        }
        .instrument(self.span.clone())
        .await
    }

    /// Expand (or collapse) the section or project whose label cell reads
    /// `label`. A toggle that is not shown means the section is already in
    /// the wanted state.
    pub async fn expand_collapse_section(&self, label: &str, collapse: bool) -> KiaraResult<()> {
        async {
            let toggle_name = if collapse { "Collapse" } else { "Expand" };
            let toggle = self
                .page
                .get_by_role("cell", label, true)
                .parent()
                .get_by_role("cell", toggle_name, false)
                .locator(Selector::Role {
                    role: "img".to_string(),
                    name: None,
                    exact: false,
                });

            let present = toggle
                .is_present(Some(self.toggle_timeout))
                .await
                .map_err(|e| KiaraError::navigation(format!("{toggle_name} '{label}'"), e))?;
            if !present {
                debug!("No {toggle_name} control for '{label}', leaving it as is");
                return Ok(());
            }

            toggle
                .click()
                .await
                .map_err(|e| KiaraError::navigation(format!("{toggle_name} '{label}'"), e))?;
            info!("{toggle_name}: '{label}'");
            Ok(())
        }
        .instrument(self.span.clone())
        .await
    }

    /// Save the timesheet without submitting it for approval.
    pub async fn save_timesheet_provisionally(&self) -> KiaraResult<()> {
        async {
            self.page
                .locator(Selector::css(format!("img[alt=\"{}\"]", self.save_button_alt)))
                .click()
                .await
                .map_err(|e| KiaraError::navigation("provisional save control", e))?;
            self.page
                .wait_for_url(&self.timesheet_url, Some(self.navigation_timeout))
                .await
                .map_err(|e| KiaraError::navigation("provisional save", e))?;
            info!("Saved timesheet provisionally");
            Ok(())
        }
        .instrument(self.span.clone())
        .await
    }
}
