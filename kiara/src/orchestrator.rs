//! Drives reconciliation per project and per work item.
//!
//! Each project goes `Closed -> Expanded -> (per item: matched | created) ->
//! Collapsed`. Failures are contained at the item boundary: a bad item is
//! logged and the run moves on to the next item and project.

use std::time::Duration;
use tracing::{debug, error, info, warn, Instrument, Span};

use crate::addressor::Addressor;
use crate::errors::KiaraResult;
use crate::matcher::RowMatcher;
use crate::navigation::{Navigator, GENERAL_SECTION, PROJECT_SECTION};
use crate::surface::UrlPattern;
use crate::synthesizer::{CloneControls, RowSynthesizer};
use crate::work_item::{DateColumnIndex, MatchResult, Project, RowIndex, WorkItem};
use crate::writer::{CellOutcome, CellWriter};
use crate::Page;

pub const DEFAULT_BASE_URL: &str = "https://kiara.vlaanderen.be";
pub const DEFAULT_TIMESHEET_URL: &str =
    "https://kiara.vlaanderen.be/Kiara/secure/tijdsregistratie/detailtijdsregistratie.do";
pub const DEFAULT_ADD_ROW_ALT: &str = "knop voeg nieuwe activiteit toe";
pub const DEFAULT_SAVE_BUTTON_ALT: &str = "knop voorlopig bewaren";

/// Knobs of a reconciliation run.
#[derive(Debug, Clone)]
pub struct Settings {
    pub base_url: String,
    pub timesheet_url: String,
    pub add_row_alt: String,
    pub save_button_alt: String,
    /// Project expanded at the end of the run, for the user to review.
    pub preferred_project: Option<String>,
    /// Save the timesheet provisionally once all projects are processed.
    pub auto_submit: bool,
    /// Bound on a single element operation.
    pub timeout: Duration,
    /// Bound on a page reload after a submitting click.
    pub navigation_timeout: Duration,
    /// How long to look for an expand/collapse control.
    pub toggle_timeout: Duration,
    /// How long the user may take to confirm a login on their phone.
    pub auth_timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timesheet_url: DEFAULT_TIMESHEET_URL.to_string(),
            add_row_alt: DEFAULT_ADD_ROW_ALT.to_string(),
            save_button_alt: DEFAULT_SAVE_BUTTON_ALT.to_string(),
            preferred_project: None,
            auto_submit: false,
            timeout: Duration::from_secs(30),
            navigation_timeout: Duration::from_secs(30),
            toggle_timeout: Duration::from_secs(3),
            auth_timeout: Duration::from_secs(180),
        }
    }
}

/// How one work item ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    /// An existing row got the item's duration.
    Updated(RowIndex),
    /// A new row was cloned and filled.
    Created(RowIndex),
    /// A new row was cloned but some of its cells could not be written.
    Partial(RowIndex),
    /// The item's date is not in the displayed week.
    Skipped,
    Failed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectReport {
    pub project: String,
    /// False when the project's task row could not be found.
    pub located: bool,
    pub updated: usize,
    pub created: usize,
    pub partial: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl ProjectReport {
    fn new(project: &str) -> Self {
        Self {
            project: project.to_string(),
            located: true,
            ..Default::default()
        }
    }

    fn record(&mut self, outcome: ItemOutcome) {
        match outcome {
            ItemOutcome::Updated(_) => self.updated += 1,
            ItemOutcome::Created(_) => self.created += 1,
            ItemOutcome::Partial(_) => self.partial += 1,
            ItemOutcome::Skipped => self.skipped += 1,
            ItemOutcome::Failed => self.failed += 1,
        }
    }

    pub fn has_problems(&self) -> bool {
        !self.located || self.partial + self.skipped + self.failed > 0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub projects: Vec<ProjectReport>,
    /// Outcome of the provisional save, `None` when it was not requested.
    pub saved: Option<bool>,
}

impl RunReport {
    pub fn has_problems(&self) -> bool {
        self.projects.iter().any(ProjectReport::has_problems) || self.saved == Some(false)
    }
}

/// Owns the page for the duration of a run and reconciles projects into it.
pub struct Reconciler {
    settings: Settings,
    addressor: Addressor,
    matcher: RowMatcher,
    writer: CellWriter,
    synthesizer: RowSynthesizer,
    navigator: Navigator,
    span: Span,
}

impl Reconciler {
    pub fn new(page: Page, settings: Settings) -> Self {
        let span = tracing::info_span!("reconcile");
        let page = page.with_timeout(settings.timeout);
        let timesheet_url = UrlPattern::exact(settings.timesheet_url.clone());

        let matcher = RowMatcher::new(page.clone(), &span);
        let writer = CellWriter::new(page.clone(), &span);
        let synthesizer = RowSynthesizer::new(
            page.clone(),
            matcher.clone(),
            writer.clone(),
            CloneControls {
                add_row_alt: settings.add_row_alt.clone(),
                timesheet_url: timesheet_url.clone(),
                navigation_timeout: settings.navigation_timeout,
            },
            &span,
        );
        let navigator = Navigator::new(
            page.clone(),
            timesheet_url,
            &settings.save_button_alt,
            settings.toggle_timeout,
            settings.navigation_timeout,
            &span,
        );

        Self {
            addressor: Addressor::new(page, &span),
            matcher,
            writer,
            synthesizer,
            navigator,
            settings,
            span,
        }
    }

    /// Reconcile every project: ordinary projects first, then the general
    /// tasks section.
    pub async fn run(&self, projects: &[Project]) -> RunReport {
        async {
            let mut report = RunReport::default();

            if let Err(e) = self.navigator.open_timesheet_page().await {
                warn!("{e}. Attempting to continue.");
            }

            for project in projects.iter().filter(|p| !p.is_general_task()) {
                report.projects.push(self.process_project(project).await);
            }

            self.toggle(PROJECT_SECTION, true).await;
            self.toggle(GENERAL_SECTION, false).await;

            for project in projects.iter().filter(|p| p.is_general_task()) {
                report.projects.push(self.process_project(project).await);
            }

            self.toggle(GENERAL_SECTION, true).await;
            self.toggle(PROJECT_SECTION, false).await;

            if let Some(preferred) = &self.settings.preferred_project {
                self.toggle(preferred, false).await;
            }

            if self.settings.auto_submit {
                let saved = match self.navigator.save_timesheet_provisionally().await {
                    Ok(()) => true,
                    Err(e) => {
                        error!("{e}");
                        false
                    }
                };
                report.saved = Some(saved);
            }

            report
        }
        .instrument(self.span.clone())
        .await
    }

    /// Reconcile the items of one project.
    pub async fn process_project(&self, project: &Project) -> ProjectReport {
        let span = tracing::info_span!(parent: &self.span, "project", name = project.name());
        async {
            info!("Processing project '{}'", project.name());
            let mut report = ProjectReport::new(project.name());

            let task_index = match self.addressor.task_index(project.name()).await {
                Ok(task_index) => task_index,
                Err(e) => {
                    error!("Cannot locate project '{}': {e}", project.name());
                    report.located = false;
                    report.failed = project.items().len();
                    return report;
                }
            };

            self.toggle(project.name(), false).await;

            match self.addressor.date_columns().await {
                Ok(columns) => {
                    for item in project.items() {
                        let outcome = self.process_work_item(task_index, &columns, item).await;
                        report.record(outcome);
                    }
                }
                Err(e) => {
                    error!("Cannot read the displayed week: {e}");
                    report.failed = project.items().len();
                }
            }

            self.toggle(project.name(), true).await;
            report
        }
        .instrument(span)
        .await
    }

    /// Update the item's row, or create it. Never fails: problems are
    /// logged and reported through the outcome.
    pub async fn process_work_item(
        &self,
        task_index: usize,
        columns: &DateColumnIndex,
        item: &WorkItem,
    ) -> ItemOutcome {
        info!("Processing work item {item}");

        let Some(column) = columns.column_for(&item.month_day()) else {
            warn!(
                "Date {} not found in selected week, skipping {item}",
                item.formatted_date()
            );
            return ItemOutcome::Skipped;
        };

        match self.upsert(task_index, column, item).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(
                    description = item.description(),
                    date = %item.date(),
                    "Failed to process work item: {e}"
                );
                ItemOutcome::Failed
            }
        }
    }

    async fn upsert(
        &self,
        task_index: usize,
        column: usize,
        item: &WorkItem,
    ) -> KiaraResult<ItemOutcome> {
        let existing = self.matcher.test_work_item_exists(task_index, item).await?;

        if let MatchResult {
            exists: true,
            index: Some(row),
        } = existing
        {
            debug!("Work item {item} already exists at row {row}");
            let outcome = self
                .writer
                .write_duration(task_index, row, column, item)
                .await;
            if outcome == CellOutcome::Failed {
                return Ok(ItemOutcome::Failed);
            }
            info!(
                "Added time to existing work item {item} - {}h",
                item.formatted_time_spent()
            );
            return Ok(ItemOutcome::Updated(row));
        }

        debug!("Work item {item} does not exist yet. Creating.");
        let created = self
            .synthesizer
            .create_row(task_index, item, column)
            .await?;
        if created.has_failures() {
            Ok(ItemOutcome::Partial(created.row))
        } else {
            Ok(ItemOutcome::Created(created.row))
        }
    }

    async fn toggle(&self, label: &str, collapse: bool) {
        if let Err(e) = self.navigator.expand_collapse_section(label, collapse).await {
            error!("{e}");
        }
    }
}
