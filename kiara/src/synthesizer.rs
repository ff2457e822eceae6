//! Row creation through the form's clone action.
//!
//! The grid has no "add blank row" control. A new row is obtained by ticking
//! the `toBeCopied` box of an existing row and submitting the "add activity"
//! control; the server renders a duplicate named `Copy <description>` and
//! re-sorts the rows, so the duplicate is found again by name before its
//! cells are overwritten.

use std::fmt;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, error, info, Instrument, Span};

use crate::addressing::{row_field_name, RowField};
use crate::errors::{KiaraError, KiaraResult, SurfaceError};
use crate::matcher::RowMatcher;
use crate::selector::Selector;
use crate::surface::UrlPattern;
use crate::work_item::{RowIndex, WorkItem, COPY_PREFIX};
use crate::writer::{CellOutcome, CellWriter, RowOrigin};
use crate::Page;

/// Steps of the clone protocol, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloneStage {
    Mark,
    Trigger,
    AwaitNavigation,
    Resolve,
    Overwrite,
}

impl fmt::Display for CloneStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CloneStage::Mark => "mark row for copying",
            CloneStage::Trigger => "trigger add-row control",
            CloneStage::AwaitNavigation => "await page reload",
            CloneStage::Resolve => "resolve cloned row",
            CloneStage::Overwrite => "overwrite cloned row",
        };
        write!(f, "{name}")
    }
}

/// Where the clone action lives and how long its reload may take.
#[derive(Debug, Clone)]
pub struct CloneControls {
    pub add_row_alt: String,
    pub timesheet_url: UrlPattern,
    pub navigation_timeout: Duration,
}

/// A freshly created row and how each of its cells fared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedRow {
    pub row: RowIndex,
    pub description: CellOutcome,
    pub jira_ref: CellOutcome,
    pub app_ref: CellOutcome,
    pub duration: CellOutcome,
}

#[derive(Clone)]
pub struct RowSynthesizer {
    page: Page,
    matcher: RowMatcher,
    writer: CellWriter,
    controls: CloneControls,
    span: Span,
}

impl RowSynthesizer {
    pub fn new(
        page: Page,
        matcher: RowMatcher,
        writer: CellWriter,
        controls: CloneControls,
        parent: &Span,
    ) -> Self {
        Self {
            page,
            matcher,
            writer,
            controls,
            span: tracing::debug_span!(parent: parent, "synthesizer"),
        }
    }

    /// Create a row for `item` in the task and write all of its cells, the
    /// duration into `column`.
    ///
    /// The caller must have established that no row matches the item;
    /// otherwise a duplicate row is created.
    pub async fn create_row(
        &self,
        task_index: usize,
        item: &WorkItem,
        column: usize,
    ) -> KiaraResult<CreatedRow> {
        async {
            // The highest row moves with every clone, so it is never reused.
            let template = self
                .matcher
                .highest_row(task_index)
                .await?
                .ok_or(KiaraError::NoTemplateRow { task_index })?;

            let template_name = row_field_name(task_index, template, RowField::Description);
            let original = self
                .page
                .input(&template_name)
                .attribute("value")
                .await
                .map_err(|e| KiaraError::not_found(template_name.clone(), e))?
                .unwrap_or_default();
            let copy_name = format!("{COPY_PREFIX} {original}");
            debug!("Cloning row {template} ('{original}') for {item}");

            let checkbox = self
                .page
                .input(&row_field_name(task_index, template, RowField::ToBeCopied));
            self.isolated(CloneStage::Mark, item, checkbox.check()).await;

            let add_row = self
                .page
                .locator(Selector::css(format!(
                    "img[alt=\"{}\"]",
                    self.controls.add_row_alt
                )));
            if self
                .isolated(CloneStage::Trigger, item, add_row.click())
                .await
            {
                self.isolated(
                    CloneStage::AwaitNavigation,
                    item,
                    self.page.wait_for_url(
                        &self.controls.timesheet_url,
                        Some(self.controls.navigation_timeout),
                    ),
                )
                .await;
            }

            let resolved = match self.matcher.find_work_item(task_index, &copy_name, true).await {
                Ok(Some(row)) => Ok(row),
                Ok(None) => Err(KiaraError::CloneNotFound {
                    copy: copy_name.clone(),
                }),
                Err(e) => Err(e),
            };
            let row = resolved.map_err(|e| {
                error!(
                    description = item.description(),
                    date = %item.date(),
                    "Failed to {}: {e}",
                    CloneStage::Resolve
                );
                e
            })?;
            info!("Added new work item row {row} for {item}");

            let created = CreatedRow {
                row,
                description: self.writer.write_description(task_index, row, item).await,
                jira_ref: self
                    .writer
                    .write_jira_ref(task_index, row, item, RowOrigin::Cloned)
                    .await,
                app_ref: self
                    .writer
                    .write_app_ref(task_index, row, item, RowOrigin::Cloned)
                    .await,
                duration: self
                    .writer
                    .write_duration(task_index, row, column, item)
                    .await,
            };
            if created.has_failures() {
                error!(
                    "Could not fully {}: row {row} for {item} is only partially filled",
                    CloneStage::Overwrite
                );
            }
            Ok(created)
        }
        .instrument(self.span.clone())
        .await
    }

    /// Run one step, logging instead of propagating a failure.
    async fn isolated<F>(&self, stage: CloneStage, item: &WorkItem, step: F) -> bool
    where
        F: Future<Output = Result<(), SurfaceError>>,
    {
        match step.await {
            Ok(()) => {
                debug!("{stage}: done for {item}");
                true
            }
            Err(e) => {
                error!(
                    description = item.description(),
                    date = %item.date(),
                    "Failed to {stage}: {e}"
                );
                false
            }
        }
    }
}

impl CreatedRow {
    pub fn has_failures(&self) -> bool {
        [self.description, self.jira_ref, self.app_ref, self.duration]
            .contains(&CellOutcome::Failed)
    }
}
