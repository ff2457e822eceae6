use std::time::Duration;
use tracing::{debug, info, Instrument, Span};

use crate::addressing::{description_inputs, row_field_name, row_index_from_name, RowField};
use crate::errors::{KiaraError, KiaraResult, SurfaceError};
use crate::work_item::{MatchResult, RowIndex, WorkItem, COPY_PREFIX};
use crate::Page;

/// Rows are expected to be contiguous; a missing index is skipped after this.
const ROW_SCAN_TIMEOUT: Duration = Duration::from_secs(2);

/// Finds the line-item row of a task whose description matches a target.
#[derive(Clone)]
pub struct RowMatcher {
    page: Page,
    span: Span,
}

impl RowMatcher {
    pub fn new(page: Page, parent: &Span) -> Self {
        Self {
            page,
            span: tracing::debug_span!(parent: parent, "matcher"),
        }
    }

    /// Highest row index currently rendered for the task, `None` when the
    /// task has no rows. Always read fresh from the document.
    pub async fn highest_row(&self, task_index: usize) -> KiaraResult<Option<RowIndex>> {
        async {
            let rows = self
                .page
                .locator(description_inputs(task_index))
                .all()
                .await
                .map_err(|e| KiaraError::not_found(format!("rows of task {task_index}"), e))?;
            let Some(last) = rows.last() else {
                return Ok(None);
            };
            let name = last
                .attribute("name")
                .await
                .map_err(|e| KiaraError::not_found(last.selector_string(), e))?
                .ok_or_else(|| {
                    KiaraError::MalformedPage(format!("unnamed row input in task {task_index}"))
                })?;
            let highest = row_index_from_name(&name)?;
            debug!("Last item index in task {task_index} is {highest}");
            Ok(Some(highest))
        }
        .instrument(self.span.clone())
        .await
    }

    /// First row (ascending index) whose description matches `target`.
    ///
    /// Matching ignores case, except for clone rows (`Copy ...`) which must
    /// match exactly. `is_copy_search` only raises the log level.
    pub async fn find_work_item(
        &self,
        task_index: usize,
        target: &str,
        is_copy_search: bool,
    ) -> KiaraResult<Option<RowIndex>> {
        async {
            let Some(highest) = self.highest_row(task_index).await? else {
                info!("Task {task_index} has no rows, '{target}' does not exist");
                return Ok(None);
            };

            let exact_case = target.starts_with(COPY_PREFIX);
            for i in 0..=highest.0 {
                let row = RowIndex(i);
                let name = row_field_name(task_index, row, RowField::Description);
                let value = match self
                    .page
                    .input(&name)
                    .set_default_timeout(ROW_SCAN_TIMEOUT)
                    .attribute("value")
                    .await
                {
                    Ok(value) => value.unwrap_or_default(),
                    Err(SurfaceError::Timeout(_)) | Err(SurfaceError::ElementNotFound(_)) => {
                        debug!("Row {row} of task {task_index} is not rendered, skipping");
                        continue;
                    }
                    Err(e) => return Err(KiaraError::not_found(name, e)),
                };

                if descriptions_match(&value, target, exact_case) {
                    if is_copy_search {
                        info!("Found cloned work item '{target}' at index {row}");
                    } else {
                        debug!("Found existing work item '{target}' at index {row}");
                    }
                    return Ok(Some(row));
                }
            }

            info!("No existing work item found for description '{target}'");
            Ok(None)
        }
        .instrument(self.span.clone())
        .await
    }

    /// Whether `item` already has a row in the task.
    pub async fn test_work_item_exists(
        &self,
        task_index: usize,
        item: &WorkItem,
    ) -> KiaraResult<MatchResult> {
        let index = self
            .find_work_item(task_index, &item.insertion_description(), false)
            .await?;
        Ok(MatchResult::from(index))
    }
}

fn descriptions_match(value: &str, target: &str, exact_case: bool) -> bool {
    if exact_case {
        value == target
    } else {
        value.to_lowercase() == target.to_lowercase()
    }
}
