use tracing::{debug, error, Instrument, Span};

use crate::addressing::{duration_cell_name, row_field_name, RowField};
use crate::errors::{KiaraError, SurfaceError};
use crate::work_item::{RowIndex, WorkItem};
use crate::Page;

/// What happened to a single cell write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellOutcome {
    Written,
    /// Nothing to write; the cell was left untouched.
    Skipped,
    /// The write failed and was logged.
    Failed,
}

/// Where a row's reference cells come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowOrigin {
    /// A row that was already on the page; its references are the user's.
    Existing,
    /// A fresh clone, still carrying its template row's references.
    Cloned,
}

/// Fills individual grid cells. A failing cell is logged with the item's
/// context and reported as [`CellOutcome::Failed`], never as an error.
#[derive(Clone)]
pub struct CellWriter {
    page: Page,
    span: Span,
}

impl CellWriter {
    pub fn new(page: Page, parent: &Span) -> Self {
        Self {
            page,
            span: tracing::debug_span!(parent: parent, "writer"),
        }
    }

    /// Fill the input named `name`. With `commit` the input is blurred
    /// afterwards so the form recalculates its totals.
    pub async fn write_cell(
        &self,
        name: &str,
        value: &str,
        commit: bool,
        item: &WorkItem,
    ) -> CellOutcome {
        async {
            let input = self.page.input(name);
            let result: Result<(), SurfaceError> = async {
                input.fill(value).await?;
                if commit {
                    input.blur().await?;
                }
                Ok(())
            }
            .await;

            match result {
                Ok(()) => {
                    debug!("Wrote '{value}' into {name} for {item}");
                    CellOutcome::Written
                }
                Err(source) => {
                    let err = KiaraError::BrowserFillCell {
                        target: name.to_string(),
                        source,
                    };
                    error!(
                        description = item.description(),
                        date = %item.date(),
                        "{err}: {}",
                        source_message(&err)
                    );
                    CellOutcome::Failed
                }
            }
        }
        .instrument(self.span.clone())
        .await
    }

    /// Like [`Self::write_cell`], but an absent value skips the write so an
    /// existing value is never blanked.
    pub async fn write_optional(
        &self,
        name: &str,
        value: Option<&str>,
        item: &WorkItem,
    ) -> CellOutcome {
        match value {
            Some(value) => self.write_cell(name, value, false, item).await,
            None => {
                debug!(parent: &self.span, "Nothing to write into {name} for {item}");
                CellOutcome::Skipped
            }
        }
    }

    pub async fn write_duration(
        &self,
        task_index: usize,
        row: RowIndex,
        column: usize,
        item: &WorkItem,
    ) -> CellOutcome {
        let name = duration_cell_name(task_index, row, column);
        self.write_cell(&name, &item.formatted_time_spent(), true, item)
            .await
    }

    pub async fn write_description(
        &self,
        task_index: usize,
        row: RowIndex,
        item: &WorkItem,
    ) -> CellOutcome {
        let name = row_field_name(task_index, row, RowField::Description);
        self.write_cell(&name, &item.insertion_description(), false, item)
            .await
    }

    pub async fn write_jira_ref(
        &self,
        task_index: usize,
        row: RowIndex,
        item: &WorkItem,
        origin: RowOrigin,
    ) -> CellOutcome {
        let name = row_field_name(task_index, row, RowField::JiraRef);
        self.write_reference(&name, item.jira_ref(), item, origin)
            .await
    }

    pub async fn write_app_ref(
        &self,
        task_index: usize,
        row: RowIndex,
        item: &WorkItem,
        origin: RowOrigin,
    ) -> CellOutcome {
        let name = row_field_name(task_index, row, RowField::AppRef);
        self.write_reference(&name, item.app_ref(), item, origin)
            .await
    }

    /// An absent reference leaves an existing row alone but clears the
    /// value a clone inherited from its template.
    async fn write_reference(
        &self,
        name: &str,
        value: Option<&str>,
        item: &WorkItem,
        origin: RowOrigin,
    ) -> CellOutcome {
        match (value, origin) {
            (None, RowOrigin::Cloned) => self.write_cell(name, "", false, item).await,
            (value, _) => self.write_optional(name, value, item).await,
        }
    }
}

fn source_message(err: &KiaraError) -> String {
    std::error::Error::source(err)
        .map(|s| s.to_string())
        .unwrap_or_default()
}
