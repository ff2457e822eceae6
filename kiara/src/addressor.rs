use tracing::{debug, info, Instrument, Span};

use crate::addressing::{parse_header_date, task_index_from_markup, WEEKDAYS, WEEK_HEADER_CELLS};
use crate::errors::{KiaraError, KiaraResult};
use crate::selector::Selector;
use crate::work_item::DateColumnIndex;
use crate::{Locator, Page};

/// Resolves the structural indices of the grid: the task index of a
/// project row and the column of each day in the displayed week.
#[derive(Clone)]
pub struct Addressor {
    page: Page,
    span: Span,
}

impl Addressor {
    pub fn new(page: Page, parent: &Span) -> Self {
        Self {
            page,
            span: tracing::debug_span!(parent: parent, "addressor"),
        }
    }

    /// The label cell of a task row.
    pub fn task_cell(&self, label: &str) -> Locator {
        self.page.get_by_role("cell", label, true)
    }

    /// Task index of the row labelled `label`, read from the `taak[<n>]`
    /// marker in the cell markup.
    pub async fn task_index(&self, label: &str) -> KiaraResult<usize> {
        async {
            let markup = self
                .task_cell(label)
                .inner_html()
                .await
                .map_err(|e| KiaraError::not_found(format!("task '{label}'"), e))?;
            let task_index = task_index_from_markup(&markup)?;
            debug!("Task '{label}' has index {task_index}");
            Ok(task_index)
        }
        .instrument(self.span.clone())
        .await
    }

    /// Column of every weekday of the displayed week.
    pub async fn date_columns(&self) -> KiaraResult<DateColumnIndex> {
        async {
            let mut columns = DateColumnIndex::new();
            for (column, day) in WEEKDAYS.iter().enumerate() {
                let header = self.page.locator(
                    Selector::css(WEEK_HEADER_CELLS).then(Selector::TextPrefix(day.to_string())),
                );
                let label = header
                    .inner_text()
                    .await
                    .map_err(|e| KiaraError::not_found(format!("week header '{day}'"), e))?;
                let date = parse_header_date(&label)?;
                debug!("Column {column} is {day} {date}");
                columns.insert(date, column);
            }
            info!("Resolved {} date columns for the displayed week", columns.len());
            Ok(columns)
        }
        .instrument(self.span.clone())
        .await
    }
}
