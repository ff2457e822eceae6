//! Positional input names of the timesheet grid.
//!
//! Every input is addressed as `taak[<task>].prestatie[<row>].<field>`, and
//! the per-day duration as
//! `taak[<task>].prestatie[<row>].dagPrestatie[<column>].gepresteerdeTijd`.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::errors::{KiaraError, KiaraResult};
use crate::selector::Selector;
use crate::work_item::{MonthDay, RowIndex};

static TASK_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"taak\[(\d+)\]").unwrap());
static ROW_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"prestatie\[(\d+)\]").unwrap());
static HEADER_DATE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d{1,2})/(\d{1,2})").unwrap());

/// Weekday abbreviations of the grid header, Monday first.
pub const WEEKDAYS: [&str; 7] = ["Ma", "Di", "Wo", "Do", "Vr", "Za", "Zo"];

/// Header cells of the week grid.
pub const WEEK_HEADER_CELLS: &str = "table:nth-of-type(4) tr:nth-of-type(3) th";

/// The per-row inputs besides the day durations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowField {
    Description,
    JiraRef,
    AppRef,
    ToBeCopied,
}

impl RowField {
    pub fn as_str(&self) -> &'static str {
        match self {
            RowField::Description => "omschrijving",
            RowField::JiraRef => "incident.lineItem",
            RowField::AppRef => "toepassing.nummer",
            RowField::ToBeCopied => "toBeCopied",
        }
    }
}

pub fn row_prefix(task_index: usize) -> String {
    format!("taak[{task_index}].prestatie[")
}

pub fn row_field_name(task_index: usize, row: RowIndex, field: RowField) -> String {
    format!("taak[{task_index}].prestatie[{row}].{}", field.as_str())
}

pub fn duration_cell_name(task_index: usize, row: RowIndex, column: usize) -> String {
    format!("taak[{task_index}].prestatie[{row}].dagPrestatie[{column}].gepresteerdeTijd")
}

/// All description inputs of a task, in document order.
pub fn description_inputs(task_index: usize) -> Selector {
    Selector::name_pattern(
        row_prefix(task_index),
        format!("].{}", RowField::Description.as_str()),
    )
}

/// Task index from the markup of a task's label cell.
pub fn task_index_from_markup(markup: &str) -> KiaraResult<usize> {
    TASK_MARKER
        .captures(markup)
        .and_then(|c| c[1].parse().ok())
        .ok_or_else(|| KiaraError::MalformedPage("no taak[<n>] marker in task cell".to_string()))
}

/// Row index from an input name such as `taak[1].prestatie[7].omschrijving`.
pub fn row_index_from_name(name: &str) -> KiaraResult<RowIndex> {
    ROW_MARKER
        .captures(name)
        .and_then(|c| c[1].parse().ok())
        .map(RowIndex)
        .ok_or_else(|| KiaraError::MalformedPage(format!("no prestatie[<n>] marker in '{name}'")))
}

/// Date of a header label such as "Ma\n30/09" (day/month).
pub fn parse_header_date(label: &str) -> KiaraResult<MonthDay> {
    let captures = HEADER_DATE
        .captures(label)
        .ok_or_else(|| KiaraError::MalformedPage(format!("no date in header '{label}'")))?;
    let day: u32 = captures[1]
        .parse()
        .map_err(|_| KiaraError::MalformedPage(format!("bad day in header '{label}'")))?;
    let month: u32 = captures[2]
        .parse()
        .map_err(|_| KiaraError::MalformedPage(format!("bad month in header '{label}'")))?;
    MonthDay::new(month, day)
        .map_err(|_| KiaraError::MalformedPage(format!("impossible date in header '{label}'")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_names_are_bit_exact() {
        let row = RowIndex(2);
        assert_eq!(
            row_field_name(3, row, RowField::Description),
            "taak[3].prestatie[2].omschrijving"
        );
        assert_eq!(
            row_field_name(3, row, RowField::JiraRef),
            "taak[3].prestatie[2].incident.lineItem"
        );
        assert_eq!(
            row_field_name(3, row, RowField::AppRef),
            "taak[3].prestatie[2].toepassing.nummer"
        );
        assert_eq!(
            row_field_name(3, row, RowField::ToBeCopied),
            "taak[3].prestatie[2].toBeCopied"
        );
        assert_eq!(
            duration_cell_name(3, row, 4),
            "taak[3].prestatie[2].dagPrestatie[4].gepresteerdeTijd"
        );
    }

    #[test]
    fn task_marker_is_required() {
        let markup = r##"<a href="#">P1</a><input type="hidden" name="taak[12].expanded">"##;
        assert_eq!(task_index_from_markup(markup).unwrap(), 12);
        assert!(matches!(
            task_index_from_markup("<span>P1</span>"),
            Err(KiaraError::MalformedPage(_))
        ));
    }

    #[test]
    fn row_marker_parses_last_row() {
        assert_eq!(
            row_index_from_name("taak[1].prestatie[7].omschrijving").unwrap(),
            RowIndex(7)
        );
        assert!(row_index_from_name("taak[1].omschrijving").is_err());
    }

    #[test]
    fn header_labels_are_day_month() {
        assert_eq!(parse_header_date("Ma\n30/09").unwrap(), MonthDay::new(9, 30).unwrap());
        assert_eq!(parse_header_date("Do\n03/10").unwrap(), MonthDay::new(10, 3).unwrap());
        assert!(parse_header_date("Ma").is_err());
    }
}
