//! Reading work items from the weekly spreadsheet.
//!
//! A sheet holds one header row with the columns `Day, Project, Description,
//! JiraRef, AppRef, Date, TimeSpent` (any order), followed by one row per
//! work item. Reading stops at the first row without a description.

use calamine::{open_workbook_auto, Data, DataType, Reader};
use chrono::NaiveDate;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, error, info};

use kiara::work_item::parse_iso_date;
use kiara::{KiaraError, WorkItem};

pub const EXPECTED_COLUMNS: [&str; 7] = [
    "Day",
    "Project",
    "Description",
    "JiraRef",
    "AppRef",
    "Date",
    "TimeSpent",
];

#[derive(Debug, Error)]
pub enum InputError {
    #[error("Failed to open '{path}': {message}")]
    Open { path: PathBuf, message: String },

    #[error("Unsupported input file '{0}', expected .xlsx, .xls, .ods or .csv")]
    UnsupportedFormat(PathBuf),

    #[error("Sheet '{sheet}' not found: {message}")]
    Sheet { sheet: String, message: String },

    #[error("The input has no header row")]
    Empty,

    #[error("Columns {found:?} do not match Day, Project, Description, JiraRef, AppRef, Date, TimeSpent")]
    InvalidColumns { found: Vec<String> },

    #[error("Row {row}: {message}")]
    InvalidCell { row: usize, message: String },

    #[error("Row {row}: {source}")]
    InvalidItem {
        row: usize,
        #[source]
        source: KiaraError,
    },

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

/// A spreadsheet cell, independent of the file format.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
    Date(NaiveDate),
}

impl Cell {
    fn text(&self) -> Option<String> {
        match self {
            Cell::Empty => None,
            Cell::Text(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
            Cell::Number(n) if n.fract() == 0.0 => Some(format!("{}", *n as i64)),
            Cell::Number(n) => Some(n.to_string()),
            Cell::Date(d) => Some(d.format("%Y-%m-%d").to_string()),
        }
    }
}

impl From<&Data> for Cell {
    fn from(data: &Data) -> Self {
        match data {
            Data::Empty => Cell::Empty,
            Data::String(s) => Cell::Text(s.clone()),
            Data::Int(i) => Cell::Number(*i as f64),
            Data::Float(f) => Cell::Number(*f),
            Data::Bool(b) => Cell::Text(b.to_string()),
            Data::DateTime(_) | Data::DateTimeIso(_) => {
                data.as_date().map(Cell::Date).unwrap_or(Cell::Empty)
            }
            Data::DurationIso(s) => Cell::Text(s.clone()),
            Data::Error(e) => Cell::Text(format!("#{e:?}")),
        }
    }
}

/// Work items read from a sheet, plus the rows that could not be turned
/// into one.
#[derive(Debug, Default)]
pub struct Ingested {
    pub items: Vec<WorkItem>,
    pub rejected: Vec<InputError>,
}

/// Read the work items of `sheet` from an Excel/ODS workbook, or of a CSV
/// file (where `sheet` is ignored).
pub fn read_work_items(
    path: &Path,
    sheet: &str,
    default_project: &str,
) -> Result<Ingested, InputError> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();

    let rows = match extension.as_str() {
        "xlsx" | "xlsm" | "xls" | "ods" => read_workbook(path, sheet)?,
        "csv" => read_csv(path)?,
        _ => return Err(InputError::UnsupportedFormat(path.to_path_buf())),
    };
    info!("Read input file '{}' - sheet '{sheet}'", path.display());

    parse_rows(rows, default_project)
}

fn read_workbook(path: &Path, sheet: &str) -> Result<Vec<Vec<Cell>>, InputError> {
    let mut workbook = open_workbook_auto(path).map_err(|e| InputError::Open {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    let range = workbook
        .worksheet_range(sheet)
        .map_err(|e| InputError::Sheet {
            sheet: sheet.to_string(),
            message: e.to_string(),
        })?;
    Ok(range
        .rows()
        .map(|row| row.iter().map(Cell::from).collect())
        .collect())
}

fn read_csv(path: &Path) -> Result<Vec<Vec<Cell>>, InputError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(
            record
                .iter()
                .map(|field| {
                    if field.trim().is_empty() {
                        Cell::Empty
                    } else {
                        Cell::Text(field.to_string())
                    }
                })
                .collect(),
        );
    }
    Ok(rows)
}

/// Turn a header row plus data rows into work items.
///
/// Only a bad header is fatal. A row that fails validation is logged and
/// rejected, and reading continues with the next row.
pub fn parse_rows(rows: Vec<Vec<Cell>>, default_project: &str) -> Result<Ingested, InputError> {
    let mut rows = rows.into_iter();
    let header = rows.next().ok_or(InputError::Empty)?;
    let columns = column_positions(&header)?;
    debug!("Input columns validated");

    let mut ingested = Ingested::default();
    // Spreadsheet row numbers: the header is row 1.
    for (offset, row) in rows.enumerate() {
        let row_number = offset + 2;
        let Some(description) = column(&row, &columns, "Description").text() else {
            debug!("Row {row_number} has no description, stopping");
            break;
        };

        match parse_row(&row, &columns, row_number, &description, default_project) {
            Ok(item) => ingested.items.push(item),
            Err(e) => {
                error!(row = row_number, description = %description, "Skipping row: {e}");
                ingested.rejected.push(e);
            }
        }
    }

    info!(
        "Read {} work items, rejected {} rows",
        ingested.items.len(),
        ingested.rejected.len()
    );
    Ok(ingested)
}

fn parse_row(
    row: &[Cell],
    columns: &HashMap<String, usize>,
    row_number: usize,
    description: &str,
    default_project: &str,
) -> Result<WorkItem, InputError> {
    let cell = |name: &str| column(row, columns, name);

    let project = cell("Project").text().unwrap_or_else(|| {
        debug!(
            "Project for '{description}' is empty, setting to default project: '{default_project}'"
        );
        default_project.to_string()
    });
    let date = parse_date(cell("Date"), row_number)?;
    let hours = parse_hours(cell("TimeSpent"), row_number)?;

    WorkItem::new(&project, description, date, hours)
        .and_then(|item| {
            item.with_jira_ref(cell("JiraRef").text().as_deref())
                .with_day(cell("Day").text().as_deref())
                .with_app_ref(cell("AppRef").text().as_deref())
        })
        .map_err(|source| InputError::InvalidItem {
            row: row_number,
            source,
        })
}

static EMPTY: Cell = Cell::Empty;

fn column<'a>(row: &'a [Cell], columns: &HashMap<String, usize>, name: &str) -> &'a Cell {
    columns
        .get(name)
        .and_then(|&i| row.get(i))
        .unwrap_or(&EMPTY)
}

fn column_positions(header: &[Cell]) -> Result<HashMap<String, usize>, InputError> {
    let positions: HashMap<String, usize> = header
        .iter()
        .enumerate()
        .filter_map(|(i, c)| c.text().map(|name| (name, i)))
        .collect();

    let matches = positions.len() == EXPECTED_COLUMNS.len()
        && EXPECTED_COLUMNS.iter().all(|c| positions.contains_key(*c));
    if !matches {
        let mut found: Vec<String> = header.iter().filter_map(Cell::text).collect();
        found.sort();
        return Err(InputError::InvalidColumns { found });
    }
    Ok(positions)
}

fn parse_date(cell: &Cell, row: usize) -> Result<NaiveDate, InputError> {
    match cell {
        Cell::Date(date) => Ok(*date),
        Cell::Text(text) => parse_iso_date(text).map_err(|source| InputError::InvalidItem {
            row,
            source,
        }),
        other => Err(InputError::InvalidCell {
            row,
            message: format!("Date is not a date: {other:?}"),
        }),
    }
}

fn parse_hours(cell: &Cell, row: usize) -> Result<f64, InputError> {
    match cell {
        Cell::Number(n) => Ok(*n),
        Cell::Text(text) => text.trim().parse().map_err(|_| InputError::InvalidCell {
            row,
            message: format!("TimeSpent '{text}' is not a number"),
        }),
        other => Err(InputError::InvalidCell {
            row,
            message: format!("TimeSpent is not a number: {other:?}"),
        }),
    }
}
