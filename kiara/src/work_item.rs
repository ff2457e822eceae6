//! Work items, their project grouping and the value encodings the form expects.

use chrono::{Datelike, NaiveDate};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use crate::errors::{KiaraError, KiaraResult};

/// Descriptions starting with this word belong to rows produced by the
/// clone action and keep their case.
pub const COPY_PREFIX: &str = "Copy";

/// Position of a line-item row within a task at one point in time.
///
/// Row creation re-sorts the rows server side, so an index is only valid
/// until the next page submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RowIndex(pub usize);

impl fmt::Display for RowIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outcome of a row search. "Not found" is an ordinary result, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchResult {
    pub exists: bool,
    pub index: Option<RowIndex>,
}

impl MatchResult {
    pub fn found(index: RowIndex) -> Self {
        Self {
            exists: true,
            index: Some(index),
        }
    }

    pub fn missing() -> Self {
        Self {
            exists: false,
            index: None,
        }
    }
}

impl From<Option<RowIndex>> for MatchResult {
    fn from(index: Option<RowIndex>) -> Self {
        index.map_or_else(MatchResult::missing, MatchResult::found)
    }
}

/// A calendar day within the displayed week, rendered as `month-day`
/// without leading zeros ("10-3").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MonthDay {
    pub month: u32,
    pub day: u32,
}

impl MonthDay {
    pub fn new(month: u32, day: u32) -> KiaraResult<Self> {
        if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
            return Err(KiaraError::InvalidDate(format!("{month}-{day}")));
        }
        Ok(Self { month, day })
    }
}

impl From<NaiveDate> for MonthDay {
    fn from(date: NaiveDate) -> Self {
        Self {
            month: date.month(),
            day: date.day(),
        }
    }
}

impl FromStr for MonthDay {
    type Err = KiaraError;

    /// Accepts "09-30" as well as "9-30".
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || KiaraError::InvalidDate(s.to_string());
        let (month, day) = s.trim().split_once('-').ok_or_else(invalid)?;
        let month = month.parse::<u32>().map_err(|_| invalid())?;
        let day = day.parse::<u32>().map_err(|_| invalid())?;
        MonthDay::new(month, day)
    }
}

impl fmt::Display for MonthDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.month, self.day)
    }
}

/// Column position (0-6) of each day of the currently displayed week.
///
/// Only valid for the week it was read from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DateColumnIndex {
    columns: HashMap<MonthDay, usize>,
}

impl DateColumnIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, date: MonthDay, column: usize) {
        self.columns.insert(date, column);
    }

    pub fn column_for(&self, date: &MonthDay) -> Option<usize> {
        self.columns.get(date).copied()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl FromIterator<(MonthDay, usize)> for DateColumnIndex {
    fn from_iter<T: IntoIterator<Item = (MonthDay, usize)>>(iter: T) -> Self {
        Self {
            columns: iter.into_iter().collect(),
        }
    }
}

/// One desired timesheet entry. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkItem {
    project: String,
    description: String,
    date: NaiveDate,
    duration_hours: f64,
    jira_ref: Option<String>,
    app_ref: Option<String>,
    day: Option<String>,
}

impl WorkItem {
    pub fn new(
        project: &str,
        description: &str,
        date: NaiveDate,
        duration_hours: f64,
    ) -> KiaraResult<Self> {
        let description = description.trim();
        if description.is_empty() {
            return Err(KiaraError::InvalidWorkItem(format!(
                "empty description on {date}"
            )));
        }
        if project.trim().is_empty() {
            return Err(KiaraError::InvalidWorkItem(format!(
                "no project for '{description}'"
            )));
        }
        if !duration_hours.is_finite() || duration_hours < 0.0 {
            return Err(KiaraError::InvalidDuration {
                description: description.to_string(),
                value: duration_hours,
            });
        }
        Ok(Self {
            project: project.trim().to_string(),
            description: description.to_string(),
            date,
            duration_hours,
            jira_ref: None,
            app_ref: None,
            day: None,
        })
    }

    pub fn with_jira_ref(mut self, jira_ref: Option<&str>) -> Self {
        self.jira_ref = non_blank(jira_ref);
        if self.jira_ref.is_none() {
            debug!("JiraRef for '{}' is empty", self.description);
        }
        self
    }

    pub fn with_app_ref(mut self, app_ref: Option<&str>) -> KiaraResult<Self> {
        self.app_ref = normalize_app_ref(&self.description, app_ref)?;
        Ok(self)
    }

    pub fn with_day(mut self, day: Option<&str>) -> Self {
        self.day = non_blank(day);
        self
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn duration_hours(&self) -> f64 {
        self.duration_hours
    }

    pub fn jira_ref(&self) -> Option<&str> {
        self.jira_ref.as_deref()
    }

    pub fn app_ref(&self) -> Option<&str> {
        self.app_ref.as_deref()
    }

    pub fn day(&self) -> Option<&str> {
        self.day.as_deref()
    }

    pub fn month_day(&self) -> MonthDay {
        MonthDay::from(self.date)
    }

    /// `month-day` without leading zeros: 2024-10-03 becomes "10-3".
    pub fn formatted_date(&self) -> String {
        self.month_day().to_string()
    }

    pub fn formatted_time_spent(&self) -> String {
        format_time_spent(self.duration_hours)
    }

    /// The description as it is written into the form.
    pub fn insertion_description(&self) -> String {
        insertion_description(&self.description)
    }
}

impl fmt::Display for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}' on '{}'", self.description, self.date)
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Lower-case unless the text is a clone row name. An uppercase first
/// character breaks the form's row ordering.
pub fn insertion_description(description: &str) -> String {
    if description.starts_with(COPY_PREFIX) {
        description.to_string()
    } else {
        description.to_lowercase()
    }
}

/// Encode hours as `hours.minutes`: 1.75 is "1.45", 2.0 is "2.0" and
/// 1.1 is "1.6". Minutes are written as a plain number, never padded.
pub fn format_time_spent(hours: f64) -> String {
    let mut whole = hours.trunc() as u64;
    let mut minutes = (hours.fract() * 60.0).round() as u64;
    if minutes == 60 {
        whole += 1;
        minutes = 0;
    }
    format!("{whole}.{minutes}")
}

pub fn parse_iso_date(value: &str) -> KiaraResult<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| KiaraError::InvalidDate(value.to_string()))
}

/// AppRefs must be integer literals; integral decimals such as "12.0" are
/// accepted and normalised to "12".
pub fn normalize_app_ref(description: &str, raw: Option<&str>) -> KiaraResult<Option<String>> {
    let Some(raw) = raw.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };
    if let Ok(n) = raw.parse::<i64>() {
        return Ok(Some(n.to_string()));
    }
    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() && v.fract() == 0.0 => Ok(Some(format!("{}", v as i64))),
        _ => Err(KiaraError::AppRefInvalidValue {
            description: description.to_string(),
            value: raw.to_string(),
        }),
    }
}

/// The work items of one task row.
#[derive(Debug, Clone, PartialEq)]
pub struct Project {
    name: String,
    items: Vec<WorkItem>,
    is_general_task: bool,
}

impl Project {
    pub fn new(name: &str, is_general_task: bool) -> Self {
        Self {
            name: name.to_string(),
            items: Vec::new(),
            is_general_task,
        }
    }

    pub fn add_work_item(&mut self, item: WorkItem) -> KiaraResult<()> {
        if item.project() != self.name {
            return Err(KiaraError::ProjectMismatch {
                item_project: item.project().to_string(),
                project: self.name.clone(),
            });
        }
        self.items.push(item);
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn items(&self) -> &[WorkItem] {
        &self.items
    }

    /// Whether the task lives under the general tasks section.
    pub fn is_general_task(&self) -> bool {
        self.is_general_task
    }
}

/// Group items by project, keeping first-seen order of projects and input
/// order of items.
pub fn group_work_items(
    items: impl IntoIterator<Item = WorkItem>,
    general_tasks: &[String],
) -> KiaraResult<Vec<Project>> {
    let mut projects: Vec<Project> = Vec::new();
    for item in items {
        let position = match projects.iter().position(|p| p.name() == item.project()) {
            Some(position) => position,
            None => {
                let general = general_tasks.iter().any(|g| g == item.project());
                projects.push(Project::new(item.project(), general));
                projects.len() - 1
            }
        };
        projects[position].add_work_item(item)?;
    }
    Ok(projects)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        parse_iso_date(s).unwrap()
    }

    #[test]
    fn time_spent_uses_minutes_not_fractions() {
        assert_eq!(format_time_spent(1.75), "1.45");
        assert_eq!(format_time_spent(2.0), "2.0");
        assert_eq!(format_time_spent(0.25), "0.15");
        assert_eq!(format_time_spent(0.5), "0.30");
        assert_eq!(format_time_spent(1.1), "1.6");
        assert_eq!(format_time_spent(0.15), "0.9");
        assert_eq!(format_time_spent(2.999), "3.0");
    }

    #[test]
    fn date_strips_leading_zeros() {
        let item = WorkItem::new("P1", "acmds", date("2024-10-03"), 1.0).unwrap();
        assert_eq!(item.formatted_date(), "10-3");
        let item = WorkItem::new("P1", "acmds", date("2024-09-30"), 1.0).unwrap();
        assert_eq!(item.formatted_date(), "9-30");
    }

    #[test]
    fn month_day_parses_padded_and_bare() {
        assert_eq!("09-30".parse::<MonthDay>().unwrap(), MonthDay::new(9, 30).unwrap());
        assert_eq!("9-30".parse::<MonthDay>().unwrap(), MonthDay::new(9, 30).unwrap());
        assert!("13-01".parse::<MonthDay>().is_err());
        assert!("0930".parse::<MonthDay>().is_err());
    }

    #[test]
    fn column_lookup_is_numeric() {
        let columns: DateColumnIndex = [("09-30", 0), ("10-01", 1)]
            .into_iter()
            .map(|(d, c)| (d.parse::<MonthDay>().unwrap(), c))
            .collect();
        let item = WorkItem::new("P1", "x", date("2024-10-01"), 1.0).unwrap();
        assert_eq!(columns.column_for(&item.month_day()), Some(1));
        let item = WorkItem::new("P1", "x", date("2024-10-07"), 1.0).unwrap();
        assert_eq!(columns.column_for(&item.month_day()), None);
    }

    #[test]
    fn app_ref_must_be_integer() {
        assert_eq!(normalize_app_ref("d", Some("42")).unwrap(), Some("42".into()));
        assert_eq!(normalize_app_ref("d", Some("12.0")).unwrap(), Some("12".into()));
        assert_eq!(normalize_app_ref("d", Some("  ")).unwrap(), None);
        assert_eq!(normalize_app_ref("d", None).unwrap(), None);
        match normalize_app_ref("deploy", Some("APP-7")) {
            Err(KiaraError::AppRefInvalidValue { description, value }) => {
                assert_eq!(description, "deploy");
                assert_eq!(value, "APP-7");
            }
            other => panic!("Expected AppRefInvalidValue, got {other:?}"),
        }
        assert!(normalize_app_ref("d", Some("12.5")).is_err());
    }

    #[test]
    fn work_item_validation() {
        assert!(WorkItem::new("P1", "  ", date("2024-10-03"), 1.0).is_err());
        assert!(WorkItem::new("", "x", date("2024-10-03"), 1.0).is_err());
        assert!(WorkItem::new("P1", "x", date("2024-10-03"), -1.0).is_err());
        assert!(WorkItem::new("P1", "x", date("2024-10-03"), f64::NAN).is_err());
        let item = WorkItem::new("P1", "x", date("2024-10-03"), 1.0)
            .unwrap()
            .with_jira_ref(Some(" "));
        assert_eq!(item.jira_ref(), None);
    }

    #[test]
    fn insertion_description_keeps_copy_rows() {
        assert_eq!(insertion_description("Deploy API"), "deploy api");
        assert_eq!(insertion_description("Copy deploy api"), "Copy deploy api");
    }

    #[test]
    fn grouping_keeps_order_and_classifies() {
        let general = vec!["Opleiding".to_string()];
        let items = vec![
            WorkItem::new("P1", "a", date("2024-09-30"), 1.0).unwrap(),
            WorkItem::new("Opleiding", "b", date("2024-09-30"), 1.0).unwrap(),
            WorkItem::new("P1", "c", date("2024-10-01"), 1.0).unwrap(),
        ];
        let projects = group_work_items(items, &general).unwrap();
        assert_eq!(projects.len(), 2);
        assert_eq!(projects[0].name(), "P1");
        assert!(!projects[0].is_general_task());
        let descriptions: Vec<_> = projects[0].items().iter().map(|i| i.description()).collect();
        assert_eq!(descriptions, ["a", "c"]);
        assert!(projects[1].is_general_task());
    }

    #[test]
    fn project_rejects_foreign_items() {
        let mut project = Project::new("P1", false);
        let item = WorkItem::new("P2", "a", date("2024-09-30"), 1.0).unwrap();
        assert!(matches!(
            project.add_work_item(item),
            Err(KiaraError::ProjectMismatch { .. })
        ));
    }
}
