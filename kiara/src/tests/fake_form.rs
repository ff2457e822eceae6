//! In-memory stand-in for the timesheet document.
//!
//! Models just enough of the server-rendered grid for the engine: labelled
//! task rows with positional inputs, collapsible sections, the week header,
//! and the clone action which appends `Copy <description>` rows and
//! re-sorts each task by description, as the server does on reload.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use crate::addressing::{RowField, WEEKDAYS, WEEK_HEADER_CELLS};
use crate::errors::SurfaceError;
use crate::orchestrator::{DEFAULT_ADD_ROW_ALT, DEFAULT_SAVE_BUTTON_ALT, DEFAULT_TIMESHEET_URL};
use crate::selector::Selector;
use crate::surface::{FormSurface, UrlPattern};
use crate::work_item::COPY_PREFIX;

pub const LANDING_URL: &str = "https://kiara.vlaanderen.be/Kiara/secure/home.do";
const START_CELL: &str = "knop ga verder";
const DAYS_IN_WEEK: usize = 7;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FakeRow {
    pub description: String,
    pub jira_ref: String,
    pub app_ref: String,
    pub durations: [String; DAYS_IN_WEEK],
    pub to_be_copied: bool,
}

impl FakeRow {
    pub fn new(description: &str) -> Self {
        Self {
            description: description.to_string(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct FakeTask {
    pub label: String,
    pub index: usize,
    pub rows: Vec<FakeRow>,
}

#[derive(Debug)]
struct FormState {
    url: String,
    tasks: Vec<FakeTask>,
    /// Week header labels such as "Ma\n30/09".
    headers: Vec<String>,
    /// Labels of sections and tasks currently expanded.
    expanded: HashSet<String>,
    failing_inputs: HashSet<String>,
    pending_navigation: bool,
    clones: usize,
    saves: usize,
    /// Every fill, in order, as (input name, value).
    fills: Vec<(String, String)>,
}

/// What a selector step resolved to.
#[derive(Debug, Clone, PartialEq)]
enum Node {
    Root,
    Cell(String),
    Row(String),
    Toggle { label: String, collapse: bool },
    ToggleImage { label: String, collapse: bool },
    StartLink,
    Header(usize),
    Input(String),
    Image(String),
}

pub struct FakeForm {
    state: Mutex<FormState>,
}

impl FakeForm {
    /// A timesheet for the week starting on the given Monday `(month, day)`.
    pub fn new(monday: (u32, u32)) -> Self {
        let start = chrono::NaiveDate::from_ymd_opt(2024, monday.0, monday.1)
            .expect("valid monday in the fake week");
        let headers = WEEKDAYS
            .iter()
            .enumerate()
            .map(|(i, day)| {
                let date = start + chrono::Duration::days(i as i64);
                format!("{day}\n{}", date.format("%d/%m"))
            })
            .collect();

        Self {
            state: Mutex::new(FormState {
                url: DEFAULT_TIMESHEET_URL.to_string(),
                tasks: Vec::new(),
                headers,
                expanded: HashSet::new(),
                failing_inputs: HashSet::new(),
                pending_navigation: false,
                clones: 0,
                saves: 0,
                fills: Vec::new(),
            }),
        }
    }

    pub fn with_task(self, label: &str, index: usize, descriptions: &[&str]) -> Self {
        self.state.lock().unwrap().tasks.push(FakeTask {
            label: label.to_string(),
            index,
            rows: descriptions.iter().map(|d| FakeRow::new(d)).collect(),
        });
        self
    }

    /// Give the row at `position` of a task its reference codes.
    pub fn with_references(
        self,
        label: &str,
        position: usize,
        jira_ref: &str,
        app_ref: &str,
    ) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            let task = state
                .tasks
                .iter_mut()
                .find(|t| t.label == label)
                .expect("task added before its references");
            task.rows[position].jira_ref = jira_ref.to_string();
            task.rows[position].app_ref = app_ref.to_string();
        }
        self
    }

    pub fn with_url(self, url: &str) -> Self {
        self.state.lock().unwrap().url = url.to_string();
        self
    }

    /// Make every fill of the named input fail.
    pub fn failing_input(self, name: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .failing_inputs
            .insert(name.to_string());
        self
    }

    pub fn rows(&self, label: &str) -> Vec<FakeRow> {
        let state = self.state.lock().unwrap();
        state
            .tasks
            .iter()
            .find(|t| t.label == label)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    pub fn clones(&self) -> usize {
        self.state.lock().unwrap().clones
    }

    pub fn saves(&self) -> usize {
        self.state.lock().unwrap().saves
    }

    pub fn fills(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().fills.clone()
    }

    pub fn is_expanded(&self, label: &str) -> bool {
        self.state.lock().unwrap().expanded.contains(label)
    }

    fn resolve(&self, selector: &Selector) -> Vec<Node> {
        let state = self.state.lock().unwrap();
        selector
            .steps()
            .into_iter()
            .fold(vec![Node::Root], |nodes, step| state.step(&nodes, step))
    }

    fn first(&self, selector: &Selector) -> Result<Node, SurfaceError> {
        self.resolve(selector)
            .into_iter()
            .next()
            .ok_or_else(|| SurfaceError::Timeout(format!("waiting for element {selector}")))
    }
}

impl FormState {
    fn input_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        for task in &self.tasks {
            for i in 0..task.rows.len() {
                let prefix = format!("taak[{}].prestatie[{i}]", task.index);
                for field in [
                    RowField::ToBeCopied,
                    RowField::Description,
                    RowField::JiraRef,
                    RowField::AppRef,
                ] {
                    names.push(format!("{prefix}.{}", field.as_str()));
                }
                for column in 0..DAYS_IN_WEEK {
                    names.push(format!("{prefix}.dagPrestatie[{column}].gepresteerdeTijd"));
                }
            }
        }
        names
    }

    fn cell_labels(&self) -> Vec<String> {
        let mut labels = vec![
            START_CELL.to_string(),
            crate::navigation::PROJECT_SECTION.to_string(),
            crate::navigation::GENERAL_SECTION.to_string(),
        ];
        labels.extend(self.tasks.iter().map(|t| t.label.clone()));
        labels
    }

    fn step(&self, nodes: &[Node], step: &Selector) -> Vec<Node> {
        match step {
            Selector::Role { role, name, exact } => nodes
                .iter()
                .flat_map(|node| self.by_role(node, role, name.as_deref(), *exact))
                .collect(),
            Selector::Css(query) => nodes
                .iter()
                .flat_map(|node| self.by_css(node, query))
                .collect(),
            Selector::InputName(name) => {
                if nodes.contains(&Node::Root) && self.input_names().contains(name) {
                    vec![Node::Input(name.clone())]
                } else {
                    vec![]
                }
            }
            Selector::NamePattern { prefix, suffix } => {
                if !nodes.contains(&Node::Root) {
                    return vec![];
                }
                self.input_names()
                    .into_iter()
                    .filter(|n| n.starts_with(prefix.as_str()) && n.ends_with(suffix.as_str()))
                    .map(Node::Input)
                    .collect()
            }
            Selector::Parent => nodes
                .iter()
                .filter_map(|node| match node {
                    Node::Cell(label) => Some(Node::Row(label.clone())),
                    _ => None,
                })
                .collect(),
            Selector::Nth(index) => nodes.get(*index).cloned().into_iter().collect(),
            Selector::TextPrefix(prefix) => nodes
                .iter()
                .filter(|node| match node {
                    Node::Header(i) => self.headers[*i].starts_with(prefix.as_str()),
                    _ => false,
                })
                .cloned()
                .collect(),
            Selector::Chain(parts) => parts
                .iter()
                .fold(nodes.to_vec(), |acc, part| self.step(&acc, part)),
        }
    }

    fn by_role(&self, node: &Node, role: &str, name: Option<&str>, exact: bool) -> Vec<Node> {
        match (node, role) {
            (Node::Root, "cell") => self
                .cell_labels()
                .into_iter()
                .filter(|label| name.map_or(true, |n| names_match(label, n, exact)))
                .map(Node::Cell)
                .collect(),
            (Node::Row(label), "cell") => {
                let collapse = self.expanded.contains(label);
                let toggle_name = if collapse { "Collapse" } else { "Expand" };
                let is_togglable = label != START_CELL;
                if is_togglable && name.map_or(true, |n| names_match(toggle_name, n, exact)) {
                    vec![Node::Toggle {
                        label: label.clone(),
                        collapse,
                    }]
                } else {
                    vec![]
                }
            }
            (Node::Toggle { label, collapse }, "img") => vec![Node::ToggleImage {
                label: label.clone(),
                collapse: *collapse,
            }],
            _ => vec![],
        }
    }

    fn by_css(&self, node: &Node, query: &str) -> Vec<Node> {
        match node {
            Node::Root if query == WEEK_HEADER_CELLS => {
                (0..self.headers.len()).map(Node::Header).collect()
            }
            Node::Root => match image_alt(query) {
                Some(alt) if alt == DEFAULT_ADD_ROW_ALT || alt == DEFAULT_SAVE_BUTTON_ALT => {
                    vec![Node::Image(alt.to_string())]
                }
                _ => vec![],
            },
            Node::Cell(label) if label == START_CELL && query == "a" => vec![Node::StartLink],
            _ => vec![],
        }
    }

    fn value_of(&self, name: &str) -> Option<String> {
        let (task, row, field) = self.locate_input(name)?;
        let row = &self.tasks[task].rows[row];
        Some(match field.as_str() {
            "omschrijving" => row.description.clone(),
            "incident.lineItem" => row.jira_ref.clone(),
            "toepassing.nummer" => row.app_ref.clone(),
            "toBeCopied" => row.to_be_copied.to_string(),
            other => {
                let column = duration_column(other)?;
                row.durations[column].clone()
            }
        })
    }

    fn set_value(&mut self, name: &str, value: &str) -> bool {
        let Some((task, row, field)) = self.locate_input(name) else {
            return false;
        };
        let row = &mut self.tasks[task].rows[row];
        match field.as_str() {
            "omschrijving" => row.description = value.to_string(),
            "incident.lineItem" => row.jira_ref = value.to_string(),
            "toepassing.nummer" => row.app_ref = value.to_string(),
            "toBeCopied" => row.to_be_copied = value == "true",
            other => match duration_column(other) {
                Some(column) => row.durations[column] = value.to_string(),
                None => return false,
            },
        }
        true
    }

    /// (task position, row position, field) of an input name.
    fn locate_input(&self, name: &str) -> Option<(usize, usize, String)> {
        let rest = name.strip_prefix("taak[")?;
        let (task_index, rest) = rest.split_once("].prestatie[")?;
        let (row, field) = rest.split_once("].")?;
        let task_index: usize = task_index.parse().ok()?;
        let row: usize = row.parse().ok()?;
        let task = self.tasks.iter().position(|t| t.index == task_index)?;
        (row < self.tasks[task].rows.len()).then(|| (task, row, field.to_string()))
    }

    /// Submit the form with the add-row control: every marked row is
    /// duplicated and the rows are re-rendered sorted by description.
    fn clone_marked_rows(&mut self) {
        for task in &mut self.tasks {
            let copies: Vec<FakeRow> = task
                .rows
                .iter_mut()
                .filter(|r| r.to_be_copied)
                .map(|r| {
                    r.to_be_copied = false;
                    FakeRow {
                        description: format!("{COPY_PREFIX} {}", r.description),
                        jira_ref: r.jira_ref.clone(),
                        app_ref: r.app_ref.clone(),
                        ..Default::default()
                    }
                })
                .collect();
            self.clones += copies.len();
            task.rows.extend(copies);
            task.rows.sort_by(|a, b| a.description.cmp(&b.description));
        }
        self.pending_navigation = true;
    }
}

fn names_match(label: &str, name: &str, exact: bool) -> bool {
    if exact {
        label == name
    } else {
        label.to_lowercase().contains(&name.to_lowercase())
    }
}

fn image_alt(query: &str) -> Option<&str> {
    query.strip_prefix("img[alt=\"")?.strip_suffix("\"]")
}

fn duration_column(field: &str) -> Option<usize> {
    field
        .strip_prefix("dagPrestatie[")?
        .strip_suffix("].gepresteerdeTijd")?
        .parse()
        .ok()
        .filter(|c| *c < DAYS_IN_WEEK)
}

#[async_trait::async_trait]
impl FormSurface for FakeForm {
    async fn count(&self, selector: &Selector) -> Result<usize, SurfaceError> {
        Ok(self.resolve(selector).len())
    }

    async fn attribute(
        &self,
        selector: &Selector,
        name: &str,
        _timeout: Duration,
    ) -> Result<Option<String>, SurfaceError> {
        let node = self.first(selector)?;
        let state = self.state.lock().unwrap();
        Ok(match (node, name) {
            (Node::Input(input), "name") => Some(input),
            (Node::Input(input), "value") => state.value_of(&input),
            (Node::Image(alt), "alt") => Some(alt),
            _ => None,
        })
    }

    async fn inner_html(
        &self,
        selector: &Selector,
        _timeout: Duration,
    ) -> Result<String, SurfaceError> {
        let state = self.state.lock().unwrap();
        let nodes = selector
            .steps()
            .into_iter()
            .fold(vec![Node::Root], |nodes, step| state.step(&nodes, step));
        match nodes.first() {
            Some(Node::Cell(label)) => {
                let marker = state
                    .tasks
                    .iter()
                    .find(|t| &t.label == label)
                    .map(|t| format!(" onclick=\"toggle('taak[{}]')\"", t.index))
                    .unwrap_or_default();
                Ok(format!("<a href=\"#\"{marker}>{label}</a>"))
            }
            Some(other) => Ok(format!("{other:?}")),
            None => Err(SurfaceError::Timeout(format!(
                "waiting for element {selector}"
            ))),
        }
    }

    async fn inner_text(
        &self,
        selector: &Selector,
        _timeout: Duration,
    ) -> Result<String, SurfaceError> {
        let node = self.first(selector)?;
        let state = self.state.lock().unwrap();
        match node {
            Node::Header(i) => Ok(state.headers[i].clone()),
            Node::Cell(label) => Ok(label),
            other => Ok(format!("{other:?}")),
        }
    }

    async fn fill(
        &self,
        selector: &Selector,
        value: &str,
        _timeout: Duration,
    ) -> Result<(), SurfaceError> {
        let Node::Input(name) = self.first(selector)? else {
            return Err(SurfaceError::Script(format!("{selector} is not fillable")));
        };
        let mut state = self.state.lock().unwrap();
        if state.failing_inputs.contains(&name) {
            return Err(SurfaceError::Timeout(format!("{name} is not editable")));
        }
        state.set_value(&name, value);
        state.fills.push((name, value.to_string()));
        Ok(())
    }

    async fn blur(&self, selector: &Selector, _timeout: Duration) -> Result<(), SurfaceError> {
        self.first(selector).map(|_| ())
    }

    async fn click(&self, selector: &Selector, _timeout: Duration) -> Result<(), SurfaceError> {
        let node = self.first(selector)?;
        let mut state = self.state.lock().unwrap();
        match node {
            Node::ToggleImage { label, collapse } => {
                if collapse {
                    state.expanded.remove(&label);
                } else {
                    state.expanded.insert(label);
                }
            }
            Node::StartLink => {
                state.url = DEFAULT_TIMESHEET_URL.to_string();
                state.pending_navigation = true;
            }
            Node::Image(alt) if alt == DEFAULT_ADD_ROW_ALT => state.clone_marked_rows(),
            Node::Image(_) => {
                state.saves += 1;
                state.pending_navigation = true;
            }
            _ => {}
        }
        Ok(())
    }

    async fn check(&self, selector: &Selector, _timeout: Duration) -> Result<(), SurfaceError> {
        let Node::Input(name) = self.first(selector)? else {
            return Err(SurfaceError::Script(format!("{selector} is not a checkbox")));
        };
        self.state.lock().unwrap().set_value(&name, "true");
        Ok(())
    }

    async fn is_present(
        &self,
        selector: &Selector,
        _timeout: Duration,
    ) -> Result<bool, SurfaceError> {
        Ok(!self.resolve(selector).is_empty())
    }

    async fn wait_for_url(
        &self,
        pattern: &UrlPattern,
        _timeout: Duration,
    ) -> Result<(), SurfaceError> {
        let mut state = self.state.lock().unwrap();
        state.pending_navigation = false;
        if pattern.matches(&state.url) {
            Ok(())
        } else {
            Err(SurfaceError::Timeout(format!(
                "still on {} waiting for {pattern}",
                state.url
            )))
        }
    }

    async fn goto(&self, url: &str, _timeout: Duration) -> Result<(), SurfaceError> {
        self.state.lock().unwrap().url = url.to_string();
        Ok(())
    }

    async fn current_url(&self) -> Result<String, SurfaceError> {
        Ok(self.state.lock().unwrap().url.clone())
    }
}

/// Shorthand for the expected values of a task's rows.
pub fn descriptions(rows: &[FakeRow]) -> Vec<&str> {
    rows.iter().map(|r| r.description.as_str()).collect()
}

/// Map of input name to value of every fill recorded so far.
pub fn filled(form: &FakeForm) -> HashMap<String, String> {
    form.fills().into_iter().collect()
}
