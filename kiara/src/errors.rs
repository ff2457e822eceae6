use thiserror::Error;

/// Low-level failures raised by a [`crate::surface::FormSurface`] implementation.
///
/// These describe transport detail and are wrapped into [`KiaraError`] before
/// they reach engine callers.
#[derive(Error, Debug)]
pub enum SurfaceError {
    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Navigation failed: {0}")]
    Navigation(String),

    #[error("Script evaluation failed: {0}")]
    Script(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Connection error: {0}")]
    Connection(String),
}

/// Domain errors of the reconciliation engine.
#[derive(Error, Debug)]
pub enum KiaraError {
    #[error("Target element not found: {target}")]
    TargetElementNotFound {
        target: String,
        #[source]
        source: Option<SurfaceError>,
    },

    #[error("Browser navigation failed: {target}")]
    BrowserNavigation {
        target: String,
        #[source]
        source: Option<SurfaceError>,
    },

    #[error("Failed to fill cell {target}")]
    BrowserFillCell {
        target: String,
        #[source]
        source: SurfaceError,
    },

    #[error("Malformed page: {0}")]
    MalformedPage(String),

    #[error("Copied row '{copy}' not found after cloning")]
    CloneNotFound { copy: String },

    #[error("Task {task_index} has no rows to clone")]
    NoTemplateRow { task_index: usize },

    #[error("Cannot connect to the debug browser: {0}")]
    DebugBrowserConnection(#[source] SurfaceError),

    #[error("AppRef for '{description}' is not an integer: '{value}'")]
    AppRefInvalidValue { description: String, value: String },

    #[error("Invalid date '{0}'")]
    InvalidDate(String),

    #[error("Invalid duration for '{description}': {value}")]
    InvalidDuration { description: String, value: f64 },

    #[error("Invalid work item: {0}")]
    InvalidWorkItem(String),

    #[error("Item project '{item_project}' does not match group project '{project}'")]
    ProjectMismatch {
        item_project: String,
        project: String,
    },
}

impl KiaraError {
    pub(crate) fn not_found(target: impl Into<String>, source: SurfaceError) -> Self {
        KiaraError::TargetElementNotFound {
            target: target.into(),
            source: Some(source),
        }
    }

    pub(crate) fn navigation(target: impl Into<String>, source: SurfaceError) -> Self {
        KiaraError::BrowserNavigation {
            target: target.into(),
            source: Some(source),
        }
    }

    /// Whether the error belongs to the run-fatal connectivity class.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, KiaraError::DebugBrowserConnection(_))
    }
}

pub type KiaraResult<T> = Result<T, KiaraError>;
