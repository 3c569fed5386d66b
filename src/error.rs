use thiserror::Error;

#[derive(Error, Debug)]
pub enum DashError {
    #[error("Schema violation in {table}: {reason}")]
    SchemaViolation { table: String, reason: String },

    #[error("Unknown control: {0}")]
    UnknownControl(String),

    #[error("Value {value:?} is not a legal option for {control}")]
    UnknownSelectorValue { control: String, value: String },

    #[error("Dependency graph has a cycle through {0}")]
    GraphCycle(String),

    #[error("Config: {0}")]
    Config(String),

    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DashError {
    /// Control-event errors are recovered inside the session as a no-op.
    pub fn is_rejected_event(&self) -> bool {
        matches!(
            self,
            DashError::UnknownControl(_) | DashError::UnknownSelectorValue { .. }
        )
    }

    pub(crate) fn schema(table: &str, reason: impl Into<String>) -> Self {
        DashError::SchemaViolation {
            table: table.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<toml::de::Error> for DashError {
    fn from(err: toml::de::Error) -> Self {
        DashError::Config(err.to_string())
    }
}

#[cfg(feature = "python")]
impl From<DashError> for pyo3::PyErr {
    fn from(err: DashError) -> pyo3::PyErr {
        match err {
            DashError::UnknownControl(_) | DashError::UnknownSelectorValue { .. } => {
                pyo3::exceptions::PyValueError::new_err(err.to_string())
            }
            _ => pyo3::exceptions::PyRuntimeError::new_err(err.to_string()),
        }
    }
}
