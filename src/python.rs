use std::path::PathBuf;
use std::sync::Arc;

use pyo3::exceptions::{PyKeyError, PyTypeError};
use pyo3::prelude::*;
use pyo3_polars::PyDataFrame;

use crate::config::Config;
use crate::dashboard::Dashboard;
use crate::graph::OutputId;
use crate::scheduler::{Ack, Session};
use crate::selector::ControlValue;
use crate::views::DerivedView;

#[pyclass(name = "Dashboard")]
pub struct PyDashboard {
    inner: Arc<Dashboard>,
}

#[pymethods]
impl PyDashboard {
    /// Load the dataset.
    ///
    /// `config_path` points at a TOML config; without it the defaults are
    /// used with `data_dir` (default: "data").
    #[new]
    #[pyo3(signature = (config_path=None, data_dir=None))]
    fn new(config_path: Option<String>, data_dir: Option<String>) -> PyResult<Self> {
        let mut config = match config_path {
            Some(path) => Config::load(&PathBuf::from(path))?,
            None => Config::default(),
        };
        if let Some(dir) = data_dir {
            config.data_dir = PathBuf::from(dir);
        }
        let dashboard = Dashboard::load(&config)?;
        Ok(Self {
            inner: Arc::new(dashboard),
        })
    }

    /// KPI cards as `(title, label, caption, percent_label, colour)` tuples.
    fn kpis(&self) -> Vec<(String, String, String, String, String)> {
        self.inner
            .kpis()
            .iter()
            .map(|k| {
                (
                    k.metric.title().to_string(),
                    k.label.clone(),
                    k.metric.caption().to_string(),
                    k.percent_label(),
                    k.affect().color().to_string(),
                )
            })
            .collect()
    }

    fn categories(&self) -> Vec<String> {
        self.inner
            .dataset()
            .categories()
            .map(str::to_string)
            .collect()
    }

    fn open_session(&self) -> PyResult<PySession> {
        Ok(PySession {
            inner: self.inner.open_session()?,
        })
    }
}

#[pyclass(name = "Session")]
pub struct PySession {
    inner: Session,
}

#[pymethods]
impl PySession {
    #[getter]
    fn id(&self) -> String {
        self.inner.id().to_string()
    }

    /// Apply a control change. Returns False when the value was rejected.
    ///
    /// `value` is a string for single-valued controls and a list of strings
    /// for `products-selector`.
    fn dispatch(&self, control: &str, value: Bound<'_, PyAny>) -> PyResult<bool> {
        let value = if let Ok(single) = value.extract::<String>() {
            ControlValue::Single(single)
        } else if let Ok(many) = value.extract::<Vec<String>>() {
            ControlValue::Multi(many)
        } else {
            return Err(PyTypeError::new_err(
                "control value must be a str or a list of str",
            ));
        };
        let ack = self.inner.dispatch_raw(control, value)?;
        Ok(matches!(ack, Ack::Applied { .. }))
    }

    #[getter]
    fn version(&self) -> u64 {
        self.inner.snapshot().version
    }

    #[getter]
    fn category(&self) -> String {
        self.inner.snapshot().state.category.clone()
    }

    #[getter]
    fn products(&self) -> Vec<String> {
        self.inner.snapshot().state.products.clone()
    }

    #[getter]
    fn product_options(&self) -> Vec<String> {
        self.inner.snapshot().product_options.clone()
    }

    /// A view as `(title, x_label, y_label, table)`.
    fn view(&self, output: &str) -> PyResult<(String, String, String, PyDataFrame)> {
        let id = OutputId::parse(output)
            .ok_or_else(|| PyKeyError::new_err(format!("unknown output: {output}")))?;
        let snapshot = self.inner.snapshot();
        let view = snapshot
            .view(id)
            .ok_or_else(|| PyKeyError::new_err(format!("output not computed: {output}")))?;
        Ok(view_tuple(view))
    }
}

fn view_tuple(view: &DerivedView) -> (String, String, String, PyDataFrame) {
    (
        view.title.clone(),
        view.x_label.clone(),
        view.y_label.clone(),
        PyDataFrame(view.table.clone()),
    )
}
