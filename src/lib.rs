//! Reactive analytical views over a small retail dataset.
//!
//! A [`Dataset`] is loaded once and shared read-only. Each [`Session`] holds
//! its own selector state; control events go through the [`Scheduler`], which
//! cascades dependent resets before recomputing the affected views and
//! publishes the result atomically.

pub mod aggregation;
pub mod config;
pub mod dashboard;
pub mod dataset;
pub mod error;
pub mod graph;
pub mod kpi;
pub mod scheduler;
pub mod schema;
pub mod selector;
pub mod views;

#[cfg(feature = "python")]
mod python;

pub use config::Config;
pub use dashboard::Dashboard;
pub use dataset::{Dataset, SourceFrames};
pub use error::DashError;
pub use graph::{DependencyGraph, OutputId};
pub use scheduler::{Ack, Scheduler, Session, Snapshot};
pub use selector::{ControlEvent, ControlId, ControlValue, Dimension, SelectorState};
pub use views::DerivedView;

#[cfg(feature = "python")]
use pyo3::prelude::*;
#[cfg(feature = "python")]
use pyo3::types::PyModule;

/// Export identifier constants as Python submodules
#[cfg(feature = "python")]
fn add_schema_exports(m: &Bound<'_, PyModule>) -> PyResult<()> {
    // Controls
    let controls = PyModule::new(m.py(), "controls")?;
    controls.add("DIMENSION", schema::controls::DIMENSION)?;
    controls.add("CATEGORY", schema::controls::CATEGORY)?;
    controls.add("PRODUCTS", schema::controls::PRODUCTS)?;
    m.add_submodule(&controls)?;

    // Outputs
    let outputs = PyModule::new(m.py(), "outputs")?;
    outputs.add("SPACE_AGGREGATE", schema::outputs::SPACE_AGGREGATE)?;
    outputs.add("REVENUE_AGGREGATE", schema::outputs::REVENUE_AGGREGATE)?;
    outputs.add("TURNOVER_TREND", schema::outputs::TURNOVER_TREND)?;
    outputs.add("TOP5_HEATMAP", schema::outputs::TOP5_HEATMAP)?;
    m.add_submodule(&outputs)?;

    // Dimension values
    let dimension = PyModule::new(m.py(), "dimension")?;
    dimension.add("PRODUCT_NAME", Dimension::ProductName.column())?;
    dimension.add("CATEGORY", Dimension::Category.column())?;
    m.add_submodule(&dimension)?;

    Ok(())
}

#[cfg(feature = "python")]
#[pymodule]
fn retail_pulse(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<python::PyDashboard>()?;
    m.add_class::<python::PySession>()?;
    add_schema_exports(m)?;
    Ok(())
}
