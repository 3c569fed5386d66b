use std::sync::Arc;

use tracing::info;

use crate::config::Config;
use crate::dataset::Dataset;
use crate::error::DashError;
use crate::graph::{DependencyGraph, OutputId};
use crate::kpi::{compute_kpis, Kpi};
use crate::scheduler::{Scheduler, Session};
use crate::selector::Dimension;
use crate::views::DerivedView;

/// Process-wide state: the dataset, the scheduler over it and the KPIs,
/// none of which change after construction. Sessions are opened from here.
#[derive(Debug)]
pub struct Dashboard {
    scheduler: Arc<Scheduler>,
    kpis: Vec<Kpi>,
    default_dimension: Dimension,
}

impl Dashboard {
    /// Load the dataset described by `config` and build the dashboard.
    pub fn load(config: &Config) -> Result<Self, DashError> {
        let dataset = Dataset::load_dir(&config.data_dir, &config.files)?;
        Self::new(Arc::new(dataset), config)
    }

    pub fn new(dataset: Arc<Dataset>, config: &Config) -> Result<Self, DashError> {
        let kpis = compute_kpis(&dataset, &config.kpi)?;
        let scheduler = Scheduler::new(dataset, DependencyGraph::standard()?, config.top_n)?;
        info!(kpis = kpis.len(), top_n = config.top_n, "dashboard ready");
        Ok(Self {
            scheduler: Arc::new(scheduler),
            kpis,
            default_dimension: config.default_dimension,
        })
    }

    pub fn dataset(&self) -> &Arc<Dataset> {
        self.scheduler.dataset()
    }

    pub fn kpis(&self) -> &[Kpi] {
        &self.kpis
    }

    pub fn open_session(&self) -> Result<Session, DashError> {
        Session::open(Arc::clone(&self.scheduler), self.default_dimension)
    }

    /// The heatmap, shared by every session.
    pub fn heatmap(&self) -> Option<Arc<DerivedView>> {
        self.scheduler.static_view(OutputId::Top5Heatmap).cloned()
    }
}
