use polars::prelude::*;
use serde::{Deserialize, Serialize};

use crate::aggregation::{period_delta, Direction, PeriodDelta};
use crate::dataset::Dataset;
use crate::error::DashError;
use crate::schema::{store_product, time_series};

/// Prior-period values the KPIs are compared against.
///
/// These are configuration, not derived from the data.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KpiBaseline {
    pub prior_year_revenue: f64,
    pub prior_year_turnover_rate: f64,
}

impl Default for KpiBaseline {
    fn default() -> Self {
        Self {
            prior_year_revenue: 1_916_950.0,
            prior_year_turnover_rate: 4.0,
        }
    }
}

/// How a delta should be coloured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Affect {
    Positive,
    Negative,
    Neutral,
}

impl Affect {
    pub fn color(self) -> &'static str {
        match self {
            Affect::Positive => "#2E8B57",
            Affect::Negative => "#D9534F",
            Affect::Neutral => "#6C757D",
        }
    }
}

impl Direction {
    pub fn affect(self) -> Affect {
        match self {
            Direction::Up => Affect::Positive,
            Direction::Down => Affect::Negative,
            Direction::Flat => Affect::Neutral,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    Revenue,
    Turnover,
}

impl Metric {
    pub fn title(self) -> &'static str {
        match self {
            Metric::Revenue => "Revenue",
            Metric::Turnover => "Avg Inventory Turnover",
        }
    }

    pub fn caption(self) -> &'static str {
        match self {
            Metric::Revenue => "Total revenue (12 months)",
            Metric::Turnover => "Avg monthly turnover rate",
        }
    }

    fn format(self, value: f64) -> String {
        match self {
            Metric::Revenue => format!("${}", thousands(value)),
            Metric::Turnover => format!("{value:.2}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Kpi {
    pub metric: Metric,
    pub current: f64,
    pub label: String,
    pub delta: PeriodDelta,
}

impl Kpi {
    pub fn new(metric: Metric, current: f64, prior: f64) -> Self {
        Self {
            metric,
            current,
            label: metric.format(current),
            delta: period_delta(current, prior),
        }
    }

    pub fn affect(&self) -> Affect {
        self.delta.direction.affect()
    }

    /// Signed percentage, or `n/a` when the baseline is zero.
    pub fn percent_label(&self) -> String {
        match self.delta.percent {
            Some(p) => format!("{:+.2}%", p * 100.0),
            None => "n/a".to_string(),
        }
    }
}

/// Revenue total and mean turnover against the configured baseline.
pub fn compute_kpis(dataset: &Dataset, baseline: &KpiBaseline) -> Result<Vec<Kpi>, DashError> {
    let revenue = dataset
        .store_product()
        .column(store_product::REVENUE)?
        .as_materialized_series()
        .sum_reduce()?;
    let revenue = revenue.value().try_extract::<f64>().unwrap_or(0.0);

    let turnover = dataset
        .time_series()
        .column(time_series::MONTHLY_TURNOVER_RATE)?
        .as_materialized_series()
        .mean_reduce();
    let turnover = turnover.value().try_extract::<f64>().unwrap_or(f64::NAN);

    Ok(vec![
        Kpi::new(Metric::Revenue, revenue, baseline.prior_year_revenue),
        Kpi::new(Metric::Turnover, turnover, baseline.prior_year_turnover_rate),
    ])
}

/// Round to a whole number and group digits by thousands: 2200000.4 → "2,200,000".
fn thousands(value: f64) -> String {
    let rounded = value.round();
    let digits = format!("{:.0}", rounded.abs());
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if rounded < 0.0 {
        out.push('-');
    }
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
