//! Derived views: the aggregate tables handed to the renderer.
//!
//! Each builder reads the dataset and the relevant selector values, runs the
//! aggregation engine and wraps the result with its title and axis labels.
//! A view with no rows is returned as an explicitly empty view, never an error.
use std::collections::HashMap;

use chrono::{NaiveDate, NaiveDateTime};
use polars::prelude::*;

use crate::aggregation::{group_reduce, group_values, pivot, top_n, GroupValue, PivotMatrix, Reducer};
use crate::dataset::Dataset;
use crate::error::DashError;
use crate::graph::OutputId;
use crate::schema::*;
use crate::selector::{Dimension, SelectorState};

/// Long-format series name column of the trend table.
pub const SERIES: &str = "Series";

#[derive(Debug, Clone, PartialEq)]
pub struct DerivedView {
    pub output: OutputId,
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    /// Renderer-facing table.
    pub table: DataFrame,
    pub body: ViewBody,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ViewBody {
    /// One bar per group, with an optional reference line at the group mean.
    Bars {
        groups: Vec<GroupValue>,
        mean: Option<f64>,
    },
    Trend(Vec<TrendSeries>),
    Heatmap(PivotMatrix),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrendSeries {
    pub name: String,
    pub points: Vec<TrendPoint>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrendPoint {
    pub month: String,
    pub value: f64,
}

impl DerivedView {
    pub fn is_empty(&self) -> bool {
        match &self.body {
            ViewBody::Bars { groups, .. } => groups.is_empty(),
            ViewBody::Trend(series) => series.iter().all(|s| s.points.is_empty()),
            ViewBody::Heatmap(matrix) => matrix.is_empty(),
        }
    }

    pub fn bars(&self) -> Option<&[GroupValue]> {
        match &self.body {
            ViewBody::Bars { groups, .. } => Some(groups),
            _ => None,
        }
    }

    pub fn series(&self) -> Option<&[TrendSeries]> {
        match &self.body {
            ViewBody::Trend(series) => Some(series),
            _ => None,
        }
    }

    pub fn heatmap(&self) -> Option<&PivotMatrix> {
        match &self.body {
            ViewBody::Heatmap(matrix) => Some(matrix),
            _ => None,
        }
    }
}

/// Compute one output from the given selector state.
pub fn derive_view(
    output: OutputId,
    state: &SelectorState,
    dataset: &Dataset,
    top: usize,
) -> Result<DerivedView, DashError> {
    match output {
        OutputId::SpaceAggregate => space_view(dataset, state.dimension),
        OutputId::RevenueAggregate => revenue_view(dataset, state.dimension),
        OutputId::TurnoverTrend => turnover_trend_view(dataset, &state.category, &state.products),
        OutputId::Top5Heatmap => top_heatmap_view(dataset, top),
    }
}

// ── Bar views ───────────────────────────────────────────────────────────────

/// Warehouse space summed per product or category, with the mean as reference.
pub fn space_view(dataset: &Dataset, dimension: Dimension) -> Result<DerivedView, DashError> {
    let key = dimension.column();
    let table = group_reduce(
        dataset.warehouse_product(),
        key,
        warehouse::WAREHOUSE_SPACE_OCCUPIED,
        Reducer::Sum,
    )?;
    let groups = group_values(&table, key, warehouse::WAREHOUSE_SPACE_OCCUPIED)?;
    let mean = if groups.is_empty() {
        None
    } else {
        Some(groups.iter().map(|g| g.value).sum::<f64>() / groups.len() as f64)
    };

    Ok(DerivedView {
        output: OutputId::SpaceAggregate,
        title: format!("Space Occupied per {}", dimension.label()),
        x_label: "Warehouse Space Occupied".to_string(),
        y_label: dimension.label().to_string(),
        table,
        body: ViewBody::Bars { groups, mean },
    })
}

pub fn revenue_view(dataset: &Dataset, dimension: Dimension) -> Result<DerivedView, DashError> {
    let key = dimension.column();
    let table = group_reduce(
        dataset.store_product(),
        key,
        store_product::REVENUE,
        Reducer::Sum,
    )?;
    let groups = group_values(&table, key, store_product::REVENUE)?;

    Ok(DerivedView {
        output: OutputId::RevenueAggregate,
        title: format!("Revenue per {}", dimension.label()),
        x_label: dimension.label().to_string(),
        y_label: "Total Revenue ($)".to_string(),
        table,
        body: ViewBody::Bars { groups, mean: None },
    })
}

// ── Trend view ──────────────────────────────────────────────────────────────

/// Monthly turnover for one category.
///
/// With no products selected this is a single series, the category average.
/// Otherwise there is one series per selected product, in selection order; a
/// product without turnover rows gets an empty series.
pub fn turnover_trend_view(
    dataset: &Dataset,
    category: &str,
    selected: &[String],
) -> Result<DerivedView, DashError> {
    let rate = time_series::MONTHLY_TURNOVER_RATE;
    let mut lazy = dataset
        .time_series()
        .clone()
        .lazy()
        .filter(col(products::CATEGORY).eq(lit(category)));

    let series_key = if selected.is_empty() {
        products::CATEGORY
    } else {
        let names = Series::new("selected".into(), selected);
        lazy = lazy.filter(col(products::PRODUCT_NAME).is_in(lit(names).implode(), false));
        products::PRODUCT_NAME
    };

    let grouped = lazy
        .group_by([col(series_key), col(time_series::MONTH)])
        .agg([col(rate).mean().alias(rate)])
        .collect()?;

    let keys = grouped.column(series_key)?.str()?;
    let months = grouped.column(time_series::MONTH)?.str()?;
    let values = grouped.column(rate)?.f64()?;

    let mut buckets: HashMap<&str, Vec<TrendPoint>> = HashMap::new();
    for i in 0..grouped.height() {
        let (Some(key), Some(month)) = (keys.get(i), months.get(i)) else {
            continue;
        };
        buckets.entry(key).or_default().push(TrendPoint {
            month: month.to_string(),
            value: values.get(i).unwrap_or(f64::NAN),
        });
    }

    let names: Vec<&str> = if selected.is_empty() {
        vec![category]
    } else {
        selected.iter().map(String::as_str).collect()
    };
    let series: Vec<TrendSeries> = names
        .into_iter()
        .map(|name| {
            let mut points = buckets.remove(name).unwrap_or_default();
            points.sort_by_key(|p| MonthKey::parse(&p.month));
            TrendSeries {
                name: name.to_string(),
                points,
            }
        })
        .collect();

    Ok(DerivedView {
        output: OutputId::TurnoverTrend,
        title: format!("Inventory Turnover Trend ({category})"),
        x_label: "Month".to_string(),
        y_label: "Monthly Turnover Rate".to_string(),
        table: trend_table(&series)?,
        body: ViewBody::Trend(series),
    })
}

fn trend_table(series: &[TrendSeries]) -> Result<DataFrame, DashError> {
    let mut names: Vec<&str> = Vec::new();
    let mut months: Vec<&str> = Vec::new();
    let mut values: Vec<f64> = Vec::new();
    for s in series {
        for p in &s.points {
            names.push(&s.name);
            months.push(&p.month);
            values.push(p.value);
        }
    }
    let df = DataFrame::new(vec![
        Column::new(SERIES.into(), &names),
        Column::new(time_series::MONTH.into(), &months),
        Column::new(time_series::MONTHLY_TURNOVER_RATE.into(), &values),
    ])?;
    Ok(df)
}

/// Sort key for month labels: full dates, ISO months, month numbers, then text.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum MonthKey {
    Date(NaiveDate),
    Number(i64),
    Text(String),
}

impl MonthKey {
    fn parse(raw: &str) -> Self {
        let s = raw.trim();
        if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
            return MonthKey::Date(d);
        }
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
            return MonthKey::Date(dt.date());
        }
        if let Ok(d) = NaiveDate::parse_from_str(&format!("{s}-01"), "%Y-%m-%d") {
            return MonthKey::Date(d);
        }
        match s.parse::<i64>() {
            Ok(n) => MonthKey::Number(n),
            Err(_) => MonthKey::Text(s.to_string()),
        }
    }
}

// ── Heatmap ─────────────────────────────────────────────────────────────────

/// Units sold per store for the `n` products with the highest revenue.
pub fn top_heatmap_view(dataset: &Dataset, n: usize) -> Result<DerivedView, DashError> {
    let sales = dataset.store_product();
    // Unresolved rows have no name to show and must not take a slot.
    let named = sales
        .clone()
        .lazy()
        .filter(col(products::PRODUCT_NAME).is_not_null())
        .collect()?;
    let top = top_n(&named, products::PRODUCT_NAME, store_product::REVENUE, n)?;
    let names = top
        .column(products::PRODUCT_NAME)?
        .as_materialized_series()
        .clone();

    let filtered = named
        .lazy()
        .filter(col(products::PRODUCT_NAME).is_in(lit(names).implode(), false))
        .collect()?;
    let matrix = pivot(
        &filtered,
        store_product::STORE_ID,
        products::PRODUCT_NAME,
        store_product::UNITS_SOLD,
        Reducer::Sum,
    )?;

    Ok(DerivedView {
        output: OutputId::Top5Heatmap,
        title: format!("Store × Product Units Sold (Top {n} Products)"),
        x_label: "Product Name".to_string(),
        y_label: "Store".to_string(),
        table: matrix.to_frame(store_product::STORE_ID)?,
        body: ViewBody::Heatmap(matrix),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn month_keys_order_chronologically() {
        let mut months = vec!["2024-10", "2024-02", "2023-12"];
        months.sort_by_key(|m| MonthKey::parse(m));
        assert_eq!(months, vec!["2023-12", "2024-02", "2024-10"]);

        let mut numbers = vec!["10", "2", "1"];
        numbers.sort_by_key(|m| MonthKey::parse(m));
        assert_eq!(numbers, vec!["1", "2", "10"]);

        assert!(MonthKey::parse("2024-01-31") < MonthKey::parse("2024-02-01 00:00:00"));
    }
}
