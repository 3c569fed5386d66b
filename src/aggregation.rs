//! Stateless reductions over dataset tables.
//!
//! Every function takes a frame by reference and returns a new value; inputs
//! are never mutated. Group keys are compared as strings, and rows with a null
//! key form a single group that always sorts last.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

use polars::prelude::*;

use crate::error::DashError;
use crate::schema::UNKNOWN_GROUP;

/// Reduction applied to the rows of one group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reducer {
    Sum,
    Mean,
}

impl Reducer {
    fn expr(self, column: &str) -> Expr {
        let value = col(column).cast(DataType::Float64);
        let reduced = match self {
            Reducer::Sum => value.sum(),
            Reducer::Mean => value.mean(),
        };
        reduced.alias(column)
    }
}

/// One reduced group. `key == None` is the null group.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupValue {
    pub key: Option<String>,
    pub value: f64,
}

impl GroupValue {
    pub fn label(&self) -> &str {
        self.key.as_deref().unwrap_or(UNKNOWN_GROUP)
    }
}

/// Total order on group keys: ascending, null last.
pub fn key_order(a: &Option<String>, b: &Option<String>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

// ── GroupReduce ─────────────────────────────────────────────────────────────

/// Group `table` by `group_by` and reduce `value` in each group.
///
/// Returns one row per distinct key with columns `group_by` (String) and
/// `value` (Float64), ordered by ascending key with the null group last.
pub fn group_reduce(
    table: &DataFrame,
    group_by: &str,
    value: &str,
    reducer: Reducer,
) -> Result<DataFrame, DashError> {
    let df = table
        .clone()
        .lazy()
        .group_by([col(group_by).cast(DataType::String)])
        .agg([reducer.expr(value)])
        .sort_by_exprs(
            [col(group_by)],
            SortMultipleOptions {
                nulls_last: vec![true],
                maintain_order: true,
                ..Default::default()
            },
        )
        .collect()?;
    Ok(df)
}

// ── TopN ────────────────────────────────────────────────────────────────────

/// The `n` groups with the greatest summed `value`, descending.
///
/// Ties on value are broken by ascending group key, null key last, so the
/// ranking is identical across calls.
pub fn top_n(
    table: &DataFrame,
    group_by: &str,
    value: &str,
    n: usize,
) -> Result<DataFrame, DashError> {
    let limit = IdxSize::try_from(n).unwrap_or(IdxSize::MAX);
    let df = group_reduce(table, group_by, value, Reducer::Sum)?
        .lazy()
        .sort_by_exprs(
            [col(value), col(group_by)],
            SortMultipleOptions {
                descending: vec![true, false],
                nulls_last: vec![true, true],
                maintain_order: true,
                ..Default::default()
            },
        )
        .limit(limit)
        .collect()?;
    Ok(df)
}

/// Read a two-column reduced frame back into typed rows, keeping frame order.
pub fn group_values(
    frame: &DataFrame,
    group_by: &str,
    value: &str,
) -> Result<Vec<GroupValue>, DashError> {
    let keys = frame.column(group_by)?.str()?;
    let values = frame.column(value)?.f64()?;
    Ok(keys
        .into_iter()
        .zip(values.into_iter())
        .map(|(key, value)| GroupValue {
            key: key.map(str::to_string),
            value: value.unwrap_or(0.0),
        })
        .collect())
}

// ── Pivot ───────────────────────────────────────────────────────────────────

/// Cross-tabulation of a value over two key columns.
///
/// A cell is `None` when no source row has that (row, column) pair, which is
/// distinct from `Some(0.0)`.
#[derive(Debug, Clone, PartialEq)]
pub struct PivotMatrix {
    pub row_keys: Vec<Option<String>>,
    pub col_keys: Vec<Option<String>>,
    cells: Vec<Vec<Option<f64>>>,
}

impl PivotMatrix {
    pub fn is_empty(&self) -> bool {
        self.row_keys.is_empty()
    }

    pub fn cell(&self, row: Option<&str>, col: Option<&str>) -> Option<f64> {
        let r = self.row_keys.iter().position(|k| k.as_deref() == row)?;
        let c = self.col_keys.iter().position(|k| k.as_deref() == col)?;
        self.cells[r][c]
    }

    pub fn rows(&self) -> &[Vec<Option<f64>>] {
        &self.cells
    }

    /// Wide frame: the row key column followed by one column per column key.
    pub fn to_frame(&self, row_key_name: &str) -> Result<DataFrame, DashError> {
        let mut columns = Vec::with_capacity(self.col_keys.len() + 1);
        columns.push(Column::new(row_key_name.into(), &self.row_keys));
        for (j, key) in self.col_keys.iter().enumerate() {
            let name = key.as_deref().unwrap_or(UNKNOWN_GROUP);
            let values: Vec<Option<f64>> = self.cells.iter().map(|row| row[j]).collect();
            columns.push(Column::new(name.into(), &values));
        }
        Ok(DataFrame::new(columns)?)
    }
}

/// Build a `row_key` × `col_key` matrix of `value` reduced with `reducer`.
pub fn pivot(
    table: &DataFrame,
    row_key: &str,
    col_key: &str,
    value: &str,
    reducer: Reducer,
) -> Result<PivotMatrix, DashError> {
    let grouped = table
        .clone()
        .lazy()
        .group_by([
            col(row_key).cast(DataType::String),
            col(col_key).cast(DataType::String),
        ])
        .agg([reducer.expr(value)])
        .collect()?;

    let rows = grouped.column(row_key)?.str()?;
    let cols = grouped.column(col_key)?.str()?;
    let values = grouped.column(value)?.f64()?;

    let mut row_set: BTreeSet<Option<String>> = BTreeSet::new();
    let mut col_set: BTreeSet<Option<String>> = BTreeSet::new();
    let mut lookup: HashMap<(Option<String>, Option<String>), f64> = HashMap::new();
    for i in 0..grouped.height() {
        let r = rows.get(i).map(str::to_string);
        let c = cols.get(i).map(str::to_string);
        row_set.insert(r.clone());
        col_set.insert(c.clone());
        lookup.insert((r, c), values.get(i).unwrap_or(0.0));
    }

    let mut row_keys: Vec<Option<String>> = row_set.into_iter().collect();
    let mut col_keys: Vec<Option<String>> = col_set.into_iter().collect();
    row_keys.sort_by(key_order);
    col_keys.sort_by(key_order);

    let cells = row_keys
        .iter()
        .map(|r| {
            col_keys
                .iter()
                .map(|c| lookup.get(&(r.clone(), c.clone())).copied())
                .collect()
        })
        .collect();

    Ok(PivotMatrix {
        row_keys,
        col_keys,
        cells,
    })
}

// ── PeriodDelta ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
    Flat,
}

/// Change of a metric against a configured baseline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeriodDelta {
    pub delta: f64,
    /// `delta / prior`; `None` when the prior value is zero.
    pub percent: Option<f64>,
    pub direction: Direction,
}

pub fn period_delta(current: f64, prior: f64) -> PeriodDelta {
    let delta = current - prior;
    let percent = if prior != 0.0 { Some(delta / prior) } else { None };
    let direction = if delta > 0.0 {
        Direction::Up
    } else if delta < 0.0 {
        Direction::Down
    } else {
        Direction::Flat
    };
    PeriodDelta {
        delta,
        percent,
        direction,
    }
}
