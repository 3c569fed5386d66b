use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use polars::prelude::*;
use tracing::{debug, info, warn};

use crate::config::TableFiles;
use crate::error::DashError;
use crate::schema::*;

/// Raw, unvalidated frames, one per source table.
pub struct SourceFrames {
    pub store_product: DataFrame,
    pub products: DataFrame,
    pub inventory: Option<DataFrame>,
    pub time_series: DataFrame,
    pub warehouse_product: DataFrame,
}

/// The immutable, process-wide collection of tables every view is derived from.
///
/// Built once at startup, then shared read-only (usually behind an `Arc`).
/// Construction validates the schema contract, normalizes key columns to
/// strings and measure columns to `Float64`, and attaches `ProductName` /
/// `Category` to fact tables that only carry a `ProductID`.
#[derive(Debug)]
pub struct Dataset {
    store_product: DataFrame,
    products: DataFrame,
    inventory: Option<DataFrame>,
    time_series: DataFrame,
    warehouse_product: DataFrame,
    /// Category → product names, derived from the products dimension.
    catalog: BTreeMap<String, BTreeSet<String>>,
}

impl Dataset {
    // ── Loading ─────────────────────────────────────────────────────────────

    /// Load every table from CSV files in `dir`.
    ///
    /// A missing required file is a schema violation; `inventory` is optional.
    pub fn load_dir(dir: &Path, files: &TableFiles) -> Result<Self, DashError> {
        let required = |table: &str, name: &str| -> Result<DataFrame, DashError> {
            let path = dir.join(name);
            if !path.is_file() {
                return Err(DashError::schema(
                    table,
                    format!("source file {} not found", path.display()),
                ));
            }
            read_csv_as_strings(&path)
        };

        let inventory_path = dir.join(&files.inventory);
        let inventory = if inventory_path.is_file() {
            Some(read_csv_as_strings(&inventory_path)?)
        } else {
            debug!(path = %inventory_path.display(), "no inventory table");
            None
        };

        let frames = SourceFrames {
            store_product: required(tables::STORE_PRODUCT_FACT, &files.store_product_fact)?,
            products: required(tables::PRODUCTS, &files.products)?,
            inventory,
            time_series: required(tables::TIME_SERIES, &files.time_series)?,
            warehouse_product: required(
                tables::WAREHOUSE_PRODUCT_FACT,
                &files.warehouse_product_fact,
            )?,
        };

        Self::from_frames(frames)
    }

    /// Validate and enrich already-loaded frames.
    pub fn from_frames(frames: SourceFrames) -> Result<Self, DashError> {
        let products = prepare_products(frames.products)?;
        let catalog = build_catalog(&products)?;

        let store_product = {
            let df = frames.store_product;
            let table = tables::STORE_PRODUCT_FACT;
            require_columns(
                &df,
                table,
                &[
                    store_product::STORE_ID,
                    store_product::REVENUE,
                    store_product::UNITS_SOLD,
                ],
            )?;
            require_product_key(&df, table)?;
            let df = normalize(
                df,
                table,
                &[
                    store_product::STORE_ID,
                    store_product::PRODUCT_ID,
                    store_product::PRODUCT_NAME,
                    store_product::CATEGORY,
                ],
                &store_product::MEASURES,
            )?;
            attach_product_attributes(df, table, &products, &catalog)?
        };

        let time_series = {
            let df = frames.time_series;
            let table = tables::TIME_SERIES;
            require_columns(&df, table, &time_series::REQUIRED)?;
            let df = normalize(
                df,
                table,
                &[
                    time_series::MONTH,
                    time_series::PRODUCT_ID,
                    products::PRODUCT_NAME,
                    products::CATEGORY,
                ],
                &[time_series::MONTHLY_TURNOVER_RATE],
            )?;
            attach_product_attributes(df, table, &products, &catalog)?
        };

        let warehouse_product = {
            let df = frames.warehouse_product;
            let table = tables::WAREHOUSE_PRODUCT_FACT;
            require_columns(
                &df,
                table,
                &[warehouse::CATEGORY, warehouse::WAREHOUSE_SPACE_OCCUPIED],
            )?;
            require_product_key(&df, table)?;
            let df = normalize(
                df,
                table,
                &[
                    warehouse::PRODUCT_ID,
                    warehouse::PRODUCT_NAME,
                    warehouse::CATEGORY,
                ],
                &[warehouse::WAREHOUSE_SPACE_OCCUPIED],
            )?;
            attach_product_attributes(df, table, &products, &catalog)?
        };

        let inventory = match frames.inventory {
            Some(df) => Some(normalize(
                df,
                tables::INVENTORY,
                &[products::PRODUCT_ID, products::PRODUCT_NAME],
                &[],
            )?),
            None => None,
        };

        info!(
            store_rows = store_product.height(),
            products = products.height(),
            categories = catalog.len(),
            months = time_series.height(),
            warehouse_rows = warehouse_product.height(),
            "dataset loaded"
        );

        Ok(Self {
            store_product,
            products,
            inventory,
            time_series,
            warehouse_product,
            catalog,
        })
    }

    // ── Tables ──────────────────────────────────────────────────────────────

    pub fn store_product(&self) -> &DataFrame {
        &self.store_product
    }

    pub fn products(&self) -> &DataFrame {
        &self.products
    }

    pub fn inventory(&self) -> Option<&DataFrame> {
        self.inventory.as_ref()
    }

    /// Monthly turnover, already joined with product name and category.
    pub fn time_series(&self) -> &DataFrame {
        &self.time_series
    }

    pub fn warehouse_product(&self) -> &DataFrame {
        &self.warehouse_product
    }

    // ── Catalog ─────────────────────────────────────────────────────────────

    /// Distinct categories in ascending order.
    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.catalog.keys().map(String::as_str)
    }

    pub fn has_category(&self, category: &str) -> bool {
        self.catalog.contains_key(category)
    }

    /// First category alphabetically, the session default.
    pub fn default_category(&self) -> Option<&str> {
        self.categories().next()
    }

    /// Distinct product names of `category`, ascending. Empty for unknown categories.
    pub fn products_in(&self, category: &str) -> Vec<String> {
        self.catalog
            .get(category)
            .map(|names| names.iter().cloned().collect())
            .unwrap_or_default()
    }
}

// ── Private helpers ─────────────────────────────────────────────────────────

/// Read a CSV file with all columns as String dtype and trimmed column names.
fn read_csv_as_strings(path: &Path) -> Result<DataFrame, DashError> {
    let mut df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()?;

    let trimmed: Vec<String> = df
        .get_column_names_str()
        .iter()
        .map(|c| c.trim().to_string())
        .collect();
    df.set_column_names(trimmed.iter().map(String::as_str))?;

    debug!(path = %path.display(), rows = df.height(), "read csv");
    Ok(df)
}

fn require_columns(df: &DataFrame, table: &str, required: &[&str]) -> Result<(), DashError> {
    let schema = df.schema();
    for &col_name in required {
        if !schema.contains(col_name) {
            return Err(DashError::schema(
                table,
                format!("missing column {col_name}"),
            ));
        }
    }
    Ok(())
}

fn require_product_key(df: &DataFrame, table: &str) -> Result<(), DashError> {
    let schema = df.schema();
    if schema.contains(products::PRODUCT_ID) || schema.contains(products::PRODUCT_NAME) {
        Ok(())
    } else {
        Err(DashError::schema(
            table,
            format!(
                "needs {} or {}",
                products::PRODUCT_ID,
                products::PRODUCT_NAME
            ),
        ))
    }
}

/// Cast present key columns to String and measure columns to Float64.
///
/// A measure value that cannot be parsed as a number is a schema violation,
/// detected as a null introduced by the cast.
fn normalize(
    df: DataFrame,
    table: &str,
    keys: &[&str],
    measures: &[&str],
) -> Result<DataFrame, DashError> {
    let schema = df.schema().clone();
    let mut exprs: Vec<Expr> = keys
        .iter()
        .filter(|k| schema.contains(k))
        .map(|k| col(*k).cast(DataType::String))
        .collect();

    let mut nulls_before = Vec::with_capacity(measures.len());
    for &m in measures {
        let column = df.column(m)?;
        nulls_before.push(column.null_count());
        let expr = if column.dtype() == &DataType::String {
            col(m)
                .str()
                .strip_chars(lit(" \t\r\n"))
                .cast(DataType::Float64)
        } else {
            col(m).cast(DataType::Float64)
        };
        exprs.push(expr);
    }

    if exprs.is_empty() {
        return Ok(df);
    }
    let out = df.lazy().with_columns(exprs).collect()?;

    for (&m, before) in measures.iter().zip(nulls_before) {
        let after = out.column(m)?.null_count();
        if after > before {
            return Err(DashError::schema(
                table,
                format!("column {m} has {} non-numeric values", after - before),
            ));
        }
    }
    Ok(out)
}

fn prepare_products(df: DataFrame) -> Result<DataFrame, DashError> {
    let table = tables::PRODUCTS;
    require_columns(&df, table, &products::REQUIRED)?;
    let df = normalize(df, table, &products::REQUIRED, &[])?;

    let distinct = df
        .column(products::PRODUCT_ID)?
        .as_materialized_series()
        .n_unique()?;
    if distinct != df.height() {
        return Err(DashError::schema(
            table,
            format!(
                "{} is not unique ({} rows, {} distinct)",
                products::PRODUCT_ID,
                df.height(),
                distinct
            ),
        ));
    }
    Ok(df)
}

fn build_catalog(products: &DataFrame) -> Result<BTreeMap<String, BTreeSet<String>>, DashError> {
    let names = products.column(products::PRODUCT_NAME)?.str()?;
    let categories = products.column(products::CATEGORY)?.str()?;

    let mut catalog: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for (name, category) in names.into_iter().zip(categories.into_iter()) {
        if let (Some(name), Some(category)) = (name, category) {
            catalog
                .entry(category.to_string())
                .or_default()
                .insert(name.to_string());
        }
    }
    Ok(catalog)
}

/// Name → category lookup frame; a name listed under several categories keeps the first.
fn category_by_name(catalog: &BTreeMap<String, BTreeSet<String>>) -> Result<DataFrame, DashError> {
    let mut seen = BTreeSet::new();
    let mut names: Vec<&str> = Vec::new();
    let mut categories: Vec<&str> = Vec::new();
    for (category, members) in catalog {
        for name in members {
            if seen.insert(name.as_str()) {
                names.push(name);
                categories.push(category);
            }
        }
    }
    let df = DataFrame::new(vec![
        Column::new(products::PRODUCT_NAME.into(), &names),
        Column::new(products::CATEGORY.into(), &categories),
    ])?;
    Ok(df)
}

/// Left-join ProductName / Category onto a fact table that lacks them.
///
/// Joins on ProductID when present, otherwise on ProductName. Unresolved rows
/// are kept with nulls.
fn attach_product_attributes(
    df: DataFrame,
    table: &str,
    products: &DataFrame,
    catalog: &BTreeMap<String, BTreeSet<String>>,
) -> Result<DataFrame, DashError> {
    let schema = df.schema().clone();
    let missing: Vec<&str> = [products::PRODUCT_NAME, products::CATEGORY]
        .into_iter()
        .filter(|c| !schema.contains(c))
        .collect();
    if missing.is_empty() {
        return Ok(df);
    }

    let (key, lookup) = if schema.contains(products::PRODUCT_ID) {
        let mut select = vec![col(products::PRODUCT_ID)];
        select.extend(missing.iter().map(|c| col(*c)));
        (products::PRODUCT_ID, products.clone().lazy().select(select))
    } else {
        // ProductName is present, so only Category can be missing.
        (products::PRODUCT_NAME, category_by_name(catalog)?.lazy())
    };

    let out = df
        .lazy()
        .join(
            lookup,
            [col(key)],
            [col(key)],
            JoinArgs::new(JoinType::Left),
        )
        .collect()?;

    let unresolved = out.column(missing[0])?.null_count();
    if unresolved > 0 {
        warn!(table, unresolved, key, "rows did not resolve against products");
    }
    Ok(out)
}
