// Dashboard configuration
// Loaded from a TOML file; every field has a default.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::DashError;
use crate::kpi::KpiBaseline;
use crate::selector::Dimension;

/// CSV file name of each source table, relative to `data_dir`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableFiles {
    pub store_product_fact: String,
    pub products: String,
    pub inventory: String,
    pub time_series: String,
    pub warehouse_product_fact: String,
}

impl Default for TableFiles {
    fn default() -> Self {
        Self {
            store_product_fact: "StoreProductFact.csv".to_string(),
            products: "Products.csv".to_string(),
            inventory: "Inventory.csv".to_string(),
            time_series: "TimeSeries.csv".to_string(),
            warehouse_product_fact: "WarehouseProductFact.csv".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding the table CSVs. Relative paths resolve against the
    /// config file's directory.
    pub data_dir: PathBuf,
    pub files: TableFiles,
    /// Number of products in the heatmap.
    pub top_n: usize,
    /// Dimension new sessions group by.
    pub default_dimension: Dimension,
    pub kpi: KpiBaseline,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            files: TableFiles::default(),
            top_n: 5,
            default_dimension: Dimension::ProductName,
            kpi: KpiBaseline::default(),
        }
    }
}

impl Config {
    pub fn from_toml(text: &str) -> Result<Self, DashError> {
        let config: Config = toml::from_str(text)?;
        if config.top_n == 0 {
            return Err(DashError::Config("top_n must be at least 1".to_string()));
        }
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, DashError> {
        let text = fs::read_to_string(path)?;
        let mut config = Self::from_toml(&text)?;
        if config.data_dir.is_relative() {
            if let Some(parent) = path.parent() {
                config.data_dir = parent.join(&config.data_dir);
            }
        }
        Ok(config)
    }
}
