/// Table, column and identifier constants for retail-pulse.
/// Single source of truth - exported to Python via PyO3.

// ── Table names ─────────────────────────────────────────────────────────────
pub mod tables {
    pub const STORE_PRODUCT_FACT: &str = "storeProductFact";
    pub const PRODUCTS: &str = "products";
    pub const INVENTORY: &str = "inventory";
    pub const TIME_SERIES: &str = "timeSeries";
    pub const WAREHOUSE_PRODUCT_FACT: &str = "warehouseProductFact";
}

// ── Store × product sales columns ───────────────────────────────────────────
pub mod store_product {
    pub const STORE_ID: &str = "StoreID";
    pub const PRODUCT_ID: &str = "ProductID";
    pub const PRODUCT_NAME: &str = "ProductName";
    pub const CATEGORY: &str = "Category";
    pub const REVENUE: &str = "Revenue";
    pub const UNITS_SOLD: &str = "UnitsSold";

    pub const MEASURES: [&str; 2] = [REVENUE, UNITS_SOLD];
}

// ── Product dimension columns ───────────────────────────────────────────────
pub mod products {
    pub const PRODUCT_ID: &str = "ProductID";
    pub const PRODUCT_NAME: &str = "ProductName";
    pub const CATEGORY: &str = "Category";

    pub const REQUIRED: [&str; 3] = [PRODUCT_ID, PRODUCT_NAME, CATEGORY];
}

// ── Monthly turnover columns ────────────────────────────────────────────────
pub mod time_series {
    pub const MONTH: &str = "Month";
    pub const PRODUCT_ID: &str = "ProductID";
    pub const MONTHLY_TURNOVER_RATE: &str = "MonthlyTurnoverRate";

    pub const REQUIRED: [&str; 3] = [MONTH, PRODUCT_ID, MONTHLY_TURNOVER_RATE];
}

// ── Warehouse space columns ─────────────────────────────────────────────────
pub mod warehouse {
    pub const PRODUCT_ID: &str = "ProductID";
    pub const PRODUCT_NAME: &str = "ProductName";
    pub const CATEGORY: &str = "Category";
    pub const WAREHOUSE_SPACE_OCCUPIED: &str = "WarehouseSpaceOccupied";
}

// ── Control identifiers ─────────────────────────────────────────────────────
pub mod controls {
    pub const DIMENSION: &str = "dimension-selector";
    pub const CATEGORY: &str = "category-selector";
    pub const PRODUCTS: &str = "products-selector";
}

// ── Output identifiers ──────────────────────────────────────────────────────
pub mod outputs {
    pub const SPACE_AGGREGATE: &str = "space-aggregate-view";
    pub const REVENUE_AGGREGATE: &str = "revenue-aggregate-view";
    pub const TURNOVER_TREND: &str = "turnover-trend-view";
    pub const TOP5_HEATMAP: &str = "top5-heatmap-view";
}

/// Display label for the null group produced by unresolved product joins.
pub const UNKNOWN_GROUP: &str = "unknown";
