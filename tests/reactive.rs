use std::fs;
use std::sync::Arc;
use std::thread;

use retail_pulse::aggregation::Direction;
use retail_pulse::kpi::Metric;
use retail_pulse::schema::{controls, outputs, UNKNOWN_GROUP};
use retail_pulse::scheduler::SessionId;
use retail_pulse::views::ViewBody;
use retail_pulse::{
    Ack, Config, ControlEvent, ControlId, ControlValue, Dashboard, DashError, Dimension, OutputId,
};
use tempfile::TempDir;

const PRODUCTS: &str = "\
ProductID,ProductName,Category
P1,Milk,Dairy
P2,Brie,Dairy
P3,Bagel,Bakery
P4,Rye,Bakery
";

// P9 has no catalog entry and lands in the unknown group.
const STORE_PRODUCT: &str = "\
StoreID,ProductID,Revenue,UnitsSold
S1,P1,100,10
S1,P2,50,5
S2,P1,30,3
S2,P3,80,8
S3,P4,20,2
S1,P9,5,1
";

const TIME_SERIES: &str = "\
Month,ProductID,MonthlyTurnoverRate
2024-02,P1,6
2024-01,P1,4
2024-01,P2,2
2024-02,P2,3
2024-01,P3,5
2024-02,P4,7
";

const WAREHOUSE: &str = "\
ProductID,Category,WarehouseSpaceOccupied
P1,Dairy,0.25
P2,Dairy,0.5
P3,Bakery,0.25
";

fn write_tables(dir: &TempDir) {
    fs::write(dir.path().join("Products.csv"), PRODUCTS).unwrap();
    fs::write(dir.path().join("StoreProductFact.csv"), STORE_PRODUCT).unwrap();
    fs::write(dir.path().join("TimeSeries.csv"), TIME_SERIES).unwrap();
    fs::write(dir.path().join("WarehouseProductFact.csv"), WAREHOUSE).unwrap();
}

fn dashboard_with(top_n: usize) -> (TempDir, Dashboard) {
    let dir = tempfile::tempdir().unwrap();
    write_tables(&dir);
    let config = Config {
        data_dir: dir.path().to_path_buf(),
        top_n,
        ..Config::default()
    };
    let dashboard = Dashboard::load(&config).unwrap();
    (dir, dashboard)
}

fn dashboard() -> (TempDir, Dashboard) {
    dashboard_with(3)
}

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

#[test]
fn loads_tables_from_csv() {
    let (_dir, dash) = dashboard();
    let ds = dash.dataset();
    let categories: Vec<&str> = ds.categories().collect();
    assert_eq!(categories, vec!["Bakery", "Dairy"]);
    assert_eq!(ds.products_in("Dairy"), vec!["Brie", "Milk"]);
    assert!(ds.inventory().is_none());
}

#[test]
fn missing_source_file_is_a_schema_violation() {
    let dir = tempfile::tempdir().unwrap();
    write_tables(&dir);
    fs::remove_file(dir.path().join("TimeSeries.csv")).unwrap();
    let config = Config {
        data_dir: dir.path().to_path_buf(),
        ..Config::default()
    };
    match Dashboard::load(&config) {
        Err(DashError::SchemaViolation { table, .. }) => assert_eq!(table, "timeSeries"),
        other => panic!("expected schema violation, got {other:?}"),
    }
}

#[test]
fn non_numeric_measure_is_rejected_at_load() {
    let dir = tempfile::tempdir().unwrap();
    write_tables(&dir);
    fs::write(
        dir.path().join("StoreProductFact.csv"),
        "StoreID,ProductID,Revenue,UnitsSold\nS1,P1,lots,10\n",
    )
    .unwrap();
    let config = Config {
        data_dir: dir.path().to_path_buf(),
        ..Config::default()
    };
    assert!(matches!(
        Dashboard::load(&config),
        Err(DashError::SchemaViolation { .. })
    ));
}

#[test]
fn initial_snapshot_evaluates_every_output() {
    let (_dir, dash) = dashboard();
    let session = dash.open_session().unwrap();
    let snap = session.snapshot();

    assert_eq!(snap.version, 0);
    assert_eq!(snap.state.category, "Bakery");
    assert!(snap.state.products.is_empty());
    assert_eq!(snap.product_options, vec!["Bagel", "Rye"]);
    for output in OutputId::ALL {
        assert!(snap.view(output).is_some(), "{output} missing");
    }

    let trend = snap.view(OutputId::TurnoverTrend).unwrap();
    let series = trend.series().unwrap();
    assert_eq!(series.len(), 1);
    assert_eq!(series[0].name, "Bakery");
    let months: Vec<&str> = series[0].points.iter().map(|p| p.month.as_str()).collect();
    assert_eq!(months, vec!["2024-01", "2024-02"]);
}

#[test]
fn revenue_view_keeps_unresolved_rows_in_unknown_group() {
    let (_dir, dash) = dashboard();
    let session = dash.open_session().unwrap();
    let snap = session.snapshot();
    let revenue = snap.view(OutputId::RevenueAggregate).unwrap();
    let bars = revenue.bars().unwrap();

    let labels: Vec<&str> = bars.iter().map(|g| g.label()).collect();
    assert_eq!(labels, vec!["Bagel", "Brie", "Milk", "Rye", UNKNOWN_GROUP]);
    let total: f64 = bars.iter().map(|g| g.value).sum();
    assert!(close(total, 285.0));
    assert!(close(bars[2].value, 130.0));
    assert_eq!(revenue.title, "Revenue per Product Name");
}

#[test]
fn category_change_resets_products_before_recomputing_trend() {
    let (_dir, dash) = dashboard();
    let session = dash.open_session().unwrap();

    let ack = session.dispatch(&ControlEvent::products(["Rye"])).unwrap();
    assert!(matches!(ack, Ack::Applied { version: 1, .. }));
    assert_eq!(session.snapshot().state.products, vec!["Rye"]);

    let ack = session.dispatch(&ControlEvent::category("Dairy")).unwrap();
    match ack {
        Ack::Applied {
            version,
            recomputed,
            resets,
        } => {
            assert_eq!(version, 2);
            assert_eq!(resets, vec![ControlId::Products]);
            assert_eq!(recomputed, vec![OutputId::TurnoverTrend]);
        }
        other => panic!("unexpected ack {other:?}"),
    }

    let snap = session.snapshot();
    assert_eq!(snap.state.category, "Dairy");
    assert!(snap.state.products.is_empty());
    assert_eq!(snap.product_options, vec!["Brie", "Milk"]);

    // Whole-category series, never a stale "Rye" series.
    let trend = snap.view(OutputId::TurnoverTrend).unwrap();
    assert_eq!(trend.title, "Inventory Turnover Trend (Dairy)");
    let series = trend.series().unwrap();
    assert_eq!(series.len(), 1);
    assert_eq!(series[0].name, "Dairy");
    let values: Vec<f64> = series[0].points.iter().map(|p| p.value).collect();
    assert!(close(values[0], 3.0));
    assert!(close(values[1], 4.5));
}

#[test]
fn selected_products_get_one_series_each_in_selection_order() {
    let (_dir, dash) = dashboard();
    let session = dash.open_session().unwrap();
    session.dispatch(&ControlEvent::category("Dairy")).unwrap();
    session
        .dispatch(&ControlEvent::products(["Milk", "Brie", "Milk"]))
        .unwrap();

    let snap = session.snapshot();
    assert_eq!(snap.state.products, vec!["Milk", "Brie"]);
    let series = snap.view(OutputId::TurnoverTrend).unwrap().series().unwrap().to_vec();
    let names: Vec<&str> = series.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["Milk", "Brie"]);
    let milk: Vec<f64> = series[0].points.iter().map(|p| p.value).collect();
    assert_eq!(milk, vec![4.0, 6.0]);
}

#[test]
fn dimension_change_recomputes_bar_views_only() {
    let (_dir, dash) = dashboard();
    let session = dash.open_session().unwrap();
    let before = session.snapshot();

    let ack = session
        .dispatch(&ControlEvent::dimension(Dimension::Category))
        .unwrap();
    let Ack::Applied { recomputed, resets, .. } = ack else {
        panic!("dimension change was ignored");
    };
    assert!(resets.is_empty());
    assert_eq!(recomputed.len(), 2);
    assert!(recomputed.contains(&OutputId::SpaceAggregate));
    assert!(recomputed.contains(&OutputId::RevenueAggregate));

    let after = session.snapshot();
    assert!(Arc::ptr_eq(
        before.view(OutputId::TurnoverTrend).unwrap(),
        after.view(OutputId::TurnoverTrend).unwrap()
    ));

    let space = after.view(OutputId::SpaceAggregate).unwrap();
    assert_eq!(space.title, "Space Occupied per Category");
    let bars = space.bars().unwrap();
    let labels: Vec<&str> = bars.iter().map(|g| g.label()).collect();
    assert_eq!(labels, vec!["Bakery", "Dairy"]);
    assert!(close(bars[1].value, 0.75));
    // Reference line at the mean of the category totals.
    match &space.body {
        ViewBody::Bars { mean: Some(mean), .. } => assert!(close(*mean, 0.5)),
        other => panic!("expected bars with a mean line, got {other:?}"),
    }

    let revenue = after.view(OutputId::RevenueAggregate).unwrap();
    assert!(matches!(revenue.body, ViewBody::Bars { mean: None, .. }));
}

#[test]
fn rejected_events_leave_the_snapshot_untouched() {
    let (_dir, dash) = dashboard();
    let session = dash.open_session().unwrap();
    let before = session.snapshot();

    // Dairy product while Bakery is selected.
    let ack = session.dispatch(&ControlEvent::products(["Milk"])).unwrap();
    assert!(matches!(ack, Ack::Ignored { .. }));

    let ack = session.dispatch(&ControlEvent::category("Frozen")).unwrap();
    assert!(matches!(ack, Ack::Ignored { .. }));

    let ack = session
        .dispatch_raw("store-selector", ControlValue::Single("S1".into()))
        .unwrap();
    assert!(matches!(ack, Ack::Ignored { .. }));

    let ack = session
        .dispatch_raw(controls::DIMENSION, ControlValue::Single("StoreID".into()))
        .unwrap();
    assert!(matches!(ack, Ack::Ignored { .. }));

    assert!(Arc::ptr_eq(&before, &session.snapshot()));
}

#[test]
fn resubmitting_a_value_is_idempotent() {
    let (_dir, dash) = dashboard();
    let session = dash.open_session().unwrap();
    session.dispatch(&ControlEvent::category("Dairy")).unwrap();
    session.dispatch(&ControlEvent::products(["Brie"])).unwrap();
    let first = session.snapshot();

    session.dispatch(&ControlEvent::products(["Brie"])).unwrap();
    let second = session.snapshot();

    assert_eq!(second.version, first.version + 1);
    assert_eq!(first.state, second.state);
    assert_eq!(
        first.view(OutputId::TurnoverTrend),
        second.view(OutputId::TurnoverTrend)
    );

    // The held category again: no cascade, products survive.
    let ack = session.dispatch(&ControlEvent::category("Dairy")).unwrap();
    match ack {
        Ack::Applied {
            recomputed, resets, ..
        } => {
            assert!(recomputed.is_empty());
            assert!(resets.is_empty());
        }
        other => panic!("unexpected ack {other:?}"),
    }
    let third = session.snapshot();
    assert_eq!(third.state.products, vec!["Brie"]);
    assert_eq!(third.product_options, first.product_options);
    assert_eq!(
        first.view(OutputId::TurnoverTrend),
        third.view(OutputId::TurnoverTrend)
    );
}

#[test]
fn category_without_turnover_rows_renders_an_empty_trend() {
    let dir = tempfile::tempdir().unwrap();
    write_tables(&dir);
    fs::write(
        dir.path().join("Products.csv"),
        format!("{PRODUCTS}P5,Peas,Frozen\n"),
    )
    .unwrap();
    let config = Config {
        data_dir: dir.path().to_path_buf(),
        ..Config::default()
    };
    let dash = Dashboard::load(&config).unwrap();
    let session = dash.open_session().unwrap();

    session.dispatch(&ControlEvent::category("Frozen")).unwrap();
    let snap = session.snapshot();
    assert_eq!(snap.product_options, vec!["Peas"]);
    let trend = snap.view(OutputId::TurnoverTrend).unwrap();
    assert!(trend.is_empty());
    assert_eq!(trend.table.height(), 0);
    let series = trend.series().unwrap();
    assert_eq!(series.len(), 1);
    assert_eq!(series[0].name, "Frozen");
    assert!(series[0].points.is_empty());

    session.dispatch(&ControlEvent::products(["Peas"])).unwrap();
    let snap = session.snapshot();
    let trend = snap.view(OutputId::TurnoverTrend).unwrap();
    assert!(trend.is_empty());
    assert_eq!(trend.series().unwrap()[0].name, "Peas");
}

#[test]
fn wire_identifiers_dispatch_like_typed_events() {
    let (_dir, dash) = dashboard();
    let session = dash.open_session().unwrap();
    session
        .dispatch_raw(controls::CATEGORY, ControlValue::Single("Dairy".into()))
        .unwrap();
    session
        .dispatch_raw(
            controls::PRODUCTS,
            ControlValue::Multi(vec!["Milk".into()]),
        )
        .unwrap();
    let snap = session.snapshot();
    assert_eq!(snap.state.products, vec!["Milk"]);
    assert_eq!(OutputId::parse(outputs::TURNOVER_TREND), Some(OutputId::TurnoverTrend));
}

#[test]
fn heatmap_covers_top_products_by_revenue() {
    let (_dir, dash) = dashboard();
    let heatmap = dash.heatmap().unwrap();
    assert_eq!(heatmap.title, "Store × Product Units Sold (Top 3 Products)");

    let matrix = heatmap.heatmap().unwrap();
    let cols: Vec<Option<&str>> = matrix.col_keys.iter().map(|k| k.as_deref()).collect();
    assert_eq!(cols, vec![Some("Bagel"), Some("Brie"), Some("Milk")]);
    let rows: Vec<Option<&str>> = matrix.row_keys.iter().map(|k| k.as_deref()).collect();
    assert_eq!(rows, vec![Some("S1"), Some("S2")]);

    assert_eq!(matrix.cell(Some("S1"), Some("Milk")), Some(10.0));
    assert_eq!(matrix.cell(Some("S2"), Some("Milk")), Some(3.0));
    assert_eq!(matrix.cell(Some("S1"), Some("Bagel")), None);

    // Shared between sessions.
    let a = dash.open_session().unwrap().snapshot();
    let b = dash.open_session().unwrap().snapshot();
    assert!(Arc::ptr_eq(
        a.view(OutputId::Top5Heatmap).unwrap(),
        b.view(OutputId::Top5Heatmap).unwrap()
    ));
}

#[test]
fn heatmap_ranks_only_resolved_products() {
    let dir = tempfile::tempdir().unwrap();
    write_tables(&dir);
    fs::write(
        dir.path().join("StoreProductFact.csv"),
        format!("{STORE_PRODUCT}S2,P9,9999,7\n"),
    )
    .unwrap();
    let config = Config {
        data_dir: dir.path().to_path_buf(),
        top_n: 3,
        ..Config::default()
    };
    let dash = Dashboard::load(&config).unwrap();

    let heatmap = dash.heatmap().unwrap();
    let matrix = heatmap.heatmap().unwrap();
    let cols: Vec<Option<&str>> = matrix.col_keys.iter().map(|k| k.as_deref()).collect();
    assert_eq!(cols, vec![Some("Bagel"), Some("Brie"), Some("Milk")]);
    assert_eq!(matrix.cell(Some("S2"), Some("Bagel")), Some(8.0));

    // The revenue view still reports the unresolved rows.
    let snap = dash.open_session().unwrap().snapshot();
    let bars = snap.view(OutputId::RevenueAggregate).unwrap().bars().unwrap().to_vec();
    assert_eq!(bars.last().map(|g| g.label()), Some(UNKNOWN_GROUP));
    assert!(close(bars.last().unwrap().value, 10_004.0));
}

#[test]
fn kpis_compare_against_prior_year() {
    let (_dir, dash) = dashboard();
    let kpis = dash.kpis();
    assert_eq!(kpis.len(), 2);

    let revenue = &kpis[0];
    assert_eq!(revenue.metric, Metric::Revenue);
    assert!(close(revenue.current, 285.0));
    assert_eq!(revenue.delta.direction, Direction::Down);

    let turnover = &kpis[1];
    assert_eq!(turnover.metric, Metric::Turnover);
    // mean of 6, 4, 2, 3, 5, 7
    assert!(close(turnover.current, 4.5));
    assert_eq!(turnover.delta.direction, Direction::Up);
}

#[test]
fn sessions_are_isolated() {
    let (_dir, dash) = dashboard();
    let a = dash.open_session().unwrap();
    let b = dash.open_session().unwrap();
    assert_ne!(a.id(), b.id());

    a.dispatch(&ControlEvent::category("Dairy")).unwrap();
    assert_eq!(a.snapshot().state.category, "Dairy");
    assert_eq!(b.snapshot().state.category, "Bakery");
    assert_eq!(b.snapshot().version, 0);
}

#[test]
fn concurrent_events_are_serialized_per_session() {
    let (_dir, dash) = dashboard();
    let session = Arc::new(dash.open_session().unwrap());

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let session = Arc::clone(&session);
            thread::spawn(move || {
                let category = if i % 2 == 0 { "Dairy" } else { "Bakery" };
                session.dispatch(&ControlEvent::category(category)).unwrap();
                // Readers never observe products outside the category.
                let snap = session.snapshot();
                for product in &snap.state.products {
                    assert!(snap.product_options.contains(product));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let snap = session.snapshot();
    assert_eq!(snap.version, 8);
    let trend = snap.view(OutputId::TurnoverTrend).unwrap();
    assert_eq!(trend.series().unwrap()[0].name, snap.state.category);
}

#[test]
fn session_ids_are_unique() {
    assert_ne!(SessionId::new(), SessionId::new());
}
