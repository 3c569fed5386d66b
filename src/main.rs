use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use retail_pulse::aggregation::PivotMatrix;
use retail_pulse::schema::UNKNOWN_GROUP;
use retail_pulse::views::ViewBody;
use retail_pulse::{Ack, Config, ControlEvent, Dashboard, DerivedView, Dimension};

/// Render the retail dashboard views for one selector state.
#[derive(Parser)]
#[command(name = "retail-pulse")]
#[command(version)]
struct Cli {
    /// TOML config file
    #[arg(long, short = 'c', env = "RETAIL_PULSE_CONFIG")]
    config: Option<PathBuf>,

    /// Directory holding the table CSVs (overrides the config)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Grouping dimension: ProductName or Category
    #[arg(long, short = 'd')]
    dimension: Option<String>,

    /// Category for the turnover trend
    #[arg(long)]
    category: Option<String>,

    /// Comma-separated product names within the category
    #[arg(long, value_delimiter = ',')]
    products: Vec<String>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("retail_pulse=info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load(path).with_context(|| format!("reading config {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }

    let dashboard = Dashboard::load(&config)
        .with_context(|| format!("loading dataset from {}", config.data_dir.display()))?;
    let session = dashboard.open_session()?;

    // Replay the requested selections as events, in control order.
    let mut events = Vec::new();
    if let Some(dimension) = &cli.dimension {
        let dimension: Dimension = dimension.parse()?;
        events.push(ControlEvent::dimension(dimension));
    }
    if let Some(category) = cli.category {
        events.push(ControlEvent::category(category));
    }
    if !cli.products.is_empty() {
        events.push(ControlEvent::products(cli.products));
    }
    for event in &events {
        if let Ack::Ignored { reason } = session.dispatch(event)? {
            anyhow::bail!("{reason}");
        }
    }

    let snapshot = session.snapshot();
    info!(session = %session.id(), version = snapshot.version, "rendering");

    println!("== KPIs ==");
    for kpi in dashboard.kpis() {
        println!(
            "{:<24} {:>14}  {:>8}  ({})",
            kpi.metric.title(),
            kpi.label,
            kpi.percent_label(),
            kpi.metric.caption()
        );
    }
    println!();
    println!("category: {}", snapshot.state.category);
    println!("products: [{}]", snapshot.state.products.join(", "));
    println!("options:  [{}]", snapshot.product_options.join(", "));

    for view in snapshot.views() {
        println!();
        print_view(view);
    }
    Ok(())
}

fn print_view(view: &DerivedView) {
    println!("== {} ==", view.title);
    println!("   x: {}  y: {}", view.x_label, view.y_label);
    if view.is_empty() {
        println!("   (no data)");
        return;
    }
    match &view.body {
        ViewBody::Bars { groups, mean } => {
            for group in groups {
                println!("   {:<28} {:>14.2}", group.label(), group.value);
            }
            if let Some(mean) = mean {
                println!("   {:<28} {:>14.2}", "(mean)", mean);
            }
        }
        ViewBody::Trend(series) => {
            for s in series {
                println!("   {}", s.name);
                for point in &s.points {
                    println!("     {:<12} {:>8.3}", point.month, point.value);
                }
            }
        }
        ViewBody::Heatmap(matrix) => print_matrix(matrix),
    }
}

fn print_matrix(matrix: &PivotMatrix) {
    let label = |key: &Option<String>| key.as_deref().unwrap_or(UNKNOWN_GROUP).to_string();
    let header: Vec<String> = matrix.col_keys.iter().map(|k| format!("{:>12}", label(k))).collect();
    println!("   {:<10}{}", "", header.join(""));
    for (key, row) in matrix.row_keys.iter().zip(matrix.rows()) {
        let cells: Vec<String> = row
            .iter()
            .map(|cell| match cell {
                Some(v) => format!("{v:>12.0}"),
                None => format!("{:>12}", "-"),
            })
            .collect();
        println!("   {:<10}{}", label(key), cells.join(""));
    }
}
