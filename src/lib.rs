pub mod commands;
pub mod config;
pub mod db;
pub mod error;
pub mod logger;
pub mod models;
pub mod money;
pub mod pool;


use anyhow::Context;
use chrono::Local;

pub use config::PosConfig;
pub use db::Database;
pub use error::{PosError, PosResult, StorageError};

/// Load configuration, prepare the database and print today's dashboard.
pub fn run() -> anyhow::Result<()> {
    let config = PosConfig::load().context("failed to load configuration")?;
    logger::init_logger(&config.log.level);

    let db = Database::open(&config).context("failed to open database")?;
    db.initialize().context("failed to initialize database")?;

    let today = Local::now().date_naive();
    let summary = commands::revenue::dashboard_summary(&db, today)?;

    tracing::info!(
        date = %today,
        revenue = %money::format_currency(
            summary.today.amount,
            &config.billing.currency_symbol,
            config.billing.currency_decimals,
        ),
        orders = summary.today.order_count,
        "today's takings"
    );
    println!("{}", serde_json::to_string_pretty(&summary)?);

    Ok(())
}
