use std::path::Path;
use std::time::Duration;

use rusqlite::{Connection, Transaction, TransactionBehavior};

use crate::config::{BillingConfig, DatabaseConfig, PosConfig};
use crate::error::{PosResult, StorageError};
use crate::pool::{ConnectionPool, PooledConnection};

pub struct Database {
    pool: ConnectionPool,
    billing: BillingConfig,
}

impl Database {
    pub fn open(config: &PosConfig) -> PosResult<Self> {
        let db_config = config.database.clone();

        // every in-memory connection is its own database, so share exactly one
        let size = if db_config.is_in_memory() {
            1
        } else {
            create_parent_dir(&db_config.path)?;
            db_config.max_connections
        };

        let pool = ConnectionPool::build(
            size,
            Duration::from_secs(db_config.checkout_timeout_seconds),
            || open_connection(&db_config),
        )?;

        tracing::info!(path = %db_config.path.display(), connections = pool.size(), "database opened");

        Ok(Database {
            pool,
            billing: config.billing.clone(),
        })
    }

    pub fn open_in_memory() -> PosResult<Self> {
        Self::open(&PosConfig {
            database: DatabaseConfig::in_memory(),
            ..Default::default()
        })
    }

    pub fn with_billing(mut self, billing: BillingConfig) -> Self {
        self.billing = billing;
        self
    }

    pub fn billing(&self) -> &BillingConfig {
        &self.billing
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    pub fn conn(&self) -> PosResult<PooledConnection<'_>> {
        Ok(self.pool.get()?)
    }

    /// Run `f` inside an IMMEDIATE transaction. Commits when `f` returns `Ok`;
    /// any error (or panic) drops the transaction, which rolls it back.
    pub fn with_transaction<T, F>(&self, f: F) -> PosResult<T>
    where
        F: FnOnce(&Transaction<'_>) -> PosResult<T>,
    {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    pub fn initialize(&self) -> PosResult<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            "
            -- Dining tables
            CREATE TABLE IF NOT EXISTS tables (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                status TEXT NOT NULL DEFAULT 'available'
            );

            -- Menu catalogue, prices in cents
            CREATE TABLE IF NOT EXISTS menu_items (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                price INTEGER NOT NULL,
                category TEXT NOT NULL DEFAULT 'Other',
                available INTEGER NOT NULL DEFAULT 1
            );

            -- Staff members
            CREATE TABLE IF NOT EXISTS staff (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT NOT NULL UNIQUE,
                display_name TEXT NOT NULL,
                password_hash TEXT NOT NULL,
                role TEXT NOT NULL,
                created_at DATETIME NOT NULL
            );

            -- Orders
            CREATE TABLE IF NOT EXISTS orders (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                table_id INTEGER NOT NULL,
                created_at DATETIME NOT NULL,
                completed_at DATETIME,
                status TEXT NOT NULL DEFAULT 'pending',
                total_amount INTEGER NOT NULL DEFAULT 0,
                discount_percent INTEGER NOT NULL DEFAULT 0,
                notes TEXT,
                FOREIGN KEY (table_id) REFERENCES tables(id)
            );

            CREATE UNIQUE INDEX IF NOT EXISTS idx_orders_pending_table
                ON orders(table_id) WHERE status = 'pending';
            CREATE INDEX IF NOT EXISTS idx_orders_created_at ON orders(created_at);

            -- Order line items, one row per (order, menu item)
            CREATE TABLE IF NOT EXISTS order_items (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                order_id INTEGER NOT NULL,
                menu_item_id INTEGER NOT NULL,
                quantity INTEGER NOT NULL CHECK (quantity >= 1),
                unit_price INTEGER NOT NULL,
                UNIQUE (order_id, menu_item_id),
                FOREIGN KEY (order_id) REFERENCES orders(id),
                FOREIGN KEY (menu_item_id) REFERENCES menu_items(id)
            );

            -- Payments, one per completed order
            CREATE TABLE IF NOT EXISTS payments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                order_id INTEGER NOT NULL UNIQUE,
                amount INTEGER NOT NULL,
                method TEXT NOT NULL,
                paid_at DATETIME NOT NULL,
                FOREIGN KEY (order_id) REFERENCES orders(id)
            );

            CREATE INDEX IF NOT EXISTS idx_payments_paid_at ON payments(paid_at);

            -- Daily revenue rollup
            CREATE TABLE IF NOT EXISTS revenue (
                date DATE PRIMARY KEY,
                total_amount INTEGER NOT NULL DEFAULT 0,
                order_count INTEGER NOT NULL DEFAULT 0,
                updated_at DATETIME NOT NULL
            );
            ",
        )?;

        Self::migrate_conn(&conn)?;

        tracing::debug!("schema initialized");
        Ok(())
    }

    fn migrate_conn(conn: &Connection) -> PosResult<()> {
        let columns: Vec<String> = conn
            .prepare("PRAGMA table_info(orders)")?
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<Result<_, _>>()?;

        if !columns.iter().any(|c| c == "discount_percent") {
            conn.execute(
                "ALTER TABLE orders ADD COLUMN discount_percent INTEGER NOT NULL DEFAULT 0",
                [],
            )?;
        }
        if !columns.iter().any(|c| c == "notes") {
            conn.execute("ALTER TABLE orders ADD COLUMN notes TEXT", [])?;
        }

        Ok(())
    }
}

fn create_parent_dir(path: &Path) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

fn open_connection(config: &DatabaseConfig) -> Result<Connection, StorageError> {
    let conn = if config.is_in_memory() {
        Connection::open_in_memory()?
    } else {
        Connection::open(&config.path)?
    };

    conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    if !config.is_in_memory() {
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;
    }

    Ok(conn)
}
