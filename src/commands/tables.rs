use chrono::Local;
use rusqlite::{Connection, OptionalExtension, Row};

use crate::commands::staff::Session;
use crate::db::Database;
use crate::error::{PosError, PosResult};
use crate::models::{Table, TableStatus};

fn map_table(row: &Row<'_>) -> rusqlite::Result<Table> {
    Ok(Table {
        id: row.get(0)?,
        name: row.get(1)?,
        status: row.get(2)?,
    })
}

pub fn create_table(db: &Database, name: &str) -> PosResult<Table> {
    let name = name.trim();
    if name.is_empty() {
        return Err(PosError::invalid("table name must not be empty"));
    }

    let conn = db.conn()?;
    conn.execute(
        "INSERT INTO tables (name, status) VALUES (?1, ?2)",
        rusqlite::params![name, TableStatus::Available],
    )?;

    Ok(Table {
        id: conn.last_insert_rowid(),
        name: name.to_string(),
        status: TableStatus::Available,
    })
}

pub fn get_table(db: &Database, id: i64) -> PosResult<Table> {
    let conn = db.conn()?;
    load_table(&conn, id)
}

pub(crate) fn load_table(conn: &Connection, id: i64) -> PosResult<Table> {
    conn.query_row(
        "SELECT id, name, status FROM tables WHERE id = ?1",
        [id],
        map_table,
    )
    .optional()?
    .ok_or_else(|| PosError::not_found("Table", id))
}

pub fn list_tables(db: &Database) -> PosResult<Vec<Table>> {
    let conn = db.conn()?;

    let mut stmt = conn.prepare("SELECT id, name, status FROM tables ORDER BY id")?;
    let tables = stmt
        .query_map([], map_table)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(tables)
}

pub fn set_table_status(db: &Database, id: i64, status: TableStatus) -> PosResult<Table> {
    let conn = db.conn()?;
    update_status(&conn, id, status)?;
    load_table(&conn, id)
}

pub(crate) fn update_status(conn: &Connection, id: i64, status: TableStatus) -> PosResult<()> {
    let changed = conn.execute(
        "UPDATE tables SET status = ?1 WHERE id = ?2",
        rusqlite::params![status, id],
    )?;
    if changed == 0 {
        return Err(PosError::not_found("Table", id));
    }
    Ok(())
}

/// Hard-delete a table together with its order history. Refused while the
/// table has orders from today.
pub fn delete_table(db: &Database, session: &Session, id: i64) -> PosResult<()> {
    session.require_manager("delete tables")?;

    let today = Local::now().date_naive();

    db.with_transaction(|tx| {
        load_table(tx, id)?;

        let today_orders: i64 = tx.query_row(
            "SELECT COUNT(*) FROM orders WHERE table_id = ?1 AND date(created_at) = ?2",
            rusqlite::params![id, today],
            |row| row.get(0),
        )?;
        if today_orders > 0 {
            return Err(PosError::invalid(format!(
                "table {} has {} order(s) today and cannot be deleted",
                id, today_orders
            )));
        }

        tx.execute(
            "DELETE FROM order_items WHERE order_id IN (SELECT id FROM orders WHERE table_id = ?1)",
            [id],
        )?;
        tx.execute(
            "DELETE FROM payments WHERE order_id IN (SELECT id FROM orders WHERE table_id = ?1)",
            [id],
        )?;
        let orders = tx.execute("DELETE FROM orders WHERE table_id = ?1", [id])?;
        tx.execute("DELETE FROM tables WHERE id = ?1", [id])?;

        tracing::info!(table_id = id, orders, staff = %session.username, "table deleted");
        Ok(())
    })
}
