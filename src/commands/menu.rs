use rusqlite::{Connection, OptionalExtension, Row};
use rust_decimal::Decimal;

use crate::db::Database;
use crate::error::{PosError, PosResult};
use crate::models::{MenuItem, NewMenuItem};
use crate::money::{from_cents, to_cents};

const MENU_COLUMNS: &str = "id, name, price, category, available";

fn map_menu_item(row: &Row<'_>) -> rusqlite::Result<MenuItem> {
    Ok(MenuItem {
        id: row.get(0)?,
        name: row.get(1)?,
        price: from_cents(row.get(2)?),
        category: row.get(3)?,
        available: row.get(4)?,
    })
}

fn validate_price(price: Decimal) -> PosResult<i64> {
    if price < Decimal::ZERO {
        return Err(PosError::invalid(format!(
            "price must be non-negative, got {}",
            price
        )));
    }
    to_cents(price)
}

pub fn create_menu_item(db: &Database, item: NewMenuItem) -> PosResult<MenuItem> {
    let name = item.name.trim();
    if name.is_empty() {
        return Err(PosError::invalid("menu item name must not be empty"));
    }
    let price_cents = validate_price(item.price)?;

    let conn = db.conn()?;
    conn.execute(
        "INSERT INTO menu_items (name, price, category, available) VALUES (?1, ?2, ?3, 1)",
        rusqlite::params![name, price_cents, item.category],
    )?;

    load_menu_item(&conn, conn.last_insert_rowid())
}

pub fn get_menu_item(db: &Database, id: i64) -> PosResult<MenuItem> {
    let conn = db.conn()?;
    load_menu_item(&conn, id)
}

pub(crate) fn load_menu_item(conn: &Connection, id: i64) -> PosResult<MenuItem> {
    conn.query_row(
        &format!("SELECT {} FROM menu_items WHERE id = ?1", MENU_COLUMNS),
        [id],
        map_menu_item,
    )
    .optional()?
    .ok_or_else(|| PosError::not_found("Menu item", id))
}

/// Current catalogue price of a menu item
pub fn get_menu_item_price(db: &Database, id: i64) -> PosResult<Decimal> {
    Ok(get_menu_item(db, id)?.price)
}

pub fn list_menu_items(db: &Database, available_only: bool) -> PosResult<Vec<MenuItem>> {
    let conn = db.conn()?;

    let sql = if available_only {
        format!(
            "SELECT {} FROM menu_items WHERE available = 1 ORDER BY category, name",
            MENU_COLUMNS
        )
    } else {
        format!("SELECT {} FROM menu_items ORDER BY category, name", MENU_COLUMNS)
    };

    let mut stmt = conn.prepare(&sql)?;
    let items = stmt
        .query_map([], map_menu_item)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(items)
}

/// Change the catalogue price. Lines already on orders keep their captured price.
pub fn update_menu_item_price(db: &Database, id: i64, price: Decimal) -> PosResult<MenuItem> {
    let price_cents = validate_price(price)?;

    let conn = db.conn()?;
    let changed = conn.execute(
        "UPDATE menu_items SET price = ?1 WHERE id = ?2",
        rusqlite::params![price_cents, id],
    )?;
    if changed == 0 {
        return Err(PosError::not_found("Menu item", id));
    }

    load_menu_item(&conn, id)
}

pub fn set_menu_item_availability(db: &Database, id: i64, available: bool) -> PosResult<MenuItem> {
    let conn = db.conn()?;
    let changed = conn.execute(
        "UPDATE menu_items SET available = ?1 WHERE id = ?2",
        rusqlite::params![available, id],
    )?;
    if changed == 0 {
        return Err(PosError::not_found("Menu item", id));
    }

    load_menu_item(&conn, id)
}
