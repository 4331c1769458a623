//! Order lifecycle: open an order on a table, add and adjust line items, then
//! complete (pay) or cancel it.
//!
//! ```text
//! pending --complete--> completed   (payment recorded, table released, rollup += total)
//! pending --cancel----> cancelled   (table released)
//! ```
//!
//! Every mutation runs in an IMMEDIATE transaction, and the terminal
//! transitions are guarded on `status = 'pending'`, so two racing completions
//! of the same order cannot both succeed.

use chrono::{Local, NaiveDate, NaiveDateTime};
use rusqlite::{Connection, OptionalExtension, Row};
use rust_decimal::Decimal;

use crate::commands::{menu, revenue, tables};
use crate::db::Database;
use crate::error::{PosError, PosResult};
use crate::models::{
    Order, OrderAction, OrderItem, OrderStatus, OrderWithItems, Payment, PaymentMethod,
    TableStatus,
};
use crate::money::{from_cents, to_cents, validate_percent, BillBreakdown};

const ORDER_SELECT: &str =
    "SELECT o.id, o.table_id, t.name, o.created_at, o.completed_at, o.status, o.total_amount, o.discount_percent, o.notes
     FROM orders o
     LEFT JOIN tables t ON o.table_id = t.id";

const ITEM_SELECT: &str =
    "SELECT oi.id, oi.order_id, oi.menu_item_id, m.name, oi.quantity, oi.unit_price
     FROM order_items oi
     LEFT JOIN menu_items m ON oi.menu_item_id = m.id";

fn map_order(row: &Row<'_>) -> rusqlite::Result<Order> {
    Ok(Order {
        id: row.get(0)?,
        table_id: row.get(1)?,
        table_name: row.get(2)?,
        created_at: row.get(3)?,
        completed_at: row.get(4)?,
        status: row.get(5)?,
        total_amount: from_cents(row.get(6)?),
        discount_percent: from_cents(row.get(7)?),
        notes: row.get(8)?,
    })
}

fn map_item(row: &Row<'_>) -> rusqlite::Result<OrderItem> {
    Ok(OrderItem {
        id: row.get(0)?,
        order_id: row.get(1)?,
        menu_item_id: row.get(2)?,
        menu_item_name: row.get(3)?,
        quantity: row.get(4)?,
        unit_price: from_cents(row.get(5)?),
    })
}

fn load_order(conn: &Connection, order_id: i64) -> PosResult<Order> {
    conn.query_row(
        &format!("{} WHERE o.id = ?1", ORDER_SELECT),
        [order_id],
        map_order,
    )
    .optional()?
    .ok_or(PosError::OrderNotFound(order_id))
}

fn load_items(conn: &Connection, order_id: i64) -> PosResult<Vec<OrderItem>> {
    let mut stmt = conn.prepare(&format!(
        "{} WHERE oi.order_id = ?1 ORDER BY oi.id",
        ITEM_SELECT
    ))?;
    let items = stmt
        .query_map([order_id], map_item)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(items)
}

fn load_item(conn: &Connection, order_item_id: i64) -> PosResult<Option<OrderItem>> {
    Ok(conn
        .query_row(
            &format!("{} WHERE oi.id = ?1", ITEM_SELECT),
            [order_item_id],
            map_item,
        )
        .optional()?)
}

fn order_status(conn: &Connection, order_id: i64) -> PosResult<OrderStatus> {
    conn.query_row(
        "SELECT status FROM orders WHERE id = ?1",
        [order_id],
        |row| row.get(0),
    )
    .optional()?
    .ok_or(PosError::OrderNotFound(order_id))
}

/// Fail unless the order exists and is still pending.
fn ensure_pending(conn: &Connection, order_id: i64) -> PosResult<()> {
    let status = order_status(conn, order_id)?;
    if status.is_terminal() {
        tracing::warn!(order_id, %status, "order is finalized");
        return Err(PosError::AlreadyFinalized {
            id: order_id,
            status,
        });
    }
    Ok(())
}

fn subtotal_cents(conn: &Connection, order_id: i64) -> PosResult<i64> {
    let cents: i64 = conn.query_row(
        "SELECT COALESCE(SUM(quantity * unit_price), 0) FROM order_items WHERE order_id = ?1",
        [order_id],
        |row| row.get(0),
    )?;
    Ok(cents)
}

fn with_items(conn: &Connection, order: Order) -> PosResult<OrderWithItems> {
    let items = load_items(conn, order.id)?;
    Ok(OrderWithItems { order, items })
}

/// Open a new pending order on a table and mark the table occupied.
pub fn create_empty_order(db: &Database, table_id: i64) -> PosResult<i64> {
    let created_at = Local::now().naive_local();

    let order_id = db.with_transaction(|tx| {
        if let Some(existing) = pending_order_id(tx, table_id)? {
            return Err(PosError::invalid(format!(
                "table {} already has pending order {}",
                table_id, existing
            )));
        }

        let table_status: Option<TableStatus> = tx
            .query_row(
                "SELECT status FROM tables WHERE id = ?1",
                [table_id],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(status) = table_status {
            if !status.can_seat() {
                return Err(PosError::invalid(format!(
                    "table {} is {} and cannot take orders",
                    table_id, status
                )));
            }
        }

        // an unknown table id fails here on the foreign key
        tx.execute(
            "INSERT INTO orders (table_id, created_at, status, total_amount) VALUES (?1, ?2, ?3, 0)",
            rusqlite::params![table_id, created_at, OrderStatus::Pending],
        )?;
        let order_id = tx.last_insert_rowid();

        tables::update_status(tx, table_id, TableStatus::Occupied)?;
        Ok(order_id)
    })?;

    tracing::info!(order_id, table_id, "order opened");
    Ok(order_id)
}

fn pending_order_id(conn: &Connection, table_id: i64) -> PosResult<Option<i64>> {
    Ok(conn
        .query_row(
            "SELECT id FROM orders WHERE table_id = ?1 AND status = ?2
             ORDER BY created_at DESC, id DESC LIMIT 1",
            rusqlite::params![table_id, OrderStatus::Pending],
            |row| row.get(0),
        )
        .optional()?)
}

/// Most recent pending order of a table, if any
pub fn find_pending_order_for_table(db: &Database, table_id: i64) -> PosResult<Option<Order>> {
    let conn = db.conn()?;
    match pending_order_id(&conn, table_id)? {
        Some(order_id) => Ok(Some(load_order(&conn, order_id)?)),
        None => Ok(None),
    }
}

/// Add `quantity` of a menu item. The first add captures the current menu
/// price; adding the same item again only raises the quantity.
pub fn add_line_item(
    db: &Database,
    order_id: i64,
    menu_item_id: i64,
    quantity: i32,
) -> PosResult<OrderItem> {
    if quantity <= 0 {
        return Err(PosError::invalid(format!(
            "quantity must be positive, got {}",
            quantity
        )));
    }

    let item = db.with_transaction(|tx| {
        ensure_pending(tx, order_id)?;

        let menu_item = menu::load_menu_item(tx, menu_item_id)?;
        if !menu_item.available {
            return Err(PosError::invalid(format!(
                "{} is not available",
                menu_item.name
            )));
        }
        let unit_price = to_cents(menu_item.price)?;

        let current: Option<i64> = tx
            .query_row(
                "SELECT quantity FROM order_items WHERE order_id = ?1 AND menu_item_id = ?2",
                rusqlite::params![order_id, menu_item_id],
                |row| row.get(0),
            )
            .optional()?;
        let merged = current.unwrap_or(0) + i64::from(quantity);
        if merged > i64::from(i32::MAX) {
            return Err(PosError::invalid(format!(
                "line quantity would reach {}, above the maximum of {}",
                merged,
                i32::MAX
            )));
        }

        let item_id: i64 = tx.query_row(
            "INSERT INTO order_items (order_id, menu_item_id, quantity, unit_price) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(order_id, menu_item_id) DO UPDATE SET quantity = quantity + excluded.quantity
             RETURNING id",
            rusqlite::params![order_id, menu_item_id, quantity, unit_price],
            |row| row.get(0),
        )?;

        load_item(tx, item_id)?.ok_or_else(|| PosError::not_found("Order item", item_id))
    })?;

    tracing::debug!(order_id, menu_item_id, quantity, line_quantity = item.quantity, "line item added");
    Ok(item)
}

/// Delete a line. Returns `false` if it did not exist.
pub fn remove_line_item(db: &Database, order_item_id: i64) -> PosResult<bool> {
    let removed = db.with_transaction(|tx| {
        let Some(item) = load_item(tx, order_item_id)? else {
            return Ok(false);
        };
        ensure_pending(tx, item.order_id)?;

        tx.execute("DELETE FROM order_items WHERE id = ?1", [order_item_id])?;
        Ok(true)
    })?;

    if removed {
        tracing::debug!(order_item_id, "line item removed");
    }
    Ok(removed)
}

/// Set a line's quantity. Zero or less removes the line and returns `None`.
pub fn update_line_item_quantity(
    db: &Database,
    order_item_id: i64,
    new_quantity: i32,
) -> PosResult<Option<OrderItem>> {
    db.with_transaction(|tx| {
        let item = load_item(tx, order_item_id)?
            .ok_or_else(|| PosError::not_found("Order item", order_item_id))?;
        ensure_pending(tx, item.order_id)?;

        if new_quantity <= 0 {
            tx.execute("DELETE FROM order_items WHERE id = ?1", [order_item_id])?;
            tracing::debug!(order_item_id, "line item removed by zero quantity");
            return Ok(None);
        }

        tx.execute(
            "UPDATE order_items SET quantity = ?1 WHERE id = ?2",
            rusqlite::params![new_quantity, order_item_id],
        )?;
        Ok(Some(OrderItem {
            quantity: new_quantity,
            ..item
        }))
    })
}

/// Sum of quantity × captured price over the order's current lines.
pub fn compute_total(db: &Database, order_id: i64) -> PosResult<Decimal> {
    let conn = db.conn()?;
    order_status(&conn, order_id)?;
    Ok(from_cents(subtotal_cents(&conn, order_id)?))
}

pub fn set_discount(db: &Database, order_id: i64, percent: Decimal) -> PosResult<Order> {
    validate_percent(percent, "discount")?;
    let stored = to_cents(percent)?;

    db.with_transaction(|tx| {
        ensure_pending(tx, order_id)?;
        tx.execute(
            "UPDATE orders SET discount_percent = ?1 WHERE id = ?2",
            rusqlite::params![stored, order_id],
        )?;
        load_order(tx, order_id)
    })
}

pub fn update_notes(db: &Database, order_id: i64, notes: Option<String>) -> PosResult<Order> {
    db.with_transaction(|tx| {
        ensure_pending(tx, order_id)?;
        tx.execute(
            "UPDATE orders SET notes = ?1 WHERE id = ?2",
            rusqlite::params![notes, order_id],
        )?;
        load_order(tx, order_id)
    })
}

/// The bill the order would be charged right now.
pub fn preview_bill(db: &Database, order_id: i64) -> PosResult<BillBreakdown> {
    let conn = db.conn()?;
    let order = load_order(&conn, order_id)?;
    let subtotal = from_cents(subtotal_cents(&conn, order_id)?);
    Ok(bill_for(db, subtotal, order.discount_percent))
}

fn bill_for(db: &Database, subtotal: Decimal, discount_percent: Decimal) -> BillBreakdown {
    let billing = db.billing();
    BillBreakdown::compute(
        subtotal,
        discount_percent,
        billing.service_charge_percent,
        billing.vat_percent,
    )
}

/// Move a pending order into its terminal state. Returns the order's table.
fn finalize(
    conn: &Connection,
    order_id: i64,
    action: OrderAction,
    completed_at: NaiveDateTime,
    total_cents: i64,
) -> PosResult<i64> {
    let current = order_status(conn, order_id)?;
    let target = current
        .apply(action)
        .ok_or(PosError::AlreadyFinalized {
            id: order_id,
            status: current,
        })?;

    let changed = conn.execute(
        "UPDATE orders SET status = ?1, completed_at = ?2, total_amount = ?3
         WHERE id = ?4 AND status = ?5",
        rusqlite::params![target, completed_at, total_cents, order_id, OrderStatus::Pending],
    )?;
    if changed != 1 {
        let status = order_status(conn, order_id)?;
        return Err(PosError::AlreadyFinalized { id: order_id, status });
    }

    let table_id: i64 = conn.query_row(
        "SELECT table_id FROM orders WHERE id = ?1",
        [order_id],
        |row| row.get(0),
    )?;
    Ok(table_id)
}

/// Charge the order: mark it completed, record the payment, release the
/// table and add the amount to today's rollup, all in one transaction.
pub fn complete_order(db: &Database, order_id: i64, method: PaymentMethod) -> PosResult<Payment> {
    let paid_at = Local::now().naive_local();
    let release_as = db.billing().release_table_as;

    let result = db.with_transaction(|tx| {
        let order = load_order(tx, order_id)?;
        let subtotal = from_cents(subtotal_cents(tx, order_id)?);
        let bill = bill_for(db, subtotal, order.discount_percent);
        let amount_cents = to_cents(bill.total)?;

        let table_id = finalize(tx, order_id, OrderAction::Complete, paid_at, amount_cents)?;

        tx.execute(
            "INSERT INTO payments (order_id, amount, method, paid_at) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![order_id, amount_cents, method, paid_at],
        )?;
        let payment_id = tx.last_insert_rowid();

        tables::update_status(tx, table_id, release_as)?;
        revenue::accumulate(tx, amount_cents, paid_at.date(), paid_at)?;

        Ok(Payment {
            id: payment_id,
            order_id,
            amount: bill.total,
            method,
            paid_at,
        })
    });

    match &result {
        Ok(payment) => tracing::info!(order_id, amount = %payment.amount, %method, "order completed"),
        Err(e) => tracing::warn!(order_id, error = %e, "order completion failed"),
    }
    result
}

/// Cancel a pending order and release its table. No payment, no revenue.
pub fn cancel_order(db: &Database, order_id: i64) -> PosResult<()> {
    let cancelled_at = Local::now().naive_local();
    let release_as = db.billing().release_table_as;

    let result = db.with_transaction(|tx| {
        let table_id = finalize(tx, order_id, OrderAction::Cancel, cancelled_at, 0)?;
        tables::update_status(tx, table_id, release_as)?;
        Ok(())
    });

    match &result {
        Ok(()) => tracing::info!(order_id, "order cancelled"),
        Err(e) => tracing::warn!(order_id, error = %e, "order cancellation failed"),
    }
    result
}

pub fn get_payment_for_order(db: &Database, order_id: i64) -> PosResult<Option<Payment>> {
    let conn = db.conn()?;
    Ok(conn
        .query_row(
            "SELECT id, order_id, amount, method, paid_at FROM payments WHERE order_id = ?1",
            [order_id],
            |row| {
                Ok(Payment {
                    id: row.get(0)?,
                    order_id: row.get(1)?,
                    amount: from_cents(row.get(2)?),
                    method: row.get(3)?,
                    paid_at: row.get(4)?,
                })
            },
        )
        .optional()?)
}

pub fn get_order(db: &Database, order_id: i64) -> PosResult<OrderWithItems> {
    let conn = db.conn()?;
    let order = load_order(&conn, order_id)?;
    with_items(&conn, order)
}

pub fn list_open_orders(db: &Database) -> PosResult<Vec<OrderWithItems>> {
    let conn = db.conn()?;

    let mut stmt = conn.prepare(&format!(
        "{} WHERE o.status = ?1 ORDER BY o.table_id ASC",
        ORDER_SELECT
    ))?;
    let orders = stmt
        .query_map([OrderStatus::Pending], map_order)?
        .collect::<Result<Vec<_>, _>>()?;

    orders
        .into_iter()
        .map(|order| with_items(&conn, order))
        .collect()
}

/// Orders opened on `date`, newest first
pub fn list_orders_for_date(db: &Database, date: NaiveDate) -> PosResult<Vec<OrderWithItems>> {
    let conn = db.conn()?;

    let mut stmt = conn.prepare(&format!(
        "{} WHERE date(o.created_at) = ?1 ORDER BY o.created_at DESC, o.id DESC",
        ORDER_SELECT
    ))?;
    let orders = stmt
        .query_map([date], map_order)?
        .collect::<Result<Vec<_>, _>>()?;

    orders
        .into_iter()
        .map(|order| with_items(&conn, order))
        .collect()
}
