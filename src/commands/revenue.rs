//! Daily revenue rollup and the reporting views built on it.
//!
//! The rollup is incremented by a single upsert statement so concurrent
//! payments on the same day are never lost. Series always cover every bucket
//! in range, with zero for buckets that saw no payments.

use std::collections::HashMap;

use chrono::{Datelike, Local, NaiveDate, NaiveDateTime, TimeDelta};
use rusqlite::Connection;
use rust_decimal::Decimal;

use crate::db::Database;
use crate::error::{PosError, PosResult};
use crate::models::{
    CategoryRevenue, DailyRevenue, DailyTotal, DashboardSummary, Granularity, MethodTotal,
    OrderStatus, PaymentMethod, SeriesPoint, TopItem,
};
use crate::money::{from_cents, to_cents};

pub use crate::money::growth_percentage;

/// Add one payment to the rollup row for `date`, creating it if needed.
pub(crate) fn accumulate(
    conn: &Connection,
    amount_cents: i64,
    date: NaiveDate,
    now: NaiveDateTime,
) -> PosResult<()> {
    conn.execute(
        "INSERT INTO revenue (date, total_amount, order_count, updated_at) VALUES (?1, ?2, 1, ?3)
         ON CONFLICT(date) DO UPDATE SET
             total_amount = total_amount + excluded.total_amount,
             order_count = order_count + 1,
             updated_at = excluded.updated_at",
        rusqlite::params![date, amount_cents, now],
    )?;
    Ok(())
}

pub fn record_payment(db: &Database, amount: Decimal, date: NaiveDate) -> PosResult<()> {
    if amount < Decimal::ZERO {
        return Err(PosError::invalid(format!(
            "payment amount must be non-negative, got {}",
            amount
        )));
    }
    let cents = to_cents(amount)?;

    let conn = db.conn()?;
    accumulate(&conn, cents, date, Local::now().naive_local())?;

    tracing::debug!(%date, %amount, "payment recorded in rollup");
    Ok(())
}

pub fn get_daily_total(db: &Database, date: NaiveDate) -> PosResult<DailyTotal> {
    let conn = db.conn()?;

    let (cents, order_count): (i64, i64) = conn.query_row(
        "SELECT COALESCE(SUM(total_amount), 0), COALESCE(SUM(order_count), 0) FROM revenue WHERE date = ?1",
        [date],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;

    Ok(DailyTotal {
        amount: from_cents(cents),
        order_count,
    })
}

/// Sum of the rollup over `from..=to`
pub fn get_range_total(db: &Database, from: NaiveDate, to: NaiveDate) -> PosResult<Decimal> {
    if from > to {
        return Ok(Decimal::ZERO);
    }

    let conn = db.conn()?;
    let cents: i64 = conn.query_row(
        "SELECT COALESCE(SUM(total_amount), 0) FROM revenue WHERE date BETWEEN ?1 AND ?2",
        [from, to],
        |row| row.get(0),
    )?;

    Ok(from_cents(cents))
}

/// Most recent rollup rows first
pub fn get_revenue_history(db: &Database, limit: Option<u32>) -> PosResult<Vec<DailyRevenue>> {
    let conn = db.conn()?;
    let limit = limit.unwrap_or(30);

    let mut stmt = conn.prepare(
        "SELECT date, total_amount, order_count, updated_at
         FROM revenue
         ORDER BY date DESC
         LIMIT ?1",
    )?;

    let rows = stmt
        .query_map([limit], |row| {
            Ok(DailyRevenue {
                date: row.get(0)?,
                total_amount: from_cents(row.get(1)?),
                order_count: row.get(2)?,
                updated_at: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows)
}

pub fn get_series(
    db: &Database,
    from: NaiveDate,
    to: NaiveDate,
    granularity: Granularity,
) -> PosResult<Vec<SeriesPoint>> {
    let conn = db.conn()?;
    match granularity {
        Granularity::Day => daily_buckets(&conn, from, to),
        Granularity::Month => monthly_buckets(&conn, from, to),
        Granularity::Hour => hourly_buckets(&conn, from, to),
    }
}

fn daily_buckets(conn: &Connection, from: NaiveDate, to: NaiveDate) -> PosResult<Vec<SeriesPoint>> {
    if from > to {
        return Ok(Vec::new());
    }

    let mut stmt =
        conn.prepare("SELECT date, total_amount FROM revenue WHERE date BETWEEN ?1 AND ?2")?;
    let amounts: HashMap<NaiveDate, i64> = stmt
        .query_map([from, to], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<_, _>>()?;

    Ok(from
        .iter_days()
        .take_while(|day| *day <= to)
        .map(|day| SeriesPoint {
            label: day.format("%Y-%m-%d").to_string(),
            amount: from_cents(amounts.get(&day).copied().unwrap_or(0)),
        })
        .collect())
}

fn monthly_buckets(conn: &Connection, from: NaiveDate, to: NaiveDate) -> PosResult<Vec<SeriesPoint>> {
    if from > to {
        return Ok(Vec::new());
    }

    let mut stmt = conn.prepare(
        "SELECT strftime('%Y-%m', date), SUM(total_amount)
         FROM revenue
         WHERE date BETWEEN ?1 AND ?2
         GROUP BY strftime('%Y-%m', date)",
    )?;
    let amounts: HashMap<String, i64> = stmt
        .query_map([from, to], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<_, _>>()?;

    let mut points = Vec::new();
    let (mut year, mut month) = (from.year(), from.month());
    while (year, month) <= (to.year(), to.month()) {
        let label = format!("{:04}-{:02}", year, month);
        let cents = amounts.get(&label).copied().unwrap_or(0);
        points.push(SeriesPoint {
            label,
            amount: from_cents(cents),
        });

        month += 1;
        if month > 12 {
            month = 1;
            year += 1;
        }
    }

    Ok(points)
}

/// Payments per hour of day over `from..=to`; always 24 buckets
fn hourly_buckets(conn: &Connection, from: NaiveDate, to: NaiveDate) -> PosResult<Vec<SeriesPoint>> {
    let mut hours = [0i64; 24];

    if from <= to {
        let mut stmt = conn.prepare(
            "SELECT CAST(strftime('%H', paid_at) AS INTEGER), SUM(amount)
             FROM payments
             WHERE date(paid_at) BETWEEN ?1 AND ?2
             GROUP BY 1",
        )?;
        let rows = stmt
            .query_map([from, to], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;

        for (hour, cents) in rows {
            if let Some(slot) = usize::try_from(hour).ok().and_then(|h| hours.get_mut(h)) {
                *slot += cents;
            }
        }
    }

    Ok(hours
        .iter()
        .enumerate()
        .map(|(hour, cents)| SeriesPoint {
            label: format!("{:02}:00", hour),
            amount: from_cents(*cents),
        })
        .collect())
}

/// The seven days ending at `end`
pub fn weekly_series(db: &Database, end: NaiveDate) -> PosResult<Vec<SeriesPoint>> {
    get_series(db, end - TimeDelta::days(6), end, Granularity::Day)
}

/// January to December of `year`
pub fn monthly_series(db: &Database, year: i32) -> PosResult<Vec<SeriesPoint>> {
    let from = NaiveDate::from_ymd_opt(year, 1, 1)
        .ok_or_else(|| PosError::invalid(format!("invalid year {}", year)))?;
    let to = NaiveDate::from_ymd_opt(year, 12, 31)
        .ok_or_else(|| PosError::invalid(format!("invalid year {}", year)))?;
    get_series(db, from, to, Granularity::Month)
}

/// Peak-hour view for one day
pub fn hourly_series(db: &Database, date: NaiveDate) -> PosResult<Vec<SeriesPoint>> {
    get_series(db, date, date, Granularity::Hour)
}

/// Growth of `date` against the day before
pub fn daily_growth(db: &Database, date: NaiveDate) -> PosResult<Decimal> {
    let current = get_daily_total(db, date)?.amount;
    let previous = match date.pred_opt() {
        Some(prev) => get_daily_total(db, prev)?.amount,
        None => Decimal::ZERO,
    };
    Ok(growth_percentage(current, previous))
}

pub fn top_selling_items(
    db: &Database,
    from: NaiveDate,
    to: NaiveDate,
    limit: u32,
) -> PosResult<Vec<TopItem>> {
    let conn = db.conn()?;

    let mut stmt = conn.prepare(
        "SELECT oi.menu_item_id, m.name, SUM(oi.quantity), SUM(oi.quantity * oi.unit_price)
         FROM order_items oi
         JOIN orders o ON o.id = oi.order_id
         JOIN menu_items m ON m.id = oi.menu_item_id
         WHERE o.status = ?1 AND date(o.completed_at) BETWEEN ?2 AND ?3
         GROUP BY oi.menu_item_id, m.name
         ORDER BY 3 DESC, 4 DESC, m.name
         LIMIT ?4",
    )?;

    let items = stmt
        .query_map(
            rusqlite::params![OrderStatus::Completed, from, to, limit],
            |row| {
                Ok(TopItem {
                    menu_item_id: row.get(0)?,
                    name: row.get(1)?,
                    quantity: row.get(2)?,
                    revenue: from_cents(row.get(3)?),
                })
            },
        )?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(items)
}

pub fn category_breakdown(
    db: &Database,
    from: NaiveDate,
    to: NaiveDate,
) -> PosResult<Vec<CategoryRevenue>> {
    let conn = db.conn()?;

    let mut stmt = conn.prepare(
        "SELECT m.category, SUM(oi.quantity), SUM(oi.quantity * oi.unit_price)
         FROM order_items oi
         JOIN orders o ON o.id = oi.order_id
         JOIN menu_items m ON m.id = oi.menu_item_id
         WHERE o.status = ?1 AND date(o.completed_at) BETWEEN ?2 AND ?3
         GROUP BY m.category
         ORDER BY 3 DESC, m.category",
    )?;

    let rows = stmt
        .query_map(rusqlite::params![OrderStatus::Completed, from, to], |row| {
            Ok(CategoryRevenue {
                category: row.get(0)?,
                quantity: row.get(1)?,
                revenue: from_cents(row.get(2)?),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Count and amount per payment method; every method is present.
pub fn payment_method_breakdown(
    db: &Database,
    from: NaiveDate,
    to: NaiveDate,
) -> PosResult<Vec<MethodTotal>> {
    let conn = db.conn()?;

    let mut stmt = conn.prepare(
        "SELECT method, COUNT(*), SUM(amount)
         FROM payments
         WHERE date(paid_at) BETWEEN ?1 AND ?2
         GROUP BY method",
    )?;
    let found: HashMap<PaymentMethod, (i64, i64)> = stmt
        .query_map([from, to], |row| Ok((row.get(0)?, (row.get(1)?, row.get(2)?))))?
        .collect::<Result<_, _>>()?;

    Ok(PaymentMethod::ALL
        .iter()
        .map(|method| {
            let (count, cents) = found.get(method).copied().unwrap_or((0, 0));
            MethodTotal {
                method: *method,
                count,
                amount: from_cents(cents),
            }
        })
        .collect())
}

pub fn dashboard_summary(db: &Database, date: NaiveDate) -> PosResult<DashboardSummary> {
    Ok(DashboardSummary {
        date,
        today: get_daily_total(db, date)?,
        growth_percent: daily_growth(db, date)?,
        weekly: weekly_series(db, date)?,
        payment_methods: payment_method_breakdown(db, date, date)?,
        top_items: top_selling_items(db, date, date, 5)?,
    })
}
