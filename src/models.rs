use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Closed status/role sets stored as lowercase TEXT.
macro_rules! text_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "lowercase")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(format!("unknown {} '{}'", stringify!($name), other)),
                }
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                let text = value.as_str()?;
                text.parse().map_err(|e: String| FromSqlError::Other(e.into()))
            }
        }
    };
}

text_enum!(TableStatus {
    Available => "available",
    Occupied => "occupied",
    Reserved => "reserved",
    Cleaning => "cleaning",
    Maintenance => "maintenance",
    Inactive => "inactive",
});

text_enum!(OrderStatus {
    Pending => "pending",
    Completed => "completed",
    Cancelled => "cancelled",
});

text_enum!(PaymentMethod {
    Cash => "cash",
    Card => "card",
    Transfer => "transfer",
});

text_enum!(StaffRole {
    Admin => "admin",
    Manager => "manager",
    Bartender => "bartender",
    Waiter => "waiter",
});

impl TableStatus {
    /// Whether a new order may be opened on a table in this state
    pub fn can_seat(&self) -> bool {
        matches!(
            self,
            TableStatus::Available | TableStatus::Reserved | TableStatus::Cleaning
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderAction {
    Complete,
    Cancel,
}

impl OrderStatus {
    /// The only transition function for orders. `None` means the order is
    /// terminal and the action is rejected.
    pub fn apply(self, action: OrderAction) -> Option<OrderStatus> {
        match (self, action) {
            (OrderStatus::Pending, OrderAction::Complete) => Some(OrderStatus::Completed),
            (OrderStatus::Pending, OrderAction::Cancel) => Some(OrderStatus::Cancelled),
            (OrderStatus::Completed | OrderStatus::Cancelled, _) => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, OrderStatus::Pending)
    }
}

impl StaffRole {
    pub fn is_manager(&self) -> bool {
        matches!(self, StaffRole::Admin | StaffRole::Manager)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Table {
    pub id: i64,
    pub name: String,
    pub status: TableStatus,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct MenuItem {
    pub id: i64,
    pub name: String,
    pub price: Decimal,
    pub category: String,
    pub available: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NewMenuItem {
    pub name: String,
    pub price: Decimal,
    pub category: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Order {
    pub id: i64,
    pub table_id: i64,
    pub table_name: Option<String>,
    pub created_at: NaiveDateTime,
    pub completed_at: Option<NaiveDateTime>,
    pub status: OrderStatus,
    /// Amount charged; zero until the order completes
    pub total_amount: Decimal,
    pub discount_percent: Decimal,
    pub notes: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct OrderItem {
    pub id: i64,
    pub order_id: i64,
    pub menu_item_id: i64,
    pub menu_item_name: Option<String>,
    pub quantity: i32,
    /// Price captured when the item was first added
    pub unit_price: Decimal,
}

impl OrderItem {
    pub fn subtotal(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OrderWithItems {
    pub order: Order,
    pub items: Vec<OrderItem>,
}

impl OrderWithItems {
    pub fn subtotal(&self) -> Decimal {
        self.items.iter().map(OrderItem::subtotal).sum()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Payment {
    pub id: i64,
    pub order_id: i64,
    pub amount: Decimal,
    pub method: PaymentMethod,
    pub paid_at: NaiveDateTime,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Staff {
    pub id: i64,
    pub username: String,
    pub display_name: String,
    pub role: StaffRole,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NewStaff {
    pub username: String,
    pub display_name: String,
    pub password: String,
    pub role: StaffRole,
}

/// One row of the daily revenue rollup
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct DailyRevenue {
    pub date: NaiveDate,
    pub total_amount: Decimal,
    pub order_count: i64,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Default)]
pub struct DailyTotal {
    pub amount: Decimal,
    pub order_count: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Hour,
    Day,
    Month,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SeriesPoint {
    pub label: String,
    pub amount: Decimal,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TopItem {
    pub menu_item_id: i64,
    pub name: String,
    pub quantity: i64,
    pub revenue: Decimal,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CategoryRevenue {
    pub category: String,
    pub quantity: i64,
    pub revenue: Decimal,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct MethodTotal {
    pub method: PaymentMethod,
    pub count: i64,
    pub amount: Decimal,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DashboardSummary {
    pub date: NaiveDate,
    pub today: DailyTotal,
    /// Today against yesterday, in percent
    pub growth_percent: Decimal,
    pub weekly: Vec<SeriesPoint>,
    pub payment_methods: Vec<MethodTotal>,
    pub top_items: Vec<TopItem>,
}
