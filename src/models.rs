use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use tabled::Tabled;
use thiserror::Error;

use crate::cycle::DayOfMonth;

/// Category assigned to transactions created without one.
pub const UNIDENTIFIED_CATEGORY: &str = "Unidentified";

/// Categories seeded into a fresh database.
pub const DEFAULT_CATEGORIES: &[(&str, CategoryKind)] = &[
    (UNIDENTIFIED_CATEGORY, CategoryKind::Expense),
    ("Rent", CategoryKind::Expense),
    ("Utilities", CategoryKind::Expense),
    ("Groceries", CategoryKind::Expense),
    ("Dining", CategoryKind::Expense),
    ("Transport", CategoryKind::Expense),
    ("Entertainment", CategoryKind::Expense),
    ("Salary", CategoryKind::Income),
    ("Card payment", CategoryKind::Tracking),
    ("Transfer", CategoryKind::Tracking),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "UPPERCASE")]
pub enum PaymentMethodKind {
    Cash,
    Debit,
    Credit,
}

impl PaymentMethodKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentMethodKind::Cash => "CASH",
            PaymentMethodKind::Debit => "DEBIT",
            PaymentMethodKind::Credit => "CREDIT",
        }
    }
}

impl FromStr for PaymentMethodKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CASH" => Ok(PaymentMethodKind::Cash),
            "DEBIT" => Ok(PaymentMethodKind::Debit),
            "CREDIT" => Ok(PaymentMethodKind::Credit),
            other => Err(format!("unknown payment method kind '{other}'")),
        }
    }
}

impl fmt::Display for PaymentMethodKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "UPPERCASE")]
pub enum CategoryKind {
    Income,
    Expense,
    /// Movements that are neither income nor spend, e.g. card payments.
    Tracking,
}

impl CategoryKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CategoryKind::Income => "INCOME",
            CategoryKind::Expense => "EXPENSE",
            CategoryKind::Tracking => "TRACKING",
        }
    }
}

impl FromStr for CategoryKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INCOME" => Ok(CategoryKind::Income),
            "EXPENSE" => Ok(CategoryKind::Expense),
            "TRACKING" => Ok(CategoryKind::Tracking),
            other => Err(format!("unknown category kind '{other}'")),
        }
    }
}

impl fmt::Display for CategoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn display_option<T: fmt::Display>(value: &Option<T>) -> String {
    value.as_ref().map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}

#[derive(Debug, Clone, Serialize, Tabled)]
#[serde(rename_all = "camelCase")]
pub struct PaymentMethod {
    pub id: i64,
    pub name: String,
    pub kind: PaymentMethodKind,
    pub is_active: bool,
    pub sort_order: i64,
}

#[derive(Debug, Clone, Serialize, Tabled)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub kind: CategoryKind,
    pub is_active: bool,
    pub sort_order: i64,
}

#[derive(Debug, Clone, Serialize, Tabled)]
#[serde(rename_all = "camelCase")]
pub struct CreditCard {
    pub id: i64,
    pub payment_method_id: i64,
    pub payment_method_name: String,
    /// Day of month the statement closes (1-31)
    pub cutoff_day: DayOfMonth,
    /// Days after the cutoff that payment is due; `None` or 0 = not configured
    #[tabled(display_with = "display_option")]
    pub due_day: Option<u32>,
    #[tabled(display_with = "display_option")]
    pub payment_category_id: Option<i64>,
    #[tabled(display_with = "display_option")]
    pub payment_category_name: Option<String>,
}

/// Largest amount a single transaction may carry.
pub const MAX_AMOUNT: i64 = 1_000_000_000_000;

/// Error for a stored amount that is not a valid decimal.
#[derive(Debug, Error, PartialEq)]
#[error("amount '{raw}' is not a valid decimal")]
pub struct AmountError {
    pub raw: String,
}

pub fn parse_amount(raw: &str) -> Result<Decimal, AmountError> {
    Decimal::from_str(raw.trim()).map_err(|_| AmountError { raw: raw.to_string() })
}

/// A transaction as stored, before its amount text is interpreted.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionRow {
    pub id: i64,
    pub date: NaiveDate,
    pub amount: String,
    pub description: String,
    pub payment_method_id: i64,
    pub category_id: i64,
    pub category_name: Option<String>,
    pub note: Option<String>,
}

impl TransactionRow {
    pub fn amount(&self) -> Result<Decimal, AmountError> {
        parse_amount(&self.amount)
    }

    /// The amount, or zero with a warning when the stored text is corrupt.
    pub fn amount_or_zero(&self) -> Decimal {
        self.amount().unwrap_or_else(|e| {
            tracing::warn!(transaction_id = self.id, error = %e, "treating unreadable amount as zero");
            Decimal::ZERO
        })
    }
}

#[derive(Debug, Clone, Serialize, Tabled)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: i64,
    pub date: NaiveDate,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub description: String,
    pub payment_method_id: i64,
    pub category_id: i64,
    #[tabled(display_with = "display_option")]
    pub category_name: Option<String>,
    #[tabled(display_with = "display_option")]
    pub note: Option<String>,
}

impl From<TransactionRow> for Transaction {
    fn from(row: TransactionRow) -> Self {
        let amount = row.amount_or_zero();
        Transaction {
            id: row.id,
            date: row.date,
            amount,
            description: row.description,
            payment_method_id: row.payment_method_id,
            category_id: row.category_id,
            category_name: row.category_name,
            note: row.note,
        }
    }
}

/// Total of a sum query, with the ids of rows left out of it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AmountSum {
    pub total: Decimal,
    /// Rows whose amount text is not a decimal.
    pub unreadable: Vec<i64>,
    /// Rows that would push the total past `Decimal::MAX`.
    pub overflowed: Vec<i64>,
}

/// Per-card totals for one statement cycle.
#[derive(Debug, Clone, Serialize, Tabled)]
#[serde(rename_all = "camelCase")]
pub struct CardCycleSummary {
    pub id: i64,
    #[tabled(skip)]
    pub payment_method_id: i64,
    #[tabled(rename = "card")]
    pub payment_method_name: String,
    pub cutoff_day: DayOfMonth,
    #[tabled(display_with = "display_option")]
    pub due_day: Option<u32>,
    #[tabled(skip)]
    pub payment_category_id: Option<i64>,
    #[tabled(skip)]
    pub payment_category_name: Option<String>,
    pub cycle_start: NaiveDate,
    pub cycle_end: NaiveDate,
    #[tabled(display_with = "display_option")]
    pub payment_window_start: Option<NaiveDate>,
    #[tabled(display_with = "display_option")]
    pub payment_window_end: Option<NaiveDate>,
    pub is_in_payment_window: bool,
    #[serde(with = "rust_decimal::serde::float")]
    pub spent: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub paid: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub debt: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CycleItemKind {
    Spent,
    Payment,
}

impl fmt::Display for CycleItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CycleItemKind::Spent => f.write_str("SPENT"),
            CycleItemKind::Payment => f.write_str("PAYMENT"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Tabled)]
#[serde(rename_all = "camelCase")]
pub struct CycleItem {
    pub id: i64,
    pub date: NaiveDate,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub description: String,
    pub kind: CycleItemKind,
    #[tabled(display_with = "display_option")]
    pub category_name: Option<String>,
}

/// Card identity as shown in the cycle detail view.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleCard {
    pub id: i64,
    pub payment_method_id: i64,
    pub payment_method_name: String,
    pub cutoff_day: DayOfMonth,
    pub due_day: Option<u32>,
    pub payment_category_name: Option<String>,
    pub payment_window_start: Option<NaiveDate>,
    pub payment_window_end: Option<NaiveDate>,
    pub is_in_payment_window: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleDetail {
    pub card: CycleCard,
    pub cycle_start: NaiveDate,
    pub cycle_end: NaiveDate,
    pub items: Vec<CycleItem>,
}

/// Distinguishes an absent field (`None`) from an explicit `null` (`Some(None)`).
fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPaymentMethod {
    pub name: String,
    pub kind: PaymentMethodKind,
    pub is_active: Option<bool>,
    pub sort_order: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentMethodPatch {
    pub name: Option<String>,
    pub kind: Option<PaymentMethodKind>,
    pub is_active: Option<bool>,
    pub sort_order: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCategory {
    pub name: String,
    pub kind: CategoryKind,
    pub sort_order: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCreditCard {
    pub payment_method_id: i64,
    pub cutoff_day: u32,
    pub due_day: Option<u32>,
    pub payment_category_id: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditCardPatch {
    pub cutoff_day: Option<u32>,
    #[serde(default, deserialize_with = "nullable")]
    pub due_day: Option<Option<u32>>,
    #[serde(default, deserialize_with = "nullable")]
    pub payment_category_id: Option<Option<i64>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTransaction {
    /// `YYYY-MM-DD`
    pub date: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub description: String,
    pub payment_method_id: i64,
    /// Defaults to the unidentified category
    pub category_id: Option<i64>,
    pub note: Option<String>,
}
