use std::path::Path;

use chrono::NaiveDate;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{Connection, OptionalExtension, Result, Row, params};
use rust_decimal::Decimal;

use crate::cycle::{CycleWindow, DayOfMonth};
use crate::models::{
    AmountSum, Category, CategoryKind, CreditCard, DEFAULT_CATEGORIES, PaymentMethod,
    PaymentMethodKind, PaymentMethodPatch, TransactionRow, parse_amount,
};

impl ToSql for PaymentMethodKind {
    fn to_sql(&self) -> Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for PaymentMethodKind {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: String| FromSqlError::Other(e.into()))
    }
}

impl ToSql for CategoryKind {
    fn to_sql(&self) -> Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for CategoryKind {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: String| FromSqlError::Other(e.into()))
    }
}

impl ToSql for DayOfMonth {
    fn to_sql(&self) -> Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(i64::from(self.get())))
    }
}

impl FromSql for DayOfMonth {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let raw = value.as_i64()?;
        u32::try_from(raw)
            .ok()
            .and_then(DayOfMonth::new)
            .ok_or(FromSqlError::OutOfRange(raw))
    }
}

/// Creates tables on the given connection.
pub fn init_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA foreign_keys = ON;

        CREATE TABLE IF NOT EXISTS payment_methods (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            name        TEXT NOT NULL UNIQUE,
            kind        TEXT NOT NULL CHECK (kind IN ('CASH', 'DEBIT', 'CREDIT')),
            is_active   INTEGER NOT NULL DEFAULT 1,
            sort_order  INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS categories (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            name        TEXT NOT NULL UNIQUE,
            kind        TEXT NOT NULL CHECK (kind IN ('INCOME', 'EXPENSE', 'TRACKING')),
            is_active   INTEGER NOT NULL DEFAULT 1,
            sort_order  INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS credit_cards (
            id                   INTEGER PRIMARY KEY AUTOINCREMENT,
            payment_method_id    INTEGER NOT NULL UNIQUE REFERENCES payment_methods(id) ON DELETE CASCADE,
            cutoff_day           INTEGER NOT NULL CHECK (cutoff_day BETWEEN 1 AND 31),
            due_day              INTEGER,
            payment_category_id  INTEGER REFERENCES categories(id) ON DELETE SET NULL
        );

        CREATE TABLE IF NOT EXISTS transactions (
            id                 INTEGER PRIMARY KEY AUTOINCREMENT,
            date               TEXT NOT NULL,
            amount             TEXT NOT NULL,
            description        TEXT NOT NULL,
            payment_method_id  INTEGER NOT NULL REFERENCES payment_methods(id),
            category_id        INTEGER NOT NULL REFERENCES categories(id),
            note               TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_transactions_method_date
            ON transactions (payment_method_id, date);
        CREATE INDEX IF NOT EXISTS idx_transactions_category_date
            ON transactions (category_id, date);",
    )?;
    Ok(())
}

/// Inserts the default categories that are not there yet.
pub fn seed_default_categories(conn: &Connection) -> Result<()> {
    let mut stmt = conn.prepare(
        "INSERT OR IGNORE INTO categories (name, kind, sort_order) VALUES (?1, ?2, ?3)",
    )?;
    for (i, (name, kind)) in DEFAULT_CATEGORIES.iter().enumerate() {
        stmt.execute(params![name, kind, (i as i64 + 1) * 10])?;
    }
    Ok(())
}

/// Opens (or creates) the SQLite database file, ensures tables exist and
/// seeds the default categories.
pub fn init_db(path: impl AsRef<Path>) -> Result<Connection> {
    let conn = Connection::open(path)?;
    init_tables(&conn)?;
    seed_default_categories(&conn)?;
    Ok(conn)
}

fn map_payment_method(row: &Row) -> Result<PaymentMethod> {
    Ok(PaymentMethod {
        id: row.get(0)?,
        name: row.get(1)?,
        kind: row.get(2)?,
        is_active: row.get(3)?,
        sort_order: row.get(4)?,
    })
}

pub fn add_payment_method(
    conn: &Connection,
    name: &str,
    kind: PaymentMethodKind,
    is_active: bool,
    sort_order: i64,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO payment_methods (name, kind, is_active, sort_order) VALUES (?1, ?2, ?3, ?4)",
        params![name, kind, is_active, sort_order],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_payment_method(conn: &Connection, id: i64) -> Result<Option<PaymentMethod>> {
    conn.query_row(
        "SELECT id, name, kind, is_active, sort_order FROM payment_methods WHERE id = ?1",
        params![id],
        map_payment_method,
    )
    .optional()
}

pub fn list_payment_methods(conn: &Connection) -> Result<Vec<PaymentMethod>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, kind, is_active, sort_order
         FROM payment_methods
         ORDER BY sort_order ASC, name ASC",
    )?;
    let rows = stmt.query_map([], map_payment_method)?;
    rows.collect()
}

/// Applies the fields present in `patch`. Returns false if no such row.
pub fn update_payment_method(conn: &Connection, id: i64, patch: &PaymentMethodPatch) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE payment_methods SET
            name = COALESCE(?2, name),
            kind = COALESCE(?3, kind),
            is_active = COALESCE(?4, is_active),
            sort_order = COALESCE(?5, sort_order)
         WHERE id = ?1",
        params![
            id,
            patch.name.as_deref().map(str::trim),
            patch.kind,
            patch.is_active,
            patch.sort_order
        ],
    )?;
    Ok(changed > 0)
}

pub fn remove_payment_method(conn: &Connection, id: i64) -> Result<bool> {
    let changed = conn.execute("DELETE FROM payment_methods WHERE id = ?1", params![id])?;
    Ok(changed > 0)
}

fn map_category(row: &Row) -> Result<Category> {
    Ok(Category {
        id: row.get(0)?,
        name: row.get(1)?,
        kind: row.get(2)?,
        is_active: row.get(3)?,
        sort_order: row.get(4)?,
    })
}

pub fn add_category(conn: &Connection, name: &str, kind: CategoryKind, sort_order: i64) -> Result<i64> {
    conn.execute(
        "INSERT INTO categories (name, kind, sort_order) VALUES (?1, ?2, ?3)",
        params![name, kind, sort_order],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_category(conn: &Connection, id: i64) -> Result<Option<Category>> {
    conn.query_row(
        "SELECT id, name, kind, is_active, sort_order FROM categories WHERE id = ?1",
        params![id],
        map_category,
    )
    .optional()
}

pub fn find_active_category_by_name(conn: &Connection, name: &str) -> Result<Option<Category>> {
    conn.query_row(
        "SELECT id, name, kind, is_active, sort_order
         FROM categories
         WHERE name = ?1 AND is_active = 1",
        params![name],
        map_category,
    )
    .optional()
}

/// Active categories in display order.
pub fn list_categories(conn: &Connection) -> Result<Vec<Category>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, kind, is_active, sort_order
         FROM categories
         WHERE is_active = 1
         ORDER BY sort_order ASC, name ASC",
    )?;
    let rows = stmt.query_map([], map_category)?;
    rows.collect()
}

const CARD_SELECT: &str = "
    SELECT cc.id, cc.payment_method_id, pm.name, cc.cutoff_day, cc.due_day,
           cc.payment_category_id, c.name
    FROM credit_cards cc
    JOIN payment_methods pm ON pm.id = cc.payment_method_id
    LEFT JOIN categories c ON c.id = cc.payment_category_id";

fn map_credit_card(row: &Row) -> Result<CreditCard> {
    Ok(CreditCard {
        id: row.get(0)?,
        payment_method_id: row.get(1)?,
        payment_method_name: row.get(2)?,
        cutoff_day: row.get(3)?,
        due_day: row.get(4)?,
        payment_category_id: row.get(5)?,
        payment_category_name: row.get(6)?,
    })
}

pub fn add_credit_card(
    conn: &Connection,
    payment_method_id: i64,
    cutoff_day: DayOfMonth,
    due_day: Option<u32>,
    payment_category_id: Option<i64>,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO credit_cards (payment_method_id, cutoff_day, due_day, payment_category_id)
         VALUES (?1, ?2, ?3, ?4)",
        params![payment_method_id, cutoff_day, due_day, payment_category_id],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_credit_card(conn: &Connection, id: i64) -> Result<Option<CreditCard>> {
    conn.query_row(&format!("{CARD_SELECT} WHERE cc.id = ?1"), params![id], map_credit_card)
        .optional()
}

/// All cards in creation order.
pub fn list_credit_cards(conn: &Connection) -> Result<Vec<CreditCard>> {
    let mut stmt = conn.prepare(&format!("{CARD_SELECT} ORDER BY cc.id ASC"))?;
    let rows = stmt.query_map([], map_credit_card)?;
    rows.collect()
}

/// Overwrites the billing settings of a card. Returns false if no such row.
pub fn update_credit_card(
    conn: &Connection,
    id: i64,
    cutoff_day: DayOfMonth,
    due_day: Option<u32>,
    payment_category_id: Option<i64>,
) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE credit_cards SET cutoff_day = ?2, due_day = ?3, payment_category_id = ?4
         WHERE id = ?1",
        params![id, cutoff_day, due_day, payment_category_id],
    )?;
    Ok(changed > 0)
}

pub fn remove_credit_card(conn: &Connection, id: i64) -> Result<bool> {
    let changed = conn.execute("DELETE FROM credit_cards WHERE id = ?1", params![id])?;
    Ok(changed > 0)
}

const TRANSACTION_SELECT: &str = "
    SELECT t.id, t.date, t.amount, t.description, t.payment_method_id,
           t.category_id, c.name, t.note
    FROM transactions t
    LEFT JOIN categories c ON c.id = t.category_id";

fn map_transaction(row: &Row) -> Result<TransactionRow> {
    Ok(TransactionRow {
        id: row.get(0)?,
        date: row.get(1)?,
        amount: row.get(2)?,
        description: row.get(3)?,
        payment_method_id: row.get(4)?,
        category_id: row.get(5)?,
        category_name: row.get(6)?,
        note: row.get(7)?,
    })
}

pub fn add_transaction(
    conn: &Connection,
    date: NaiveDate,
    amount: Decimal,
    description: &str,
    payment_method_id: i64,
    category_id: i64,
    note: Option<&str>,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO transactions (date, amount, description, payment_method_id, category_id, note)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![date, amount.to_string(), description, payment_method_id, category_id, note],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_transaction(conn: &Connection, id: i64) -> Result<Option<TransactionRow>> {
    conn.query_row(
        &format!("{TRANSACTION_SELECT} WHERE t.id = ?1"),
        params![id],
        map_transaction,
    )
    .optional()
}

/// Transactions dated inside `range`, by date then creation order.
pub fn list_transactions(conn: &Connection, range: &CycleWindow) -> Result<Vec<TransactionRow>> {
    let mut stmt = conn.prepare(&format!(
        "{TRANSACTION_SELECT}
         WHERE t.date BETWEEN ?1 AND ?2
         ORDER BY t.date ASC, t.id ASC"
    ))?;
    let rows = stmt.query_map(params![range.start, range.end], map_transaction)?;
    rows.collect()
}

/// Transactions charged to a payment method inside `range`.
pub fn list_by_payment_method(
    conn: &Connection,
    payment_method_id: i64,
    range: &CycleWindow,
) -> Result<Vec<TransactionRow>> {
    let mut stmt = conn.prepare(&format!(
        "{TRANSACTION_SELECT}
         WHERE t.payment_method_id = ?1 AND t.date BETWEEN ?2 AND ?3
         ORDER BY t.date ASC, t.id ASC"
    ))?;
    let rows = stmt.query_map(params![payment_method_id, range.start, range.end], map_transaction)?;
    rows.collect()
}

/// Transactions filed under a category inside `range`.
pub fn list_by_category(
    conn: &Connection,
    category_id: i64,
    range: &CycleWindow,
) -> Result<Vec<TransactionRow>> {
    let mut stmt = conn.prepare(&format!(
        "{TRANSACTION_SELECT}
         WHERE t.category_id = ?1 AND t.date BETWEEN ?2 AND ?3
         ORDER BY t.date ASC, t.id ASC"
    ))?;
    let rows = stmt.query_map(params![category_id, range.start, range.end], map_transaction)?;
    rows.collect()
}

// Amounts are decimal text, so sums are folded here rather than by SQLite's
// floating point SUM.
fn sum_amounts(conn: &Connection, sql: &str, key: i64, range: &CycleWindow) -> Result<AmountSum> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params![key, range.start, range.end], |row| {
        Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
    })?;

    let mut sum = AmountSum::default();
    for row in rows {
        let (id, raw) = row?;
        match parse_amount(&raw) {
            Ok(amount) => match sum.total.checked_add(amount) {
                Some(total) => sum.total = total,
                None => sum.overflowed.push(id),
            },
            Err(_) => sum.unreadable.push(id),
        }
    }
    Ok(sum)
}

pub fn sum_by_payment_method(
    conn: &Connection,
    payment_method_id: i64,
    range: &CycleWindow,
) -> Result<AmountSum> {
    sum_amounts(
        conn,
        "SELECT id, amount FROM transactions
         WHERE payment_method_id = ?1 AND date BETWEEN ?2 AND ?3",
        payment_method_id,
        range,
    )
}

pub fn sum_by_category(conn: &Connection, category_id: i64, range: &CycleWindow) -> Result<AmountSum> {
    sum_amounts(
        conn,
        "SELECT id, amount FROM transactions
         WHERE category_id = ?1 AND date BETWEEN ?2 AND ?3",
        category_id,
        range,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    /// Helper: creates an in-memory DB with tables ready to go.
    fn test_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_tables(&conn).unwrap();
        seed_default_categories(&conn).unwrap();
        conn
    }

    fn d(raw: &str) -> NaiveDate {
        NaiveDate::parse_from_str(raw, "%Y-%m-%d").unwrap()
    }

    fn range(start: &str, end: &str) -> CycleWindow {
        CycleWindow { start: d(start), end: d(end) }
    }

    fn category_id(conn: &Connection, name: &str) -> i64 {
        find_active_category_by_name(conn, name).unwrap().unwrap().id
    }

    #[test]
    fn test_seed_is_idempotent() {
        let conn = test_db();
        seed_default_categories(&conn).unwrap();

        let categories = list_categories(&conn).unwrap();
        assert_eq!(categories.len(), DEFAULT_CATEGORIES.len());
        assert_eq!(categories[0].name, "Unidentified");
        assert_eq!(categories[0].kind, CategoryKind::Expense);
    }

    #[test]
    fn test_add_and_list_payment_methods_ordered() {
        let conn = test_db();

        add_payment_method(&conn, "Visa", PaymentMethodKind::Credit, true, 20).unwrap();
        add_payment_method(&conn, "Cash", PaymentMethodKind::Cash, true, 10).unwrap();
        add_payment_method(&conn, "Amex", PaymentMethodKind::Credit, true, 20).unwrap();

        let methods = list_payment_methods(&conn).unwrap();
        let names: Vec<_> = methods.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["Cash", "Amex", "Visa"]);
        assert_eq!(methods[2].kind, PaymentMethodKind::Credit);
    }

    #[test]
    fn test_update_payment_method_partial() {
        let conn = test_db();
        let id = add_payment_method(&conn, "Visa", PaymentMethodKind::Credit, true, 0).unwrap();

        let patch = PaymentMethodPatch {
            name: Some("  Visa Gold ".into()),
            is_active: Some(false),
            ..Default::default()
        };
        assert!(update_payment_method(&conn, id, &patch).unwrap());

        let method = get_payment_method(&conn, id).unwrap().unwrap();
        assert_eq!(method.name, "Visa Gold");
        assert!(!method.is_active);
        assert_eq!(method.kind, PaymentMethodKind::Credit);

        assert!(!update_payment_method(&conn, 999, &patch).unwrap());
    }

    #[test]
    fn test_credit_card_round_trip() {
        let conn = test_db();
        let pm = add_payment_method(&conn, "Visa", PaymentMethodKind::Credit, true, 0).unwrap();
        let payments = category_id(&conn, "Card payment");

        let id = add_credit_card(&conn, pm, DayOfMonth::new(20).unwrap(), Some(10), Some(payments)).unwrap();

        let card = get_credit_card(&conn, id).unwrap().unwrap();
        assert_eq!(card.payment_method_name, "Visa");
        assert_eq!(card.cutoff_day.get(), 20);
        assert_eq!(card.due_day, Some(10));
        assert_eq!(card.payment_category_name.as_deref(), Some("Card payment"));

        assert!(update_credit_card(&conn, id, DayOfMonth::new(5).unwrap(), None, None).unwrap());
        let card = get_credit_card(&conn, id).unwrap().unwrap();
        assert_eq!(card.cutoff_day.get(), 5);
        assert_eq!(card.due_day, None);
        assert_eq!(card.payment_category_name, None);
    }

    #[test]
    fn test_get_credit_card_missing() {
        let conn = test_db();
        assert!(get_credit_card(&conn, 42).unwrap().is_none());
    }

    #[test]
    fn test_one_card_per_payment_method() {
        let conn = test_db();
        let pm = add_payment_method(&conn, "Visa", PaymentMethodKind::Credit, true, 0).unwrap();
        add_credit_card(&conn, pm, DayOfMonth::new(1).unwrap(), None, None).unwrap();
        assert!(add_credit_card(&conn, pm, DayOfMonth::new(2).unwrap(), None, None).is_err());
    }

    #[test]
    fn test_remove_credit_card() {
        let conn = test_db();
        let pm = add_payment_method(&conn, "Visa", PaymentMethodKind::Credit, true, 0).unwrap();
        let id = add_credit_card(&conn, pm, DayOfMonth::new(1).unwrap(), None, None).unwrap();

        assert!(remove_credit_card(&conn, id).unwrap());
        assert!(!remove_credit_card(&conn, id).unwrap());
        assert!(list_credit_cards(&conn).unwrap().is_empty());
    }

    #[test]
    fn test_range_queries_are_inclusive_and_ordered() {
        let conn = test_db();
        let visa = add_payment_method(&conn, "Visa", PaymentMethodKind::Credit, true, 0).unwrap();
        let cash = add_payment_method(&conn, "Cash", PaymentMethodKind::Cash, true, 0).unwrap();
        let dining = category_id(&conn, "Dining");

        add_transaction(&conn, d("2024-01-21"), dec!(10), "first day", visa, dining, None).unwrap();
        add_transaction(&conn, d("2024-02-20"), dec!(20.50), "last day", visa, dining, None).unwrap();
        add_transaction(&conn, d("2024-02-21"), dec!(99), "next cycle", visa, dining, None).unwrap();
        add_transaction(&conn, d("2024-01-20"), dec!(99), "prior cycle", visa, dining, None).unwrap();
        add_transaction(&conn, d("2024-02-01"), dec!(7), "cash", cash, dining, None).unwrap();
        add_transaction(&conn, d("2024-01-21"), dec!(5), "same day later", visa, dining, None).unwrap();

        let cycle = range("2024-01-21", "2024-02-20");
        let sum = sum_by_payment_method(&conn, visa, &cycle).unwrap();
        assert_eq!(sum.total, dec!(35.50));
        assert!(sum.unreadable.is_empty());

        let rows = list_by_payment_method(&conn, visa, &cycle).unwrap();
        let descriptions: Vec<_> = rows.iter().map(|r| r.description.as_str()).collect();
        assert_eq!(descriptions, vec!["first day", "same day later", "last day"]);
        assert_eq!(rows[0].category_name.as_deref(), Some("Dining"));

        let by_category = sum_by_category(&conn, dining, &cycle).unwrap();
        assert_eq!(by_category.total, dec!(42.50));
        assert_eq!(list_by_category(&conn, dining, &cycle).unwrap().len(), 4);
        assert_eq!(list_transactions(&conn, &cycle).unwrap().len(), 4);
    }

    #[test]
    fn test_sum_reports_unreadable_amounts() {
        let conn = test_db();
        let visa = add_payment_method(&conn, "Visa", PaymentMethodKind::Credit, true, 0).unwrap();
        let dining = category_id(&conn, "Dining");

        add_transaction(&conn, d("2024-03-05"), dec!(12), "ok", visa, dining, None).unwrap();
        let bad = add_transaction(&conn, d("2024-03-06"), dec!(1), "bad", visa, dining, None).unwrap();
        conn.execute("UPDATE transactions SET amount = 'n/a' WHERE id = ?1", params![bad])
            .unwrap();

        let sum = sum_by_payment_method(&conn, visa, &range("2024-03-01", "2024-03-31")).unwrap();
        assert_eq!(sum.total, dec!(12));
        assert_eq!(sum.unreadable, vec![bad]);

        let row = get_transaction(&conn, bad).unwrap().unwrap();
        assert!(row.amount().is_err());
    }

    #[test]
    fn test_sum_leaves_out_rows_that_overflow() {
        let conn = test_db();
        let visa = add_payment_method(&conn, "Visa", PaymentMethodKind::Credit, true, 0).unwrap();
        let dining = category_id(&conn, "Dining");

        add_transaction(&conn, d("2024-03-05"), Decimal::MAX, "first", visa, dining, None).unwrap();
        let second = add_transaction(&conn, d("2024-03-06"), Decimal::MAX, "second", visa, dining, None).unwrap();

        let sum = sum_by_payment_method(&conn, visa, &range("2024-03-01", "2024-03-31")).unwrap();
        assert_eq!(sum.total, Decimal::MAX);
        assert_eq!(sum.overflowed, vec![second]);
        assert!(sum.unreadable.is_empty());
    }

    #[test]
    fn test_out_of_range_cutoff_is_rejected_on_read() {
        let conn = test_db();
        let pm = add_payment_method(&conn, "Visa", PaymentMethodKind::Credit, true, 0).unwrap();
        conn.execute_batch("PRAGMA ignore_check_constraints = ON").unwrap();
        conn.execute(
            "INSERT INTO credit_cards (payment_method_id, cutoff_day) VALUES (?1, 45)",
            params![pm],
        )
        .unwrap();

        assert!(list_credit_cards(&conn).is_err());
    }
}
