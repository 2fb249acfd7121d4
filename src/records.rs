//! Validated create/update operations shared by the HTTP API and the CLI.
//!
//! `db` only speaks SQL; everything a caller can get wrong (day ranges,
//! card/category kinds, dangling references) is checked here first.

use rusqlite::Connection;
use rust_decimal::Decimal;

use crate::cycle::{DayOfMonth, parse_iso_date};
use crate::db;
use crate::error::{AppError, AppResult};
use crate::models::{
    Category, CategoryKind, CreditCard, CreditCardPatch, NewCategory, NewCreditCard,
    NewPaymentMethod, NewTransaction, PaymentMethod, PaymentMethodKind, PaymentMethodPatch,
    MAX_AMOUNT, Transaction, UNIDENTIFIED_CATEGORY,
};

fn required_name(name: &str, field: &str) -> AppResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::BadRequest(format!("{field} is required")));
    }
    Ok(name.to_string())
}

fn cutoff_day(day: u32) -> AppResult<DayOfMonth> {
    DayOfMonth::new(day).ok_or_else(|| AppError::BadRequest("cutoffDay must be 1..31".into()))
}

fn due_day(day: Option<u32>) -> AppResult<Option<u32>> {
    match day {
        Some(d) if DayOfMonth::new(d).is_none() => Err(AppError::BadRequest(
            "dueDay must be days after cutoff (1..31)".into(),
        )),
        other => Ok(other),
    }
}

fn check_payment_category(conn: &Connection, id: i64) -> AppResult<()> {
    let category = db::get_category(conn, id)?
        .ok_or_else(|| AppError::NotFound("payment category".into()))?;
    if category.kind != CategoryKind::Tracking {
        return Err(AppError::BadRequest("payment category must be TRACKING".into()));
    }
    Ok(())
}

pub fn create_payment_method(conn: &Connection, input: &NewPaymentMethod) -> AppResult<PaymentMethod> {
    let name = required_name(&input.name, "name")?;
    let id = db::add_payment_method(
        conn,
        &name,
        input.kind,
        input.is_active.unwrap_or(true),
        input.sort_order.unwrap_or(0),
    )?;
    db::get_payment_method(conn, id)?.ok_or_else(|| AppError::NotFound("payment method".into()))
}

pub fn update_payment_method(
    conn: &Connection,
    id: i64,
    patch: &PaymentMethodPatch,
) -> AppResult<PaymentMethod> {
    if let Some(name) = &patch.name {
        required_name(name, "name")?;
    }
    if !db::update_payment_method(conn, id, patch)? {
        return Err(AppError::NotFound("payment method".into()));
    }
    db::get_payment_method(conn, id)?.ok_or_else(|| AppError::NotFound("payment method".into()))
}

pub fn delete_payment_method(conn: &Connection, id: i64) -> AppResult<()> {
    if !db::remove_payment_method(conn, id)? {
        return Err(AppError::NotFound("payment method".into()));
    }
    Ok(())
}

pub fn create_category(conn: &Connection, input: &NewCategory) -> AppResult<Category> {
    let name = required_name(&input.name, "name")?;
    let id = db::add_category(conn, &name, input.kind, input.sort_order.unwrap_or(0))?;
    db::get_category(conn, id)?.ok_or_else(|| AppError::NotFound("category".into()))
}

pub fn create_credit_card(conn: &Connection, input: &NewCreditCard) -> AppResult<CreditCard> {
    let cutoff = cutoff_day(input.cutoff_day)?;
    let due = due_day(input.due_day)?;

    let method = db::get_payment_method(conn, input.payment_method_id)?
        .ok_or_else(|| AppError::NotFound("payment method".into()))?;
    if method.kind != PaymentMethodKind::Credit {
        return Err(AppError::BadRequest("payment method must be CREDIT".into()));
    }
    if let Some(category_id) = input.payment_category_id {
        check_payment_category(conn, category_id)?;
    }

    let id = db::add_credit_card(conn, method.id, cutoff, due, input.payment_category_id)?;
    tracing::info!(card_id = id, cutoff_day = %cutoff, "credit card created");
    db::get_credit_card(conn, id)?.ok_or_else(|| AppError::NotFound("credit card".into()))
}

pub fn update_credit_card(conn: &Connection, id: i64, patch: &CreditCardPatch) -> AppResult<CreditCard> {
    let card = db::get_credit_card(conn, id)?
        .ok_or_else(|| AppError::NotFound("credit card".into()))?;

    let cutoff = match patch.cutoff_day {
        Some(day) => cutoff_day(day)?,
        None => card.cutoff_day,
    };
    let due = match patch.due_day {
        Some(day) => due_day(day)?,
        None => card.due_day,
    };
    let payment_category = match patch.payment_category_id {
        Some(Some(category_id)) => {
            check_payment_category(conn, category_id)?;
            Some(category_id)
        }
        Some(None) => None,
        None => card.payment_category_id,
    };

    db::update_credit_card(conn, id, cutoff, due, payment_category)?;
    db::get_credit_card(conn, id)?.ok_or_else(|| AppError::NotFound("credit card".into()))
}

pub fn delete_credit_card(conn: &Connection, id: i64) -> AppResult<()> {
    if !db::remove_credit_card(conn, id)? {
        return Err(AppError::NotFound("credit card".into()));
    }
    Ok(())
}

pub fn create_transaction(conn: &Connection, input: &NewTransaction) -> AppResult<Transaction> {
    let date = parse_iso_date(&input.date)
        .ok_or_else(|| AppError::BadRequest("date must be YYYY-MM-DD".into()))?;
    if input.amount <= Decimal::ZERO {
        return Err(AppError::BadRequest("amount must be a number > 0".into()));
    }
    if input.amount > Decimal::from(MAX_AMOUNT) {
        return Err(AppError::BadRequest(format!("amount must not exceed {MAX_AMOUNT}")));
    }
    let description = required_name(&input.description, "description")?;

    db::get_payment_method(conn, input.payment_method_id)?
        .ok_or_else(|| AppError::NotFound("payment method".into()))?;

    let category_id = match input.category_id {
        Some(id) => {
            let category = db::get_category(conn, id)?
                .ok_or_else(|| AppError::NotFound("category".into()))?;
            if !category.is_active {
                return Err(AppError::BadRequest("category is not active".into()));
            }
            category.id
        }
        None => {
            db::find_active_category_by_name(conn, UNIDENTIFIED_CATEGORY)?
                .ok_or_else(|| AppError::NotFound(format!("default category '{UNIDENTIFIED_CATEGORY}'")))?
                .id
        }
    };

    let note = input.note.as_deref().map(str::trim).filter(|n| !n.is_empty());
    let id = db::add_transaction(
        conn,
        date,
        input.amount,
        &description,
        input.payment_method_id,
        category_id,
        note,
    )?;

    let row = db::get_transaction(conn, id)?
        .ok_or_else(|| AppError::NotFound("transaction".into()))?;
    Ok(Transaction::from(row))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn test_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        db::init_tables(&conn).unwrap();
        db::seed_default_categories(&conn).unwrap();
        conn
    }

    fn method(conn: &Connection, name: &str, kind: PaymentMethodKind) -> PaymentMethod {
        create_payment_method(
            conn,
            &NewPaymentMethod { name: name.into(), kind, is_active: None, sort_order: None },
        )
        .unwrap()
    }

    fn category(conn: &Connection, name: &str) -> i64 {
        db::find_active_category_by_name(conn, name).unwrap().unwrap().id
    }

    fn new_card(payment_method_id: i64, cutoff_day: u32) -> NewCreditCard {
        NewCreditCard { payment_method_id, cutoff_day, due_day: None, payment_category_id: None }
    }

    #[test]
    fn test_create_payment_method_trims_and_defaults() {
        let conn = test_db();
        let pm = method(&conn, "  Visa  ", PaymentMethodKind::Credit);
        assert_eq!(pm.name, "Visa");
        assert!(pm.is_active);
        assert_eq!(pm.sort_order, 0);
    }

    #[test]
    fn test_create_payment_method_requires_name() {
        let conn = test_db();
        let err = create_payment_method(
            &conn,
            &NewPaymentMethod { name: "   ".into(), kind: PaymentMethodKind::Cash, is_active: None, sort_order: None },
        )
        .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[test]
    fn test_duplicate_payment_method_conflicts() {
        let conn = test_db();
        method(&conn, "Visa", PaymentMethodKind::Credit);
        let err = create_payment_method(
            &conn,
            &NewPaymentMethod { name: "Visa".into(), kind: PaymentMethodKind::Credit, is_active: None, sort_order: None },
        )
        .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[test]
    fn test_card_requires_valid_days() {
        let conn = test_db();
        let pm = method(&conn, "Visa", PaymentMethodKind::Credit);

        for bad in [0, 32] {
            let err = create_credit_card(&conn, &new_card(pm.id, bad)).unwrap_err();
            assert!(matches!(err, AppError::BadRequest(_)));
        }

        let mut input = new_card(pm.id, 20);
        input.due_day = Some(40);
        assert!(matches!(create_credit_card(&conn, &input), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn test_card_requires_credit_method() {
        let conn = test_db();
        let debit = method(&conn, "Debit", PaymentMethodKind::Debit);

        let err = create_credit_card(&conn, &new_card(debit.id, 20)).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));

        let err = create_credit_card(&conn, &new_card(999, 20)).unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[test]
    fn test_card_payment_category_must_be_tracking() {
        let conn = test_db();
        let pm = method(&conn, "Visa", PaymentMethodKind::Credit);

        let mut input = new_card(pm.id, 20);
        input.payment_category_id = Some(category(&conn, "Dining"));
        assert!(matches!(create_credit_card(&conn, &input), Err(AppError::BadRequest(_))));

        input.payment_category_id = Some(999);
        assert!(matches!(create_credit_card(&conn, &input), Err(AppError::NotFound(_))));

        input.payment_category_id = Some(category(&conn, "Card payment"));
        let card = create_credit_card(&conn, &input).unwrap();
        assert_eq!(card.payment_category_name.as_deref(), Some("Card payment"));
    }

    #[test]
    fn test_update_card_keeps_absent_fields_and_clears_nulls() {
        let conn = test_db();
        let pm = method(&conn, "Visa", PaymentMethodKind::Credit);
        let mut input = new_card(pm.id, 20);
        input.due_day = Some(10);
        input.payment_category_id = Some(category(&conn, "Card payment"));
        let card = create_credit_card(&conn, &input).unwrap();

        let patch = CreditCardPatch { cutoff_day: Some(31), ..Default::default() };
        let updated = update_credit_card(&conn, card.id, &patch).unwrap();
        assert_eq!(updated.cutoff_day.get(), 31);
        assert_eq!(updated.due_day, Some(10));
        assert!(updated.payment_category_id.is_some());

        let patch = CreditCardPatch { cutoff_day: None, due_day: Some(None), payment_category_id: Some(None) };
        let updated = update_credit_card(&conn, card.id, &patch).unwrap();
        assert_eq!(updated.due_day, None);
        assert_eq!(updated.payment_category_id, None);

        assert!(matches!(
            update_credit_card(&conn, 999, &CreditCardPatch::default()),
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn test_delete_card_not_found() {
        let conn = test_db();
        assert!(matches!(delete_credit_card(&conn, 1), Err(AppError::NotFound(_))));
    }

    #[test]
    fn test_transaction_defaults_to_unidentified() {
        let conn = test_db();
        let pm = method(&conn, "Visa", PaymentMethodKind::Credit);

        let created = create_transaction(
            &conn,
            &NewTransaction {
                date: "2024-06-01".into(),
                amount: dec!(42.10),
                description: " Coffee beans ".into(),
                payment_method_id: pm.id,
                category_id: None,
                note: Some("  ".into()),
            },
        )
        .unwrap();

        assert_eq!(created.category_name.as_deref(), Some(UNIDENTIFIED_CATEGORY));
        assert_eq!(created.description, "Coffee beans");
        assert_eq!(created.amount, dec!(42.10));
        assert_eq!(created.note, None);
    }

    #[test]
    fn test_transaction_validation() {
        let conn = test_db();
        let pm = method(&conn, "Visa", PaymentMethodKind::Credit);
        let base = NewTransaction {
            date: "2024-06-01".into(),
            amount: dec!(10),
            description: "Lunch".into(),
            payment_method_id: pm.id,
            category_id: None,
            note: None,
        };

        let bad_date = NewTransaction { date: "06/01/2024".into(), ..base.clone() };
        assert!(matches!(create_transaction(&conn, &bad_date), Err(AppError::BadRequest(_))));

        let zero = NewTransaction { amount: Decimal::ZERO, ..base.clone() };
        assert!(matches!(create_transaction(&conn, &zero), Err(AppError::BadRequest(_))));

        let huge = NewTransaction { amount: Decimal::MAX, ..base.clone() };
        assert!(matches!(create_transaction(&conn, &huge), Err(AppError::BadRequest(_))));

        let at_limit = NewTransaction { amount: Decimal::from(MAX_AMOUNT), ..base.clone() };
        assert_eq!(create_transaction(&conn, &at_limit).unwrap().amount, Decimal::from(MAX_AMOUNT));

        let blank = NewTransaction { description: "  ".into(), ..base.clone() };
        assert!(matches!(create_transaction(&conn, &blank), Err(AppError::BadRequest(_))));

        let no_method = NewTransaction { payment_method_id: 999, ..base.clone() };
        assert!(matches!(create_transaction(&conn, &no_method), Err(AppError::NotFound(_))));

        let no_category = NewTransaction { category_id: Some(999), ..base };
        assert!(matches!(create_transaction(&conn, &no_category), Err(AppError::NotFound(_))));
    }
}
