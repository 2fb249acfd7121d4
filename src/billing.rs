//! Per-card statement views: spend and payment totals for a resolved cycle.

use chrono::NaiveDate;
use rusqlite::Connection;
use rust_decimal::Decimal;

use crate::cycle::{
    CycleMode, CycleWindow, derive_payment_range, derive_payment_window, is_within_window,
    resolve_cycle,
};
use crate::db;
use crate::error::{AppError, AppResult};
use crate::models::{
    AmountSum, CardCycleSummary, CreditCard, CycleCard, CycleDetail, CycleItem, CycleItemKind,
    TransactionRow,
};

/// The windows a card's totals are computed against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CardWindows {
    pub cycle: CycleWindow,
    pub payment_window: Option<CycleWindow>,
    /// Where payments are searched: the payment window, else the cycle.
    pub payment_range: CycleWindow,
    pub in_payment_window: bool,
}

impl CardWindows {
    pub fn resolve(card: &CreditCard, today: NaiveDate, mode: CycleMode) -> Self {
        let cycle = resolve_cycle(today, card.cutoff_day, mode);
        let payment_window = derive_payment_window(&cycle, card.due_day);
        CardWindows {
            cycle,
            payment_window,
            payment_range: derive_payment_range(&cycle, card.due_day),
            in_payment_window: is_within_window(today, payment_window.as_ref()),
        }
    }
}

fn checked_total(card_id: i64, what: &str, sum: AmountSum) -> Decimal {
    if !sum.unreadable.is_empty() {
        tracing::warn!(
            card_id,
            transactions = ?sum.unreadable,
            "{what} total skips transactions with unreadable amounts"
        );
    }
    if !sum.overflowed.is_empty() {
        tracing::warn!(
            card_id,
            transactions = ?sum.overflowed,
            "{what} total skips transactions that overflow it"
        );
    }
    sum.total
}

/// Spend, payments and debt of one card for the cycle selected by `mode`.
pub fn card_summary(
    conn: &Connection,
    card: &CreditCard,
    today: NaiveDate,
    mode: CycleMode,
) -> AppResult<CardCycleSummary> {
    let windows = CardWindows::resolve(card, today, mode);

    let spent = db::sum_by_payment_method(conn, card.payment_method_id, &windows.cycle)?;
    let spent = checked_total(card.id, "spent", spent);

    let paid = match card.payment_category_id {
        Some(category_id) => {
            let paid = db::sum_by_category(conn, category_id, &windows.payment_range)?;
            checked_total(card.id, "paid", paid)
        }
        None => Decimal::ZERO,
    };

    let debt = (spent - paid).max(Decimal::ZERO);

    Ok(CardCycleSummary {
        id: card.id,
        payment_method_id: card.payment_method_id,
        payment_method_name: card.payment_method_name.clone(),
        cutoff_day: card.cutoff_day,
        due_day: card.due_day,
        payment_category_id: card.payment_category_id,
        payment_category_name: card.payment_category_name.clone(),
        cycle_start: windows.cycle.start,
        cycle_end: windows.cycle.end,
        payment_window_start: windows.payment_window.map(|w| w.start),
        payment_window_end: windows.payment_window.map(|w| w.end),
        is_in_payment_window: windows.in_payment_window,
        spent,
        paid,
        debt,
    })
}

/// Summaries for every card, in creation order.
pub fn summarize_cards(conn: &Connection, today: NaiveDate, mode: CycleMode) -> AppResult<Vec<CardCycleSummary>> {
    let cards = db::list_credit_cards(conn)?;
    tracing::debug!(cards = cards.len(), ?mode, %today, "summarizing credit cards");
    cards
        .iter()
        .map(|card| card_summary(conn, card, today, mode))
        .collect()
}

fn to_item(row: TransactionRow, kind: CycleItemKind) -> CycleItem {
    let amount = row.amount_or_zero();
    CycleItem {
        id: row.id,
        date: row.date,
        amount,
        description: row.description,
        kind,
        category_name: row.category_name,
    }
}

/// The transactions behind a card's cycle totals, oldest first.
///
/// Spend rows come before payment rows on the same date.
pub fn cycle_detail(conn: &Connection, card_id: i64, today: NaiveDate, mode: CycleMode) -> AppResult<CycleDetail> {
    let card = db::get_credit_card(conn, card_id)?
        .ok_or_else(|| AppError::NotFound("credit card".into()))?;
    let windows = CardWindows::resolve(&card, today, mode);

    let spent = db::list_by_payment_method(conn, card.payment_method_id, &windows.cycle)?;
    let payments = match card.payment_category_id {
        Some(category_id) => db::list_by_category(conn, category_id, &windows.payment_range)?,
        None => Vec::new(),
    };

    let mut items: Vec<CycleItem> = spent
        .into_iter()
        .map(|row| to_item(row, CycleItemKind::Spent))
        .chain(payments.into_iter().map(|row| to_item(row, CycleItemKind::Payment)))
        .collect();
    // stable: keeps spend-then-payment and creation order on equal dates
    items.sort_by_key(|item| item.date);

    Ok(CycleDetail {
        card: CycleCard {
            id: card.id,
            payment_method_id: card.payment_method_id,
            payment_method_name: card.payment_method_name,
            cutoff_day: card.cutoff_day,
            due_day: card.due_day,
            payment_category_name: card.payment_category_name,
            payment_window_start: windows.payment_window.map(|w| w.start),
            payment_window_end: windows.payment_window.map(|w| w.end),
            is_in_payment_window: windows.in_payment_window,
        },
        cycle_start: windows.cycle.start,
        cycle_end: windows.cycle.end,
        items,
    })
}
