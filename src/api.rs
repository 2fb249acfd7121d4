//! HTTP routes. Handlers lock the shared connection, run synchronous
//! queries and release it before returning; nothing awaits under the lock.

use std::sync::{Arc, Mutex, MutexGuard};

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, patch};
use axum::{Json, Router};
use chrono::NaiveDate;
use rusqlite::Connection;
use serde::Deserialize;
use serde_json::{Value, json};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::billing;
use crate::cycle::{CycleMode, CycleWindow, parse_iso_date};
use crate::db;
use crate::error::{AppError, AppResult};
use crate::models::{
    CardCycleSummary, Category, CreditCard, CreditCardPatch, CycleDetail, NewCategory,
    NewCreditCard, NewPaymentMethod, NewTransaction, PaymentMethod, PaymentMethodPatch,
    Transaction,
};
use crate::records;

type Clock = Arc<dyn Fn() -> NaiveDate + Send + Sync>;

#[derive(Clone)]
pub struct AppState {
    db: Arc<Mutex<Connection>>,
    today: Clock,
}

impl AppState {
    /// State whose reference date is the server's local calendar day.
    pub fn new(conn: Connection) -> Self {
        Self::with_clock(conn, || chrono::Local::now().date_naive())
    }

    pub fn with_clock(conn: Connection, today: impl Fn() -> NaiveDate + Send + Sync + 'static) -> Self {
        AppState {
            db: Arc::new(Mutex::new(conn)),
            today: Arc::new(today),
        }
    }

    fn conn(&self) -> AppResult<MutexGuard<'_, Connection>> {
        self.db.lock().map_err(|_| AppError::LockPoisoned)
    }

    fn today(&self) -> NaiveDate {
        (self.today)()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/payment-methods", get(list_payment_methods).post(create_payment_method))
        .route(
            "/payment-methods/:id",
            patch(update_payment_method).delete(delete_payment_method),
        )
        .route("/categories", get(list_categories).post(create_category))
        .route("/credit-cards", get(list_credit_cards).post(create_credit_card))
        .route("/credit-cards/summary", get(credit_card_summary))
        .route(
            "/credit-cards/:id",
            patch(update_credit_card).delete(delete_credit_card),
        )
        .route("/credit-cards/:id/cycle", get(credit_card_cycle))
        .route("/transactions", get(list_transactions).post(create_transaction))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "ok": true }))
}

// Extractors are taken as `Result` so malformed input answers with the
// same JSON envelope as every other 400.
type JsonBody<T> = Result<Json<T>, JsonRejection>;
type IdPath = Result<Path<i64>, PathRejection>;
type QueryParams<T> = Result<Query<T>, QueryRejection>;

async fn list_payment_methods(State(state): State<AppState>) -> AppResult<Json<Vec<PaymentMethod>>> {
    let conn = state.conn()?;
    Ok(Json(db::list_payment_methods(&conn)?))
}

async fn create_payment_method(
    State(state): State<AppState>,
    body: JsonBody<NewPaymentMethod>,
) -> AppResult<(StatusCode, Json<PaymentMethod>)> {
    let Json(body) = body?;
    let conn = state.conn()?;
    let created = records::create_payment_method(&conn, &body)?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn update_payment_method(
    State(state): State<AppState>,
    id: IdPath,
    body: JsonBody<PaymentMethodPatch>,
) -> AppResult<Json<PaymentMethod>> {
    let (Path(id), Json(body)) = (id?, body?);
    let conn = state.conn()?;
    Ok(Json(records::update_payment_method(&conn, id, &body)?))
}

async fn delete_payment_method(State(state): State<AppState>, id: IdPath) -> AppResult<StatusCode> {
    let Path(id) = id?;
    let conn = state.conn()?;
    records::delete_payment_method(&conn, id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_categories(State(state): State<AppState>) -> AppResult<Json<Vec<Category>>> {
    let conn = state.conn()?;
    Ok(Json(db::list_categories(&conn)?))
}

async fn create_category(
    State(state): State<AppState>,
    body: JsonBody<NewCategory>,
) -> AppResult<(StatusCode, Json<Category>)> {
    let Json(body) = body?;
    let conn = state.conn()?;
    let created = records::create_category(&conn, &body)?;
    Ok((StatusCode::CREATED, Json(created)))
}

#[derive(Debug, Default, Deserialize)]
struct CycleQuery {
    #[serde(default)]
    cycle: CycleMode,
}

async fn list_credit_cards(State(state): State<AppState>) -> AppResult<Json<Vec<CreditCard>>> {
    let conn = state.conn()?;
    Ok(Json(db::list_credit_cards(&conn)?))
}

async fn create_credit_card(
    State(state): State<AppState>,
    body: JsonBody<NewCreditCard>,
) -> AppResult<(StatusCode, Json<CreditCard>)> {
    let Json(body) = body?;
    let conn = state.conn()?;
    let created = records::create_credit_card(&conn, &body)?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn update_credit_card(
    State(state): State<AppState>,
    id: IdPath,
    body: JsonBody<CreditCardPatch>,
) -> AppResult<Json<CreditCard>> {
    let (Path(id), Json(body)) = (id?, body?);
    let conn = state.conn()?;
    Ok(Json(records::update_credit_card(&conn, id, &body)?))
}

async fn delete_credit_card(State(state): State<AppState>, id: IdPath) -> AppResult<StatusCode> {
    let Path(id) = id?;
    let conn = state.conn()?;
    records::delete_credit_card(&conn, id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn credit_card_summary(
    State(state): State<AppState>,
    query: QueryParams<CycleQuery>,
) -> AppResult<Json<Vec<CardCycleSummary>>> {
    let Query(query) = query?;
    let today = state.today();
    let conn = state.conn()?;
    Ok(Json(billing::summarize_cards(&conn, today, query.cycle)?))
}

async fn credit_card_cycle(
    State(state): State<AppState>,
    id: IdPath,
    query: QueryParams<CycleQuery>,
) -> AppResult<Json<CycleDetail>> {
    let (Path(id), Query(query)) = (id?, query?);
    let today = state.today();
    let conn = state.conn()?;
    Ok(Json(billing::cycle_detail(&conn, id, today, query.cycle)?))
}

#[derive(Debug, Deserialize)]
struct RangeQuery {
    from: String,
    to: String,
}

async fn list_transactions(
    State(state): State<AppState>,
    query: QueryParams<RangeQuery>,
) -> AppResult<Json<Vec<Transaction>>> {
    let Query(query) = query?;
    let parse = |raw: &str, field: &str| {
        parse_iso_date(raw).ok_or_else(|| AppError::BadRequest(format!("{field} must be YYYY-MM-DD")))
    };
    let range = CycleWindow {
        start: parse(&query.from, "from")?,
        end: parse(&query.to, "to")?,
    };
    if range.start > range.end {
        return Err(AppError::BadRequest("from must not be after to".into()));
    }

    let conn = state.conn()?;
    let rows = db::list_transactions(&conn, &range)?;
    Ok(Json(rows.into_iter().map(Transaction::from).collect()))
}

async fn create_transaction(
    State(state): State<AppState>,
    body: JsonBody<NewTransaction>,
) -> AppResult<(StatusCode, Json<Transaction>)> {
    let Json(body) = body?;
    let conn = state.conn()?;
    let created = records::create_transaction(&conn, &body)?;
    Ok((StatusCode::CREATED, Json(created)))
}
