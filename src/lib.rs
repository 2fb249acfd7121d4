//! Credit card billing-cycle tracking: statement windows, payment windows
//! and per-cycle spend/payment totals over a SQLite store.

pub mod api;
pub mod billing;
pub mod config;
pub mod cycle;
pub mod db;
pub mod error;
pub mod models;
pub mod records;
