use std::path::PathBuf;
use std::process::ExitCode;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use tabled::Table;

use card_cycle_tracker::billing;
use card_cycle_tracker::config::{DEFAULT_DB_PATH, init_tracing};
use card_cycle_tracker::cycle::{CycleMode, CycleWindow, parse_iso_date, to_iso_date};
use card_cycle_tracker::db;
use card_cycle_tracker::error::AppError;
use card_cycle_tracker::models::{
    CategoryKind, NewCategory, NewCreditCard, NewPaymentMethod, NewTransaction, PaymentMethodKind,
    Transaction,
};
use card_cycle_tracker::records;

/// Credit card cycle tracker — statement windows, payments and debt per card
#[derive(Parser)]
#[command(name = "card-cycle-tracker", version, about)]
struct Cli {
    /// SQLite database file
    #[arg(long, global = true, env = "CARD_CYCLE_DB", default_value = DEFAULT_DB_PATH)]
    db: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a payment method (cash, debit account or credit card)
    AddPaymentMethod {
        #[arg(long)]
        name: String,
        #[arg(long, value_enum)]
        kind: PaymentMethodKind,
        #[arg(long, default_value_t = 0)]
        sort_order: i64,
    },

    /// List payment methods
    ListPaymentMethods,

    /// Add a category
    AddCategory {
        #[arg(long)]
        name: String,
        #[arg(long, value_enum)]
        kind: CategoryKind,
    },

    /// List active categories
    ListCategories,

    /// Attach billing settings to a credit payment method
    AddCard {
        /// ID of a CREDIT payment method
        #[arg(long)]
        payment_method_id: i64,
        /// Day of month the statement closes (1-31)
        #[arg(long)]
        cutoff_day: u32,
        /// Days after the cutoff that payment is due (1-31)
        #[arg(long)]
        due_day: Option<u32>,
        /// TRACKING category whose transactions count as payments to this card
        #[arg(long)]
        payment_category_id: Option<i64>,
    },

    /// List all saved credit cards
    ListCards,

    /// Remove a credit card by ID
    RemoveCard {
        #[arg(long)]
        id: i64,
    },

    /// Record a transaction
    AddTransaction {
        /// YYYY-MM-DD
        #[arg(long)]
        date: String,
        #[arg(long)]
        amount: Decimal,
        #[arg(long)]
        description: String,
        #[arg(long)]
        payment_method_id: i64,
        /// Defaults to the unidentified category
        #[arg(long)]
        category_id: Option<i64>,
        #[arg(long)]
        note: Option<String>,
    },

    /// List transactions between two dates, inclusive
    ListTransactions {
        /// YYYY-MM-DD
        #[arg(long, value_parser = parse_date)]
        from: NaiveDate,
        /// YYYY-MM-DD
        #[arg(long, value_parser = parse_date)]
        to: NaiveDate,
    },

    /// Spend, payments and debt of every card for one cycle
    Summary {
        /// current or previous
        #[arg(long, value_parser = parse_cycle, default_value = "current")]
        cycle: CycleMode,
        /// Reference date (YYYY-MM-DD); defaults to today
        #[arg(long, value_parser = parse_date)]
        today: Option<NaiveDate>,
    },

    /// Transactions behind one card's cycle
    Cycle {
        #[arg(long)]
        id: i64,
        /// current or previous
        #[arg(long, value_parser = parse_cycle, default_value = "current")]
        cycle: CycleMode,
        /// Reference date (YYYY-MM-DD); defaults to today
        #[arg(long, value_parser = parse_date)]
        today: Option<NaiveDate>,
    },
}

fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    parse_iso_date(raw).ok_or_else(|| format!("'{raw}' is not a YYYY-MM-DD date"))
}

fn parse_cycle(raw: &str) -> Result<CycleMode, String> {
    match raw {
        "current" => Ok(CycleMode::Current),
        "previous" => Ok(CycleMode::Previous),
        other => Err(format!("'{other}' is not a cycle, use current or previous")),
    }
}

fn run(cli: Cli) -> Result<(), AppError> {
    let conn = db::init_db(&cli.db)?;
    let today_or_now = |today: Option<NaiveDate>| today.unwrap_or_else(|| chrono::Local::now().date_naive());

    match cli.command {
        Commands::AddPaymentMethod { name, kind, sort_order } => {
            let input = NewPaymentMethod { name, kind, is_active: None, sort_order: Some(sort_order) };
            let created = records::create_payment_method(&conn, &input)?;
            println!("Added {} payment method '{}' with ID {}", created.kind, created.name, created.id);
        }

        Commands::ListPaymentMethods => {
            let methods = db::list_payment_methods(&conn)?;
            if methods.is_empty() {
                println!("No payment methods found. Add one with: card-cycle-tracker add-payment-method --name \"...\" --kind credit");
            } else {
                println!("{}", Table::new(&methods));
            }
        }

        Commands::AddCategory { name, kind } => {
            let created = records::create_category(&conn, &NewCategory { name, kind, sort_order: None })?;
            println!("Added {} category '{}' with ID {}", created.kind, created.name, created.id);
        }

        Commands::ListCategories => {
            println!("{}", Table::new(&db::list_categories(&conn)?));
        }

        Commands::AddCard {
            payment_method_id,
            cutoff_day,
            due_day,
            payment_category_id,
        } => {
            let input = NewCreditCard { payment_method_id, cutoff_day, due_day, payment_category_id };
            let card = records::create_credit_card(&conn, &input)?;
            println!(
                "Added card '{}' with ID {} (cutoff day {})",
                card.payment_method_name, card.id, card.cutoff_day
            );
        }

        Commands::ListCards => {
            let cards = db::list_credit_cards(&conn)?;
            if cards.is_empty() {
                println!("No cards found. Add one with: card-cycle-tracker add-card --payment-method-id 1 --cutoff-day 20");
            } else {
                println!("{}", Table::new(&cards));
            }
        }

        Commands::RemoveCard { id } => {
            records::delete_credit_card(&conn, id)?;
            println!("Removed card with ID {}", id);
        }

        Commands::AddTransaction {
            date,
            amount,
            description,
            payment_method_id,
            category_id,
            note,
        } => {
            let input = NewTransaction { date, amount, description, payment_method_id, category_id, note };
            let created = records::create_transaction(&conn, &input)?;
            println!(
                "Added transaction {} on {} for {}",
                created.id,
                to_iso_date(created.date),
                created.amount
            );
        }

        Commands::ListTransactions { from, to } => {
            if from > to {
                return Err(AppError::BadRequest("--from must not be after --to".into()));
            }
            let rows = db::list_transactions(&conn, &CycleWindow { start: from, end: to })?;
            if rows.is_empty() {
                println!("No transactions between {} and {}.", to_iso_date(from), to_iso_date(to));
            } else {
                let transactions: Vec<Transaction> = rows.into_iter().map(Transaction::from).collect();
                println!("{}", Table::new(&transactions));
            }
        }

        Commands::Summary { cycle, today } => {
            let summaries = billing::summarize_cards(&conn, today_or_now(today), cycle)?;
            if summaries.is_empty() {
                println!("No cards found.");
            } else {
                println!("{}", Table::new(&summaries));
            }
        }

        Commands::Cycle { id, cycle, today } => {
            let detail = billing::cycle_detail(&conn, id, today_or_now(today), cycle)?;
            println!(
                "{}: cycle {} .. {}",
                detail.card.payment_method_name,
                to_iso_date(detail.cycle_start),
                to_iso_date(detail.cycle_end)
            );
            if let (Some(start), Some(end)) = (detail.card.payment_window_start, detail.card.payment_window_end) {
                println!("Payment window {} .. {}", to_iso_date(start), to_iso_date(end));
            }
            if detail.items.is_empty() {
                println!("No transactions in this cycle.");
            } else {
                println!("{}", Table::new(&detail.items));
            }
        }
    }

    Ok(())
}

fn main() -> ExitCode {
    init_tracing("warn");

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
