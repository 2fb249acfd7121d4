use card_cycle_tracker::api::{self, AppState};
use card_cycle_tracker::config::{ServerConfig, init_tracing};
use card_cycle_tracker::db;
use clap::Parser;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = ServerConfig::parse();
    init_tracing("card_cycle_tracker=info,tower_http=info");

    let conn = db::init_db(&config.db)?;
    tracing::info!(db = %config.db.display(), "database ready");

    let app = api::router(AppState::new(conn));

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "listening");
    axum::serve(listener, app).await?;

    Ok(())
}
