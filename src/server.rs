use amc_etl::config::cli::ServerConfig;
use amc_etl::utils::logger;
use amc_etl::{http, LocalStorage};
use clap::Parser;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = ServerConfig::parse();
    logger::init_server_logger(args.verbose);

    let config = args.load_app_config()?;

    // 啟動時建立查詢目錄
    let queries_dir = config.queries_dir()?.to_string();
    LocalStorage::new(&queries_dir).ensure_base_dir()?;
    tracing::info!("📁 Query catalog directory: {}", queries_dir);

    let app = http::router(Arc::new(config));
    let listener = tokio::net::TcpListener::bind(args.bind_address()).await?;
    tracing::info!("🌐 Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
