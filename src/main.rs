use amc_etl::config::cli::Command;
use amc_etl::utils::error::ErrorSeverity;
use amc_etl::utils::{logger, validation::Validate};
use amc_etl::{CliConfig, EtlEngine, EtlError, LocalStorage, QueryCatalog};
use clap::Parser;

async fn execute(cli: &CliConfig) -> Result<(), EtlError> {
    let config = cli.load_app_config()?;

    match &cli.command {
        Command::Run { query_name, .. } => {
            LocalStorage::new(config.queries_dir()?).ensure_base_dir()?;

            let engine = EtlEngine::from_config(&config)?;
            let result = engine.run(query_name, &cli.command.date_range()).await?;

            tracing::info!("✅ ETL process completed successfully!");
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::CheckConfig => {
            config.validate()?;
            println!("✅ Configuration is valid");
        }
        Command::ListQueries => {
            let catalog = QueryCatalog::new(LocalStorage::new(config.queries_dir()?));
            let mut names: Vec<String> = catalog.load().await?.into_keys().collect();
            names.sort();
            for name in names {
                println!("{}", name);
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = CliConfig::parse();

    // 初始化日誌
    logger::init_cli_logger(cli.verbose);
    tracing::info!("Starting amc-etl CLI");
    tracing::debug!("CLI config: {:?}", cli);

    if let Err(e) = execute(&cli).await {
        tracing::error!(
            "❌ ETL process failed: {} (Category: {:?}, Severity: {:?})",
            e,
            e.category(),
            e.severity()
        );
        eprintln!("❌ {}", e.user_friendly_message());
        eprintln!("💡 Suggestion: {}", e.recovery_suggestion());

        // 根據錯誤嚴重程度決定退出碼
        let exit_code = match e.severity() {
            ErrorSeverity::Low | ErrorSeverity::High => 1, // 請求或處理錯誤
            ErrorSeverity::Medium => 2,                    // 來源錯誤，可重試
            ErrorSeverity::Critical => 3,                  // 配置或系統錯誤
        };
        std::process::exit(exit_code);
    }
}
