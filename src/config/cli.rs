use crate::config::AppConfig;
use crate::domain::model::DateRange;
use crate::utils::error::Result;
use clap::{Parser, Subcommand};

fn load_app_config(path: Option<&str>) -> Result<AppConfig> {
    match path {
        Some(path) => AppConfig::from_file(path),
        None => Ok(AppConfig::from_env()),
    }
}

#[derive(Debug, Clone, Parser)]
#[command(name = "amc-etl")]
#[command(about = "Move Amazon Marketing Cloud query results into Snowflake")]
pub struct CliConfig {
    /// TOML configuration file; environment variables are used when omitted
    #[arg(long, global = true)]
    pub config: Option<String>,

    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Run one ETL job and print the result as JSON
    Run {
        #[arg(long)]
        query_name: String,

        /// Replaces {{start_date}} in the query (YYYY-MM-DD)
        #[arg(long)]
        start_date: Option<String>,

        /// Replaces {{end_date}} in the query (YYYY-MM-DD)
        #[arg(long)]
        end_date: Option<String>,
    },
    /// Check that every required setting is present and well-formed
    CheckConfig,
    /// List the query names in the catalog
    ListQueries,
}

impl Command {
    pub fn date_range(&self) -> DateRange {
        match self {
            Command::Run {
                start_date,
                end_date,
                ..
            } => DateRange::new(start_date.clone(), end_date.clone()),
            _ => DateRange::default(),
        }
    }
}

impl CliConfig {
    pub fn load_app_config(&self) -> Result<AppConfig> {
        load_app_config(self.config.as_deref())
    }
}

#[derive(Debug, Clone, Parser)]
#[command(name = "amc-etl-server")]
#[command(about = "HTTP trigger for the AMC to Snowflake pipeline")]
pub struct ServerConfig {
    #[arg(long, default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, default_value_t = 8080)]
    pub port: u16,

    #[arg(long)]
    pub config: Option<String>,

    #[arg(short, long, help = "Enable verbose output")]
    pub verbose: bool,
}

impl ServerConfig {
    pub fn load_app_config(&self) -> Result<AppConfig> {
        load_app_config(self.config.as_deref())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
