#[cfg(feature = "cli")]
pub mod cli;

use crate::utils::error::{EtlError, Result};
use crate::utils::validation::{
    validate_path, validate_positive_number, validate_required_field, validate_url, Validate,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;

pub const DEFAULT_QUERIES_DIR: &str = "queries";
pub const DEFAULT_CHUNK_SIZE: usize = 16_000;

/// Process-wide settings, built once at startup and handed to each component by reference.
///
/// Nothing is validated while loading: a missing value only surfaces as
/// [`EtlError::MissingConfigError`] when the component that needs it asks for it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub amc: AmcConfig,
    #[serde(default)]
    pub snowflake: SnowflakeConfig,
    pub queries_dir: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AmcConfig {
    pub api_endpoint: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SnowflakeConfig {
    pub user: Option<String>,
    pub password: Option<String>,
    pub account: Option<String>,
    pub warehouse: Option<String>,
    pub database: Option<String>,
    pub schema: Option<String>,
    /// 覆蓋預設的 `https://<account>.snowflakecomputing.com`
    pub host: Option<String>,
    /// Kept as written; parsed by [`SnowflakeConfig::chunk_size`].
    #[serde(default, deserialize_with = "number_or_string")]
    pub chunk_size: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawSetting {
    Number(i64),
    Text(String),
}

/// TOML may give `chunk_size = 500` or `chunk_size = "${SNOWFLAKE_CHUNK_SIZE}"`.
fn number_or_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<RawSetting>::deserialize(deserializer)?.map(|raw| match raw {
        RawSetting::Number(n) => n.to_string(),
        RawSetting::Text(s) => s,
    }))
}

fn var(name: &str) -> Option<String> {
    env::var(name).ok()
}

impl AppConfig {
    /// 從環境變數載入配置
    pub fn from_env() -> Self {
        Self {
            amc: AmcConfig {
                api_endpoint: var("AMC_API_ENDPOINT"),
                client_id: var("AMC_CLIENT_ID"),
                client_secret: var("AMC_CLIENT_SECRET"),
            },
            snowflake: SnowflakeConfig {
                user: var("SNOWFLAKE_USER"),
                password: var("SNOWFLAKE_PASSWORD"),
                account: var("SNOWFLAKE_ACCOUNT"),
                warehouse: var("SNOWFLAKE_WAREHOUSE"),
                database: var("SNOWFLAKE_DATABASE"),
                schema: var("SNOWFLAKE_SCHEMA"),
                host: var("SNOWFLAKE_HOST"),
                chunk_size: var("SNOWFLAKE_CHUNK_SIZE"),
            },
            queries_dir: var("QUERIES_DIR"),
        }
    }

    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(EtlError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置，`${VAR}` 會先以環境變數替換
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content);

        let mut config: AppConfig =
            toml::from_str(&processed_content).map_err(|e| EtlError::ConfigError {
                message: format!("TOML parsing error: {}", e),
            })?;
        config.clear_unresolved();
        Ok(config)
    }

    fn substitute_env_vars(content: &str) -> String {
        use regex::Regex;
        use std::sync::OnceLock;

        static ENV_VAR: OnceLock<Regex> = OnceLock::new();
        let re = ENV_VAR.get_or_init(|| Regex::new(r"\$\{([^}]+)\}").expect("valid regex"));

        re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        })
        .into_owned()
    }

    /// An unset `${VAR}` counts as "not configured" rather than as a literal value.
    fn clear_unresolved(&mut self) {
        let fields = [
            &mut self.amc.api_endpoint,
            &mut self.amc.client_id,
            &mut self.amc.client_secret,
            &mut self.snowflake.user,
            &mut self.snowflake.password,
            &mut self.snowflake.account,
            &mut self.snowflake.warehouse,
            &mut self.snowflake.database,
            &mut self.snowflake.schema,
            &mut self.snowflake.host,
            &mut self.snowflake.chunk_size,
            &mut self.queries_dir,
        ];
        for field in fields {
            if field
                .as_deref()
                .is_some_and(|v| v.starts_with("${") && v.ends_with('}'))
            {
                *field = None;
            }
        }
    }

    pub fn queries_dir(&self) -> Result<&str> {
        let dir = self.queries_dir.as_deref().unwrap_or(DEFAULT_QUERIES_DIR);
        validate_path("QUERIES_DIR", dir)?;
        Ok(dir)
    }
}

impl AmcConfig {
    pub fn api_endpoint(&self) -> Result<&str> {
        let endpoint = validate_required_field("AMC_API_ENDPOINT", &self.api_endpoint)?;
        validate_url("AMC_API_ENDPOINT", endpoint)?;
        Ok(endpoint)
    }

    pub fn client_id(&self) -> Result<&str> {
        validate_required_field("AMC_CLIENT_ID", &self.client_id)
    }

    pub fn client_secret(&self) -> Result<&str> {
        validate_required_field("AMC_CLIENT_SECRET", &self.client_secret)
    }
}

impl SnowflakeConfig {
    pub fn user(&self) -> Result<&str> {
        validate_required_field("SNOWFLAKE_USER", &self.user)
    }

    pub fn password(&self) -> Result<&str> {
        validate_required_field("SNOWFLAKE_PASSWORD", &self.password)
    }

    pub fn account(&self) -> Result<&str> {
        validate_required_field("SNOWFLAKE_ACCOUNT", &self.account)
    }

    pub fn warehouse(&self) -> Result<&str> {
        validate_required_field("SNOWFLAKE_WAREHOUSE", &self.warehouse)
    }

    pub fn database(&self) -> Result<&str> {
        validate_required_field("SNOWFLAKE_DATABASE", &self.database)
    }

    pub fn schema(&self) -> Result<&str> {
        validate_required_field("SNOWFLAKE_SCHEMA", &self.schema)
    }

    /// Base URL of the account's REST endpoints, without a trailing slash.
    pub fn base_url(&self) -> Result<String> {
        match self.host.as_deref() {
            Some(host) => {
                validate_url("SNOWFLAKE_HOST", host)?;
                Ok(host.trim_end_matches('/').to_string())
            }
            None => Ok(format!("https://{}.snowflakecomputing.com", self.account()?)),
        }
    }

    pub fn chunk_size(&self) -> Result<usize> {
        let size = match self.chunk_size.as_deref() {
            None => DEFAULT_CHUNK_SIZE,
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|_| EtlError::InvalidConfigValueError {
                    field: "SNOWFLAKE_CHUNK_SIZE".to_string(),
                    value: raw.to_string(),
                    reason: "Value must be a positive whole number".to_string(),
                })?,
        };
        validate_positive_number("SNOWFLAKE_CHUNK_SIZE", size, 1)?;
        Ok(size)
    }
}

impl Validate for AppConfig {
    /// Checks every setting at once; only the `check-config` command calls this.
    fn validate(&self) -> Result<()> {
        self.amc.api_endpoint()?;
        self.amc.client_id()?;
        self.amc.client_secret()?;

        self.snowflake.user()?;
        self.snowflake.password()?;
        self.snowflake.account()?;
        self.snowflake.warehouse()?;
        self.snowflake.database()?;
        self.snowflake.schema()?;
        self.snowflake.base_url()?;
        self.snowflake.chunk_size()?;

        self.queries_dir()?;

        tracing::info!("✅ Configuration validation passed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_toml_config() {
        let toml_content = r#"
queries_dir = "./sql"

[amc]
api_endpoint = "https://amc.example.com/api/v1/query"
client_id = "client"
client_secret = "secret"

[snowflake]
user = "loader"
password = "pw"
account = "xy12345"
warehouse = "COMPUTE_WH"
database = "ADS"
schema = "AMC"
chunk_size = 500
"#;

        let config = AppConfig::from_toml_str(toml_content).unwrap();

        assert_eq!(
            config.amc.api_endpoint().unwrap(),
            "https://amc.example.com/api/v1/query"
        );
        assert_eq!(config.queries_dir().unwrap(), "./sql");
        assert_eq!(config.snowflake.chunk_size().unwrap(), 500);
        assert_eq!(
            config.snowflake.base_url().unwrap(),
            "https://xy12345.snowflakecomputing.com"
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("AMC_ETL_TEST_CLIENT_ID", "from-env");

        let toml_content = r#"
[amc]
client_id = "${AMC_ETL_TEST_CLIENT_ID}"
client_secret = "${AMC_ETL_TEST_UNSET_SECRET}"
"#;

        let config = AppConfig::from_toml_str(toml_content).unwrap();
        assert_eq!(config.amc.client_id().unwrap(), "from-env");
        assert!(matches!(
            config.amc.client_secret(),
            Err(EtlError::MissingConfigError { field }) if field == "AMC_CLIENT_SECRET"
        ));

        std::env::remove_var("AMC_ETL_TEST_CLIENT_ID");
    }

    #[test]
    fn test_missing_values_only_fail_on_use() {
        let config = AppConfig::default();

        assert_eq!(config.queries_dir().unwrap(), DEFAULT_QUERIES_DIR);
        assert_eq!(config.snowflake.chunk_size().unwrap(), DEFAULT_CHUNK_SIZE);
        assert!(matches!(
            config.amc.api_endpoint(),
            Err(EtlError::MissingConfigError { .. })
        ));
        assert!(matches!(
            config.snowflake.base_url(),
            Err(EtlError::MissingConfigError { field }) if field == "SNOWFLAKE_ACCOUNT"
        ));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_chunk_size_must_be_a_number() {
        let config = SnowflakeConfig {
            chunk_size: Some("lots".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            config.chunk_size(),
            Err(EtlError::InvalidConfigValueError { field, value, .. })
                if field == "SNOWFLAKE_CHUNK_SIZE" && value == "lots"
        ));

        let zero = SnowflakeConfig {
            chunk_size: Some("0".to_string()),
            ..Default::default()
        };
        assert!(zero.chunk_size().is_err());

        let from_toml =
            AppConfig::from_toml_str("[snowflake]\nchunk_size = \"-5\"\n").unwrap();
        assert!(from_toml.snowflake.chunk_size().is_err());
    }

    #[test]
    fn test_chunk_size_from_env() {
        std::env::set_var("SNOWFLAKE_CHUNK_SIZE", "250");
        let config = AppConfig::from_env();
        std::env::remove_var("SNOWFLAKE_CHUNK_SIZE");

        assert_eq!(config.snowflake.chunk_size().unwrap(), 250);
    }

    #[test]
    fn test_host_override_wins_over_account() {
        let config = SnowflakeConfig {
            host: Some("http://127.0.0.1:9999/".to_string()),
            ..Default::default()
        };
        assert_eq!(config.base_url().unwrap(), "http://127.0.0.1:9999");
    }

    #[test]
    fn test_invalid_endpoint_is_rejected() {
        let config = AmcConfig {
            api_endpoint: Some("not a url".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            config.api_endpoint(),
            Err(EtlError::InvalidConfigValueError { .. })
        ));
    }

    #[test]
    fn test_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(b"[snowflake]\naccount = \"acme\"\n")
            .unwrap();

        let config = AppConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(config.snowflake.account().unwrap(), "acme");
    }
}
