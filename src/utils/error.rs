use thiserror::Error;

#[derive(Error, Debug)]
pub enum EtlError {
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("Query '{name}' not found in query definitions")]
    UnknownQuery { name: String },

    #[error("Failed to authenticate with AMC: {message}")]
    AuthFailure { message: String },

    #[error("Failed to extract data from AMC: {body}")]
    ExtractionFailure { status: u16, body: String },

    #[error("Malformed date in column '{column}' (row {row}): '{value}'")]
    MalformedDate {
        column: String,
        row: usize,
        value: String,
    },

    #[error("Failed to load data to Snowflake: {message}")]
    LoadFailure { message: String },

    #[error("API request failed: {0}")]
    ApiError(#[from] reqwest::Error),

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    UrlError(#[from] url::ParseError),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Invalid configuration value for {field} ('{value}'): {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Request,
    Configuration,
    Source,
    Data,
    Warehouse,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl EtlError {
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    pub fn load_failure(message: impl std::fmt::Display) -> Self {
        Self::LoadFailure {
            message: message.to_string(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            EtlError::InvalidRequest { .. } | EtlError::UnknownQuery { .. } => {
                ErrorCategory::Request
            }
            EtlError::ConfigError { .. }
            | EtlError::MissingConfigError { .. }
            | EtlError::InvalidConfigValueError { .. }
            | EtlError::UrlError(_) => ErrorCategory::Configuration,
            EtlError::AuthFailure { .. }
            | EtlError::ExtractionFailure { .. }
            | EtlError::ApiError(_) => ErrorCategory::Source,
            EtlError::MalformedDate { .. }
            | EtlError::CsvError(_)
            | EtlError::SerializationError(_) => ErrorCategory::Data,
            EtlError::LoadFailure { .. } => ErrorCategory::Warehouse,
            EtlError::IoError(_) => ErrorCategory::System,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Request => ErrorSeverity::Low,
            ErrorCategory::Source => ErrorSeverity::Medium,
            ErrorCategory::Data | ErrorCategory::Warehouse => ErrorSeverity::High,
            ErrorCategory::Configuration | ErrorCategory::System => ErrorSeverity::Critical,
        }
    }

    /// 呼叫端看到的錯誤只有文字，沒有結構化的種類
    pub fn user_friendly_message(&self) -> String {
        match self {
            EtlError::InvalidRequest { message } => message.clone(),
            EtlError::MissingConfigError { field } => {
                format!("{} is not configured", field)
            }
            other => other.to_string(),
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            EtlError::InvalidRequest { .. } => "Provide a non-empty query_name in the request",
            EtlError::UnknownQuery { .. } => {
                "Check the query name against amc_queries.json in the queries directory"
            }
            EtlError::AuthFailure { .. } => "Verify AMC_CLIENT_ID and AMC_CLIENT_SECRET",
            EtlError::ExtractionFailure { .. } => {
                "Inspect the AMC response body and the SQL of the selected query"
            }
            EtlError::ApiError(_) => "Check network connectivity to AMC_API_ENDPOINT",
            EtlError::MalformedDate { .. } => {
                "Make sure every *date* column returned by the query holds a valid date"
            }
            EtlError::CsvError(_) | EtlError::SerializationError(_) => {
                "Check the format of the data returned by AMC or the query file"
            }
            EtlError::LoadFailure { .. } => {
                "Verify the SNOWFLAKE_* settings and the target table permissions"
            }
            EtlError::IoError(_) => "Check that the queries directory exists and is readable",
            EtlError::ConfigError { .. }
            | EtlError::MissingConfigError { .. }
            | EtlError::InvalidConfigValueError { .. }
            | EtlError::UrlError(_) => {
                "Set the missing environment variables or fix the configuration file"
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, EtlError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_errors_are_low_severity() {
        let err = EtlError::invalid_request("Query name is required");
        assert_eq!(err.category(), ErrorCategory::Request);
        assert_eq!(err.severity(), ErrorSeverity::Low);
        assert_eq!(err.user_friendly_message(), "Query name is required");
    }

    #[test]
    fn test_extraction_failure_message_carries_body() {
        let err = EtlError::ExtractionFailure {
            status: 500,
            body: "query timed out".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Failed to extract data from AMC: query timed out"
        );
        assert_eq!(err.category(), ErrorCategory::Source);
    }

    #[test]
    fn test_config_errors_are_critical() {
        let err = EtlError::MissingConfigError {
            field: "AMC_API_ENDPOINT".to_string(),
        };
        assert_eq!(err.severity(), ErrorSeverity::Critical);
        assert_eq!(
            err.user_friendly_message(),
            "AMC_API_ENDPOINT is not configured"
        );
    }
}
