use crate::domain::model::{DateRange, QueryDefinition};
use crate::domain::ports::Storage;
use crate::utils::error::{EtlError, Result};
use std::collections::HashMap;

pub const QUERY_FILE: &str = "amc_queries.json";
pub const START_DATE_PLACEHOLDER: &str = "{{start_date}}";
pub const END_DATE_PLACEHOLDER: &str = "{{end_date}}";

/// Named SQL templates read from `amc_queries.json`.
///
/// The file is re-read on every call so edits apply to the next run without a restart.
pub struct QueryCatalog<S: Storage> {
    storage: S,
}

impl<S: Storage> QueryCatalog<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    pub async fn load(&self) -> Result<HashMap<String, QueryDefinition>> {
        let bytes = self.storage.read_file(QUERY_FILE).await?;
        let mut definitions: HashMap<String, QueryDefinition> = serde_json::from_slice(&bytes)?;
        for (name, definition) in definitions.iter_mut() {
            definition.name = name.clone();
        }
        Ok(definitions)
    }

    pub async fn resolve(&self, query_name: &str, range: &DateRange) -> Result<String> {
        let definitions = self.load().await?;
        let definition = definitions
            .get(query_name)
            .ok_or_else(|| EtlError::UnknownQuery {
                name: query_name.to_string(),
            })?;

        tracing::debug!("Resolved query '{}'", definition.name);
        Ok(substitute_dates(&definition.sql, range))
    }
}

/// Replaces the date placeholders verbatim. Values are not escaped or checked.
pub fn substitute_dates(sql: &str, range: &DateRange) -> String {
    let mut resolved = sql.to_string();
    // 空字串視同未提供
    if let Some(start) = range.start_date.as_deref().filter(|s| !s.is_empty()) {
        resolved = resolved.replace(START_DATE_PLACEHOLDER, start);
    }
    if let Some(end) = range.end_date.as_deref().filter(|s| !s.is_empty()) {
        resolved = resolved.replace(END_DATE_PLACEHOLDER, end);
    }
    resolved
}
