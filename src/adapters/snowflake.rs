//! Snowflake warehouse access over the account's REST session API.
//!
//! A session is opened with a password login (`/session/v1/login-request`), statements run
//! through `/queries/v1/query-request`, and `/session?delete=true` logs out.

use crate::config::SnowflakeConfig;
use crate::domain::model::{CellValue, ColumnKind, LoadOutcome, NormalizedTable, Row};
use crate::domain::ports::{WarehouseConnector, WarehouseSession};
use crate::utils::error::{EtlError, Result};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use url::Url;
use uuid::Uuid;

const CLIENT_APP_ID: &str = "amc-etl";
/// Snowflake rejects statement text over 1 MB; stay under it with room for the request envelope.
pub const MAX_STATEMENT_BYTES: usize = 900_000;

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    success: bool,
    message: Option<String>,
    code: Option<String>,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct LoginData {
    token: String,
}

#[derive(Debug, Default, Deserialize)]
struct QueryData {
    #[serde(default)]
    rowset: Vec<Vec<Value>>,
}

async fn read_envelope<T: DeserializeOwned>(response: Response) -> Result<Option<T>> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(EtlError::load_failure(format!("HTTP {}: {}", status, body)));
    }

    let envelope: Envelope<T> = serde_json::from_str(&body)?;
    if !envelope.success {
        return Err(EtlError::load_failure(format!(
            "{} (code {})",
            envelope.message.unwrap_or_else(|| "request failed".to_string()),
            envelope.code.unwrap_or_else(|| "unknown".to_string())
        )));
    }
    Ok(envelope.data)
}

#[derive(Debug, Clone)]
pub struct SnowflakeConnector {
    client: Client,
    config: SnowflakeConfig,
}

impl SnowflakeConnector {
    pub fn new(client: Client, config: &SnowflakeConfig) -> Self {
        Self {
            client,
            config: config.clone(),
        }
    }
}

#[async_trait]
impl WarehouseConnector for SnowflakeConnector {
    type Session = SnowflakeSession;

    async fn connect(&self) -> Result<SnowflakeSession> {
        let base_url = self.config.base_url()?;
        let chunk_size = self.config.chunk_size()?;

        let mut url = Url::parse(&format!("{}/session/v1/login-request", base_url))?;
        url.query_pairs_mut()
            .append_pair("warehouse", self.config.warehouse()?)
            .append_pair("databaseName", self.config.database()?)
            .append_pair("schemaName", self.config.schema()?);

        let body = json!({
            "data": {
                "CLIENT_APP_ID": CLIENT_APP_ID,
                "CLIENT_APP_VERSION": env!("CARGO_PKG_VERSION"),
                "ACCOUNT_NAME": self.config.account()?,
                "LOGIN_NAME": self.config.user()?,
                "PASSWORD": self.config.password()?,
            }
        });

        tracing::debug!("Opening Snowflake session at {}", base_url);
        let response = self
            .client
            .post(url)
            .header(ACCEPT, "application/json")
            .json(&body)
            .send()
            .await?;

        let login: LoginData = read_envelope(response)
            .await?
            .ok_or_else(|| EtlError::load_failure("login response carried no session token"))?;

        tracing::info!("❄️ Snowflake session opened");
        Ok(SnowflakeSession {
            client: self.client.clone(),
            base_url,
            token: login.token,
            chunk_size,
            sequence_id: 0,
            open: true,
        })
    }
}

/// An authenticated Snowflake session. Call [`WarehouseSession::close`] when done.
pub struct SnowflakeSession {
    client: Client,
    base_url: String,
    token: String,
    chunk_size: usize,
    sequence_id: u64,
    open: bool,
}

impl std::fmt::Debug for SnowflakeSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnowflakeSession")
            .field("base_url", &self.base_url)
            .field("chunk_size", &self.chunk_size)
            .field("open", &self.open)
            .finish()
    }
}

impl SnowflakeSession {
    fn auth_header(&self) -> String {
        format!("Snowflake Token=\"{}\"", self.token)
    }

    async fn execute(&mut self, sql: &str) -> Result<QueryData> {
        if !self.open {
            return Err(EtlError::load_failure("session is closed"));
        }
        self.sequence_id += 1;

        let mut url = Url::parse(&format!("{}/queries/v1/query-request", self.base_url))?;
        url.query_pairs_mut()
            .append_pair("requestId", &Uuid::new_v4().to_string());

        let body = json!({
            "sqlText": sql,
            "asyncExec": false,
            "sequenceId": self.sequence_id,
        });

        tracing::debug!("Executing statement #{} ({} bytes)", self.sequence_id, sql.len());
        let response = self
            .client
            .post(url)
            .header(AUTHORIZATION, self.auth_header())
            .header(ACCEPT, "application/json")
            .json(&body)
            .send()
            .await?;

        Ok(read_envelope(response).await?.unwrap_or_default())
    }
}

#[async_trait]
impl WarehouseSession for SnowflakeSession {
    async fn write_table(
        &mut self,
        table: &NormalizedTable,
        table_name: &str,
        auto_create: bool,
    ) -> Result<LoadOutcome> {
        if table.columns.is_empty() {
            return Err(EtlError::load_failure("table has no columns"));
        }

        let kinds: Vec<ColumnKind> = table
            .columns
            .iter()
            .map(|column| table.column_kind(column))
            .collect();

        if auto_create {
            self.execute(&create_table_sql(table_name, &table.columns, &kinds))
                .await?;
        }

        let mut chunks_processed = 0;
        let mut rows_loaded = 0;
        let batches = insert_batches(
            table_name,
            &table.columns,
            &kinds,
            &table.rows,
            self.chunk_size,
            MAX_STATEMENT_BYTES,
        );
        for batch in batches {
            let data = self.execute(&batch.sql).await?;
            let inserted = inserted_rows(&data).unwrap_or(batch.rows as u64);

            chunks_processed += 1;
            rows_loaded += inserted;
            tracing::debug!("Chunk {} inserted {} rows", chunks_processed, inserted);
        }

        Ok(LoadOutcome {
            success: true,
            chunks_processed,
            rows_loaded,
        })
    }

    async fn close(&mut self) -> Result<()> {
        if !self.open {
            return Ok(());
        }
        // 無論登出是否成功，這個 session 都不再使用
        self.open = false;

        let mut url = Url::parse(&format!("{}/session", self.base_url))?;
        url.query_pairs_mut().append_pair("delete", "true");

        let response = self
            .client
            .post(url)
            .header(AUTHORIZATION, self.auth_header())
            .header(ACCEPT, "application/json")
            .send()
            .await?;
        read_envelope::<Value>(response).await?;

        tracing::info!("❄️ Snowflake session closed");
        Ok(())
    }
}

impl Drop for SnowflakeSession {
    fn drop(&mut self) {
        if self.open {
            tracing::warn!("Snowflake session dropped without logout; it will expire server-side");
        }
    }
}

fn inserted_rows(data: &QueryData) -> Option<u64> {
    match data.rowset.first()?.first()? {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_u64(),
        _ => None,
    }
}

pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "''"))
}

fn sql_type(kind: ColumnKind) -> &'static str {
    match kind {
        ColumnKind::Integer => "NUMBER(38,0)",
        ColumnKind::Float => "FLOAT",
        ColumnKind::Boolean => "BOOLEAN",
        ColumnKind::Text => "VARCHAR",
        ColumnKind::Timestamp => "TIMESTAMP_NTZ",
    }
}

pub fn create_table_sql(table_name: &str, columns: &[String], kinds: &[ColumnKind]) -> String {
    let definitions: Vec<String> = columns
        .iter()
        .zip(kinds)
        .map(|(column, kind)| format!("{} {}", quote_identifier(column), sql_type(*kind)))
        .collect();
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        quote_identifier(table_name),
        definitions.join(", ")
    )
}

/// Renders one value for a column of the given kind.
fn sql_literal(value: Option<&CellValue>, kind: ColumnKind) -> String {
    let Some(value) = value else {
        return "NULL".to_string();
    };

    match (kind, value) {
        (ColumnKind::Text, v) => quote_literal(&v.to_string()),
        (ColumnKind::Timestamp, CellValue::Timestamp(ts)) => {
            format!("'{}'::TIMESTAMP_NTZ", ts.format("%Y-%m-%d %H:%M:%S%.f"))
        }
        (ColumnKind::Timestamp, CellValue::Integer(n)) => format!("TO_TIMESTAMP_NTZ({})", n),
        (ColumnKind::Boolean, CellValue::Boolean(b)) => {
            (if *b { "TRUE" } else { "FALSE" }).to_string()
        }
        (_, CellValue::Float(f)) if !f.is_finite() => format!("'{}'::FLOAT", f),
        (_, CellValue::Integer(_) | CellValue::Float(_)) => value.to_string(),
        (_, v) => quote_literal(&v.to_string()),
    }
}

fn value_tuple(columns: &[String], kinds: &[ColumnKind], row: &Row) -> String {
    let cells: Vec<String> = columns
        .iter()
        .zip(kinds)
        .map(|(column, kind)| sql_literal(row.get(column), *kind))
        .collect();
    format!("({})", cells.join(", "))
}

/// One INSERT statement and the number of rows it carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertBatch {
    pub sql: String,
    pub rows: usize,
}

/// Splits `rows` into INSERT statements of at most `max_rows` rows and, where a row fits,
/// at most `max_bytes` of SQL text. A single row larger than `max_bytes` goes out alone.
pub fn insert_batches(
    table_name: &str,
    columns: &[String],
    kinds: &[ColumnKind],
    rows: &[Row],
    max_rows: usize,
    max_bytes: usize,
) -> Vec<InsertBatch> {
    let column_list: Vec<String> = columns.iter().map(|c| quote_identifier(c)).collect();
    let prefix = format!(
        "INSERT INTO {} ({}) VALUES ",
        quote_identifier(table_name),
        column_list.join(", ")
    );

    let mut batches = Vec::new();
    let mut sql = String::new();
    let mut count = 0;
    for row in rows {
        let tuple = value_tuple(columns, kinds, row);
        if count > 0 && (count >= max_rows || sql.len() + 2 + tuple.len() > max_bytes) {
            batches.push(InsertBatch {
                sql: std::mem::take(&mut sql),
                rows: count,
            });
            count = 0;
        }

        if count == 0 {
            sql.push_str(&prefix);
        } else {
            sql.push_str(", ");
        }
        sql.push_str(&tuple);
        count += 1;
    }
    if count > 0 {
        batches.push(InsertBatch { sql, rows: count });
    }
    batches
}
