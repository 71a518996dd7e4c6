use crate::config::AmcConfig;
use crate::domain::model::Credential;
use crate::utils::error::{EtlError, Result};
use reqwest::Client;
use serde::Serialize;

const AUTH_PATH: &str = "/auth/token";
const API_MARKER: &str = "/api";
const OUTPUT_FORMAT: &str = "CSV";

/// Identity endpoint for an AMC query endpoint: everything before the first `/api` in the
/// path, plus `/auth/token`. The host part is never searched, so `https://api.example.com`
/// keeps its name.
pub fn auth_url(api_endpoint: &str) -> String {
    let authority_start = api_endpoint.find("://").map(|i| i + 3).unwrap_or(0);
    let path_start = api_endpoint[authority_start..]
        .find('/')
        .map(|i| authority_start + i)
        .unwrap_or(api_endpoint.len());

    let prefix = match api_endpoint[path_start..].find(API_MARKER) {
        Some(i) => &api_endpoint[..path_start + i],
        None => api_endpoint.trim_end_matches('/'),
    };
    format!("{}{}", prefix, AUTH_PATH)
}

/// Client-credentials exchange against the AMC identity endpoint.
///
/// Tokens are fetched fresh for every extraction and never cached.
#[derive(Debug, Clone)]
pub struct AmcAuthClient {
    client: Client,
    config: AmcConfig,
}

impl AmcAuthClient {
    pub fn new(client: Client, config: &AmcConfig) -> Self {
        Self {
            client,
            config: config.clone(),
        }
    }

    pub async fn get_token(&self) -> Result<Credential> {
        tracing::info!("🔑 Getting AMC authentication token");

        let url = auth_url(self.config.api_endpoint()?);
        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.config.client_id()?),
            ("client_secret", self.config.client_secret()?),
        ];

        tracing::debug!("Requesting token from: {}", url);
        let response = self.client.post(&url).form(&form).send().await?;
        let status = response.status();
        tracing::debug!("Auth response status: {}", status);

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!("Authentication error: {}", body);
            return Err(EtlError::AuthFailure {
                message: format!("identity endpoint returned {}", status),
            });
        }

        let credential: Credential = response.json().await.map_err(|e| EtlError::AuthFailure {
            message: format!("unexpected token response: {}", e),
        })?;

        if credential.access_token.is_empty() {
            return Err(EtlError::AuthFailure {
                message: "identity endpoint returned an empty access_token".to_string(),
            });
        }

        Ok(credential)
    }
}

#[derive(Debug, Serialize)]
struct QueryRequest<'a> {
    query: &'a str,
    format: &'a str,
}

/// Runs a resolved SQL string on AMC and returns the delimited result text.
#[derive(Debug, Clone)]
pub struct AmcExtractor {
    client: Client,
    config: AmcConfig,
    auth: AmcAuthClient,
}

impl AmcExtractor {
    pub fn new(client: Client, config: &AmcConfig) -> Self {
        Self {
            auth: AmcAuthClient::new(client.clone(), config),
            client,
            config: config.clone(),
        }
    }

    pub fn auth(&self) -> &AmcAuthClient {
        &self.auth
    }

    /// Fetches a token, then runs `sql`.
    pub async fn extract(&self, sql: &str) -> Result<String> {
        let credential = self.auth.get_token().await?;
        self.extract_with(&credential, sql).await
    }

    pub async fn extract_with(&self, credential: &Credential, sql: &str) -> Result<String> {
        let endpoint = self.config.api_endpoint()?;
        tracing::info!("📡 Extracting data from AMC: {}", endpoint);
        tracing::debug!("Query SQL: {}", sql);

        let payload = QueryRequest {
            query: sql,
            format: OUTPUT_FORMAT,
        };

        let response = self
            .client
            .post(endpoint)
            .bearer_auth(&credential.access_token)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        tracing::debug!("AMC response status: {}", status);
        let body = response.text().await?;

        if !status.is_success() {
            tracing::error!("AMC API error: {}", body);
            return Err(EtlError::ExtractionFailure {
                status: status.as_u16(),
                body,
            });
        }

        tracing::info!("📊 Received {} bytes from AMC", body.len());
        Ok(body)
    }
}
