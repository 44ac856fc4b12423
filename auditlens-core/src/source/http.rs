//! HTTP client for the upstream activity log API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::StatusCode;

use crate::config::SourceConfig;
use crate::error::{Error, Result};
use crate::types::RawLogEntry;

use super::{LogSource, PageQuery};

/// HTTP implementation of [`LogSource`].
pub struct HttpLogSource {
    http_client: reqwest::Client,
    base_url: String,
}

impl HttpLogSource {
    /// Create a new source client from configuration.
    ///
    /// Returns an error if the configuration is invalid or missing required
    /// fields.
    pub fn new(config: &SourceConfig) -> Result<Self> {
        config.validate()?;

        let base_url = config
            .base_url
            .clone()
            .ok_or_else(|| Error::Config("source.base_url is required".to_string()))?
            .trim_end_matches('/')
            .to_string();

        // Build default headers
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        // Add authorization header
        if let Some(token) = &config.api_token {
            let auth_value = format!("Bearer {}", token);
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&auth_value)
                    .map_err(|e| Error::Config(format!("invalid api_token: {}", e)))?,
            );
        }

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url,
        })
    }

    fn query_params(query: &PageQuery) -> Vec<(String, String)> {
        let mut params = vec![
            ("after".to_string(), query.after.to_rfc3339()),
            ("page".to_string(), query.page.to_string()),
            ("limit".to_string(), query.limit.to_string()),
        ];

        if let Some(message) = &query.filter.message {
            params.push(("message".to_string(), message.clone()));
        }
        for level in &query.filter.levels {
            params.push(("levels[]".to_string(), level.to_string()));
        }
        if let Some(before) = &query.filter.before {
            params.push(("before".to_string(), before.to_rfc3339()));
        }
        if let Some(actor_id) = query.filter.actor_id {
            params.push(("actor_id".to_string(), actor_id.to_string()));
        }

        params
    }
}

#[async_trait]
impl LogSource for HttpLogSource {
    async fn fetch_page(&self, query: &PageQuery) -> Result<Vec<RawLogEntry>> {
        let url = format!("{}/logs", self.base_url);

        let response = self
            .http_client
            .get(&url)
            .query(&Self::query_params(query))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::SourceUnavailable(format!("request timed out: {}", e))
                } else {
                    Error::SourceUnavailable(format!("HTTP request failed: {}", e))
                }
            })?;

        let status = response.status();

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(Error::Unauthorized(format!(
                "status {} from log endpoint",
                status.as_u16()
            )));
        }

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown".to_string());
            return Err(Error::SourceError {
                status: status.as_u16(),
                message: error_text,
            });
        }

        // The endpoint returns a bare JSON array. Anything else is a hard
        // error for this page, not a retry candidate.
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| Error::MalformedResponse(format!("failed to parse response: {}", e)))?;

        if !body.is_array() {
            return Err(Error::MalformedResponse(format!(
                "expected an array of log entries, got {}",
                json_type_name(&body)
            )));
        }

        serde_json::from_value(body)
            .map_err(|e| Error::MalformedResponse(format!("unexpected entry shape: {}", e)))
    }
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}
