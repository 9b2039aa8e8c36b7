use crate::config::Config;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;
use ticket_core::error::ForwardError;
use ticket_core::model::OutboundRequest;

#[async_trait]
pub trait TicketApi: Send + Sync {
    async fn create(&self, request: &OutboundRequest) -> Result<String, ForwardError>;
}

#[derive(Clone)]
pub struct TapdClient {
    client: Client,
    api_user: String,
    api_password: String,
}

impl TapdClient {
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.tapd_http_timeout_ms))
            .build()
            .context("build reqwest client")?;

        Ok(Self {
            client,
            api_user: config.tapd_api_user.clone(),
            api_password: config.tapd_api_password.clone(),
        })
    }
}

#[async_trait]
impl TicketApi for TapdClient {
    async fn create(&self, request: &OutboundRequest) -> Result<String, ForwardError> {
        // TAPD only accepts form bodies on the create endpoints.
        let response = self
            .client
            .post(&request.url)
            .basic_auth(&self.api_user, Some(&self.api_password))
            .form(&request.fields)
            .send()
            .await
            .map_err(|error| ForwardError::Transport(error.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| body_read_error(status, &error))?;

        if !status.is_success() {
            return Err(ForwardError::UpstreamRejected {
                status: status.as_u16(),
                body,
            });
        }

        let envelope: Value = serde_json::from_str(&body)
            .map_err(|error| ForwardError::Internal(format!("invalid TAPD response: {error}")))?;
        created_id(&envelope, request.item_type.entity_key()).map_err(|error| match error {
            EnvelopeError::Rejected(info) => ForwardError::UpstreamRejected {
                status: status.as_u16(),
                body: info,
            },
            EnvelopeError::MissingId => {
                ForwardError::Internal("TAPD reported success without an item id".to_string())
            }
        })
    }
}

fn body_read_error(status: StatusCode, error: &reqwest::Error) -> ForwardError {
    if status.is_success() {
        ForwardError::Internal(format!("read TAPD response: {error}"))
    } else {
        ForwardError::UpstreamRejected {
            status: status.as_u16(),
            body: format!("read TAPD response: {error}"),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum EnvelopeError {
    Rejected(String),
    MissingId,
}

/// Reads `{"status":1,"data":{"Story":{"id":..}}}`.
fn created_id(envelope: &Value, entity_key: &str) -> Result<String, EnvelopeError> {
    let status = envelope.get("status").and_then(Value::as_i64);
    if status != Some(1) {
        let info = envelope
            .get("info")
            .and_then(Value::as_str)
            .map(ToString::to_string)
            .unwrap_or_else(|| envelope.to_string());
        return Err(EnvelopeError::Rejected(info));
    }

    let id = envelope
        .get("data")
        .and_then(|data| data.get(entity_key))
        .and_then(|entity| entity.get("id"))
        .ok_or(EnvelopeError::MissingId)?;

    match id {
        Value::String(text) if !text.trim().is_empty() => Ok(text.trim().to_string()),
        Value::Number(number) => Ok(number.to_string()),
        _ => Err(EnvelopeError::MissingId),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reads_created_story_id() {
        let envelope = json!({"status": 1, "data": {"Story": {"id": "1141827997001000123"}}, "info": "success"});
        assert_eq!(
            created_id(&envelope, "Story"),
            Ok("1141827997001000123".to_string())
        );
    }

    #[test]
    fn numeric_ids_are_stringified() {
        let envelope = json!({"status": 1, "data": {"Bug": {"id": 42}}});
        assert_eq!(created_id(&envelope, "Bug"), Ok("42".to_string()));
    }

    #[test]
    fn non_success_status_is_a_rejection() {
        let envelope = json!({"status": 422, "data": null, "info": "title is required"});
        assert_eq!(
            created_id(&envelope, "Bug"),
            Err(EnvelopeError::Rejected("title is required".to_string()))
        );
    }

    #[test]
    fn missing_entity_is_reported() {
        let envelope = json!({"status": 1, "data": {"Story": {}}});
        assert_eq!(created_id(&envelope, "Story"), Err(EnvelopeError::MissingId));
        assert_eq!(created_id(&envelope, "Bug"), Err(EnvelopeError::MissingId));
    }
}
