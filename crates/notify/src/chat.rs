//! HTTP chat-bot delivery adapter.
//!
//! Posts `{"userEmails": [..], "text": ..}` or `{"groupId": .., "text": ..}`
//! to `{base_url}/bot/{bot_id}/send-message` and maps the HTTP status onto
//! [`DeliveryError`] so the router can tell a bad address from an outage.

use std::time::Duration;

use nudge_core::ChatConfig;
use reqwest::StatusCode;
use serde_json::{json, Value};

use crate::traits::{Address, DeliveryAdapter, DeliveryError};

/// Delivers reminders through an external chat bot API.
///
/// Environment variable references (`${VAR_NAME}`) in the base URL, bot id
/// and token are resolved at construction time.
#[derive(Debug)]
pub struct ChatBotAdapter {
    /// Fully built send-message endpoint.
    endpoint: String,
    /// Optional bearer token.
    token: Option<String>,
    /// Shared HTTP client (connection pooling).
    client: reqwest::Client,
}

impl ChatBotAdapter {
    pub fn new(
        base_url: &str,
        bot_id: &str,
        token: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, DeliveryError> {
        let base_url = resolve_env_vars(base_url)?;
        let bot_id = resolve_env_vars(bot_id)?;
        let bot_id = bot_id.trim().trim_matches('/');
        if base_url.trim().is_empty() {
            return Err(DeliveryError::Config("chat base URL is empty".to_string()));
        }
        if bot_id.is_empty() {
            return Err(DeliveryError::Config("chat bot id is empty".to_string()));
        }
        let token = token
            .map(resolve_env_vars)
            .transpose()?
            .filter(|t| !t.trim().is_empty());

        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            endpoint: format!("{}/bot/{}/send-message", base_url.trim_end_matches('/'), bot_id),
            token,
            client,
        })
    }

    /// Build from the environment-derived chat settings.
    pub fn from_config(config: &ChatConfig, timeout: Duration) -> Result<Self, DeliveryError> {
        let bot_id = config
            .bot_id
            .as_deref()
            .ok_or_else(|| DeliveryError::Config("CHAT_BOT_ID is not set".to_string()))?;
        Self::new(&config.base_url, bot_id, config.token.as_deref(), timeout)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// Request body for one address.
fn payload(address: &Address, text: &str) -> Value {
    match address {
        Address::User(email) => json!({ "userEmails": [email], "text": text }),
        Address::Group(group_id) => json!({ "groupId": group_id, "text": text }),
    }
}

/// Map a response status onto the delivery contract.
fn classify(address: &Address, status: StatusCode, body: &str) -> Result<String, DeliveryError> {
    if status.is_success() {
        return Ok(if body.trim().is_empty() {
            status.to_string()
        } else {
            body.trim().to_string()
        });
    }
    let reason = format!("{status}: {}", body.trim());
    match status.as_u16() {
        400 | 403 | 404 | 422 => Err(DeliveryError::InvalidAddress {
            address: address.to_string(),
            reason,
        }),
        _ => Err(DeliveryError::Transient(reason)),
    }
}

#[async_trait::async_trait]
impl DeliveryAdapter for ChatBotAdapter {
    async fn send(&self, address: &Address, text: &str) -> Result<String, DeliveryError> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::ACCEPT, "*/*")
            .json(&payload(address, text));
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            let kind = if e.is_timeout() { "request timed out" } else { "network error" };
            DeliveryError::Transient(format!("{kind}: {e}"))
        })?;
        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());

        let result = classify(address, status, &body);
        match &result {
            Ok(_) => tracing::debug!(%address, %status, "chat message delivered"),
            Err(e) => tracing::warn!(%address, %status, error = %e, "chat API rejected message"),
        }
        result
    }

    fn channel_name(&self) -> &str {
        "chat-bot"
    }
}

/// Resolve `${VAR_NAME}` patterns in a string using `std::env::var`.
///
/// Returns an error if a referenced variable is not set.
fn resolve_env_vars(input: &str) -> Result<String, DeliveryError> {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next();
            let mut var_name = String::new();
            let mut closed = false;
            for c in chars.by_ref() {
                if c == '}' {
                    closed = true;
                    break;
                }
                var_name.push(c);
            }
            if !closed {
                return Err(DeliveryError::Config(format!(
                    "unclosed env var reference in: {input}"
                )));
            }
            let value = std::env::var(&var_name).map_err(|_| {
                DeliveryError::Config(format!("env var not found: {var_name}"))
            })?;
            result.push_str(&value);
        } else {
            result.push(ch);
        }
    }

    Ok(result)
}
