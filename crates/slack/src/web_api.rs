//! Slack Web API client backing [`BotRuntime`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use billbot_core::config::SlackConfig;

use crate::runtime::{BotRuntime, RuntimeError};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub struct SlackWebApi {
    client: Client,
    api_url: String,
    bot_token: SecretString,
}

#[derive(Debug, Deserialize)]
struct ApiEnvelope {
    ok: bool,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AuthTestResponse {
    user_id: String,
}

#[derive(Debug, Deserialize)]
struct ConversationsOpenResponse {
    channel: OpenedChannel,
}

#[derive(Debug, Deserialize)]
struct OpenedChannel {
    id: String,
}

impl SlackWebApi {
    pub fn new(config: &SlackConfig) -> Result<Self, RuntimeError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|error| RuntimeError::Transport(error.to_string()))?;

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_owned(),
            bot_token: config.bot_token.clone(),
        })
    }

    /// Resolves the bot's own user id from the token.
    pub async fn auth_test(&self) -> Result<String, RuntimeError> {
        let response: AuthTestResponse = self.call("auth.test", json!({})).await?;
        Ok(response.user_id)
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        body: Value,
    ) -> Result<T, RuntimeError> {
        let url = format!("{}/{method}", self.api_url);
        let response = self
            .client
            .post(url)
            .bearer_auth(self.bot_token.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|error| RuntimeError::Transport(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RuntimeError::Api {
                method: method.to_owned(),
                error: format!("http_{}", status.as_u16()),
            });
        }

        let payload: Value = response.json().await.map_err(|error| RuntimeError::Decode {
            method: method.to_owned(),
            detail: error.to_string(),
        })?;
        decode_payload(method, payload)
    }
}

fn decode_payload<T: DeserializeOwned>(method: &str, payload: Value) -> Result<T, RuntimeError> {
    let envelope: ApiEnvelope = serde_json::from_value(payload.clone()).map_err(|error| {
        RuntimeError::Decode { method: method.to_owned(), detail: error.to_string() }
    })?;
    if !envelope.ok {
        return Err(RuntimeError::Api {
            method: method.to_owned(),
            error: envelope.error.unwrap_or_else(|| "unknown_error".to_owned()),
        });
    }

    serde_json::from_value(payload).map_err(|error| RuntimeError::Decode {
        method: method.to_owned(),
        detail: error.to_string(),
    })
}

#[async_trait]
impl BotRuntime for SlackWebApi {
    async fn reply(&self, channel_id: &str, text: &str) -> Result<(), RuntimeError> {
        let _: ApiEnvelope =
            self.call("chat.postMessage", json!({ "channel": channel_id, "text": text })).await?;
        debug!(event_name = "egress.slack.message_posted", channel_id, "posted reply");
        Ok(())
    }

    async fn add_reaction(
        &self,
        channel_id: &str,
        message_ts: &str,
        name: &str,
    ) -> Result<(), RuntimeError> {
        let _: ApiEnvelope = self
            .call(
                "reactions.add",
                json!({ "channel": channel_id, "timestamp": message_ts, "name": name }),
            )
            .await?;
        debug!(
            event_name = "egress.slack.reaction_added",
            channel_id,
            reaction = name,
            "added reaction"
        );
        Ok(())
    }

    async fn open_direct_message(&self, user_id: &str) -> Result<String, RuntimeError> {
        let response: ConversationsOpenResponse =
            self.call("conversations.open", json!({ "users": user_id })).await?;
        Ok(response.channel.id)
    }
}
