use async_trait::async_trait;
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RuntimeError {
    #[error("slack request failed: {0}")]
    Transport(String),
    #[error("slack method `{method}` returned error `{error}`")]
    Api { method: String, error: String },
    #[error("could not decode slack response for `{method}`: {detail}")]
    Decode { method: String, detail: String },
}

/// Outbound side of the bot: everything a handler may do back to Slack.
#[async_trait]
pub trait BotRuntime: Send + Sync {
    /// Posts `text` to the channel the triggering message came from.
    async fn reply(&self, channel_id: &str, text: &str) -> Result<(), RuntimeError>;

    async fn add_reaction(
        &self,
        channel_id: &str,
        message_ts: &str,
        name: &str,
    ) -> Result<(), RuntimeError>;

    /// Opens (or reuses) a private conversation and returns its channel id.
    async fn open_direct_message(&self, user_id: &str) -> Result<String, RuntimeError>;
}
