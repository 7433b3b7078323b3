use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use billbot_core::Scope;

use crate::runtime::RuntimeError;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlackEnvelope {
    pub envelope_id: String,
    pub event: SlackEvent,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SlackEvent {
    Message(MessageEvent),
    ChannelJoin(ChannelJoinEvent),
    AppInstalled { installer: Option<String> },
    Unsupported { event_type: String },
}

impl SlackEvent {
    pub fn event_type(&self) -> SlackEventType {
        match self {
            Self::Message(_) => SlackEventType::Message,
            Self::ChannelJoin(_) => SlackEventType::ChannelJoin,
            Self::AppInstalled { .. } => SlackEventType::AppInstalled,
            Self::Unsupported { .. } => SlackEventType::Unsupported,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SlackEventType {
    Message,
    ChannelJoin,
    AppInstalled,
    Unsupported,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MessageEvent {
    pub channel_id: String,
    /// `im`, `channel`, `group` or `mpim` as reported by Slack.
    pub channel_type: Option<String>,
    pub user_id: Option<String>,
    pub bot_id: Option<String>,
    pub ts: String,
    pub text: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelJoinEvent {
    pub channel_id: String,
    pub user_id: String,
}

/// A message together with how it reached the bot. For direct mentions the
/// leading `<@BOT>` and any following `:` or whitespace are removed from `text`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassifiedMessage {
    pub scope: Scope,
    pub text: String,
}

pub fn classify_scope(event: &MessageEvent, bot_user_id: &str) -> ClassifiedMessage {
    let mention = format!("<@{bot_user_id}>");
    let text = event.text.trim_start();

    if event.channel_type.as_deref() == Some("im") {
        return ClassifiedMessage { scope: Scope::DirectMessage, text: event.text.clone() };
    }
    if let Some(rest) = text.strip_prefix(&mention) {
        let stripped = rest.trim_start_matches(|ch: char| ch == ':' || ch.is_whitespace());
        return ClassifiedMessage { scope: Scope::DirectMention, text: stripped.to_owned() };
    }
    if event.text.contains(&mention) {
        return ClassifiedMessage { scope: Scope::Mention, text: event.text.clone() };
    }
    ClassifiedMessage { scope: Scope::Ambient, text: event.text.clone() }
}

/// Body of an Events API request.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventsApiPayload {
    UrlVerification {
        challenge: String,
    },
    EventCallback {
        event_id: String,
        event: RawEvent,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub subtype: Option<String>,
    pub channel: Option<String>,
    pub channel_type: Option<String>,
    pub user: Option<String>,
    pub bot_id: Option<String>,
    pub ts: Option<String>,
    pub text: Option<String>,
}

impl RawEvent {
    pub fn into_envelope(self, envelope_id: String) -> SlackEnvelope {
        SlackEnvelope { envelope_id, event: self.into_event() }
    }

    fn into_event(self) -> SlackEvent {
        match (self.kind.as_str(), self.subtype.as_deref()) {
            ("message", None) | ("message", Some("bot_message")) => {
                let (Some(channel_id), Some(ts)) = (self.channel, self.ts) else {
                    return SlackEvent::Unsupported { event_type: "message".to_owned() };
                };
                SlackEvent::Message(MessageEvent {
                    channel_id,
                    channel_type: self.channel_type,
                    user_id: self.user,
                    bot_id: self.bot_id,
                    ts,
                    text: self.text.unwrap_or_default(),
                })
            }
            // Slack also posts a `channel_join` message for the same join; only
            // `member_joined_channel` greets.
            ("member_joined_channel", _) => {
                match (self.channel, self.user) {
                    (Some(channel_id), Some(user_id)) => {
                        SlackEvent::ChannelJoin(ChannelJoinEvent { channel_id, user_id })
                    }
                    _ => SlackEvent::Unsupported { event_type: self.kind },
                }
            }
            (_, Some(subtype)) => {
                SlackEvent::Unsupported { event_type: format!("{}.{subtype}", self.kind) }
            }
            _ => SlackEvent::Unsupported { event_type: self.kind },
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventContext {
    pub correlation_id: String,
}

impl Default for EventContext {
    fn default() -> Self {
        Self { correlation_id: "unknown-correlation-id".to_owned() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandlerResult {
    /// The bot posted this text back to the originating channel.
    Responded(String),
    Processed,
    Ignored,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventHandlerError {
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error(transparent)]
    Handler(#[from] EventHandlerError),
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    fn event_types(&self) -> &'static [SlackEventType];
    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError>;
}

#[derive(Default)]
pub struct EventDispatcher {
    handlers: HashMap<SlackEventType, Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for every event type it declares, replacing any
    /// earlier handler for those types.
    pub fn register<H>(&mut self, handler: H)
    where
        H: EventHandler + 'static,
    {
        let handler: Arc<dyn EventHandler> = Arc::new(handler);
        for event_type in handler.event_types() {
            self.handlers.insert(*event_type, handler.clone());
        }
    }

    pub async fn dispatch(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, DispatchError> {
        let Some(handler) = self.handlers.get(&envelope.event.event_type()) else {
            return Ok(HandlerResult::Ignored);
        };

        handler.handle(envelope, ctx).await.map_err(DispatchError::from)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}
