//! Slack integration - event intake and the quote bot
//!
//! - **Socket** (`socket`) - transport trait, one-shot runner, in-process channel transport
//! - **Events** (`events`) - envelopes, Events API payloads, scope classification, dispatch
//! - **Bot** (`bot`) - keyword triggers, fallback reply, channel-join and install greetings
//! - **Runtime** (`runtime`) - outbound port: reply, react, open a DM
//! - **Signature** (`signature`) - `x-slack-signature` verification for the Events API
//! - **Web API** (`web_api`) - `BotRuntime` over `chat.postMessage` and friends
//!
//! ```text
//! Transport -> SocketModeRunner -> EventDispatcher -> QuoteBot -> BotRuntime
//!                                                        |
//!                                                   QuoteCache
//! ```

pub mod bot;
pub mod events;
pub mod runtime;
pub mod signature;
pub mod socket;
pub mod web_api;

pub use bot::QuoteBot;
pub use events::{EventDispatcher, EventsApiPayload, SlackEnvelope, SlackEvent};
pub use runtime::{BotRuntime, RuntimeError};
pub use signature::{RequestVerifier, SignatureError};
pub use socket::{ChannelTransport, EnvelopeSender, SocketModeRunner, SocketTransport};
pub use web_api::SlackWebApi;
