//! Keyword-driven quote bot: the one [`EventHandler`] billbot registers.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use billbot_core::triggers::{
    CHANNEL_JOIN_REPLY, EMPTY_CACHE_REPLY, FALLBACK_REACTION, FALLBACK_REPLY, INSTALL_GREETING,
};
use billbot_core::{ResponsePolicy, RuleSet};
use billbot_store::QuoteCache;

use crate::events::{
    classify_scope, ChannelJoinEvent, EventContext, EventDispatcher, EventHandler,
    EventHandlerError, HandlerResult, MessageEvent, SlackEnvelope, SlackEvent, SlackEventType,
};
use crate::runtime::BotRuntime;

pub struct QuoteBot {
    rules: RuleSet,
    cache: Arc<QuoteCache>,
    runtime: Arc<dyn BotRuntime>,
    bot_user_id: String,
}

impl QuoteBot {
    pub fn new(
        rules: RuleSet,
        cache: Arc<QuoteCache>,
        runtime: Arc<dyn BotRuntime>,
        bot_user_id: impl Into<String>,
    ) -> Self {
        Self { rules, cache, runtime, bot_user_id: bot_user_id.into() }
    }

    /// A dispatcher with this bot registered for every event it understands.
    pub fn into_dispatcher(self) -> EventDispatcher {
        let mut dispatcher = EventDispatcher::new();
        dispatcher.register(self);
        dispatcher
    }

    async fn on_message(
        &self,
        event: &MessageEvent,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let own_message = event.user_id.as_deref() == Some(self.bot_user_id.as_str());
        if event.bot_id.is_some() || own_message {
            return Ok(HandlerResult::Ignored);
        }

        let classified = classify_scope(event, &self.bot_user_id);
        if let Some(rule) = self.rules.evaluate(&classified.text, classified.scope) {
            info!(
                event_name = "bot.trigger.matched",
                correlation_id = %ctx.correlation_id,
                rule = %rule.name,
                scope = classified.scope.as_str(),
                "trigger rule matched"
            );
            let reply = match &rule.response {
                ResponsePolicy::Fixed(text) => text.clone(),
                ResponsePolicy::RandomQuote => self.random_quote().await,
            };
            self.runtime.reply(&event.channel_id, &reply).await?;
            return Ok(HandlerResult::Responded(reply));
        }

        if !classified.scope.is_direct() {
            return Ok(HandlerResult::Ignored);
        }

        debug!(
            event_name = "bot.trigger.fallback",
            correlation_id = %ctx.correlation_id,
            scope = classified.scope.as_str(),
            "no rule matched a direct message"
        );
        if let Err(error) =
            self.runtime.add_reaction(&event.channel_id, &event.ts, FALLBACK_REACTION).await
        {
            warn!(
                event_name = "bot.reaction.failed",
                correlation_id = %ctx.correlation_id,
                error = %error,
                "could not add fallback reaction"
            );
        }
        self.runtime.reply(&event.channel_id, FALLBACK_REPLY).await?;
        Ok(HandlerResult::Responded(FALLBACK_REPLY.to_owned()))
    }

    async fn random_quote(&self) -> String {
        self.cache.ensure_fresh().await;
        match self.cache.pick_random().await {
            Some(quote) => quote,
            None => {
                warn!(event_name = "bot.quote.empty_cache", "no quotes available to pick from");
                EMPTY_CACHE_REPLY.to_owned()
            }
        }
    }

    async fn on_channel_join(
        &self,
        event: &ChannelJoinEvent,
    ) -> Result<HandlerResult, EventHandlerError> {
        if event.user_id != self.bot_user_id {
            return Ok(HandlerResult::Ignored);
        }

        self.runtime.reply(&event.channel_id, CHANNEL_JOIN_REPLY).await?;
        Ok(HandlerResult::Responded(CHANNEL_JOIN_REPLY.to_owned()))
    }

    async fn on_installation(
        &self,
        installer: Option<&str>,
    ) -> Result<HandlerResult, EventHandlerError> {
        let Some(installer) = installer else {
            return Ok(HandlerResult::Processed);
        };

        let channel_id = self.runtime.open_direct_message(installer).await?;
        for line in INSTALL_GREETING {
            self.runtime.reply(&channel_id, line).await?;
        }
        info!(event_name = "bot.installation.greeted", installer, "sent onboarding messages");
        Ok(HandlerResult::Processed)
    }
}

#[async_trait]
impl EventHandler for QuoteBot {
    fn event_types(&self) -> &'static [SlackEventType] {
        &[SlackEventType::Message, SlackEventType::ChannelJoin, SlackEventType::AppInstalled]
    }

    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        match &envelope.event {
            SlackEvent::Message(event) => self.on_message(event, ctx).await,
            SlackEvent::ChannelJoin(event) => self.on_channel_join(event).await,
            SlackEvent::AppInstalled { installer } => {
                self.on_installation(installer.as_deref()).await
            }
            SlackEvent::Unsupported { .. } => Ok(HandlerResult::Ignored),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use billbot_core::triggers::{default_rules, EMPTY_CACHE_REPLY, FALLBACK_REPLY};
    use billbot_core::{RuleSet, Scope, TriggerRule};
    use billbot_store::{CacheSettings, InMemoryQuoteStore, QuoteCache};

    use super::QuoteBot;
    use crate::events::{
        ChannelJoinEvent, EventContext, EventHandler, HandlerResult, MessageEvent, SlackEnvelope,
        SlackEvent,
    };
    use crate::runtime::{BotRuntime, RuntimeError};

    #[derive(Clone, Debug, PartialEq, Eq)]
    enum Call {
        Reply { channel: String, text: String },
        Reaction { channel: String, ts: String, name: String },
        OpenDm { user: String },
    }

    #[derive(Default)]
    struct RecordingRuntime {
        calls: Mutex<Vec<Call>>,
        fail_reactions: bool,
        fail_replies: bool,
    }

    impl RecordingRuntime {
        async fn calls(&self) -> Vec<Call> {
            self.calls.lock().await.clone()
        }

        async fn replies(&self) -> Vec<String> {
            self.calls()
                .await
                .into_iter()
                .filter_map(|call| match call {
                    Call::Reply { text, .. } => Some(text),
                    _ => None,
                })
                .collect()
        }
    }

    #[async_trait]
    impl BotRuntime for RecordingRuntime {
        async fn reply(&self, channel_id: &str, text: &str) -> Result<(), RuntimeError> {
            if self.fail_replies {
                return Err(RuntimeError::Transport("post failed".to_owned()));
            }
            self.calls
                .lock()
                .await
                .push(Call::Reply { channel: channel_id.to_owned(), text: text.to_owned() });
            Ok(())
        }

        async fn add_reaction(
            &self,
            channel_id: &str,
            message_ts: &str,
            name: &str,
        ) -> Result<(), RuntimeError> {
            self.calls.lock().await.push(Call::Reaction {
                channel: channel_id.to_owned(),
                ts: message_ts.to_owned(),
                name: name.to_owned(),
            });
            if self.fail_reactions {
                return Err(RuntimeError::Api {
                    method: "reactions.add".to_owned(),
                    error: "missing_scope".to_owned(),
                });
            }
            Ok(())
        }

        async fn open_direct_message(&self, user_id: &str) -> Result<String, RuntimeError> {
            self.calls.lock().await.push(Call::OpenDm { user: user_id.to_owned() });
            Ok(format!("D-{user_id}"))
        }
    }

    struct Harness {
        bot: QuoteBot,
        runtime: Arc<RecordingRuntime>,
        store: Arc<InMemoryQuoteStore>,
    }

    fn harness_with(quotes: &[&str], runtime: RecordingRuntime, rules: RuleSet) -> Harness {
        let store = Arc::new(InMemoryQuoteStore::with_quotes(quotes.iter().copied()));
        let cache = Arc::new(QuoteCache::new(store.clone(), CacheSettings::default()));
        let runtime = Arc::new(runtime);
        let bot = QuoteBot::new(rules, cache, runtime.clone(), "UBOT");
        Harness { bot, runtime, store }
    }

    fn harness(quotes: &[&str]) -> Harness {
        let rules = RuleSet::compile(default_rules()).expect("default rules compile");
        harness_with(quotes, RecordingRuntime::default(), rules)
    }

    fn message(channel_type: &str, text: &str) -> SlackEnvelope {
        SlackEnvelope {
            envelope_id: "Ev1".to_owned(),
            event: SlackEvent::Message(MessageEvent {
                channel_id: "C1".to_owned(),
                channel_type: Some(channel_type.to_owned()),
                user_id: Some("U1".to_owned()),
                bot_id: None,
                ts: "1730000000.0001".to_owned(),
                text: text.to_owned(),
            }),
        }
    }

    async fn handle(harness: &Harness, envelope: SlackEnvelope) -> HandlerResult {
        harness.bot.handle(&envelope, &EventContext::default()).await.expect("handle")
    }

    #[tokio::test]
    async fn ambient_gateway_gets_driscoll() {
        let harness = harness(&[]);

        let result = handle(&harness, message("channel", "the gateway is down again")).await;

        assert_eq!(result, HandlerResult::Responded("DRISCOLLLLLLL!!!".to_owned()));
        assert_eq!(
            harness.runtime.calls().await,
            vec![Call::Reply { channel: "C1".to_owned(), text: "DRISCOLLLLLLL!!!".to_owned() }]
        );
    }

    #[tokio::test]
    async fn ambient_pointing_gets_legend() {
        let harness = harness(&[]);

        let result = handle(&harness, message("channel", "are we POINTING today?")).await;

        let HandlerResult::Responded(reply) = result else {
            panic!("expected a reply");
        };
        assert!(reply.starts_with("UGHHHH, you guys..."));
        assert!(reply.contains("20 = PBI needs to be broken down more"));
    }

    #[tokio::test]
    async fn gateway_in_direct_message_is_not_ambient() {
        let harness = harness(&[]);

        let result = handle(&harness, message("im", "gateway")).await;

        assert_eq!(result, HandlerResult::Responded(FALLBACK_REPLY.to_owned()));
    }

    #[tokio::test]
    async fn wisdom_keyword_in_direct_message_replies_with_a_stored_quote() {
        let harness = harness(&["Ship it.", "Who broke the build?"]);

        let result = handle(&harness, message("im", "what do you think")).await;

        let HandlerResult::Responded(reply) = result else {
            panic!("expected a reply");
        };
        assert!(["Ship it.", "Who broke the build?"].contains(&reply.as_str()));
        assert_eq!(harness.store.page_requests().await, 1);
    }

    #[tokio::test]
    async fn mention_keyword_replies_with_quote() {
        let harness = harness(&["only quote"]);

        let result = handle(&harness, message("channel", "hey <@UBOT> any idea?")).await;

        assert_eq!(result, HandlerResult::Responded("only quote".to_owned()));
    }

    #[tokio::test]
    async fn wisdom_keyword_without_mention_is_ignored() {
        let harness = harness(&["only quote"]);

        let result = handle(&harness, message("channel", "I like turtles")).await;

        assert_eq!(result, HandlerResult::Ignored);
        assert!(harness.runtime.calls().await.is_empty());
        assert_eq!(harness.store.page_requests().await, 0);
    }

    #[tokio::test]
    async fn empty_store_yields_placeholder() {
        let harness = harness(&[]);

        let result = handle(&harness, message("channel", "<@UBOT> help")).await;

        assert_eq!(result, HandlerResult::Responded(EMPTY_CACHE_REPLY.to_owned()));
    }

    #[tokio::test]
    async fn unmatched_direct_mention_gets_reaction_and_challenge() {
        let harness = harness(&["unused"]);

        let result = handle(&harness, message("channel", "<@UBOT> hello there")).await;

        assert_eq!(result, HandlerResult::Responded(FALLBACK_REPLY.to_owned()));
        assert_eq!(
            harness.runtime.calls().await,
            vec![
                Call::Reaction {
                    channel: "C1".to_owned(),
                    ts: "1730000000.0001".to_owned(),
                    name: "robot_face".to_owned()
                },
                Call::Reply { channel: "C1".to_owned(), text: FALLBACK_REPLY.to_owned() },
            ]
        );
    }

    #[tokio::test]
    async fn reaction_failure_still_sends_reply() {
        let rules = RuleSet::compile(default_rules()).expect("rules");
        let runtime = RecordingRuntime { fail_reactions: true, ..RecordingRuntime::default() };
        let harness = harness_with(&[], runtime, rules);

        let result = handle(&harness, message("im", "hello")).await;

        assert_eq!(result, HandlerResult::Responded(FALLBACK_REPLY.to_owned()));
        assert_eq!(harness.runtime.replies().await, vec![FALLBACK_REPLY]);
    }

    #[tokio::test]
    async fn unmatched_ambient_message_is_ignored() {
        let harness = harness(&[]);

        let result = handle(&harness, message("channel", "lunch?")).await;

        assert_eq!(result, HandlerResult::Ignored);
        assert!(harness.runtime.calls().await.is_empty());
    }

    #[tokio::test]
    async fn bot_and_own_messages_are_ignored() {
        let harness = harness(&[]);
        let mut from_bot = message("channel", "gateway");
        if let SlackEvent::Message(event) = &mut from_bot.event {
            event.bot_id = Some("B1".to_owned());
        }
        let mut from_self = message("im", "gateway");
        if let SlackEvent::Message(event) = &mut from_self.event {
            event.user_id = Some("UBOT".to_owned());
        }

        assert_eq!(handle(&harness, from_bot).await, HandlerResult::Ignored);
        assert_eq!(handle(&harness, from_self).await, HandlerResult::Ignored);
        assert!(harness.runtime.calls().await.is_empty());
    }

    #[tokio::test]
    async fn scope_excluded_rule_falls_through_to_later_rule() {
        let rules = RuleSet::compile(vec![
            TriggerRule::fixed("ambient-only", ["deploy"], [Scope::Ambient], "first"),
            TriggerRule::fixed("direct", ["deploy"], [Scope::DirectMessage], "second"),
        ])
        .expect("rules");
        let harness = harness_with(&[], RecordingRuntime::default(), rules);

        let result = handle(&harness, message("im", "deploy now")).await;

        assert_eq!(result, HandlerResult::Responded("second".to_owned()));
    }

    #[tokio::test]
    async fn bot_joining_channel_gets_challenge() {
        let harness = harness(&[]);
        let envelope = SlackEnvelope {
            envelope_id: "Ev2".to_owned(),
            event: SlackEvent::ChannelJoin(ChannelJoinEvent {
                channel_id: "C7".to_owned(),
                user_id: "UBOT".to_owned(),
            }),
        };

        let result = handle(&harness, envelope).await;

        assert_eq!(result, HandlerResult::Responded("What do you want???".to_owned()));
        assert_eq!(
            harness.runtime.calls().await,
            vec![Call::Reply { channel: "C7".to_owned(), text: "What do you want???".to_owned() }]
        );
    }

    #[tokio::test]
    async fn other_user_joining_is_ignored() {
        let harness = harness(&[]);
        let envelope = SlackEnvelope {
            envelope_id: "Ev3".to_owned(),
            event: SlackEvent::ChannelJoin(ChannelJoinEvent {
                channel_id: "C7".to_owned(),
                user_id: "U9".to_owned(),
            }),
        };

        assert_eq!(handle(&harness, envelope).await, HandlerResult::Ignored);
    }

    #[tokio::test]
    async fn installation_opens_dm_and_sends_two_lines() {
        let harness = harness(&[]);
        let envelope = SlackEnvelope {
            envelope_id: "install".to_owned(),
            event: SlackEvent::AppInstalled { installer: Some("U5".to_owned()) },
        };

        let result = handle(&harness, envelope).await;

        assert_eq!(result, HandlerResult::Processed);
        assert_eq!(
            harness.runtime.calls().await,
            vec![
                Call::OpenDm { user: "U5".to_owned() },
                Call::Reply {
                    channel: "D-U5".to_owned(),
                    text: "I am a bot that has just joined your team".to_owned()
                },
                Call::Reply {
                    channel: "D-U5".to_owned(),
                    text: "You must now /invite me to a channel so that I can be of use!"
                        .to_owned()
                },
            ]
        );
    }

    #[tokio::test]
    async fn installation_without_installer_does_nothing() {
        let harness = harness(&[]);
        let envelope = SlackEnvelope {
            envelope_id: "install".to_owned(),
            event: SlackEvent::AppInstalled { installer: None },
        };

        assert_eq!(handle(&harness, envelope).await, HandlerResult::Processed);
        assert!(harness.runtime.calls().await.is_empty());
    }

    #[tokio::test]
    async fn reply_failure_surfaces_as_handler_error() {
        let rules = RuleSet::compile(default_rules()).expect("rules");
        let runtime = RecordingRuntime { fail_replies: true, ..RecordingRuntime::default() };
        let harness = harness_with(&[], runtime, rules);

        let result =
            harness.bot.handle(&message("channel", "gateway"), &EventContext::default()).await;

        assert!(result.is_err());
    }
}
