use std::sync::Arc;

use billbot_core::config::{AppConfig, ConfigError, LoadOptions};
use billbot_slack::{
    BotRuntime, ChannelTransport, EnvelopeSender, QuoteBot, RuntimeError, SlackWebApi,
    SocketModeRunner,
};
use billbot_store::{AirtableQuoteStore, CacheSettings, QuoteCache, QuoteStore, StoreError};
use thiserror::Error;
use tracing::{info, warn};

const EVENT_QUEUE_CAPACITY: usize = 64;

pub struct Application {
    pub config: AppConfig,
    pub store: Arc<dyn QuoteStore>,
    pub cache: Arc<QuoteCache>,
    pub slack_runner: SocketModeRunner,
    pub events: EnvelopeSender,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("quote store client setup failed: {0}")]
    Store(#[source] StoreError),
    #[error("slack client setup failed: {0}")]
    Slack(#[source] RuntimeError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    bootstrap_with_config(AppConfig::load(options)?).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let store: Arc<dyn QuoteStore> =
        Arc::new(AirtableQuoteStore::new(&config.store).map_err(BootstrapError::Store)?);
    let web_api = SlackWebApi::new(&config.slack).map_err(BootstrapError::Slack)?;

    let bot_user_id = match config.slack.bot_user_id.clone() {
        Some(id) => id,
        None => {
            let id = web_api.auth_test().await.map_err(BootstrapError::Slack)?;
            info!(
                event_name = "system.bootstrap.bot_identity_resolved",
                correlation_id = "bootstrap",
                bot_user_id = %id,
                "resolved bot user id via auth.test"
            );
            id
        }
    };

    assemble(config, store, Arc::new(web_api), bot_user_id).await
}

/// Wires the cache, bot, and runner around already-built clients.
pub async fn assemble(
    config: AppConfig,
    store: Arc<dyn QuoteStore>,
    runtime: Arc<dyn BotRuntime>,
    bot_user_id: String,
) -> Result<Application, BootstrapError> {
    let rules = config.rule_set()?;
    let cache = Arc::new(QuoteCache::new(
        store.clone(),
        CacheSettings::from_config(&config.store, &config.cache),
    ));

    if config.cache.warm_on_startup {
        match cache.refresh().await {
            Ok(count) => info!(
                event_name = "system.bootstrap.cache_warmed",
                correlation_id = "bootstrap",
                quote_count = count,
                "quote cache warmed"
            ),
            Err(error) => warn!(
                event_name = "system.bootstrap.cache_warm_failed",
                correlation_id = "bootstrap",
                error = %error,
                "starting with an empty quote cache"
            ),
        }
    }

    let (transport, events) = ChannelTransport::new(EVENT_QUEUE_CAPACITY);
    let bot = QuoteBot::new(rules, cache.clone(), runtime, bot_user_id);
    let slack_runner = SocketModeRunner::new(Arc::new(transport), bot.into_dispatcher());

    info!(
        event_name = "system.bootstrap.ready",
        correlation_id = "bootstrap",
        quotes_cached = cache.len().await,
        "application bootstrap complete"
    );

    Ok(Application { config, store, cache, slack_runner, events })
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use billbot_core::config::{AppConfig, ConfigOverrides, LoadOptions};
    use billbot_core::domain::quote::QuoteId;
    use billbot_core::triggers::INSTALL_GREETING;
    use billbot_slack::events::RawEvent;
    use billbot_slack::{BotRuntime, RuntimeError};
    use billbot_store::{InMemoryQuoteStore, PageRequest, QuotePage, QuoteStore, StoreError};

    use crate::bootstrap::{assemble, bootstrap, Application};

    #[derive(Default)]
    struct RecordingRuntime {
        replies: Mutex<Vec<(String, String)>>,
    }

    impl RecordingRuntime {
        fn replies(&self) -> Vec<(String, String)> {
            self.replies.lock().expect("replies lock").clone()
        }
    }

    #[async_trait]
    impl BotRuntime for RecordingRuntime {
        async fn reply(&self, channel_id: &str, text: &str) -> Result<(), RuntimeError> {
            self.replies.lock().expect("replies lock").push((channel_id.into(), text.into()));
            Ok(())
        }

        async fn add_reaction(
            &self,
            _channel_id: &str,
            _message_ts: &str,
            _name: &str,
        ) -> Result<(), RuntimeError> {
            Ok(())
        }

        async fn open_direct_message(&self, user_id: &str) -> Result<String, RuntimeError> {
            Ok(format!("D-{user_id}"))
        }
    }

    /// Never answers a read.
    struct HungStore;

    #[async_trait]
    impl QuoteStore for HungStore {
        async fn fetch_page(&self, _request: &PageRequest) -> Result<QuotePage, StoreError> {
            std::future::pending().await
        }

        async fn append_quote(&self, _text: &str) -> Result<QuoteId, StoreError> {
            std::future::pending().await
        }
    }

    fn valid_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.store.api_key = "pat-test".to_owned().into();
        config.store.base_id = "appTEST".to_owned();
        config.slack.signing_secret = Some("signing-test".to_owned().into());
        config.slack.bot_token = "xoxb-test".to_owned().into();
        config
    }

    async fn assembled(quotes: &[&str]) -> (Application, Arc<RecordingRuntime>) {
        let store: Arc<dyn QuoteStore> =
            Arc::new(InMemoryQuoteStore::with_quotes(quotes.iter().copied()));
        let runtime = Arc::new(RecordingRuntime::default());
        let app = assemble(valid_config(), store, runtime.clone(), "UBOT".to_owned())
            .await
            .expect("assemble");
        (app, runtime)
    }

    #[tokio::test]
    async fn bootstrap_fails_fast_without_required_slack_tokens() {
        let result = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                store_api_key: Some("pat-test".to_string()),
                store_base_id: Some("appTEST".to_string()),
                slack_bot_token: Some("invalid-token".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await;

        assert!(result.is_err());
        let message = result.err().expect("error").to_string();
        assert!(message.contains("slack.bot_token"));
    }

    #[tokio::test]
    async fn assemble_warms_cache_on_startup() {
        let (app, _runtime) = assembled(&["x", "y", "z"]).await;

        assert_eq!(app.cache.list().await, vec!["x", "y", "z"]);
        assert!(app.cache.last_refreshed().await.is_some());
    }

    #[tokio::test]
    async fn events_sent_to_the_application_reach_the_bot() {
        let (app, runtime) = assembled(&["x"]).await;
        let Application { slack_runner, events, .. } = app;

        let message = RawEvent {
            kind: "message".to_owned(),
            channel: Some("C1".to_owned()),
            channel_type: Some("channel".to_owned()),
            user: Some("U1".to_owned()),
            ts: Some("1730000000.0001".to_owned()),
            text: Some("is the gateway up?".to_owned()),
            ..RawEvent::default()
        };
        events.send(message.into_envelope("Ev01".to_owned())).await.expect("enqueue");
        drop(events);

        slack_runner.start().await.expect("runner");

        assert_eq!(runtime.replies(), vec![("C1".to_owned(), "DRISCOLLLLLLL!!!".to_owned())]);
    }

    #[tokio::test]
    async fn installation_announcement_greets_installer() {
        let (app, runtime) = assembled(&[]).await;

        app.slack_runner.announce_installation(Some("UADMIN".to_owned())).await;

        let replies = runtime.replies();
        assert_eq!(replies.len(), INSTALL_GREETING.len());
        assert!(replies.iter().all(|(channel, _)| channel == "D-UADMIN"));
        assert_eq!(replies[0].1, INSTALL_GREETING[0]);
    }

    #[tokio::test]
    async fn hung_quote_store_does_not_delay_other_replies() {
        let mut config = valid_config();
        config.cache.warm_on_startup = false;
        let runtime = Arc::new(RecordingRuntime::default());
        let app = assemble(config, Arc::new(HungStore), runtime.clone(), "UBOT".to_owned())
            .await
            .expect("assemble");
        let Application { slack_runner, events, .. } = app;
        let running = tokio::spawn(async move { slack_runner.start().await });

        let question = RawEvent {
            kind: "message".to_owned(),
            channel: Some("D1".to_owned()),
            channel_type: Some("im".to_owned()),
            user: Some("U1".to_owned()),
            ts: Some("1730000000.0001".to_owned()),
            text: Some("what do you think".to_owned()),
            ..RawEvent::default()
        };
        let outage = RawEvent {
            kind: "message".to_owned(),
            channel: Some("C1".to_owned()),
            channel_type: Some("channel".to_owned()),
            user: Some("U1".to_owned()),
            ts: Some("1730000000.0002".to_owned()),
            text: Some("the gateway is down".to_owned()),
            ..RawEvent::default()
        };
        events.send(question.into_envelope("Ev01".to_owned())).await.expect("enqueue");
        events.send(outage.into_envelope("Ev02".to_owned())).await.expect("enqueue");

        let replied = tokio::time::timeout(Duration::from_secs(5), async {
            while runtime.replies().is_empty() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;

        running.abort();
        assert!(replied.is_ok(), "gateway reply was held behind the quote lookup");
        assert_eq!(runtime.replies(), vec![("C1".to_owned(), "DRISCOLLLLLLL!!!".to_owned())]);
    }
}
