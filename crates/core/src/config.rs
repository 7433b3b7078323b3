use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::triggers::{
    default_rules, MatchMode, ResponsePolicy, RuleError, RuleSet, Scope, TriggerRule,
};

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub store: StoreConfig,
    pub slack: SlackConfig,
    pub server: ServerConfig,
    pub cache: CacheConfig,
    pub logging: LoggingConfig,
    /// `None` keeps the built-in rule list.
    pub triggers: Option<Vec<TriggerRule>>,
}

#[derive(Clone, Debug)]
pub struct StoreConfig {
    pub api_url: String,
    pub api_key: SecretString,
    pub base_id: String,
    pub table: String,
    pub view: String,
    pub max_records: usize,
    pub page_size: usize,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct SlackConfig {
    pub bot_token: SecretString,
    /// Signs Events API requests. Without it `POST /slack/events` rejects everything.
    pub signing_secret: Option<SecretString>,
    pub api_url: String,
    /// Resolved through `auth.test` at startup when unset.
    pub bot_user_id: Option<String>,
    /// Receives the onboarding DMs on every server start, not once per
    /// installation. Unset it after the first run.
    pub installer_user_id: Option<String>,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
}

#[derive(Clone, Debug)]
pub struct CacheConfig {
    /// 0 refetches on every read that asks for freshness.
    pub max_age_secs: u64,
    pub warm_on_startup: bool,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub store_api_url: Option<String>,
    pub store_api_key: Option<String>,
    pub store_base_id: Option<String>,
    pub slack_signing_secret: Option<String>,
    pub slack_bot_token: Option<String>,
    pub slack_bot_user_id: Option<String>,
    pub server_port: Option<u16>,
    pub cache_max_age_secs: Option<u64>,
    pub log_level: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
    #[error("invalid trigger configuration: {0}")]
    Triggers(#[from] RuleError),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig {
                api_url: "https://api.airtable.com".to_string(),
                api_key: String::new().into(),
                base_id: String::new(),
                table: "Quotes".to_string(),
                view: "Grid view".to_string(),
                max_records: 300,
                page_size: 100,
                timeout_secs: 30,
            },
            slack: SlackConfig {
                bot_token: String::new().into(),
                signing_secret: None,
                api_url: "https://slack.com/api".to_string(),
                bot_user_id: None,
                installer_user_id: None,
            },
            server: ServerConfig { bind_address: "127.0.0.1".to_string(), port: 3000 },
            cache: CacheConfig { max_age_secs: 0, warm_on_startup: true },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
            triggers: None,
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl CacheConfig {
    /// `None` means every freshness check refetches.
    pub fn max_age(&self) -> Option<Duration> {
        (self.max_age_secs > 0).then(|| Duration::from_secs(self.max_age_secs))
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch)?;
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("billbot.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    /// Compiles the configured trigger rules, falling back to the built-in list.
    pub fn rule_set(&self) -> Result<RuleSet, ConfigError> {
        let rules = self.triggers.clone().unwrap_or_else(default_rules);
        Ok(RuleSet::compile(rules)?)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) -> Result<(), ConfigError> {
        if let Some(store) = patch.store {
            if let Some(api_url) = store.api_url {
                self.store.api_url = api_url;
            }
            if let Some(api_key) = store.api_key {
                self.store.api_key = api_key.into();
            }
            if let Some(base_id) = store.base_id {
                self.store.base_id = base_id;
            }
            if let Some(table) = store.table {
                self.store.table = table;
            }
            if let Some(view) = store.view {
                self.store.view = view;
            }
            if let Some(max_records) = store.max_records {
                self.store.max_records = max_records;
            }
            if let Some(page_size) = store.page_size {
                self.store.page_size = page_size;
            }
            if let Some(timeout_secs) = store.timeout_secs {
                self.store.timeout_secs = timeout_secs;
            }
        }

        if let Some(slack) = patch.slack {
            if let Some(bot_token) = slack.bot_token {
                self.slack.bot_token = bot_token.into();
            }
            if let Some(signing_secret) = slack.signing_secret {
                self.slack.signing_secret = Some(signing_secret.into());
            }
            if let Some(api_url) = slack.api_url {
                self.slack.api_url = api_url;
            }
            if let Some(bot_user_id) = slack.bot_user_id {
                self.slack.bot_user_id = Some(bot_user_id);
            }
            if let Some(installer_user_id) = slack.installer_user_id {
                self.slack.installer_user_id = Some(installer_user_id);
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
        }

        if let Some(cache) = patch.cache {
            if let Some(max_age_secs) = cache.max_age_secs {
                self.cache.max_age_secs = max_age_secs;
            }
            if let Some(warm_on_startup) = cache.warm_on_startup {
                self.cache.warm_on_startup = warm_on_startup;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }

        if let Some(triggers) = patch.triggers {
            let rules =
                triggers.into_iter().map(TriggerPatch::into_rule).collect::<Result<Vec<_>, _>>()?;
            self.triggers = Some(rules);
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("BILLBOT_STORE_API_URL") {
            self.store.api_url = value;
        }
        let api_key = read_env("BILLBOT_STORE_API_KEY").or_else(|| read_env("AIRTABLE_API_KEY"));
        if let Some(value) = api_key {
            self.store.api_key = value.into();
        }
        let base_id = read_env("BILLBOT_STORE_BASE_ID").or_else(|| read_env("AIRTABLE_BASE_KEY"));
        if let Some(value) = base_id {
            self.store.base_id = value;
        }
        if let Some(value) = read_env("BILLBOT_STORE_TABLE") {
            self.store.table = value;
        }
        if let Some(value) = read_env("BILLBOT_STORE_VIEW") {
            self.store.view = value;
        }
        if let Some(value) = read_env("BILLBOT_STORE_MAX_RECORDS") {
            self.store.max_records = parse_usize("BILLBOT_STORE_MAX_RECORDS", &value)?;
        }
        if let Some(value) = read_env("BILLBOT_STORE_PAGE_SIZE") {
            self.store.page_size = parse_usize("BILLBOT_STORE_PAGE_SIZE", &value)?;
        }
        if let Some(value) = read_env("BILLBOT_STORE_TIMEOUT_SECS") {
            self.store.timeout_secs = parse_u64("BILLBOT_STORE_TIMEOUT_SECS", &value)?;
        }

        let bot_token = read_env("BILLBOT_SLACK_BOT_TOKEN")
            .or_else(|| read_env("TOKEN"))
            .or_else(|| read_env("SLACK_TOKEN"));
        if let Some(value) = bot_token {
            self.slack.bot_token = value.into();
        }
        let signing_secret = read_env("BILLBOT_SLACK_SIGNING_SECRET")
            .or_else(|| read_env("SLACK_SIGNING_SECRET"));
        if let Some(value) = signing_secret {
            self.slack.signing_secret = Some(value.into());
        }
        if let Some(value) = read_env("BILLBOT_SLACK_API_URL") {
            self.slack.api_url = value;
        }
        if let Some(value) = read_env("BILLBOT_SLACK_BOT_USER_ID") {
            self.slack.bot_user_id = Some(value);
        }
        if let Some(value) = read_env("BILLBOT_SLACK_INSTALLER_USER_ID") {
            self.slack.installer_user_id = Some(value);
        }

        if let Some(value) = read_env("BILLBOT_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        let port = read_env("BILLBOT_SERVER_PORT").map(|value| ("BILLBOT_SERVER_PORT", value));
        if let Some((key, value)) = port.or_else(|| read_env("PORT").map(|value| ("PORT", value))) {
            self.server.port = parse_u16(key, &value)?;
        }

        if let Some(value) = read_env("BILLBOT_CACHE_MAX_AGE_SECS") {
            self.cache.max_age_secs = parse_u64("BILLBOT_CACHE_MAX_AGE_SECS", &value)?;
        }
        if let Some(value) = read_env("BILLBOT_CACHE_WARM_ON_STARTUP") {
            self.cache.warm_on_startup = parse_bool("BILLBOT_CACHE_WARM_ON_STARTUP", &value)?;
        }

        let log_level = read_env("BILLBOT_LOGGING_LEVEL").or_else(|| read_env("BILLBOT_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("BILLBOT_LOGGING_FORMAT").or_else(|| read_env("BILLBOT_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(api_url) = overrides.store_api_url {
            self.store.api_url = api_url;
        }
        if let Some(api_key) = overrides.store_api_key {
            self.store.api_key = api_key.into();
        }
        if let Some(base_id) = overrides.store_base_id {
            self.store.base_id = base_id;
        }
        if let Some(bot_token) = overrides.slack_bot_token {
            self.slack.bot_token = bot_token.into();
        }
        if let Some(signing_secret) = overrides.slack_signing_secret {
            self.slack.signing_secret = Some(signing_secret.into());
        }
        if let Some(bot_user_id) = overrides.slack_bot_user_id {
            self.slack.bot_user_id = Some(bot_user_id);
        }
        if let Some(port) = overrides.server_port {
            self.server.port = port;
        }
        if let Some(max_age_secs) = overrides.cache_max_age_secs {
            self.cache.max_age_secs = max_age_secs;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_store(&self.store)?;
        validate_slack(&self.slack)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        self.rule_set()?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("billbot.toml"), PathBuf::from("config/billbot.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_store(store: &StoreConfig) -> Result<(), ConfigError> {
    if store.api_key.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "store.api_key is required. Create a personal access token at https://airtable.com/create/tokens".to_string(),
        ));
    }
    if store.base_id.trim().is_empty() {
        return Err(ConfigError::Validation(
            "store.base_id is required (the `app...` id from the Airtable API docs for your base)"
                .to_string(),
        ));
    }
    if !store.api_url.starts_with("http://") && !store.api_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "store.api_url must start with http:// or https://".to_string(),
        ));
    }
    if store.table.trim().is_empty() {
        return Err(ConfigError::Validation("store.table must not be empty".to_string()));
    }
    if store.max_records == 0 {
        return Err(ConfigError::Validation(
            "store.max_records must be greater than zero".to_string(),
        ));
    }
    if store.page_size == 0 || store.page_size > 100 {
        return Err(ConfigError::Validation(
            "store.page_size must be in range 1..=100".to_string(),
        ));
    }
    if store.timeout_secs == 0 || store.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "store.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_slack(slack: &SlackConfig) -> Result<(), ConfigError> {
    let bot_token = slack.bot_token.expose_secret();
    if bot_token.is_empty() {
        return Err(ConfigError::Validation(
            "slack.bot_token is required. Get it from https://api.slack.com/apps > Your App > OAuth & Permissions > Bot User OAuth Token".to_string()
        ));
    }
    if !bot_token.starts_with("xoxb-") {
        let hint = if bot_token.starts_with("xapp-") {
            " (hint: that is an app-level token, use the Bot User OAuth Token)"
        } else {
            ""
        };
        return Err(ConfigError::Validation(format!(
            "slack.bot_token must start with `xoxb-`{hint}. Get it from https://api.slack.com/apps"
        )));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse::<usize>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    store: Option<StorePatch>,
    slack: Option<SlackPatch>,
    server: Option<ServerPatch>,
    cache: Option<CachePatch>,
    logging: Option<LoggingPatch>,
    triggers: Option<Vec<TriggerPatch>>,
}

#[derive(Debug, Default, Deserialize)]
struct StorePatch {
    api_url: Option<String>,
    api_key: Option<String>,
    base_id: Option<String>,
    table: Option<String>,
    view: Option<String>,
    max_records: Option<usize>,
    page_size: Option<usize>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct SlackPatch {
    bot_token: Option<String>,
    signing_secret: Option<String>,
    api_url: Option<String>,
    bot_user_id: Option<String>,
    installer_user_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
struct CachePatch {
    max_age_secs: Option<u64>,
    warm_on_startup: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

/// One `[[triggers]]` table. Exactly one of `reply` or `random_quote = true`.
#[derive(Debug, Default, Deserialize)]
struct TriggerPatch {
    name: String,
    patterns: Vec<String>,
    scopes: Vec<String>,
    match_mode: Option<MatchMode>,
    case_sensitive: Option<bool>,
    reply: Option<String>,
    random_quote: Option<bool>,
}

impl TriggerPatch {
    fn into_rule(self) -> Result<TriggerRule, ConfigError> {
        let response = match (self.reply, self.random_quote.unwrap_or(false)) {
            (Some(reply), false) => ResponsePolicy::Fixed(reply),
            (None, true) => ResponsePolicy::RandomQuote,
            _ => {
                return Err(ConfigError::Validation(format!(
                    "triggers.{} must set exactly one of `reply` or `random_quote = true`",
                    self.name
                )))
            }
        };
        let scopes = self
            .scopes
            .iter()
            .map(|scope| scope.parse::<Scope>())
            .collect::<Result<Vec<_>, _>>()?;

        Ok(TriggerRule {
            name: self.name,
            patterns: self.patterns,
            scopes,
            match_mode: self.match_mode.unwrap_or_default(),
            case_sensitive: self.case_sensitive.unwrap_or(false),
            response,
        })
    }
}
