use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use billbot_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let file_path = detect_config_path();
    let file_doc = load_config_file_doc(file_path.as_deref());
    let source = |key_path: &str, env_keys: &[&str]| {
        field_source(key_path, env_keys, file_doc.as_ref(), file_path.as_deref())
    };

    let fields = vec![
        field("store.api_url", config.store.api_url.clone(), &["BILLBOT_STORE_API_URL"]),
        field(
            "store.api_key",
            redact_secret(config.store.api_key.expose_secret()),
            &["BILLBOT_STORE_API_KEY", "AIRTABLE_API_KEY"],
        ),
        field(
            "store.base_id",
            config.store.base_id.clone(),
            &["BILLBOT_STORE_BASE_ID", "AIRTABLE_BASE_KEY"],
        ),
        field("store.table", config.store.table.clone(), &["BILLBOT_STORE_TABLE"]),
        field("store.view", config.store.view.clone(), &["BILLBOT_STORE_VIEW"]),
        field(
            "store.max_records",
            config.store.max_records.to_string(),
            &["BILLBOT_STORE_MAX_RECORDS"],
        ),
        field("store.page_size", config.store.page_size.to_string(), &["BILLBOT_STORE_PAGE_SIZE"]),
        field(
            "store.timeout_secs",
            config.store.timeout_secs.to_string(),
            &["BILLBOT_STORE_TIMEOUT_SECS"],
        ),
        field(
            "slack.bot_token",
            redact_token(config.slack.bot_token.expose_secret()),
            &["BILLBOT_SLACK_BOT_TOKEN", "TOKEN", "SLACK_TOKEN"],
        ),
        field(
            "slack.signing_secret",
            config.slack.signing_secret.as_ref().map_or("<unset>", |_| "<redacted>").to_string(),
            &["BILLBOT_SLACK_SIGNING_SECRET", "SLACK_SIGNING_SECRET"],
        ),
        field(
            "slack.bot_user_id",
            config.slack.bot_user_id.clone().unwrap_or_else(|| "<unset>".to_string()),
            &["BILLBOT_SLACK_BOT_USER_ID"],
        ),
        field(
            "slack.installer_user_id",
            config.slack.installer_user_id.clone().unwrap_or_else(|| "<unset>".to_string()),
            &["BILLBOT_SLACK_INSTALLER_USER_ID"],
        ),
        field(
            "server.bind_address",
            config.server.bind_address.clone(),
            &["BILLBOT_SERVER_BIND_ADDRESS"],
        ),
        field("server.port", config.server.port.to_string(), &["BILLBOT_SERVER_PORT", "PORT"]),
        field(
            "cache.max_age_secs",
            config.cache.max_age_secs.to_string(),
            &["BILLBOT_CACHE_MAX_AGE_SECS"],
        ),
        field(
            "cache.warm_on_startup",
            config.cache.warm_on_startup.to_string(),
            &["BILLBOT_CACHE_WARM_ON_STARTUP"],
        ),
        field(
            "logging.level",
            config.logging.level.clone(),
            &["BILLBOT_LOGGING_LEVEL", "BILLBOT_LOG_LEVEL"],
        ),
        field(
            "logging.format",
            format!("{:?}", config.logging.format),
            &["BILLBOT_LOGGING_FORMAT", "BILLBOT_LOG_FORMAT"],
        ),
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in fields {
        lines.push(render_line(field.key, &field.value, source(field.key, field.env_keys)));
    }

    let trigger_count = config.triggers.as_ref().map(Vec::len);
    let trigger_summary = match trigger_count {
        Some(count) => format!("{count} configured rule(s)"),
        None => "built-in rules".to_string(),
    };
    lines.push(render_line("triggers", &trigger_summary, source("triggers", &[])));

    lines.join("\n")
}

struct Field {
    key: &'static str,
    value: String,
    env_keys: &'static [&'static str],
}

fn field(key: &'static str, value: String, env_keys: &'static [&'static str]) -> Field {
    Field { key, value, env_keys }
}

fn detect_config_path() -> Option<PathBuf> {
    ["billbot.toml", "config/billbot.toml"]
        .into_iter()
        .map(PathBuf::from)
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('-') {
        return format!("{prefix}-***");
    }

    "<redacted>".to_string()
}

fn redact_secret(secret: &str) -> String {
    if secret.trim().is_empty() {
        "<empty>".to_string()
    } else {
        "<redacted>".to_string()
    }
}
