use billbot_core::config::{AppConfig, LoadOptions};
use billbot_store::{AirtableQuoteStore, PageRequest, QuoteStore};
use secrecy::ExposeSecret;
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
pub struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

impl DoctorReport {
    pub fn passed(&self) -> bool {
        self.overall_status == CheckStatus::Pass
    }
}

pub fn run(json_output: bool) -> String {
    render(&build_report(), json_output)
}

pub fn render(report: &DoctorReport, json_output: bool) -> String {
    if json_output {
        return serde_json::to_string_pretty(report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
    }

    render_human(report)
}

pub fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_trigger_rules(&config));
            checks.push(check_slack_tokens(&config));
            checks.push(check_store_connectivity(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["trigger_rules", "slack_token_readiness", "store_connectivity"] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_trigger_rules(config: &AppConfig) -> DoctorCheck {
    match config.rule_set() {
        Ok(rules) => {
            let names = rules.names().collect::<Vec<_>>().join(", ");
            DoctorCheck {
                name: "trigger_rules",
                status: CheckStatus::Pass,
                details: format!("{} rule(s): {names}", rules.len()),
            }
        }
        Err(error) => DoctorCheck {
            name: "trigger_rules",
            status: CheckStatus::Fail,
            details: error.to_string(),
        },
    }
}

fn check_slack_tokens(config: &AppConfig) -> DoctorCheck {
    let bot_user = config.slack.bot_user_id.as_deref().unwrap_or("resolved at startup");
    let bot_token = config.slack.bot_token.expose_secret();
    if config.slack.signing_secret.is_none() {
        return DoctorCheck {
            name: "slack_token_readiness",
            status: CheckStatus::Fail,
            details: "slack.signing_secret is unset; POST /slack/events will answer 503"
                .to_string(),
        };
    }

    DoctorCheck {
        name: "slack_token_readiness",
        status: CheckStatus::Pass,
        details: format!(
            "bot token {}, signing secret set, bot user {bot_user}",
            token_prefix(bot_token)
        ),
    }
}

fn token_prefix(token: &str) -> &str {
    token.split_once('-').map_or("<redacted>", |(prefix, _)| prefix)
}

fn check_store_connectivity(config: &AppConfig) -> DoctorCheck {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return DoctorCheck {
                name: "store_connectivity",
                status: CheckStatus::Fail,
                details: format!("failed to initialize async runtime: {error}"),
            };
        }
    };

    let result = runtime.block_on(async {
        let store = AirtableQuoteStore::new(&config.store)?;
        let first_page = PageRequest {
            view: config.store.view.clone(),
            max_records: 1,
            page_size: 1,
            offset: None,
        };
        store.fetch_page(&first_page).await
    });

    match result {
        Ok(_) => DoctorCheck {
            name: "store_connectivity",
            status: CheckStatus::Pass,
            details: format!(
                "read table `{}` view `{}` at `{}`",
                config.store.table, config.store.view, config.store.api_url
            ),
        },
        Err(error) => DoctorCheck {
            name: "store_connectivity",
            status: CheckStatus::Fail,
            details: error.to_string(),
        },
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use billbot_core::config::AppConfig;

    use super::{check_slack_tokens, CheckStatus};

    #[test]
    fn slack_check_requires_signing_secret() {
        let mut config = AppConfig::default();
        config.slack.bot_token = "xoxb-test".to_owned().into();

        let missing = check_slack_tokens(&config);
        assert_eq!(missing.status, CheckStatus::Fail);
        assert!(missing.details.contains("slack.signing_secret"));

        config.slack.signing_secret = Some("shh".to_owned().into());
        let ready = check_slack_tokens(&config);
        assert_eq!(ready.status, CheckStatus::Pass);
        assert!(ready.details.starts_with("bot token xoxb,"));
        assert!(!ready.details.contains("shh"));
    }
}
