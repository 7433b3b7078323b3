use billbot_core::{ResponsePolicy, RuleSet, Scope};
use serde_json::json;

use crate::commands::{load_config, CommandResult, EXIT_CONFIG, EXIT_USAGE};

/// Lists the effective trigger rules, or with `text` reports which rule a
/// message in `scope` would fire.
pub fn run(text: Option<&str>, scope: &str) -> CommandResult {
    let config = match load_config("triggers") {
        Ok(config) => config,
        Err(result) => return result,
    };
    let rules = match config.rule_set() {
        Ok(rules) => rules,
        Err(error) => {
            return CommandResult::failure(
                "triggers",
                "config_validation",
                error.to_string(),
                EXIT_CONFIG,
            );
        }
    };

    match text {
        Some(text) => evaluate(&rules, text, scope),
        None => {
            let names: Vec<&str> = rules.names().collect();
            CommandResult::success_with_data(
                "triggers",
                format!("{} rule(s) in evaluation order", names.len()),
                Some(json!(names)),
            )
        }
    }
}

fn evaluate(rules: &RuleSet, text: &str, scope: &str) -> CommandResult {
    let scope = match scope.parse::<Scope>() {
        Ok(scope) => scope,
        Err(error) => {
            return CommandResult::failure("triggers", "usage", error.to_string(), EXIT_USAGE);
        }
    };

    match rules.evaluate(text, scope) {
        Some(rule) => {
            let response = match &rule.response {
                ResponsePolicy::Fixed(reply) => json!({"kind": "fixed", "reply": reply}),
                ResponsePolicy::RandomQuote => json!({"kind": "random_quote"}),
            };
            CommandResult::success_with_data(
                "triggers",
                format!("rule `{}` matches in scope `{}`", rule.name, scope.as_str()),
                Some(json!({"rule": rule.name, "response": response})),
            )
        }
        None => {
            let outcome = if scope.is_direct() { "fallback" } else { "ignored" };
            CommandResult::success_with_data(
                "triggers",
                format!("no rule matches in scope `{}`", scope.as_str()),
                Some(json!({"rule": null, "outcome": outcome})),
            )
        }
    }
}
