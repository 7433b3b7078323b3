//! Keyword trigger rules.
//!
//! A [`RuleSet`] is an ordered list of declarative rules. Each rule pairs a set
//! of patterns with the scopes it answers in and a response policy. Evaluation
//! is first-match-wins in registration order; a rule whose pattern matches but
//! whose scope set excludes the message scope is skipped.

use std::str::FromStr;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const FALLBACK_REPLY: &str = "What do you want???";
pub const CHANNEL_JOIN_REPLY: &str = "What do you want???";
pub const EMPTY_CACHE_REPLY: &str = "I've got nothing. Somebody add a quote first.";
pub const FALLBACK_REACTION: &str = "robot_face";

pub const INSTALL_GREETING: [&str; 2] = [
    "I am a bot that has just joined your team",
    "You must now /invite me to a channel so that I can be of use!",
];

const POINTING_LEGEND: &str = "UGHHHH, you guys...
1 = 1 hour
2 = 2 to 4 hours
3 = 5 to 8 hours
5 = 2-4 days
8 = 5 or more days/1 week or more
13 = 1 sprint/10 days
20 = PBI needs to be broken down more";

/// How a message reached the bot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Ambient,
    DirectMention,
    Mention,
    DirectMessage,
    ChannelJoin,
}

impl Scope {
    /// Scopes where the bot was addressed and owes an answer.
    pub fn is_direct(self) -> bool {
        matches!(self, Self::DirectMention | Self::Mention | Self::DirectMessage)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ambient => "ambient",
            Self::DirectMention => "direct_mention",
            Self::Mention => "mention",
            Self::DirectMessage => "direct_message",
            Self::ChannelJoin => "channel_join",
        }
    }
}

impl FromStr for Scope {
    type Err = RuleError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "ambient" => Ok(Self::Ambient),
            "direct_mention" => Ok(Self::DirectMention),
            "mention" => Ok(Self::Mention),
            "direct_message" | "im" => Ok(Self::DirectMessage),
            "channel_join" | "bot_channel_join" => Ok(Self::ChannelJoin),
            other => Err(RuleError::UnknownScope(other.to_owned())),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    #[default]
    Substring,
    WholeWord,
    /// Pattern is used as a regular expression verbatim.
    Regex,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResponsePolicy {
    Fixed(String),
    RandomQuote,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TriggerRule {
    pub name: String,
    pub patterns: Vec<String>,
    pub scopes: Vec<Scope>,
    pub match_mode: MatchMode,
    pub case_sensitive: bool,
    pub response: ResponsePolicy,
}

impl TriggerRule {
    pub fn fixed<P, S>(name: &str, patterns: P, scopes: S, reply: impl Into<String>) -> Self
    where
        P: IntoIterator,
        P::Item: Into<String>,
        S: IntoIterator<Item = Scope>,
    {
        Self::new(name, patterns, scopes, ResponsePolicy::Fixed(reply.into()))
    }

    pub fn random_quote<P, S>(name: &str, patterns: P, scopes: S) -> Self
    where
        P: IntoIterator,
        P::Item: Into<String>,
        S: IntoIterator<Item = Scope>,
    {
        Self::new(name, patterns, scopes, ResponsePolicy::RandomQuote)
    }

    fn new<P, S>(name: &str, patterns: P, scopes: S, response: ResponsePolicy) -> Self
    where
        P: IntoIterator,
        P::Item: Into<String>,
        S: IntoIterator<Item = Scope>,
    {
        Self {
            name: name.to_owned(),
            patterns: patterns.into_iter().map(Into::into).collect(),
            scopes: scopes.into_iter().collect(),
            match_mode: MatchMode::default(),
            case_sensitive: false,
            response,
        }
    }

    pub fn match_mode(mut self, match_mode: MatchMode) -> Self {
        self.match_mode = match_mode;
        self
    }

    pub fn case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = case_sensitive;
        self
    }

    pub fn allows(&self, scope: Scope) -> bool {
        self.scopes.contains(&scope)
    }
}

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("trigger rule `{0}` has no patterns")]
    EmptyPatterns(String),
    #[error("trigger rule `{0}` has no scopes")]
    EmptyScopes(String),
    #[error("trigger rule `{rule}` has invalid pattern `{pattern}`: {source}")]
    InvalidPattern {
        rule: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("unknown scope `{0}` (expected ambient|direct_mention|mention|direct_message|channel_join)")]
    UnknownScope(String),
}

#[derive(Clone, Debug)]
struct CompiledRule {
    rule: TriggerRule,
    matchers: Vec<Regex>,
}

impl CompiledRule {
    fn matches(&self, text: &str) -> bool {
        self.matchers.iter().any(|matcher| matcher.is_match(text))
    }
}

#[derive(Clone, Debug, Default)]
pub struct RuleSet {
    rules: Vec<CompiledRule>,
}

impl RuleSet {
    pub fn compile(rules: Vec<TriggerRule>) -> Result<Self, RuleError> {
        let rules = rules.into_iter().map(compile_rule).collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rules })
    }

    /// Returns the first rule, in registration order, whose patterns match
    /// `text` and whose scopes include `scope`.
    pub fn evaluate(&self, text: &str, scope: Scope) -> Option<&TriggerRule> {
        self.rules
            .iter()
            .filter(|compiled| compiled.rule.allows(scope))
            .find(|compiled| compiled.matches(text))
            .map(|compiled| &compiled.rule)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|compiled| compiled.rule.name.as_str())
    }
}

fn compile_rule(rule: TriggerRule) -> Result<CompiledRule, RuleError> {
    if rule.patterns.iter().all(|pattern| pattern.trim().is_empty()) {
        return Err(RuleError::EmptyPatterns(rule.name));
    }
    if rule.scopes.is_empty() {
        return Err(RuleError::EmptyScopes(rule.name));
    }

    let matchers = rule
        .patterns
        .iter()
        .filter(|pattern| !pattern.trim().is_empty())
        .map(|pattern| {
            let source = match rule.match_mode {
                MatchMode::Substring => regex::escape(pattern),
                MatchMode::WholeWord => format!(r"\b{}\b", regex::escape(pattern)),
                MatchMode::Regex => pattern.clone(),
            };
            RegexBuilder::new(&source).case_insensitive(!rule.case_sensitive).build().map_err(
                |source| RuleError::InvalidPattern {
                    rule: rule.name.clone(),
                    pattern: pattern.clone(),
                    source,
                },
            )
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(CompiledRule { rule, matchers })
}

pub fn default_rules() -> Vec<TriggerRule> {
    vec![
        TriggerRule::fixed("gateway", ["gateway"], [Scope::Ambient], "DRISCOLLLLLLL!!!"),
        TriggerRule::fixed("pointing", ["pointing"], [Scope::Ambient], POINTING_LEGEND),
        TriggerRule::random_quote(
            "wisdom",
            ["think", "idea", "why", "like", "problem", "help", "what"],
            [Scope::DirectMention, Scope::Mention, Scope::DirectMessage],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::{
        default_rules, MatchMode, ResponsePolicy, RuleError, RuleSet, Scope, TriggerRule,
    };

    fn defaults() -> RuleSet {
        RuleSet::compile(default_rules()).expect("default rules compile")
    }

    #[test]
    fn gateway_replies_in_ambient_scope() {
        let rules = defaults();
        let rule = rules.evaluate("who broke the gateway again", Scope::Ambient).expect("match");

        assert_eq!(rule.name, "gateway");
        assert_eq!(rule.response, ResponsePolicy::Fixed("DRISCOLLLLLLL!!!".to_owned()));
    }

    #[test]
    fn gateway_is_skipped_outside_its_scopes() {
        let rules = defaults();

        assert!(rules.evaluate("gateway", Scope::DirectMessage).is_none());
        assert!(rules.evaluate("gateway", Scope::ChannelJoin).is_none());
    }

    #[test]
    fn scope_excluded_rule_falls_through_to_later_rule() {
        let rules = RuleSet::compile(vec![
            TriggerRule::fixed("ambient-help", ["help"], [Scope::Ambient], "ask in #help"),
            TriggerRule::random_quote("direct-help", ["help"], [Scope::DirectMessage]),
        ])
        .expect("rules compile");

        let rule = rules.evaluate("help me", Scope::DirectMessage).expect("match");
        assert_eq!(rule.name, "direct-help");
    }

    #[test]
    fn first_registered_rule_wins() {
        let rules = RuleSet::compile(vec![
            TriggerRule::fixed("first", ["deploy"], [Scope::Ambient], "one"),
            TriggerRule::fixed("second", ["deploy"], [Scope::Ambient], "two"),
        ])
        .expect("rules compile");

        let rule = rules.evaluate("deploy now", Scope::Ambient).expect("match");
        assert_eq!(rule.name, "first");
        assert_eq!(rules.names().collect::<Vec<_>>(), vec!["first", "second"]);
    }

    #[test]
    fn substring_matching_is_case_insensitive_by_default() {
        let rules = defaults();

        let rule = rules.evaluate("WHAT is going on", Scope::DirectMention).expect("match");
        assert_eq!(rule.response, ResponsePolicy::RandomQuote);
        // substring: "likely" contains "like"
        assert!(rules.evaluate("likely", Scope::Mention).is_some());
    }

    #[test]
    fn whole_word_mode_rejects_partial_words() {
        let rules = RuleSet::compile(vec![TriggerRule::fixed(
            "like",
            ["like"],
            [Scope::Ambient],
            "same",
        )
        .match_mode(MatchMode::WholeWord)])
        .expect("rules compile");

        assert!(rules.evaluate("I like it", Scope::Ambient).is_some());
        assert!(rules.evaluate("likely not", Scope::Ambient).is_none());
    }

    #[test]
    fn case_sensitive_rules_honor_case() {
        let rules = RuleSet::compile(vec![TriggerRule::fixed(
            "acronym",
            ["PBI"],
            [Scope::Ambient],
            "break it down",
        )
        .case_sensitive(true)])
        .expect("rules compile");

        assert!(rules.evaluate("this PBI is huge", Scope::Ambient).is_some());
        assert!(rules.evaluate("this pbi is huge", Scope::Ambient).is_none());
    }

    #[test]
    fn substring_patterns_are_escaped() {
        let rules = RuleSet::compile(vec![TriggerRule::fixed(
            "question",
            ["why?"],
            [Scope::Ambient],
            "because",
        )])
        .expect("rules compile");

        assert!(rules.evaluate("but why?", Scope::Ambient).is_some());
        assert!(rules.evaluate("but wh", Scope::Ambient).is_none());
    }

    #[test]
    fn regex_mode_uses_pattern_verbatim() {
        let rules = RuleSet::compile(vec![TriggerRule::fixed(
            "ticket",
            [r"^PBI-\d+"],
            [Scope::Ambient],
            "linked",
        )
        .match_mode(MatchMode::Regex)])
        .expect("rules compile");

        assert!(rules.evaluate("pbi-42 is blocked", Scope::Ambient).is_some());
        assert!(rules.evaluate("see pbi-42", Scope::Ambient).is_none());
    }

    #[test]
    fn invalid_rules_are_rejected() {
        let empty = RuleSet::compile(vec![TriggerRule::fixed(
            "empty",
            Vec::<String>::new(),
            [Scope::Ambient],
            "x",
        )]);
        assert!(matches!(empty, Err(RuleError::EmptyPatterns(ref name)) if name == "empty"));

        let scopeless = RuleSet::compile(vec![TriggerRule::fixed(
            "scopeless",
            ["x"],
            Vec::<Scope>::new(),
            "x",
        )]);
        assert!(matches!(scopeless, Err(RuleError::EmptyScopes(_))));

        let broken = RuleSet::compile(vec![TriggerRule::fixed(
            "broken",
            ["(unclosed"],
            [Scope::Ambient],
            "x",
        )
        .match_mode(MatchMode::Regex)]);
        assert!(matches!(broken, Err(RuleError::InvalidPattern { .. })));
    }

    #[test]
    fn scope_parses_botkit_names() {
        assert_eq!("direct_mention".parse::<Scope>().ok(), Some(Scope::DirectMention));
        assert_eq!("IM".parse::<Scope>().ok(), Some(Scope::DirectMessage));
        assert_eq!("bot_channel_join".parse::<Scope>().ok(), Some(Scope::ChannelJoin));
        assert!("message_received".parse::<Scope>().is_err());
        assert!(Scope::Mention.is_direct());
        assert!(!Scope::Ambient.is_direct());
    }
}
