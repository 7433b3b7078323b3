pub mod config;
pub mod domain;
pub mod errors;
pub mod triggers;

pub use domain::quote::{Quote, QuoteId};
pub use errors::{ApplicationError, InterfaceError};
pub use triggers::{MatchMode, ResponsePolicy, RuleError, RuleSet, Scope, TriggerRule};
