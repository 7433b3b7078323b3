use billbot_store::fetch_quotes;
use serde_json::json;

use crate::commands::{build_runtime, build_store, load_config, store_failure, CommandResult};

/// Fetches the configured view once, capped at `limit` or the configured
/// maximum, whichever is smaller.
pub fn run(limit: Option<usize>) -> CommandResult {
    let config = match load_config("list") {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match build_runtime("list") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };
    let store = match build_store("list", &config) {
        Ok(store) => store,
        Err(result) => return result,
    };

    let cap = limit.map_or(config.store.max_records, |limit| limit.min(config.store.max_records));
    let fetched = runtime.block_on(fetch_quotes(
        &store,
        &config.store.view,
        cap,
        config.store.page_size,
    ));

    match fetched {
        Ok(quotes) => {
            let texts: Vec<&str> = quotes.iter().map(|quote| quote.text.as_str()).collect();
            CommandResult::success_with_data(
                "list",
                format!("{} quote(s) from view `{}`", texts.len(), config.store.view),
                Some(json!(texts)),
            )
        }
        Err(error) => store_failure("list", &error),
    }
}
