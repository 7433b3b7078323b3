use billbot_store::QuoteStore;

use crate::commands::{
    build_runtime, build_store, load_config, store_failure, CommandResult, EXIT_USAGE,
};

pub fn run(text: &str) -> CommandResult {
    if text.trim().is_empty() {
        return CommandResult::failure("add", "usage", "no quote specified", EXIT_USAGE);
    }

    let config = match load_config("add") {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match build_runtime("add") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };
    let store = match build_store("add", &config) {
        Ok(store) => store,
        Err(result) => return result,
    };

    match runtime.block_on(store.append_quote(text)) {
        Ok(id) => CommandResult::success("add", format!("quote added as `{id}`")),
        Err(error) => store_failure("add", &error),
    }
}
