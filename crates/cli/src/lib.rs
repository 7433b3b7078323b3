pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "billbot",
    about = "billbot operator CLI",
    long_about = "Check readiness, inspect configuration, and manage the quote table billbot reads from.",
    after_help = "Examples:\n  billbot doctor --json\n  billbot add \"Ship it on Friday\"\n  billbot triggers --text \"the gateway is down\""
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Validate config, trigger rules, Slack tokens and quote store connectivity")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Append one quote to the quote table")]
    Add {
        #[arg(help = "Quote text, stored verbatim")]
        text: String,
    },
    #[command(about = "Fetch quotes from the configured view as a JSON array")]
    List {
        #[arg(long, help = "Return at most this many quotes")]
        limit: Option<usize>,
    },
    #[command(about = "List trigger rules, or show which rule a message would fire")]
    Triggers {
        #[arg(long, help = "Message text to evaluate")]
        text: Option<String>,
        #[arg(
            long,
            default_value = "ambient",
            help = "ambient, direct_mention, mention, direct_message or channel_join"
        )]
        scope: String,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Doctor { json } => {
            let report = commands::doctor::build_report();
            let exit_code = if report.passed() { 0 } else { 1 };
            commands::CommandResult {
                exit_code,
                output: commands::doctor::render(&report, json),
            }
        }
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Add { text } => commands::add::run(&text),
        Command::List { limit } => commands::list::run(limit),
        Command::Triggers { text, scope } => commands::triggers::run(text.as_deref(), &scope),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
