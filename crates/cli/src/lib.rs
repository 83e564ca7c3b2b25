pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "peptalk",
    about = "Generate a motivational quote and deliver it to Telegram",
    long_about = "Run the generate → validate → deliver pipeline once and exit. Intended to be invoked by an external scheduler (cron, CI workflow); exit code 0 means one message was delivered.",
    after_help = "Examples:\n  peptalk\n  peptalk send --chat-id -1001234567890\n  peptalk config\n  peptalk doctor --json"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Run the quote pipeline once (the default when no subcommand is given)")]
    Send(SendArgs),
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config and credential shapes without calling either provider")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

#[derive(Debug, Default, Args)]
pub struct SendArgs {
    #[arg(long, value_name = "PATH", help = "Path to a peptalk.toml config file")]
    config: Option<PathBuf>,
    #[arg(long, value_name = "MODEL", help = "Override the generator model")]
    model: Option<String>,
    // Group chat ids are negative numbers; the value may begin with `-`.
    #[arg(
        long = "chat-id",
        value_name = "CHAT_ID",
        allow_hyphen_values = true,
        help = "Override the destination chat"
    )]
    chat_id: Option<String>,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command.unwrap_or_else(|| Command::Send(SendArgs::default())) {
        Command::Send(args) => commands::send::run(args),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
