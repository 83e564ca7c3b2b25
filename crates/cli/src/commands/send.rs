use std::sync::Arc;

use peptalk_core::config::{AppConfig, ConfigOverrides, LoadOptions, LogFormat};
use peptalk_core::pipeline::{Pipeline, QuoteDelivery, QuoteGenerator, RunOutcome};
use peptalk_core::retry::RetryPolicy;
use peptalk_gemini::GeminiClient;
use peptalk_telegram::TelegramClient;

use crate::commands::CommandResult;
use crate::SendArgs;

pub fn run(args: SendArgs) -> CommandResult {
    // An explicitly named config file must exist; the default lookup is
    // best-effort.
    let require_file = args.config.is_some();
    let config = match AppConfig::load(LoadOptions {
        config_path: args.config,
        require_file,
        overrides: ConfigOverrides {
            gemini_model: args.model,
            telegram_chat_id: args.chat_id,
            ..ConfigOverrides::default()
        },
    }) {
        Ok(config) => config,
        Err(error) => return CommandResult::failure("send", "config", error.to_string(), 2),
    };

    init_logging(&config);

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => return CommandResult::failure("send", "runtime", error.to_string(), 1),
    };

    runtime.block_on(run_pipeline(config))
}

async fn run_pipeline(config: AppConfig) -> CommandResult {
    let generator: Arc<dyn QuoteGenerator> = match GeminiClient::new(&config.gemini) {
        Ok(client) => Arc::new(client),
        Err(error) => return client_init_failure("generator_init", error),
    };
    let delivery: Arc<dyn QuoteDelivery> = match TelegramClient::new(&config.telegram) {
        Ok(client) => Arc::new(client),
        Err(error) => return client_init_failure("delivery_init", error),
    };

    let pipeline = Pipeline::new(generator, delivery, RetryPolicy::from(&config.retry));

    // Nothing is persisted, so an interrupt mid-retry needs no cleanup;
    // the run simply does not complete.
    tokio::select! {
        outcome = pipeline.run() => finish(outcome),
        _ = tokio::signal::ctrl_c() => CommandResult::failure(
            "send",
            "interrupted",
            "run aborted by termination signal",
            130,
        ),
    }
}

fn finish(outcome: RunOutcome) -> CommandResult {
    if outcome.is_success() {
        return CommandResult::success("send", "quote delivered");
    }

    let message = outcome
        .error
        .map(|error| error.to_string())
        .unwrap_or_else(|| "pipeline ended without delivering".to_string());
    CommandResult::failure("send", "pipeline", message, 1)
}

fn client_init_failure(error_class: &str, error: anyhow::Error) -> CommandResult {
    CommandResult::failure("send", error_class, error.to_string(), 1)
}

fn init_logging(config: &AppConfig) {
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        LogFormat::Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        LogFormat::Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}
