use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use peptalk_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let source = |field: &str, env_keys: &[&str]| {
        field_source(field, env_keys, config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let mut lines =
        vec!["effective config (source precedence: env > file > default):".to_string()];

    lines.push(render_line(
        "gemini.api_key",
        &redact_secret(config.gemini.api_key.expose_secret()),
        source("gemini.api_key", &["PEPTALK_GEMINI_API_KEY", "GOOGLE_API_KEY"]),
    ));
    lines.push(render_line(
        "gemini.model",
        &config.gemini.model,
        source("gemini.model", &["PEPTALK_GEMINI_MODEL"]),
    ));
    lines.push(render_line(
        "gemini.base_url",
        &config.gemini.base_url,
        source("gemini.base_url", &["PEPTALK_GEMINI_BASE_URL"]),
    ));
    lines.push(render_line(
        "gemini.timeout_secs",
        &config.gemini.timeout_secs.to_string(),
        source("gemini.timeout_secs", &["PEPTALK_GEMINI_TIMEOUT_SECS"]),
    ));

    lines.push(render_line(
        "telegram.bot_token",
        &redact_secret(config.telegram.bot_token.expose_secret()),
        source("telegram.bot_token", &["PEPTALK_TELEGRAM_BOT_TOKEN", "TELEGRAM_TOKEN"]),
    ));
    lines.push(render_line(
        "telegram.chat_id",
        &config.telegram.chat_id,
        source("telegram.chat_id", &["PEPTALK_TELEGRAM_CHAT_ID", "TELEGRAM_CHAT_ID"]),
    ));
    lines.push(render_line(
        "telegram.base_url",
        &config.telegram.base_url,
        source("telegram.base_url", &["PEPTALK_TELEGRAM_BASE_URL"]),
    ));
    lines.push(render_line(
        "telegram.timeout_secs",
        &config.telegram.timeout_secs.to_string(),
        source("telegram.timeout_secs", &["PEPTALK_TELEGRAM_TIMEOUT_SECS"]),
    ));

    lines.push(render_line(
        "retry.max_attempts",
        &config.retry.max_attempts.to_string(),
        source("retry.max_attempts", &["PEPTALK_RETRY_MAX_ATTEMPTS"]),
    ));
    lines.push(render_line(
        "retry.delay_secs",
        &config.retry.delay_secs.to_string(),
        source("retry.delay_secs", &["PEPTALK_RETRY_DELAY_SECS"]),
    ));

    lines.push(render_line(
        "logging.level",
        &config.logging.level,
        source("logging.level", &["PEPTALK_LOG_LEVEL"]),
    ));
    lines.push(render_line(
        "logging.format",
        &format!("{:?}", config.logging.format).to_lowercase(),
        source("logging.format", &["PEPTALK_LOG_FORMAT"]),
    ));

    lines.join("\n")
}

fn render_line(field: &str, value: &str, source: String) -> String {
    format!("  {field} = {value}  [{source}]")
}

fn field_source(
    field: &str,
    env_keys: &[&str],
    file_doc: Option<&Value>,
    file_path: Option<&Path>,
) -> String {
    for key in env_keys {
        if env::var(key).map(|value| !value.trim().is_empty()).unwrap_or(false) {
            return format!("env {key}");
        }
    }

    if let (Some(doc), Some(path)) = (file_doc, file_path) {
        if file_has_field(doc, field) {
            return format!("file {}", path.display());
        }
    }

    "default".to_string()
}

fn file_has_field(doc: &Value, field: &str) -> bool {
    let Some((table, key)) = field.split_once('.') else {
        return false;
    };
    doc.get(table).and_then(|section| section.get(key)).is_some()
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("peptalk.toml"), PathBuf::from("config/peptalk.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = fs::read_to_string(path?).ok()?;
    raw.parse::<Value>().ok()
}

fn redact_secret(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    // Bot tokens are `<numeric id>:<secret>`; the id alone is safe to show.
    if let Some((bot_id, _)) = trimmed.split_once(':') {
        if !bot_id.is_empty() && bot_id.bytes().all(|byte| byte.is_ascii_digit()) {
            return format!("{bot_id}:***");
        }
    }

    "<redacted>".to_string()
}
