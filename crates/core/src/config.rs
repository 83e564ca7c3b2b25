use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub gemini: GeminiConfig,
    pub telegram: TelegramConfig,
    pub retry: RetryConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct GeminiConfig {
    pub api_key: SecretString,
    pub model: String,
    pub base_url: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct TelegramConfig {
    pub bot_token: SecretString,
    pub chat_id: String,
    pub base_url: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub delay_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub gemini_model: Option<String>,
    pub telegram_chat_id: Option<String>,
    pub log_level: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            gemini: GeminiConfig {
                api_key: String::new().into(),
                model: "gemini-2.5-flash".to_string(),
                base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
                timeout_secs: 30,
            },
            telegram: TelegramConfig {
                bot_token: String::new().into(),
                chat_id: String::new(),
                base_url: "https://api.telegram.org".to_string(),
                timeout_secs: 30,
            },
            retry: RetryConfig { max_attempts: 3, delay_secs: 5 },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("peptalk.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(gemini) = patch.gemini {
            if let Some(api_key) = gemini.api_key {
                self.gemini.api_key = api_key.into();
            }
            if let Some(model) = gemini.model {
                self.gemini.model = model;
            }
            if let Some(base_url) = gemini.base_url {
                self.gemini.base_url = base_url;
            }
            if let Some(timeout_secs) = gemini.timeout_secs {
                self.gemini.timeout_secs = timeout_secs;
            }
        }

        if let Some(telegram) = patch.telegram {
            if let Some(bot_token) = telegram.bot_token {
                self.telegram.bot_token = bot_token.into();
            }
            if let Some(chat_id) = telegram.chat_id {
                self.telegram.chat_id = chat_id;
            }
            if let Some(base_url) = telegram.base_url {
                self.telegram.base_url = base_url;
            }
            if let Some(timeout_secs) = telegram.timeout_secs {
                self.telegram.timeout_secs = timeout_secs;
            }
        }

        if let Some(retry) = patch.retry {
            if let Some(max_attempts) = retry.max_attempts {
                self.retry.max_attempts = max_attempts;
            }
            if let Some(delay_secs) = retry.delay_secs {
                self.retry.delay_secs = delay_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        // The unprefixed names are the conventional scheduler-facing ones;
        // PEPTALK_* always wins when both are set.
        let api_key = read_env("PEPTALK_GEMINI_API_KEY").or_else(|| read_env("GOOGLE_API_KEY"));
        if let Some(value) = api_key {
            self.gemini.api_key = value.into();
        }
        if let Some(value) = read_env("PEPTALK_GEMINI_MODEL") {
            self.gemini.model = value;
        }
        if let Some(value) = read_env("PEPTALK_GEMINI_BASE_URL") {
            self.gemini.base_url = value;
        }
        if let Some(value) = read_env("PEPTALK_GEMINI_TIMEOUT_SECS") {
            self.gemini.timeout_secs = parse_u64("PEPTALK_GEMINI_TIMEOUT_SECS", &value)?;
        }

        let bot_token =
            read_env("PEPTALK_TELEGRAM_BOT_TOKEN").or_else(|| read_env("TELEGRAM_TOKEN"));
        if let Some(value) = bot_token {
            self.telegram.bot_token = value.into();
        }
        let chat_id =
            read_env("PEPTALK_TELEGRAM_CHAT_ID").or_else(|| read_env("TELEGRAM_CHAT_ID"));
        if let Some(value) = chat_id {
            self.telegram.chat_id = value;
        }
        if let Some(value) = read_env("PEPTALK_TELEGRAM_BASE_URL") {
            self.telegram.base_url = value;
        }
        if let Some(value) = read_env("PEPTALK_TELEGRAM_TIMEOUT_SECS") {
            self.telegram.timeout_secs = parse_u64("PEPTALK_TELEGRAM_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("PEPTALK_RETRY_MAX_ATTEMPTS") {
            self.retry.max_attempts = parse_u32("PEPTALK_RETRY_MAX_ATTEMPTS", &value)?;
        }
        if let Some(value) = read_env("PEPTALK_RETRY_DELAY_SECS") {
            self.retry.delay_secs = parse_u64("PEPTALK_RETRY_DELAY_SECS", &value)?;
        }

        if let Some(value) = read_env("PEPTALK_LOG_LEVEL") {
            self.logging.level = value;
        }
        if let Some(value) = read_env("PEPTALK_LOG_FORMAT") {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(gemini_model) = overrides.gemini_model {
            self.gemini.model = gemini_model;
        }
        if let Some(telegram_chat_id) = overrides.telegram_chat_id {
            self.telegram.chat_id = telegram_chat_id;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_gemini(&self.gemini)?;
        validate_telegram(&self.telegram)?;
        validate_retry(&self.retry)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("peptalk.toml"), PathBuf::from("config/peptalk.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_gemini(gemini: &GeminiConfig) -> Result<(), ConfigError> {
    if gemini.api_key.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "gemini.api_key is required. Set GOOGLE_API_KEY (or PEPTALK_GEMINI_API_KEY); keys are issued at https://aistudio.google.com/apikey".to_string(),
        ));
    }

    if gemini.model.trim().is_empty() {
        return Err(ConfigError::Validation("gemini.model must not be empty".to_string()));
    }

    validate_base_url("gemini.base_url", &gemini.base_url)?;
    validate_timeout("gemini.timeout_secs", gemini.timeout_secs)
}

fn validate_telegram(telegram: &TelegramConfig) -> Result<(), ConfigError> {
    let bot_token = telegram.bot_token.expose_secret();
    if bot_token.trim().is_empty() {
        return Err(ConfigError::Validation(
            "telegram.bot_token is required. Set TELEGRAM_TOKEN (or PEPTALK_TELEGRAM_BOT_TOKEN); tokens come from @BotFather".to_string(),
        ));
    }
    if !looks_like_bot_token(bot_token) {
        return Err(ConfigError::Validation(
            "telegram.bot_token must look like `<numeric id>:<secret>` as issued by @BotFather"
                .to_string(),
        ));
    }

    if telegram.chat_id.trim().is_empty() {
        return Err(ConfigError::Validation(
            "telegram.chat_id is required. Set TELEGRAM_CHAT_ID (or PEPTALK_TELEGRAM_CHAT_ID) to the destination chat".to_string(),
        ));
    }

    validate_base_url("telegram.base_url", &telegram.base_url)?;
    validate_timeout("telegram.timeout_secs", telegram.timeout_secs)
}

fn looks_like_bot_token(token: &str) -> bool {
    token
        .split_once(':')
        .map(|(id, secret)| {
            !id.is_empty() && id.bytes().all(|byte| byte.is_ascii_digit()) && !secret.is_empty()
        })
        .unwrap_or(false)
}

fn validate_retry(retry: &RetryConfig) -> Result<(), ConfigError> {
    if retry.max_attempts == 0 || retry.max_attempts > 10 {
        return Err(ConfigError::Validation(
            "retry.max_attempts must be in range 1..=10".to_string(),
        ));
    }

    if retry.delay_secs > 300 {
        return Err(ConfigError::Validation(
            "retry.delay_secs must be at most 300".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn validate_base_url(field: &str, value: &str) -> Result<(), ConfigError> {
    if value.starts_with("http://") || value.starts_with("https://") {
        Ok(())
    } else {
        Err(ConfigError::Validation(format!("{field} must start with http:// or https://")))
    }
}

fn validate_timeout(field: &str, value: u64) -> Result<(), ConfigError> {
    if value == 0 || value > 300 {
        return Err(ConfigError::Validation(format!("{field} must be in range 1..=300")));
    }
    Ok(())
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    gemini: Option<GeminiPatch>,
    telegram: Option<TelegramPatch>,
    retry: Option<RetryPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct GeminiPatch {
    api_key: Option<String>,
    model: Option<String>,
    base_url: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct TelegramPatch {
    bot_token: Option<String>,
    chat_id: Option<String>,
    base_url: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RetryPatch {
    max_attempts: Option<u32>,
    delay_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    const ALL_VARS: &[&str] = &[
        "PEPTALK_GEMINI_API_KEY",
        "GOOGLE_API_KEY",
        "PEPTALK_GEMINI_MODEL",
        "PEPTALK_GEMINI_BASE_URL",
        "PEPTALK_GEMINI_TIMEOUT_SECS",
        "PEPTALK_TELEGRAM_BOT_TOKEN",
        "TELEGRAM_TOKEN",
        "PEPTALK_TELEGRAM_CHAT_ID",
        "TELEGRAM_CHAT_ID",
        "PEPTALK_TELEGRAM_BASE_URL",
        "PEPTALK_TELEGRAM_TIMEOUT_SECS",
        "PEPTALK_RETRY_MAX_ATTEMPTS",
        "PEPTALK_RETRY_DELAY_SECS",
        "PEPTALK_LOG_LEVEL",
        "PEPTALK_LOG_FORMAT",
    ];

    fn clear_vars() {
        for var in ALL_VARS {
            env::remove_var(var);
        }
    }

    fn set_required_credentials() {
        env::set_var("PEPTALK_GEMINI_API_KEY", "test-api-key");
        env::set_var("PEPTALK_TELEGRAM_BOT_TOKEN", "123456:test-bot-secret");
        env::set_var("PEPTALK_TELEGRAM_CHAT_ID", "-1001234567890");
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars();

        env::set_var("TEST_PEPTALK_API_KEY", "key-from-env");
        set_required_credentials();

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("peptalk.toml");
            fs::write(
                &path,
                r#"
[gemini]
api_key = "${TEST_PEPTALK_API_KEY}"
model = "gemini-from-file"
"#,
            )
            .map_err(|err| err.to_string())?;

            env::remove_var("PEPTALK_GEMINI_API_KEY");

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.gemini.api_key.expose_secret() == "key-from-env",
                "api key should be interpolated from environment",
            )?;
            ensure(
                config.gemini.model == "gemini-from-file",
                "model should be read from the config file",
            )?;
            Ok(())
        })();

        env::remove_var("TEST_PEPTALK_API_KEY");
        clear_vars();
        result
    }

    #[test]
    fn unprefixed_scheduler_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars();

        env::set_var("GOOGLE_API_KEY", "alias-api-key");
        env::set_var("TELEGRAM_TOKEN", "987654:alias-bot-secret");
        env::set_var("TELEGRAM_CHAT_ID", "42");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.gemini.api_key.expose_secret() == "alias-api-key",
                "GOOGLE_API_KEY alias should populate the gemini credential",
            )?;
            ensure(
                config.telegram.bot_token.expose_secret() == "987654:alias-bot-secret",
                "TELEGRAM_TOKEN alias should populate the bot credential",
            )?;
            ensure(
                config.telegram.chat_id == "42",
                "TELEGRAM_CHAT_ID alias should populate the chat id",
            )?;
            Ok(())
        })();

        clear_vars();
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars();

        set_required_credentials();
        env::set_var("PEPTALK_GEMINI_MODEL", "gemini-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("peptalk.toml");
            fs::write(
                &path,
                r#"
[gemini]
model = "gemini-from-file"

[retry]
max_attempts = 5

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    gemini_model: Some("gemini-from-override".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.gemini.model == "gemini-from-override",
                "override model should win over env and file",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(config.retry.max_attempts == 5, "file retry attempts should apply")?;
            Ok(())
        })();

        clear_vars();
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars();

        env::set_var("PEPTALK_GEMINI_API_KEY", "test-api-key");
        env::set_var("PEPTALK_TELEGRAM_BOT_TOKEN", "not-a-bot-token");
        env::set_var("PEPTALK_TELEGRAM_CHAT_ID", "42");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("telegram.bot_token")
            );
            ensure(has_message, "validation failure should mention telegram.bot_token")
        })();

        clear_vars();
        result
    }

    #[test]
    fn retry_policy_bounds_are_enforced() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars();

        set_required_credentials();
        env::set_var("PEPTALK_RETRY_MAX_ATTEMPTS", "0");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => return Err("zero retry attempts should not validate".to_string()),
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("retry.max_attempts")
            );
            ensure(has_message, "validation failure should mention retry.max_attempts")
        })();

        clear_vars();
        result
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars();

        env::set_var("PEPTALK_GEMINI_API_KEY", "super-secret-api-key");
        env::set_var("PEPTALK_TELEGRAM_BOT_TOKEN", "123456:super-secret-bot-token");
        env::set_var("PEPTALK_TELEGRAM_CHAT_ID", "42");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(
                !debug.contains("super-secret-api-key"),
                "debug output should not contain the api key",
            )?;
            ensure(
                !debug.contains("super-secret-bot-token"),
                "debug output should not contain the bot token",
            )?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )?;
            Ok(())
        })();

        clear_vars();
        result
    }
}
