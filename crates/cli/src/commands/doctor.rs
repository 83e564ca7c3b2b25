use peptalk_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> String {
    let report = build_report();

    if json_output {
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
    }

    render_human(&report)
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_generator_credential(&config));
            checks.push(check_delivery_target(&config));
            checks.push(check_retry_policy(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["generator_credential", "delivery_target", "retry_policy"] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }

    let overall_status = if checks.iter().any(|check| check.status == CheckStatus::Fail) {
        CheckStatus::Fail
    } else {
        CheckStatus::Pass
    };
    let summary = match overall_status {
        CheckStatus::Pass => "all offline checks passed; ready to send".to_string(),
        _ => "one or more checks failed; see details".to_string(),
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_generator_credential(config: &AppConfig) -> DoctorCheck {
    let key = config.gemini.api_key.expose_secret();
    let (status, details) = if key.trim().len() >= 8 && !key.contains(char::is_whitespace) {
        (CheckStatus::Pass, "api key is present and well-formed".to_string())
    } else {
        (
            CheckStatus::Fail,
            "api key looks malformed (unexpected whitespace or too short)".to_string(),
        )
    };

    DoctorCheck { name: "generator_credential", status, details }
}

fn check_delivery_target(config: &AppConfig) -> DoctorCheck {
    let token_ok = config
        .telegram
        .bot_token
        .expose_secret()
        .split_once(':')
        .map(|(id, secret)| id.bytes().all(|byte| byte.is_ascii_digit()) && !secret.is_empty())
        .unwrap_or(false);
    let chat_ok = !config.telegram.chat_id.trim().is_empty();

    let (status, details) = if token_ok && chat_ok {
        (CheckStatus::Pass, "bot token shape and chat id look valid".to_string())
    } else if !token_ok {
        (CheckStatus::Fail, "bot token does not look like `<numeric id>:<secret>`".to_string())
    } else {
        (CheckStatus::Fail, "chat id is empty".to_string())
    };

    DoctorCheck { name: "delivery_target", status, details }
}

fn check_retry_policy(config: &AppConfig) -> DoctorCheck {
    let attempts = config.retry.max_attempts;
    let delay = config.retry.delay_secs;

    let (status, details) = if (1..=10).contains(&attempts) && delay <= 300 {
        (
            CheckStatus::Pass,
            format!("{attempts} attempts with {delay}s fixed delay between failures"),
        )
    } else {
        (
            CheckStatus::Fail,
            format!("retry policy out of bounds: attempts={attempts}, delay_secs={delay}"),
        )
    };

    DoctorCheck { name: "retry_policy", status, details }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = vec![format!("doctor: {}", report.summary)];
    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "FAIL",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("  [{marker}] {}: {}", check.name, check.details));
    }
    lines.join("\n")
}

fn escape_json(raw: &str) -> String {
    raw.replace('\\', "\\\\").replace('"', "\\\"")
}
