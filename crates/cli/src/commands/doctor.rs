use std::path::Path;

use checksweep_core::config::AppConfig;
use checksweep_core::platform::MessagingClient;
use checksweep_slack::web::{AuthIdentity, SlackWebClient, TokenKind};
use serde::Serialize;

use crate::commands::{load_options, runtime, CommandResult};

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

impl DoctorCheck {
    fn pass(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Pass, details: details.into() }
    }

    fn fail(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Fail, details: details.into() }
    }

    fn skipped(name: &'static str, reason: &str) -> Self {
        Self { name, status: CheckStatus::Skipped, details: format!("skipped because {reason}") }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

const SLACK_CHECKS: [&str; 4] =
    ["slack_bot_token", "slack_user_token", "socket_mode_access", "member_channels"];

pub fn run(config_path: Option<&Path>, json_output: bool) -> CommandResult {
    let report = build_report(config_path);
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { 1 };

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult { exit_code, output }
}

fn build_report(config_path: Option<&Path>) -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(load_options(config_path)) {
        Ok(config) => {
            checks.push(DoctorCheck::pass(
                "config_validation",
                format!(
                    "configuration loaded; watching :{}: with a {}s confirmation delay",
                    config.moderation.target_reaction, config.moderation.confirmation_delay_secs
                ),
            ));
            checks.extend(check_slack_access(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck::fail("config_validation", error.to_string()));
            checks.extend(
                SLACK_CHECKS
                    .iter()
                    .map(|name| DoctorCheck::skipped(name, "configuration did not load")),
            );
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_slack_access(config: &AppConfig) -> Vec<DoctorCheck> {
    let client = match SlackWebClient::new(&config.slack) {
        Ok(client) => client,
        Err(error) => {
            let reason = format!("the slack client could not be built: {error}");
            return SLACK_CHECKS.iter().map(|name| DoctorCheck::skipped(name, &reason)).collect();
        }
    };

    let runtime = match runtime() {
        Ok(runtime) => runtime,
        Err(error) => {
            let reason = format!("the async runtime failed to start: {error}");
            return SLACK_CHECKS.iter().map(|name| DoctorCheck::skipped(name, &reason)).collect();
        }
    };

    runtime.block_on(async {
        vec![
            check_token(&client, TokenKind::Bot, "slack_bot_token").await,
            check_token(&client, TokenKind::User, "slack_user_token").await,
            match client.open_socket_url().await {
                Ok(_) => DoctorCheck::pass("socket_mode_access", "app token can open connections"),
                Err(error) => DoctorCheck::fail("socket_mode_access", error.to_string()),
            },
            match client.list_member_channels().await {
                Ok(channels) => DoctorCheck::pass(
                    "member_channels",
                    format!("bot is a member of {} channel(s)", channels.len()),
                ),
                Err(error) => DoctorCheck::fail("member_channels", error.to_string()),
            },
        ]
    })
}

async fn check_token(client: &SlackWebClient, kind: TokenKind, name: &'static str) -> DoctorCheck {
    match client.auth_test(kind).await {
        Ok(identity) => {
            let AuthIdentity { user_id, user, team, .. } = identity;
            DoctorCheck::pass(name, format!("authenticated as `{user}` ({user_id}) in {team}"))
        }
        Err(error) => DoctorCheck::fail(name, error.to_string()),
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
