use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::message::normalize_reaction;
use crate::moderation::{
    ReviewSettings, DEFAULT_CONFIRMATION_DELAY, DEFAULT_HISTORY_PAGE_SIZE, DEFAULT_TARGET_REACTION,
};

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub slack: SlackConfig,
    pub moderation: ModerationConfig,
    pub announcements: AnnouncementConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct SlackConfig {
    pub app_token: SecretString,
    pub bot_token: SecretString,
    pub user_token: SecretString,
    pub api_base_url: String,
    pub request_timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ModerationConfig {
    pub target_reaction: String,
    pub confirmation_delay_secs: u64,
    pub history_page_size: u32,
    /// `0` disables the periodic history scan.
    pub reconcile_interval_secs: u64,
}

#[derive(Clone, Debug, Default)]
pub struct AnnouncementConfig {
    pub startup_message: Option<String>,
    pub shutdown_message: Option<String>,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub health_check_port: u16,
    pub graceful_shutdown_secs: u64,
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
    pub log_level: Option<String>,
    pub slack_app_token: Option<String>,
    pub slack_bot_token: Option<String>,
    pub slack_user_token: Option<String>,
    pub slack_api_base_url: Option<String>,
    pub target_reaction: Option<String>,
    pub confirmation_delay_secs: Option<u64>,
    pub history_page_size: Option<u32>,
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

pub const CONFIG_FILE_NAME: &str = "checksweep.toml";

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            slack: SlackConfig {
                app_token: String::new().into(),
                bot_token: String::new().into(),
                user_token: String::new().into(),
                api_base_url: "https://slack.com/api".to_string(),
                request_timeout_secs: 10,
            },
            moderation: ModerationConfig {
                target_reaction: DEFAULT_TARGET_REACTION.to_string(),
                confirmation_delay_secs: DEFAULT_CONFIRMATION_DELAY.as_secs(),
                history_page_size: DEFAULT_HISTORY_PAGE_SIZE,
                reconcile_interval_secs: 0,
            },
            announcements: AnnouncementConfig::default(),
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                health_check_port: 8080,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl ModerationConfig {
    pub fn review_settings(&self) -> ReviewSettings {
        ReviewSettings::new(
            &self.target_reaction,
            Duration::from_secs(self.confirmation_delay_secs),
        )
    }

    pub fn reconcile_interval(&self) -> Option<Duration> {
        (self.reconcile_interval_secs > 0)
            .then(|| Duration::from_secs(self.reconcile_interval_secs))
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

fn non_empty(value: String) -> Option<String> {
    (!value.trim().is_empty()).then_some(value)
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
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.moderation.target_reaction = normalize_reaction(&config.moderation.target_reaction);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(slack) = patch.slack {
            if let Some(slack_app_token_value) = slack.app_token {
                self.slack.app_token = secret_value(slack_app_token_value);
            }
            if let Some(slack_bot_token_value) = slack.bot_token {
                self.slack.bot_token = secret_value(slack_bot_token_value);
            }
            if let Some(slack_user_token_value) = slack.user_token {
                self.slack.user_token = secret_value(slack_user_token_value);
            }
            if let Some(api_base_url) = slack.api_base_url {
                self.slack.api_base_url = api_base_url;
            }
            if let Some(request_timeout_secs) = slack.request_timeout_secs {
                self.slack.request_timeout_secs = request_timeout_secs;
            }
        }

        if let Some(moderation) = patch.moderation {
            if let Some(target_reaction) = moderation.target_reaction {
                self.moderation.target_reaction = target_reaction;
            }
            if let Some(confirmation_delay_secs) = moderation.confirmation_delay_secs {
                self.moderation.confirmation_delay_secs = confirmation_delay_secs;
            }
            if let Some(history_page_size) = moderation.history_page_size {
                self.moderation.history_page_size = history_page_size;
            }
            if let Some(reconcile_interval_secs) = moderation.reconcile_interval_secs {
                self.moderation.reconcile_interval_secs = reconcile_interval_secs;
            }
        }

        if let Some(announcements) = patch.announcements {
            if let Some(startup_message) = announcements.startup_message {
                self.announcements.startup_message = non_empty(startup_message);
            }
            if let Some(shutdown_message) = announcements.shutdown_message {
                self.announcements.shutdown_message = non_empty(shutdown_message);
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(health_check_port) = server.health_check_port {
                self.server.health_check_port = health_check_port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
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
        if let Some(value) = read_env("CHECKSWEEP_SLACK_APP_TOKEN") {
            self.slack.app_token = secret_value(value);
        }
        if let Some(value) = read_env("CHECKSWEEP_SLACK_BOT_TOKEN") {
            self.slack.bot_token = secret_value(value);
        }
        if let Some(value) = read_env("CHECKSWEEP_SLACK_USER_TOKEN") {
            self.slack.user_token = secret_value(value);
        }
        if let Some(value) = read_env("CHECKSWEEP_SLACK_API_BASE_URL") {
            self.slack.api_base_url = value;
        }
        if let Some(value) = read_env("CHECKSWEEP_SLACK_REQUEST_TIMEOUT_SECS") {
            self.slack.request_timeout_secs =
                parse_u64("CHECKSWEEP_SLACK_REQUEST_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("CHECKSWEEP_MODERATION_TARGET_REACTION") {
            self.moderation.target_reaction = value;
        }
        if let Some(value) = read_env("CHECKSWEEP_MODERATION_CONFIRMATION_DELAY_SECS") {
            self.moderation.confirmation_delay_secs =
                parse_u64("CHECKSWEEP_MODERATION_CONFIRMATION_DELAY_SECS", &value)?;
        }
        if let Some(value) = read_env("CHECKSWEEP_MODERATION_HISTORY_PAGE_SIZE") {
            self.moderation.history_page_size =
                parse_u32("CHECKSWEEP_MODERATION_HISTORY_PAGE_SIZE", &value)?;
        }
        if let Some(value) = read_env("CHECKSWEEP_MODERATION_RECONCILE_INTERVAL_SECS") {
            self.moderation.reconcile_interval_secs =
                parse_u64("CHECKSWEEP_MODERATION_RECONCILE_INTERVAL_SECS", &value)?;
        }

        if let Some(value) = read_env("CHECKSWEEP_ANNOUNCEMENTS_STARTUP_MESSAGE") {
            self.announcements.startup_message = Some(value);
        }
        if let Some(value) = read_env("CHECKSWEEP_ANNOUNCEMENTS_SHUTDOWN_MESSAGE") {
            self.announcements.shutdown_message = Some(value);
        }

        if let Some(value) = read_env("CHECKSWEEP_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("CHECKSWEEP_SERVER_HEALTH_CHECK_PORT") {
            self.server.health_check_port =
                parse_u16("CHECKSWEEP_SERVER_HEALTH_CHECK_PORT", &value)?;
        }
        if let Some(value) = read_env("CHECKSWEEP_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("CHECKSWEEP_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level =
            read_env("CHECKSWEEP_LOGGING_LEVEL").or_else(|| read_env("CHECKSWEEP_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("CHECKSWEEP_LOGGING_FORMAT").or_else(|| read_env("CHECKSWEEP_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(slack_app_token) = overrides.slack_app_token {
            self.slack.app_token = secret_value(slack_app_token);
        }
        if let Some(slack_bot_token) = overrides.slack_bot_token {
            self.slack.bot_token = secret_value(slack_bot_token);
        }
        if let Some(slack_user_token) = overrides.slack_user_token {
            self.slack.user_token = secret_value(slack_user_token);
        }
        if let Some(api_base_url) = overrides.slack_api_base_url {
            self.slack.api_base_url = api_base_url;
        }
        if let Some(target_reaction) = overrides.target_reaction {
            self.moderation.target_reaction = target_reaction;
        }
        if let Some(confirmation_delay_secs) = overrides.confirmation_delay_secs {
            self.moderation.confirmation_delay_secs = confirmation_delay_secs;
        }
        if let Some(history_page_size) = overrides.history_page_size {
            self.moderation.history_page_size = history_page_size;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_slack(&self.slack)?;
        validate_moderation(&self.moderation)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

/// Config file that `load` would read for the given explicit path, if any.
pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from(CONFIG_FILE_NAME), PathBuf::from("config").join(CONFIG_FILE_NAME)]
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

fn validate_token(
    key: &str,
    token: &SecretString,
    prefix: &str,
    where_to_find: &str,
) -> Result<(), ConfigError> {
    let value = token.expose_secret();
    if value.is_empty() {
        return Err(ConfigError::Validation(format!(
            "{key} is required. Get it from https://api.slack.com/apps > Your App > {where_to_find}"
        )));
    }
    if !value.starts_with(prefix) {
        let hint = match value.split('-').next() {
            Some("xapp") => " (hint: this looks like the app-level token)",
            Some("xoxb") => " (hint: this looks like the bot token)",
            Some("xoxp") => " (hint: this looks like the user token)",
            _ => "",
        };
        return Err(ConfigError::Validation(format!(
            "{key} must start with `{prefix}`{hint}. Get it from https://api.slack.com/apps"
        )));
    }
    Ok(())
}

fn validate_slack(slack: &SlackConfig) -> Result<(), ConfigError> {
    validate_token(
        "slack.app_token",
        &slack.app_token,
        "xapp-",
        "Basic Information > App-Level Tokens",
    )?;
    validate_token(
        "slack.bot_token",
        &slack.bot_token,
        "xoxb-",
        "OAuth & Permissions > Bot User OAuth Token",
    )?;
    validate_token(
        "slack.user_token",
        &slack.user_token,
        "xoxp-",
        "OAuth & Permissions > User OAuth Token",
    )?;

    let base_url = slack.api_base_url.trim();
    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "slack.api_base_url must start with http:// or https://".to_string(),
        ));
    }

    if slack.request_timeout_secs == 0 || slack.request_timeout_secs > 120 {
        return Err(ConfigError::Validation(
            "slack.request_timeout_secs must be in range 1..=120".to_string(),
        ));
    }

    Ok(())
}

fn validate_moderation(moderation: &ModerationConfig) -> Result<(), ConfigError> {
    if normalize_reaction(&moderation.target_reaction).is_empty() {
        return Err(ConfigError::Validation(
            "moderation.target_reaction must name an emoji, e.g. `white_check_mark`".to_string(),
        ));
    }

    if moderation.confirmation_delay_secs == 0 || moderation.confirmation_delay_secs > 300 {
        return Err(ConfigError::Validation(
            "moderation.confirmation_delay_secs must be in range 1..=300".to_string(),
        ));
    }

    if moderation.history_page_size == 0 || moderation.history_page_size > 999 {
        return Err(ConfigError::Validation(
            "moderation.history_page_size must be in range 1..=999".to_string(),
        ));
    }

    if moderation.reconcile_interval_secs != 0 && moderation.reconcile_interval_secs < 30 {
        return Err(ConfigError::Validation(
            "moderation.reconcile_interval_secs must be 0 (disabled) or at least 30".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.health_check_port == 0 {
        return Err(ConfigError::Validation(
            "server.health_check_port must be greater than zero".to_string(),
        ));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
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

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
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
    slack: Option<SlackPatch>,
    moderation: Option<ModerationPatch>,
    announcements: Option<AnnouncementPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct SlackPatch {
    app_token: Option<String>,
    bot_token: Option<String>,
    user_token: Option<String>,
    api_base_url: Option<String>,
    request_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ModerationPatch {
    target_reaction: Option<String>,
    confirmation_delay_secs: Option<u64>,
    history_page_size: Option<u32>,
    reconcile_interval_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct AnnouncementPatch {
    startup_message: Option<String>,
    shutdown_message: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    health_check_port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
