use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use aquaclaim_core::config::{AppConfig, LoadOptions};
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let source = |key_path: &str, env_key: &str| {
        field_source(key_path, Some(env_key), config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];

    lines.push(render_line(
        "database.url",
        &config.database.url,
        source("database.url", "AQUACLAIM_DATABASE_URL"),
    ));
    lines.push(render_line(
        "database.max_connections",
        &config.database.max_connections.to_string(),
        source("database.max_connections", "AQUACLAIM_DATABASE_MAX_CONNECTIONS"),
    ));
    lines.push(render_line(
        "database.timeout_secs",
        &config.database.timeout_secs.to_string(),
        source("database.timeout_secs", "AQUACLAIM_DATABASE_TIMEOUT_SECS"),
    ));

    lines.push(render_line(
        "server.bind_address",
        &config.server.bind_address,
        source("server.bind_address", "AQUACLAIM_SERVER_BIND_ADDRESS"),
    ));
    lines.push(render_line(
        "server.port",
        &config.server.port.to_string(),
        source("server.port", "AQUACLAIM_SERVER_PORT"),
    ));
    lines.push(render_line(
        "server.graceful_shutdown_secs",
        &config.server.graceful_shutdown_secs.to_string(),
        source("server.graceful_shutdown_secs", "AQUACLAIM_SERVER_GRACEFUL_SHUTDOWN_SECS"),
    ));

    lines.push(render_line(
        "evidence.enabled",
        &config.evidence.enabled.to_string(),
        source("evidence.enabled", "AQUACLAIM_EVIDENCE_ENABLED"),
    ));
    lines.push(render_line(
        "evidence.app_key",
        config.evidence.app_key.as_deref().unwrap_or("<unset>"),
        source("evidence.app_key", "AQUACLAIM_EVIDENCE_APP_KEY"),
    ));
    lines.push(render_line(
        "evidence.app_secret",
        redact_secret(config.evidence.app_secret.is_some()),
        source("evidence.app_secret", "AQUACLAIM_EVIDENCE_APP_SECRET"),
    ));
    lines.push(render_line(
        "evidence.refresh_token",
        redact_secret(config.evidence.refresh_token.is_some()),
        source("evidence.refresh_token", "AQUACLAIM_EVIDENCE_REFRESH_TOKEN"),
    ));
    lines.push(render_line(
        "evidence.root_folder",
        &config.evidence.root_folder,
        source("evidence.root_folder", "AQUACLAIM_EVIDENCE_ROOT_FOLDER"),
    ));

    lines.push(render_line(
        "mail.enabled",
        &config.mail.enabled.to_string(),
        source("mail.enabled", "AQUACLAIM_MAIL_ENABLED"),
    ));
    lines.push(render_line(
        "mail.relay_url",
        config.mail.relay_url.as_deref().unwrap_or("<unset>"),
        source("mail.relay_url", "AQUACLAIM_MAIL_RELAY_URL"),
    ));
    lines.push(render_line(
        "mail.api_key",
        redact_secret(config.mail.api_key.is_some()),
        source("mail.api_key", "AQUACLAIM_MAIL_API_KEY"),
    ));
    lines.push(render_line(
        "mail.from_address",
        &config.mail.from_address,
        source("mail.from_address", "AQUACLAIM_MAIL_FROM_ADDRESS"),
    ));
    lines.push(render_line(
        "mail.claims_team_address",
        config.mail.claims_team_address.as_deref().unwrap_or("<unset>"),
        source("mail.claims_team_address", "AQUACLAIM_MAIL_CLAIMS_TEAM_ADDRESS"),
    ));

    lines.push(render_line(
        "logging.level",
        &config.logging.level,
        source("logging.level", "AQUACLAIM_LOGGING_LEVEL"),
    ));
    lines.push(render_line(
        "logging.format",
        &format!("{:?}", config.logging.format),
        source("logging.format", "AQUACLAIM_LOGGING_FORMAT"),
    ));

    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    let root = PathBuf::from("aquaclaim.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/aquaclaim.toml");
    if nested.exists() {
        return Some(nested);
    }

    None
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: Option<&str>,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_key {
        if env::var_os(env_key).is_some() {
            return format!("env ({env_key})");
        }
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

fn redact_secret(present: bool) -> &'static str {
    if present {
        "<redacted>"
    } else {
        "<unset>"
    }
}
