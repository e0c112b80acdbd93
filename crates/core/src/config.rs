use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub evidence: EvidenceConfig,
    pub mail: MailConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

/// Remote document store that holds uploaded lab reports and pump tests.
#[derive(Clone, Debug)]
pub struct EvidenceConfig {
    pub enabled: bool,
    pub app_key: Option<String>,
    pub app_secret: Option<SecretString>,
    pub refresh_token: Option<SecretString>,
    pub root_folder: String,
}

#[derive(Clone, Debug)]
pub struct MailConfig {
    pub enabled: bool,
    pub relay_url: Option<String>,
    pub api_key: Option<SecretString>,
    pub from_address: String,
    pub claims_team_address: Option<String>,
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
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub server_port: Option<u16>,
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
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://aquaclaim.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            evidence: EvidenceConfig {
                enabled: false,
                app_key: None,
                app_secret: None,
                refresh_token: None,
                root_folder: "/uploads".to_string(),
            },
            mail: MailConfig {
                enabled: false,
                relay_url: None,
                api_key: None,
                from_address: "no-reply@aquaclaim.example".to_string(),
                claims_team_address: None,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
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
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("aquaclaim.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(evidence) = patch.evidence {
            if let Some(enabled) = evidence.enabled {
                self.evidence.enabled = enabled;
            }
            if let Some(app_key) = evidence.app_key {
                self.evidence.app_key = Some(app_key);
            }
            if let Some(app_secret) = evidence.app_secret {
                self.evidence.app_secret = Some(secret_value(app_secret));
            }
            if let Some(refresh_token) = evidence.refresh_token {
                self.evidence.refresh_token = Some(secret_value(refresh_token));
            }
            if let Some(root_folder) = evidence.root_folder {
                self.evidence.root_folder = root_folder;
            }
        }

        if let Some(mail) = patch.mail {
            if let Some(enabled) = mail.enabled {
                self.mail.enabled = enabled;
            }
            if let Some(relay_url) = mail.relay_url {
                self.mail.relay_url = Some(relay_url);
            }
            if let Some(api_key) = mail.api_key {
                self.mail.api_key = Some(secret_value(api_key));
            }
            if let Some(from_address) = mail.from_address {
                self.mail.from_address = from_address;
            }
            if let Some(claims_team_address) = mail.claims_team_address {
                self.mail.claims_team_address = Some(claims_team_address);
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
        if let Some(value) = read_env("AQUACLAIM_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("AQUACLAIM_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("AQUACLAIM_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("AQUACLAIM_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("AQUACLAIM_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("AQUACLAIM_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("AQUACLAIM_SERVER_PORT") {
            self.server.port = parse_u16("AQUACLAIM_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("AQUACLAIM_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("AQUACLAIM_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        if let Some(value) = read_env("AQUACLAIM_EVIDENCE_ENABLED") {
            self.evidence.enabled = parse_bool("AQUACLAIM_EVIDENCE_ENABLED", &value)?;
        }
        if let Some(value) = read_env("AQUACLAIM_EVIDENCE_APP_KEY") {
            self.evidence.app_key = Some(value);
        }
        if let Some(value) = read_env("AQUACLAIM_EVIDENCE_APP_SECRET") {
            self.evidence.app_secret = Some(secret_value(value));
        }
        if let Some(value) = read_env("AQUACLAIM_EVIDENCE_REFRESH_TOKEN") {
            self.evidence.refresh_token = Some(secret_value(value));
        }
        if let Some(value) = read_env("AQUACLAIM_EVIDENCE_ROOT_FOLDER") {
            self.evidence.root_folder = value;
        }

        if let Some(value) = read_env("AQUACLAIM_MAIL_ENABLED") {
            self.mail.enabled = parse_bool("AQUACLAIM_MAIL_ENABLED", &value)?;
        }
        if let Some(value) = read_env("AQUACLAIM_MAIL_RELAY_URL") {
            self.mail.relay_url = Some(value);
        }
        if let Some(value) = read_env("AQUACLAIM_MAIL_API_KEY") {
            self.mail.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("AQUACLAIM_MAIL_FROM_ADDRESS") {
            self.mail.from_address = value;
        }
        if let Some(value) = read_env("AQUACLAIM_MAIL_CLAIMS_TEAM_ADDRESS") {
            self.mail.claims_team_address = Some(value);
        }

        let log_level =
            read_env("AQUACLAIM_LOGGING_LEVEL").or_else(|| read_env("AQUACLAIM_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("AQUACLAIM_LOGGING_FORMAT").or_else(|| read_env("AQUACLAIM_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(server_port) = overrides.server_port {
            self.server.port = server_port;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_server(&self.server)?;
        validate_evidence(&self.evidence)?;
        validate_mail(&self.mail)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("aquaclaim.toml"), PathBuf::from("config/aquaclaim.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    toml::from_str::<ConfigPatch>(&raw)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_evidence(evidence: &EvidenceConfig) -> Result<(), ConfigError> {
    if !evidence.enabled {
        return Ok(());
    }

    if evidence.app_key.as_deref().map(str::trim).filter(|key| !key.is_empty()).is_none() {
        return Err(ConfigError::Validation(
            "evidence.enabled is true but evidence.app_key is missing".to_string(),
        ));
    }

    let missing_secret = evidence
        .app_secret
        .as_ref()
        .map(|value| value.expose_secret().trim().is_empty())
        .unwrap_or(true);
    if missing_secret {
        return Err(ConfigError::Validation(
            "evidence.enabled is true but evidence.app_secret is missing".to_string(),
        ));
    }

    let missing_token = evidence
        .refresh_token
        .as_ref()
        .map(|value| value.expose_secret().trim().is_empty())
        .unwrap_or(true);
    if missing_token {
        return Err(ConfigError::Validation(
            "evidence.enabled is true but evidence.refresh_token is missing".to_string(),
        ));
    }

    if !evidence.root_folder.starts_with('/') {
        return Err(ConfigError::Validation(
            "evidence.root_folder must be an absolute folder path".to_string(),
        ));
    }

    Ok(())
}

fn validate_mail(mail: &MailConfig) -> Result<(), ConfigError> {
    if !mail.enabled {
        return Ok(());
    }

    let relay_ok = mail
        .relay_url
        .as_deref()
        .map(|url| url.starts_with("http://") || url.starts_with("https://"))
        .unwrap_or(false);
    if !relay_ok {
        return Err(ConfigError::Validation(
            "mail.enabled is true but mail.relay_url is missing or not an http(s) URL".to_string(),
        ));
    }

    if !mail.from_address.contains('@') {
        return Err(ConfigError::Validation(
            "mail.from_address must be an email address".to_string(),
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

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    server: Option<ServerPatch>,
    evidence: Option<EvidencePatch>,
    mail: Option<MailPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct EvidencePatch {
    enabled: Option<bool>,
    app_key: Option<String>,
    app_secret: Option<String>,
    refresh_token: Option<String>,
    root_folder: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct MailPatch {
    enabled: Option<bool>,
    relay_url: Option<String>,
    api_key: Option<String>,
    from_address: Option<String>,
    claims_team_address: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
