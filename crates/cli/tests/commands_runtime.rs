use std::env;
use std::sync::{Mutex, OnceLock};

use aquaclaim_cli::commands::{migrate, recompute, seed};
use serde_json::Value;

#[test]
fn migrate_returns_success_with_valid_env() {
    with_env(&[("AQUACLAIM_DATABASE_URL", "sqlite::memory:")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn migrate_returns_config_failure_with_invalid_database_url() {
    with_env(&[("AQUACLAIM_DATABASE_URL", "postgres://nope")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn seed_returns_deterministic_source_summary() {
    with_env(&[("AQUACLAIM_DATABASE_URL", "sqlite::memory:")], || {
        let result = seed::run();
        assert_eq!(result.exit_code, 0, "expected deterministic seed success");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "seed");
        assert_eq!(payload["status"], "ok");

        let message = payload["message"].as_str().unwrap_or("");
        assert!(message.contains("water system CA5500042"));
        assert!(message.contains("  - Well 01: Detections with a full production history"));
        assert!(message.contains("  - Well 02: All non-detect, no flow data"));
    });
}

#[test]
fn seed_is_idempotent_across_runs() {
    with_env(&[("AQUACLAIM_DATABASE_URL", "sqlite::memory:")], || {
        let first = seed::run();
        assert_eq!(first.exit_code, 0, "expected first seed invocation success");
        let first_payload = parse_payload(&first.output);
        assert_eq!(first_payload["command"], "seed");
        assert_eq!(first_payload["status"], "ok");

        let second = seed::run();
        assert_eq!(second.exit_code, 0, "expected second seed invocation success");
        let second_payload = parse_payload(&second.output);
        assert_eq!(second_payload["command"], "seed");
        assert_eq!(second_payload["status"], "ok");

        assert_eq!(first_payload["message"], second_payload["message"]);
    });
}

#[test]
fn recompute_reports_zero_sources_on_an_empty_database() {
    with_env(&[("AQUACLAIM_DATABASE_URL", "sqlite::memory:")], || {
        let result = recompute::run("CA5500042");
        assert_eq!(result.exit_code, 0, "expected recompute success on empty database");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "recompute");
        assert_eq!(payload["status"], "ok");
        assert_eq!(payload["message"], "no sources on record for water system CA5500042");
    });
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "AQUACLAIM_DATABASE_URL",
        "AQUACLAIM_DATABASE_MAX_CONNECTIONS",
        "AQUACLAIM_DATABASE_TIMEOUT_SECS",
        "AQUACLAIM_SERVER_BIND_ADDRESS",
        "AQUACLAIM_SERVER_PORT",
        "AQUACLAIM_SERVER_GRACEFUL_SHUTDOWN_SECS",
        "AQUACLAIM_EVIDENCE_ENABLED",
        "AQUACLAIM_EVIDENCE_APP_KEY",
        "AQUACLAIM_EVIDENCE_APP_SECRET",
        "AQUACLAIM_EVIDENCE_REFRESH_TOKEN",
        "AQUACLAIM_EVIDENCE_ROOT_FOLDER",
        "AQUACLAIM_MAIL_ENABLED",
        "AQUACLAIM_MAIL_RELAY_URL",
        "AQUACLAIM_MAIL_API_KEY",
        "AQUACLAIM_MAIL_FROM_ADDRESS",
        "AQUACLAIM_MAIL_CLAIMS_TEAM_ADDRESS",
        "AQUACLAIM_LOGGING_LEVEL",
        "AQUACLAIM_LOGGING_FORMAT",
        "AQUACLAIM_LOG_LEVEL",
        "AQUACLAIM_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
