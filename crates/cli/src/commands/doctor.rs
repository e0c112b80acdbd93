use aquaclaim_core::config::{AppConfig, LoadOptions};
use aquaclaim_db::connect;
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
            checks.push(check_evidence_store(&config));
            checks.push(check_mail_relay(&config));
            checks.push(check_database_connectivity(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            checks.push(DoctorCheck {
                name: "evidence_store_readiness",
                status: CheckStatus::Skipped,
                details: "skipped because configuration did not load".to_string(),
            });
            checks.push(DoctorCheck {
                name: "mail_relay_readiness",
                status: CheckStatus::Skipped,
                details: "skipped because configuration did not load".to_string(),
            });
            checks.push(DoctorCheck {
                name: "database_connectivity",
                status: CheckStatus::Skipped,
                details: "skipped because configuration did not load".to_string(),
            });
        }
    }

    // Skipped checks (disabled integrations) do not fail the report.
    let no_failures = checks.iter().all(|check| check.status != CheckStatus::Fail);
    let overall_status = if no_failures { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if no_failures {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_evidence_store(config: &AppConfig) -> DoctorCheck {
    if !config.evidence.enabled {
        return DoctorCheck {
            name: "evidence_store_readiness",
            status: CheckStatus::Skipped,
            details: "evidence store is disabled".to_string(),
        };
    }

    let mut missing = Vec::new();
    if config.evidence.app_key.is_none() {
        missing.push("evidence.app_key");
    }
    if config.evidence.app_secret.is_none() {
        missing.push("evidence.app_secret");
    }
    if config.evidence.refresh_token.is_none() {
        missing.push("evidence.refresh_token");
    }

    if missing.is_empty() {
        DoctorCheck {
            name: "evidence_store_readiness",
            status: CheckStatus::Pass,
            details: "evidence store credentials present".to_string(),
        }
    } else {
        DoctorCheck {
            name: "evidence_store_readiness",
            status: CheckStatus::Fail,
            details: format!("enabled but missing: {}", missing.join(", ")),
        }
    }
}

fn check_mail_relay(config: &AppConfig) -> DoctorCheck {
    if !config.mail.enabled {
        return DoctorCheck {
            name: "mail_relay_readiness",
            status: CheckStatus::Skipped,
            details: "mail relay is disabled".to_string(),
        };
    }

    let mut missing = Vec::new();
    if config.mail.relay_url.is_none() {
        missing.push("mail.relay_url");
    }
    if config.mail.claims_team_address.is_none() {
        missing.push("mail.claims_team_address");
    }

    if missing.is_empty() {
        DoctorCheck {
            name: "mail_relay_readiness",
            status: CheckStatus::Pass,
            details: "mail relay endpoint and recipient present".to_string(),
        }
    } else {
        DoctorCheck {
            name: "mail_relay_readiness",
            status: CheckStatus::Fail,
            details: format!("enabled but missing: {}", missing.join(", ")),
        }
    }
}

fn check_database_connectivity(config: &AppConfig) -> DoctorCheck {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return DoctorCheck {
                name: "database_connectivity",
                status: CheckStatus::Fail,
                details: format!("failed to initialize async runtime: {error}"),
            };
        }
    };

    let result = runtime.block_on(async {
        let pool = connect(&config.database)
            .await
            .map_err(|error| format!("failed to connect to database: {error}"))?;

        pool.close().await;
        Ok::<(), String>(())
    });

    match result {
        Ok(()) => DoctorCheck {
            name: "database_connectivity",
            status: CheckStatus::Pass,
            details: format!("connected using `{}`", config.database.url),
        },
        Err(error) => {
            DoctorCheck { name: "database_connectivity", status: CheckStatus::Fail, details: error }
        }
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
