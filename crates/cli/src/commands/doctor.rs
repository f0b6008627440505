use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use storefront_core::config::{AppConfig, LoadOptions};
use storefront_db::migrations::MIGRATOR;

use crate::commands::{connect, CommandResult};

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

pub fn run(json_output: bool) -> CommandResult {
    let report = build_report();
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { 7 };

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\
                 \"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult { exit_code, output }
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
            checks.push(credential_check(
                "payments_credentials",
                config.payments.secret_key.as_ref(),
                "STOREFRONT_PAYMENTS_SECRET_KEY",
            ));
            checks.push(credential_check(
                "email_credentials",
                config.email.api_key.as_ref(),
                "STOREFRONT_EMAIL_API_KEY",
            ));
            checks.extend(database_checks(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in [
                "payments_credentials",
                "email_credentials",
                "database_connectivity",
                "database_schema",
            ] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
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

fn credential_check(
    name: &'static str,
    secret: Option<&SecretString>,
    env_key: &str,
) -> DoctorCheck {
    let present = secret.map(|value| !value.expose_secret().trim().is_empty()).unwrap_or(false);
    if present {
        DoctorCheck {
            name,
            status: CheckStatus::Pass,
            details: "credential configured".to_string(),
        }
    } else {
        DoctorCheck {
            name,
            status: CheckStatus::Fail,
            details: format!("credential missing; set {env_key} before starting storefront-server"),
        }
    }
}

fn database_checks(config: &AppConfig) -> Vec<DoctorCheck> {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return vec![DoctorCheck {
                name: "database_connectivity",
                status: CheckStatus::Fail,
                details: format!("failed to initialize async runtime: {error}"),
            }];
        }
    };

    runtime.block_on(async {
        let pool = match connect(config).await {
            Ok(pool) => pool,
            Err((_, message, _)) => {
                return vec![
                    DoctorCheck {
                        name: "database_connectivity",
                        status: CheckStatus::Fail,
                        details: format!("failed to connect to database: {message}"),
                    },
                    DoctorCheck {
                        name: "database_schema",
                        status: CheckStatus::Skipped,
                        details: "skipped because the database is unreachable".to_string(),
                    },
                ];
            }
        };

        let connectivity = DoctorCheck {
            name: "database_connectivity",
            status: CheckStatus::Pass,
            details: format!("connected using `{}`", config.database.url),
        };

        let applied = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM _sqlx_migrations WHERE success = 1",
        )
        .fetch_one(&pool)
        .await;
        pool.close().await;

        vec![connectivity, schema_check(applied.ok(), MIGRATOR.iter().count())]
    })
}

fn schema_check(applied: Option<i64>, known: usize) -> DoctorCheck {
    match applied {
        Some(applied) if applied >= known as i64 => DoctorCheck {
            name: "database_schema",
            status: CheckStatus::Pass,
            details: format!("{applied} of {known} migrations applied"),
        },
        Some(applied) => DoctorCheck {
            name: "database_schema",
            status: CheckStatus::Fail,
            details: format!("{applied} of {known} migrations applied; run `storefront migrate`"),
        },
        None => DoctorCheck {
            name: "database_schema",
            status: CheckStatus::Fail,
            details: "migrations have never run; run `storefront migrate`".to_string(),
        },
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
