//! Offline commands running the backup operations without the HTTP server.

use crate::config::AppConfig;
use crate::db::connection::DbPool;
use crate::error::AppError;
use crate::services::backup_service;
use crate::state::build_manager;
use backup_core::{BackupKind, Outcome, ProgressSink};
use serde::Serialize;
use serde_json::json;
use std::fs::File;
use std::path::Path;
use std::process::ExitCode;

fn print_progress(message: &str, percent: u8) {
    eprintln!("[{:>3}%] {}", percent, message);
}

fn emit<T: Serialize>(outcome: &Outcome<T>) -> ExitCode {
    match serde_json::to_string_pretty(outcome) {
        Ok(s) => println!("{}", s),
        Err(e) => eprintln!("Could not serialize outcome: {}", e),
    }
    if outcome.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn failure<T>(message: String) -> Outcome<T> {
    Outcome {
        success: false,
        report: None,
        error: Some(message),
    }
}

pub fn export(db: &DbPool, config: &AppConfig, kind: BackupKind, name: Option<&str>) -> ExitCode {
    let manager = build_manager(db, config);
    let sink: &dyn ProgressSink = &print_progress;
    let result = backup_service::create_backup(&manager, db, kind, name, None, Some(sink));
    emit(&match result {
        Ok(created) => Outcome {
            success: true,
            report: Some(created),
            error: None,
        },
        Err(e) => failure(e.to_string()),
    })
}

pub fn restore(db: &DbPool, config: &AppConfig, file: &Path, confirmed: bool) -> ExitCode {
    if !confirmed {
        eprintln!("Restoring replaces current data; re-run with --yes to proceed.");
        return emit(&failure::<()>("Restore not confirmed".into()));
    }
    let manager = build_manager(db, config);
    let sink: &dyn ProgressSink = &print_progress;
    emit(&Outcome::from(manager.restore_file(file, Some(sink))))
}

pub fn validate(db: &DbPool, config: &AppConfig, file: &Path) -> ExitCode {
    let manager = build_manager(db, config);
    let name = file
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let valid = match File::open(file) {
        Ok(mut f) => manager.validate_backup(&mut f, &name),
        Err(e) => {
            tracing::warn!("Could not open {}: {}", file.display(), e);
            false
        }
    };

    let result = if valid {
        Ok(json!({ "file": name, "valid": true }))
    } else {
        Err(AppError::BadRequest(format!("{} is not a valid backup", name)))
    };
    emit(&match result {
        Ok(v) => Outcome {
            success: true,
            report: Some(v),
            error: None,
        },
        Err(e) => failure(e.to_string()),
    })
}

pub fn info(db: &DbPool, config: &AppConfig) -> ExitCode {
    let manager = build_manager(db, config);
    emit(&Outcome {
        success: true,
        report: Some(json!({
            "system_info": manager.system_info(),
            "connection": manager.test_connection(),
            "media_stats": manager.media_stats(),
        })),
        error: None,
    })
}
