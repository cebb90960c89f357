//! The explicit allow-list of record groups included in database backups.
//!
//! Groups are enumerated rather than discovered from the schema so that
//! unrelated tables never end up in an artifact. The declaration order is the
//! export order, parents before children, which lets a restore replay the
//! envelope front to back without tripping foreign keys.

use crate::utils::errors::{BackupError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordGroup {
    User,
    Role,
    Company,
    Applicant,
    Employee,
    WorkConditions,
    StatusVacancies,
    StatusResponse,
    Vacancy,
    Complaint,
    Response,
    Favorites,
    ActionType,
    AdminLog,
    Backup,
}

impl RecordGroup {
    pub const ALL: [RecordGroup; 15] = [
        RecordGroup::User,
        RecordGroup::Role,
        RecordGroup::Company,
        RecordGroup::Applicant,
        RecordGroup::Employee,
        RecordGroup::WorkConditions,
        RecordGroup::StatusVacancies,
        RecordGroup::StatusResponse,
        RecordGroup::Vacancy,
        RecordGroup::Complaint,
        RecordGroup::Response,
        RecordGroup::Favorites,
        RecordGroup::ActionType,
        RecordGroup::AdminLog,
        RecordGroup::Backup,
    ];

    /// Key used in the envelope's `data` map.
    pub fn name(&self) -> &'static str {
        match self {
            RecordGroup::User => "home.User",
            RecordGroup::Role => "home.Role",
            RecordGroup::Company => "home.Company",
            RecordGroup::Applicant => "home.Applicant",
            RecordGroup::Employee => "home.Employee",
            RecordGroup::WorkConditions => "home.WorkConditions",
            RecordGroup::StatusVacancies => "home.StatusVacancies",
            RecordGroup::StatusResponse => "home.StatusResponse",
            RecordGroup::Vacancy => "home.Vacancy",
            RecordGroup::Complaint => "home.Complaint",
            RecordGroup::Response => "home.Response",
            RecordGroup::Favorites => "home.Favorites",
            RecordGroup::ActionType => "home.ActionType",
            RecordGroup::AdminLog => "home.AdminLog",
            RecordGroup::Backup => "home.Backup",
        }
    }

    /// Lowercase label stamped on every serialized row.
    pub fn label(&self) -> String {
        self.name().to_ascii_lowercase()
    }

    /// Backing table in the relational store.
    pub fn table(&self) -> &'static str {
        match self {
            RecordGroup::User => "users",
            RecordGroup::Role => "roles",
            RecordGroup::Company => "companies",
            RecordGroup::Applicant => "applicants",
            RecordGroup::Employee => "employees",
            RecordGroup::WorkConditions => "work_conditions",
            RecordGroup::StatusVacancies => "status_vacancies",
            RecordGroup::StatusResponse => "status_responses",
            RecordGroup::Vacancy => "vacancies",
            RecordGroup::Complaint => "complaints",
            RecordGroup::Response => "responses",
            RecordGroup::Favorites => "favorites",
            RecordGroup::ActionType => "action_types",
            RecordGroup::AdminLog => "admin_logs",
            RecordGroup::Backup => "backups",
        }
    }

    /// Resolve an envelope key; matching is case-insensitive.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|g| g.name().eq_ignore_ascii_case(name.trim()))
    }

    /// Parse a comma-separated subset of the allow-list, keeping allow-list order.
    pub fn parse_list(list: &str) -> Result<Vec<RecordGroup>> {
        let mut wanted = Vec::new();
        for raw in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let group = Self::from_name(raw)
                .ok_or_else(|| BackupError::Config(format!("unknown record group '{}'", raw)))?;
            wanted.push(group);
        }
        if wanted.is_empty() {
            return Err(BackupError::Config("record group list is empty".into()));
        }
        Ok(Self::ALL.iter().copied().filter(|g| wanted.contains(g)).collect())
    }
}

impl fmt::Display for RecordGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for RecordGroup {
    type Err = BackupError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_name(s).ok_or_else(|| BackupError::Config(format!("unknown record group '{}'", s)))
    }
}
