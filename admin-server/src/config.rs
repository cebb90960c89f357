use backup_core::{BackupSettings, RecordGroup};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub data_dir: PathBuf,
    pub db_path: PathBuf,
    pub media_root: PathBuf,
    pub backups_dir: PathBuf,
    pub log_level: String,
    pub admin_token: Option<String>,
    pub backup_groups: Vec<RecordGroup>,
    pub keep_media_rollback: bool,
    pub max_upload_bytes: usize,
    pub cors_origins: Vec<String>,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let _ = dotenvy::dotenv();

        let data_dir = PathBuf::from(std::env::var("DATA_DIR").unwrap_or_else(|_| "./data".into()));
        let backup_groups = match std::env::var("BACKUP_GROUPS") {
            Ok(list) if !list.trim().is_empty() => RecordGroup::parse_list(&list)?,
            _ => RecordGroup::ALL.to_vec(),
        };
        let max_upload_mb: usize = std::env::var("MAX_UPLOAD_MB")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(512);

        Ok(Self {
            port: std::env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3000),
            db_path: path_var("DB_PATH").unwrap_or_else(|| data_dir.join("jobboard.db")),
            media_root: path_var("MEDIA_ROOT").unwrap_or_else(|| data_dir.join("media")),
            backups_dir: path_var("BACKUPS_DIR").unwrap_or_else(|| data_dir.join("backups")),
            data_dir,
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
            admin_token: std::env::var("ADMIN_TOKEN").ok().filter(|t| !t.is_empty()),
            backup_groups,
            keep_media_rollback: std::env::var("KEEP_MEDIA_ROLLBACK")
                .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
            max_upload_bytes: max_upload_mb * 1024 * 1024,
            cors_origins: std::env::var("CORS_ORIGINS")
                .map(|v| {
                    v.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
        })
    }

    /// Address to listen on. Without an admin token the identity header is the
    /// only gate, so the server is kept to loopback.
    pub fn bind_address(&self) -> SocketAddr {
        let host = if self.admin_token.is_some() {
            Ipv4Addr::UNSPECIFIED
        } else {
            Ipv4Addr::LOCALHOST
        };
        SocketAddr::from((host, self.port))
    }

    /// Settings handed to the backup manager.
    pub fn backup_settings(&self) -> BackupSettings {
        BackupSettings::new(&self.backups_dir, &self.media_root)
            .with_groups(self.backup_groups.clone())
            .with_keep_media_rollback(self.keep_media_rollback)
    }

    #[cfg(test)]
    pub fn for_tests(root: &std::path::Path) -> Self {
        Self {
            port: 0,
            data_dir: root.to_path_buf(),
            db_path: root.join("jobboard.db"),
            media_root: root.join("media"),
            backups_dir: root.join("backups"),
            log_level: "debug".into(),
            admin_token: None,
            backup_groups: RecordGroup::ALL.to_vec(),
            keep_media_rollback: false,
            max_upload_bytes: 16 * 1024 * 1024,
            cors_origins: Vec::new(),
        }
    }
}

fn path_var(key: &str) -> Option<PathBuf> {
    std::env::var(key).ok().filter(|v| !v.is_empty()).map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_bind_address_loopback_without_token() {
        let temp = TempDir::new().unwrap();
        let mut config = AppConfig::for_tests(temp.path());
        config.port = 8080;

        let addr = config.bind_address();
        assert!(addr.ip().is_loopback());
        assert_eq!(addr.port(), 8080);
    }

    #[test]
    fn test_bind_address_all_interfaces_with_token() {
        let temp = TempDir::new().unwrap();
        let mut config = AppConfig::for_tests(temp.path());
        config.port = 8080;
        config.admin_token = Some("s3cret".into());

        let addr = config.bind_address();
        assert!(addr.ip().is_unspecified());
        assert_eq!(addr.port(), 8080);
    }

    #[test]
    fn test_backup_settings_carry_directories() {
        let temp = TempDir::new().unwrap();
        let mut config = AppConfig::for_tests(temp.path());
        config.keep_media_rollback = true;

        let settings = config.backup_settings();
        assert_eq!(settings.backups_dir, temp.path().join("backups"));
        assert_eq!(settings.media_root, temp.path().join("media"));
        assert!(settings.keep_media_rollback);
    }
}
