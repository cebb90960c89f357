use crate::config::AppConfig;
use crate::db::connection::DbPool;
use crate::db::records::SqliteRecordStore;
use crate::ws::progress::ProgressHub;
use backup_core::BackupManager;
use tokio_util::sync::CancellationToken;

pub struct AppState {
    pub db: DbPool,
    pub config: AppConfig,
    pub progress: ProgressHub,
    /// Cancelled on shutdown so long-lived WebSocket connections close.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(db: DbPool, config: AppConfig) -> Self {
        Self {
            db,
            config,
            progress: ProgressHub::new(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Backup manager over this state's pool, for use on a blocking thread.
    pub fn manager(&self) -> BackupManager<SqliteRecordStore> {
        build_manager(&self.db, &self.config)
    }
}

pub fn build_manager(db: &DbPool, config: &AppConfig) -> BackupManager<SqliteRecordStore> {
    BackupManager::new(SqliteRecordStore::new(db.clone()), config.backup_settings())
}
