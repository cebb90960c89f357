pub mod backup_service;
