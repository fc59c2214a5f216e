//! Infrastructure layer for storage access, persistence and process plumbing
//!
//! This module provides the SQLite connection and repositories, the object
//! storage client and scanner, configuration management and logging setup.

pub mod config;
pub mod database_connection;
pub mod image_link_repository;
pub mod logging;
pub mod product_repository;
pub mod session_repository;
pub mod storage;
pub mod storage_scanner;

// Re-export commonly used items
pub use config::{AppConfig, ConfigManager, LinkingConfig, LoggingConfig, StorageConfig};
pub use database_connection::DatabaseConnection;
pub use image_link_repository::SqliteImageLinkRepository;
pub use logging::{get_log_directory, init_logging_with_config};
pub use product_repository::SqliteProductRepository;
pub use session_repository::SqliteSessionRepository;
pub use storage::{HttpObjectStorage, InMemoryStorage, ObjectStorage, StorageEntry, StorageError};
pub use storage_scanner::{ImageFile, ScanOptions, ScanOutcome, StorageScanner};
