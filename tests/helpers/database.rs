use std::path::Path;

use sqlx::SqlitePool;
use texpro_reports::adapters::sqlite::{create_migrated_test_pool, database_url, initialize_database, PoolConfig};

/// Create an in-memory SQLite database for testing
///
/// Each call creates a completely isolated database with migrations applied.
pub async fn setup_test_db() -> SqlitePool {
    create_migrated_test_pool()
        .await
        .expect("failed to create test database")
}

/// Open (and migrate) a file-backed database, as separate processes would.
pub async fn setup_file_db(path: &Path) -> SqlitePool {
    let url = database_url(path.to_str().expect("utf-8 temp path"));
    initialize_database(
        &url,
        Some(PoolConfig {
            max_connections: 4,
            ..PoolConfig::default()
        }),
    )
    .await
    .expect("failed to open file database")
}

/// Teardown test database
pub async fn teardown_test_db(pool: SqlitePool) {
    pool.close().await;
}
