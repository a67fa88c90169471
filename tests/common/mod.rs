//! Shared fixtures for integration tests.

use abathur::adapters::sqlite::create_migrated_test_pool;
use sqlx::SqlitePool;

/// An in-memory `SQLite` pool with every embedded migration applied.
pub async fn test_pool() -> SqlitePool {
    create_migrated_test_pool().await.expect("failed to create migrated test pool")
}
