//! Database layer for lessonbook
//!
//! Provides:
//! - SeaORM entity models
//! - Repository pattern for data access
//! - Connection pool management and schema bootstrap

pub mod models;
mod repository;

pub use repository::{
    EntryFilter, EntryPatch, LessonPatch, NewEntry, NewStudent, Repository, StudentPatch,
};

use crate::config::DatabaseConfig;
use crate::errors::{AppError, Result};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection};
use std::time::Duration;
use tracing::info;

/// Idempotent bootstrap DDL, portable across Postgres and SQLite (tests).
const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id UUID PRIMARY KEY,
        username TEXT NOT NULL UNIQUE,
        password_hash TEXT NOT NULL,
        is_active BOOLEAN NOT NULL DEFAULT TRUE,
        is_admin BOOLEAN NOT NULL DEFAULT FALSE,
        created_at TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS students (
        id UUID PRIMARY KEY,
        user_id UUID NOT NULL REFERENCES users(id),
        first_name TEXT NOT NULL,
        last_name TEXT NOT NULL,
        email TEXT,
        phone TEXT,
        notes TEXT,
        total_lessons INTEGER NOT NULL DEFAULT 0,
        remaining_lessons INTEGER NOT NULL DEFAULT 0,
        created_at TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS lessons (
        id UUID PRIMARY KEY,
        user_id UUID NOT NULL REFERENCES users(id),
        student_id UUID NOT NULL REFERENCES students(id),
        date TIMESTAMPTZ NOT NULL,
        duration_minutes INTEGER NOT NULL,
        is_completed BOOLEAN NOT NULL DEFAULT FALSE,
        is_cancelled BOOLEAN NOT NULL DEFAULT FALSE,
        notes TEXT,
        created_at TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS subscriptions (
        id UUID PRIMARY KEY,
        user_id UUID NOT NULL REFERENCES users(id),
        student_id UUID NOT NULL REFERENCES students(id),
        lessons_count INTEGER NOT NULL,
        price BIGINT NOT NULL,
        start_date TIMESTAMPTZ NOT NULL,
        end_date TIMESTAMPTZ NOT NULL,
        notes TEXT,
        created_at TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS expenses (
        id UUID PRIMARY KEY,
        user_id UUID NOT NULL REFERENCES users(id),
        date TIMESTAMPTZ NOT NULL,
        amount BIGINT NOT NULL,
        category TEXT NOT NULL,
        description TEXT,
        created_at TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS incomes (
        id UUID PRIMARY KEY,
        user_id UUID NOT NULL REFERENCES users(id),
        date TIMESTAMPTZ NOT NULL,
        amount BIGINT NOT NULL,
        category TEXT NOT NULL,
        description TEXT,
        created_at TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS rent_settings (
        id UUID PRIMARY KEY,
        user_id UUID NOT NULL UNIQUE REFERENCES users(id),
        amount BIGINT NOT NULL,
        payment_day INTEGER NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_students_user ON students(user_id)",
    "CREATE INDEX IF NOT EXISTS idx_lessons_user ON lessons(user_id)",
    "CREATE INDEX IF NOT EXISTS idx_lessons_student ON lessons(student_id)",
    "CREATE INDEX IF NOT EXISTS idx_subscriptions_student ON subscriptions(student_id)",
    "CREATE INDEX IF NOT EXISTS idx_expenses_user_date ON expenses(user_id, date)",
    "CREATE INDEX IF NOT EXISTS idx_incomes_user_date ON incomes(user_id, date)",
];

/// Database connection pool wrapper
#[derive(Clone)]
pub struct DbPool {
    conn: DatabaseConnection,
}

impl DbPool {
    /// Create a new database pool from configuration
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        info!("Connecting to database...");

        let mut opts = ConnectOptions::new(&config.url);
        opts.max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .sqlx_logging(false);

        let conn = Database::connect(opts)
            .await
            .map_err(|e| AppError::DatabaseConnection {
                message: format!("Failed to connect: {}", e),
            })?;

        let pool = Self { conn };
        pool.setup_schema().await?;

        info!("Database connection established");
        Ok(pool)
    }

    /// Connect to a fresh in-memory SQLite database (test suites).
    /// A unique shared-cache name keeps every pooled connection on the same
    /// database while isolating tests from each other.
    pub async fn new_in_memory() -> Result<Self> {
        let url = format!(
            "sqlite:file:testdb_{}?mode=memory&cache=shared",
            uuid::Uuid::new_v4().simple()
        );
        let conn = Database::connect(&url)
            .await
            .map_err(|e| AppError::DatabaseConnection {
                message: format!("Failed to open in-memory database: {}", e),
            })?;

        let pool = Self { conn };
        pool.setup_schema().await?;
        Ok(pool)
    }

    /// Apply the bootstrap schema
    async fn setup_schema(&self) -> Result<()> {
        for ddl in SCHEMA {
            self.conn.execute_unprepared(ddl).await?;
        }
        Ok(())
    }

    /// Get the underlying connection
    pub fn conn(&self) -> &DatabaseConnection {
        &self.conn
    }

    /// Ping the database to check connectivity
    pub async fn ping(&self) -> Result<()> {
        self.conn
            .execute_unprepared("SELECT 1")
            .await
            .map_err(|e| AppError::DatabaseConnection {
                message: format!("Ping failed: {}", e),
            })?;
        Ok(())
    }
}
