use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid postgres settings: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}
