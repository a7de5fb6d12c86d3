use async_trait::async_trait;
use sqlx::migrate::Migrator;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgSslMode};
use tracing::{debug, info};

use newswire_core::config::PostgresConfig;
use newswire_core::Submission;

use crate::error::StoreError;
use crate::PostStore;

static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

const UPSERT_POST: &str = r#"
    INSERT INTO reddit_posts (id, title, body, subreddit, score, url, created_at, sentiment)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
    ON CONFLICT (id) DO UPDATE SET
        score = EXCLUDED.score,
        sentiment = EXCLUDED.sentiment
"#;

const SELECT_POST: &str = r#"
    SELECT id, title, body, subreddit, score, url, created_at, sentiment
    FROM reddit_posts
    WHERE id = $1
"#;

#[derive(sqlx::FromRow)]
struct PostRow {
    id: String,
    title: String,
    body: String,
    subreddit: String,
    score: i32,
    url: String,
    created_at: f64,
    sentiment: f64,
}

impl From<PostRow> for Submission {
    fn from(row: PostRow) -> Self {
        let mut post = Submission::new(
            row.id,
            row.title,
            row.body,
            row.subreddit,
            row.score,
            row.url,
            row.created_at,
        );
        post.sentiment = row.sentiment;
        post
    }
}

/// Postgres-backed [`PostStore`] writing to `reddit_posts`.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Translate the config section into connection options.
    pub fn connect_options(config: &PostgresConfig) -> Result<PgConnectOptions, StoreError> {
        let ssl_mode: PgSslMode = config
            .sslmode
            .parse()
            .map_err(|_| StoreError::Config(format!("unknown sslmode '{}'", config.sslmode)))?;

        Ok(PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.user)
            .password(&config.password)
            .database(&config.dbname)
            .ssl_mode(ssl_mode))
    }

    /// Open the pool, ping it and apply migrations. Any failure here is fatal
    /// to the caller.
    pub async fn connect(config: &PostgresConfig) -> Result<Self, StoreError> {
        let options = Self::connect_options(config)?;
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await?;

        sqlx::query("SELECT 1").execute(&pool).await?;
        info!(host = %config.host, port = config.port, dbname = %config.dbname, "PostgreSQL connected");

        MIGRATOR.run(&pool).await?;
        info!("Database migrations applied successfully");

        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl PostStore for PgStore {
    async fn save_post(&self, post: &Submission) -> Result<(), StoreError> {
        sqlx::query(UPSERT_POST)
            .bind(&post.id)
            .bind(&post.title)
            .bind(&post.body)
            .bind(&post.subreddit)
            .bind(post.score)
            .bind(&post.url)
            .bind(post.created_at)
            .bind(post.sentiment)
            .execute(&self.pool)
            .await?;
        debug!(post_id = %post.id, "upserted post");
        Ok(())
    }

    async fn get_post(&self, id: &str) -> Result<Option<Submission>, StoreError> {
        let row: Option<PostRow> = sqlx::query_as(SELECT_POST)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Submission::from))
    }
}
