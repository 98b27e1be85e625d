pub mod models;

use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

impl DbConfig {
    /// Reads the pool settings; `None` when `DATABASE_URL` is not set.
    pub fn from_env() -> Option<Self> {
        let url = std::env::var("DATABASE_URL").ok()?;
        Some(Self {
            url,
            ..Self::default()
        })
    }
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgresql://localhost/vagali".to_string()),
            max_connections: env_or("DB_POOL_MAX", 10),
            min_connections: env_or("DB_POOL_MIN", 2),
            connect_timeout_secs: env_or("DB_CONNECT_TIMEOUT", 10),
            idle_timeout_secs: env_or("DB_IDLE_TIMEOUT", 300),
        }
    }
}

/// Connection URL with the credentials masked, for logs.
fn redact_url(url: &str) -> String {
    match url.split_once('@') {
        Some((_, host)) => format!("***@{}", host),
        None => url.to_string(),
    }
}

pub async fn init_pool(config: &DbConfig) -> Result<PgPool, sqlx::Error> {
    tracing::info!(url = %redact_url(&config.url), "initializing database connection pool");

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
        .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
        .max_lifetime(Duration::from_secs(1800))
        .test_before_acquire(true)
        .connect(&config.url)
        .await?;

    sqlx::query("SELECT 1").fetch_one(&pool).await?;

    tracing::info!("database connection pool initialized");
    Ok(pool)
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    tracing::info!("running database migrations");

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id UUID PRIMARY KEY,
            email TEXT NOT NULL,
            password_hash TEXT NOT NULL,
            is_professional BOOLEAN NOT NULL DEFAULT false,
            date_joined TIMESTAMPTZ NOT NULL DEFAULT now()
        )
    "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE UNIQUE INDEX IF NOT EXISTS idx_users_email_lower ON users (LOWER(email))")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS profiles (
            user_id UUID PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
            full_name TEXT NOT NULL DEFAULT '',
            cpf TEXT NOT NULL DEFAULT '',
            phone_number TEXT NOT NULL DEFAULT '',
            bio TEXT NOT NULL DEFAULT '',
            address TEXT NOT NULL DEFAULT '',
            cep TEXT NOT NULL DEFAULT '',
            cidade TEXT NOT NULL DEFAULT '',
            estado TEXT NOT NULL DEFAULT '',
            servico_principal TEXT NOT NULL DEFAULT '',
            descricao_servicos TEXT NOT NULL DEFAULT '',
            cnpj TEXT NOT NULL DEFAULT '',
            palavras_chave TEXT NOT NULL DEFAULT ''
        )
    "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS services (
            id UUID PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            description TEXT NOT NULL,
            icon TEXT NOT NULL DEFAULT '🛠️'
        )
    "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS demandas (
            id UUID PRIMARY KEY,
            client_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            professional_id UUID REFERENCES users(id) ON DELETE SET NULL,
            service_id UUID NOT NULL REFERENCES services(id) ON DELETE CASCADE,
            title TEXT NOT NULL,
            description TEXT NOT NULL,
            cep VARCHAR(8) NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending'
                CHECK (status IN ('pending', 'accepted', 'in_progress', 'completed', 'cancelled')),
            created_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )
    "#,
    )
    .execute(pool)
    .await?;

    for ddl in [
        "CREATE INDEX IF NOT EXISTS idx_demandas_client ON demandas(client_id, created_at DESC)",
        "CREATE INDEX IF NOT EXISTS idx_demandas_status ON demandas(status, created_at DESC)",
    ] {
        sqlx::query(ddl).execute(pool).await?;
    }

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS offers (
            id UUID PRIMARY KEY,
            demanda_id UUID NOT NULL REFERENCES demandas(id) ON DELETE CASCADE,
            professional_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            value_cents BIGINT NOT NULL CHECK (value_cents > 0),
            term TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending'
                CHECK (status IN ('pending', 'accepted', 'rejected')),
            created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            UNIQUE (demanda_id, professional_id)
        )
    "#,
    )
    .execute(pool)
    .await?;

    // At most one accepted offer per demanda.
    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_offers_one_accepted \
         ON offers(demanda_id) WHERE status = 'accepted'",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_offers_professional ON offers(professional_id, created_at DESC)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS feedback (
            id UUID PRIMARY KEY,
            demanda_id UUID NOT NULL UNIQUE REFERENCES demandas(id) ON DELETE CASCADE,
            client_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            professional_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            rating SMALLINT NOT NULL CHECK (rating BETWEEN 1 AND 5),
            comment TEXT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )
    "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_feedback_professional ON feedback(professional_id)",
    )
    .execute(pool)
    .await?;

    tracing::info!("database migrations completed");
    Ok(())
}
