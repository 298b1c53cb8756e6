use crate::error::{AppError, AppResult};
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use tokio_postgres::NoTls;

const MIGRATIONS: &[(&str, &str)] = &[(
    "0001_direct_messages",
    include_str!("../migrations/0001_direct_messages.sql"),
)];

pub async fn init_pool(database_url: &str, max_size: usize) -> AppResult<Pool> {
    let pg_config: tokio_postgres::Config = database_url
        .parse()
        .map_err(|e| AppError::Config(format!("invalid DATABASE_URL: {e}")))?;

    let manager = Manager::from_config(
        pg_config,
        NoTls,
        ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        },
    );
    let pool = Pool::builder(manager)
        .max_size(max_size)
        .build()
        .map_err(|e| AppError::StartServer(format!("db pool: {e}")))?;

    run_migrations(&pool).await?;
    Ok(pool)
}

/// Every migration is idempotent, so they all run on each start.
pub async fn run_migrations(pool: &Pool) -> AppResult<()> {
    let client = pool.get().await?;
    for (name, sql) in MIGRATIONS {
        client.batch_execute(sql).await?;
        tracing::info!(migration = name, "applied migration");
    }
    Ok(())
}
