/// Database layer for KanMind
///
/// # Modules
///
/// - `pool`: PostgreSQL connection pool with a startup health check
/// - `migrations`: embedded schema migrations and their status
///
/// Row types and queries live in the crate-level `models` module.
///
/// # Example
///
/// ```no_run
/// use kanmind_shared::db::pool::{create_pool, DatabaseConfig};
/// use kanmind_shared::db::migrations::run_migrations;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let pool = create_pool(DatabaseConfig::new(std::env::var("DATABASE_URL")?)).await?;
///     run_migrations(&pool).await?;
///     Ok(())
/// }
/// ```

pub mod migrations;
pub mod pool;
