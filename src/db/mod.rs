mod error;
pub mod memory;
#[cfg(feature = "database-postgres")]
pub mod postgres;
pub mod repos;
#[cfg(feature = "database-sqlite")]
pub mod sqlite;

#[cfg(test)]
pub mod tests;

use std::sync::Arc;

pub use error::{DbError, DbResult};
pub use repos::*;

use crate::config::DatabaseConfig;

/// Cached repository trait objects, created once at startup.
struct CachedRepos {
    tickets: Arc<dyn TicketStore>,
    session_tickets: Arc<dyn SessionTicketRegistry>,
    users: Arc<dyn UserRepo>,
}

enum PoolStorage {
    Memory,
    #[cfg(feature = "database-sqlite")]
    Sqlite(sqlx::SqlitePool),
    #[cfg(feature = "database-postgres")]
    Postgres(sqlx::PgPool),
}

/// Storage for tickets, session mappings and users.
///
/// Repositories are cached at construction time to avoid allocation on each access.
pub struct DbPool {
    inner: PoolStorage,
    repos: CachedRepos,
}

impl DbPool {
    /// Process-local storage. Nothing survives a restart.
    pub fn in_memory() -> Self {
        DbPool {
            inner: PoolStorage::Memory,
            repos: CachedRepos {
                tickets: Arc::new(memory::MemoryTicketStore::new()),
                session_tickets: Arc::new(memory::MemorySessionTicketRegistry::new()),
                users: Arc::new(memory::MemoryUserRepo::new()),
            },
        }
    }

    /// Create a DbPool from an existing SQLite pool.
    /// Primarily useful for testing.
    #[cfg(feature = "database-sqlite")]
    pub fn from_sqlite(pool: sqlx::SqlitePool) -> Self {
        let repos = CachedRepos {
            tickets: Arc::new(sqlite::SqliteTicketStore::new(pool.clone())),
            session_tickets: Arc::new(sqlite::SqliteSessionTicketRegistry::new(pool.clone())),
            users: Arc::new(sqlite::SqliteUserRepo::new(pool.clone())),
        };
        DbPool {
            inner: PoolStorage::Sqlite(pool),
            repos,
        }
    }

    #[cfg(feature = "database-postgres")]
    pub fn from_postgres(pool: sqlx::PgPool) -> Self {
        let repos = CachedRepos {
            tickets: Arc::new(postgres::PostgresTicketStore::new(pool.clone())),
            session_tickets: Arc::new(postgres::PostgresSessionTicketRegistry::new(pool.clone())),
            users: Arc::new(postgres::PostgresUserRepo::new(pool.clone())),
        };
        DbPool {
            inner: PoolStorage::Postgres(pool),
            repos,
        }
    }

    /// Connect according to `config`, running migrations when the backend
    /// asks for it.
    pub async fn from_config(config: &DatabaseConfig) -> DbResult<Self> {
        match config {
            DatabaseConfig::None => {
                tracing::warn!(
                    "No database configured; tickets and session mappings are kept in memory"
                );
                Ok(Self::in_memory())
            }
            #[cfg(feature = "database-sqlite")]
            DatabaseConfig::Sqlite(cfg) => {
                let pool = sqlx::sqlite::SqlitePoolOptions::new()
                    .max_connections(cfg.max_connections)
                    .connect_with(
                        sqlx::sqlite::SqliteConnectOptions::new()
                            .filename(&cfg.path)
                            .create_if_missing(cfg.create_if_missing)
                            .journal_mode(if cfg.wal_mode {
                                sqlx::sqlite::SqliteJournalMode::Wal
                            } else {
                                sqlx::sqlite::SqliteJournalMode::Delete
                            })
                            .busy_timeout(cfg.busy_timeout()),
                    )
                    .await?;

                let db = Self::from_sqlite(pool);
                if cfg.run_migrations {
                    db.run_migrations().await?;
                }
                Ok(db)
            }
            #[cfg(feature = "database-postgres")]
            DatabaseConfig::Postgres(cfg) => {
                let pool = sqlx::postgres::PgPoolOptions::new()
                    .min_connections(cfg.min_connections)
                    .max_connections(cfg.max_connections)
                    .acquire_timeout(cfg.acquire_timeout())
                    .connect(&cfg.url)
                    .await?;

                let db = Self::from_postgres(pool);
                if cfg.run_migrations {
                    db.run_migrations().await?;
                }
                Ok(db)
            }
        }
    }

    /// Run database migrations using sqlx's migration runner.
    /// This automatically creates and manages a _sqlx_migrations table.
    pub async fn run_migrations(&self) -> DbResult<()> {
        match &self.inner {
            PoolStorage::Memory => Ok(()),
            #[cfg(feature = "database-sqlite")]
            PoolStorage::Sqlite(pool) => {
                tracing::info!("Running SQLite migrations");
                sqlx::migrate!("./migrations_sqlx/sqlite").run(pool).await?;
                tracing::info!("SQLite migrations completed successfully");
                Ok(())
            }
            #[cfg(feature = "database-postgres")]
            PoolStorage::Postgres(pool) => {
                tracing::info!("Running PostgreSQL migrations");
                sqlx::migrate!("./migrations_sqlx/postgres").run(pool).await?;
                tracing::info!("PostgreSQL migrations completed successfully");
                Ok(())
            }
        }
    }

    /// Get the ticket store (TGTs and PGT IOUs)
    pub fn tickets(&self) -> Arc<dyn TicketStore> {
        Arc::clone(&self.repos.tickets)
    }

    /// Get the service ticket to session registry
    pub fn session_tickets(&self) -> Arc<dyn SessionTicketRegistry> {
        Arc::clone(&self.repos.session_tickets)
    }

    /// Get user repository
    pub fn users(&self) -> Arc<dyn UserRepo> {
        Arc::clone(&self.repos.users)
    }

    /// Short backend name for logs and the health endpoint.
    pub fn backend_name(&self) -> &'static str {
        match &self.inner {
            PoolStorage::Memory => "memory",
            #[cfg(feature = "database-sqlite")]
            PoolStorage::Sqlite(_) => "sqlite",
            #[cfg(feature = "database-postgres")]
            PoolStorage::Postgres(_) => "postgres",
        }
    }

    /// Health check for database connectivity
    pub async fn health_check(&self) -> DbResult<()> {
        match &self.inner {
            PoolStorage::Memory => Ok(()),
            #[cfg(feature = "database-sqlite")]
            PoolStorage::Sqlite(pool) => {
                sqlx::query("SELECT 1").execute(pool).await?;
                Ok(())
            }
            #[cfg(feature = "database-postgres")]
            PoolStorage::Postgres(pool) => {
                sqlx::query("SELECT 1").execute(pool).await?;
                Ok(())
            }
        }
    }
}
