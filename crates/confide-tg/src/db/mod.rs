mod comments;
mod confessions;
mod feedback;
mod interactions;
mod users;

use crate::error::err_ctx;
use crate::{DbConfig, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;

pub(crate) use comments::*;
pub(crate) use confessions::*;
pub(crate) use feedback::*;
pub(crate) use interactions::*;
pub(crate) use users::*;

/// Most likely unrecoverable errors from database communication layer
#[derive(Debug, thiserror::Error)]
pub(crate) enum DbError {
    #[error("Failed to connect to the database")]
    Connect { source: sqlx::Error },

    #[error("Failed to migrate the database")]
    Migrate { source: sqlx::migrate::MigrateError },

    #[error("Database query failed")]
    Query {
        #[from]
        source: sqlx::Error,
    },
}

/// Connection handles for a single SQLite database.
///
/// Reads go through a pool sized from the config. Every write goes through
/// a dedicated single-connection pool, so concurrent writers queue on pool
/// acquisition. Racing SQLite's write lock from several connections is not
/// an option: a deferred transaction that reads before writing fails with
/// `SQLITE_BUSY` the moment another connection commits in between, and
/// `busy_timeout` never retries that case.
#[derive(Clone)]
pub(crate) struct Db {
    read: sqlx::SqlitePool,
    write: sqlx::SqlitePool,
}

impl Db {
    pub(crate) fn read(&self) -> &sqlx::SqlitePool {
        &self.read
    }

    pub(crate) fn write(&self) -> &sqlx::SqlitePool {
        &self.write
    }

    /// Starts a transaction on the single write connection.
    pub(crate) async fn begin_write(&self) -> Result<sqlx::Transaction<'static, sqlx::Sqlite>> {
        Ok(self.write.begin().await?)
    }
}

pub(crate) struct Repo {
    pub(crate) users: UsersRepo,
    pub(crate) confessions: ConfessionsRepo,
    pub(crate) comments: CommentsRepo,
    pub(crate) feedback: FeedbackRepo,
    pub(crate) interactions: InteractionsRepo,
}

impl Repo {
    fn new(db: Db) -> Self {
        Self {
            users: UsersRepo::new(db.clone()),
            confessions: ConfessionsRepo::new(db.clone()),
            comments: CommentsRepo::new(db.clone()),
            feedback: FeedbackRepo::new(db.clone()),
            interactions: InteractionsRepo::new(db),
        }
    }
}

pub(crate) async fn init(cfg: DbConfig) -> Result<Repo> {
    let opts = SqliteConnectOptions::from_str(cfg.url.as_str())
        .map_err(err_ctx!(DbError::Connect))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5))
        .foreign_keys(true);

    // Verify that the connection is working early.
    // The connection created here can also be reused by the migrations down the road.
    // The default idle timeout should be enough for that.
    let write = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(opts.clone())
        .await
        .map_err(err_ctx!(DbError::Connect))?;

    let read = SqlitePoolOptions::new()
        .max_connections(cfg.pool_size)
        .connect_with(opts)
        .await
        .map_err(err_ctx!(DbError::Connect))?;

    sqlx::migrate!()
        .run(&write)
        .await
        .map_err(err_ctx!(DbError::Migrate))?;

    Ok(Repo::new(Db { read, write }))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// A fully migrated repository on a private in-memory database.
    /// A single connection keeps every handle on the same `:memory:` instance.
    pub(crate) async fn test_repo() -> Repo {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(
                SqliteConnectOptions::from_str("sqlite::memory:")
                    .unwrap()
                    .foreign_keys(true),
            )
            .await
            .unwrap();

        sqlx::migrate!().run(&pool).await.unwrap();

        Repo::new(Db {
            read: pool.clone(),
            write: pool,
        })
    }

    /// A fully migrated repository on a throwaway database file, configured
    /// the same way as a production one. Unlike [`test_repo`] this exercises
    /// genuinely concurrent connections.
    pub(crate) async fn test_file_repo(path: &std::path::Path, readers: u32) -> Repo {
        let opts = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5))
            .foreign_keys(true);

        let write = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts.clone())
            .await
            .unwrap();

        let read = SqlitePoolOptions::new()
            .max_connections(readers)
            .connect_with(opts)
            .await
            .unwrap();

        sqlx::migrate!().run(&write).await.unwrap();

        Repo::new(Db { read, write })
    }
}
