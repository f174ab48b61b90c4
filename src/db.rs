use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::Result;

/// Owns the connection pool and the one schema migration ever applied to a
/// fresh database directory. Write-path store operations open their own
/// transactions against the pool directly; reads go straight to the pool.
#[derive(Clone)]
pub struct Db {
    pool: SqlitePool,
}

impl Db {
    /// Opens (creating if necessary) the database directory at `path` and
    /// runs pending migrations. `journal_mode=WAL` lets readers proceed
    /// while a write transaction is open; `foreign_keys=ON` enforces the
    /// cascade deletes the schema relies on for chunk/reference cleanup.
    pub async fn connect(config: &Config) -> Result<Self> {
        std::fs::create_dir_all(&config.database_path)?;
        let db_file = Path::new(&config.database_path).join("nscr.db");

        let options = SqliteConnectOptions::from_str(&format!(
            "sqlite://{}",
            db_file.to_string_lossy()
        ))?
        .create_if_missing(true)
        .foreign_keys(true)
        .synchronous(SqliteSynchronous::Normal)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .min_connections(config.db_min_connections)
            .max_connections(config.db_max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    /// An in-memory database, used by integration tests that don't need
    /// the directory-portability property under test.
    pub async fn connect_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Runs `PRAGMA integrity_check`: `true` iff SQLite reports the single
    /// row `ok`. Anything else -- a list of corruption complaints, or the
    /// query failing outright -- counts as a failed check so callers fall
    /// back to the one-shot recovery path.
    pub async fn integrity_check(&self) -> Result<bool> {
        let row = match sqlx::query("PRAGMA integrity_check")
            .fetch_one(&self.pool)
            .await
        {
            Ok(row) => row,
            Err(_) => return Ok(false),
        };
        let result: String = row.try_get(0)?;
        Ok(result.eq_ignore_ascii_case("ok"))
    }
}
