// src/db/pool.rs
// Async connection pool using deadpool-sqlite
//
// # Async Database Access Patterns
//
// ## Preferred Pattern: pool.run()
// Use `pool.run()` from ingestion/query code — it converts errors into
// `HarvesterError` automatically:
// ```ignore
// let result = pool.run(move |conn| some_function(conn)).await?;
// ```
//
// ## Lower-Level: pool.interact()
// Use `pool.interact()` when you need `anyhow::Result` instead of
// `HarvesterError`, e.g. in migrations or internal helpers:
// ```ignore
// let result = pool.interact(move |conn| some_sync_function(conn, arg)).await?;
// ```
//
// ## Common Pitfalls
//
// 1. **Don't block the async runtime**: always go through `pool.run()` or
//    `pool.interact()` for database access, never open a bare `Connection`.
//
// 2. **Type inference**: give the closure's return type a hint if Rust
//    can't infer it: `Ok::<_, rusqlite::Error>(result)`.
//
// 3. **In-memory testing**: use the shared-cache URI
//    (`file:memdb_xxx?mode=memory&cache=shared`) so multiple pooled
//    connections see the same database state.

use anyhow::{Context, Result};
use deadpool_sqlite::{Config, Hook, Pool, Runtime};
use rusqlite::Connection;
use sqlite_vec::sqlite3_vec_init;
use std::path::{Path, PathBuf};
use std::sync::Once;

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

use crate::error::HarvesterError;

/// Registers the sqlite-vec extension globally (once per process). Must
/// run before any SQLite connection is opened.
static SQLITE_VEC_INIT: Once = Once::new();

#[allow(clippy::missing_transmute_annotations)]
pub(crate) fn ensure_sqlite_vec_registered() {
    SQLITE_VEC_INIT.call_once(|| {
        // SAFETY: sqlite3_vec_init has the signature expected by
        // sqlite3_auto_extension (fn(*mut sqlite3, *mut *const c_char,
        // *const sqlite3_api_routines) -> c_int); the transmute converts
        // the fn-pointer to the Option<extern "C" fn()> shape
        // sqlite3_auto_extension accepts, and the pointer stays valid for
        // the life of the process since it targets a statically-linked
        // symbol.
        unsafe {
            rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute(
                sqlite3_vec_init as *const (),
            )));
        }
        tracing::debug!("sqlite-vec extension registered globally");
    });
}

/// Whether a rusqlite error is SQLITE_BUSY or SQLITE_LOCKED.
///
/// SQLITE_BUSY ("database is locked") happens on file-based databases
/// under write contention; SQLITE_LOCKED ("database table is locked")
/// happens on shared-cache in-memory databases when another connection
/// holds a write lock on the same table.
fn is_rusqlite_contention(err: &rusqlite::Error) -> bool {
    use rusqlite::ffi;
    matches!(
        err,
        rusqlite::Error::SqliteFailure(
            ffi::Error {
                code: ffi::ErrorCode::DatabaseBusy | ffi::ErrorCode::DatabaseLocked,
                ..
            },
            _,
        )
    )
}

/// Whether a `HarvesterError` wraps SQLite contention.
fn is_harvester_contention(err: &HarvesterError) -> bool {
    match err {
        HarvesterError::Db(rusqlite_err) => is_rusqlite_contention(rusqlite_err),
        _ => false,
    }
}

/// Whether an `anyhow::Error` chain contains a SQLite contention error.
fn is_sqlite_contention(err: &anyhow::Error) -> bool {
    if let Some(rusqlite_err) = err.downcast_ref::<rusqlite::Error>() {
        return is_rusqlite_contention(rusqlite_err);
    }
    if let Some(harvester_err) = err.downcast_ref::<HarvesterError>() {
        return is_harvester_contention(harvester_err);
    }
    false
}

/// Retry delays for transient-lock backoff: linear 100/200/300 ms, per
/// §4.8's writer-queue policy.
const RETRY_DELAYS: [std::time::Duration; 3] = [
    std::time::Duration::from_millis(100),
    std::time::Duration::from_millis(200),
    std::time::Duration::from_millis(300),
];

/// Generic retry-with-backoff for async operations that may hit SQLite
/// contention. Calls `op` up to `RETRY_DELAYS.len() + 1` times, sleeping
/// between attempts when `is_retryable` accepts the error.
async fn retry_with_backoff<F, Fut, R, E>(mut op: F, is_retryable: impl Fn(&E) -> bool) -> Result<R, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<R, E>>,
    E: std::fmt::Display,
{
    for (attempt, delay) in RETRY_DELAYS.iter().enumerate() {
        match op().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                if is_retryable(&e) {
                    tracing::warn!(
                        "store contention on attempt {}/{}, retrying in {:?}: {}",
                        attempt + 1,
                        RETRY_DELAYS.len(),
                        delay,
                        e
                    );
                    tokio::time::sleep(*delay).await;
                } else {
                    return Err(e);
                }
            }
        }
    }

    op().await
}

/// Database pool wrapper with sqlite-vec support and per-connection setup.
pub struct DatabasePool {
    pool: Pool,
    path: Option<PathBuf>,
    /// URI for in-memory databases (used to share state in tests).
    memory_uri: Option<String>,
}

enum DbStorage {
    File(PathBuf),
    InMemory { label: &'static str },
}

impl DatabasePool {
    /// Open a pooled database at `path`, creating its parent directory
    /// and running migrations if needed.
    pub async fn open(path: &Path) -> Result<Self> {
        Self::open_internal(DbStorage::File(path.to_path_buf())).await
    }

    /// Open a pooled in-memory database. Uses a shared-cache URI so every
    /// pooled connection sees the same database state — essential for
    /// tests, since each connection would otherwise get its own separate
    /// in-memory database.
    pub async fn open_in_memory() -> Result<Self> {
        Self::open_internal(DbStorage::InMemory { label: "memdb" }).await
    }

    /// Internal constructor shared by both open variants:
    /// 1. Registers sqlite-vec globally (if not already done).
    /// 2. Builds the pool with the appropriate post-create hook.
    /// 3. Backs up the existing file (if any) before migrating.
    /// 4. Runs schema migrations on a dedicated connection.
    async fn open_internal(storage: DbStorage) -> Result<Self> {
        ensure_sqlite_vec_registered();

        let (conn_str, path, memory_uri, hook) = match storage {
            DbStorage::File(p) => {
                ensure_parent_directory(&p)?;
                let s = p.to_string_lossy().to_string();
                let hook = make_file_post_create_hook(p.clone());
                (s, Some(p), None, hook)
            }
            DbStorage::InMemory { label } => {
                let uri = format!("file:{}_{:?}?mode=memory&cache=shared", label, uuid::Uuid::new_v4());
                let hook = make_memory_post_create_hook();
                (uri.clone(), None, Some(uri), hook)
            }
        };

        let cfg = Config::new(&conn_str);
        let pool = cfg
            .builder(Runtime::Tokio1)
            .context("Failed to create pool builder")?
            .max_size(8)
            .post_create(hook)
            .build()
            .context("Failed to build connection pool")?;

        let db_pool = Self { pool, path, memory_uri };

        if let Some(ref db_path) = db_pool.path
            && let Err(e) = Self::backup_before_migration(db_path)
        {
            tracing::warn!("Pre-migration backup failed (continuing anyway): {}", e);
        }

        db_pool.run_migrations().await?;

        Ok(db_pool)
    }

    /// The memory URI, for sharing state across pools in tests.
    pub fn memory_uri(&self) -> Option<&str> {
        self.memory_uri.as_deref()
    }

    /// Run a closure with a connection from the pool. Runs on the
    /// blocking thread pool, so it never blocks the async runtime.
    pub async fn interact<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Connection) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let conn = self.pool.get().await.context("Failed to get connection from pool")?;

        conn.interact(move |conn| f(conn)).await.map_err(|e| anyhow::anyhow!("interact failed: {e}"))?
    }

    /// Run a closure that returns `rusqlite::Result`.
    pub async fn interact_raw<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<R> + Send + 'static,
        R: Send + 'static,
    {
        self.interact(move |conn| f(conn).map_err(Into::into)).await
    }

    /// Run a closure and surface errors as [`HarvesterError`].
    pub async fn run<F, R, E>(&self, f: F) -> Result<R, HarvesterError>
    where
        F: FnOnce(&Connection) -> Result<R, E> + Send + 'static,
        R: Send + 'static,
        E: Into<HarvesterError> + Send + 'static,
    {
        self.pool
            .get()
            .await
            .map_err(|e| HarvesterError::StoreTransient(format!("failed to get connection: {e}")))?
            .interact(move |conn| f(conn).map_err(Into::into))
            .await
            .map_err(|e| HarvesterError::StoreFatal(format!("database interaction panicked: {e}")))?
    }

    /// Like [`run`](Self::run) but retries on transient lock contention
    /// with the §4.8 linear backoff schedule. Use for writes that must
    /// not be silently dropped (message inserts, reaction updates,
    /// ingestion-log rows). The closure must be `Clone` to support retries.
    pub async fn run_with_retry<F, R, E>(&self, f: F) -> Result<R, HarvesterError>
    where
        F: FnOnce(&Connection) -> Result<R, E> + Send + Clone + 'static,
        R: Send + 'static,
        E: Into<HarvesterError> + Send + 'static,
    {
        retry_with_backoff(|| self.run(f.clone()), is_harvester_contention).await
    }

    /// Like [`interact`](Self::interact) but retries on transient lock
    /// contention with the §4.8 linear backoff schedule.
    pub async fn interact_with_retry<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Connection) -> Result<R> + Send + Clone + 'static,
        R: Send + 'static,
    {
        retry_with_backoff(|| self.interact(f.clone()), |e: &anyhow::Error| is_sqlite_contention(e)).await
    }

    /// The database file path (`None` for in-memory).
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Back up the database with `VACUUM INTO` before migrating. Skips
    /// in-memory databases and first-run (no existing file). Keeps at
    /// most one backup (overwrites the previous one).
    fn backup_before_migration(path: &Path) -> Result<()> {
        use std::fs;

        if !path.exists() {
            return Ok(());
        }

        let backup_path = path.with_extension("db.pre-migration");
        let conn = rusqlite::Connection::open(path).context("Failed to open DB for backup")?;

        let _ = fs::remove_file(&backup_path);
        conn.execute("VACUUM INTO ?1", [backup_path.to_string_lossy().as_ref()])
            .context("Failed to create pre-migration backup")?;

        tracing::info!("Created pre-migration backup: {}", backup_path.display());
        Ok(())
    }

    /// Run schema migrations (C8). Called once during pool creation.
    async fn run_migrations(&self) -> Result<()> {
        self.interact(|conn| {
            super::schema::run_all_migrations(conn)?;
            if let Err(e) = conn.execute_batch("PRAGMA optimize") {
                tracing::debug!("PRAGMA optimize skipped: {}", e);
            }
            Ok(())
        })
        .await
    }

    /// Pool status, for diagnostics.
    pub fn status(&self) -> PoolStatus {
        let status = self.pool.status();
        PoolStatus {
            size: status.size,
            available: status.available,
            waiting: status.waiting,
        }
    }
}

/// Pool status for monitoring.
#[derive(Debug, Clone)]
pub struct PoolStatus {
    pub size: usize,
    pub available: usize,
    pub waiting: usize,
}

/// Ensure the parent directory exists with restrictive permissions
/// (0o700 on Unix) before the database file is created inside it.
fn ensure_parent_directory(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
        #[cfg(unix)]
        {
            let mut perms = std::fs::metadata(parent)?.permissions();
            perms.set_mode(0o700);
            std::fs::set_permissions(parent, perms)?;
        }
        #[cfg(not(unix))]
        tracing::debug!("Skipping directory permission restriction on non-Unix platform: {}", parent.display());
    }
    Ok(())
}

/// `post_create` hook for file-based databases: runs [`setup_connection`]
/// and restricts the file to 0o600 once it exists.
fn make_file_post_create_hook(path: PathBuf) -> Hook {
    Hook::async_fn(move |conn, _metrics| {
        let path_for_perms = path.clone();
        Box::pin(async move {
            conn.interact(move |conn| {
                setup_connection(conn)?;

                #[cfg(unix)]
                if let Ok(metadata) = std::fs::metadata(&path_for_perms) {
                    let mut perms = metadata.permissions();
                    perms.set_mode(0o600);
                    if let Err(e) = std::fs::set_permissions(&path_for_perms, perms) {
                        tracing::warn!("Failed to set database file permissions to 0600: {}", e);
                    }
                }
                #[cfg(not(unix))]
                tracing::debug!(
                    "Skipping DB file permission restriction on non-Unix platform: {}",
                    path_for_perms.display()
                );

                Ok::<_, rusqlite::Error>(())
            })
            .await
            .map_err(|e| deadpool_sqlite::HookError::Message(format!("interact failed: {e}").into()))?
            .map_err(|e| deadpool_sqlite::HookError::Message(format!("connection setup failed: {e}").into()))
        })
    })
}

/// `post_create` hook for in-memory databases: foreign keys and busy
/// timeout only (WAL does not apply to `:memory:`/shared-cache URIs).
fn make_memory_post_create_hook() -> Hook {
    Hook::async_fn(|conn, _metrics| {
        Box::pin(async move {
            conn.interact(|conn| {
                conn.execute_batch("PRAGMA foreign_keys=ON; PRAGMA busy_timeout=30000;")?;
                Ok::<_, rusqlite::Error>(())
            })
            .await
            .map_err(|e| deadpool_sqlite::HookError::Message(format!("interact failed: {e}").into()))?
            .map_err(|e| deadpool_sqlite::HookError::Message(format!("connection setup failed: {e}").into()))
        })
    })
}

/// Configure a freshly-opened connection: WAL journaling, foreign key
/// enforcement, a 30 s busy timeout (§4.8), and NORMAL synchronous mode
/// (safe under WAL, avoids an fsync per write).
fn setup_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode=WAL; \
         PRAGMA foreign_keys=ON; \
         PRAGMA busy_timeout=30000; \
         PRAGMA synchronous=NORMAL; \
         PRAGMA journal_size_limit=32768;",
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pool_in_memory() {
        let pool = DatabasePool::open_in_memory().await.expect("Failed to open in-memory pool");

        let result = pool
            .interact(|conn| {
                conn.execute(
                    "INSERT INTO slack_messages (id, workspace, channel, sender, content, timestamp, content_hash) \
                     VALUES ('m1', 'Acme', '#general', 'alice', 'hi', '2026-07-27 12:00:00', 'deadbeef')",
                    [],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await
            .expect("Failed to insert");

        assert!(result > 0);

        let sender: String = pool
            .interact(|conn| {
                conn.query_row("SELECT sender FROM slack_messages WHERE id = 'm1'", [], |row| row.get(0))
                    .map_err(Into::into)
            })
            .await
            .expect("Failed to query");

        assert_eq!(sender, "alice");
    }

    #[tokio::test]
    async fn test_pool_status() {
        let pool = DatabasePool::open_in_memory().await.expect("Failed to open pool");
        let status = pool.status();
        let _ = status;
    }

    #[tokio::test]
    async fn test_concurrent_access() {
        let pool = std::sync::Arc::new(DatabasePool::open_in_memory().await.expect("Failed to open pool"));

        let mut handles = Vec::new();
        for i in 0..10 {
            let pool = pool.clone();
            handles.push(tokio::spawn(async move {
                pool.interact(move |conn| {
                    conn.execute(
                        "INSERT INTO slack_messages (id, workspace, channel, sender, content, timestamp, content_hash) \
                         VALUES (?1, 'Acme', '#general', 'alice', 'hi', '2026-07-27 12:00:00', ?1)",
                        [format!("m{i}")],
                    )?;
                    Ok(())
                })
                .await
            }));
        }

        for handle in handles {
            handle.await.unwrap().expect("Insert failed");
        }

        let count: i64 = pool
            .interact(|conn| {
                conn.query_row("SELECT COUNT(*) FROM slack_messages", [], |row| row.get(0)).map_err(Into::into)
            })
            .await
            .expect("Count failed");

        assert_eq!(count, 10);
    }

    #[tokio::test]
    async fn test_interact_with_retry_succeeds() {
        let pool = DatabasePool::open_in_memory().await.expect("Failed to open pool");

        let result = pool
            .interact_with_retry(|conn| {
                conn.execute(
                    "INSERT INTO slack_messages (id, workspace, channel, sender, content, timestamp, content_hash) \
                     VALUES ('m1', 'Acme', '#general', 'alice', 'hi', '2026-07-27 12:00:00', 'deadbeef')",
                    [],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await
            .expect("interact_with_retry should succeed");

        assert!(result > 0);
    }

    #[tokio::test]
    async fn test_interact_with_retry_non_busy_error_fails_fast() {
        let pool = DatabasePool::open_in_memory().await.expect("Failed to open pool");

        let result = pool
            .interact_with_retry(|conn| {
                conn.execute("INSERT INTO nonexistent_table VALUES (?)", rusqlite::params![1])?;
                Ok(())
            })
            .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_concurrent_writes_with_busy_timeout() {
        let pool = std::sync::Arc::new(DatabasePool::open_in_memory().await.expect("Failed to open pool"));

        let mut handles = Vec::new();
        for i in 0..10 {
            let pool = pool.clone();
            handles.push(tokio::spawn(async move {
                pool.interact_with_retry(move |conn| {
                    conn.execute(
                        "INSERT INTO slack_messages (id, workspace, channel, sender, content, timestamp, content_hash) \
                         VALUES (?1, 'Acme', '#general', 'alice', 'hi', '2026-07-27 12:00:00', ?1)",
                        [format!("m{i}")],
                    )?;
                    Ok(())
                })
                .await
            }));
        }

        for handle in handles {
            handle.await.unwrap().expect("Concurrent write failed");
        }

        let count: i64 = pool
            .interact(|conn| {
                conn.query_row("SELECT COUNT(*) FROM slack_messages", [], |row| row.get(0)).map_err(Into::into)
            })
            .await
            .expect("Count failed");

        assert_eq!(count, 10);
    }

    // ============================================================================
    // Contention detection tests
    // ============================================================================

    #[test]
    fn test_is_rusqlite_contention_busy() {
        let err = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error { code: rusqlite::ffi::ErrorCode::DatabaseBusy, extended_code: 5 },
            Some("database is locked".to_string()),
        );
        assert!(is_rusqlite_contention(&err));
    }

    #[test]
    fn test_is_rusqlite_contention_locked() {
        let err = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error { code: rusqlite::ffi::ErrorCode::DatabaseLocked, extended_code: 6 },
            Some("database table is locked".to_string()),
        );
        assert!(is_rusqlite_contention(&err));
    }

    #[test]
    fn test_is_rusqlite_contention_other_error() {
        let err = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error { code: rusqlite::ffi::ErrorCode::ConstraintViolation, extended_code: 19 },
            Some("UNIQUE constraint failed".to_string()),
        );
        assert!(!is_rusqlite_contention(&err));
    }

    #[test]
    fn test_is_harvester_contention_db_busy() {
        let rusqlite_err = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error { code: rusqlite::ffi::ErrorCode::DatabaseBusy, extended_code: 5 },
            None,
        );
        let harvester_err = HarvesterError::Db(rusqlite_err);
        assert!(is_harvester_contention(&harvester_err));
    }

    #[test]
    fn test_is_harvester_contention_other_variant() {
        assert!(!is_harvester_contention(&HarvesterError::Cancelled));
        assert!(!is_harvester_contention(&HarvesterError::Other("database is locked".to_string())));
    }

    #[test]
    fn test_is_sqlite_contention_anyhow_with_rusqlite() {
        let rusqlite_err = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error { code: rusqlite::ffi::ErrorCode::DatabaseBusy, extended_code: 5 },
            None,
        );
        let anyhow_err: anyhow::Error = rusqlite_err.into();
        assert!(is_sqlite_contention(&anyhow_err));
    }

    #[test]
    fn test_is_sqlite_contention_anyhow_with_harvester_error() {
        let rusqlite_err = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error { code: rusqlite::ffi::ErrorCode::DatabaseLocked, extended_code: 6 },
            None,
        );
        let harvester_err = HarvesterError::Db(rusqlite_err);
        let anyhow_err: anyhow::Error = harvester_err.into();
        assert!(is_sqlite_contention(&anyhow_err));
    }

    #[test]
    fn test_is_sqlite_contention_anyhow_string_not_matched() {
        let anyhow_err = anyhow::anyhow!("database is locked");
        assert!(!is_sqlite_contention(&anyhow_err));
    }

    #[test]
    fn test_backup_before_migration() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let db_path = dir.path().join("test.db");

        {
            let conn = rusqlite::Connection::open(&db_path).expect("Failed to create test DB");
            conn.execute_batch(
                "CREATE TABLE test_table (id INTEGER PRIMARY KEY, value TEXT);
                 INSERT INTO test_table (value) VALUES ('hello');",
            )
            .expect("Failed to populate test DB");
        }

        DatabasePool::backup_before_migration(&db_path).expect("Backup should succeed");

        let backup_path = db_path.with_extension("db.pre-migration");
        assert!(backup_path.exists(), "Backup file should exist");

        {
            let conn = rusqlite::Connection::open(&backup_path).expect("Backup should be a valid SQLite DB");
            let value: String =
                conn.query_row("SELECT value FROM test_table WHERE id = 1", [], |row| row.get(0)).expect("Should be able to read from backup");
            assert_eq!(value, "hello");
        }
    }

    #[test]
    fn test_backup_before_migration_skips_nonexistent_db() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let db_path = dir.path().join("nonexistent.db");

        DatabasePool::backup_before_migration(&db_path).expect("Should succeed for nonexistent DB");

        let backup_path = db_path.with_extension("db.pre-migration");
        assert!(!backup_path.exists(), "No backup should be created for nonexistent DB");
    }
}
