//! Connection handling for project files.
//!
//! Mutex acquisition with poison recovery and per-connection pragma setup.

use crate::{Error, Result};
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// Busy timeout applied to every connection, in milliseconds.
pub const BUSY_TIMEOUT_MS: u32 = 5000;

/// Acquires a mutex, recovering the inner value if it was poisoned.
///
/// A panic inside one critical section must not wedge every later caller;
/// the guarded state is still structurally valid, so the poison is logged
/// and cleared.
pub fn acquire_lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("mutex was poisoned, recovering");
            metrics::counter!("lgstore_mutex_poison_recovery_total").increment(1);
            poisoned.into_inner()
        },
    }
}

/// Configures a connection for concurrent readers.
///
/// - **WAL mode**: readers proceed while a writer is active
/// - **NORMAL synchronous**: no fsync per commit
/// - **`busy_timeout`**: wait instead of failing with `SQLITE_BUSY`
///
/// # Errors
///
/// Returns [`Error::Storage`] if the busy timeout cannot be set.
pub fn configure_connection(conn: &Connection) -> Result<()> {
    // journal_mode returns a row ("wal"); in-memory databases refuse WAL.
    let _ = conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
        row.get::<_, String>(0)
    });
    let _ = conn.pragma_update(None, "synchronous", "NORMAL");
    conn.busy_timeout(Duration::from_millis(u64::from(BUSY_TIMEOUT_MS)))
        .map_err(|e| Error::Storage {
            operation: "configure_connection".to_string(),
            cause: e.to_string(),
        })?;

    Ok(())
}

/// Opens a configured connection, creating parent directories as needed.
///
/// # Errors
///
/// Returns [`Error::Storage`] if the directory or file cannot be created.
pub fn open_connection(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| Error::Storage {
            operation: "create_project_dir".to_string(),
            cause: format!("{}: {e}", parent.display()),
        })?;
    }

    let conn = Connection::open(path).map_err(|e| Error::Storage {
        operation: "open_project_db".to_string(),
        cause: format!("{}: {e}", path.display()),
    })?;
    configure_connection(&conn)?;

    Ok(conn)
}
