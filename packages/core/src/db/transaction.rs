//! Scoped Transactions
//!
//! Every hierarchy operation that touches more than one statement runs inside
//! a `TreeTransaction`. The guard owns its connection, so a transaction can
//! never outlive the connection that opened it.
//!
//! # Modes
//!
//! - [`TxMode::Read`]: `BEGIN DEFERRED`. Under WAL the first read pins a
//!   snapshot; later statements in the same transaction see the same state.
//! - [`TxMode::Write`]: `BEGIN IMMEDIATE`. Takes SQLite's write lock up front,
//!   waiting at most the connection's busy timeout. Two structural mutations
//!   can therefore never interleave.
//!
//! # Exit Paths
//!
//! `commit()` and `rollback()` consume the guard. If the guard is dropped
//! while still open (an early `?` return, or the owning future being
//! cancelled), the connection is closed with it and SQLite discards the
//! uncommitted transaction. Nothing partial is ever persisted.

use crate::db::error::DatabaseError;
use crate::db::DatabaseService;
use std::ops::Deref;

/// Isolation mode for a [`TreeTransaction`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxMode {
    /// Snapshot reads, no write lock
    Read,
    /// Exclusive writer for the duration of the transaction
    Write,
}

impl TxMode {
    fn begin_statement(self) -> &'static str {
        match self {
            TxMode::Read => "BEGIN DEFERRED",
            TxMode::Write => "BEGIN IMMEDIATE",
        }
    }
}

/// An open transaction on a dedicated connection
pub struct TreeTransaction {
    conn: libsql::Connection,
    mode: TxMode,
    finished: bool,
}

impl TreeTransaction {
    /// Open a connection and begin a transaction in `mode`
    ///
    /// # Errors
    ///
    /// - `DatabaseError::Busy` if a write lock could not be taken within the
    ///   busy timeout
    /// - `DatabaseError::SqlExecutionError` for any other failure
    pub async fn begin(db: &DatabaseService, mode: TxMode) -> Result<Self, DatabaseError> {
        let conn = db.connect_with_timeout().await?;

        conn.execute(mode.begin_statement(), ())
            .await
            .map_err(|e| DatabaseError::from_libsql("Failed to begin transaction", e))?;

        tracing::debug!("Transaction started ({:?})", mode);

        Ok(Self {
            conn,
            mode,
            finished: false,
        })
    }

    /// Begin a snapshot read transaction
    pub async fn begin_read(db: &DatabaseService) -> Result<Self, DatabaseError> {
        Self::begin(db, TxMode::Read).await
    }

    /// Begin an exclusive write transaction
    pub async fn begin_write(db: &DatabaseService) -> Result<Self, DatabaseError> {
        Self::begin(db, TxMode::Write).await
    }

    pub fn mode(&self) -> TxMode {
        self.mode
    }

    /// Commit the transaction
    ///
    /// On commit failure a rollback is attempted before the error is returned.
    pub async fn commit(mut self) -> Result<(), DatabaseError> {
        if let Err(e) = self.conn.execute("COMMIT", ()).await {
            let _rollback = self.conn.execute("ROLLBACK", ()).await;
            self.finished = true;
            return Err(DatabaseError::from_libsql(
                "Failed to commit transaction",
                e,
            ));
        }

        self.finished = true;
        tracing::debug!("Transaction committed ({:?})", self.mode);
        Ok(())
    }

    /// Roll the transaction back
    pub async fn rollback(mut self) -> Result<(), DatabaseError> {
        self.finished = true;
        self.conn
            .execute("ROLLBACK", ())
            .await
            .map_err(|e| DatabaseError::from_libsql("Failed to roll back transaction", e))?;

        tracing::debug!("Transaction rolled back ({:?})", self.mode);
        Ok(())
    }
}

impl Deref for TreeTransaction {
    type Target = libsql::Connection;

    fn deref(&self) -> &Self::Target {
        &self.conn
    }
}

impl Drop for TreeTransaction {
    fn drop(&mut self) {
        if !self.finished {
            tracing::warn!(
                "Transaction ({:?}) dropped without commit; discarding changes",
                self.mode
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn count_units(db: &DatabaseService) -> i64 {
        let conn = db.connect_with_timeout().await.unwrap();
        let mut rows = conn
            .query("SELECT COUNT(*) FROM org_units", ())
            .await
            .unwrap();
        let row = rows.next().await.unwrap().unwrap();
        row.get(0).unwrap()
    }

    #[tokio::test]
    async fn test_commit_persists_changes() {
        let temp_dir = TempDir::new().unwrap();
        let db = DatabaseService::new(temp_dir.path().join("test.db"))
            .await
            .unwrap();

        let tx = TreeTransaction::begin_write(&db).await.unwrap();
        assert_eq!(tx.mode(), TxMode::Write);
        tx.execute(
            "INSERT INTO org_units (id, name, lft, rgt) VALUES ('r', 'Root', 1, 2)",
            (),
        )
        .await
        .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(count_units(&db).await, 1);
    }

    #[tokio::test]
    async fn test_rollback_discards_changes() {
        let temp_dir = TempDir::new().unwrap();
        let db = DatabaseService::new(temp_dir.path().join("test.db"))
            .await
            .unwrap();

        let tx = TreeTransaction::begin_write(&db).await.unwrap();
        tx.execute(
            "INSERT INTO org_units (id, name, lft, rgt) VALUES ('r', 'Root', 1, 2)",
            (),
        )
        .await
        .unwrap();
        tx.rollback().await.unwrap();

        assert_eq!(count_units(&db).await, 0);
    }

    #[tokio::test]
    async fn test_dropped_transaction_is_discarded() {
        let temp_dir = TempDir::new().unwrap();
        let db = DatabaseService::new(temp_dir.path().join("test.db"))
            .await
            .unwrap();

        {
            let tx = TreeTransaction::begin_write(&db).await.unwrap();
            tx.execute(
                "INSERT INTO org_units (id, name, lft, rgt) VALUES ('r', 'Root', 1, 2)",
                (),
            )
            .await
            .unwrap();
        }

        assert_eq!(count_units(&db).await, 0);
    }

    #[tokio::test]
    async fn test_read_snapshot_ignores_concurrent_commit() {
        let temp_dir = TempDir::new().unwrap();
        let db = DatabaseService::new(temp_dir.path().join("test.db"))
            .await
            .unwrap();

        let reader = TreeTransaction::begin_read(&db).await.unwrap();
        assert_eq!(reader.mode(), TxMode::Read);
        // First read pins the snapshot
        let mut rows = reader
            .query("SELECT COUNT(*) FROM org_units", ())
            .await
            .unwrap();
        let before: i64 = rows.next().await.unwrap().unwrap().get(0).unwrap();
        drop(rows);

        let writer = TreeTransaction::begin_write(&db).await.unwrap();
        writer
            .execute(
                "INSERT INTO org_units (id, name, lft, rgt) VALUES ('r', 'Root', 1, 2)",
                (),
            )
            .await
            .unwrap();
        writer.commit().await.unwrap();

        let mut rows = reader
            .query("SELECT COUNT(*) FROM org_units", ())
            .await
            .unwrap();
        let during: i64 = rows.next().await.unwrap().unwrap().get(0).unwrap();
        drop(rows);
        reader.commit().await.unwrap();

        assert_eq!(before, 0);
        assert_eq!(during, 0, "reader must keep its snapshot");
        assert_eq!(count_units(&db).await, 1);
    }
}
