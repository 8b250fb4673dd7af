//! Record of commits whose build or benchmark run failed, so a regression
//! driver can skip them instead of rebuilding a known-broken revision.

use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use crate::error::Result;
use crate::logging::{log, obj, v_str, Domain, Level};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuildFailure {
    pub commit: String,
    pub reason: String,
    pub attempts: u32,
    pub last_ts: i64,
}

pub struct BuildLedger {
    conn: Connection,
}

impl BuildLedger {
    pub fn open(path: &str) -> Result<Self> {
        let ledger = Self {
            conn: Connection::open(path)?,
        };
        ledger.init()?;
        Ok(ledger)
    }

    pub fn in_memory() -> Result<Self> {
        let ledger = Self {
            conn: Connection::open_in_memory()?,
        };
        ledger.init()?;
        Ok(ledger)
    }

    fn init(&self) -> Result<()> {
        self.conn.execute_batch(
            "BEGIN;
            CREATE TABLE IF NOT EXISTS build_failures (
                commit_hash TEXT PRIMARY KEY,
                reason TEXT NOT NULL,
                attempts INTEGER NOT NULL,
                last_ts INTEGER NOT NULL
            );
            COMMIT;",
        )?;
        Ok(())
    }

    pub fn record_failure(&mut self, commit: &str, reason: &str, ts: i64) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO build_failures (commit_hash, reason, attempts, last_ts)
             VALUES (?1, ?2, 1, ?3)
             ON CONFLICT(commit_hash) DO UPDATE SET
                reason = excluded.reason,
                attempts = attempts + 1,
                last_ts = excluded.last_ts",
            params![commit, reason, ts],
        )?;
        tx.commit()?;
        log(
            Level::Warn,
            Domain::Cache,
            "build_failure_recorded",
            obj(&[("commit", v_str(commit)), ("reason", v_str(reason))]),
        );
        Ok(())
    }

    pub fn failure(&self, commit: &str) -> Result<Option<BuildFailure>> {
        let row = self
            .conn
            .query_row(
                "SELECT commit_hash, reason, attempts, last_ts FROM build_failures WHERE commit_hash = ?1",
                params![commit],
                |r| {
                    Ok(BuildFailure {
                        commit: r.get(0)?,
                        reason: r.get(1)?,
                        attempts: r.get::<_, i64>(2)? as u32,
                        last_ts: r.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    pub fn is_known_bad(&self, commit: &str) -> Result<bool> {
        Ok(self.failure(commit)?.is_some())
    }

    /// Forget a failure, e.g. after the toolchain was fixed.
    pub fn clear(&mut self, commit: &str) -> Result<()> {
        self.conn.execute(
            "DELETE FROM build_failures WHERE commit_hash = ?1",
            params![commit],
        )?;
        Ok(())
    }
}
