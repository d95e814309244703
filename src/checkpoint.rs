// 💾 Checkpoint Store - Resume an interrupted batch
// One header row per session plus one row per completed candidate.
// Every save replaces the session's rows inside a single transaction, so a
// crash mid-save leaves the previous checkpoint intact.

use crate::candidate::Candidate;
use crate::outcome::ValidationRecord;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

pub const DEFAULT_CHECKPOINT_INTERVAL: usize = 10;

// ============================================================================
// SESSION IDENTITY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        SessionId(id.into())
    }

    /// One-off session that no later run will resume
    pub fn fresh() -> Self {
        SessionId(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Stable session id: same identifiers in the same order → same session
pub fn session_id_for(candidates: &[Candidate]) -> SessionId {
    let mut hasher = Sha256::new();
    for candidate in candidates {
        hasher.update(candidate.normalized_identifier().as_bytes());
        hasher.update(b"\n");
    }
    SessionId(format!("{:x}", hasher.finalize()))
}

// ============================================================================
// CHECKPOINT
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Checkpoint {
    pub total_count: usize,
    /// origin index → finished record
    pub completed: BTreeMap<usize, ValidationRecord>,
    pub saved_at: DateTime<Utc>,
}

/// A retained checkpoint, as listed by `list_sessions`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub session_id: SessionId,
    pub total_count: usize,
    pub completed: usize,
    pub saved_at: DateTime<Utc>,
}

/// Counts completions and says when the next save is due
#[derive(Debug, Clone)]
pub struct CheckpointGate {
    interval: usize,
    since_last_save: usize,
}

impl CheckpointGate {
    pub fn new(interval: usize) -> Self {
        CheckpointGate {
            interval: interval.max(1),
            since_last_save: 0,
        }
    }

    /// Record one completion; true when a save should happen now
    pub fn record_completion(&mut self) -> bool {
        self.since_last_save += 1;
        if self.since_last_save >= self.interval {
            self.since_last_save = 0;
            true
        } else {
            false
        }
    }
}

// ============================================================================
// STORE
// ============================================================================

pub struct CheckpointStore {
    conn: Mutex<Connection>,
    session: SessionId,
}

impl CheckpointStore {
    /// Open (or create) a checkpoint database on disk
    pub fn open(path: &Path, session: SessionId) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open checkpoint database: {}", path.display()))?;
        Self::with_connection(conn, session)
    }

    pub fn in_memory(session: SessionId) -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory checkpoint")?;
        Self::with_connection(conn, session)
    }

    fn with_connection(conn: Connection, session: SessionId) -> Result<Self> {
        setup_checkpoint_tables(&conn)?;
        Ok(CheckpointStore {
            conn: Mutex::new(conn),
            session,
        })
    }

    pub fn session(&self) -> &SessionId {
        &self.session
    }

    /// Replace this session's checkpoint with `completed`
    pub fn save(
        &self,
        completed: &BTreeMap<usize, ValidationRecord>,
        total_count: usize,
    ) -> Result<()> {
        let saved_at = Utc::now().to_rfc3339();
        let session = self.session.as_str();

        let mut conn = self.lock();
        let tx = conn.transaction()?;

        tx.execute(
            "DELETE FROM checkpoint_rows WHERE session_id = ?1",
            params![session],
        )?;
        tx.execute(
            "INSERT OR REPLACE INTO checkpoint_sessions (session_id, total_count, saved_at)
             VALUES (?1, ?2, ?3)",
            params![session, total_count as i64, saved_at],
        )?;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO checkpoint_rows (session_id, origin_index, total_count, record, saved_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for (index, record) in completed {
                let json = serde_json::to_string(record)?;
                stmt.execute(params![session, *index as i64, total_count as i64, json, saved_at])?;
            }
        }

        tx.commit().context("Failed to commit checkpoint")?;
        Ok(())
    }

    /// Latest checkpoint of this session, if any
    pub fn load(&self) -> Result<Option<Checkpoint>> {
        let conn = self.lock();
        let session = self.session.as_str();

        let header: Option<(i64, String)> = conn
            .query_row(
                "SELECT total_count, saved_at FROM checkpoint_sessions WHERE session_id = ?1",
                params![session],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((total_count, saved_at)) = header else {
            return Ok(None);
        };

        let mut stmt = conn.prepare(
            "SELECT origin_index, record FROM checkpoint_rows
             WHERE session_id = ?1 ORDER BY origin_index",
        )?;
        let rows = stmt.query_map(params![session], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut completed = BTreeMap::new();
        for row in rows {
            let (index, json) = row?;
            let record: ValidationRecord = serde_json::from_str(&json)
                .with_context(|| format!("Corrupt checkpoint record at index {}", index))?;
            completed.insert(index as usize, record);
        }

        Ok(Some(Checkpoint {
            total_count: total_count as usize,
            completed,
            saved_at: parse_timestamp(&saved_at)?,
        }))
    }

    /// Delete this session's checkpoint
    pub fn clear(&self) -> Result<()> {
        let session = self.session.clone();
        self.discard(&session)?;
        Ok(())
    }

    /// Delete any session's checkpoint; false if it did not exist
    pub fn discard(&self, session: &SessionId) -> Result<bool> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM checkpoint_rows WHERE session_id = ?1",
            params![session.as_str()],
        )?;
        let removed = tx.execute(
            "DELETE FROM checkpoint_sessions WHERE session_id = ?1",
            params![session.as_str()],
        )?;
        tx.commit()?;
        Ok(removed > 0)
    }

    /// All retained checkpoints, most recent first
    pub fn list_sessions(&self) -> Result<Vec<SessionInfo>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT s.session_id, s.total_count, s.saved_at,
                    (SELECT COUNT(*) FROM checkpoint_rows r WHERE r.session_id = s.session_id)
             FROM checkpoint_sessions s
             ORDER BY s.saved_at DESC, s.session_id",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
            ))
        })?;

        let mut sessions = Vec::new();
        for row in rows {
            let (session_id, total_count, saved_at, completed) = row?;
            sessions.push(SessionInfo {
                session_id: SessionId(session_id),
                total_count: total_count as usize,
                completed: completed as usize,
                saved_at: parse_timestamp(&saved_at)?,
            });
        }
        Ok(sessions)
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn setup_checkpoint_tables(conn: &Connection) -> Result<()> {
    // In-memory databases answer "memory" instead of "wal"
    let _mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS checkpoint_sessions (
            session_id TEXT PRIMARY KEY,
            total_count INTEGER NOT NULL,
            saved_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS checkpoint_rows (
            session_id TEXT NOT NULL,
            origin_index INTEGER NOT NULL,
            total_count INTEGER NOT NULL,
            record TEXT NOT NULL,
            saved_at TEXT NOT NULL,
            PRIMARY KEY (session_id, origin_index)
        )",
        [],
    )?;

    Ok(())
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    let parsed = DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("Invalid checkpoint timestamp: {}", raw))?;
    Ok(parsed.with_timezone(&Utc))
}

// ============================================================================
// TESTS
// ============================================================================
