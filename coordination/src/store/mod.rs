//! Session persistence
//!
//! Five tables in a local SQLite file: sessions own passes, passes own
//! notes, results and changes. Rows are only appended, except for the
//! status and completion time of sessions and passes.
//!
//! Timestamps are stored as RFC 3339 text, list columns as JSON text.

pub mod records;

pub use records::{
    PassExport, PassRecord, PassStatus, SessionExport, SessionRecord, SessionStats, SessionStatus,
};

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
};
use sqlx::Row;
use tracing::{debug, info};

use crate::notes::{LiteraryNote, NoteType};
use crate::polish::{Change, DimensionScores, Issue, PolishingResult};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Cannot move {id} from {from} to {to}")]
    InvalidTransition {
        id: String,
        from: String,
        to: String,
    },

    #[error("Invalid stored data: {0}")]
    InvalidData(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Identifier of pass `pass_number` within `session_id`.
pub fn pass_id(session_id: &str, pass_number: u32) -> String {
    format!("{session_id}_pass_{pass_number}")
}

fn result_id(pass_id: &str, section_id: &str) -> String {
    format!("{pass_id}_{section_id}")
}

fn parse_time(raw: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::InvalidData(format!("bad timestamp {raw:?}: {e}")))
}

fn parse_opt_time(raw: Option<String>) -> StoreResult<Option<DateTime<Utc>>> {
    raw.as_deref().map(parse_time).transpose()
}

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS polishing_sessions (
        session_id TEXT PRIMARY KEY,
        document_id TEXT NOT NULL,
        document_title TEXT NOT NULL,
        started_at TEXT NOT NULL,
        completed_at TEXT,
        config_json TEXT NOT NULL,
        total_passes INTEGER NOT NULL DEFAULT 0,
        status TEXT NOT NULL DEFAULT 'running'
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS polishing_passes (
        pass_id TEXT PRIMARY KEY,
        session_id TEXT NOT NULL REFERENCES polishing_sessions(session_id),
        pass_number INTEGER NOT NULL,
        providers TEXT NOT NULL,
        started_at TEXT NOT NULL,
        completed_at TEXT,
        status TEXT NOT NULL DEFAULT 'running'
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS section_notes (
        note_id TEXT PRIMARY KEY,
        pass_id TEXT NOT NULL REFERENCES polishing_passes(pass_id),
        section_id TEXT NOT NULL,
        location TEXT NOT NULL,
        provider TEXT NOT NULL,
        note_type TEXT NOT NULL,
        importance TEXT NOT NULL,
        title TEXT NOT NULL,
        content TEXT NOT NULL,
        examples TEXT NOT NULL,
        implications TEXT NOT NULL,
        created_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS section_results (
        result_id TEXT PRIMARY KEY,
        pass_id TEXT NOT NULL REFERENCES polishing_passes(pass_id),
        section_id TEXT NOT NULL,
        location TEXT NOT NULL,
        original_text TEXT NOT NULL,
        translated_text TEXT NOT NULL,
        polished_text TEXT NOT NULL,
        spirit_score REAL NOT NULL,
        language_score REAL NOT NULL,
        context_score REAL NOT NULL,
        vocabulary_score REAL NOT NULL,
        overall_score REAL NOT NULL,
        consensus INTEGER NOT NULL,
        confidence REAL NOT NULL,
        providers_consulted INTEGER NOT NULL,
        consensus_met INTEGER NOT NULL,
        issues TEXT NOT NULL,
        created_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS polishing_changes (
        change_id INTEGER PRIMARY KEY AUTOINCREMENT,
        pass_id TEXT NOT NULL REFERENCES polishing_passes(pass_id),
        section_id TEXT NOT NULL,
        location TEXT NOT NULL,
        change_type TEXT NOT NULL,
        original TEXT NOT NULL,
        polished TEXT NOT NULL,
        reason TEXT NOT NULL,
        agreement INTEGER NOT NULL,
        confidence REAL NOT NULL,
        created_at TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_notes_pass ON section_notes(pass_id)",
    "CREATE INDEX IF NOT EXISTS idx_notes_section ON section_notes(section_id)",
    "CREATE INDEX IF NOT EXISTS idx_results_pass ON section_results(pass_id)",
    "CREATE INDEX IF NOT EXISTS idx_results_section ON section_results(section_id)",
    "CREATE INDEX IF NOT EXISTS idx_changes_pass ON polishing_changes(pass_id)",
];

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Per-connection settings; every pooled connection gets them on open.
fn connection_options(options: SqliteConnectOptions) -> SqliteConnectOptions {
    options.foreign_keys(true).busy_timeout(BUSY_TIMEOUT)
}

/// SQLite-backed store for polishing sessions.
#[derive(Debug, Clone)]
pub struct PolishingStore {
    pool: SqlitePool,
}

impl PolishingStore {
    /// Open (creating if needed) the database file at `path`.
    pub async fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connection_options(options))
            .await?;
        let store = Self { pool };
        store.init().await?;
        info!(path = %path.display(), "Opened polishing store");
        Ok(store)
    }

    /// Private in-memory database. One connection, so every query sees it.
    pub async fn open_in_memory() -> StoreResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(connection_options(SqliteConnectOptions::from_str(
                "sqlite::memory:",
            )?))
            .await?;
        let store = Self { pool };
        store.init().await?;
        Ok(store)
    }

    async fn init(&self) -> StoreResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    // ---- sessions ----

    pub async fn create_session(
        &self,
        session_id: &str,
        document_id: &str,
        document_title: &str,
        config_json: &str,
    ) -> StoreResult<SessionRecord> {
        let started_at = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO polishing_sessions
                (session_id, document_id, document_title, started_at, config_json, status)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(session_id)
        .bind(document_id)
        .bind(document_title)
        .bind(started_at.to_rfc3339())
        .bind(config_json)
        .bind(SessionStatus::Running.as_str())
        .execute(&self.pool)
        .await?;

        debug!(session_id, "Session created");
        Ok(SessionRecord {
            session_id: session_id.to_string(),
            document_id: document_id.to_string(),
            document_title: document_title.to_string(),
            started_at,
            completed_at: None,
            config_json: config_json.to_string(),
            total_passes: 0,
            status: SessionStatus::Running,
        })
    }

    /// Move a running session to `status`.
    ///
    /// A session that already reached a terminal status cannot change.
    /// Setting the status it already has is a no-op.
    pub async fn update_session_status(
        &self,
        session_id: &str,
        status: SessionStatus,
        total_passes: u32,
    ) -> StoreResult<()> {
        let completed_at = status.is_terminal().then(|| Utc::now().to_rfc3339());
        let updated = sqlx::query(
            r#"
            UPDATE polishing_sessions
            SET status = ?, total_passes = ?, completed_at = ?
            WHERE session_id = ? AND status = 'running'
            "#,
        )
        .bind(status.as_str())
        .bind(total_passes as i64)
        .bind(completed_at)
        .bind(session_id)
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() > 0 {
            debug!(session_id, status = %status, "Session status updated");
            return Ok(());
        }

        let current = self
            .get_session(session_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("session {session_id}")))?;
        if current.status == status {
            return Ok(());
        }
        Err(StoreError::InvalidTransition {
            id: session_id.to_string(),
            from: current.status.to_string(),
            to: status.to_string(),
        })
    }

    pub async fn get_session(&self, session_id: &str) -> StoreResult<Option<SessionRecord>> {
        let row = sqlx::query(
            r#"
            SELECT session_id, document_id, document_title, started_at, completed_at,
                   config_json, total_passes, status
            FROM polishing_sessions
            WHERE session_id = ?
            "#,
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| session_from_row(&row)).transpose()
    }

    // ---- passes ----

    pub async fn create_pass(
        &self,
        session_id: &str,
        pass_number: u32,
        providers: &[String],
    ) -> StoreResult<PassRecord> {
        let id = pass_id(session_id, pass_number);
        let started_at = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO polishing_passes
                (pass_id, session_id, pass_number, providers, started_at, status)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(session_id)
        .bind(pass_number as i64)
        .bind(serde_json::to_string(providers)?)
        .bind(started_at.to_rfc3339())
        .bind(PassStatus::Running.as_str())
        .execute(&self.pool)
        .await?;

        debug!(pass_id = %id, "Pass created");
        Ok(PassRecord {
            pass_id: id,
            session_id: session_id.to_string(),
            pass_number,
            providers: providers.to_vec(),
            started_at,
            completed_at: None,
            status: PassStatus::Running,
        })
    }

    /// Close a running pass with `status`.
    pub async fn complete_pass(&self, pass_id: &str, status: PassStatus) -> StoreResult<()> {
        let updated = sqlx::query(
            r#"
            UPDATE polishing_passes
            SET status = ?, completed_at = ?
            WHERE pass_id = ? AND status = 'running'
            "#,
        )
        .bind(status.as_str())
        .bind(Utc::now().to_rfc3339())
        .bind(pass_id)
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() > 0 {
            return Ok(());
        }

        let current = self
            .get_pass(pass_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("pass {pass_id}")))?;
        if current.status == status {
            return Ok(());
        }
        Err(StoreError::InvalidTransition {
            id: pass_id.to_string(),
            from: current.status.to_string(),
            to: status.to_string(),
        })
    }

    pub async fn get_pass(&self, pass_id: &str) -> StoreResult<Option<PassRecord>> {
        let row = sqlx::query(
            r#"
            SELECT pass_id, session_id, pass_number, providers, started_at, completed_at, status
            FROM polishing_passes
            WHERE pass_id = ?
            "#,
        )
        .bind(pass_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| pass_from_row(&row)).transpose()
    }

    pub async fn passes_for_session(&self, session_id: &str) -> StoreResult<Vec<PassRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT pass_id, session_id, pass_number, providers, started_at, completed_at, status
            FROM polishing_passes
            WHERE session_id = ?
            ORDER BY pass_number
            "#,
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(pass_from_row).collect()
    }

    // ---- notes ----

    pub async fn save_note(&self, pass_id: &str, note: &LiteraryNote) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO section_notes
                (note_id, pass_id, section_id, location, provider, note_type, importance,
                 title, content, examples, implications, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&note.id)
        .bind(pass_id)
        .bind(&note.section_id)
        .bind(&note.location)
        .bind(&note.provider)
        .bind(note.note_type.as_str())
        .bind(note.importance.as_str())
        .bind(&note.title)
        .bind(&note.content)
        .bind(serde_json::to_string(&note.examples)?)
        .bind(&note.implications)
        .bind(note.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Notes about `section_id` across every pass of `session_id`.
    pub async fn notes_for_section(
        &self,
        session_id: &str,
        section_id: &str,
    ) -> StoreResult<Vec<LiteraryNote>> {
        let rows = sqlx::query(
            r#"
            SELECT n.*, p.pass_number
            FROM section_notes n
            JOIN polishing_passes p ON n.pass_id = p.pass_id
            WHERE p.session_id = ? AND n.section_id = ?
            ORDER BY p.pass_number, n.created_at
            "#,
        )
        .bind(session_id)
        .bind(section_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(note_from_row).collect()
    }

    pub async fn notes_for_pass(&self, pass_id: &str) -> StoreResult<Vec<LiteraryNote>> {
        let rows = sqlx::query(
            r#"
            SELECT n.*, p.pass_number
            FROM section_notes n
            JOIN polishing_passes p ON n.pass_id = p.pass_id
            WHERE n.pass_id = ?
            ORDER BY n.section_id, n.created_at
            "#,
        )
        .bind(pass_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(note_from_row).collect()
    }

    // ---- results ----

    /// Store one unit result. Its changes are stored by [`Self::save_changes`].
    pub async fn save_result(&self, pass_id: &str, result: &PolishingResult) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO section_results
                (result_id, pass_id, section_id, location, original_text, translated_text,
                 polished_text, spirit_score, language_score, context_score, vocabulary_score,
                 overall_score, consensus, confidence, providers_consulted, consensus_met,
                 issues, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(result_id(pass_id, &result.section_id))
        .bind(pass_id)
        .bind(&result.section_id)
        .bind(&result.location)
        .bind(&result.original_text)
        .bind(&result.current_text)
        .bind(&result.polished_text)
        .bind(result.scores.spirit)
        .bind(result.scores.language)
        .bind(result.scores.context)
        .bind(result.scores.vocabulary)
        .bind(result.overall_score)
        .bind(result.consensus as i64)
        .bind(result.confidence)
        .bind(result.providers_consulted as i64)
        .bind(result.consensus_met)
        .bind(serde_json::to_string(&result.issues)?)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Results of a pass in insertion order, with their changes attached.
    pub async fn results_for_pass(&self, pass_id: &str) -> StoreResult<Vec<PolishingResult>> {
        let rows = sqlx::query(
            r#"
            SELECT *
            FROM section_results
            WHERE pass_id = ?
            ORDER BY rowid
            "#,
        )
        .bind(pass_id)
        .fetch_all(&self.pool)
        .await?;

        let mut results = rows
            .iter()
            .map(result_from_row)
            .collect::<StoreResult<Vec<_>>>()?;

        let change_rows = sqlx::query(
            r#"
            SELECT section_id, location, original, polished, reason, agreement, confidence
            FROM polishing_changes
            WHERE pass_id = ?
            ORDER BY change_id
            "#,
        )
        .bind(pass_id)
        .fetch_all(&self.pool)
        .await?;

        for row in &change_rows {
            let section_id: String = row.get("section_id");
            let agreement: i64 = row.get("agreement");
            let change = Change {
                location: row.get("location"),
                original: row.get("original"),
                polished: row.get("polished"),
                reason: row.get("reason"),
                agreement: agreement as usize,
                confidence: row.get("confidence"),
            };
            if let Some(result) = results.iter_mut().find(|r| r.section_id == section_id) {
                result.changes.push(change);
            }
        }
        Ok(results)
    }

    // ---- changes ----

    /// Store `changes` for `section_id` atomically.
    pub async fn save_changes(
        &self,
        pass_id: &str,
        section_id: &str,
        changes: &[Change],
    ) -> StoreResult<()> {
        if changes.is_empty() {
            return Ok(());
        }

        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;
        for change in changes {
            sqlx::query(
                r#"
                INSERT INTO polishing_changes
                    (pass_id, section_id, location, change_type, original, polished,
                     reason, agreement, confidence, created_at)
                VALUES (?, ?, ?, 'improvement', ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(pass_id)
            .bind(section_id)
            .bind(&change.location)
            .bind(&change.original)
            .bind(&change.polished)
            .bind(&change.reason)
            .bind(change.agreement as i64)
            .bind(change.confidence)
            .bind(&now)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    // ---- aggregates ----

    pub async fn session_stats(&self, session_id: &str) -> StoreResult<SessionStats> {
        let total_passes: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM polishing_passes WHERE session_id = ?")
                .bind(session_id)
                .fetch_one(&self.pool)
                .await?;

        let total_notes: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM section_notes n
            JOIN polishing_passes p ON n.pass_id = p.pass_id
            WHERE p.session_id = ?
            "#,
        )
        .bind(session_id)
        .fetch_one(&self.pool)
        .await?;

        let total_changes: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM polishing_changes c
            JOIN polishing_passes p ON c.pass_id = p.pass_id
            WHERE p.session_id = ?
            "#,
        )
        .bind(session_id)
        .fetch_one(&self.pool)
        .await?;

        let avg_overall_score: Option<f64> = sqlx::query_scalar(
            r#"
            SELECT AVG(r.overall_score) FROM section_results r
            JOIN polishing_passes p ON r.pass_id = p.pass_id
            WHERE p.session_id = ?
            "#,
        )
        .bind(session_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(SessionStats {
            total_passes: total_passes as u32,
            total_notes: total_notes as usize,
            total_changes: total_changes as usize,
            avg_overall_score: avg_overall_score.unwrap_or(0.0),
        })
    }

    /// Everything recorded for one session, nested by pass.
    pub async fn export_session(&self, session_id: &str) -> StoreResult<SessionExport> {
        let session = self
            .get_session(session_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("session {session_id}")))?;

        let mut passes = Vec::new();
        for pass in self.passes_for_session(session_id).await? {
            let notes = self.notes_for_pass(&pass.pass_id).await?;
            let results = self.results_for_pass(&pass.pass_id).await?;
            passes.push(PassExport {
                pass,
                notes,
                results,
            });
        }
        let stats = self.session_stats(session_id).await?;

        Ok(SessionExport {
            session,
            passes,
            stats,
            exported_at: Utc::now(),
        })
    }
}

fn session_from_row(row: &SqliteRow) -> StoreResult<SessionRecord> {
    let status: String = row.get("status");
    let total_passes: i64 = row.get("total_passes");
    let started_at: String = row.get("started_at");
    Ok(SessionRecord {
        session_id: row.get("session_id"),
        document_id: row.get("document_id"),
        document_title: row.get("document_title"),
        started_at: parse_time(&started_at)?,
        completed_at: parse_opt_time(row.get("completed_at"))?,
        config_json: row.get("config_json"),
        total_passes: total_passes as u32,
        status: status.parse().map_err(StoreError::InvalidData)?,
    })
}

fn pass_from_row(row: &SqliteRow) -> StoreResult<PassRecord> {
    let providers: String = row.get("providers");
    let pass_number: i64 = row.get("pass_number");
    let started_at: String = row.get("started_at");
    let status: String = row.get("status");
    Ok(PassRecord {
        pass_id: row.get("pass_id"),
        session_id: row.get("session_id"),
        pass_number: pass_number as u32,
        providers: serde_json::from_str(&providers)?,
        started_at: parse_time(&started_at)?,
        completed_at: parse_opt_time(row.get("completed_at"))?,
        status: status.parse().map_err(StoreError::InvalidData)?,
    })
}

fn note_from_row(row: &SqliteRow) -> StoreResult<LiteraryNote> {
    let note_type: String = row.get("note_type");
    let importance: String = row.get("importance");
    let examples: String = row.get("examples");
    let created_at: String = row.get("created_at");
    let pass_number: i64 = row.get("pass_number");
    Ok(LiteraryNote {
        id: row.get("note_id"),
        pass_number: pass_number as u32,
        section_id: row.get("section_id"),
        location: row.get("location"),
        provider: row.get("provider"),
        note_type: note_type
            .parse::<NoteType>()
            .map_err(StoreError::InvalidData)?,
        importance: importance.parse().unwrap_or_default(),
        title: row.get("title"),
        content: row.get("content"),
        examples: serde_json::from_str(&examples)?,
        implications: row.get("implications"),
        created_at: parse_time(&created_at)?,
    })
}

fn result_from_row(row: &SqliteRow) -> StoreResult<PolishingResult> {
    let issues: String = row.get("issues");
    let consensus: i64 = row.get("consensus");
    let consulted: i64 = row.get("providers_consulted");
    let issues: Vec<Issue> = serde_json::from_str(&issues)?;
    Ok(PolishingResult {
        section_id: row.get("section_id"),
        location: row.get("location"),
        original_text: row.get("original_text"),
        current_text: row.get("translated_text"),
        polished_text: row.get("polished_text"),
        changes: Vec::new(),
        issues,
        scores: DimensionScores {
            spirit: row.get("spirit_score"),
            language: row.get("language_score"),
            context: row.get("context_score"),
            vocabulary: row.get("vocabulary_score"),
        },
        overall_score: row.get("overall_score"),
        consensus: consensus as usize,
        confidence: row.get("confidence"),
        providers_consulted: consulted as usize,
        consensus_met: row.get("consensus_met"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notes::Importance;

    async fn seeded() -> (PolishingStore, String) {
        let store = PolishingStore::open_in_memory().await.unwrap();
        store
            .create_session("s1", "book-1", "Na Drini ćuprija", "{}")
            .await
            .unwrap();
        let pass = store
            .create_pass("s1", 1, &["openai".to_string(), "deepseek".to_string()])
            .await
            .unwrap();
        (store, pass.pass_id)
    }

    fn note(section: &str, title: &str) -> LiteraryNote {
        LiteraryNote {
            id: uuid::Uuid::new_v4().to_string(),
            pass_number: 1,
            section_id: section.to_string(),
            location: format!("Paragraph {section}"),
            provider: "openai".to_string(),
            note_type: NoteType::Culture,
            importance: Importance::High,
            title: title.to_string(),
            content: "Orthodox custom".to_string(),
            examples: vec!["slava".to_string()],
            implications: "keep the term".to_string(),
            created_at: Utc::now(),
        }
    }

    fn result(section: &str, score: f64, changed: bool) -> PolishingResult {
        let polished = if changed { "Поздрав" } else { "Здраво" };
        let changes = if changed {
            vec![Change {
                location: section.to_string(),
                original: "Здраво".to_string(),
                polished: "Поздрав".to_string(),
                reason: "Multi-provider consensus improvement".to_string(),
                agreement: 2,
                confidence: 2.0 / 3.0,
            }]
        } else {
            vec![]
        };
        PolishingResult {
            section_id: section.to_string(),
            location: section.to_string(),
            original_text: "Привет".to_string(),
            current_text: "Здраво".to_string(),
            polished_text: polished.to_string(),
            changes,
            issues: vec![],
            scores: DimensionScores::uniform(score),
            overall_score: score,
            consensus: 2,
            confidence: 2.0 / 3.0,
            providers_consulted: 3,
            consensus_met: true,
        }
    }

    #[tokio::test]
    async fn test_session_roundtrip() {
        let (store, _) = seeded().await;
        let session = store.get_session("s1").await.unwrap().unwrap();
        assert_eq!(session.document_title, "Na Drini ćuprija");
        assert_eq!(session.status, SessionStatus::Running);
        assert!(session.completed_at.is_none());
        assert!(store.get_session("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_status_is_monotonic() {
        let (store, _) = seeded().await;
        store
            .update_session_status("s1", SessionStatus::Completed, 1)
            .await
            .unwrap();
        let session = store.get_session("s1").await.unwrap().unwrap();
        assert_eq!(session.status, SessionStatus::Completed);
        assert_eq!(session.total_passes, 1);
        assert!(session.completed_at.is_some());

        // Same status again is accepted.
        store
            .update_session_status("s1", SessionStatus::Completed, 1)
            .await
            .unwrap();

        let err = store
            .update_session_status("s1", SessionStatus::Failed, 1)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { .. }));

        let err = store
            .update_session_status("nope", SessionStatus::Failed, 0)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_pass_lifecycle() {
        let (store, pass_id) = seeded().await;
        assert_eq!(pass_id, "s1_pass_1");
        let pass = store.get_pass(&pass_id).await.unwrap().unwrap();
        assert_eq!(pass.providers, vec!["openai", "deepseek"]);
        assert_eq!(pass.status, PassStatus::Running);

        store
            .complete_pass(&pass_id, PassStatus::Completed)
            .await
            .unwrap();
        let pass = store.get_pass(&pass_id).await.unwrap().unwrap();
        assert_eq!(pass.status, PassStatus::Completed);
        assert!(pass.completed_at.is_some());
        assert!(store
            .complete_pass(&pass_id, PassStatus::Failed)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_notes_by_section_and_pass() {
        let (store, pass_id) = seeded().await;
        store.save_note(&pass_id, &note("p1", "Slava")).await.unwrap();
        store.save_note(&pass_id, &note("p2", "Kafana")).await.unwrap();

        let section = store.notes_for_section("s1", "p1").await.unwrap();
        assert_eq!(section.len(), 1);
        assert_eq!(section[0].title, "Slava");
        assert_eq!(section[0].examples, vec!["slava"]);
        assert_eq!(section[0].importance, Importance::High);
        assert_eq!(section[0].pass_number, 1);

        assert_eq!(store.notes_for_pass(&pass_id).await.unwrap().len(), 2);
        assert!(store.notes_for_section("other", "p1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_note_requires_pass() {
        let store = PolishingStore::open_in_memory().await.unwrap();
        let err = store.save_note("ghost_pass_1", &note("p1", "x")).await;
        assert!(matches!(err, Err(StoreError::Database(_))));
    }

    #[tokio::test]
    async fn test_results_with_changes() {
        let (store, pass_id) = seeded().await;
        let changed = result("p1", 0.9, true);
        store.save_result(&pass_id, &changed).await.unwrap();
        store
            .save_changes(&pass_id, "p1", &changed.changes)
            .await
            .unwrap();
        store
            .save_result(&pass_id, &result("p2", 0.8, false))
            .await
            .unwrap();

        let results = store.results_for_pass(&pass_id).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0], changed);
        assert!(results[1].changes.is_empty());

        let stats = store.session_stats("s1").await.unwrap();
        assert_eq!(stats.total_passes, 1);
        assert_eq!(stats.total_changes, 1);
        assert_eq!(stats.total_notes, 0);
        assert!((stats.avg_overall_score - 0.85).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_stats_empty_session() {
        let store = PolishingStore::open_in_memory().await.unwrap();
        store.create_session("s", "d", "t", "{}").await.unwrap();
        let stats = store.session_stats("s").await.unwrap();
        assert_eq!(stats.total_passes, 0);
        assert_eq!(stats.avg_overall_score, 0.0);
    }

    #[tokio::test]
    async fn test_export_nested() {
        let (store, pass_id) = seeded().await;
        store.save_note(&pass_id, &note("p1", "Slava")).await.unwrap();
        store
            .save_result(&pass_id, &result("p1", 0.9, false))
            .await
            .unwrap();
        store.create_pass("s1", 2, &["openai".to_string()]).await.unwrap();

        let export = store.export_session("s1").await.unwrap();
        assert_eq!(export.session.session_id, "s1");
        assert_eq!(export.passes.len(), 2);
        assert_eq!(export.passes[0].notes.len(), 1);
        assert_eq!(export.passes[0].results.len(), 1);
        assert!(export.passes[1].notes.is_empty());
        assert_eq!(export.stats.total_notes, 1);

        let json = serde_json::to_value(&export).unwrap();
        assert_eq!(json["passes"][1]["pass"]["pass_number"], 2);

        assert!(matches!(
            store.export_session("missing").await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_file_store_reopens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("polish.db");
        {
            let store = PolishingStore::open(&path).await.unwrap();
            store.create_session("s1", "d", "t", "{}").await.unwrap();
            store.close().await;
        }
        let store = PolishingStore::open(&path).await.unwrap();
        assert!(store.get_session("s1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_foreign_keys_on_every_pooled_connection() {
        let dir = tempfile::tempdir().unwrap();
        let store = PolishingStore::open(dir.path().join("polish.db"))
            .await
            .unwrap();

        // Hold several connections at once so the pool has to open new ones.
        let mut held = Vec::new();
        for _ in 0..3 {
            held.push(store.pool().acquire().await.unwrap());
        }
        for conn in held.iter_mut() {
            let enabled: i64 = sqlx::query_scalar("PRAGMA foreign_keys")
                .fetch_one(&mut **conn)
                .await
                .unwrap();
            assert_eq!(enabled, 1);
        }
        drop(held);

        let orphans = futures::future::join_all(
            (1..=4).map(|n| store.create_pass("no-such-session", n, &[])),
        )
        .await;
        assert!(orphans.iter().all(|r| r.is_err()));
    }
}
