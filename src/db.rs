use anyhow::Context;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};
use serde_json::{json, Value};
use std::path::Path;
use uuid::Uuid;

use crate::import::ImportReport;

pub const DB_FILE_NAME: &str = "acadtrack.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)
        .with_context(|| format!("failed to create workspace {}", workspace.to_string_lossy()))?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(&db_path)
        .with_context(|| format!("failed to open {}", db_path.to_string_lossy()))?;
    init_schema(&conn)?;
    Ok(conn)
}

#[cfg(test)]
pub fn open_in_memory() -> anyhow::Result<Connection> {
    let conn = Connection::open_in_memory()?;
    init_schema(&conn)?;
    Ok(conn)
}

fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS identities(
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            name TEXT,
            gender TEXT,
            birth_date TEXT,
            technical_school INTEGER,
            role TEXT NOT NULL,
            synthetic INTEGER NOT NULL DEFAULT 0,
            updated_at TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS subjects(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            kind TEXT,
            modality TEXT,
            updated_at TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS staff_assignments(
            id TEXT PRIMARY KEY,
            identity_id TEXT NOT NULL,
            subject_id TEXT NOT NULL,
            role TEXT NOT NULL,
            updated_at TEXT,
            FOREIGN KEY(identity_id) REFERENCES identities(id),
            FOREIGN KEY(subject_id) REFERENCES subjects(id),
            UNIQUE(identity_id, subject_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_staff_assignments_subject ON staff_assignments(subject_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS enrollments(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            subject_id TEXT NOT NULL,
            academic_year INTEGER NOT NULL,
            period TEXT,
            attendance REAL,
            repeat_count INTEGER,
            dropout INTEGER,
            passed INTEGER,
            updated_at TEXT,
            FOREIGN KEY(student_id) REFERENCES identities(id),
            FOREIGN KEY(subject_id) REFERENCES subjects(id),
            UNIQUE(student_id, subject_id, academic_year)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_enrollments_student ON enrollments(student_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_enrollments_subject ON enrollments(subject_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS assessments(
            id TEXT PRIMARY KEY,
            enrollment_id TEXT NOT NULL,
            kind TEXT NOT NULL,
            grade INTEGER NOT NULL CHECK(grade BETWEEN 1 AND 10),
            updated_at TEXT,
            FOREIGN KEY(enrollment_id) REFERENCES enrollments(id),
            UNIQUE(enrollment_id, kind)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_assessments_enrollment ON assessments(enrollment_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS import_runs(
            id TEXT PRIMARY KEY,
            source_path TEXT NOT NULL,
            source_sha256 TEXT NOT NULL,
            dry_run INTEGER NOT NULL DEFAULT 0,
            started_at TEXT NOT NULL,
            finished_at TEXT NOT NULL,
            rows_read INTEGER NOT NULL,
            rows_ok INTEGER NOT NULL,
            rows_error INTEGER NOT NULL,
            report_json TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_import_runs_sha ON import_runs(source_sha256)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    Ok(())
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(s) => Ok(Some(serde_json::from_str(&s)?)),
        None => Ok(None),
    }
}

pub fn settings_set_json(conn: &Connection, key: &str, value: &Value) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}

pub struct ImportRunRow<'a> {
    pub id: &'a str,
    pub source_path: &'a str,
    pub source_sha256: &'a str,
    pub dry_run: bool,
    pub started_at: &'a str,
    pub finished_at: &'a str,
    pub rows_read: usize,
    pub rows_ok: usize,
    pub rows_error: usize,
    pub report: &'a Value,
}

pub fn record_import_run(conn: &Connection, run: &ImportRunRow<'_>) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO import_runs(id, source_path, source_sha256, dry_run, started_at, finished_at, rows_read, rows_ok, rows_error, report_json)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            run.id,
            run.source_path,
            run.source_sha256,
            if run.dry_run { 1 } else { 0 },
            run.started_at,
            run.finished_at,
            run.rows_read as i64,
            run.rows_ok as i64,
            run.rows_error as i64,
            serde_json::to_string(run.report)?,
        ),
    )
    .context("failed to record import run")?;
    Ok(())
}

/// Stores a finished apply run and returns its id.
pub fn record_report(
    conn: &Connection,
    report: &ImportReport,
    started_at: &str,
) -> anyhow::Result<String> {
    let id = Uuid::new_v4().to_string();
    let finished_at = Utc::now().to_rfc3339();
    let report_json = serde_json::to_value(report)?;
    record_import_run(
        conn,
        &ImportRunRow {
            id: &id,
            source_path: &report.source_path,
            source_sha256: &report.source_sha256,
            dry_run: report.dry_run,
            started_at,
            finished_at: &finished_at,
            rows_read: report.rows_read,
            rows_ok: report.rows_ok,
            rows_error: report.rows_error,
            report: &report_json,
        },
    )?;
    Ok(id)
}

/// Most recent runs first, without the stored report body.
pub fn list_import_runs(conn: &Connection, limit: usize) -> anyhow::Result<Vec<Value>> {
    let mut stmt = conn.prepare(
        "SELECT id, source_path, source_sha256, dry_run, started_at, finished_at, rows_read, rows_ok, rows_error
         FROM import_runs
         ORDER BY finished_at DESC, rowid DESC
         LIMIT ?",
    )?;
    let rows = stmt
        .query_map([limit as i64], |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "sourcePath": r.get::<_, String>(1)?,
                "sourceSha256": r.get::<_, String>(2)?,
                "dryRun": r.get::<_, i64>(3)? != 0,
                "startedAt": r.get::<_, String>(4)?,
                "finishedAt": r.get::<_, String>(5)?,
                "rowsRead": r.get::<_, i64>(6)?,
                "rowsOk": r.get::<_, i64>(7)?,
                "rowsError": r.get::<_, i64>(8)?,
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub const ENTITY_TABLES: [&str; 5] = [
    "identities",
    "subjects",
    "staff_assignments",
    "enrollments",
    "assessments",
];

pub fn entity_counts(conn: &Connection) -> anyhow::Result<Vec<(&'static str, i64)>> {
    let mut out = Vec::with_capacity(ENTITY_TABLES.len());
    for table in ENTITY_TABLES {
        let sql = format!("SELECT COUNT(*) FROM {}", table);
        let n: i64 = conn.query_row(&sql, [], |r| r.get(0))?;
        out.push((table, n));
    }
    Ok(out)
}
