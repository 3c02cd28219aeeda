use crate::scheme::{Gender, MarkScheme, PassFail, StudentRecord};
use chrono::Utc;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use uuid::Uuid;

pub const SCHEME_SETTING_KEY: &str = "mark_scheme";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("marksheet.sqlite3");
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS academic_databases(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            branch TEXT NOT NULL,
            batch TEXT NOT NULL,
            year_classification TEXT NOT NULL,
            semester INTEGER NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            database_id TEXT NOT NULL,
            seat_number INTEGER NOT NULL UNIQUE,
            roll_no TEXT,
            student_name TEXT NOT NULL,
            gender TEXT,
            result TEXT,
            total_cgpa REAL NOT NULL DEFAULT 0,
            sort_order INTEGER NOT NULL DEFAULT 0,
            FOREIGN KEY(database_id) REFERENCES academic_databases(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_database ON students(database_id)",
        [],
    )?;

    // Workspaces created before the portal work lack created_at. Add it.
    ensure_students_created_at(&conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_database_sort ON students(database_id, sort_order)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS marks(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            subject TEXT NOT NULL,
            field TEXT NOT NULL,
            value REAL NOT NULL DEFAULT 0,
            FOREIGN KEY(student_id) REFERENCES students(id),
            UNIQUE(student_id, subject, field)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_marks_student ON marks(student_id)",
        [],
    )?;

    Ok(conn)
}

fn ensure_students_created_at(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "students", "created_at")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE students ADD COLUMN created_at TEXT", [])?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

pub fn settings_set_json(
    conn: &Connection,
    key: &str,
    value: &serde_json::Value,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        (key, value.to_string()),
    )?;
    Ok(())
}

pub fn settings_get_json(
    conn: &Connection,
    key: &str,
) -> rusqlite::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row("SELECT value FROM settings WHERE key = ?", [key], |r| {
            r.get(0)
        })
        .optional()?;
    Ok(raw.and_then(|s| serde_json::from_str(&s).ok()))
}

/// Scheme the workspace was configured with; the default when nothing has
/// been stored yet.
pub fn active_scheme(conn: &Connection) -> rusqlite::Result<MarkScheme> {
    let stored = settings_get_json(conn, SCHEME_SETTING_KEY)?;
    Ok(stored
        .and_then(|v| {
            v.get("key")
                .and_then(|k| k.as_str())
                .and_then(MarkScheme::from_key)
        })
        .unwrap_or(MarkScheme::UnitSem))
}

pub fn set_active_scheme(conn: &Connection, scheme: MarkScheme) -> rusqlite::Result<()> {
    settings_set_json(
        conn,
        SCHEME_SETTING_KEY,
        &serde_json::json!({ "key": scheme.key() }),
    )
}

pub fn has_student_records(conn: &Connection) -> rusqlite::Result<bool> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM students", [], |r| r.get(0))?;
    Ok(count > 0)
}

pub fn database_name(conn: &Connection, database_id: &str) -> rusqlite::Result<Option<String>> {
    conn.query_row(
        "SELECT name FROM academic_databases WHERE id = ?",
        [database_id],
        |r| r.get(0),
    )
    .optional()
}

/// A persisted student row plus its marks, rehydrated into the in-memory
/// record shape the validators and metrics work on.
#[derive(Debug, Clone)]
pub struct StoredStudent {
    pub id: String,
    pub database_id: String,
    pub sort_order: i64,
    pub created_at: Option<String>,
    pub record: StudentRecord,
}

const STUDENT_COLUMNS: &str =
    "id, database_id, seat_number, roll_no, student_name, gender, result, total_cgpa, sort_order, created_at";

fn student_from_row(scheme: MarkScheme, row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredStudent> {
    let mut record = StudentRecord::empty(scheme);
    let id: String = row.get(0)?;
    let database_id: String = row.get(1)?;
    record.seat_number = row.get(2)?;
    record.roll_no = row.get(3)?;
    record.student_name = row.get(4)?;
    let gender: Option<String> = row.get(5)?;
    record.gender = gender.as_deref().and_then(Gender::from_stored);
    let result: Option<String> = row.get(6)?;
    record.result = result.as_deref().and_then(PassFail::from_stored);
    record.total_cgpa = row.get(7)?;
    let sort_order: i64 = row.get(8)?;
    let created_at: Option<String> = row.get(9)?;
    Ok(StoredStudent {
        id,
        database_id,
        sort_order,
        created_at,
        record,
    })
}

fn attach_marks(
    conn: &Connection,
    scheme: MarkScheme,
    students: &mut [StoredStudent],
) -> rusqlite::Result<()> {
    if students.is_empty() {
        return Ok(());
    }
    let mut slot_by_key: HashMap<(String, String), (usize, usize)> = HashMap::new();
    for (si, subject) in scheme.subjects().iter().enumerate() {
        for (fi, field) in subject.fields.iter().enumerate() {
            slot_by_key.insert((subject.name.to_string(), field.key.to_string()), (si, fi));
        }
    }
    let mut index_by_id: HashMap<String, usize> = HashMap::new();
    for (i, s) in students.iter().enumerate() {
        index_by_id.insert(s.id.clone(), i);
    }

    let placeholders = std::iter::repeat("?")
        .take(students.len())
        .collect::<Vec<_>>()
        .join(",");
    let sql = format!(
        "SELECT student_id, subject, field, value FROM marks WHERE student_id IN ({})",
        placeholders
    );
    let mut stmt = conn.prepare(&sql)?;
    let params: Vec<Value> = students.iter().map(|s| Value::Text(s.id.clone())).collect();
    let rows = stmt
        .query_map(params_from_iter(params), |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, f64>(3)?,
            ))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    for (student_id, subject, field, value) in rows {
        let Some(&i) = index_by_id.get(&student_id) else {
            continue;
        };
        // Mark rows with no slot in the active scheme are skipped.
        let Some(&(si, fi)) = slot_by_key.get(&(subject, field)) else {
            continue;
        };
        students[i].record.marks[si][fi] = value;
    }
    Ok(())
}

pub fn load_student_records(
    conn: &Connection,
    scheme: MarkScheme,
    database_id: &str,
) -> rusqlite::Result<Vec<StoredStudent>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM students WHERE database_id = ? ORDER BY sort_order, id",
        STUDENT_COLUMNS
    ))?;
    let mut students = stmt
        .query_map([database_id], |row| student_from_row(scheme, row))
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    attach_marks(conn, scheme, &mut students)?;
    Ok(students)
}

pub fn load_student(
    conn: &Connection,
    scheme: MarkScheme,
    student_id: &str,
) -> rusqlite::Result<Option<StoredStudent>> {
    let found = conn
        .query_row(
            &format!("SELECT {} FROM students WHERE id = ?", STUDENT_COLUMNS),
            [student_id],
            |row| student_from_row(scheme, row),
        )
        .optional()?;
    let Some(student) = found else {
        return Ok(None);
    };
    let mut students = vec![student];
    attach_marks(conn, scheme, &mut students)?;
    Ok(students.pop())
}

pub fn seat_exists(conn: &Connection, seat_number: i64) -> rusqlite::Result<bool> {
    Ok(conn
        .query_row(
            "SELECT 1 FROM students WHERE seat_number = ?",
            [seat_number],
            |r| r.get::<_, i64>(0),
        )
        .optional()?
        .is_some())
}

pub fn seat_taken_by_other(
    conn: &Connection,
    seat_number: i64,
    student_id: &str,
) -> rusqlite::Result<bool> {
    Ok(conn
        .query_row(
            "SELECT 1 FROM students WHERE seat_number = ? AND id != ?",
            (seat_number, student_id),
            |r| r.get::<_, i64>(0),
        )
        .optional()?
        .is_some())
}

/// Which of the given seats are already stored. Seat numbers are unique
/// across the whole workspace, not per database.
pub fn existing_seats(conn: &Connection, seats: &[i64]) -> rusqlite::Result<HashSet<i64>> {
    if seats.is_empty() {
        return Ok(HashSet::new());
    }
    let placeholders = std::iter::repeat("?")
        .take(seats.len())
        .collect::<Vec<_>>()
        .join(",");
    let sql = format!(
        "SELECT seat_number FROM students WHERE seat_number IN ({})",
        placeholders
    );
    let mut stmt = conn.prepare(&sql)?;
    let params: Vec<Value> = seats.iter().map(|s| Value::Integer(*s)).collect();
    let rows = stmt
        .query_map(params_from_iter(params), |r| r.get::<_, i64>(0))
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    Ok(rows.into_iter().collect())
}

pub fn next_sort_order(conn: &Connection, database_id: &str) -> rusqlite::Result<i64> {
    conn.query_row(
        "SELECT COALESCE(MAX(sort_order) + 1, 0) FROM students WHERE database_id = ?",
        [database_id],
        |r| r.get(0),
    )
}

pub fn insert_student(
    conn: &Connection,
    scheme: MarkScheme,
    database_id: &str,
    sort_order: i64,
    record: &StudentRecord,
) -> rusqlite::Result<String> {
    let student_id = Uuid::new_v4().to_string();
    let created_at = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO students(id, database_id, seat_number, roll_no, student_name, gender, result, total_cgpa, sort_order, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &student_id,
            database_id,
            record.seat_number,
            &record.roll_no,
            &record.student_name,
            record.gender.map(Gender::as_str),
            record.result.map(PassFail::as_str),
            record.total_cgpa,
            sort_order,
            &created_at,
        ),
    )?;
    replace_marks(conn, scheme, &student_id, record)?;
    Ok(student_id)
}

pub fn update_student(
    conn: &Connection,
    scheme: MarkScheme,
    student_id: &str,
    record: &StudentRecord,
) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE students SET seat_number = ?, roll_no = ?, student_name = ?, gender = ?, result = ?, total_cgpa = ? WHERE id = ?",
        (
            record.seat_number,
            &record.roll_no,
            &record.student_name,
            record.gender.map(Gender::as_str),
            record.result.map(PassFail::as_str),
            record.total_cgpa,
            student_id,
        ),
    )?;
    replace_marks(conn, scheme, student_id, record)?;
    Ok(())
}

pub fn replace_marks(
    conn: &Connection,
    scheme: MarkScheme,
    student_id: &str,
    record: &StudentRecord,
) -> rusqlite::Result<()> {
    conn.execute("DELETE FROM marks WHERE student_id = ?", [student_id])?;
    let mut stmt = conn.prepare(
        "INSERT INTO marks(id, student_id, subject, field, value) VALUES(?, ?, ?, ?, ?)",
    )?;
    for (si, subject) in scheme.subjects().iter().enumerate() {
        for (fi, field) in subject.fields.iter().enumerate() {
            stmt.execute((
                Uuid::new_v4().to_string(),
                student_id,
                subject.name,
                field.key,
                record.mark(si, fi),
            ))?;
        }
    }
    Ok(())
}
