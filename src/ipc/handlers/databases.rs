use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use chrono::Utc;
use rusqlite::OptionalExtension;
use serde_json::json;
use uuid::Uuid;

const BRANCHES: [&str; 5] = [
    "Computer Eng.",
    "Electronics and Telecom",
    "Information Technology",
    "Electronics and Computer Science",
    "Electrical",
];

const YEAR_CLASSIFICATIONS: [&str; 4] = ["1st Year", "2nd Year", "3rd Year", "4th Year"];

struct DatabaseFields {
    name: String,
    branch: String,
    batch: String,
    year_classification: String,
    semester: i64,
}

fn parse_database_fields(req: &Request) -> Result<DatabaseFields, serde_json::Value> {
    let name = match req.params.get("name").and_then(|v| v.as_str()) {
        Some(v) => v.trim().to_string(),
        None => return Err(err(&req.id, "bad_params", "missing name", None)),
    };
    let branch = match req.params.get("branch").and_then(|v| v.as_str()) {
        Some(v) => v.trim().to_string(),
        None => return Err(err(&req.id, "bad_params", "missing branch", None)),
    };
    let batch = match req.params.get("batch").and_then(|v| v.as_str()) {
        Some(v) => v.trim().to_string(),
        None => return Err(err(&req.id, "bad_params", "missing batch", None)),
    };
    let year_classification = match req.params.get("yearClassification").and_then(|v| v.as_str()) {
        Some(v) => v.trim().to_string(),
        None => return Err(err(&req.id, "bad_params", "missing yearClassification", None)),
    };
    let semester = match req.params.get("semester").and_then(|v| v.as_i64()) {
        Some(v) => v,
        None => return Err(err(&req.id, "bad_params", "missing semester", None)),
    };
    Ok(DatabaseFields {
        name,
        branch,
        batch,
        year_classification,
        semester,
    })
}

fn batch_year(raw: &str) -> Option<i64> {
    if raw.len() != 4 || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    // Batches start in the 2020s at the earliest.
    if !raw.starts_with("20") || raw.as_bytes()[2] < b'2' {
        return None;
    }
    raw.parse().ok()
}

fn batch_is_valid(batch: &str) -> bool {
    let Some((start, end)) = batch.split_once(" - ") else {
        return false;
    };
    match (batch_year(start), batch_year(end)) {
        (Some(s), Some(e)) => e == s + 4,
        _ => false,
    }
}

fn validate_database_fields(fields: &DatabaseFields) -> Vec<String> {
    let mut errors: Vec<String> = Vec::new();
    if fields.name.is_empty() {
        errors.push("Database name is required".to_string());
    }
    if !BRANCHES.contains(&fields.branch.as_str()) {
        errors.push(format!("Branch must be one of: {}", BRANCHES.join(", ")));
    }
    if !batch_is_valid(&fields.batch) {
        errors.push("Batch must match the pattern 20XX - 20XX with a four year gap".to_string());
    }
    if !YEAR_CLASSIFICATIONS.contains(&fields.year_classification.as_str()) {
        errors.push(format!(
            "Year classification must be one of: {}",
            YEAR_CLASSIFICATIONS.join(", ")
        ));
    }
    if fields.semester < 1 || fields.semester > 2 {
        errors.push("Semester must be 1 or 2".to_string());
    }
    errors
}

fn handle_databases_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "databases": [] }));
    };

    // Student counts ride along so the dashboard list needs no second call.
    let mut stmt = match conn.prepare(
        "SELECT
           d.id,
           d.name,
           d.branch,
           d.batch,
           d.year_classification,
           d.semester,
           d.created_at,
           (SELECT COUNT(*) FROM students s WHERE s.database_id = d.id) AS student_count
         FROM academic_databases d
         ORDER BY d.created_at DESC",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map([], |row| {
            Ok(json!({
                "id": row.get::<_, String>(0)?,
                "name": row.get::<_, String>(1)?,
                "branch": row.get::<_, String>(2)?,
                "batch": row.get::<_, String>(3)?,
                "yearClassification": row.get::<_, String>(4)?,
                "semester": row.get::<_, i64>(5)?,
                "createdAt": row.get::<_, String>(6)?,
                "studentCount": row.get::<_, i64>(7)?
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(databases) => ok(&req.id, json!({ "databases": databases })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_databases_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let fields = match parse_database_fields(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let problems = validate_database_fields(&fields);
    if !problems.is_empty() {
        return err(
            &req.id,
            "validation_failed",
            "database fields failed validation",
            Some(json!({ "errors": problems })),
        );
    }

    let database_id = Uuid::new_v4().to_string();
    let created_at = Utc::now().to_rfc3339();
    if let Err(e) = conn.execute(
        "INSERT INTO academic_databases(id, name, branch, batch, year_classification, semester, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            &database_id,
            &fields.name,
            &fields.branch,
            &fields.batch,
            &fields.year_classification,
            fields.semester,
            &created_at,
        ),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "academic_databases" })),
        );
    }

    ok(&req.id, json!({ "databaseId": database_id, "name": fields.name }))
}

fn handle_databases_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let database_id = match req.params.get("databaseId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing databaseId", None),
    };

    let exists: Option<i64> = match conn
        .query_row(
            "SELECT 1 FROM academic_databases WHERE id = ?",
            [&database_id],
            |r| r.get(0),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if exists.is_none() {
        return err(&req.id, "not_found", "database not found", None);
    }

    let fields = match parse_database_fields(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let problems = validate_database_fields(&fields);
    if !problems.is_empty() {
        return err(
            &req.id,
            "validation_failed",
            "database fields failed validation",
            Some(json!({ "errors": problems })),
        );
    }

    if let Err(e) = conn.execute(
        "UPDATE academic_databases
         SET name = ?, branch = ?, batch = ?, year_classification = ?, semester = ?
         WHERE id = ?",
        (
            &fields.name,
            &fields.branch,
            &fields.batch,
            &fields.year_classification,
            fields.semester,
            &database_id,
        ),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "academic_databases" })),
        );
    }

    ok(&req.id, json!({ "ok": true }))
}

fn handle_databases_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let database_id = match req.params.get("databaseId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing databaseId", None),
    };

    let exists: Option<i64> = match conn
        .query_row(
            "SELECT 1 FROM academic_databases WHERE id = ?",
            [&database_id],
            |r| r.get(0),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if exists.is_none() {
        return err(&req.id, "not_found", "database not found", None);
    }

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };

    // Explicitly delete in dependency order (no ON DELETE CASCADE).
    if let Err(e) = tx.execute(
        "DELETE FROM marks
         WHERE student_id IN (SELECT id FROM students WHERE database_id = ?)",
        [&database_id],
    ) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "marks" })),
        );
    }

    if let Err(e) = tx.execute("DELETE FROM students WHERE database_id = ?", [&database_id]) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "students" })),
        );
    }

    if let Err(e) = tx.execute(
        "DELETE FROM academic_databases WHERE id = ?",
        [&database_id],
    ) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "academic_databases" })),
        );
    }

    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }

    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "databases.list" => Some(handle_databases_list(state, req)),
        "databases.create" => Some(handle_databases_create(state, req)),
        "databases.update" => Some(handle_databases_update(state, req)),
        "databases.delete" => Some(handle_databases_delete(state, req)),
        _ => None,
    }
}
