use crate::db;
use crate::import;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::metrics;
use crate::scheme::{Gender, MarkScheme, PassFail, StudentRecord};
use rusqlite::Connection;
use serde_json::json;
use std::collections::HashSet;

fn required_str(req: &Request, key: &str) -> Result<String, serde_json::Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.to_string())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

fn db_conn<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, serde_json::Value> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

fn record_json(scheme: MarkScheme, record: &StudentRecord) -> serde_json::Value {
    let mut marks = serde_json::Map::new();
    for (si, subject) in scheme.subjects().iter().enumerate() {
        let mut fields = serde_json::Map::new();
        for (fi, field) in subject.fields.iter().enumerate() {
            fields.insert(field.key.to_string(), json!(record.mark(si, fi)));
        }
        marks.insert(subject.name.to_string(), serde_json::Value::Object(fields));
    }
    json!({
        "seatNumber": record.seat_number,
        "rollNo": record.roll_no,
        "studentName": record.student_name,
        "gender": record.gender.map(Gender::as_str),
        "result": record.result.map(PassFail::as_str),
        "totalCgpa": record.total_cgpa,
        "marks": marks,
        "overallTotal": metrics::overall_total(scheme, record),
        "overallPercentage": metrics::round_off_2_decimals(
            metrics::overall_percentage(scheme, record)
        )
    })
}

fn handle_import_preview(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let raw_text = match required_str(req, "rawText") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let scheme = match db::active_scheme(conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let outcome = import::validate(&raw_text, scheme);
    let accepted: Vec<serde_json::Value> = outcome
        .accepted
        .iter()
        .map(|r| record_json(scheme, r))
        .collect();

    ok(
        &req.id,
        json!({
            "markScheme": scheme.key(),
            "acceptedCount": accepted.len(),
            "errorCount": outcome.errors.len(),
            "accepted": accepted,
            "errors": outcome.errors
        }),
    )
}

fn handle_import_commit(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let database_id = match required_str(req, "databaseId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let raw_text = match required_str(req, "rawText") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match db::database_name(conn, &database_id) {
        Ok(Some(_)) => {}
        Ok(None) => return err(&req.id, "not_found", "database not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }
    let scheme = match db::active_scheme(conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let outcome = import::validate(&raw_text, scheme);

    let seats: Vec<i64> = outcome.accepted.iter().map(|r| r.seat_number).collect();
    let existing = match db::existing_seats(conn, &seats) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };
    let mut sort_order = match db::next_sort_order(&tx, &database_id) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    // The first row with a given seat wins; later copies within the same
    // file are skipped, as are seats already stored in the workspace.
    let mut seen: HashSet<i64> = HashSet::new();
    let mut inserted = 0usize;
    let mut skipped = 0usize;
    for record in &outcome.accepted {
        if existing.contains(&record.seat_number) || !seen.insert(record.seat_number) {
            skipped += 1;
            continue;
        }
        if let Err(e) = db::insert_student(&tx, scheme, &database_id, sort_order, record) {
            let _ = tx.rollback();
            return err(
                &req.id,
                "db_insert_failed",
                e.to_string(),
                Some(json!({ "table": "students" })),
            );
        }
        sort_order += 1;
        inserted += 1;
    }

    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }

    tracing::info!(
        database = %database_id,
        inserted,
        skipped,
        rejected = outcome.errors.len(),
        "import committed"
    );

    ok(
        &req.id,
        json!({
            "inserted": inserted,
            "skippedDuplicates": skipped,
            "acceptedCount": outcome.accepted.len(),
            "errorCount": outcome.errors.len(),
            "errors": outcome.errors
        }),
    )
}

fn handle_import_template(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let scheme = match db::active_scheme(conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    ok(
        &req.id,
        json!({
            "filename": format!("import-template-{}.csv", scheme.key()),
            "markScheme": scheme.key(),
            "content": import::template_csv(scheme)
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "import.preview" => Some(handle_import_preview(state, req)),
        "import.commit" => Some(handle_import_commit(state, req)),
        "import.template" => Some(handle_import_template(state, req)),
        _ => None,
    }
}
