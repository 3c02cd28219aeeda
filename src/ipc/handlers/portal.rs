use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::metrics;
use crate::scheme::{Gender, PassFail};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;

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

// Public result lookup: a student identifies themselves by branch, batch
// and seat number, never by internal ids.
fn handle_portal_marksheet(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let branch = match required_str(req, "branch") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let batch = match required_str(req, "batch") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(seat_number) = req.params.get("seatNumber").and_then(|v| v.as_i64()) else {
        return err(&req.id, "bad_params", "missing seatNumber", None);
    };

    let found: Option<(String, String)> = match conn
        .query_row(
            "SELECT s.id, d.id
             FROM students s
             JOIN academic_databases d ON d.id = s.database_id
             WHERE d.branch = ? AND d.batch = ? AND s.seat_number = ?",
            (&branch, &batch, seat_number),
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let Some((student_id, database_id)) = found else {
        return err(
            &req.id,
            "not_found",
            "no record found for this seat number",
            None,
        );
    };

    let scheme = match db::active_scheme(conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let stored = match db::load_student(conn, scheme, &student_id) {
        Ok(Some(v)) => v,
        Ok(None) => {
            return err(
                &req.id,
                "not_found",
                "no record found for this seat number",
                None,
            )
        }
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let record = stored.record;

    let database = match conn.query_row(
        "SELECT id, name, branch, batch, year_classification, semester
         FROM academic_databases WHERE id = ?",
        [&database_id],
        |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "name": r.get::<_, String>(1)?,
                "branch": r.get::<_, String>(2)?,
                "batch": r.get::<_, String>(3)?,
                "yearClassification": r.get::<_, String>(4)?,
                "semester": r.get::<_, i64>(5)?
            }))
        },
    ) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let subjects: Vec<serde_json::Value> = scheme
        .subjects()
        .iter()
        .enumerate()
        .map(|(si, subject)| {
            let mut marks = serde_json::Map::new();
            for (fi, field) in subject.fields.iter().enumerate() {
                marks.insert(field.key.to_string(), json!(record.mark(si, fi)));
            }
            json!({
                "subject": subject.name,
                "marks": marks,
                "total": metrics::subject_total(scheme, &record, si)
            })
        })
        .collect();

    ok(
        &req.id,
        json!({
            "student": {
                "seatNumber": record.seat_number,
                "rollNo": record.roll_no,
                "studentName": record.student_name,
                "gender": record.gender.map(Gender::as_str),
                "result": record.result.map(PassFail::as_str),
                "totalCgpa": record.total_cgpa
            },
            "database": database,
            "subjects": subjects,
            "overallTotal": metrics::overall_total(scheme, &record),
            "maxPossibleTotal": scheme.max_possible_total(),
            "overallPercentage": metrics::round_off_2_decimals(
                metrics::overall_percentage(scheme, &record)
            ),
            "markScheme": scheme.key()
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "portal.marksheet" => Some(handle_portal_marksheet(state, req)),
        _ => None,
    }
}
