use crate::db;
use crate::import;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::metrics;
use crate::scheme::{Gender, MarkScheme, PassFail, StudentRecord};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

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

fn parse_search(v: Option<&serde_json::Value>) -> Result<Option<String>, String> {
    let Some(value) = v else {
        return Ok(None);
    };
    if value.is_null() {
        return Ok(None);
    }
    let Some(raw) = value.as_str() else {
        return Err("query.search must be string or null".to_string());
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    Ok(Some(trimmed.to_ascii_lowercase()))
}

fn parse_sort_by(
    v: Option<&serde_json::Value>,
    allowed: &[&str],
    default: &str,
) -> Result<String, String> {
    let Some(value) = v else {
        return Ok(default.to_string());
    };
    let Some(raw) = value.as_str() else {
        return Err("query.sortBy must be a string".to_string());
    };
    if allowed.iter().any(|a| *a == raw) {
        Ok(raw.to_string())
    } else {
        Err(format!("query.sortBy must be one of: {}", allowed.join(", ")))
    }
}

fn parse_sort_dir(v: Option<&serde_json::Value>) -> Result<String, String> {
    let Some(value) = v else {
        return Ok("asc".to_string());
    };
    let Some(raw) = value.as_str() else {
        return Err("query.sortDir must be a string".to_string());
    };
    if raw.eq_ignore_ascii_case("asc") {
        Ok("asc".to_string())
    } else if raw.eq_ignore_ascii_case("desc") {
        Ok("desc".to_string())
    } else {
        Err("query.sortDir must be one of: asc, desc".to_string())
    }
}

fn parse_page(v: Option<&serde_json::Value>) -> Result<usize, String> {
    let Some(value) = v else {
        return Ok(1);
    };
    let Some(page) = value.as_u64() else {
        return Err("query.page must be a positive integer".to_string());
    };
    if page == 0 {
        return Err("query.page must be >= 1".to_string());
    }
    Ok(page as usize)
}

fn parse_page_size(v: Option<&serde_json::Value>) -> Result<usize, String> {
    let Some(value) = v else {
        return Ok(50);
    };
    let Some(size) = value.as_u64() else {
        return Err("query.pageSize must be a positive integer".to_string());
    };
    if size == 0 || size > 500 {
        return Err("query.pageSize must be in range 1..=500".to_string());
    }
    Ok(size as usize)
}

// Outer None means no filter; Some(None) keeps only rows without a gender.
fn parse_gender_filter(v: Option<&serde_json::Value>) -> Result<Option<Option<Gender>>, String> {
    let Some(value) = v else {
        return Ok(None);
    };
    if value.is_null() {
        return Ok(None);
    }
    let Some(raw) = value.as_str() else {
        return Err("query.gender must be a string".to_string());
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    if trimmed.eq_ignore_ascii_case("unset") {
        return Ok(Some(None));
    }
    match Gender::coerce_or_default(trimmed) {
        Some(g) => Ok(Some(Some(g))),
        None => Err("query.gender must be one of: male, female, other, unset".to_string()),
    }
}

fn parse_result_filter(v: Option<&serde_json::Value>) -> Result<Option<PassFail>, String> {
    let Some(value) = v else {
        return Ok(None);
    };
    if value.is_null() {
        return Ok(None);
    }
    let Some(raw) = value.as_str() else {
        return Err("query.result must be a string".to_string());
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    match PassFail::parse(trimmed) {
        Some(r) => Ok(Some(r)),
        None => Err("query.result must be one of: P, F, Pass, Fail".to_string()),
    }
}

struct StudentListQuery {
    search: Option<String>,
    gender: Option<Option<Gender>>,
    result: Option<PassFail>,
    sort_by: String,
    sort_dir: String,
    page: usize,
    page_size: usize,
}

fn parse_student_list_query(req: &Request) -> Result<StudentListQuery, serde_json::Value> {
    let query = req
        .params
        .get("query")
        .and_then(|v| v.as_object())
        .cloned()
        .unwrap_or_default();

    let search = match parse_search(query.get("search")) {
        Ok(v) => v,
        Err(msg) => return Err(err(&req.id, "bad_params", msg, None)),
    };
    let gender = match parse_gender_filter(query.get("gender")) {
        Ok(v) => v,
        Err(msg) => return Err(err(&req.id, "bad_params", msg, None)),
    };
    let result = match parse_result_filter(query.get("result")) {
        Ok(v) => v,
        Err(msg) => return Err(err(&req.id, "bad_params", msg, None)),
    };
    let sort_by = match parse_sort_by(
        query.get("sortBy"),
        &["rollNo", "name", "cgpa", "seatNumber"],
        "rollNo",
    ) {
        Ok(v) => v,
        Err(msg) => return Err(err(&req.id, "bad_params", msg, None)),
    };
    let sort_dir = match parse_sort_dir(query.get("sortDir")) {
        Ok(v) => v,
        Err(msg) => return Err(err(&req.id, "bad_params", msg, None)),
    };
    let page = match parse_page(query.get("page")) {
        Ok(v) => v,
        Err(msg) => return Err(err(&req.id, "bad_params", msg, None)),
    };
    let page_size = match parse_page_size(query.get("pageSize")) {
        Ok(v) => v,
        Err(msg) => return Err(err(&req.id, "bad_params", msg, None)),
    };

    Ok(StudentListQuery {
        search,
        gender,
        result,
        sort_by,
        sort_dir,
        page,
        page_size,
    })
}

fn paginate_values<T: Clone>(items: &[T], page: usize, page_size: usize) -> Vec<T> {
    let start = (page.saturating_sub(1)) * page_size;
    if start >= items.len() {
        return Vec::new();
    }
    let end = std::cmp::min(start + page_size, items.len());
    items[start..end].to_vec()
}

// Roll numbers are stored as text; rows without a numeric roll sort last.
fn roll_sort_key(roll: Option<&str>) -> i64 {
    roll.and_then(|r| r.trim().parse::<i64>().ok()).unwrap_or(999)
}

fn handle_students_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let database_id = match required_str(req, "databaseId") {
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
    let query = match parse_student_list_query(req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let mut students = match db::load_student_records(conn, scheme, &database_id) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    if let Some(search) = query.search.as_ref() {
        students.retain(|s| {
            s.record.student_name.to_ascii_lowercase().contains(search)
                || s.record.seat_number.to_string() == *search
                || s.record
                    .roll_no
                    .as_deref()
                    .map(|r| r.eq_ignore_ascii_case(search))
                    .unwrap_or(false)
        });
    }
    if let Some(filter) = query.gender {
        students.retain(|s| s.record.gender == filter);
    }
    if let Some(filter) = query.result {
        students.retain(|s| s.record.result == Some(filter));
    }

    students.sort_by(|a, b| {
        let ord = match query.sort_by.as_str() {
            "name" => a
                .record
                .student_name
                .to_ascii_lowercase()
                .cmp(&b.record.student_name.to_ascii_lowercase()),
            "cgpa" => a
                .record
                .total_cgpa
                .partial_cmp(&b.record.total_cgpa)
                .unwrap_or(std::cmp::Ordering::Equal),
            "seatNumber" => a.record.seat_number.cmp(&b.record.seat_number),
            _ => roll_sort_key(a.record.roll_no.as_deref())
                .cmp(&roll_sort_key(b.record.roll_no.as_deref())),
        };
        let ord = if query.sort_dir == "desc" {
            ord.reverse()
        } else {
            ord
        };
        ord.then_with(|| a.sort_order.cmp(&b.sort_order))
    });

    let rows: Vec<serde_json::Value> = students
        .iter()
        .map(|s| {
            json!({
                "studentId": s.id,
                "seatNumber": s.record.seat_number,
                "rollNo": s.record.roll_no,
                "studentName": s.record.student_name,
                "gender": s.record.gender.map(Gender::as_str),
                "result": s.record.result.map(PassFail::as_str),
                "totalCgpa": s.record.total_cgpa,
                "overallTotal": metrics::overall_total(scheme, &s.record),
                "overallPercentage": metrics::round_off_2_decimals(
                    metrics::overall_percentage(scheme, &s.record)
                ),
                "sortOrder": s.sort_order
            })
        })
        .collect();

    let total_rows = rows.len();
    let paged = paginate_values(&rows, query.page, query.page_size);

    ok(
        &req.id,
        json!({
            "rows": paged,
            "totalRows": total_rows,
            "page": query.page,
            "pageSize": query.page_size,
            "sortBy": query.sort_by,
            "sortDir": query.sort_dir
        }),
    )
}

// The written-paper total for a subject is its SE part plus its IA part.
fn derive_written_total(scheme: MarkScheme, record: &mut StudentRecord, subject_index: usize) {
    let Some(subject) = scheme.subjects().get(subject_index) else {
        return;
    };
    let se = subject.fields.iter().position(|f| f.key == "se");
    let ia = subject.fields.iter().position(|f| f.key == "ia");
    let total = subject.fields.iter().position(|f| f.key == "total");
    if let (Some(se), Some(ia), Some(total)) = (se, ia, total) {
        record.marks[subject_index][total] =
            record.marks[subject_index][se] + record.marks[subject_index][ia];
    }
}

fn apply_marks_param(
    scheme: MarkScheme,
    record: &mut StudentRecord,
    marks: &serde_json::Map<String, serde_json::Value>,
) {
    for (si, subject) in scheme.subjects().iter().enumerate() {
        let Some(fields) = marks.get(subject.name).and_then(|v| v.as_object()) else {
            continue;
        };
        for (fi, field) in subject.fields.iter().enumerate() {
            if let Some(value) = fields.get(field.key).and_then(|v| v.as_f64()) {
                record.marks[si][fi] = value;
            }
        }
    }
}

fn generate_seat_number(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    for _ in 0..10 {
        let candidate = 100_000 + (Uuid::new_v4().as_u128() % 900_000) as i64;
        if !db::seat_exists(conn, candidate)? {
            return Ok(Some(candidate));
        }
    }
    Ok(None)
}

fn handle_students_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let database_id = match required_str(req, "databaseId") {
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
    let student_name = match required_str(req, "studentName") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let mut record = StudentRecord::empty(scheme);
    record.student_name = student_name.trim().to_string();
    record.roll_no = req
        .params
        .get("rollNo")
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());
    record.gender = req
        .params
        .get("gender")
        .and_then(|v| v.as_str())
        .and_then(Gender::coerce_or_default);
    record.total_cgpa = req
        .params
        .get("totalCgpa")
        .and_then(|v| v.as_f64())
        .unwrap_or(0.0);
    if scheme.has_result_column() {
        record.result = req
            .params
            .get("result")
            .and_then(|v| v.as_str())
            .and_then(PassFail::parse);
    }

    let marks_param = req.params.get("marks").and_then(|v| v.as_object());
    if let Some(map) = marks_param {
        apply_marks_param(scheme, &mut record, map);
    }
    if scheme == MarkScheme::SeIaTw {
        for si in 0..scheme.subjects().len() {
            let pinned = marks_param
                .and_then(|m| m.get(scheme.subjects()[si].name))
                .and_then(|v| v.as_object())
                .map(|o| o.contains_key("total"))
                .unwrap_or(false);
            if !pinned {
                derive_written_total(scheme, &mut record, si);
            }
        }
    }

    record.seat_number = if let Some(seat) = req.params.get("seatNumber").and_then(|v| v.as_i64()) {
        seat
    } else if req
        .params
        .get("generateSeatNumber")
        .and_then(|v| v.as_bool())
        .unwrap_or(false)
    {
        match generate_seat_number(conn) {
            Ok(Some(v)) => v,
            Ok(None) => {
                return err(
                    &req.id,
                    "seat_generation_failed",
                    "could not find a free seat number",
                    None,
                )
            }
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        }
    } else {
        return err(&req.id, "bad_params", "missing seatNumber", None);
    };

    let problems = import::validate_record(scheme, &record);
    if !problems.is_empty() {
        return err(
            &req.id,
            "validation_failed",
            "student record failed validation",
            Some(json!({ "errors": problems })),
        );
    }

    match db::seat_exists(conn, record.seat_number) {
        Ok(false) => {}
        Ok(true) => {
            return err(
                &req.id,
                "duplicate_seat",
                "seat number already exists in this workspace",
                None,
            )
        }
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }

    let sort_order = match db::next_sort_order(conn, &database_id) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let student_id = match db::insert_student(conn, scheme, &database_id, sort_order, &record) {
        Ok(v) => v,
        Err(e) => {
            return err(
                &req.id,
                "db_insert_failed",
                e.to_string(),
                Some(json!({ "table": "students" })),
            )
        }
    };

    ok(
        &req.id,
        json!({ "studentId": student_id, "seatNumber": record.seat_number }),
    )
}

fn handle_students_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let scheme = match db::active_scheme(conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let stored = match db::load_student(conn, scheme, &student_id) {
        Ok(Some(v)) => v,
        Ok(None) => return err(&req.id, "not_found", "student not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let mut record = stored.record;

    if let Some(seat) = req.params.get("seatNumber").and_then(|v| v.as_i64()) {
        record.seat_number = seat;
    }
    match req.params.get("rollNo") {
        Some(v) if v.is_null() => record.roll_no = None,
        Some(v) => {
            if let Some(s) = v.as_str() {
                let trimmed = s.trim();
                record.roll_no = if trimmed.is_empty() {
                    None
                } else {
                    Some(trimmed.to_string())
                };
            }
        }
        None => {}
    }
    if let Some(name) = req.params.get("studentName").and_then(|v| v.as_str()) {
        record.student_name = name.trim().to_string();
    }
    match req.params.get("gender") {
        Some(v) if v.is_null() => record.gender = None,
        Some(v) => {
            if let Some(s) = v.as_str() {
                record.gender = Gender::coerce_or_default(s);
            }
        }
        None => {}
    }
    if scheme.has_result_column() {
        match req.params.get("result") {
            Some(v) if v.is_null() => record.result = None,
            Some(v) => {
                if let Some(s) = v.as_str() {
                    record.result = PassFail::parse(s);
                }
            }
            None => {}
        }
    }
    if let Some(cgpa) = req.params.get("totalCgpa").and_then(|v| v.as_f64()) {
        record.total_cgpa = cgpa;
    }

    if let Some(map) = req.params.get("marks").and_then(|v| v.as_object()) {
        apply_marks_param(scheme, &mut record, map);
        if scheme == MarkScheme::SeIaTw {
            // Recompute a written total only when its parts moved and the
            // caller did not pin the total itself.
            for (si, subject) in scheme.subjects().iter().enumerate() {
                let Some(fields) = map.get(subject.name).and_then(|v| v.as_object()) else {
                    continue;
                };
                let touched = fields.contains_key("se") || fields.contains_key("ia");
                if touched && !fields.contains_key("total") {
                    derive_written_total(scheme, &mut record, si);
                }
            }
        }
    }

    match db::seat_taken_by_other(conn, record.seat_number, &student_id) {
        Ok(false) => {}
        Ok(true) => {
            return err(
                &req.id,
                "duplicate_seat",
                "seat number already exists in this workspace",
                None,
            )
        }
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }

    let problems = import::validate_record(scheme, &record);
    if !problems.is_empty() {
        return err(
            &req.id,
            "validation_failed",
            "student record failed validation",
            Some(json!({ "errors": problems })),
        );
    }

    if let Err(e) = db::update_student(conn, scheme, &student_id, &record) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "students" })),
        );
    }

    ok(&req.id, json!({ "ok": true }))
}

fn handle_students_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let exists: Option<i64> = match conn
        .query_row("SELECT 1 FROM students WHERE id = ?", [&student_id], |r| {
            r.get(0)
        })
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if exists.is_none() {
        return err(&req.id, "not_found", "student not found", None);
    }

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };

    if let Err(e) = tx.execute("DELETE FROM marks WHERE student_id = ?", [&student_id]) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "marks" })),
        );
    }
    if let Err(e) = tx.execute("DELETE FROM students WHERE id = ?", [&student_id]) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "students" })),
        );
    }
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }

    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.list" => Some(handle_students_list(state, req)),
        "students.create" => Some(handle_students_create(state, req)),
        "students.update" => Some(handle_students_update(state, req)),
        "students.delete" => Some(handle_students_delete(state, req)),
        _ => None,
    }
}
