use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::metrics;
use rusqlite::Connection;
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

fn parse_pass_threshold(req: &Request) -> Result<f64, serde_json::Value> {
    let Some(value) = req.params.get("passThresholdPercent") else {
        return Ok(metrics::DEFAULT_PASS_THRESHOLD_PERCENT);
    };
    if value.is_null() {
        return Ok(metrics::DEFAULT_PASS_THRESHOLD_PERCENT);
    }
    let Some(threshold) = value.as_f64() else {
        return Err(err(
            &req.id,
            "bad_params",
            "passThresholdPercent must be a number",
            None,
        ));
    };
    if !(0.0..=100.0).contains(&threshold) {
        return Err(err(
            &req.id,
            "bad_params",
            "passThresholdPercent must be in range 0..=100",
            None,
        ));
    }
    Ok(threshold)
}

fn parse_topper_limit(req: &Request) -> Result<usize, serde_json::Value> {
    let Some(value) = req.params.get("topperLimit") else {
        return Ok(metrics::DEFAULT_TOPPER_LIMIT);
    };
    if value.is_null() {
        return Ok(metrics::DEFAULT_TOPPER_LIMIT);
    }
    let Some(limit) = value.as_u64() else {
        return Err(err(
            &req.id,
            "bad_params",
            "topperLimit must be a positive integer",
            None,
        ));
    };
    if limit == 0 || limit > 50 {
        return Err(err(
            &req.id,
            "bad_params",
            "topperLimit must be in range 1..=50",
            None,
        ));
    }
    Ok(limit as usize)
}

fn handle_analytics_database(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let database_id = match required_str(req, "databaseId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let pass_threshold = match parse_pass_threshold(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let topper_limit = match parse_topper_limit(req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let database_name = match db::database_name(conn, &database_id) {
        Ok(Some(v)) => v,
        Ok(None) => return err(&req.id, "not_found", "database not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let scheme = match db::active_scheme(conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let students = match db::load_student_records(conn, scheme, &database_id) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let records: Vec<_> = students.iter().map(|s| s.record.clone()).collect();

    let report = metrics::compute_aggregate(scheme, &records, pass_threshold, topper_limit);

    ok(
        &req.id,
        json!({
            "database": { "id": database_id, "name": database_name },
            "markScheme": scheme.key(),
            "report": report
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "analytics.database" => Some(handle_analytics_database(state, req)),
        _ => None,
    }
}
