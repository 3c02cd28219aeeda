use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::scheme::MarkScheme;
use serde_json::json;
use std::path::PathBuf;

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    let scheme = state
        .db
        .as_ref()
        .and_then(|conn| db::active_scheme(conn).ok());
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string()),
            "markScheme": scheme.map(|s| s.key())
        }),
    )
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let p = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from);
    let Some(path) = p else {
        return err(&req.id, "bad_params", "missing params.path", None);
    };
    let requested = match req.params.get("markScheme") {
        None => None,
        Some(v) if v.is_null() => None,
        Some(v) => {
            let Some(parsed) = v.as_str().and_then(MarkScheme::from_key) else {
                return err(
                    &req.id,
                    "bad_params",
                    "markScheme must be one of: se_ia_tw, sem_viva, unit_sem",
                    None,
                );
            };
            Some(parsed)
        }
    };

    match db::open_db(&path) {
        Ok(conn) => {
            let stored = match db::active_scheme(&conn) {
                Ok(v) => v,
                Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
            };
            let active = match requested {
                Some(want) if want != stored => {
                    let locked = match db::has_student_records(&conn) {
                        Ok(v) => v,
                        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
                    };
                    if locked {
                        return err(
                            &req.id,
                            "scheme_locked",
                            "mark scheme is locked once student records exist",
                            Some(json!({ "activeScheme": stored.key() })),
                        );
                    }
                    want
                }
                Some(want) => want,
                None => stored,
            };
            // Persist even on first select so the default choice is explicit.
            if let Err(e) = db::set_active_scheme(&conn, active) {
                return err(&req.id, "db_insert_failed", e.to_string(), None);
            }

            state.workspace = Some(path.clone());
            state.db = Some(conn);
            tracing::info!(
                workspace = %path.to_string_lossy(),
                scheme = active.key(),
                "workspace selected"
            );
            ok(
                &req.id,
                json!({
                    "workspacePath": path.to_string_lossy(),
                    "markScheme": active.key()
                }),
            )
        }
        Err(e) => err(&req.id, "db_open_failed", format!("{e:?}"), None),
    }
}

fn handle_scheme_describe(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let scheme = match db::active_scheme(conn) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let subjects: Vec<serde_json::Value> = scheme
        .subjects()
        .iter()
        .map(|subject| {
            json!({
                "name": subject.name,
                "fields": subject.fields.iter().map(|f| json!({
                    "key": f.key,
                    "label": f.label,
                    "max": f.max,
                    "countsInTotal": f.counts_in_total
                })).collect::<Vec<_>>()
            })
        })
        .collect();
    ok(
        &req.id,
        json!({
            "key": scheme.key(),
            "label": scheme.label(),
            "summaryLabel": scheme.summary_label(),
            "hasResultColumn": scheme.has_result_column(),
            "maxPossibleTotal": scheme.max_possible_total(),
            "subjects": subjects,
            "expectedHeaders": scheme.expected_headers()
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        "scheme.describe" => Some(handle_scheme_describe(state, req)),
        _ => None,
    }
}
