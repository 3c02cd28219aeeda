mod test_support;

use serde_json::json;
use test_support::{request, request_ok, spawn_sidecar, temp_dir};

#[test]
fn health_and_unknown_method() {
    let workspace = temp_dir("marksheet-smoke");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let health = request_ok(&mut stdin, &mut reader, "1", "health", json!({}));
    assert_eq!(
        health["version"].as_str(),
        Some(env!("CARGO_PKG_VERSION"))
    );
    assert!(health["workspacePath"].is_null());
    assert!(health["markScheme"].is_null());

    let unknown = request(&mut stdin, &mut reader, "2", "nope.nothing", json!({}));
    assert_eq!(unknown["ok"].as_bool(), Some(false));
    assert_eq!(unknown["error"]["code"].as_str(), Some("not_implemented"));
    assert!(unknown["error"]["message"]
        .as_str()
        .unwrap_or("")
        .contains("nope.nothing"));

    let selected = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    assert_eq!(selected["markScheme"].as_str(), Some("unit_sem"));

    let health = request_ok(&mut stdin, &mut reader, "4", "health", json!({}));
    assert_eq!(health["markScheme"].as_str(), Some("unit_sem"));
    assert_eq!(
        health["workspacePath"].as_str(),
        Some(workspace.to_string_lossy().as_ref())
    );

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn scheme_describe_reflects_active_scheme() {
    let workspace = temp_dir("marksheet-describe");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy(), "markScheme": "sem_viva" }),
    );

    let described = request_ok(&mut stdin, &mut reader, "2", "scheme.describe", json!({}));
    assert_eq!(described["key"].as_str(), Some("sem_viva"));
    assert_eq!(described["hasResultColumn"].as_bool(), Some(false));
    assert_eq!(described["maxPossibleTotal"].as_f64(), Some(1125.0));
    assert_eq!(described["summaryLabel"].as_str(), Some("Total CGPA"));

    let subjects = described["subjects"].as_array().expect("subjects");
    assert_eq!(subjects.len(), 5);
    assert_eq!(subjects[0]["name"].as_str(), Some("S1"));
    let fields = subjects[0]["fields"].as_array().expect("fields");
    assert_eq!(fields.len(), 4);
    assert_eq!(fields[0]["key"].as_str(), Some("sem_exam"));
    assert_eq!(fields[0]["max"].as_f64(), Some(80.0));
    assert_eq!(fields[0]["countsInTotal"].as_bool(), Some(true));

    let headers = described["expectedHeaders"].as_array().expect("headers");
    assert_eq!(headers.len(), 25);
    assert_eq!(headers[0].as_str(), Some("Seat Number"));
    assert_eq!(headers[4].as_str(), Some("S1_SemExam"));
    assert_eq!(headers[24].as_str(), Some("Total_CGPA"));

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn describe_without_workspace_is_rejected() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let resp = request(&mut stdin, &mut reader, "1", "scheme.describe", json!({}));
    assert_eq!(resp["ok"].as_bool(), Some(false));
    assert_eq!(resp["error"]["code"].as_str(), Some("no_workspace"));
}
