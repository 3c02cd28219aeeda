mod test_support;

use serde_json::json;
use test_support::{request, request_ok, spawn_sidecar, temp_dir};

#[test]
fn database_create_list_update_delete() {
    let workspace = temp_dir("marksheet-db-lifecycle");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let empty = request_ok(&mut stdin, &mut reader, "2", "databases.list", json!({}));
    assert_eq!(empty["databases"].as_array().map(|a| a.len()), Some(0));

    let created = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "databases.create",
        json!({
            "name": "TE Comps 2024",
            "branch": "Computer Eng.",
            "batch": "2021 - 2025",
            "yearClassification": "3rd Year",
            "semester": 1
        }),
    );
    let database_id = created["databaseId"].as_str().expect("databaseId").to_string();
    assert_eq!(created["name"].as_str(), Some("TE Comps 2024"));

    let listed = request_ok(&mut stdin, &mut reader, "4", "databases.list", json!({}));
    let rows = listed["databases"].as_array().expect("databases");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["id"].as_str(), Some(database_id.as_str()));
    assert_eq!(rows[0]["branch"].as_str(), Some("Computer Eng."));
    assert_eq!(rows[0]["batch"].as_str(), Some("2021 - 2025"));
    assert_eq!(rows[0]["yearClassification"].as_str(), Some("3rd Year"));
    assert_eq!(rows[0]["semester"].as_i64(), Some(1));
    assert_eq!(rows[0]["studentCount"].as_i64(), Some(0));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "databases.update",
        json!({
            "databaseId": database_id,
            "name": "TE Comps 2024-25",
            "branch": "Computer Eng.",
            "batch": "2021 - 2025",
            "yearClassification": "3rd Year",
            "semester": 2
        }),
    );

    let listed = request_ok(&mut stdin, &mut reader, "6", "databases.list", json!({}));
    let rows = listed["databases"].as_array().expect("databases");
    assert_eq!(rows[0]["name"].as_str(), Some("TE Comps 2024-25"));
    assert_eq!(rows[0]["semester"].as_i64(), Some(2));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "databases.delete",
        json!({ "databaseId": database_id }),
    );
    let listed = request_ok(&mut stdin, &mut reader, "8", "databases.list", json!({}));
    assert_eq!(listed["databases"].as_array().map(|a| a.len()), Some(0));

    let gone = request(
        &mut stdin,
        &mut reader,
        "9",
        "databases.delete",
        json!({ "databaseId": database_id }),
    );
    assert_eq!(gone["ok"].as_bool(), Some(false));
    assert_eq!(gone["error"]["code"].as_str(), Some("not_found"));

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn database_field_validation() {
    let workspace = temp_dir("marksheet-db-validation");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let bad = request(
        &mut stdin,
        &mut reader,
        "2",
        "databases.create",
        json!({
            "name": "  ",
            "branch": "Astrology",
            "batch": "2021-2025",
            "yearClassification": "5th Year",
            "semester": 3
        }),
    );
    assert_eq!(bad["ok"].as_bool(), Some(false));
    assert_eq!(bad["error"]["code"].as_str(), Some("validation_failed"));
    let errors: Vec<&str> = bad["error"]["details"]["errors"]
        .as_array()
        .expect("errors")
        .iter()
        .filter_map(|v| v.as_str())
        .collect();
    assert!(errors.contains(&"Database name is required"));
    assert!(errors.iter().any(|e| e.starts_with("Branch must be one of:")));
    assert!(errors.contains(&"Batch must match the pattern 20XX - 20XX with a four year gap"));
    assert!(errors
        .iter()
        .any(|e| e.starts_with("Year classification must be one of:")));
    assert!(errors.contains(&"Semester must be 1 or 2"));

    // Years must be four apart and separated by " - ".
    for batch in ["2021 - 2026", "2019 - 2023", "2021-2025", "21 - 25"] {
        let resp = request(
            &mut stdin,
            &mut reader,
            "3",
            "databases.create",
            json!({
                "name": "Batch check",
                "branch": "Electrical",
                "batch": batch,
                "yearClassification": "1st Year",
                "semester": 1
            }),
        );
        assert_eq!(
            resp["error"]["code"].as_str(),
            Some("validation_failed"),
            "batch {:?} should be rejected",
            batch
        );
    }

    let good = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "databases.create",
        json!({
            "name": "Batch check",
            "branch": "Electrical",
            "batch": "2022 - 2026",
            "yearClassification": "1st Year",
            "semester": 1
        }),
    );
    assert!(good["databaseId"].as_str().is_some());

    let missing = request(
        &mut stdin,
        &mut reader,
        "5",
        "databases.create",
        json!({ "name": "No branch" }),
    );
    assert_eq!(missing["error"]["code"].as_str(), Some("bad_params"));

    let _ = std::fs::remove_dir_all(workspace);
}
