mod test_support;

use serde_json::json;
use test_support::{request, request_ok, spawn_sidecar, temp_dir};

const UNIT_SEM_HEADER: &str = "Seat Number,Roll No,Student Name,Gender,\
Subject1_UnitTest,Subject1_SemMarks,Subject2_UnitTest,Subject2_SemMarks,\
Subject3_UnitTest,Subject3_SemMarks,Subject4_UnitTest,Subject4_SemMarks,\
Subject5_UnitTest,Subject5_SemMarks,Total_CGPA";

fn seeded_database(
    stdin: &mut std::process::ChildStdin,
    reader: &mut std::io::BufReader<std::process::ChildStdout>,
    workspace: &std::path::Path,
) -> String {
    let _ = request_ok(
        stdin,
        reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let created = request_ok(
        stdin,
        reader,
        "db",
        "databases.create",
        json!({
            "name": "TE IT",
            "branch": "Information Technology",
            "batch": "2021 - 2025",
            "yearClassification": "3rd Year",
            "semester": 1
        }),
    );
    let database_id = created["databaseId"].as_str().expect("databaseId").to_string();

    // 480/550 = 87.27%, 75/550 = 13.64%, 220/550 = 40% exactly.
    let raw = format!(
        "{}\n{}\n{}\n{}",
        UNIT_SEM_HEADER,
        "123456,01,John Doe,Male,18,75,19,80,17,72,20,85,18,76,8.75",
        "234567,02,Alan Poe,Male,5,10,5,10,5,10,5,10,5,10,4.0",
        "345678,03,Mary Jane,Female,14,30,14,30,14,30,14,30,14,30,6.5",
    );
    let committed = request_ok(
        stdin,
        reader,
        "seed",
        "import.commit",
        json!({ "databaseId": database_id, "rawText": raw }),
    );
    assert_eq!(committed["inserted"].as_u64(), Some(3));
    database_id
}

#[test]
fn report_covers_pass_split_toppers_and_extremes() {
    let workspace = temp_dir("marksheet-analytics");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let database_id = seeded_database(&mut stdin, &mut reader, &workspace);

    let resp = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "analytics.database",
        json!({ "databaseId": database_id }),
    );
    assert_eq!(resp["database"]["name"].as_str(), Some("TE IT"));
    assert_eq!(resp["markScheme"].as_str(), Some("unit_sem"));

    let report = &resp["report"];
    assert_eq!(report["totalStudents"].as_u64(), Some(3));
    // A student sitting exactly on the threshold passes.
    assert_eq!(report["passedStudents"].as_u64(), Some(2));
    assert_eq!(report["failedStudents"].as_u64(), Some(1));
    assert_eq!(report["passRatePercent"].as_f64(), Some(66.67));
    assert_eq!(report["passThresholdPercent"].as_f64(), Some(40.0));
    assert_eq!(report["maxPossibleTotal"].as_f64(), Some(550.0));

    let avg = report["averageCgpa"].as_f64().expect("averageCgpa");
    assert!((avg - (8.75 + 4.0 + 6.5) / 3.0).abs() < 1e-9, "avg {}", avg);

    let toppers = report["toppers"].as_array().expect("toppers");
    assert_eq!(toppers.len(), 1);
    assert_eq!(toppers[0]["seatNumber"].as_i64(), Some(123456));
    assert_eq!(toppers[0]["totalCgpa"].as_f64(), Some(8.75));
    assert_eq!(toppers[0]["overallTotal"].as_f64(), Some(480.0));
    assert_eq!(toppers[0]["overallPercentage"].as_f64(), Some(87.27));

    assert_eq!(
        report["highestByCgpa"]["seatNumber"].as_i64(),
        Some(123456)
    );
    assert_eq!(report["lowestByCgpa"]["seatNumber"].as_i64(), Some(234567));
    assert_eq!(
        report["highestByTotal"]["seatNumber"].as_i64(),
        Some(123456)
    );
    assert_eq!(report["lowestByTotal"]["seatNumber"].as_i64(), Some(234567));

    let split = &report["genderSplit"];
    assert_eq!(split["male"]["count"].as_u64(), Some(2));
    assert_eq!(split["male"]["percent"].as_f64(), Some(66.67));
    assert_eq!(split["female"]["count"].as_u64(), Some(1));
    assert_eq!(split["female"]["percent"].as_f64(), Some(33.33));
    assert_eq!(split["other"]["count"].as_u64(), Some(0));
    assert_eq!(split["unset"]["count"].as_u64(), Some(0));

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn threshold_and_topper_limit_params() {
    let workspace = temp_dir("marksheet-analytics-params");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let database_id = seeded_database(&mut stdin, &mut reader, &workspace);

    let strict = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "analytics.database",
        json!({ "databaseId": database_id, "passThresholdPercent": 90.0 }),
    );
    assert_eq!(strict["report"]["passedStudents"].as_u64(), Some(0));
    assert_eq!(strict["report"]["failedStudents"].as_u64(), Some(3));
    assert_eq!(
        strict["report"]["passThresholdPercent"].as_f64(),
        Some(90.0)
    );

    let out_of_range = request(
        &mut stdin,
        &mut reader,
        "2",
        "analytics.database",
        json!({ "databaseId": database_id, "passThresholdPercent": 101.0 }),
    );
    assert_eq!(out_of_range["error"]["code"].as_str(), Some("bad_params"));

    let zero_limit = request(
        &mut stdin,
        &mut reader,
        "3",
        "analytics.database",
        json!({ "databaseId": database_id, "topperLimit": 0 }),
    );
    assert_eq!(zero_limit["error"]["code"].as_str(), Some("bad_params"));

    let missing = request(
        &mut stdin,
        &mut reader,
        "4",
        "analytics.database",
        json!({ "databaseId": "nope" }),
    );
    assert_eq!(missing["error"]["code"].as_str(), Some("not_found"));

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn tied_toppers_keep_insertion_order_and_cap() {
    let workspace = temp_dir("marksheet-analytics-ties");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let created = request_ok(
        &mut stdin,
        &mut reader,
        "db",
        "databases.create",
        json!({
            "name": "Tie Break",
            "branch": "Electrical",
            "batch": "2022 - 2026",
            "yearClassification": "1st Year",
            "semester": 2
        }),
    );
    let database_id = created["databaseId"].as_str().expect("databaseId").to_string();

    // Four students share the top pointer; the cap keeps the first three.
    let raw = format!(
        "{}\n{}\n{}\n{}\n{}\n{}",
        UNIT_SEM_HEADER,
        "111111,01,Lower One,Male,10,40,10,40,10,40,10,40,10,40,7.0",
        "222222,02,First Top,Male,12,50,12,50,12,50,12,50,12,50,9.5",
        "333333,03,Second Top,Female,13,55,13,55,13,55,13,55,13,55,9.5",
        "444444,04,Third Top,Male,14,60,14,60,14,60,14,60,14,60,9.5",
        "555555,05,Fourth Top,Female,15,65,15,65,15,65,15,65,15,65,9.5",
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "seed",
        "import.commit",
        json!({ "databaseId": database_id, "rawText": raw }),
    );

    let resp = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "analytics.database",
        json!({ "databaseId": database_id }),
    );
    let toppers = resp["report"]["toppers"].as_array().expect("toppers");
    let names: Vec<&str> = toppers
        .iter()
        .filter_map(|t| t["studentName"].as_str())
        .collect();
    assert_eq!(names, vec!["First Top", "Second Top", "Third Top"]);

    let raised = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "analytics.database",
        json!({ "databaseId": database_id, "topperLimit": 5 }),
    );
    let toppers = raised["report"]["toppers"].as_array().expect("toppers");
    assert_eq!(toppers.len(), 4);

    let _ = std::fs::remove_dir_all(workspace);
}
