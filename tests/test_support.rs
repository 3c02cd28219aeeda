use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

#[allow(dead_code)]
pub fn temp_dir(prefix: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock")
        .as_nanos();
    let dir = std::env::temp_dir().join(format!("{}-{}", prefix, nanos));
    std::fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

#[allow(dead_code)]
pub fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let mut child = Command::new(env!("CARGO_BIN_EXE_marksheetd"))
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn marksheetd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

#[allow(dead_code)]
pub fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let line = json!({ "id": id, "method": method, "params": params }).to_string();
    writeln!(stdin, "{}", line).expect("write request");
    stdin.flush().expect("flush request");
    let mut resp_line = String::new();
    reader.read_line(&mut resp_line).expect("read response");
    serde_json::from_str(&resp_line).expect("parse response")
}

#[allow(dead_code)]
pub fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let resp = request(stdin, reader, id, method, params);
    assert_eq!(
        resp["ok"].as_bool(),
        Some(true),
        "request {} ({}) failed: {}",
        id,
        method,
        resp
    );
    resp["result"].clone()
}
