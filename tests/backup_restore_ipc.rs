use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_studiod");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn studiod");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown error")
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn error_code(value: &serde_json::Value) -> Option<&str> {
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
}

#[test]
fn bundle_backup_restores_exact_state_and_keeps_session() {
    let workspace = temp_dir("studiod-backup-ipc");
    let bundle = workspace.join("exports").join("studio-backup.zip");
    let plain = workspace.join("exports").join("studio-backup.json");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "attendance.mark",
        json!({ "record": { "classId": "cls_past_1", "studentId": "stu_3", "present": true } }),
    );
    let before = request_ok(&mut stdin, &mut reader, "3", "state.get", json!({}));

    let written = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "backup.download",
        json!({ "outPath": bundle.to_string_lossy(), "bundle": true }),
    );
    assert_eq!(written["bundleFormat"], json!("studio-backup-v1"));
    assert_eq!(written["sha256"].as_str().map(str::len), Some(64));
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "backup.download",
        json!({ "outPath": plain.to_string_lossy() }),
    );

    // Diverge, then sign in so the session differs from the backup's.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "students.add",
        json!({ "student": { "name": "Late Joiner", "active": true } }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "auth.login",
        json!({ "email": "sowbhakyarajabojan@gmail.com", "password": "admin" }),
    );

    let restored = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "backup.restore",
        json!({ "inPath": bundle.to_string_lossy() }),
    );
    assert_eq!(restored["students"], json!(3));
    assert_eq!(restored["bundleFormatDetected"], json!("studio-backup-v1"));

    let mut after = request_ok(&mut stdin, &mut reader, "9", "state.get", json!({}));
    assert_eq!(after["currentUser"]["role"], json!("HEAD_TEACHER"));
    after["currentUser"] = before["currentUser"].clone();
    assert_eq!(after, before);

    let from_plain = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "backup.restore",
        json!({ "inPath": plain.to_string_lossy() }),
    );
    assert_eq!(from_plain["bundleFormatDetected"], json!("plain-json"));

    let broken = workspace.join("broken.json");
    std::fs::write(&broken, r#"{"students": []}"#).expect("write broken backup");
    let rejected = request(
        &mut stdin,
        &mut reader,
        "11",
        "backup.restore",
        json!({ "inPath": broken.to_string_lossy() }),
    );
    assert_eq!(error_code(&rejected), Some("invalid_backup"));
    let missing = request(
        &mut stdin,
        &mut reader,
        "12",
        "backup.restore",
        json!({ "inPath": workspace.join("nope.json").to_string_lossy() }),
    );
    assert_eq!(error_code(&missing), Some("not_found"));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn clear_all_keeps_leads_reference_data_and_session() {
    let workspace = temp_dir("studiod-clear-all");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "auth.addUser",
        json!({ "account": { "email": "guest.teacher@example.com", "password": "secret1", "name": "Guest", "role": "TEACHER" } }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "auth.login",
        json!({ "email": "guest.teacher@example.com", "password": "secret1" }),
    );

    let summary = request_ok(&mut stdin, &mut reader, "4", "system.clearAll", json!({}));
    assert_eq!(summary["accountsKept"], json!(3));
    assert_eq!(summary["accountsRemoved"], json!(3));

    let state = request_ok(&mut stdin, &mut reader, "5", "state.get", json!({}));
    for key in [
        "students",
        "schedule",
        "attendance",
        "fees",
        "reminders",
        "events",
        "announcements",
        "progressReports",
    ] {
        assert_eq!(state[key], json!([]), "{} not cleared", key);
    }
    assert_eq!(state["categories"].as_array().map(Vec::len), Some(3));
    assert_eq!(state["locations"].as_array().map(Vec::len), Some(3));
    assert_eq!(state["currentUser"]["email"], json!("guest.teacher@example.com"));
    let mut emails: Vec<String> = state["userAccounts"]
        .as_array()
        .expect("accounts")
        .iter()
        .filter_map(|a| a["email"].as_str().map(str::to_string))
        .collect();
    emails.sort();
    assert_eq!(
        emails,
        vec![
            "guest.teacher@example.com".to_string(),
            "sowbhakyarajabojan@gmail.com".to_string(),
            "vinovator@gmail.com".to_string(),
        ]
    );

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
