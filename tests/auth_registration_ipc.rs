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
fn registration_requires_known_email_and_matching_dob() {
    let workspace = temp_dir("studiod-auth-register");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let added = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "students.add",
        json!({ "student": {
            "name": "Meera Iyer",
            "email": "meera@example.com",
            "dob": "2016-02-02",
            "active": true
        } }),
    );
    let meera_id = added["id"].as_str().expect("generated id").to_string();
    assert!(!meera_id.is_empty());

    let stranger = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "auth.register",
        json!({ "account": { "email": "nobody@example.com", "password": "secret1", "name": "Nobody" }, "dob": "2016-02-02" }),
    );
    assert_eq!(stranger["success"], json!(false));

    let wrong_dob = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "auth.register",
        json!({ "account": { "email": "meera@example.com", "password": "secret1", "name": "Meera" }, "dob": "2000-01-01" }),
    );
    assert_eq!(wrong_dob["success"], json!(false));

    let short = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "auth.register",
        json!({ "account": { "email": "meera@example.com", "password": "123", "name": "Meera" }, "dob": "2016-02-02" }),
    );
    assert_eq!(short["success"], json!(false));

    let ok = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "auth.register",
        json!({ "account": { "email": "Meera@Example.com", "password": "secret1", "name": "Meera", "role": "ADMIN" }, "dob": "2016-02-02" }),
    );
    assert_eq!(ok["success"], json!(true), "{}", ok["message"]);

    let dup = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "auth.register",
        json!({ "account": { "email": "meera@example.com", "password": "secret1", "name": "Meera" }, "dob": "2016-02-02" }),
    );
    assert_eq!(dup["success"], json!(false));

    let login = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "auth.login",
        json!({ "email": "MEERA@example.com", "password": "secret1" }),
    );
    assert_eq!(login["success"], json!(true));
    assert_eq!(login["user"]["role"], json!("STUDENT"));
    assert_eq!(login["user"]["studentIds"], json!([meera_id]));

    let session = request_ok(&mut stdin, &mut reader, "9", "auth.session", json!({}));
    assert_eq!(session["user"]["email"], json!("meera@example.com"));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn email_change_moves_account_and_siblings() {
    let workspace = temp_dir("studiod-auth-email");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    // A sibling sharing Ananya's family email.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "students.add",
        json!({ "student": { "id": "stu_sib", "name": "Anjali Krishna", "email": "ANANYA@example.com", "active": true } }),
    );

    let taken = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "auth.updateEmail",
        json!({ "oldEmail": "ananya@example.com", "newEmail": "priya@example.com" }),
    );
    assert_eq!(taken["success"], json!(false));

    let moved = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "auth.updateEmail",
        json!({ "oldEmail": "ananya@example.com", "newEmail": "krishna.family@example.com" }),
    );
    assert_eq!(moved["success"], json!(true));

    let state = request_ok(&mut stdin, &mut reader, "5", "state.get", json!({}));
    let students = state["students"].as_array().expect("students");
    for id in ["stu_1", "stu_sib"] {
        let s = students
            .iter()
            .find(|s| s["id"] == json!(id))
            .expect("student present");
        assert_eq!(s["email"], json!("krishna.family@example.com"));
    }
    let accounts = state["userAccounts"].as_array().expect("accounts");
    assert!(accounts.iter().any(|a| a["email"] == json!("krishna.family@example.com")));
    assert!(!accounts.iter().any(|a| a["email"] == json!("ananya@example.com")));

    let old_login = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "auth.login",
        json!({ "email": "ananya@example.com", "password": "password123" }),
    );
    assert_eq!(old_login["success"], json!(false));
    let new_login = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "auth.login",
        json!({ "email": "krishna.family@example.com", "password": "password123" }),
    );
    assert_eq!(new_login["user"]["studentIds"], json!(["stu_1", "stu_sib"]));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "auth.resetPassword",
        json!({ "email": "krishna.family@example.com", "newPassword": "brand-new" }),
    );
    let relogin = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "auth.login",
        json!({ "email": "krishna.family@example.com", "password": "brand-new" }),
    );
    assert_eq!(relogin["success"], json!(true));

    let missing = request(
        &mut stdin,
        &mut reader,
        "10",
        "auth.resetPassword",
        json!({ "email": "ghost@example.com" }),
    );
    assert_eq!(error_code(&missing), Some("not_found"));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
