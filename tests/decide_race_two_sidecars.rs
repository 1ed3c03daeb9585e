use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::{Arc, Barrier};
use std::time::{SystemTime, UNIX_EPOCH};

const TOKEN_SECRET: &str = "decide-race-secret-0123456789abcdefg";
const ADMIN_PASSWORD: &str = "race-admin-pw";

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

struct Sidecar {
    _child: Child,
    stdin: ChildStdin,
    reader: BufReader<ChildStdout>,
}

impl Sidecar {
    fn spawn() -> Self {
        let exe = env!("CARGO_BIN_EXE_exchanged");
        let mut child = Command::new(exe)
            .env_remove("EXCHANGED_WORKSPACE")
            .env("EXCHANGED_TOKEN_SECRET", TOKEN_SECRET)
            .env("EXCHANGED_ADMIN_PASSWORD", ADMIN_PASSWORD)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn exchanged");
        let stdin = child.stdin.take().expect("child stdin");
        let stdout = child.stdout.take().expect("child stdout");
        Self {
            _child: child,
            stdin,
            reader: BufReader::new(stdout),
        }
    }

    fn request(
        &mut self,
        id: &str,
        method: &str,
        token: Option<&str>,
        params: serde_json::Value,
    ) -> serde_json::Value {
        let payload = json!({ "id": id, "method": method, "params": params, "token": token });
        writeln!(self.stdin, "{}", payload).expect("write request");
        self.stdin.flush().expect("flush request");
        let mut line = String::new();
        self.reader.read_line(&mut line).expect("read response line");
        let value: serde_json::Value =
            serde_json::from_str(line.trim()).expect("parse response json");
        assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
        value
    }

    fn request_ok(
        &mut self,
        id: &str,
        method: &str,
        token: Option<&str>,
        params: serde_json::Value,
    ) -> serde_json::Value {
        let value = self.request(id, method, token, params);
        assert!(
            value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
            "{} failed: {}",
            method,
            value
        );
        value.get("result").cloned().unwrap_or_else(|| json!({}))
    }
}

#[test]
fn two_sidecars_racing_on_one_submission_yield_one_decision() {
    let workspace = temp_dir("exchanged-decide-race");
    let mut a = Sidecar::spawn();
    let mut b = Sidecar::spawn();
    for s in [&mut a, &mut b] {
        let _ = s.request_ok(
            "ws",
            "workspace.select",
            None,
            json!({ "path": workspace.to_string_lossy() }),
        );
    }

    let student = a
        .request_ok(
            "reg",
            "auth.register",
            None,
            json!({
                "email": "race@example.edu",
                "password": "student-pw-1",
                "studentNumber": "R1",
                "name": "Race Student",
                "nationality": "France",
                "homeUniversity": "Sorbonne",
                "exchangePeriod": "1 semester"
            }),
        )
        .get("token")
        .and_then(|v| v.as_str())
        .expect("student token")
        .to_string();
    let admin = a
        .request_ok(
            "adm",
            "auth.loginAdmin",
            None,
            json!({ "username": "admin", "password": ADMIN_PASSWORD }),
        )
        .get("token")
        .and_then(|v| v.as_str())
        .expect("admin token")
        .to_string();

    let mut ids = Vec::new();
    for round in 0..5 {
        let created = a.request_ok(
            &format!("sub-{}", round),
            "activityReports.submit",
            Some(&student),
            json!({ "title": format!("Report {}", round), "content": "Race me." }),
        );
        ids.push(
            created
                .get("submission")
                .and_then(|s| s.get("id"))
                .and_then(|v| v.as_i64())
                .expect("id"),
        );
    }

    let barrier = Arc::new(Barrier::new(2));
    let run = |mut sidecar: Sidecar, outcome: &'static str| {
        let barrier = Arc::clone(&barrier);
        let admin = admin.clone();
        let ids = ids.clone();
        std::thread::spawn(move || {
            let mut codes = Vec::new();
            for id in ids {
                barrier.wait();
                let resp = sidecar.request(
                    &format!("d-{}", id),
                    "submissions.decide",
                    Some(&admin),
                    json!({ "id": id, "outcome": outcome }),
                );
                let code = if resp.get("ok").and_then(|v| v.as_bool()) == Some(true) {
                    "ok".to_string()
                } else {
                    resp.get("error")
                        .and_then(|e| e.get("code"))
                        .and_then(|v| v.as_str())
                        .unwrap_or("")
                        .to_string()
                };
                codes.push(code);
            }
            (sidecar, codes)
        })
    };
    let ha = run(a, "approved");
    let hb = run(b, "rejected");
    let (mut a, codes_a) = ha.join().expect("thread a");
    let (_b, codes_b) = hb.join().expect("thread b");

    for (i, id) in ids.iter().enumerate() {
        let pair = [codes_a[i].as_str(), codes_b[i].as_str()];
        assert!(
            pair == ["ok", "already_decided"] || pair == ["already_decided", "ok"],
            "submission {}: {:?}",
            id,
            pair
        );
        let expected = if pair[0] == "ok" { "approved" } else { "rejected" };
        let stored = a.request_ok(
            &format!("get-{}", id),
            "submissions.get",
            Some(&admin),
            json!({ "id": id }),
        );
        assert_eq!(
            stored
                .get("submission")
                .and_then(|s| s.get("status"))
                .and_then(|v| v.as_str()),
            Some(expected)
        );
    }
}
