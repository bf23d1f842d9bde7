use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_resultsd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .env_remove("RESULTSD_CONFIG")
        .spawn()
        .expect("spawn resultsd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn read_line(reader: &mut BufReader<ChildStdout>) -> serde_json::Value {
    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response");
    serde_json::from_str(line.trim()).expect("parse response json")
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

    let value = read_line(reader);
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    if value.get("ok").and_then(|v| v.as_bool()) == Some(false) {
        let code = value
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        assert_ne!(
            code, "not_implemented",
            "unexpected unknown method for {}",
            method
        );
    }
    value
}

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let health = request(&mut stdin, &mut reader, "1", "health", json!({}));
    assert_eq!(health["ok"], true);
    assert_eq!(health["result"]["defaultScheme"], "standard");
    assert!(health["result"]["startedAt"].as_str().is_some());

    let schemes = request(&mut stdin, &mut reader, "2", "grading.schemes", json!({}));
    let names: Vec<&str> = schemes["result"]["schemes"]
        .as_array()
        .expect("schemes")
        .iter()
        .filter_map(|s| s["name"].as_str())
        .collect();
    assert_eq!(names, vec!["standard", "raisedC"]);
    assert_eq!(schemes["result"]["bestSubjectCount"], 7);
    assert_eq!(schemes["result"]["rankPolicy"], "sequential");

    let grade = request(
        &mut stdin,
        &mut reader,
        "3",
        "grading.grade",
        json!({ "marks": 80 }),
    );
    assert_eq!(grade["result"]["grade"], "A");
    assert_eq!(grade["result"]["points"], 1);

    let classify = request(
        &mut stdin,
        &mut reader,
        "4",
        "grading.classify",
        json!({ "subjects": [] }),
    );
    assert_eq!(classify["result"]["division"], "-");

    let _ = request(
        &mut stdin,
        &mut reader,
        "5",
        "reports.cohort",
        json!({ "scores": [] }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "6",
        "reports.table",
        json!({ "scores": [] }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "7",
        "reports.notifications",
        json!({ "scores": [], "template": "{studentName}" }),
    );

    writeln!(
        stdin,
        "{}",
        json!({ "id": "8", "method": "nope.nothing", "params": {} })
    )
    .expect("write");
    stdin.flush().expect("flush");
    let unknown = read_line(&mut reader);
    assert_eq!(unknown["ok"], false);
    assert_eq!(unknown["error"]["code"], "not_implemented");

    writeln!(stdin, "{{not json").expect("write");
    stdin.flush().expect("flush");
    let bad = read_line(&mut reader);
    assert_eq!(bad["error"]["code"], "bad_json");

    drop(stdin);
    let _ = child.wait();
}
