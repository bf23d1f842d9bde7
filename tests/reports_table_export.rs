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

fn request_ok(
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
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

#[test]
fn table_export_writes_csv_matching_rows() {
    let dir = tempfile::tempdir().expect("temp dir");
    let out = dir.path().join("exports/form4-terminal.csv");

    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let res = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "reports.table",
        json!({
            "outPath": out.to_string_lossy(),
            "roster": [
                { "studentId": "s1", "displayName": "Kimaro, \"Jo\"", "rollNumber": "7" },
                { "studentId": "s2", "displayName": "Lyimo, Ann", "rollNumber": "8" }
            ],
            "scores": [
                { "studentId": "s1", "subjectId": "hist", "marksObtained": 30 },
                { "studentId": "s2", "subjectId": "hist", "marksObtained": 76 },
                { "studentId": "s2", "subjectId": "geo", "marksObtained": 66 }
            ]
        }),
    );

    let columns: Vec<&str> = res["columns"]
        .as_array()
        .expect("columns")
        .iter()
        .filter_map(|c| c.as_str())
        .collect();
    assert_eq!(&columns[4..6], &["hist", "geo"]);
    // Neither student has a division, so both keep roster order.
    assert_eq!(res["rows"][0][2], "Kimaro, \"Jo\"");
    assert_eq!(res["rows"][0][5], "-");
    assert_eq!(res["rows"][1][2], "Lyimo, Ann");
    assert_eq!(res["rows"][1][5], "66");

    let written = std::fs::read_to_string(&out).expect("csv written");
    assert_eq!(written, res["csv"].as_str().expect("csv"));
    let lines: Vec<&str> = written.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("Rank,Roll No,Student,Sex,hist,geo,Marks"));
    assert!(lines[1].contains("\"Kimaro, \"\"Jo\"\"\""));

    drop(stdin);
    let _ = child.wait();
}
