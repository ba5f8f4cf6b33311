use serde_json::json;
use std::collections::HashSet;
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
    let exe = env!("CARGO_BIN_EXE_examseatd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn examseatd");
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
    serde_json::from_str(line.trim()).expect("parse response json")
}

fn result(resp: &serde_json::Value) -> &serde_json::Value {
    assert_eq!(
        resp.get("ok").and_then(|v| v.as_bool()),
        Some(true),
        "expected ok response, got {}",
        resp
    );
    resp.get("result").expect("result")
}

fn error_code(resp: &serde_json::Value) -> &str {
    assert_eq!(
        resp.get("ok").and_then(|v| v.as_bool()),
        Some(false),
        "expected error response, got {}",
        resp
    );
    resp.get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
        .expect("error code")
}

fn seat_tuples(room_result: &serde_json::Value) -> Vec<(u64, u64, u64, String)> {
    room_result
        .get("seats")
        .and_then(|v| v.as_array())
        .expect("seats")
        .iter()
        .map(|s| {
            (
                s.get("rollNumber").and_then(|v| v.as_u64()).expect("roll"),
                s.get("row").and_then(|v| v.as_u64()).expect("row"),
                s.get("bench").and_then(|v| v.as_u64()).expect("bench"),
                s.get("side").and_then(|v| v.as_str()).expect("side").to_string(),
            )
        })
        .collect()
}

#[test]
fn shared_classes_interleave_and_sections_continue() {
    let workspace = temp_dir("examseat-plan-flow");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let date = "2026-03-09";

    let _ = request(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let created = request(
        &mut stdin,
        &mut reader,
        "2",
        "rooms.create",
        json!({
            "name": "R1",
            "type": "XS",
            "rows": [
                { "rowNumber": 1, "benchCount": 3 },
                { "rowNumber": 2, "benchCount": 3 }
            ]
        }),
    );
    let room_id = result(&created)
        .get("roomId")
        .and_then(|v| v.as_str())
        .expect("roomId")
        .to_string();

    let mut id = 10;
    for roll in [101, 102, 103, 104, 105] {
        id += 1;
        let resp = request(
            &mut stdin,
            &mut reader,
            &id.to_string(),
            "students.enroll",
            json!({ "classNumber": 1, "section": "A", "rollNumber": roll }),
        );
        result(&resp);
    }
    for roll in [201, 202] {
        id += 1;
        let resp = request(
            &mut stdin,
            &mut reader,
            &id.to_string(),
            "students.enroll",
            json!({ "classNumber": 2, "section": "A", "rollNumber": roll }),
        );
        result(&resp);
    }
    let resp = request(
        &mut stdin,
        &mut reader,
        "20",
        "students.enroll",
        json!({ "classNumber": 1, "section": "B", "rollNumber": 106 }),
    );
    result(&resp);

    for (rid, class) in [("21", 1), ("22", 2)] {
        let resp = request(
            &mut stdin,
            &mut reader,
            rid,
            "exams.schedule",
            json!({
                "examType": "final",
                "examDate": date,
                "classNumber": class,
                "benchCapacity": 2
            }),
        );
        result(&resp);
    }

    // Class 1 section A fills the left sides row-major from the first bench.
    let resp = request(
        &mut stdin,
        &mut reader,
        "30",
        "seating.generatePlan",
        json!({ "classNumber": 1, "section": "A", "examType": "final", "examDate": date }),
    );
    let res = result(&resp);
    assert_eq!(res.get("side").and_then(|v| v.as_str()), Some("left"));
    let rooms = res.get("rooms").and_then(|v| v.as_array()).expect("rooms");
    assert_eq!(rooms.len(), 1);
    assert_eq!(
        seat_tuples(&rooms[0]),
        vec![
            (101, 1, 1, "left".to_string()),
            (102, 1, 2, "left".to_string()),
            (103, 1, 3, "left".to_string()),
            (104, 2, 1, "left".to_string()),
            (105, 2, 2, "left".to_string()),
        ]
    );

    // Class 2 is a fresh (class, side) pair: it starts from the first
    // bench on the right sides, interleaving with class 1.
    let resp = request(
        &mut stdin,
        &mut reader,
        "31",
        "seating.generatePlan",
        json!({ "classNumber": 2, "section": "A", "examType": "final", "examDate": date }),
    );
    let res = result(&resp);
    assert_eq!(res.get("side").and_then(|v| v.as_str()), Some("right"));
    let rooms = res.get("rooms").and_then(|v| v.as_array()).expect("rooms");
    assert_eq!(
        seat_tuples(&rooms[0]),
        vec![
            (201, 1, 1, "right".to_string()),
            (202, 1, 2, "right".to_string()),
        ]
    );

    // Class 1 section B resumes after the class's own last left seat.
    let resp = request(
        &mut stdin,
        &mut reader,
        "32",
        "seating.generatePlan",
        json!({ "classNumber": 1, "section": "B", "examType": "final", "examDate": date }),
    );
    let res = result(&resp);
    let rooms = res.get("rooms").and_then(|v| v.as_array()).expect("rooms");
    assert_eq!(
        seat_tuples(&rooms[0]),
        vec![(106, 2, 3, "left".to_string())]
    );

    // Replaying an already-seated section is refused, not re-seated.
    let resp = request(
        &mut stdin,
        &mut reader,
        "33",
        "seating.generatePlan",
        json!({ "classNumber": 1, "section": "A", "examType": "final", "examDate": date }),
    );
    assert_eq!(error_code(&resp), "already_seated");

    // The committed plan holds all eight seats with no slot taken twice.
    let resp = request(
        &mut stdin,
        &mut reader,
        "34",
        "seating.get",
        json!({ "roomId": room_id, "examDate": date }),
    );
    let plan = result(&resp).get("plan").expect("plan");
    let entries = plan.get("entries").and_then(|v| v.as_array()).expect("entries");
    assert_eq!(entries.len(), 8);
    let mut slots: HashSet<(u64, u64, String)> = HashSet::new();
    for e in entries {
        let slot = (
            e.get("row").and_then(|v| v.as_u64()).expect("row"),
            e.get("bench").and_then(|v| v.as_u64()).expect("bench"),
            e.get("side").and_then(|v| v.as_str()).expect("side").to_string(),
        );
        assert!(slots.insert(slot), "slot assigned twice: {}", e);
    }
    let contributors = plan
        .get("contributors")
        .and_then(|v| v.as_array())
        .expect("contributors");
    assert_eq!(contributors.len(), 3);

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn conflict_in_a_later_room_commits_nothing() {
    let workspace = temp_dir("examseat-plan-conflict");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let date = "2026-03-11";

    let _ = request(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let created = request(
        &mut stdin,
        &mut reader,
        "2",
        "rooms.create",
        json!({
            "name": "A-S",
            "type": "S",
            "rows": [{ "rowNumber": 1, "benchCount": 1 }]
        }),
    );
    let small_room_id = result(&created)
        .get("roomId")
        .and_then(|v| v.as_str())
        .expect("roomId")
        .to_string();
    let resp = request(
        &mut stdin,
        &mut reader,
        "3",
        "rooms.create",
        json!({
            "name": "Z-All",
            "type": "ALL",
            "rows": [{ "rowNumber": 1, "benchCount": 3 }]
        }),
    );
    result(&resp);

    let mut id = 10;
    for roll in [101, 102, 103] {
        id += 1;
        let resp = request(
            &mut stdin,
            &mut reader,
            &id.to_string(),
            "students.enroll",
            json!({ "classNumber": 1, "section": "A", "rollNumber": roll }),
        );
        result(&resp);
    }
    for roll in [301, 302, 303] {
        id += 1;
        let resp = request(
            &mut stdin,
            &mut reader,
            &id.to_string(),
            "students.enroll",
            json!({ "classNumber": 3, "section": "A", "rollNumber": roll }),
        );
        result(&resp);
    }
    for (rid, class) in [("20", 1), ("21", 3)] {
        let resp = request(
            &mut stdin,
            &mut reader,
            rid,
            "exams.schedule",
            json!({
                "examType": "final",
                "examDate": date,
                "classNumber": class,
                "benchCapacity": 1
            }),
        );
        result(&resp);
    }

    // Class 1 takes the shared room's left benches.
    let resp = request(
        &mut stdin,
        &mut reader,
        "30",
        "seating.generatePlan",
        json!({ "classNumber": 1, "section": "A", "examType": "final", "examDate": date }),
    );
    result(&resp);

    // Class 3 also sits left: its first room accepts one student, then the
    // shared room rejects the rest.
    let resp = request(
        &mut stdin,
        &mut reader,
        "31",
        "seating.generatePlan",
        json!({ "classNumber": 3, "section": "A", "examType": "final", "examDate": date }),
    );
    assert_eq!(error_code(&resp), "seating_conflict");
    let conflicts = resp
        .get("error")
        .and_then(|e| e.get("details"))
        .and_then(|d| d.get("conflicts"))
        .and_then(|v| v.as_array())
        .expect("conflicts");
    assert_eq!(conflicts.len(), 2);
    assert_eq!(
        conflicts[0].get("existingOccupant").and_then(|v| v.as_u64()),
        Some(101)
    );
    assert_eq!(
        conflicts[0].get("incomingOccupant").and_then(|v| v.as_u64()),
        Some(302)
    );

    // The seat placed in the first room did not survive the rejection.
    let resp = request(
        &mut stdin,
        &mut reader,
        "32",
        "seating.get",
        json!({ "roomId": small_room_id, "examDate": date }),
    );
    assert!(result(&resp)
        .get("plan")
        .map(|v| v.is_null())
        .unwrap_or(false));

    // The section is not recorded as seated, so a retry reports the same
    // conflict instead of refusing the section outright.
    let resp = request(
        &mut stdin,
        &mut reader,
        "33",
        "seating.generatePlan",
        json!({ "classNumber": 3, "section": "A", "examType": "final", "examDate": date }),
    );
    assert_eq!(error_code(&resp), "seating_conflict");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn under_assignment_spills_into_the_next_room() {
    let workspace = temp_dir("examseat-plan-spill");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let date = "2026-03-10";

    let _ = request(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let resp = request(
        &mut stdin,
        &mut reader,
        "2",
        "rooms.create",
        json!({
            "name": "A1",
            "type": "XS",
            "rows": [{ "rowNumber": 1, "benchCount": 2 }]
        }),
    );
    result(&resp);
    let resp = request(
        &mut stdin,
        &mut reader,
        "3",
        "rooms.create",
        json!({
            "name": "A2",
            "type": "XS",
            "rows": [
                { "rowNumber": 1, "benchCount": 2 },
                { "rowNumber": 2, "benchCount": 2 }
            ]
        }),
    );
    result(&resp);

    let mut id = 10;
    for roll in [101, 102, 103, 104, 105] {
        id += 1;
        let resp = request(
            &mut stdin,
            &mut reader,
            &id.to_string(),
            "students.enroll",
            json!({ "classNumber": 1, "section": "A", "rollNumber": roll }),
        );
        result(&resp);
    }

    let resp = request(
        &mut stdin,
        &mut reader,
        "20",
        "exams.schedule",
        json!({
            "examType": "final",
            "examDate": date,
            "classNumber": 1,
            "benchCapacity": 1
        }),
    );
    result(&resp);

    let resp = request(
        &mut stdin,
        &mut reader,
        "21",
        "seating.generatePlan",
        json!({ "classNumber": 1, "section": "A", "examType": "final", "examDate": date }),
    );
    let res = result(&resp);
    let rooms = res.get("rooms").and_then(|v| v.as_array()).expect("rooms");
    assert_eq!(rooms.len(), 2);
    assert_eq!(
        rooms[0].get("roomName").and_then(|v| v.as_str()),
        Some("A1")
    );
    assert_eq!(
        seat_tuples(&rooms[0])
            .iter()
            .map(|s| s.0)
            .collect::<Vec<_>>(),
        vec![101, 102]
    );
    assert_eq!(
        seat_tuples(&rooms[1]),
        vec![
            (103, 1, 1, "left".to_string()),
            (104, 1, 2, "left".to_string()),
            (105, 2, 1, "left".to_string()),
        ]
    );

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
