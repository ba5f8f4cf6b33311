use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{
    db_err, get_exam_date, get_required_str, get_required_u32, load_active_rooms, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::seating::{self, RoomSeatPlan, SeatAssignment, Side, SizeBucket};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

fn load_plan(
    conn: &Connection,
    room_id: &str,
    exam_date: &str,
) -> Result<Option<(String, RoomSeatPlan)>, HandlerErr> {
    let plan_id: Option<String> = conn
        .query_row(
            "SELECT id FROM seat_plans WHERE room_id = ? AND exam_date = ? AND active = 1",
            (room_id, exam_date),
            |r| r.get(0),
        )
        .optional()
        .map_err(db_err)?;
    let Some(plan_id) = plan_id else {
        return Ok(None);
    };

    let mut stmt = conn
        .prepare(
            "SELECT roll_number, class_label, section_label, row_number, bench_number, side
             FROM seat_plan_entries
             WHERE plan_id = ?
             ORDER BY row_number, bench_number, side",
        )
        .map_err(db_err)?;
    let assignments = stmt
        .query_map([&plan_id], |r| {
            Ok((
                r.get::<_, i64>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, i64>(3)?,
                r.get::<_, i64>(4)?,
                r.get::<_, String>(5)?,
            ))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(db_err)?;

    let mut plan = RoomSeatPlan::default();
    for (roll, class_label, section_label, row, bench, side_raw) in assignments {
        let side = Side::parse(&side_raw).ok_or_else(|| {
            HandlerErr::new("db_query_failed", format!("unknown side value {}", side_raw))
        })?;
        plan.assignments.push(SeatAssignment {
            roll_number: roll as u32,
            class_label,
            section_label,
            row: row as u32,
            bench: bench as u32,
            side,
        });
    }

    let mut stmt = conn
        .prepare(
            "SELECT class_label, section_label FROM seat_plan_contributors
             WHERE plan_id = ? ORDER BY class_label, section_label",
        )
        .map_err(db_err)?;
    let contributors = stmt
        .query_map([&plan_id], |r| {
            Ok(seating::Contributor {
                class_label: r.get(0)?,
                section_label: r.get(1)?,
            })
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(db_err)?;
    plan.contributors = contributors;

    Ok(Some((plan_id, plan)))
}

fn persist_entries(
    conn: &Connection,
    room_id: &str,
    exam_date: &str,
    plan_id: Option<String>,
    entries: &[SeatAssignment],
) -> Result<String, HandlerErr> {
    let plan_id = match plan_id {
        Some(id) => id,
        None => {
            let id = Uuid::new_v4().to_string();
            conn.execute(
                "INSERT INTO seat_plans(id, room_id, exam_date, active) VALUES(?, ?, ?, 1)",
                (&id, room_id, exam_date),
            )
            .map_err(db_err)?;
            id
        }
    };
    for entry in entries {
        conn.execute(
            "INSERT INTO seat_plan_entries(
                plan_id, roll_number, class_label, section_label,
                row_number, bench_number, side)
             VALUES(?, ?, ?, ?, ?, ?, ?)",
            (
                &plan_id,
                entry.roll_number as i64,
                &entry.class_label,
                &entry.section_label,
                entry.row as i64,
                entry.bench as i64,
                entry.side.as_str(),
            ),
        )
        .map_err(db_err)?;
        conn.execute(
            "INSERT INTO seat_plan_contributors(plan_id, class_label, section_label)
             VALUES(?, ?, ?)
             ON CONFLICT(plan_id, class_label, section_label) DO NOTHING",
            (&plan_id, &entry.class_label, &entry.section_label),
        )
        .map_err(db_err)?;
    }
    Ok(plan_id)
}

/// Seat one class section for an admitted exam: order its active roll
/// numbers ascending, then walk the class's room pool in stable order,
/// resuming each room from the section's class+side high-water mark and
/// spilling the remainder into the next room. The scheduling gate already
/// vouched for total capacity; students left over after the last room mean
/// the pool shrank since admission.
fn seating_generate_plan(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let class_number = get_required_u32(params, "classNumber")?;
    let section = get_required_str(params, "section")?;
    let exam_type = get_required_str(params, "examType")?;
    let exam_date = get_exam_date(params, "examDate")?;

    let admitted = conn
        .query_row(
            "SELECT 1 FROM exams
             WHERE exam_type = ? AND exam_date = ? AND class_number = ? AND active = 1",
            (&exam_type, &exam_date, class_number as i64),
            |r| r.get::<_, i64>(0),
        )
        .optional()
        .map_err(db_err)?
        .is_some();
    if !admitted {
        return Err(HandlerErr::new(
            "not_found",
            "no active exam scheduled for this class, type and date",
        ));
    }

    let side = seating::position_in_room(class_number)?;
    let bucket = seating::size_bucket(class_number)?;
    let class_label = class_number.to_string();

    let mut stmt = conn
        .prepare(
            "SELECT roll_number FROM students
             WHERE class_number = ? AND section = ? AND active = 1
             ORDER BY roll_number",
        )
        .map_err(db_err)?;
    let rolls: Vec<u32> = stmt
        .query_map((class_number as i64, &section), |r| r.get::<_, i64>(0))
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(db_err)?
        .into_iter()
        .map(|v| v as u32)
        .collect();
    if rolls.is_empty() {
        return Err(HandlerErr::new(
            "not_found",
            "no active students in this class section",
        ));
    }

    // A section that already fed this date's plans must not be replayed;
    // its students would be issued fresh seats past the resume point.
    let already_seated = conn
        .query_row(
            "SELECT 1 FROM seat_plan_contributors c
             JOIN seat_plans p ON p.id = c.plan_id
             WHERE p.exam_date = ? AND p.active = 1
               AND c.class_label = ? AND c.section_label = ?",
            (&exam_date, &class_label, &section),
            |r| r.get::<_, i64>(0),
        )
        .optional()
        .map_err(db_err)?
        .is_some();
    if already_seated {
        return Err(HandlerErr::new(
            "already_seated",
            "this class section already has seats for this exam date",
        ));
    }

    let rooms = load_active_rooms(conn)?;
    let mut remaining: &[u32] = &rolls;
    let mut placed = Vec::new();

    // Every room commits together: a rejection in a later room must not
    // leave earlier rooms' seats durable behind the replay guard.
    let tx = conn.unchecked_transaction().map_err(db_err)?;
    for room in &rooms {
        if remaining.is_empty() {
            break;
        }
        let room_bucket = SizeBucket::parse(&room.room_type).ok_or_else(|| {
            HandlerErr::new(
                "invalid_room_type",
                format!("room {} has unknown type {}", room.name, room.room_type),
            )
        })?;
        if room_bucket != bucket && room_bucket != SizeBucket::All {
            continue;
        }

        let existing = load_plan(&tx, &room.id, &exam_date)?;
        let (plan_id, plan) = match existing {
            Some((id, plan)) => (Some(id), plan),
            None => (None, RoomSeatPlan::default()),
        };

        let resume = seating::resume_point(&plan, &class_label, side);
        let entries = seating::generate(&room.layout, remaining, side, &class_label, &section, resume);
        if entries.is_empty() {
            continue;
        }
        seating::merge(&plan, &entries)?;
        let plan_id = persist_entries(&tx, &room.id, &exam_date, plan_id, &entries)?;

        remaining = &remaining[entries.len()..];
        let seats: Vec<serde_json::Value> = entries
            .iter()
            .map(|e| {
                json!({
                    "rollNumber": e.roll_number,
                    "row": e.row,
                    "bench": e.bench,
                    "side": e.side.as_str()
                })
            })
            .collect();
        placed.push(json!({
            "roomId": room.id,
            "roomName": room.name,
            "planId": plan_id,
            "seats": seats
        }));
    }

    if !remaining.is_empty() {
        // Dropping the transaction rolls back whatever was already placed.
        return Err(HandlerErr {
            code: "insufficient_capacity",
            message: format!(
                "{} student(s) could not be seated in the available rooms",
                remaining.len()
            ),
            details: Some(json!({
                "unassignedCount": remaining.len(),
                "rollNumbers": remaining
            })),
        });
    }
    tx.commit().map_err(db_err)?;

    Ok(json!({
        "side": side.as_str(),
        "totalAssigned": rolls.len(),
        "rooms": placed
    }))
}

fn seating_get(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let room_id = get_required_str(params, "roomId")?;
    let exam_date = get_exam_date(params, "examDate")?;

    let Some((plan_id, plan)) = load_plan(conn, &room_id, &exam_date)? else {
        return Ok(json!({ "plan": serde_json::Value::Null }));
    };

    let entries: Vec<serde_json::Value> = plan
        .assignments
        .iter()
        .map(|a| {
            json!({
                "rollNumber": a.roll_number,
                "classLabel": a.class_label,
                "sectionLabel": a.section_label,
                "row": a.row,
                "bench": a.bench,
                "side": a.side.as_str()
            })
        })
        .collect();
    let contributors: Vec<serde_json::Value> = plan
        .contributors
        .iter()
        .map(|c| json!({ "classLabel": c.class_label, "sectionLabel": c.section_label }))
        .collect();

    Ok(json!({
        "plan": {
            "planId": plan_id,
            "roomId": room_id,
            "examDate": exam_date,
            "entries": entries,
            "contributors": contributors
        }
    }))
}

fn with_db(
    state: &mut AppState,
    req: &Request,
    f: impl FnOnce(&Connection, &serde_json::Value) -> Result<serde_json::Value, HandlerErr>,
) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match f(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "seating.generatePlan" => Some(with_db(state, req, seating_generate_plan)),
        "seating.get" => Some(with_db(state, req, seating_get)),
        _ => None,
    }
}
