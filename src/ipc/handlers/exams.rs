use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{
    db_err, get_exam_date, get_required_str, get_required_u32, load_active_rooms, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::seating::{self, RoomInfo, SiblingExam, SizeBucket};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

fn count_active_students(conn: &Connection, class_number: u32) -> Result<u32, HandlerErr> {
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM students WHERE class_number = ? AND active = 1",
            [class_number as i64],
            |r| r.get(0),
        )
        .map_err(db_err)?;
    Ok(count as u32)
}

fn room_infos(conn: &Connection) -> Result<Vec<RoomInfo>, HandlerErr> {
    let rooms = load_active_rooms(conn)?;
    let mut infos = Vec::with_capacity(rooms.len());
    for room in rooms {
        let bucket = SizeBucket::parse(&room.room_type).ok_or_else(|| {
            HandlerErr::new(
                "invalid_room_type",
                format!("room {} has unknown type {}", room.name, room.room_type),
            )
        })?;
        infos.push(RoomInfo {
            room_id: room.id,
            bucket,
            layout: room.layout,
        });
    }
    Ok(infos)
}

/// Exams already admitted for the other classes of the shared group on the
/// same type+date, with their committed bench capacity and active head
/// count. Input to the occupied-capacity check.
fn sibling_exams(
    conn: &Connection,
    class_number: u32,
    exam_type: &str,
    exam_date: &str,
) -> Result<Vec<SiblingExam>, HandlerErr> {
    let group = seating::shared_group(class_number)?;
    let mut siblings = Vec::new();
    for &other in group {
        if other == class_number {
            continue;
        }
        let committed: Option<i64> = conn
            .query_row(
                "SELECT bench_capacity FROM exams
                 WHERE exam_type = ? AND exam_date = ? AND class_number = ? AND active = 1",
                (exam_type, exam_date, other as i64),
                |r| r.get(0),
            )
            .optional()
            .map_err(db_err)?;
        if let Some(bench_capacity) = committed {
            siblings.push(SiblingExam {
                class_number: other,
                bench_capacity: bench_capacity as u32,
                student_count: count_active_students(conn, other)?,
            });
        }
    }
    Ok(siblings)
}

/// The scheduling gate: bench-capacity sanity, then supply vs demand
/// across the class's room pool, counting seats already committed to
/// sibling classes. Only an admitted request is persisted.
fn exams_schedule(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let exam_type = get_required_str(params, "examType")?;
    let exam_date = get_exam_date(params, "examDate")?;
    let class_number = get_required_u32(params, "classNumber")?;
    let bench_capacity = get_required_u32(params, "benchCapacity")?;
    if bench_capacity == 0 {
        return Err(HandlerErr::new("bad_params", "benchCapacity must be at least 1"));
    }
    seating::check_bench_capacity(class_number, bench_capacity)?;

    let already = conn
        .query_row(
            "SELECT 1 FROM exams
             WHERE exam_type = ? AND exam_date = ? AND class_number = ? AND active = 1",
            (&exam_type, &exam_date, class_number as i64),
            |r| r.get::<_, i64>(0),
        )
        .optional()
        .map_err(db_err)?
        .is_some();
    if already {
        return Err(HandlerErr::new(
            "already_scheduled",
            "an active exam already exists for this class, type and date",
        ));
    }

    let bucket = seating::size_bucket(class_number)?;
    let rooms = room_infos(conn)?;
    let room_ids: Vec<&str> = seating::matching_rooms(bucket, &rooms)
        .iter()
        .map(|r| r.room_id.as_str())
        .collect();
    let total_benches = seating::total_capacity(bucket, &rooms);

    let siblings = sibling_exams(conn, class_number, &exam_type, &exam_date)?;
    let occupied = seating::occupied_capacity(class_number, bench_capacity, &siblings)?;
    let student_count = count_active_students(conn, class_number)?;
    seating::can_schedule(total_benches, bench_capacity, occupied, student_count)?;

    let exam_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO exams(id, exam_type, exam_date, class_number, bench_capacity, active)
         VALUES(?, ?, ?, ?, ?, 1)",
        (
            &exam_id,
            &exam_type,
            &exam_date,
            class_number as i64,
            bench_capacity as i64,
        ),
    )
    .map_err(db_err)?;

    Ok(json!({
        "examId": exam_id,
        "roomIds": room_ids,
        "totalBenches": total_benches,
        "occupiedSeats": occupied,
        "studentCount": student_count
    }))
}

fn exams_list(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let date = params
        .get("examDate")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());

    let mut sql = String::from(
        "SELECT id, exam_type, exam_date, class_number, bench_capacity FROM exams WHERE active = 1",
    );
    if date.is_some() {
        sql.push_str(" AND exam_date = ?");
    }
    sql.push_str(" ORDER BY exam_date, class_number");

    let mut stmt = conn.prepare(&sql).map_err(db_err)?;
    let map_row = |r: &rusqlite::Row<'_>| {
        Ok(json!({
            "id": r.get::<_, String>(0)?,
            "examType": r.get::<_, String>(1)?,
            "examDate": r.get::<_, String>(2)?,
            "classNumber": r.get::<_, i64>(3)?,
            "benchCapacity": r.get::<_, i64>(4)?,
        }))
    };
    let exams = match &date {
        Some(d) => stmt.query_map([d], map_row),
        None => stmt.query_map([], map_row),
    }
    .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    .map_err(db_err)?;

    Ok(json!({ "exams": exams }))
}

/// Soft-deactivate the exam and every seat plan its class contributed to
/// on that date. Seat records are never rewritten, only retired with the
/// plan that owns them.
fn exams_cancel(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let exam_id = get_required_str(params, "examId")?;
    let row: Option<(String, i64)> = conn
        .query_row(
            "SELECT exam_date, class_number FROM exams WHERE id = ? AND active = 1",
            [&exam_id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()
        .map_err(db_err)?;
    let Some((exam_date, class_number)) = row else {
        return Err(HandlerErr::new("not_found", "active exam not found"));
    };

    let tx = conn.unchecked_transaction().map_err(db_err)?;
    tx.execute("UPDATE exams SET active = 0 WHERE id = ?", [&exam_id])
        .map_err(db_err)?;
    let plans_retired = tx
        .execute(
            "UPDATE seat_plans SET active = 0
             WHERE exam_date = ? AND active = 1 AND id IN (
                SELECT plan_id FROM seat_plan_contributors WHERE class_label = ?
             )",
            (&exam_date, class_number.to_string()),
        )
        .map_err(db_err)?;
    tx.commit().map_err(db_err)?;

    Ok(json!({ "ok": true, "plansRetired": plans_retired }))
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
        "exams.schedule" => Some(with_db(state, req, exams_schedule)),
        "exams.list" => Some(with_db(state, req, exams_list)),
        "exams.cancel" => Some(with_db(state, req, exams_cancel)),
        _ => None,
    }
}
