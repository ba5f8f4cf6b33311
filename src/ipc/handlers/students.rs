use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_err, get_required_str, get_required_u32, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::seating;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

fn students_enroll(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_number = get_required_u32(params, "classNumber")?;
    let section = get_required_str(params, "section")?;
    let roll_number = get_required_u32(params, "rollNumber")?;
    seating::size_bucket(class_number)?;

    let exists = conn
        .query_row(
            "SELECT 1 FROM students WHERE class_number = ? AND section = ? AND roll_number = ?",
            (class_number as i64, &section, roll_number as i64),
            |r| r.get::<_, i64>(0),
        )
        .optional()
        .map_err(db_err)?
        .is_some();
    if exists {
        return Err(HandlerErr::new(
            "duplicate_roll",
            "roll number already enrolled in this class section",
        ));
    }

    let student_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO students(id, class_number, section, roll_number, active)
         VALUES(?, ?, ?, ?, 1)",
        (&student_id, class_number as i64, &section, roll_number as i64),
    )
    .map_err(db_err)?;
    Ok(json!({ "studentId": student_id }))
}

fn students_list(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_number = get_required_u32(params, "classNumber")?;
    let section = params
        .get("section")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());

    let mut sql = String::from(
        "SELECT id, section, roll_number, active FROM students WHERE class_number = ?",
    );
    if section.is_some() {
        sql.push_str(" AND section = ?");
    }
    sql.push_str(" ORDER BY section, roll_number");

    let mut stmt = conn.prepare(&sql).map_err(db_err)?;
    let map_row = |r: &rusqlite::Row<'_>| {
        Ok(json!({
            "id": r.get::<_, String>(0)?,
            "section": r.get::<_, String>(1)?,
            "rollNumber": r.get::<_, i64>(2)?,
            "active": r.get::<_, i64>(3)? != 0,
        }))
    };
    let students = match &section {
        Some(s) => stmt.query_map((class_number as i64, s), map_row),
        None => stmt.query_map([class_number as i64], map_row),
    }
    .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    .map_err(db_err)?;

    Ok(json!({ "students": students }))
}

fn students_set_active(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let active = params
        .get("active")
        .and_then(|v| v.as_bool())
        .ok_or_else(|| HandlerErr::new("bad_params", "missing active"))?;
    let changed = conn
        .execute(
            "UPDATE students SET active = ? WHERE id = ?",
            (active as i64, &student_id),
        )
        .map_err(db_err)?;
    if changed == 0 {
        return Err(HandlerErr::new("not_found", "student not found"));
    }
    Ok(json!({ "ok": true }))
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
        "students.enroll" => Some(with_db(state, req, students_enroll)),
        "students.list" => Some(with_db(state, req, students_list)),
        "students.setActive" => Some(with_db(state, req, students_set_active)),
        _ => None,
    }
}
