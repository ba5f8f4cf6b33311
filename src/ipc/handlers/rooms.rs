use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{
    db_err, get_bucket, get_required_str, load_room_layout, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::seating::{LayoutRow, RoomLayout};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

fn parse_layout_rows(params: &serde_json::Value) -> Result<Vec<LayoutRow>, HandlerErr> {
    let Some(rows) = params.get("rows").and_then(|v| v.as_array()) else {
        return Err(HandlerErr::new("bad_params", "missing rows"));
    };
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let row_number = row
            .get("rowNumber")
            .and_then(|v| v.as_u64())
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| HandlerErr::new("bad_params", "rows[].rowNumber must be a number"))?;
        let bench_count = row
            .get("benchCount")
            .and_then(|v| v.as_u64())
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| HandlerErr::new("bad_params", "rows[].benchCount must be a number"))?;
        out.push(LayoutRow {
            row_number,
            bench_count,
        });
    }
    Ok(out)
}

fn rooms_create(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let name = get_required_str(params, "name")?;
    let bucket = get_bucket(params, "type")?;
    let layout = RoomLayout::new(parse_layout_rows(params)?)?;
    if layout.capacity() == 0 {
        return Err(HandlerErr::new("bad_params", "layout has no benches"));
    }

    let exists = conn
        .query_row("SELECT 1 FROM rooms WHERE name = ?", [&name], |r| {
            r.get::<_, i64>(0)
        })
        .optional()
        .map_err(db_err)?
        .is_some();
    if exists {
        return Err(HandlerErr::new("duplicate_name", "room name already in use"));
    }

    let room_id = Uuid::new_v4().to_string();
    let tx = conn.unchecked_transaction().map_err(db_err)?;
    tx.execute(
        "INSERT INTO rooms(id, name, room_type, active) VALUES(?, ?, ?, 1)",
        (&room_id, &name, bucket.as_str()),
    )
    .map_err(db_err)?;
    for row in layout.rows() {
        tx.execute(
            "INSERT INTO room_rows(room_id, row_number, bench_count) VALUES(?, ?, ?)",
            (&room_id, row.row_number as i64, row.bench_count as i64),
        )
        .map_err(db_err)?;
    }
    tx.commit().map_err(db_err)?;

    Ok(json!({ "roomId": room_id, "capacity": layout.capacity() }))
}

fn rooms_list(conn: &Connection) -> Result<serde_json::Value, HandlerErr> {
    let mut stmt = conn
        .prepare("SELECT id, name, room_type, active FROM rooms ORDER BY name, id")
        .map_err(db_err)?;
    let heads = stmt
        .query_map([], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, i64>(3)? != 0,
            ))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(db_err)?;

    let mut rooms = Vec::with_capacity(heads.len());
    for (id, name, room_type, active) in heads {
        let layout = load_room_layout(conn, &id)?;
        let rows: Vec<serde_json::Value> = layout
            .rows()
            .iter()
            .map(|row| json!({ "rowNumber": row.row_number, "benchCount": row.bench_count }))
            .collect();
        rooms.push(json!({
            "id": id,
            "name": name,
            "type": room_type,
            "active": active,
            "capacity": layout.capacity(),
            "rows": rows
        }));
    }
    Ok(json!({ "rooms": rooms }))
}

fn rooms_deactivate(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let room_id = get_required_str(params, "roomId")?;
    let changed = conn
        .execute("UPDATE rooms SET active = 0 WHERE id = ?", [&room_id])
        .map_err(db_err)?;
    if changed == 0 {
        return Err(HandlerErr::new("not_found", "room not found"));
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
        "rooms.create" => Some(with_db(state, req, rooms_create)),
        "rooms.list" => Some(with_db(state, req, |conn, _| rooms_list(conn))),
        "rooms.deactivate" => Some(with_db(state, req, rooms_deactivate)),
        _ => None,
    }
}
