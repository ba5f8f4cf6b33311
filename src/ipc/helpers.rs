use crate::ipc::error::err;
use crate::seating::{LayoutRow, RoomLayout, SeatingError, SizeBucket};
use chrono::NaiveDate;
use rusqlite::Connection;

pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl HandlerErr {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

impl From<SeatingError> for HandlerErr {
    fn from(e: SeatingError) -> Self {
        Self {
            code: e.code(),
            message: e.message(),
            details: e.details(),
        }
    }
}

pub fn db_err(e: rusqlite::Error) -> HandlerErr {
    HandlerErr::new("db_query_failed", e.to_string())
}

pub fn get_required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| HandlerErr::new("bad_params", format!("missing {}", key)))
}

pub fn get_required_u32(params: &serde_json::Value, key: &str) -> Result<u32, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_u64())
        .and_then(|v| u32::try_from(v).ok())
        .ok_or_else(|| HandlerErr::new("bad_params", format!("missing or invalid {}", key)))
}

pub fn get_exam_date(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    let raw = get_required_str(params, key)?;
    let parsed = NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
        .map_err(|_| HandlerErr::new("bad_params", format!("{} must be YYYY-MM-DD", key)))?;
    Ok(parsed.format("%Y-%m-%d").to_string())
}

pub fn get_bucket(params: &serde_json::Value, key: &str) -> Result<SizeBucket, HandlerErr> {
    let raw = get_required_str(params, key)?;
    SizeBucket::parse(&raw).ok_or_else(|| {
        HandlerErr::new(
            "bad_params",
            format!("{} must be one of XS, S, M, L, XL, XXL, ALL", key),
        )
    })
}

#[derive(Debug, Clone)]
pub struct RoomRecord {
    pub id: String,
    pub name: String,
    pub room_type: String,
    pub layout: RoomLayout,
}

/// Active rooms with their layouts, in stable (name, id) order. The
/// seating walk depends on this order being deterministic.
pub fn load_active_rooms(conn: &Connection) -> Result<Vec<RoomRecord>, HandlerErr> {
    let mut stmt = conn
        .prepare("SELECT id, name, room_type FROM rooms WHERE active = 1 ORDER BY name, id")
        .map_err(db_err)?;
    let heads = stmt
        .query_map([], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
            ))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(db_err)?;

    let mut rooms = Vec::with_capacity(heads.len());
    for (id, name, room_type) in heads {
        let layout = load_room_layout(conn, &id)?;
        rooms.push(RoomRecord {
            id,
            name,
            room_type,
            layout,
        });
    }
    Ok(rooms)
}

pub fn load_room_layout(conn: &Connection, room_id: &str) -> Result<RoomLayout, HandlerErr> {
    let mut stmt = conn
        .prepare(
            "SELECT row_number, bench_count FROM room_rows
             WHERE room_id = ? ORDER BY row_number",
        )
        .map_err(db_err)?;
    let rows = stmt
        .query_map([room_id], |r| {
            Ok(LayoutRow {
                row_number: r.get::<_, i64>(0)? as u32,
                bench_count: r.get::<_, i64>(1)? as u32,
            })
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(db_err)?;
    RoomLayout::new(rows).map_err(HandlerErr::from)
}
