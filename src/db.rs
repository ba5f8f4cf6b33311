use rusqlite::Connection;
use std::path::Path;

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("examseat.sqlite3");
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS rooms(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            room_type TEXT NOT NULL,
            active INTEGER NOT NULL DEFAULT 1
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS room_rows(
            room_id TEXT NOT NULL,
            row_number INTEGER NOT NULL,
            bench_count INTEGER NOT NULL,
            PRIMARY KEY(room_id, row_number),
            FOREIGN KEY(room_id) REFERENCES rooms(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_room_rows_room ON room_rows(room_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            class_number INTEGER NOT NULL,
            section TEXT NOT NULL,
            roll_number INTEGER NOT NULL,
            active INTEGER NOT NULL DEFAULT 1,
            UNIQUE(class_number, section, roll_number)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_class ON students(class_number)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_class_section ON students(class_number, section)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS exams(
            id TEXT PRIMARY KEY,
            exam_type TEXT NOT NULL,
            exam_date TEXT NOT NULL,
            class_number INTEGER NOT NULL,
            bench_capacity INTEGER NOT NULL,
            active INTEGER NOT NULL DEFAULT 1
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_exams_type_date ON exams(exam_type, exam_date)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_exams_class ON exams(class_number)",
        [],
    )?;
    // At most one live exam per class, type and date; cancelled rows stay.
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS uq_exams_active
         ON exams(exam_type, exam_date, class_number) WHERE active = 1",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS seat_plans(
            id TEXT PRIMARY KEY,
            room_id TEXT NOT NULL,
            exam_date TEXT NOT NULL,
            active INTEGER NOT NULL DEFAULT 1,
            FOREIGN KEY(room_id) REFERENCES rooms(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_seat_plans_room_date ON seat_plans(room_id, exam_date)",
        [],
    )?;
    // At most one live plan per room and date.
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS uq_seat_plans_active
         ON seat_plans(room_id, exam_date) WHERE active = 1",
        [],
    )?;

    // The storage layer backs the no-double-seating invariant too: one
    // occupant per (plan, row, bench, side).
    conn.execute(
        "CREATE TABLE IF NOT EXISTS seat_plan_entries(
            plan_id TEXT NOT NULL,
            roll_number INTEGER NOT NULL,
            class_label TEXT NOT NULL,
            section_label TEXT NOT NULL,
            row_number INTEGER NOT NULL,
            bench_number INTEGER NOT NULL,
            side TEXT NOT NULL,
            PRIMARY KEY(plan_id, row_number, bench_number, side),
            FOREIGN KEY(plan_id) REFERENCES seat_plans(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_seat_plan_entries_plan ON seat_plan_entries(plan_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS seat_plan_contributors(
            plan_id TEXT NOT NULL,
            class_label TEXT NOT NULL,
            section_label TEXT NOT NULL,
            PRIMARY KEY(plan_id, class_label, section_label),
            FOREIGN KEY(plan_id) REFERENCES seat_plans(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_seat_plan_contributors_plan ON seat_plan_contributors(plan_id)",
        [],
    )?;

    Ok(conn)
}
