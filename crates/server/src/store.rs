//! SQLite-backed storage for employees, trips, clients, and reserved seats.
//!
//! Schema is applied at startup with `CREATE TABLE IF NOT EXISTS`, after the
//! WAL/busy-timeout pragmas. Multi-row writes (the reservation batch) run
//! inside an explicit transaction so a seat conflict leaves nothing behind.
//!
//! Dates and times are stored as text in the same representations the wire
//! uses: `yyyy-MM-dd` and `HH:mm`.

use std::path::Path;

use coachline_protocol::Trip;
use rusqlite::{params, Connection, OptionalExtension};
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{Date, Time};
use tracing::info;

use crate::error::ServiceError;

const DATE_FORMAT: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day]");
const TIME_FORMAT: &[BorrowedFormatItem<'static>] = format_description!("[hour]:[minute]");

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS offices (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS employees (
    id INTEGER PRIMARY KEY,
    username TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    office_id INTEGER REFERENCES offices(id)
);
CREATE TABLE IF NOT EXISTS trips (
    id INTEGER PRIMARY KEY,
    destination TEXT NOT NULL,
    date TEXT NOT NULL,
    time TEXT NOT NULL,
    available_seats INTEGER NOT NULL,
    UNIQUE(destination, date, time)
);
CREATE TABLE IF NOT EXISTS clients (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS reserved_seats (
    id INTEGER PRIMARY KEY,
    trip_id INTEGER NOT NULL REFERENCES trips(id),
    employee_id INTEGER NOT NULL REFERENCES employees(id),
    client_id INTEGER NOT NULL REFERENCES clients(id),
    seat_number INTEGER NOT NULL,
    UNIQUE(trip_id, seat_number)
);
";

/// A stored employee row. The password hash stays server-side; `to_wire`
/// strips it before anything crosses the protocol boundary.
#[derive(Debug, Clone)]
pub struct EmployeeRecord {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
    pub office_id: Option<i64>,
}

impl EmployeeRecord {
    pub fn to_wire(&self) -> coachline_protocol::Employee {
        coachline_protocol::Employee {
            id: self.id,
            username: self.username.clone(),
            office_id: self.office_id,
        }
    }
}

pub fn parse_date(value: &str) -> Result<Date, ServiceError> {
    Date::parse(value, DATE_FORMAT)
        .map_err(|_| ServiceError::invalid(format!("malformed date: {value}")))
}

pub fn parse_time(value: &str) -> Result<Time, ServiceError> {
    Time::parse(value, TIME_FORMAT)
        .map_err(|_| ServiceError::invalid(format!("malformed time: {value}")))
}

pub fn format_date(date: Date) -> String {
    date.format(DATE_FORMAT).expect("infallible date format")
}

pub fn format_time(time: Time) -> String {
    time.format(TIME_FORMAT).expect("infallible time format")
}

pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (or create) the database at `path` and apply the schema.
    pub fn open(path: &Path) -> Result<Self, ServiceError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;",
        )?;
        conn.execute_batch(SCHEMA)?;
        info!(
            component = "store",
            event = "store.opened",
            path = %path.display(),
        );
        Ok(Self { conn })
    }

    /// In-memory database, used by tests.
    pub fn open_in_memory() -> Result<Self, ServiceError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    pub fn find_employee_by_username(
        &self,
        username: &str,
    ) -> Result<Option<EmployeeRecord>, ServiceError> {
        let record = self
            .conn
            .prepare(
                "SELECT id, username, password_hash, office_id
                 FROM employees WHERE username = ?1",
            )?
            .query_row(params![username], |row| {
                Ok(EmployeeRecord {
                    id: row.get(0)?,
                    username: row.get(1)?,
                    password_hash: row.get(2)?,
                    office_id: row.get(3)?,
                })
            })
            .optional()?;
        Ok(record)
    }

    pub fn insert_employee(
        &self,
        username: &str,
        password_hash: &str,
        office_id: Option<i64>,
    ) -> Result<i64, ServiceError> {
        self.conn.execute(
            "INSERT INTO employees (username, password_hash, office_id) VALUES (?1, ?2, ?3)",
            params![username, password_hash, office_id],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn insert_trip(
        &self,
        destination: &str,
        date: Date,
        time: Time,
        available_seats: i64,
    ) -> Result<i64, ServiceError> {
        self.conn.execute(
            "INSERT INTO trips (destination, date, time, available_seats)
             VALUES (?1, ?2, ?3, ?4)",
            params![destination, format_date(date), format_time(time), available_seats],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn trip_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<(i64, String, String, String, i64)> {
        Ok((
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
        ))
    }

    fn decode_trip(raw: (i64, String, String, String, i64)) -> Result<Trip, ServiceError> {
        let (id, destination, date, time, available_seats) = raw;
        Ok(Trip {
            id,
            destination,
            date: parse_date(&date)?,
            time: parse_time(&time)?,
            available_seats,
        })
    }

    pub fn all_trips(&self) -> Result<Vec<Trip>, ServiceError> {
        let rows = self
            .conn
            .prepare(
                "SELECT id, destination, date, time, available_seats
                 FROM trips ORDER BY id",
            )?
            .query_map([], Self::trip_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(Self::decode_trip).collect()
    }

    /// Look a trip up by its natural key.
    pub fn find_trip(
        &self,
        destination: &str,
        date: Date,
        time: Time,
    ) -> Result<Option<Trip>, ServiceError> {
        let raw = self
            .conn
            .prepare(
                "SELECT id, destination, date, time, available_seats
                 FROM trips WHERE destination = ?1 AND date = ?2 AND time = ?3",
            )?
            .query_row(
                params![destination, format_date(date), format_time(time)],
                Self::trip_from_row,
            )
            .optional()?;
        raw.map(Self::decode_trip).transpose()
    }

    pub fn find_trip_by_id(&self, id: i64) -> Result<Option<Trip>, ServiceError> {
        let raw = self
            .conn
            .prepare(
                "SELECT id, destination, date, time, available_seats
                 FROM trips WHERE id = ?1",
            )?
            .query_row(params![id], Self::trip_from_row)
            .optional()?;
        raw.map(Self::decode_trip).transpose()
    }

    /// Occupied seats for a trip as `(seat_number, client_name)` pairs.
    pub fn reserved_seats_for_trip(&self, trip_id: i64) -> Result<Vec<(u8, String)>, ServiceError> {
        let rows = self
            .conn
            .prepare(
                "SELECT rs.seat_number, c.name
                 FROM reserved_seats rs JOIN clients c ON c.id = rs.client_id
                 WHERE rs.trip_id = ?1 ORDER BY rs.seat_number",
            )?
            .query_map(params![trip_id], |row| {
                Ok((row.get::<_, i64>(0)? as u8, row.get(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Resolve a client by exact name match, creating the row on first use.
    /// Names are not unique-constrained; the first match wins.
    pub fn find_or_create_client(&self, name: &str) -> Result<i64, ServiceError> {
        let existing: Option<i64> = self
            .conn
            .prepare("SELECT id FROM clients WHERE name = ?1 ORDER BY id LIMIT 1")?
            .query_row(params![name], |row| row.get(0))
            .optional()?;
        if let Some(id) = existing {
            return Ok(id);
        }
        self.conn
            .execute("INSERT INTO clients (name) VALUES (?1)", params![name])?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Write the reservation batch atomically.
    ///
    /// Re-checks seat conflicts inside the transaction; on conflict the whole
    /// batch aborts and no row is written. On success one `reserved_seats`
    /// row per seat is inserted and the trip's available-seat counter drops
    /// by the batch size.
    pub fn reserve_seats(
        &mut self,
        trip_id: i64,
        employee_id: i64,
        client_id: i64,
        seat_numbers: &[u8],
    ) -> Result<(), ServiceError> {
        let tx = self.conn.transaction()?;

        let taken: Vec<i64> = {
            let mut stmt = tx.prepare(
                "SELECT seat_number FROM reserved_seats
                 WHERE trip_id = ?1 ORDER BY seat_number",
            )?;
            let rows = stmt
                .query_map(params![trip_id], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        };
        let conflicts: Vec<String> = seat_numbers
            .iter()
            .filter(|n| taken.contains(&(**n as i64)))
            .map(|n| n.to_string())
            .collect();
        if !conflicts.is_empty() {
            return Err(ServiceError::conflict(format!(
                "seats already reserved: {}",
                conflicts.join(", ")
            )));
        }

        for &seat_number in seat_numbers {
            tx.execute(
                "INSERT INTO reserved_seats (trip_id, employee_id, client_id, seat_number)
                 VALUES (?1, ?2, ?3, ?4)",
                params![trip_id, employee_id, client_id, seat_number as i64],
            )?;
        }
        tx.execute(
            "UPDATE trips SET available_seats = available_seats - ?1 WHERE id = ?2",
            params![seat_numbers.len() as i64, trip_id],
        )?;

        tx.commit()?;
        Ok(())
    }
}
