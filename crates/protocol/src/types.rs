//! Core types shared across the protocol

use serde::{Deserialize, Serialize};
use time::{Date, Time};

time::serde::format_description!(pub iso_date, Date, "[year]-[month]-[day]");
time::serde::format_description!(pub short_time, Time, "[hour]:[minute]");

/// Number of seats on every bus. Seat numbers run 1..=SEAT_COUNT.
pub const SEAT_COUNT: u8 = 18;

/// Marker for an unoccupied seat in a seat map.
pub const FREE_SEAT: &str = "-";

/// An agency employee, as visible on the wire.
///
/// The stored password hash never leaves the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Employee {
    pub id: i64,
    pub username: String,
    pub office_id: Option<i64>,
}

/// A scheduled departure.
///
/// Uniquely identified by `id` and also by the natural key
/// `(destination, date, time)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trip {
    pub id: i64,
    pub destination: String,
    #[serde(with = "iso_date")]
    pub date: Date,
    #[serde(with = "short_time")]
    pub time: Time,
    pub available_seats: i64,
}

/// One entry of a per-trip seat map: the seat number and the name of the
/// reserving client, or [`FREE_SEAT`] when unoccupied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Seat {
    pub number: u8,
    pub client_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::{date, time};

    #[test]
    fn trip_date_and_time_use_textual_formats() {
        let trip = Trip {
            id: 1,
            destination: "Cluj".to_string(),
            date: date!(2026 - 09 - 01),
            time: time!(14:30),
            available_seats: 18,
        };
        let json = serde_json::to_string(&trip).unwrap();
        assert!(json.contains(r#""date":"2026-09-01""#), "{json}");
        assert!(json.contains(r#""time":"14:30""#), "{json}");

        let back: Trip = serde_json::from_str(&json).unwrap();
        assert_eq!(back, trip);
    }

    #[test]
    fn malformed_date_is_rejected() {
        let json = r#"{"id":1,"destination":"Cluj","date":"01/09/2026","time":"14:30","available_seats":18}"#;
        assert!(serde_json::from_str::<Trip>(json).is_err());
    }
}
