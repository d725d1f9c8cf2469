//! Client → Server messages

use serde::{Deserialize, Serialize};
use time::{Date, Time};

use crate::types::{iso_date, short_time};

/// Requests sent from a client to the server.
///
/// The `type` tag on the wire uses the SCREAMING_SNAKE_CASE request names
/// (`LOGIN`, `GET_ALL_TRIPS`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Request {
    Login {
        username: String,
        password: String,
    },
    Logout {
        employee_id: i64,
    },
    GetAllTrips,
    GetTrip {
        destination: String,
        #[serde(with = "iso_date")]
        date: Date,
        #[serde(with = "short_time")]
        time: Time,
    },
    SearchTripSeats {
        destination: String,
        #[serde(with = "iso_date")]
        date: Date,
        #[serde(with = "short_time")]
        time: Time,
    },
    ReserveSeats {
        client_name: String,
        seat_numbers: Vec<u8>,
        trip_id: i64,
        employee_id: i64,
    },
}

impl Request {
    /// Wire name of the request kind, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Request::Login { .. } => "LOGIN",
            Request::Logout { .. } => "LOGOUT",
            Request::GetAllTrips => "GET_ALL_TRIPS",
            Request::GetTrip { .. } => "GET_TRIP",
            Request::SearchTripSeats { .. } => "SEARCH_TRIP_SEATS",
            Request::ReserveSeats { .. } => "RESERVE_SEATS",
        }
    }
}
