//! Server → Client messages

use serde::{Deserialize, Serialize};

use crate::types::{Employee, Seat, Trip};

/// Responses sent from the server to a client.
///
/// All variants except `SEATS_RESERVED` are replies to a request;
/// `SEATS_RESERVED` is an unsolicited push emitted to every other live
/// session when a reservation succeeds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Response {
    EmployeeLoggedIn { employee: Employee },
    Ok,
    Error { message: String },
    SeatsReserved,
    FindAllTrips { trips: Vec<Trip> },
    FindTripSeats { seats: Vec<Seat> },
    FindTrip { trip: Trip },
}

impl Response {
    /// Wire name of the response kind, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Response::EmployeeLoggedIn { .. } => "EMPLOYEE_LOGGED_IN",
            Response::Ok => "OK",
            Response::Error { .. } => "ERROR",
            Response::SeatsReserved => "SEATS_RESERVED",
            Response::FindAllTrips { .. } => "FIND_ALL_TRIPS",
            Response::FindTripSeats { .. } => "FIND_TRIP_SEATS",
            Response::FindTrip { .. } => "FIND_TRIP",
        }
    }
}
