//! Command dispatcher: maps each request to exactly one response.
//!
//! Business-rule failures become `ERROR` replies here and never reach the
//! connection worker as errors; only transport failures tear a worker down.

use coachline_protocol::{Employee, Request, Response};
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::ServiceError;
use crate::service::Service;

/// Per-connection dispatch context. Tracks which employee, if any, has
/// authenticated on this connection.
pub struct ConnContext {
    pub conn_id: u64,
    pub authenticated: Option<Employee>,
    pub outbound: mpsc::Sender<Response>,
}

impl ConnContext {
    pub fn new(conn_id: u64, outbound: mpsc::Sender<Response>) -> Self {
        Self {
            conn_id,
            authenticated: None,
            outbound,
        }
    }
}

/// Outcome of dispatching one request.
pub struct Reply {
    pub response: Response,
    /// Close the connection after writing the response. Set on successful
    /// logout; the session's lifecycle is tied to the connection.
    pub disconnect: bool,
}

impl Reply {
    fn of(response: Response) -> Self {
        Self {
            response,
            disconnect: false,
        }
    }
}

fn error_reply(err: ServiceError) -> Reply {
    Reply::of(Response::Error {
        message: err.to_string(),
    })
}

/// Handle one decoded request. Every branch yields exactly one `Reply`.
pub async fn dispatch(service: &Service, ctx: &mut ConnContext, request: Request) -> Reply {
    debug!(
        component = "dispatch",
        event = "request.received",
        conn_id = ctx.conn_id,
        kind = request.kind(),
    );

    // Everything except LOGIN requires an authenticated session.
    if !matches!(request, Request::Login { .. }) && ctx.authenticated.is_none() {
        return error_reply(ServiceError::Unauthenticated);
    }

    match request {
        Request::Login { username, password } => {
            if ctx.authenticated.is_some() {
                return error_reply(ServiceError::conflict(
                    "already logged in on this connection",
                ));
            }
            match service
                .login(&username, &password, ctx.outbound.clone())
                .await
            {
                Ok(employee) => {
                    ctx.authenticated = Some(employee.clone());
                    Reply::of(Response::EmployeeLoggedIn { employee })
                }
                Err(err) => error_reply(err),
            }
        }

        Request::Logout { employee_id } => match service.logout(employee_id).await {
            Ok(()) => {
                if ctx
                    .authenticated
                    .as_ref()
                    .is_some_and(|e| e.id == employee_id)
                {
                    ctx.authenticated = None;
                }
                Reply {
                    response: Response::Ok,
                    disconnect: true,
                }
            }
            Err(err) => error_reply(err),
        },

        Request::GetAllTrips => match service.get_all_trips().await {
            Ok(trips) => Reply::of(Response::FindAllTrips { trips }),
            Err(err) => error_reply(err),
        },

        Request::GetTrip {
            destination,
            date,
            time,
        } => match service.get_trip(&destination, date, time).await {
            Ok(trip) => Reply::of(Response::FindTrip { trip }),
            Err(err) => error_reply(err),
        },

        Request::SearchTripSeats {
            destination,
            date,
            time,
        } => match service.search_trip_seats(&destination, date, time).await {
            Ok(seats) => Reply::of(Response::FindTripSeats { seats }),
            Err(err) => error_reply(err),
        },

        Request::ReserveSeats {
            client_name,
            seat_numbers,
            trip_id,
            employee_id,
        } => match service
            .reserve_seats(&client_name, &seat_numbers, trip_id, employee_id)
            .await
        {
            Ok(()) => Reply::of(Response::Ok),
            Err(err) => error_reply(err),
        },
    }
}
