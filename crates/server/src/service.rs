//! Business operations over the shared state.
//!
//! Every operation locks the single `Mutex<AppState>` for its whole duration,
//! so registry mutations and reservation writes are serialized across
//! connections and the login/seat invariants hold under any interleaving.

use std::collections::HashSet;
use std::sync::Arc;

use coachline_protocol::{Employee, Response, Seat, Trip, FREE_SEAT, SEAT_COUNT};
use time::{Date, Time};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use crate::auth;
use crate::error::ServiceError;
use crate::session::SessionHandle;
use crate::state::AppState;
use crate::store::Store;

#[derive(Clone)]
pub struct Service {
    state: Arc<Mutex<AppState>>,
}

impl Service {
    pub fn new(store: Store) -> Self {
        Self {
            state: Arc::new(Mutex::new(AppState::new(store))),
        }
    }

    /// Authenticate an employee and register its session.
    ///
    /// Ordered checks, first failure wins: username exists, not already
    /// logged in elsewhere, password verifies. On success the registry gains
    /// an entry wired to `outbound`.
    pub async fn login(
        &self,
        username: &str,
        password: &str,
        outbound: mpsc::Sender<Response>,
    ) -> Result<Employee, ServiceError> {
        if username.is_empty() || password.is_empty() {
            return Err(ServiceError::invalid("missing credentials"));
        }
        let mut state = self.state.lock().await;

        let record = state
            .store()
            .find_employee_by_username(username)?
            .ok_or_else(|| ServiceError::not_found(format!("employee not found: {username}")))?;
        if state.is_logged_in(record.id) {
            warn!(
                component = "service",
                event = "login.duplicate",
                username,
                employee_id = record.id,
            );
            return Err(ServiceError::conflict(format!(
                "{username} is already logged in"
            )));
        }
        if !auth::verify_password(password, &record.password_hash) {
            return Err(ServiceError::invalid("invalid credentials"));
        }

        state.add_session(SessionHandle::new(
            record.id,
            record.username.clone(),
            outbound,
        ));
        info!(
            component = "service",
            event = "login.ok",
            username,
            employee_id = record.id,
        );
        Ok(record.to_wire())
    }

    /// Remove the session for `employee_id`. Logging out an employee with
    /// no live session is an error, never a silent no-op.
    pub async fn logout(&self, employee_id: i64) -> Result<(), ServiceError> {
        let mut state = self.state.lock().await;
        match state.remove_session(employee_id) {
            Some(handle) => {
                info!(
                    component = "service",
                    event = "logout.ok",
                    employee_id,
                    username = handle.username(),
                );
                Ok(())
            }
            None => Err(ServiceError::not_found(format!(
                "employee {employee_id} is not logged in"
            ))),
        }
    }

    /// Registry cleanup when a connection dies. Removes the entry only when
    /// it still belongs to this connection, so a later login from elsewhere
    /// is untouched.
    pub async fn disconnect(&self, employee_id: i64, outbound: &mpsc::Sender<Response>) {
        let mut state = self.state.lock().await;
        if state.remove_session_for_channel(employee_id, outbound) {
            info!(
                component = "service",
                event = "session.disconnected",
                employee_id,
            );
        }
    }

    pub async fn get_all_trips(&self) -> Result<Vec<Trip>, ServiceError> {
        let state = self.state.lock().await;
        state.store().all_trips()
    }

    pub async fn get_trip(
        &self,
        destination: &str,
        date: Date,
        time: Time,
    ) -> Result<Trip, ServiceError> {
        let state = self.state.lock().await;
        state
            .store()
            .find_trip(destination, date, time)?
            .ok_or_else(|| ServiceError::not_found(format!("trip not found: {destination}")))
    }

    /// The per-trip seat map: exactly `SEAT_COUNT` entries, seat `n` at
    /// index `n - 1`, occupant name or `"-"`.
    pub async fn search_trip_seats(
        &self,
        destination: &str,
        date: Date,
        time: Time,
    ) -> Result<Vec<Seat>, ServiceError> {
        let state = self.state.lock().await;
        let trip = state
            .store()
            .find_trip(destination, date, time)?
            .ok_or_else(|| ServiceError::not_found(format!("trip not found: {destination}")))?;
        let reserved = state.store().reserved_seats_for_trip(trip.id)?;

        let seats = (1..=SEAT_COUNT)
            .map(|number| {
                let client_name = reserved
                    .iter()
                    .find(|(n, _)| *n == number)
                    .map(|(_, name)| name.clone())
                    .unwrap_or_else(|| FREE_SEAT.to_string());
                Seat {
                    number,
                    client_name,
                }
            })
            .collect();
        Ok(seats)
    }

    /// Reserve a batch of seats for a walk-in client, all-or-nothing, and
    /// fan the event out to every other live session.
    pub async fn reserve_seats(
        &self,
        client_name: &str,
        seat_numbers: &[u8],
        trip_id: i64,
        employee_id: i64,
    ) -> Result<(), ServiceError> {
        validate_seat_request(client_name, seat_numbers)?;

        let mut state = self.state.lock().await;
        if !state.is_logged_in(employee_id) {
            return Err(ServiceError::Unauthenticated);
        }
        state
            .store()
            .find_trip_by_id(trip_id)?
            .ok_or_else(|| ServiceError::not_found(format!("trip not found: id {trip_id}")))?;

        let client_id = state.store().find_or_create_client(client_name)?;
        state
            .store_mut()
            .reserve_seats(trip_id, employee_id, client_id, seat_numbers)?;

        info!(
            component = "service",
            event = "reservation.ok",
            trip_id,
            employee_id,
            client = client_name,
            seats = ?seat_numbers,
        );

        state.broadcast_except(employee_id, &Response::SeatsReserved);
        Ok(())
    }
}

fn validate_seat_request(client_name: &str, seat_numbers: &[u8]) -> Result<(), ServiceError> {
    if client_name.trim().is_empty() {
        return Err(ServiceError::invalid("client name must not be empty"));
    }
    if seat_numbers.is_empty() {
        return Err(ServiceError::invalid("no seats requested"));
    }
    if let Some(bad) = seat_numbers
        .iter()
        .find(|n| **n < 1 || **n > SEAT_COUNT)
    {
        return Err(ServiceError::invalid(format!(
            "seat number out of range [1,{SEAT_COUNT}]: {bad}"
        )));
    }
    // A seat requested twice conflicts with itself.
    let mut seen = HashSet::new();
    if let Some(dup) = seat_numbers.iter().find(|n| !seen.insert(**n)) {
        return Err(ServiceError::conflict(format!(
            "seats already reserved: {dup}"
        )));
    }
    debug!(
        component = "service",
        event = "reservation.validated",
        seats = ?seat_numbers,
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::{date, time};
    use tokio::sync::mpsc::Receiver;

    const TRIP_DATE: Date = date!(2026 - 10 - 12);
    const TRIP_TIME: Time = time!(08:15);

    fn service_with_fixtures() -> (Service, i64) {
        let store = Store::open_in_memory().unwrap();
        store
            .insert_employee("alice", &auth::hash_password("pw1"), None)
            .unwrap();
        store
            .insert_employee("bob", &auth::hash_password("pw2"), None)
            .unwrap();
        let trip_id = store
            .insert_trip("Brasov", TRIP_DATE, TRIP_TIME, 18)
            .unwrap();
        (Service::new(store), trip_id)
    }

    fn channel() -> (mpsc::Sender<Response>, Receiver<Response>) {
        mpsc::channel(8)
    }

    async fn login(service: &Service, username: &str, password: &str) -> (Employee, Receiver<Response>) {
        let (tx, rx) = channel();
        let employee = service.login(username, password, tx).await.unwrap();
        (employee, rx)
    }

    #[tokio::test]
    async fn login_checks_run_in_order() {
        let (service, _) = service_with_fixtures();
        let (tx, _rx) = channel();

        let err = service.login("carol", "pw1", tx.clone()).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)), "{err}");

        let err = service.login("alice", "wrong", tx.clone()).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidArgument(_)), "{err}");

        let employee = service.login("alice", "pw1", tx.clone()).await.unwrap();
        assert_eq!(employee.username, "alice");

        // Duplicate-login check fires before password verification.
        let err = service.login("alice", "wrong", tx).await.unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)), "{err}");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_logins_admit_exactly_one_session() {
        let (service, _) = service_with_fixtures();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let service = service.clone();
            handles.push(tokio::spawn(async move {
                let (tx, _rx) = mpsc::channel(8);
                service.login("alice", "pw1", tx).await.is_ok()
            }));
        }
        let mut successes = 0;
        for handle in handles {
            if handle.await.unwrap() {
                successes += 1;
            }
        }
        assert_eq!(successes, 1);
    }

    #[tokio::test]
    async fn logout_of_unknown_employee_is_an_error() {
        let (service, _) = service_with_fixtures();
        let err = service.logout(999).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)), "{err}");
    }

    #[tokio::test]
    async fn logout_then_login_again_succeeds() {
        let (service, _) = service_with_fixtures();
        let (employee, _rx) = login(&service, "alice", "pw1").await;
        service.logout(employee.id).await.unwrap();
        let (_employee, _rx2) = login(&service, "alice", "pw1").await;
    }

    #[tokio::test]
    async fn disconnect_cleanup_frees_the_login() {
        let (service, _) = service_with_fixtures();
        let (tx, rx) = channel();
        let employee = service.login("alice", "pw1", tx.clone()).await.unwrap();
        drop(rx);

        service.disconnect(employee.id, &tx).await;
        let (_employee, _rx) = login(&service, "alice", "pw1").await;
    }

    #[tokio::test]
    async fn stale_disconnect_does_not_evict_fresh_login() {
        let (service, _) = service_with_fixtures();
        let (old_tx, old_rx) = channel();
        let employee = service.login("alice", "pw1", old_tx.clone()).await.unwrap();
        drop(old_rx);
        service.disconnect(employee.id, &old_tx).await;

        // Re-login from a new connection, then replay the old teardown.
        let (_employee, _rx) = login(&service, "alice", "pw1").await;
        service.disconnect(employee.id, &old_tx).await;

        let (tx, _rx2) = channel();
        let err = service.login("alice", "pw1", tx).await.unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)), "{err}");
    }

    #[tokio::test]
    async fn reservation_requires_a_live_session() {
        let (service, trip_id) = service_with_fixtures();
        let err = service
            .reserve_seats("Bob", &[1], trip_id, 1)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Unauthenticated), "{err}");
    }

    #[tokio::test]
    async fn reservation_rejects_bad_seat_lists() {
        let (service, trip_id) = service_with_fixtures();
        let (employee, _rx) = login(&service, "alice", "pw1").await;

        let err = service
            .reserve_seats("Bob", &[], trip_id, employee.id)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidArgument(_)), "{err}");

        let err = service
            .reserve_seats("Bob", &[0], trip_id, employee.id)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidArgument(_)), "{err}");

        let err = service
            .reserve_seats("Bob", &[19], trip_id, employee.id)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidArgument(_)), "{err}");

        let err = service
            .reserve_seats("", &[1], trip_id, employee.id)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidArgument(_)), "{err}");

        // A duplicate within one request conflicts with itself.
        let err = service
            .reserve_seats("Bob", &[2, 2], trip_id, employee.id)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)), "{err}");
    }

    #[tokio::test]
    async fn reservation_is_all_or_nothing() {
        let (service, trip_id) = service_with_fixtures();
        let (employee, _rx) = login(&service, "alice", "pw1").await;

        service
            .reserve_seats("Bob", &[4], trip_id, employee.id)
            .await
            .unwrap();
        let err = service
            .reserve_seats("Carol", &[3, 4, 5], trip_id, employee.id)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)), "{err}");

        let seats = service
            .search_trip_seats("Brasov", TRIP_DATE, TRIP_TIME)
            .await
            .unwrap();
        assert_eq!(seats[2].client_name, FREE_SEAT);
        assert_eq!(seats[3].client_name, "Bob");
        assert_eq!(seats[4].client_name, FREE_SEAT);

        let trip = service.get_all_trips().await.unwrap().remove(0);
        assert_eq!(trip.available_seats, 17);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_reservations_of_one_seat_admit_exactly_one() {
        let (service, trip_id) = service_with_fixtures();
        let (alice, _arx) = login(&service, "alice", "pw1").await;
        let (bob, _brx) = login(&service, "bob", "pw2").await;

        let first = {
            let service = service.clone();
            tokio::spawn(async move { service.reserve_seats("Dan", &[7], trip_id, alice.id).await })
        };
        let second = {
            let service = service.clone();
            tokio::spawn(async move { service.reserve_seats("Eva", &[7], trip_id, bob.id).await })
        };
        let outcomes = [first.await.unwrap(), second.await.unwrap()];

        let successes = outcomes.iter().filter(|r| r.is_ok()).count();
        assert_eq!(successes, 1);
        let conflict = outcomes.iter().find(|r| r.is_err()).unwrap();
        assert!(matches!(
            conflict.as_ref().unwrap_err(),
            ServiceError::Conflict(_)
        ));

        let seats = service
            .search_trip_seats("Brasov", TRIP_DATE, TRIP_TIME)
            .await
            .unwrap();
        assert_eq!(seats.iter().filter(|s| s.client_name != FREE_SEAT).count(), 1);
    }

    #[tokio::test]
    async fn seat_map_has_eighteen_entries_with_occupant() {
        let (service, trip_id) = service_with_fixtures();
        let (employee, _rx) = login(&service, "alice", "pw1").await;
        service
            .reserve_seats("Bob", &[7], trip_id, employee.id)
            .await
            .unwrap();

        let seats = service
            .search_trip_seats("Brasov", TRIP_DATE, TRIP_TIME)
            .await
            .unwrap();
        assert_eq!(seats.len(), 18);
        assert_eq!(seats[6].number, 7);
        assert_eq!(seats[6].client_name, "Bob");
        for seat in seats.iter().filter(|s| s.number != 7) {
            assert_eq!(seat.client_name, FREE_SEAT);
        }
    }

    #[tokio::test]
    async fn fanout_reaches_other_sessions_only() {
        let (service, trip_id) = service_with_fixtures();
        let (alice, mut alice_rx) = login(&service, "alice", "pw1").await;
        let (_bob, mut bob_rx) = login(&service, "bob", "pw2").await;

        service
            .reserve_seats("Dan", &[1, 2], trip_id, alice.id)
            .await
            .unwrap();

        assert_eq!(bob_rx.try_recv().unwrap(), Response::SeatsReserved);
        assert!(bob_rx.try_recv().is_err(), "exactly one push expected");
        assert!(alice_rx.try_recv().is_err(), "originator gets no push");
    }

    #[tokio::test]
    async fn fanout_prunes_dead_sessions_and_continues() {
        let (service, trip_id) = service_with_fixtures();
        let (alice, _arx) = login(&service, "alice", "pw1").await;
        let (_bob, bob_rx) = login(&service, "bob", "pw2").await;
        drop(bob_rx);

        service
            .reserve_seats("Dan", &[9], trip_id, alice.id)
            .await
            .unwrap();

        // Bob's dead session was treated as an implicit disconnect.
        let (_bob2, _rx) = login(&service, "bob", "pw2").await;
    }

    #[tokio::test]
    async fn get_trip_reports_missing_trips() {
        let (service, _) = service_with_fixtures();
        let trip = service
            .get_trip("Brasov", TRIP_DATE, TRIP_TIME)
            .await
            .unwrap();
        assert_eq!(trip.destination, "Brasov");

        let err = service
            .get_trip("Atlantis", TRIP_DATE, TRIP_TIME)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)), "{err}");
    }
}
