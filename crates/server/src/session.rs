//! Per-login session state.

use coachline_protocol::Response;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Handle to one authenticated session.
///
/// Owns nothing but the sending side of the connection's outbound channel;
/// the connection worker owns the socket and closes it. Both replies and
/// pushed notifications travel through the same channel, which keeps the
/// per-connection write order well defined.
pub struct SessionHandle {
    employee_id: i64,
    username: String,
    outbound: mpsc::Sender<Response>,
}

impl SessionHandle {
    pub fn new(employee_id: i64, username: String, outbound: mpsc::Sender<Response>) -> Self {
        Self {
            employee_id,
            username,
            outbound,
        }
    }

    pub fn employee_id(&self) -> i64 {
        self.employee_id
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// Enqueue a push without blocking. `Closed` means the peer is gone and
    /// the caller should drop this session from the registry.
    pub fn try_push(&self, response: Response) -> Result<(), TrySendError<Response>> {
        self.outbound.try_send(response)
    }

    /// Whether this session still refers to the given connection's channel.
    /// Used so a stale worker's teardown never evicts a fresh re-login.
    pub fn uses_channel(&self, tx: &mpsc::Sender<Response>) -> bool {
        self.outbound.same_channel(tx)
    }
}
