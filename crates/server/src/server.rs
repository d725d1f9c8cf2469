//! Transport listener and per-connection workers.
//!
//! One reader task per accepted connection plus one writer task that owns
//! the socket's write half and drains the outbound channel. Replies and
//! pushed notifications share that channel, so responses to a connection's
//! own requests stay in request order while pushes interleave safely.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use coachline_protocol::{codec, ProtocolError, Response};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, error, info, warn};

use crate::dispatch::{self, ConnContext};
use crate::service::Service;

/// Outbound channel depth per connection. A slow peer that falls this far
/// behind starts losing pushed notifications (best-effort delivery).
const OUTBOUND_CAPACITY: usize = 64;

static NEXT_CONN_ID: AtomicU64 = AtomicU64::new(1);

/// Accept loop. Runs until the process exits; individual accept failures are
/// logged and accepting continues. The semaphore caps live connections.
pub async fn run(
    listener: TcpListener,
    service: Service,
    max_connections: usize,
) -> anyhow::Result<()> {
    let limiter = Arc::new(Semaphore::new(max_connections));
    info!(
        component = "server",
        event = "server.listening",
        addr = %listener.local_addr()?,
        max_connections,
    );

    loop {
        let permit = limiter
            .clone()
            .acquire_owned()
            .await
            .expect("connection limiter never closes");
        match listener.accept().await {
            Ok((stream, peer)) => {
                let conn_id = NEXT_CONN_ID.fetch_add(1, Ordering::Relaxed);
                debug!(
                    component = "server",
                    event = "conn.accepted",
                    conn_id,
                    peer = %peer,
                );
                let service = service.clone();
                tokio::spawn(handle_connection(stream, conn_id, service, permit));
            }
            Err(err) => {
                warn!(
                    component = "server",
                    event = "conn.accept_failed",
                    error = %err,
                );
            }
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    conn_id: u64,
    service: Service,
    _permit: OwnedSemaphorePermit,
) {
    let (read_half, write_half) = stream.into_split();
    let (tx, rx) = mpsc::channel::<Response>(OUTBOUND_CAPACITY);

    let writer = tokio::spawn(write_loop(write_half, rx, conn_id));

    let mut ctx = ConnContext::new(conn_id, tx.clone());
    let mut lines = BufReader::new(read_half).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                debug!(component = "server", event = "conn.eof", conn_id);
                break;
            }
            Err(err) => {
                warn!(
                    component = "server",
                    event = "conn.read_failed",
                    conn_id,
                    error = %err,
                );
                break;
            }
        };

        let request = match codec::decode_request(&line) {
            Ok(request) => request,
            Err(ProtocolError::EmptyLine) => {
                warn!(component = "server", event = "conn.blank_line", conn_id);
                continue;
            }
            Err(err) => {
                // Malformed input gets a local error reply, not a teardown.
                warn!(
                    component = "server",
                    event = "conn.decode_failed",
                    conn_id,
                    error = %err,
                );
                let reply = Response::Error {
                    message: format!("{err}"),
                };
                if tx.send(reply).await.is_err() {
                    break;
                }
                continue;
            }
        };

        let reply = dispatch::dispatch(&service, &mut ctx, request).await;
        if tx.send(reply.response).await.is_err() {
            // Writer is gone; treat as a transport failure.
            break;
        }
        if reply.disconnect {
            debug!(component = "server", event = "conn.closing", conn_id);
            break;
        }
    }

    // Registry cleanup for this connection's login, if it is still ours.
    if let Some(employee) = ctx.authenticated.take() {
        service.disconnect(employee.id, &tx).await;
    }

    drop(tx);
    if let Err(err) = writer.await {
        error!(
            component = "server",
            event = "conn.writer_panicked",
            conn_id,
            error = %err,
        );
    }
    debug!(component = "server", event = "conn.closed", conn_id);
}

/// Drains the outbound channel onto the socket. Exits when every sender is
/// dropped or the peer stops accepting writes.
async fn write_loop(mut write_half: OwnedWriteHalf, mut rx: mpsc::Receiver<Response>, conn_id: u64) {
    while let Some(response) = rx.recv().await {
        let line = match codec::encode_response(&response) {
            Ok(line) => line,
            Err(err) => {
                error!(
                    component = "server",
                    event = "conn.encode_failed",
                    conn_id,
                    error = %err,
                );
                continue;
            }
        };
        let write = async {
            write_half.write_all(line.as_bytes()).await?;
            write_half.write_all(b"\n").await
        };
        if let Err(err) = write.await {
            warn!(
                component = "server",
                event = "conn.write_failed",
                conn_id,
                error = %err,
            );
            break;
        }
        debug!(
            component = "server",
            event = "conn.sent",
            conn_id,
            kind = response.kind(),
        );
    }
}
