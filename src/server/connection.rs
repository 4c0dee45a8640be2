//! Server-side connection management.
//!
//! A [`ClientManager`] owns one accepted socket: a reader task that decodes
//! Queries and submits them to the shared ingress queue, and a writer task
//! that drains the per-connection outgoing queue back onto the socket.
//! Either loop failing marks the connection not-alive; the reaper in the
//! server discards such managers on its next sweep.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

use super::stats::ClientStats;
use crate::error::{Result, WirecallError};
use crate::protocol::{build_frame, FrameBuffer, Query, Response, OVERLOADED_MSG};
use crate::queue::BoundedQueue;

/// Read buffer size for the reader loop.
const READ_BUF_SIZE: usize = 64 * 1024;

/// A decoded query plus the outgoing queue of the connection it came in on.
///
/// The queue travels with the query so whichever worker picks it up can
/// route the response back without consulting any connection table.
pub(crate) type IngressItem = (Query, Arc<BoundedQueue<Response>>);

/// Owns one accepted connection and its two I/O loops.
pub(crate) struct ClientManager {
    peer: SocketAddr,
    outgoing: Arc<BoundedQueue<Response>>,
    alive: Arc<AtomicBool>,
    queries_received: Arc<AtomicU64>,
    responses_returned: Arc<AtomicU64>,
}

impl ClientManager {
    /// Split the socket and start the reader and writer loops.
    pub(crate) fn start(
        stream: TcpStream,
        peer: SocketAddr,
        ingress: Arc<BoundedQueue<IngressItem>>,
        outgoing_capacity: usize,
        max_frame_size: u32,
    ) -> Self {
        let outgoing = Arc::new(BoundedQueue::new(outgoing_capacity));
        let alive = Arc::new(AtomicBool::new(true));
        let queries_received = Arc::new(AtomicU64::new(0));
        let responses_returned = Arc::new(AtomicU64::new(0));

        let (read_half, write_half) = stream.into_split();

        {
            let outgoing = outgoing.clone();
            let alive = alive.clone();
            let queries_received = queries_received.clone();
            tokio::spawn(async move {
                if let Err(e) =
                    reader_loop(read_half, ingress, &outgoing, &queries_received, max_frame_size)
                        .await
                {
                    tracing::debug!(peer = %peer, error = %e, "connection reader stopped");
                }
                alive.store(false, Ordering::Release);
                // Let the writer drain what is already queued, then exit.
                outgoing.close();
            });
        }

        {
            let outgoing = outgoing.clone();
            let alive = alive.clone();
            let responses_returned = responses_returned.clone();
            tokio::spawn(async move {
                if let Err(e) = writer_loop(write_half, &outgoing, &responses_returned).await {
                    tracing::debug!(peer = %peer, error = %e, "connection writer stopped");
                    alive.store(false, Ordering::Release);
                    outgoing.close();
                }
            });
        }

        Self {
            peer,
            outgoing,
            alive,
            queries_received,
            responses_returned,
        }
    }

    /// True while both loops are running and the socket is healthy.
    pub(crate) fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Snapshot of this connection's counters.
    pub(crate) fn stats(&self) -> ClientStats {
        ClientStats {
            peer: self.peer.to_string(),
            outgoing_len: self.outgoing.len(),
            queries_received: self.queries_received.load(Ordering::Relaxed),
            responses_returned: self.responses_returned.load(Ordering::Relaxed),
        }
    }
}

/// Decode Queries off the socket and feed the ingress queue.
///
/// When the ingress queue has no room, the offending query is acknowledged
/// with an overload failure on this connection's own outgoing queue and
/// reading continues, so one saturated server keeps per-connection
/// progress.
async fn reader_loop(
    mut reader: OwnedReadHalf,
    ingress: Arc<BoundedQueue<IngressItem>>,
    outgoing: &Arc<BoundedQueue<Response>>,
    queries_received: &AtomicU64,
    max_frame_size: u32,
) -> Result<()> {
    let mut frames = FrameBuffer::with_max_frame_size(max_frame_size);
    let mut buf = vec![0u8; READ_BUF_SIZE];

    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            if frames.has_partial() {
                return Err(WirecallError::ShortRead);
            }
            return Ok(());
        }

        for body in frames.push(&buf[..n])? {
            let query = Query::decode(&body)?;
            queries_received.fetch_add(1, Ordering::Relaxed);

            let dispatch = query.dispatch;
            if !ingress.try_enqueue((query, outgoing.clone())) {
                tracing::warn!(dispatch, "ingress queue full, rejecting query");
                let reply = Response::failure(dispatch, OVERLOADED_MSG);
                if !outgoing.try_enqueue(reply) {
                    tracing::warn!(dispatch, "outgoing queue full, dropping overload response");
                }
            }
        }
    }
}

/// Drain the outgoing queue onto the socket, one framed Response at a time.
async fn writer_loop(
    mut writer: OwnedWriteHalf,
    outgoing: &Arc<BoundedQueue<Response>>,
    responses_returned: &AtomicU64,
) -> Result<()> {
    while let Some(response) = outgoing.dequeue(None).await {
        let frame = build_frame(&response.encode());
        writer.write_all(&frame).await?;
        writer.flush().await?;
        responses_returned.fetch_add(1, Ordering::Relaxed);
    }

    // Queue closed by the reader: nothing more will be produced.
    let _ = writer.shutdown().await;
    Ok(())
}
