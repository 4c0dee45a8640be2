//! RPC client: dialer, framed writer/reader, and the call API.
//!
//! A [`Client`] owns one TCP connection. Queries go through a bounded
//! outgoing queue drained by a writer task; a reader task decodes incoming
//! Responses and completes the matching slot in the pending table. The
//! wire is fully asynchronous - responses may arrive in any order - but
//! [`Client::call`] presents each exchange as one awaited request/response
//! with a hard timeout.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};

use crate::codec::{MsgPackCodec, PayloadCodec};
use crate::error::{Result, WirecallError};
use crate::pending::PendingRequests;
use crate::protocol::{
    build_frame, FrameBuffer, Query, Response, DEFAULT_MAX_FRAME_SIZE, TIMEOUT_MSG,
};
use crate::queue::BoundedQueue;

/// Default hard query timeout.
pub const DEFAULT_HARD_TIMEOUT: Duration = Duration::from_secs(5);

/// Default capacity of the outgoing query queue.
pub const DEFAULT_OUTGOING_CAPACITY: usize = 1024;

/// Read buffer size for the reader loop.
const READ_BUF_SIZE: usize = 64 * 1024;

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Maximum wait for any single call before a timeout is synthesized.
    pub hard_timeout: Duration,
    /// Capacity of the outgoing query queue.
    pub outgoing_capacity: usize,
    /// Maximum accepted frame body size in bytes.
    pub max_frame_size: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            hard_timeout: DEFAULT_HARD_TIMEOUT,
            outgoing_capacity: DEFAULT_OUTGOING_CAPACITY,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

/// A connected RPC client, generic over the payload codec.
pub struct Client<C: PayloadCodec = MsgPackCodec> {
    outgoing: Arc<BoundedQueue<Query>>,
    pending: Arc<PendingRequests>,
    next_dispatch: AtomicI32,
    closed: Arc<AtomicBool>,
    _codec: PhantomData<fn() -> C>,
}

impl Client<MsgPackCodec> {
    /// Connect with the default MsgPack codec.
    pub async fn connect<A: ToSocketAddrs>(addr: A, config: ClientConfig) -> Result<Self> {
        Self::connect_with_codec(addr, config).await
    }
}

impl<C: PayloadCodec + 'static> Client<C> {
    /// Connect with an explicit payload codec and start the I/O loops.
    pub async fn connect_with_codec<A: ToSocketAddrs>(
        addr: A,
        config: ClientConfig,
    ) -> Result<Client<C>> {
        let stream = TcpStream::connect(addr).await?;
        let (read_half, write_half) = stream.into_split();

        let outgoing = Arc::new(BoundedQueue::new(config.outgoing_capacity));
        let pending = Arc::new(PendingRequests::new(config.hard_timeout));
        let closed = Arc::new(AtomicBool::new(false));

        {
            let outgoing = outgoing.clone();
            let closed = closed.clone();
            tokio::spawn(async move {
                if let Err(e) = writer_loop(write_half, &outgoing).await {
                    tracing::debug!(error = %e, "client writer stopped");
                }
                closed.store(true, Ordering::Release);
                outgoing.close();
            });
        }

        {
            let outgoing = outgoing.clone();
            let pending = pending.clone();
            let closed = closed.clone();
            let max_frame_size = config.max_frame_size;
            tokio::spawn(async move {
                if let Err(e) = reader_loop(read_half, &pending, max_frame_size).await {
                    tracing::debug!(error = %e, "client reader stopped");
                }
                closed.store(true, Ordering::Release);
                // In-flight calls run out their timers; new calls fail fast.
                outgoing.close();
            });
        }

        Ok(Client {
            outgoing,
            pending,
            next_dispatch: AtomicI32::new(1),
            closed,
            _codec: PhantomData,
        })
    }

    /// True once either I/O loop has stopped.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Number of calls currently awaiting a response.
    pub fn in_flight(&self) -> usize {
        self.pending.len()
    }

    /// Next dispatch id, strictly monotonic within this client.
    ///
    /// Ids never repeat: running past `i32::MAX` is terminal for the
    /// client rather than a wraparound into ids that may still be pending.
    fn next_dispatch(&self) -> Result<i32> {
        let id = self.next_dispatch.fetch_add(1, Ordering::Relaxed);
        if id <= 0 {
            return Err(WirecallError::DispatchExhausted);
        }
        Ok(id)
    }

    /// Call a remote handler and wait for its response.
    ///
    /// The input is encoded through the payload codec, sent as a Query, and
    /// the matching Response is awaited up to the hard timeout.
    ///
    /// # Errors
    ///
    /// - `Timeout` when no response arrived within the hard timeout
    /// - `Remote` carrying the server's error message verbatim
    /// - `ConnectionClosed` when the connection is gone
    /// - codec errors from encoding the input or decoding the output
    pub async fn call<T, R>(&self, handler: &str, input: &T) -> Result<R>
    where
        T: Serialize,
        R: DeserializeOwned,
    {
        if self.is_closed() {
            return Err(WirecallError::ConnectionClosed);
        }

        let dispatch = self.next_dispatch()?;
        let query = Query::new(dispatch, handler, C::encode(input)?);

        self.pending.add(&query);
        if !self.outgoing.try_enqueue(query) {
            if self.outgoing.is_closed() {
                self.pending.delete(dispatch);
                return Err(WirecallError::ConnectionClosed);
            }
            // Queue full: the query is dropped and the slot below times
            // out, the same outcome as a query lost to a write failure.
            tracing::warn!(dispatch, handler, "outgoing queue full, dropping query");
        }

        let response = self.pending.get(dispatch).await;
        if response.ok {
            return C::decode(&response.message_data);
        }
        match response.error_msg {
            Some(msg) if msg == TIMEOUT_MSG => Err(WirecallError::Timeout),
            Some(msg) => Err(WirecallError::Remote(msg)),
            None => Err(WirecallError::Remote(String::new())),
        }
    }
}

/// Drain the outgoing queue onto the socket, one framed Query at a time.
async fn writer_loop(mut writer: OwnedWriteHalf, outgoing: &BoundedQueue<Query>) -> Result<()> {
    while let Some(query) = outgoing.dequeue(None).await {
        let frame = build_frame(&query.encode());
        writer.write_all(&frame).await?;
        writer.flush().await?;
    }
    let _ = writer.shutdown().await;
    Ok(())
}

/// Decode Responses off the socket and complete pending slots.
///
/// Responses for slots that no longer exist (the caller already timed out)
/// are dropped inside `set`.
async fn reader_loop(
    mut reader: OwnedReadHalf,
    pending: &PendingRequests,
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
            let response = Response::decode(&body)?;
            pending.set(response.dispatch, response);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    /// Accept one connection and answer every query through `reply`.
    async fn echo_server(reply: fn(Query) -> Response) -> std::net::SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut frames = FrameBuffer::new();
            let mut buf = vec![0u8; 4096];
            loop {
                let n = match stream.read(&mut buf).await {
                    Ok(0) | Err(_) => return,
                    Ok(n) => n,
                };
                for body in frames.push(&buf[..n]).unwrap() {
                    let query = Query::decode(&body).unwrap();
                    let frame = build_frame(&reply(query).encode());
                    if stream.write_all(&frame).await.is_err() {
                        return;
                    }
                }
            }
        });

        addr
    }

    #[tokio::test]
    async fn test_call_roundtrip() {
        let addr = echo_server(|q| Response::success(q.dispatch, q.message_data)).await;
        let client = Client::connect(addr, ClientConfig::default()).await.unwrap();

        let result: i32 = client.call("echo", &42).await.unwrap();
        assert_eq!(result, 42);
        assert_eq!(client.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_call_remote_failure_is_verbatim() {
        let addr = echo_server(|q| Response::failure(q.dispatch, "broken")).await;
        let client = Client::connect(addr, ClientConfig::default()).await.unwrap();

        let result = client.call::<_, i32>("any", &1).await;
        assert!(matches!(result, Err(WirecallError::Remote(msg)) if msg == "broken"));
    }

    #[tokio::test]
    async fn test_call_times_out_when_server_never_answers() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            // Accept and hold the socket without ever responding.
            let (_stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(60)).await;
        });

        let config = ClientConfig {
            hard_timeout: Duration::from_millis(100),
            ..ClientConfig::default()
        };
        let client = Client::connect(addr, config).await.unwrap();

        let start = std::time::Instant::now();
        let result = client.call::<_, i32>("sleep", &1).await;

        assert!(matches!(result, Err(WirecallError::Timeout)));
        assert!(start.elapsed() < Duration::from_millis(500));
        assert_eq!(client.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_dispatch_ids_increase() {
        let addr = echo_server(|q| Response::success(q.dispatch, q.message_data)).await;
        let client = Client::connect(addr, ClientConfig::default()).await.unwrap();

        let first = client.next_dispatch().unwrap();
        let second = client.next_dispatch().unwrap();
        assert!(second > first);
    }

    #[tokio::test]
    async fn test_dispatch_exhaustion_is_terminal() {
        let addr = echo_server(|q| Response::success(q.dispatch, q.message_data)).await;
        let client = Client::connect(addr, ClientConfig::default()).await.unwrap();

        client.next_dispatch.store(i32::MIN, Ordering::Relaxed);
        let result = client.next_dispatch();
        assert!(matches!(result, Err(WirecallError::DispatchExhausted)));
    }

    #[tokio::test]
    async fn test_call_after_server_disconnect_fails_fast() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            drop(stream);
        });

        let client = Client::connect(addr, ClientConfig::default()).await.unwrap();

        // Wait for the reader to observe the EOF.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(client.is_closed());

        let result = client.call::<_, i32>("echo", &1).await;
        assert!(matches!(result, Err(WirecallError::ConnectionClosed)));
    }
}
