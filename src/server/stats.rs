//! Statistics records returned by the `_getStats` built-in.

use serde::{Deserialize, Serialize};

/// Counters of one live connection at snapshot time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientStats {
    /// Peer address of the accepted connection.
    pub peer: String,
    /// Responses waiting in the connection's outgoing queue.
    pub outgoing_len: usize,
    /// Queries decoded off this connection so far.
    pub queries_received: u64,
    /// Responses written back on this connection so far.
    pub responses_returned: u64,
}

/// Server-wide snapshot: ingress depth plus one entry per live connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerStats {
    /// Queries waiting for a worker.
    pub ingress_queue_len: usize,
    /// Per-connection counters.
    pub clients: Vec<ClientStats>,
}
