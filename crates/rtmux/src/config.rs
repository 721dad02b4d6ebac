use std::time::Duration;

/// Every tunable an endpoint needs, gathered into one struct rather than
/// left as scattered constructor parameters or hidden constants.
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    /// How long [`crate::Endpoint::request`] waits for a response before
    /// failing with [`crate::RequestError::Timeout`].
    pub timeout: Duration,
    /// Idle delay used only by the half-duplex [`crate::polled`]
    /// compatibility loop between turns.
    pub cooldown: Duration,
    /// Backoff slept between reconnect attempts by
    /// [`crate::supervisor::Supervisor::start`].
    pub reconnect_backoff: Duration,
    /// Bound on the outgoing send queue. A full queue makes `put` block,
    /// applying backpressure to whichever task is enqueueing.
    pub queue_capacity: usize,
    /// Close codes which, when received from the peer, end the reconnect
    /// loop instead of retrying (default `{1000}`, a normal closure).
    pub ok_close_codes: Vec<u16>,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            cooldown: Duration::from_micros(100),
            reconnect_backoff: Duration::from_secs(3),
            queue_capacity: 64,
            ok_close_codes: vec![1000],
        }
    }
}
