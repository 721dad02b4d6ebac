use thiserror::Error;

/// Error returned by [`crate::Endpoint::request`].
///
/// Variants mirror the outcomes a peer's dispatcher can produce on the wire
/// plus the two purely-local failure modes (timeout, disconnect).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RequestError {
    #[error("request timed out")]
    Timeout,
    #[error("disconnected while request was pending")]
    Disconnected,
    #[error("EventNotFound: {0}")]
    EventNotFound(String),
    #[error("{0}")]
    RemoteError(String),
}

impl RequestError {
    /// Reconstructs the right variant from a response's `data` payload,
    /// distinguishing the dispatcher's `EventNotFound: <event>` convention
    /// (a special case of a remote error) from an arbitrary handler failure.
    pub(crate) fn from_remote(message: String) -> Self {
        match message.strip_prefix("EventNotFound: ") {
            Some(event) => Self::EventNotFound(event.to_string()),
            None => Self::RemoteError(message),
        }
    }
}

/// Errors internal to running the connection itself: bad wire data, or a
/// transport that failed outright. These are fatal to whichever loop hit
/// them and are surfaced to [`crate::supervisor::Supervisor`], never to a
/// pending [`crate::Endpoint::request`] caller directly.
#[derive(Debug, Error)]
pub enum EndpointError {
    #[error("failed to decode packet: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("transport error: {0}")]
    Transport(#[from] anyhow::Error),
    #[error("send queue is closed")]
    QueueClosed,
}
