use crate::config::EndpointConfig;
use crate::error::{EndpointError, RequestError};
use crate::packet::{Packet, PacketStatus};
use crate::queue::{SendQueue, SendQueueReceiver};
use crate::registry::HandlerRegistry;
use crate::session::Session;
use crate::transport::{Connector, RecvOutcome, TransportReader, TransportWriter};
use crate::wait_set::{WaitOutcome, WaitSet};
use futures::FutureExt;
use serde_json::Value;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{watch, Notify};

/// One side of a connection, identified by `name`.
///
/// Owns the wait set, handler registry, and (while connected) the sending
/// half of the outbound queue. Meant to be shared behind an `Arc` across the
/// receiver loop, sender loop, and any number of spawned handler-dispatch
/// tasks — see [`crate::supervisor::Supervisor`] for how those loops are
/// actually driven.
pub struct Endpoint {
    pub(crate) name: String,
    pub(crate) config: EndpointConfig,
    pub(crate) wait_set: Arc<WaitSet>,
    pub(crate) registry: Arc<HandlerRegistry>,
    pub(crate) queue: Mutex<Option<SendQueue>>,
    pub(crate) started_tx: watch::Sender<bool>,
    started_rx: watch::Receiver<bool>,
    connected: AtomicBool,
    pub(crate) close_notify: Arc<Notify>,
    /// Set by `close()` and never cleared. `Notify::notify_waiters` only
    /// wakes tasks already polling `close_notify.notified()`, which misses a
    /// `close()` landing while `supervisor::start` is inside
    /// `connector.connect()` or sleeping out the reconnect backoff; this flag
    /// is the durable half of that signal, checked at each of those points.
    pub(crate) close_requested: AtomicBool,
}

impl Endpoint {
    pub fn new(name: impl Into<String>, config: EndpointConfig) -> Arc<Self> {
        let (started_tx, started_rx) = watch::channel(false);
        Arc::new(Self {
            name: name.into(),
            config,
            wait_set: Arc::new(WaitSet::new()),
            registry: Arc::new(HandlerRegistry::new()),
            queue: Mutex::new(None),
            started_tx,
            started_rx,
            connected: AtomicBool::new(false),
            close_notify: Arc::new(Notify::new()),
            close_requested: AtomicBool::new(false),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registers a synchronous handler. The peer invokes it by name; the
    /// value it returns is sent back as the response's `data`.
    pub fn set_event<F>(&self, name: impl Into<String>, handler: F)
    where
        F: Fn(Value, Value) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.registry.set_event(name, handler);
    }

    /// Registers an async handler.
    pub fn set_event_async<F, Fut>(&self, name: impl Into<String>, handler: F)
    where
        F: Fn(Value, Value) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<Value, String>> + Send + 'static,
    {
        self.registry.set_event_async(name, handler);
    }

    pub fn remove_event(&self, name: &str) {
        self.registry.remove_event(name);
    }

    pub fn is_ready(&self) -> bool {
        *self.started_rx.borrow()
    }

    /// Returns immediately if currently connected; otherwise waits for the
    /// next successful connection. The underlying flag is cleared on every
    /// disconnect, so this reflects the *current* connection, not merely
    /// "has ever connected once".
    pub async fn wait_until_ready(&self) {
        let mut rx = self.started_rx.clone();
        if *rx.borrow() {
            return;
        }
        while rx.changed().await.is_ok() {
            if *rx.borrow() {
                return;
            }
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub(crate) fn mark_connected(&self) {
        self.connected.store(true, Ordering::Release);
        let _ = self.started_tx.send(true);
    }

    pub(crate) fn mark_disconnected(&self) {
        self.connected.store(false, Ordering::Release);
        *self.queue.lock().expect("queue mutex poisoned") = None;
        self.wait_set.drain();
        let _ = self.started_tx.send(false);
    }

    /// Requests the active connection (if any) be torn down and the
    /// reconnect loop, if running, stopped for good. The flag is durable: a
    /// `close()` landing while `start()` is dialing or sleeping out a
    /// reconnect backoff (i.e. not currently polling `close_notify`) is not
    /// lost, unlike a bare `notify_waiters()` call.
    pub async fn close(&self) {
        self.close_requested.store(true, Ordering::Release);
        self.close_notify.notify_waiters();
    }

    /// Dials via `connector`, runs the connection to completion, and
    /// reconnects with backoff until a graceful close (or `close()`) ends
    /// the loop for good, or `reconnect` is `false`.
    pub async fn start<C: Connector>(self: &Arc<Self>, connector: C, reconnect: bool) {
        crate::supervisor::start(self, connector, reconnect).await;
    }

    /// Performs one request/response round trip against the peer's handler
    /// registered under `event`.
    pub async fn request(&self, event: &str, args: Value, kwargs: Value) -> Result<Value, RequestError> {
        let send_queue = {
            let guard = self.queue.lock().expect("queue mutex poisoned");
            guard.clone().ok_or(RequestError::Disconnected)?
        };

        let session = Session::mint(&self.name);
        let handle = self.wait_set.arm(session.clone());
        let packet = Packet::request(event, session.clone(), args, kwargs);

        match tokio::time::timeout(self.config.timeout, send_queue.put(packet)).await {
            Err(_elapsed) => {
                // The packet never made it onto the wire, so unlike the
                // response-wait timeout below there is no late response to
                // guard against: remove the token outright.
                self.wait_set.forget(&session);
                return Err(RequestError::Timeout);
            }
            Ok(Err(_queue_closed)) => {
                self.wait_set.forget(&session);
                return Err(RequestError::Disconnected);
            }
            Ok(Ok(())) => {}
        }

        match tokio::time::timeout(self.config.timeout, handle.receiver).await {
            Err(_elapsed) => {
                // Deliberately do not `forget` here: the token stays armed so
                // a response that arrives after this point is still matched
                // by `WaitSet::complete` and dropped there as a "late
                // response onto a dead receiver" rather than a "missing
                // token" — either outcome is harmless to the caller, who
                // has already moved on with a `Timeout`.
                Err(RequestError::Timeout)
            }
            Ok(Err(_recv_dropped)) => {
                self.wait_set.forget(&session);
                Err(RequestError::Disconnected)
            }
            Ok(Ok(WaitOutcome::Disconnected)) => {
                self.wait_set.forget(&session);
                Err(RequestError::Disconnected)
            }
            Ok(Ok(WaitOutcome::Response(packet))) => {
                self.wait_set.forget(&session);
                match packet.status {
                    PacketStatus::Ok => Ok(packet.data),
                    PacketStatus::Error => {
                        let message = packet
                            .data
                            .as_str()
                            .map(str::to_string)
                            .unwrap_or_else(|| packet.data.to_string());
                        Err(RequestError::from_remote(message))
                    }
                }
            }
        }
    }
}

/// Reads frames until graceful close or a fatal decode/transport error,
/// dispatching inbound requests to spawned tasks and handing responses to
/// the wait set.
pub(crate) async fn receiver_loop<R: TransportReader>(
    endpoint: Arc<Endpoint>,
    mut reader: R,
    send_queue: SendQueue,
) -> Result<Option<u16>, EndpointError> {
    loop {
        let text = match reader.recv().await {
            Ok(RecvOutcome::Closed { code }) => return Ok(code),
            Ok(RecvOutcome::Frame(text)) => text,
            Err(err) => return Err(EndpointError::Transport(err)),
        };

        // "Nothing" is the half-duplex variant's keepalive filler; a duplex
        // peer should never emit it, but ignoring it costs nothing and keeps
        // us compatible with one.
        if text == "Nothing" {
            continue;
        }

        let packet = Packet::decode(&text)?;
        if packet.is_response(&endpoint.name) {
            tracing::trace!(session = %packet.session, "received response");
            endpoint.wait_set.complete(&packet.session, packet);
        } else {
            tracing::debug!(event = %packet.event, session = %packet.session, "received request");
            let endpoint = endpoint.clone();
            let send_queue = send_queue.clone();
            tokio::spawn(async move {
                dispatch_request(&endpoint, &send_queue, packet).await;
            });
        }
    }
}

/// Writes queued packets to the transport in FIFO order, awaiting each write
/// to completion before popping the next one.
pub(crate) async fn sender_loop<W: TransportWriter>(
    mut writer: W,
    mut queue: SendQueueReceiver,
) -> Result<(), EndpointError> {
    while let Some(packet) = queue.take().await {
        let text = packet.encode()?;
        tracing::trace!(event = %packet.event, session = %packet.session, "sending packet");
        writer.send(text).await.map_err(EndpointError::Transport)?;
    }
    Ok(())
}

/// Looks up and invokes the handler for an inbound request, turning its
/// outcome (success, returned error, or panic) into a response packet.
/// Never propagates a failure back into the receiver loop — that's the
/// whole point of running it as its own spawned task.
async fn dispatch_request(endpoint: &Endpoint, send_queue: &SendQueue, request: Packet) {
    let (args, kwargs) = request.request_args();
    let response = match endpoint.registry.dispatch(&request.event, args, kwargs) {
        None => Packet::response_error(
            request.event.clone(),
            request.session.clone(),
            format!("EventNotFound: {}", request.event),
        ),
        Some(future) => match AssertUnwindSafe(future).catch_unwind().await {
            Ok(Ok(value)) => Packet::response_ok(request.event.clone(), request.session.clone(), value),
            Ok(Err(message)) => {
                tracing::warn!(event = %request.event, session = %request.session, "handler returned an error: {message}");
                Packet::response_error(request.event.clone(), request.session.clone(), message)
            }
            Err(panic) => {
                let message = panic_message(panic);
                tracing::warn!(event = %request.event, session = %request.session, "handler panicked: {message}");
                Packet::response_error(request.event.clone(), request.session.clone(), message)
            }
        },
    };

    if let Err(err) = send_queue.put(response).await {
        tracing::debug!(%err, "dropping response: send queue already closed");
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "handler panicked".to_string()
    }
}
