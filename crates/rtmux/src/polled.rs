//! The half-duplex compatibility loop.
//!
//! Kept only so a peer still running a legacy single-loop server can be
//! talked to; new code should use [`crate::Endpoint`] and
//! [`crate::supervisor`] instead — this design is retained purely for
//! transports without true duplex; duplex is the preferred shape.
//!
//! Unlike the duplex design, one loop both reads and writes the single
//! transport handle in turn, and a single map does double duty as both the
//! outgoing send queue and the wait set: a request's entry stays keyed by
//! its session until its response arrives and the caller consumes it; a
//! response's entry is removed as soon as it has been sent once.

use crate::error::RequestError;
use crate::packet::{Packet, PacketStatus};
use crate::registry::HandlerRegistry;
use crate::session::Session;
use crate::transport::{RecvOutcome, TransportReader, TransportWriter};
use futures::FutureExt;
use serde_json::Value;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;

struct Entry {
    packet: Packet,
    is_response: bool,
    created_at: Instant,
    /// Set once this entry has been written to the wire, so `get_queue`
    /// never picks the same outgoing request twice and resends it every
    /// turn while it waits for a response.
    sent: bool,
    /// Present only on request entries: resolved when a response carrying
    /// the same session arrives.
    waiter: Option<oneshot::Sender<Packet>>,
}

/// A single half-duplex connection, keyed by endpoint name like
/// [`crate::Endpoint`].
pub struct PolledConnection {
    name: String,
    cooldown: Duration,
    registry: Arc<HandlerRegistry>,
    queues: Mutex<HashMap<Session, Entry>>,
}

impl PolledConnection {
    pub fn new(name: impl Into<String>, cooldown: Duration) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            cooldown,
            registry: Arc::new(HandlerRegistry::new()),
            queues: Mutex::new(HashMap::new()),
        })
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Picks the oldest not-yet-sent entry, marks it sent, and returns the
    /// session key for the caller to read back out and serialize.
    fn get_queue(&self) -> Option<Session> {
        let mut guard = self.queues.lock().expect("polled queues mutex poisoned");
        let oldest = guard
            .iter()
            .filter(|(_, entry)| !entry.sent)
            .min_by_key(|(_, entry)| entry.created_at)
            .map(|(session, _)| session.clone());
        if let Some(session) = &oldest {
            guard.get_mut(session).expect("just found").sent = true;
        }
        oldest
    }

    fn on_response(&self, packet: Packet) {
        let mut guard = self.queues.lock().expect("polled queues mutex poisoned");
        if let Some(entry) = guard.get_mut(&packet.session) {
            if let Some(waiter) = entry.waiter.take() {
                let _ = waiter.send(packet);
            }
        }
    }

    async fn handle_request(self: &Arc<Self>, request: Packet) {
        let (args, kwargs) = request.request_args();
        let response = match self.registry.dispatch(&request.event, args, kwargs) {
            None => Packet::response_error(
                request.event.clone(),
                request.session.clone(),
                format!("EventNotFound: {}", request.event),
            ),
            Some(future) => match AssertUnwindSafe(future).catch_unwind().await {
                Ok(Ok(value)) => Packet::response_ok(request.event.clone(), request.session.clone(), value),
                Ok(Err(message)) => Packet::response_error(request.event.clone(), request.session.clone(), message),
                Err(_panic) => Packet::response_error(
                    request.event.clone(),
                    request.session.clone(),
                    "handler panicked".to_string(),
                ),
            },
        };
        self.queues.lock().expect("polled queues mutex poisoned").insert(
            response.session.clone(),
            Entry {
                packet: response,
                is_response: true,
                created_at: Instant::now(),
                sent: false,
                waiter: None,
            },
        );
    }

    /// Issues a request and waits for its response, exactly like
    /// [`crate::Endpoint::request`] but over the single-loop transport.
    pub async fn request(
        self: &Arc<Self>,
        event: &str,
        args: Value,
        kwargs: Value,
        timeout: Duration,
    ) -> Result<Value, RequestError> {
        let session = Session::mint(&self.name);
        let packet = Packet::request(event, session.clone(), args, kwargs);
        let (tx, rx) = oneshot::channel();
        self.queues.lock().expect("polled queues mutex poisoned").insert(
            session.clone(),
            Entry {
                packet,
                is_response: false,
                created_at: Instant::now(),
                sent: false,
                waiter: Some(tx),
            },
        );

        let outcome = tokio::time::timeout(timeout, rx).await;
        self.queues.lock().expect("polled queues mutex poisoned").remove(&session);

        match outcome {
            Err(_elapsed) => Err(RequestError::Timeout),
            Ok(Err(_closed)) => Err(RequestError::Disconnected),
            Ok(Ok(packet)) => match packet.status {
                PacketStatus::Ok => Ok(packet.data),
                PacketStatus::Error => {
                    let message = packet.data.as_str().map(str::to_string).unwrap_or_else(|| packet.data.to_string());
                    Err(RequestError::from_remote(message))
                }
            },
        }
    }

    /// Runs the alternating receive/send loop over a single transport
    /// handle until the peer closes or the transport errors.
    ///
    /// Per turn: wait up to `cooldown` for an inbound frame (a timeout just
    /// means "nothing arrived this turn", not an error); honour the `ping`
    /// liveness sentinel; dispatch decoded requests/responses; then send
    /// the oldest unsent queued entry, or the literal `"Nothing"` frame if
    /// none is pending.
    pub async fn communicate<T>(self: &Arc<Self>, transport: &mut T) -> anyhow::Result<()>
    where
        T: TransportReader + TransportWriter,
    {
        loop {
            match tokio::time::timeout(self.cooldown, transport.recv()).await {
                Ok(Ok(RecvOutcome::Closed { .. })) => return Ok(()),
                Ok(Err(err)) => return Err(err),
                Err(_elapsed) => {}
                Ok(Ok(RecvOutcome::Frame(text))) => {
                    if text == "ping" {
                        transport.send("pong".to_string()).await?;
                        continue;
                    }
                    if text == "Nothing" {
                        continue;
                    }
                    let packet = Packet::decode(&text)?;
                    if packet.is_response(&self.name) {
                        self.on_response(packet);
                    } else {
                        let this = self.clone();
                        tokio::spawn(async move { this.handle_request(packet).await });
                    }
                }
            }

            match self.get_queue() {
                Some(session) => {
                    let (text, is_response) = {
                        let guard = self.queues.lock().expect("polled queues mutex poisoned");
                        let entry = &guard[&session];
                        (serde_json::to_string(&entry.packet)?, entry.is_response)
                    };
                    transport.send(text).await?;
                    if is_response {
                        self.queues.lock().expect("polled queues mutex poisoned").remove(&session);
                    }
                }
                None => transport.send("Nothing".to_string()).await?,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::DuplexTransport;

    #[tokio::test]
    async fn echoes_a_request_over_the_polled_loop() {
        let server = PolledConnection::new("server", Duration::from_millis(5));
        server.registry().set_event("echo", |args, _kwargs| Ok(args));
        let client = PolledConnection::new("client", Duration::from_millis(5));

        let (mut server_transport, mut client_transport) = DuplexTransport::pair(8);

        let server_task = {
            let server = server.clone();
            tokio::spawn(async move {
                let _ = server.communicate(&mut server_transport).await;
            })
        };
        let client_task = {
            let client = client.clone();
            tokio::spawn(async move {
                let _ = client.communicate(&mut client_transport).await;
            })
        };

        let result = client
            .request("echo", Value::from("hi"), Value::Object(Default::default()), Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(result, Value::from("hi"));

        server_task.abort();
        client_task.abort();
    }
}
