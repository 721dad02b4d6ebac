use crate::endpoint::{receiver_loop, sender_loop, Endpoint};
use crate::queue::SendQueue;
use crate::transport::{Connector, Transport};
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Why a `run_once` connection attempt ended.
#[derive(Debug)]
pub enum DisconnectReason {
    /// Peer closed gracefully; carries the websocket close code when the
    /// transport exposes one.
    Graceful(Option<u16>),
    /// `Endpoint::close` was called explicitly.
    Closed,
    /// A loop ended with a fatal error (decode failure, transport error, or
    /// a panic inside a loop task).
    Error(anyhow::Error),
}

/// Drives one attached transport through the connection state machine:
///
/// ```text
///  Idle ── attach(ws) ──► Running ── either loop ends ──► Draining ──► Idle
/// ```
///
/// Spawns the receiver and sender loops, waits for whichever finishes first
/// (or an explicit `close()`), then tears the other down and drains the wait
/// set so every blocked `request` call returns immediately with
/// `Disconnected`.
pub async fn run_once<T: Transport>(endpoint: &Arc<Endpoint>, transport: T) -> DisconnectReason {
    let (reader, writer) = transport.split();
    let (send_queue, recv_queue) = SendQueue::new(endpoint.config.queue_capacity);

    *endpoint.queue.lock().expect("queue mutex poisoned") = Some(send_queue.clone());
    endpoint.mark_connected();
    tracing::info!(name = endpoint.name(), "started connection");

    let mut recv_task = tokio::spawn(receiver_loop(endpoint.clone(), reader, send_queue));
    let mut send_task = tokio::spawn(sender_loop(writer, recv_queue));

    let reason = tokio::select! {
        result = &mut recv_task => match result {
            Ok(Ok(code)) => DisconnectReason::Graceful(code),
            Ok(Err(err)) => DisconnectReason::Error(err.into()),
            Err(join_err) => join_error_to_reason(join_err),
        },
        result = &mut send_task => match result {
            Ok(Ok(())) => DisconnectReason::Graceful(None),
            Ok(Err(err)) => DisconnectReason::Error(err.into()),
            Err(join_err) => join_error_to_reason(join_err),
        },
        _ = endpoint.close_notify.notified() => DisconnectReason::Closed,
    };

    recv_task.abort();
    send_task.abort();

    tracing::info!(name = endpoint.name(), ?reason, "connection ended, draining");
    endpoint.mark_disconnected();

    reason
}

fn join_error_to_reason(join_err: tokio::task::JoinError) -> DisconnectReason {
    if join_err.is_cancelled() {
        DisconnectReason::Closed
    } else {
        DisconnectReason::Error(join_err.into())
    }
}

/// The reconnect wrapper: dial via `connector`, run the connection to
/// completion, and either stop (graceful close in `ok_close_codes`, or
/// `reconnect == false`) or sleep the configured backoff and dial again.
pub async fn start<C: Connector>(endpoint: &Arc<Endpoint>, connector: C, reconnect: bool) {
    loop {
        if endpoint.close_requested.load(Ordering::Acquire) {
            tracing::info!(name = endpoint.name(), "closed by request");
            break;
        }

        let dial = tokio::select! {
            result = connector.connect() => result,
            _ = endpoint.close_notify.notified() => {
                tracing::info!(name = endpoint.name(), "closed by request while dialing");
                break;
            }
        };

        match dial {
            Ok(transport) => match run_once(endpoint, transport).await {
                DisconnectReason::Closed => {
                    tracing::info!(name = endpoint.name(), "closed by request");
                    break;
                }
                DisconnectReason::Graceful(code) => {
                    let ok = code
                        .map(|c| endpoint.config.ok_close_codes.contains(&c))
                        .unwrap_or(true);
                    if ok {
                        tracing::info!(name = endpoint.name(), ?code, "disconnected successfully");
                        break;
                    }
                    tracing::error!(name = endpoint.name(), ?code, "disconnected with a non-ok close code");
                }
                DisconnectReason::Error(err) => {
                    tracing::error!(name = endpoint.name(), error = %err, "disconnected by error");
                }
            },
            Err(err) => {
                tracing::warn!(name = endpoint.name(), error = %err, "failed to connect");
            }
        }

        if !reconnect || endpoint.close_requested.load(Ordering::Acquire) {
            break;
        }
        tracing::info!(
            name = endpoint.name(),
            backoff = ?endpoint.config.reconnect_backoff,
            "retrying after backoff"
        );
        tokio::select! {
            _ = tokio::time::sleep(endpoint.config.reconnect_backoff) => {}
            _ = endpoint.close_notify.notified() => {
                tracing::info!(name = endpoint.name(), "closed by request during reconnect backoff");
                break;
            }
        }
    }
}
