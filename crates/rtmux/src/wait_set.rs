use crate::packet::Packet;
use crate::session::Session;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::oneshot;

/// What a blocked [`crate::Endpoint::request`] call is ultimately woken with.
#[derive(Debug, Clone)]
pub enum WaitOutcome {
    /// A matching response arrived.
    Response(Packet),
    /// The connection went away while this call was pending (drain).
    Disconnected,
}

/// The receiving half of an armed waiter, returned by [`WaitSet::arm`].
pub struct WaitHandle {
    pub session: Session,
    pub receiver: oneshot::Receiver<WaitOutcome>,
}

/// Map from session token to one-shot waiter.
///
/// A token is present iff some caller is currently blocked on it. All three
/// operations take the same lock, so they are atomic with respect to each
/// other.
#[derive(Default)]
pub struct WaitSet {
    inner: Mutex<HashMap<Session, oneshot::Sender<WaitOutcome>>>,
}

impl WaitSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a fresh waiter. Panics if `session` is already present: two
    /// callers racing on the same token is a caller bug (session tokens are
    /// minted fresh per call), not a condition this type papers over.
    pub fn arm(&self, session: Session) -> WaitHandle {
        let (tx, rx) = oneshot::channel();
        let mut guard = self.inner.lock().expect("wait set mutex poisoned");
        let previous = guard.insert(session.clone(), tx);
        assert!(
            previous.is_none(),
            "session token {session} armed twice: this is a caller bug"
        );
        WaitHandle {
            session,
            receiver: rx,
        }
    }

    /// Signals the waiter for `session` with `packet`, if one is still
    /// pending. A missing entry (already resolved by timeout or drain, or
    /// never armed by us — e.g. a duplicate/late response) is dropped
    /// silently.
    pub fn complete(&self, session: &Session, packet: Packet) {
        let sender = self.inner.lock().expect("wait set mutex poisoned").remove(session);
        match sender {
            Some(sender) => {
                // A `send` failure here means the receiver was already
                // dropped (e.g. `request` timed out and gave up); that's a
                // late response arriving after its caller stopped waiting,
                // so just drop it.
                let _ = sender.send(WaitOutcome::Response(packet));
            }
            None => {
                tracing::trace!(session = %session, "dropping response with no matching waiter");
            }
        }
    }

    /// Signals every remaining waiter with [`WaitOutcome::Disconnected`] and
    /// empties the set.
    pub fn drain(&self) {
        let mut guard = self.inner.lock().expect("wait set mutex poisoned");
        for (_, sender) in guard.drain() {
            let _ = sender.send(WaitOutcome::Disconnected);
        }
    }

    /// Removes `session` without signaling anything. Used by `request` after
    /// a successful `complete` or a timeout; a no-op if `complete`/`drain`
    /// already removed the entry.
    pub fn forget(&self, session: &Session) {
        self.inner.lock().expect("wait set mutex poisoned").remove(session);
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{PacketStatus, PacketType};

    fn dummy_packet(session: Session) -> Packet {
        Packet {
            kind: Some(PacketType::Response),
            status: PacketStatus::Ok,
            event: "echo".into(),
            session,
            data: serde_json::Value::Null,
        }
    }

    #[tokio::test]
    async fn complete_wakes_the_matching_waiter() {
        let set = WaitSet::new();
        let session = Session::mint("alice");
        let handle = set.arm(session.clone());
        set.complete(&session, dummy_packet(session.clone()));
        let outcome = handle.receiver.await.unwrap();
        assert!(matches!(outcome, WaitOutcome::Response(_)));
        assert_eq!(set.len(), 0);
    }

    #[tokio::test]
    async fn complete_on_absent_token_is_a_silent_drop() {
        let set = WaitSet::new();
        let session = Session::mint("alice");
        // no arm() call: simulates a late/duplicate response.
        set.complete(&session, dummy_packet(session));
        assert_eq!(set.len(), 0);
    }

    #[tokio::test]
    async fn drain_empties_the_set_and_wakes_everyone() {
        let set = WaitSet::new();
        let a = set.arm(Session::mint("alice"));
        let b = set.arm(Session::mint("alice"));
        set.drain();
        assert_eq!(set.len(), 0);
        assert!(matches!(a.receiver.await.unwrap(), WaitOutcome::Disconnected));
        assert!(matches!(b.receiver.await.unwrap(), WaitOutcome::Disconnected));
    }

    #[test]
    #[should_panic(expected = "armed twice")]
    fn arming_same_token_twice_panics() {
        let set = WaitSet::new();
        let session = Session::mint("alice");
        let _first = set.arm(session.clone());
        let _second = set.arm(session);
    }
}
