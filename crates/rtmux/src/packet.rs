use crate::error::EndpointError;
use crate::session::Session;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `request` or `response`. Present on every packet minted by this crate;
/// treated as authoritative when deciding whether an inbound frame is a
/// request for us to dispatch or a response to one of our own calls. A
/// peer that omits it falls back to the session token's embedded issuer
/// name, see [`Packet::is_response`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PacketType {
    Request,
    Response,
}

/// Meaningful only on responses; requests are always `Ok`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PacketStatus {
    Ok,
    Error,
}

/// The single on-wire envelope.
///
/// `kind` is `Option` rather than required: a legacy half-duplex peer
/// never sends `type` at all, and such a frame should fall back to the
/// session-issuer-name check (see [`Packet::is_response`]) rather than be
/// rejected outright.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Packet {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<PacketType>,
    pub status: PacketStatus,
    pub event: String,
    pub session: Session,
    pub data: Value,
}

impl Packet {
    pub fn request(event: impl Into<String>, session: Session, args: Value, kwargs: Value) -> Self {
        Self {
            kind: Some(PacketType::Request),
            status: PacketStatus::Ok,
            event: event.into(),
            session,
            data: Value::Array(vec![args, kwargs]),
        }
    }

    pub fn response_ok(event: impl Into<String>, session: Session, data: Value) -> Self {
        Self {
            kind: Some(PacketType::Response),
            status: PacketStatus::Ok,
            event: event.into(),
            session,
            data,
        }
    }

    pub fn response_error(event: impl Into<String>, session: Session, message: String) -> Self {
        Self {
            kind: Some(PacketType::Response),
            status: PacketStatus::Error,
            event: event.into(),
            session,
            data: Value::String(message),
        }
    }

    /// Classifies an inbound frame as a response to one of *our* pending
    /// calls: authoritative on `type` when present, falling back to the
    /// embedded-issuer-name check otherwise.
    pub fn is_response(&self, own_name: &str) -> bool {
        match self.kind {
            Some(kind) => kind == PacketType::Response,
            None => self.session.issuer() == Some(own_name),
        }
    }

    /// Splits a request's `data` back into `(positional_args, keyword_args)`.
    /// Malformed payloads (a peer not honoring the `(args, kwargs)` tuple
    /// convention) degrade to an empty arg list rather than a hard error,
    /// since this envelope treats `data` as opaque and only the registered
    /// handler can meaningfully reject it.
    pub fn request_args(&self) -> (Value, Value) {
        match &self.data {
            Value::Array(items) if items.len() == 2 => (items[0].clone(), items[1].clone()),
            other => (other.clone(), Value::Object(Default::default())),
        }
    }

    pub fn encode(&self) -> Result<String, EndpointError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(text: &str) -> Result<Self, EndpointError> {
        Ok(serde_json::from_str(text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_json() {
        let session = Session::mint("alice");
        let packet = Packet::request("echo", session.clone(), Value::from(vec!["hi"]), Value::Object(Default::default()));
        let encoded = packet.encode().unwrap();
        let decoded = Packet::decode(&encoded).unwrap();
        assert_eq!(decoded.session, session);
        assert_eq!(decoded.event, "echo");
        assert_eq!(decoded.kind, Some(PacketType::Request));
    }

    #[test]
    fn falls_back_to_issuer_name_when_type_is_absent() {
        let session = Session::mint("alice");
        let raw = format!(
            r#"{{"status":"Ok","event":"echo","session":{:?},"data":"hi"}}"#,
            session.as_str()
        );
        let decoded = Packet::decode(&raw).unwrap();
        assert!(decoded.kind.is_none());
        assert!(decoded.is_response("alice"));
        assert!(!decoded.is_response("bob"));
    }

    #[test]
    fn ignores_unknown_fields() {
        let session = Session::mint("alice");
        let raw = format!(
            r#"{{"type":"request","status":"Ok","event":"echo","session":{:?},"data":[[],{{}}],"extra":"ignored"}}"#,
            session.as_str()
        );
        let decoded = Packet::decode(&raw).unwrap();
        assert_eq!(decoded.event, "echo");
    }
}
