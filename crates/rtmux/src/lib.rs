//! A symmetric, bidirectional request/response multiplexer over a duplex
//! websocket connection: either side can call a handler registered on the
//! other side and await its answer, while also serving its own registered
//! handlers to the peer, all over one socket.
//!
//! [`Endpoint`] plus [`supervisor::start`] is the duplex entry point; a
//! real websocket is dialed through [`WebSocketConnector`], or an
//! in-process pair via [`DuplexTransport::pair`] for tests. [`polled`]
//! keeps a half-duplex compatibility loop around for peers that predate
//! true duplex transports.

mod config;
mod endpoint;
mod error;
mod packet;
pub mod polled;
mod queue;
mod registry;
mod session;
pub mod supervisor;
mod transport;
mod wait_set;

pub use config::EndpointConfig;
pub use endpoint::Endpoint;
pub use error::{EndpointError, RequestError};
pub use packet::{Packet, PacketStatus, PacketType};
pub use session::Session;
pub use supervisor::DisconnectReason;
pub use transport::{
    Connector, DuplexTransport, RecvOutcome, Transport, TransportReader, TransportWriter,
    WebSocketConnector, WebSocketTransport,
};
pub use wait_set::WaitOutcome;
