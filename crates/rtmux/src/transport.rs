use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite;

/// What one `recv` call on a transport yielded.
#[derive(Debug)]
pub enum RecvOutcome {
    /// A text frame to decode.
    Frame(String),
    /// The peer closed gracefully. `code` is the websocket close code when
    /// the underlying transport exposes one — used by
    /// [`crate::supervisor::start`] against `ok_close_codes`.
    Closed { code: Option<u16> },
}

/// The reading half of a duplex byte-message channel: the core consumes
/// such a channel with graceful and error close indications, regardless of
/// what sits underneath it.
#[async_trait]
pub trait TransportReader: Send {
    /// `Err(_)` is a transport failure — fatal to the receiver loop.
    async fn recv(&mut self) -> anyhow::Result<RecvOutcome>;
}

/// The writing half of a duplex byte-message channel.
#[async_trait]
pub trait TransportWriter: Send {
    async fn send(&mut self, text: String) -> anyhow::Result<()>;
    async fn close(&mut self) -> anyhow::Result<()>;
}

/// A connected duplex transport, split into independent read/write halves so
/// the receiver and sender loops can run concurrently without contending on
/// the same handle — the direct analogue of `stream.split()` on an axum or
/// tokio-tungstenite websocket.
pub trait Transport: Send {
    type Reader: TransportReader;
    type Writer: TransportWriter;

    fn split(self) -> (Self::Reader, Self::Writer);
}

/// Dials a transport given the connector's own configuration. The default
/// implementation, [`WebSocketConnector`], dials a real websocket via
/// `tokio_tungstenite::connect_async`; tests substitute
/// [`DuplexTransport::pair`] instead.
#[async_trait]
pub trait Connector: Send + Sync {
    type Transport: Transport;

    async fn connect(&self) -> anyhow::Result<Self::Transport>;
}

/// Connector that dials a real websocket URL.
pub struct WebSocketConnector {
    pub url: String,
}

type WsStream = tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

pub struct WebSocketTransport {
    inner: WsStream,
}

pub struct WebSocketReader(SplitStream<WsStream>);
pub struct WebSocketWriter(SplitSink<WsStream, tungstenite::Message>);

#[async_trait]
impl Connector for WebSocketConnector {
    type Transport = WebSocketTransport;

    async fn connect(&self) -> anyhow::Result<Self::Transport> {
        tracing::info!(url = %self.url, "connecting");
        let (stream, _response) = tokio_tungstenite::connect_async(&self.url).await?;
        Ok(WebSocketTransport { inner: stream })
    }
}

impl Transport for WebSocketTransport {
    type Reader = WebSocketReader;
    type Writer = WebSocketWriter;

    fn split(self) -> (Self::Reader, Self::Writer) {
        let (writer, reader) = self.inner.split();
        (WebSocketReader(reader), WebSocketWriter(writer))
    }
}

#[async_trait]
impl TransportReader for WebSocketReader {
    async fn recv(&mut self) -> anyhow::Result<RecvOutcome> {
        loop {
            return match self.0.next().await {
                None => Ok(RecvOutcome::Closed { code: None }),
                Some(Ok(tungstenite::Message::Text(text))) => Ok(RecvOutcome::Frame(text)),
                Some(Ok(tungstenite::Message::Ping(_) | tungstenite::Message::Pong(_))) => {
                    // Native ping/pong is handled below tokio-tungstenite's
                    // stream layer; nothing to surface, keep reading.
                    continue;
                }
                Some(Ok(tungstenite::Message::Close(frame))) => Ok(RecvOutcome::Closed {
                    code: frame.map(|f| u16::from(f.code)),
                }),
                Some(Ok(_other)) => continue,
                Some(Err(err)) => Err(err.into()),
            };
        }
    }
}

#[async_trait]
impl TransportWriter for WebSocketWriter {
    async fn send(&mut self, text: String) -> anyhow::Result<()> {
        self.0.send(tungstenite::Message::Text(text)).await?;
        Ok(())
    }

    async fn close(&mut self) -> anyhow::Result<()> {
        self.0.close().await?;
        Ok(())
    }
}

/// An in-process transport backed by a pair of `tokio::sync::mpsc` channels.
/// Used by this crate's own integration tests to exercise full
/// request/response round trips without a live socket.
pub struct DuplexTransport {
    outbound: tokio::sync::mpsc::Sender<String>,
    inbound: tokio::sync::mpsc::Receiver<String>,
}

impl DuplexTransport {
    /// Builds a connected pair: writes on one side arrive as reads on the
    /// other.
    pub fn pair(capacity: usize) -> (Self, Self) {
        let (tx_a, rx_a) = tokio::sync::mpsc::channel(capacity);
        let (tx_b, rx_b) = tokio::sync::mpsc::channel(capacity);
        (
            Self {
                outbound: tx_a,
                inbound: rx_b,
            },
            Self {
                outbound: tx_b,
                inbound: rx_a,
            },
        )
    }
}

pub struct DuplexReader(tokio::sync::mpsc::Receiver<String>);
pub struct DuplexWriter(tokio::sync::mpsc::Sender<String>);

impl Transport for DuplexTransport {
    type Reader = DuplexReader;
    type Writer = DuplexWriter;

    fn split(self) -> (Self::Reader, Self::Writer) {
        (DuplexReader(self.inbound), DuplexWriter(self.outbound))
    }
}

#[async_trait]
impl TransportReader for DuplexReader {
    async fn recv(&mut self) -> anyhow::Result<RecvOutcome> {
        Ok(match self.0.recv().await {
            Some(text) => RecvOutcome::Frame(text),
            None => RecvOutcome::Closed { code: None },
        })
    }
}

#[async_trait]
impl TransportWriter for DuplexWriter {
    async fn send(&mut self, text: String) -> anyhow::Result<()> {
        self.0
            .send(text)
            .await
            .map_err(|_| anyhow::anyhow!("peer side of the duplex transport was dropped"))
    }

    async fn close(&mut self) -> anyhow::Result<()> {
        // Dropping the sender half closes the channel from our end; there is
        // nothing else to flush for an in-process channel.
        Ok(())
    }
}
