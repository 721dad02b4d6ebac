use clap::Parser;
use std::time::Duration;

#[derive(Parser)]
pub struct Opts {
    /// Websocket URL of the peer to dial.
    #[clap(long, default_value = "ws://127.0.0.1:9001")]
    pub url: String,

    /// Name this endpoint identifies itself as in minted session tokens.
    #[clap(long, default_value = "gateway")]
    pub name: String,

    /// Seconds to wait for a response before a `request` call fails.
    #[clap(long, default_value = "10")]
    pub timeout_seconds: u64,

    /// Seconds to sleep between reconnect attempts.
    #[clap(long, default_value = "3")]
    pub reconnect_backoff_seconds: u64,

    /// If enabled, logs are emitted as JSON instead of human-readable text.
    #[clap(short, long)]
    pub json: bool,
}

impl Opts {
    pub fn read() -> Opts {
        Opts::parse()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_secs(self.reconnect_backoff_seconds)
    }
}
