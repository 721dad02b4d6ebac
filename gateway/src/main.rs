mod cli;

use cli::Opts;
use rtmux::{Endpoint, EndpointConfig, WebSocketConnector};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let opts = Opts::read();
    init_tracing(opts.json);

    let config = EndpointConfig {
        timeout: opts.timeout(),
        reconnect_backoff: opts.reconnect_backoff(),
        ..EndpointConfig::default()
    };
    let endpoint = Endpoint::new(opts.name.clone(), config);

    endpoint.set_event("echo", |args, _kwargs| Ok(args));
    endpoint.set_event("ping", |_args, _kwargs| Ok(Value::from("pong")));

    let connector = WebSocketConnector { url: opts.url.clone() };
    let supervisor = tokio::spawn({
        let endpoint = endpoint.clone();
        async move { endpoint.start(connector, true).await }
    });

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    endpoint.close().await;
    let _ = supervisor.await;

    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
