use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use gateway_client::{exchange, GatewayClient, GatewayConfig};
use tracing_subscriber::EnvFilter;

/// Sends a request to a text gateway and prints the reply.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    #[arg(long, env = "GATEWAY_HOST", default_value = "127.0.0.1")]
    host: String,

    #[arg(long, env = "GATEWAY_PORT", default_value_t = 17991)]
    port: u16,

    /// Request sent verbatim to the gateway.
    #[arg(long, env = "GATEWAY_REQUEST")]
    request: String,

    /// WHATWG label of the gateway's text encoding.
    #[arg(long, env = "GATEWAY_ENCODING", default_value = "gbk")]
    encoding: String,

    #[arg(long, env = "GATEWAY_CONNECT_TIMEOUT_MS", default_value_t = 1000)]
    connect_timeout_ms: u64,

    /// Timeout for each write and each read.
    #[arg(long, env = "GATEWAY_IO_TIMEOUT_MS", default_value_t = 2000)]
    io_timeout_ms: u64,

    /// How many times to send the request over the same connection.
    #[arg(long, default_value_t = 2)]
    repeat: u32,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let config = GatewayConfig::default()
        .with_connect_timeout(Duration::from_millis(args.connect_timeout_ms))
        .with_encoding(GatewayConfig::encoding_for_label(&args.encoding)?);
    let io_timeout = Duration::from_millis(args.io_timeout_ms);

    let mut client = GatewayClient::with_config(&args.host, args.port, config)
        .with_context(|| format!("Should resolve gateway {}:{}", args.host, args.port))?;

    if !client.connect().context("couldn't connect to gateway")? {
        anyhow::bail!("gateway {} did not accept the connection", client.remote_addr());
    }

    for round in 0..args.repeat {
        if !client.is_open() {
            tracing::warn!(round, "gateway connection lost");
            break;
        }

        tracing::info!(">>> {}", args.request);
        match exchange(&mut client, &args.request, io_timeout) {
            Ok(reply) => {
                tracing::info!("<<< {}", reply);
                println!("{reply}");
            }
            Err(e) => tracing::warn!(round, error = %e, "gateway call failed"),
        }
    }

    client.close();
    Ok(())
}
