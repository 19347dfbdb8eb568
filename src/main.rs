mod config;
mod error;
mod gateway;
mod upstream;
mod utils;

use anyhow::Result;
use clap::Parser;

use crate::config::Settings;

#[derive(Debug, Parser)]
#[command(name = "kalshi-gateway", version, about = "CORS-enabled gateway to the Kalshi trading API")]
struct Cli {
    /// Override GATEWAY_HOST
    #[arg(long)]
    host: Option<String>,

    /// Override GATEWAY_PORT
    #[arg(long)]
    port: Option<u16>,

    /// Override UPSTREAM_BASE_URL
    #[arg(long)]
    upstream_base_url: Option<String>,

    /// Override FORWARD_AUTHORIZATION (true|false)
    #[arg(long)]
    forward_authorization: Option<bool>,

    /// Serve this directory under /static
    #[arg(long)]
    static_dir: Option<String>,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let mut settings = Settings::load()?;
    if let Some(h) = cli.host {
        settings.host = h;
    }
    if let Some(p) = cli.port {
        settings.port = p;
    }
    if let Some(u) = cli.upstream_base_url {
        settings.upstream_base_url = u.trim_end_matches('/').to_string();
    }
    if let Some(f) = cli.forward_authorization {
        settings.forward_authorization = f;
    }
    if let Some(d) = cli.static_dir {
        settings.static_dir = Some(d);
    }
    settings.validate()?;

    log::info!(
        "app.start addr={} upstream={} forward_authorization={}",
        settings.listen_addr(),
        settings.upstream_base_url,
        settings.forward_authorization
    );

    gateway::serve(settings).await
}
