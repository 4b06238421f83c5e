#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

use ::axum::Server;
use anyhow::{Context, Result};
use dotenvy::dotenv;
use promptline::Config;
use std::{net::ToSocketAddrs, process};
use tracing::{error, info};

use crate::{axum::app, utils::logger};

mod axum;
mod http;
mod utils;

#[tokio::main]
async fn main() {
    dotenv().ok();
    let config = Config::from_env();
    let _guard = logger::setup(&config);

    if let Err(err) = serve(&config).await {
        error!("{err:#}");
        process::exit(1);
    }
}

async fn serve(config: &Config) -> Result<()> {
    let app = app::create(config)?;

    let address = (config.host.as_str(), config.port)
        .to_socket_addrs()
        .with_context(|| format!("Invalid listen address {}:{}", config.host, config.port))?
        .next()
        .with_context(|| format!("{} did not resolve to an address", config.host))?;

    let server = Server::try_bind(&address).with_context(|| format!("Failed to bind {address}"))?;

    info!("⚡ Promptline API started on http://{address}");
    server
        .serve(app.into_make_service())
        .await
        .context("Server stopped unexpectedly")
}
