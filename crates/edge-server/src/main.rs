mod error;
mod handlers;
mod state;
mod static_files;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::handlers::router;
use crate::state::{create_default_config, load_config, AppState};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    #[arg(long, env = "EDGE_CONFIG", default_value = "edge.toml")]
    config: PathBuf,
    /// Overrides `server.listen` from the config file.
    #[arg(long, env = "EDGE_LISTEN")]
    listen: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    if !args.config.exists() {
        warn!(path = %args.config.display(), "config file missing, creating default config");
        create_default_config(&args.config)?;
    }

    let config = load_config(&args.config)?;
    let listen = match args.listen {
        Some(listen) => listen,
        None => config.get_string("server.listen").parse::<SocketAddr>()?,
    };
    let state = Arc::new(AppState::from_config(args.config.clone(), config)?);
    info!(
        config = %state.config_path.display(),
        rewrites = state.kernel.rewrites().len(),
        image_domains = ?state.kernel.images().allowlist.domains(),
        react_strict_mode = state.config.get_bool("app.react_strict_mode"),
        "configuration loaded"
    );

    let app = router(state);

    info!("edgeway listening on {}", listen);
    let listener = tokio::net::TcpListener::bind(listen).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
