//! Minaret backend server.

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use minaret::{config::Config, create_app_with_state, state::AppState};

/// Minaret - Chromecast announcement broadcast backend
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Port the HTTP server listens on
    #[arg(short, long, env = "MINARET_PORT")]
    port: Option<u16>,

    /// Directory the announcement media files are served from
    #[arg(long, env = "MINARET_MEDIA_PATH")]
    media_path: Option<PathBuf>,

    /// Display name of the preferred cast device
    #[arg(short, long, env = "MINARET_DEVICE")]
    device: Option<String>,

    /// Base URL cast devices fetch media from (defaults to this host's LAN address)
    #[arg(long, env = "MINARET_BASE_URL")]
    base_url: Option<String>,
}

fn init_logging(config: &Config) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = match &config.log_level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    // When a log file is configured, write there instead of stderr so a
    // systemd unit or launchd job keeps a persistent record.
    if let Some(path) = &config.log_file {
        match std::fs::OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => {
                let (non_blocking, guard) = tracing_appender::non_blocking(file);
                fmt()
                    .with_env_filter(filter)
                    .with_writer(non_blocking)
                    .with_ansi(false)
                    .with_target(false)
                    .compact()
                    .init();
                return Some(guard);
            }
            Err(e) => {
                eprintln!("Could not open log file {:?} ({}), logging to stderr", path, e);
            }
        }
    }

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
    None
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = Config::from_figment(args.port, args.media_path, args.device, args.base_url)?;
    let _log_guard = init_logging(&config);

    info!("Starting Minaret backend server...");
    info!("Media directory: {:?}", config.media_path);
    info!("Primary device: '{}'", config.primary_device);

    let port = config.port;
    let state = AppState::with_cast_stack(config);
    state.start_services();

    let app = create_app_with_state(state.clone()).await;

    // Bind to 0.0.0.0 so cast devices on the LAN can reach the media files
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Server listening on {}", addr);
    info!("Swagger UI available at http://localhost:{}/swagger-ui/", port);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    let shutdown_state = state.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::signal::ctrl_c()
                .await
                .expect("Failed to install Ctrl+C handler");
            info!("Received Ctrl+C, shutting down gracefully...");
            shutdown_state.shutdown().await;
        })
        .await?;

    Ok(())
}
