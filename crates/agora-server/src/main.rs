//! Agora Gateway - Entry point
//!
//! Serves the marketplace endpoints behind the gateway pipeline.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use http::{Method, StatusCode};
use tokio_util::sync::CancellationToken;
use tracing::info;

use agora::config::ConfigLoader;
use agora::core::handler::json_response;
use agora::{Gateway, HandlerError, Request, Response};
use agora_server::{GatewayServer, ShutdownSignal, VERSION};

/// Command-line arguments.
struct Args {
    /// Path to configuration file.
    config: Option<PathBuf>,
}

impl Args {
    fn parse() -> Self {
        let mut args = std::env::args().skip(1);
        let mut config = None;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" | "-c" => {
                    config = args.next().map(PathBuf::from);
                }
                "--help" | "-h" => {
                    print_help();
                    std::process::exit(0);
                }
                "--version" | "-v" => {
                    println!("agora-gateway {VERSION}");
                    std::process::exit(0);
                }
                other => {
                    eprintln!("Unknown argument: {other}");
                    eprintln!("Use --help for usage information");
                    std::process::exit(1);
                }
            }
        }

        Self { config }
    }
}

fn print_help() {
    println!(
        r"Agora Gateway - Request gateway for the services marketplace

USAGE:
    agora-gateway [OPTIONS]

OPTIONS:
    -c, --config <PATH>    Path to configuration file (TOML or JSON)
    -h, --help             Print help information
    -v, --version          Print version information

ENVIRONMENT VARIABLES:
    AGORA__SERVER__HTTP_ADDR               Listen address (default: 0.0.0.0:8080)
    AGORA__BREAKER__FAILURE_THRESHOLD      Failures before a route opens (default: 5)
    AGORA__BREAKER__RECOVERY_WINDOW_SECS   Seconds before a trial request (default: 60)
    AGORA__HEALTH__CRITICAL_ROUTES         Comma-separated routes to probe
    AGORA__TELEMETRY__LOGGING__LEVEL       Log filter (default: info)

    Variables are also read from a .env file in the working directory.

OPERATIONAL ENDPOINTS:
    GET /_gateway/metrics       Request metrics snapshot
    GET /_gateway/health        Critical route health (503 unless all healthy)
    GET /_gateway/breakers      Circuit breaker states
    GET /_gateway/prometheus    Prometheus exposition
"
    );
}

async fn health(_req: Request, _cancel: CancellationToken) -> Result<Response, HandlerError> {
    json_response(
        StatusCode::OK,
        &serde_json::json!({ "status": "ok", "version": VERSION }),
    )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut loader = ConfigLoader::new().with_dotenv();
    if let Some(path) = &args.config {
        loader = loader
            .with_file(path)
            .with_context(|| format!("failed to load {}", path.display()))?;
    }
    let config = loader
        .with_env_prefix("AGORA")
        .load()
        .context("invalid gateway configuration")?;

    agora_telemetry::init_telemetry(&config.telemetry.logging, &config.telemetry.prometheus)
        .context("failed to initialize telemetry")?;

    info!(version = VERSION, config = ?args.config, "starting agora gateway");

    let gateway = Gateway::builder()
        .config(config)
        .handler(Method::GET, "/api/health", health)
        .build()
        .context("failed to build gateway")?;
    let gateway = Arc::new(gateway);

    let tasks = gateway.start_background_tasks();
    let shutdown = ShutdownSignal::with_os_signals()?;

    let result = GatewayServer::new(Arc::clone(&gateway))
        .run_with_shutdown(shutdown)
        .await;

    tasks.stop().await;
    result.context("server error")
}
