//! Heron - Entry point
//!
//! Runs a demo server with a `/ping` route and simulated dependency probes.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use heron_config::{ConfigLoader, HeronConfig, LogFormat, DEFAULT_ENV_PREFIX};
use heron_core::{envelope, HandlerResult, Request, RequestContext};
use heron_server::{Server, ServerConfig};
use heron_telemetry::{init_logging, LogConfig};
use http::StatusCode;

/// Demo dependencies and how long each probe takes.
const DEMO_PROBES: [(&str, Duration); 3] = [
    ("database", Duration::from_millis(5)),
    ("cache", Duration::from_millis(1)),
    ("storage", Duration::from_millis(10)),
];

/// Command-line arguments.
struct Args {
    /// Path to configuration file.
    config: Option<PathBuf>,
    /// Prefix of environment overrides.
    env_prefix: String,
}

impl Args {
    fn parse() -> Self {
        let mut args = std::env::args().skip(1);
        let mut config = None;
        let mut env_prefix = DEFAULT_ENV_PREFIX.to_string();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" | "-c" => match args.next() {
                    Some(path) => config = Some(PathBuf::from(path)),
                    None => usage_error("--config requires a path"),
                },
                "--env-prefix" => match args.next() {
                    Some(prefix) => env_prefix = prefix,
                    None => usage_error("--env-prefix requires a value"),
                },
                "--help" | "-h" => {
                    print_help();
                    std::process::exit(0);
                }
                "--version" | "-v" => {
                    println!("heron {}", env!("CARGO_PKG_VERSION"));
                    std::process::exit(0);
                }
                other => usage_error(&format!("Unknown argument: {other}")),
            }
        }

        Self { config, env_prefix }
    }
}

fn usage_error(message: &str) -> ! {
    eprintln!("{message}");
    eprintln!("Use --help for usage information");
    std::process::exit(1);
}

fn print_help() {
    println!(
        r"Heron - HTTP server runtime

USAGE:
    heron [OPTIONS]

OPTIONS:
    -c, --config <PATH>       Path to configuration file (JSON or TOML)
        --env-prefix <PREFIX> Prefix of environment overrides (default: HERON)
    -h, --help                Print help information
    -v, --version             Print version information

ENVIRONMENT VARIABLES:
    HERON_HOST                            Bind host (default: 0.0.0.0)
    HERON_PORT                            Bind port (default: 8080)
    HERON__SERVER__SHUTDOWN_TIMEOUT_SECS  Graceful shutdown timeout in seconds
    HERON__SERVER__TRUST_REQUEST_ID       Reuse incoming X-Request-ID values
    HERON__LOGGING__LEVEL                 Log level or filter directive
    HERON__LOGGING__FORMAT                pretty or json
    RUST_LOG                              Overrides the log filter

    Variables may also be set in a .env file in the working directory.

EXAMPLES:
    # Run with a configuration file
    heron --config /etc/heron/heron.json

    # Run on another port
    HERON_PORT=3000 heron
"
    );
}

fn log_config(config: &HeronConfig) -> LogConfig {
    let base = match config.logging.format {
        LogFormat::Json => LogConfig::production(),
        LogFormat::Pretty => LogConfig::development(),
    };
    LogConfig {
        enabled: config.features.enable_logging,
        level: config.logging.level.clone(),
        service_name: "heron".to_string(),
        ..base
    }
}

async fn ping(_ctx: RequestContext, _req: Request) -> HandlerResult {
    Ok(envelope::text(StatusCode::OK, "pong"))
}

async fn serve(args: Args) -> anyhow::Result<()> {
    let mut loader = ConfigLoader::new().with_defaults();
    if let Some(path) = &args.config {
        loader = loader
            .with_file(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
    }
    let config = loader
        .with_dotenv()
        .context("failed to read .env")?
        .with_env_prefix(&args.env_prefix)
        .load()
        .context("invalid configuration")?;

    init_logging(&log_config(&config)).context("failed to initialise logging")?;

    let server = Server::builder()
        .config(ServerConfig::from_config(&config))
        .version(env!("CARGO_PKG_VERSION"))
        .build()?;
    server.get("/ping", ping)?;
    for (name, latency) in DEMO_PROBES {
        server.register_check(name, move || async move {
            tokio::time::sleep(latency).await;
            Ok(())
        })?;
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        addr = %server.config().bind_addr(),
        config = ?args.config,
        "starting heron"
    );
    server.run().await?;
    Ok(())
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if let Err(err) = serve(args).await {
        tracing::error!(error = %format!("{err:#}"), "heron exited with an error");
        eprintln!("heron: {err:#}");
        std::process::exit(1);
    }
}
