use std::io::{self, Write};

use authgate::{ServerConfig, Supervisor};
use clap::Parser;
use crossterm::execute;
use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser, Debug)]
#[command(name = "authgate-server")]
#[command(about = "Auth service over gRPC with a JSON/HTTP gateway", long_about = None)]
#[command(version)]
struct Args {
    /// Host both listeners bind to
    #[arg(short = 'H', long, env = "AUTHGATE_HOST")]
    host: Option<String>,

    /// gRPC listener port
    #[arg(long, env = "AUTHGATE_GRPC_PORT")]
    grpc_port: Option<u16>,

    /// HTTP gateway port
    #[arg(long, env = "AUTHGATE_GATEWAY_PORT")]
    gateway_port: Option<u16>,

    /// gRPC endpoint the gateway dials instead of the local listener
    #[arg(long, env = "AUTHGATE_UPSTREAM")]
    upstream: Option<String>,

    /// Enable metrics endpoint
    #[arg(long, env = "AUTHGATE_METRICS_ENABLED")]
    metrics: bool,

    /// Metrics port
    #[arg(long, env = "AUTHGATE_METRICS_PORT")]
    metrics_port: Option<u16>,
}

impl Args {
    fn apply(&self, config: &mut ServerConfig) {
        if let Some(host) = &self.host {
            config.grpc.host = host.clone();
            config.gateway.host = host.clone();
        }
        if let Some(port) = self.grpc_port {
            config.grpc.port = port;
        }
        if let Some(port) = self.gateway_port {
            config.gateway.port = port;
        }
        if let Some(upstream) = &self.upstream {
            config.gateway.upstream = upstream.clone();
        }
        if self.metrics {
            config.metrics.enabled = true;
        }
        if let Some(port) = self.metrics_port {
            config.metrics.port = port;
        }
    }
}

fn println_colored(color: Color, text: &str) {
    let mut stdout = io::stdout();
    execute!(stdout, SetForegroundColor(color), Print(text), ResetColor).ok();
    println!();
    stdout.flush().ok();
}

fn display_banner(config: &ServerConfig) {
    println!();
    println_colored(
        Color::Cyan,
        "+---------------------------------------------------------+",
    );
    println_colored(
        Color::Cyan,
        "|            authgate: gRPC + JSON/HTTP gateway           |",
    );
    println_colored(
        Color::Cyan,
        "+---------------------------------------------------------+",
    );
    println_colored(
        Color::White,
        &format!("  gRPC:    {}:{}", config.grpc.host, config.grpc.port),
    );
    println_colored(
        Color::White,
        &format!("  Gateway: {}:{}", config.gateway.host, config.gateway.port),
    );
    println_colored(
        Color::White,
        &format!(
            "  Metrics: {}",
            if config.metrics.enabled {
                "enabled"
            } else {
                "disabled"
            }
        ),
    );
    println!();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = ServerConfig::from_env().unwrap_or_else(|e| {
        error!("Failed to load configuration: {e}");
        info!("Using default configuration");
        ServerConfig::default()
    });
    args.apply(&mut config);

    if let Err(e) = config.validate() {
        println_colored(Color::Red, &format!("Configuration validation failed: {e}"));
        return Err(e.into());
    }

    display_banner(&config);

    if config.metrics.enabled {
        let metrics_addr = config.metrics.addr()?;
        if let Err(e) = metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(metrics_addr)
            .install()
        {
            error!("Failed to start metrics server: {e}");
        } else {
            info!("Metrics server started on {metrics_addr}");
        }
    }

    let supervisor = match Supervisor::bind(&config).await {
        Ok(supervisor) => supervisor,
        Err(e) => {
            println_colored(Color::Red, &format!("Startup failed: {e}"));
            return Err(e.into());
        }
    };

    println_colored(
        Color::Green,
        &format!(
            "Serving gRPC on {} and HTTP on {}",
            supervisor.grpc_addr(),
            supervisor.gateway_addr()
        ),
    );

    match supervisor.run(shutdown_signal()).await {
        Ok(()) => {
            println_colored(Color::Green, "Server shutdown complete. Goodbye!");
            Ok(())
        }
        Err(e) => {
            println_colored(Color::Red, &format!("Server error: {e}"));
            Err(e.into())
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received terminate signal");
        },
    }

    info!("Initiating graceful shutdown (allowing in-flight requests to complete)");
}
