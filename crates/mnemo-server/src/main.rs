// ============================================================================
// mnemo-gateway — streaming chat completions with long-term caller memory
// ============================================================================
// Usage:
//   mnemo-gateway serve [--host HOST] [--port PORT]   Run the HTTP gateway
//   mnemo-gateway probe --query Q --user ID --runs N  Measure memory search latency
// ============================================================================

use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use mnemo_server::{bootstrap, router, AppState, GatewayConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Memory-augmented OpenAI-compatible gateway
#[derive(Parser)]
#[command(name = "mnemo-gateway", version, about = "Streaming chat gateway with long-term memory")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the chat completions endpoint (default)
    Serve {
        /// Bind host (overrides MNEMO_HOST)
        #[arg(long)]
        host: Option<String>,

        /// Bind port (overrides MNEMO_PORT)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Time memory searches against the configured backend
    Probe {
        /// Query text to search with
        #[arg(long, default_value = "User: what do you remember about me?")]
        query: String,

        /// Memory identity to search under
        #[arg(long, default_value = "anonymous")]
        user: String,

        /// Number of timed searches
        #[arg(long, default_value_t = 5)]
        runs: usize,
    },
}

fn init_tracing() {
    let mut filter = EnvFilter::from_default_env();
    for directive in ["mnemo_core=debug", "mnemo_server=debug", "mnemo_gateway=debug"] {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn serve(config: GatewayConfig) -> Result<()> {
    let pipeline = bootstrap::pipeline(&config).await?;
    let app = router(AppState::new(pipeline));

    let address = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&address).await?;
    info!("Gateway listening on {}", address);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await?;
    Ok(())
}

async fn probe(config: GatewayConfig, query: &str, user: &str, runs: usize) -> Result<()> {
    let Some(gateway) = bootstrap::connect_memory(&config).await? else {
        bail!("No memory backend configured (set MEMORY_BACKEND or MEM0_API_KEY)");
    };

    println!("Probing {} with {} searches for '{}'", gateway.name(), runs, user);

    let mut timings: Vec<Duration> = Vec::with_capacity(runs);
    for run in 1..=runs {
        let started = Instant::now();
        let outcome = gateway.search(query, user, config.search_limit).await;
        let elapsed = started.elapsed();
        match outcome {
            Ok(memories) => println!(
                "  #{:<3} {:>8.1} ms  {} memories",
                run,
                elapsed.as_secs_f64() * 1000.0,
                memories.len()
            ),
            Err(e) => println!("  #{:<3} {:>8.1} ms  error: {}", run, elapsed.as_secs_f64() * 1000.0, e),
        }
        timings.push(elapsed);
    }

    if let (Some(min), Some(max)) = (timings.iter().min(), timings.iter().max()) {
        let total: Duration = timings.iter().sum();
        let avg = total.as_secs_f64() * 1000.0 / timings.len() as f64;
        println!();
        println!(
            "avg {:.1} ms  min {:.1} ms  max {:.1} ms",
            avg,
            min.as_secs_f64() * 1000.0,
            max.as_secs_f64() * 1000.0
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("Warning: Could not load .env file: {}", e);
    }

    init_tracing();

    let cli = Cli::parse();
    let mut config = GatewayConfig::from_env()?;

    match cli.command.unwrap_or(Commands::Serve {
        host: None,
        port: None,
    }) {
        Commands::Serve { host, port } => {
            if let Some(host) = host {
                config.host = host;
            }
            if let Some(port) = port {
                config.port = port;
            }
            info!("Starting mnemo gateway (memory backend: {})", config.memory_backend);
            serve(config).await
        }
        Commands::Probe { query, user, runs } => probe(config, &query, &user, runs).await,
    }
}
