//! trackmind-analyzer - audio analysis pipeline
//!
//! `analyze` runs one file and prints the report; `serve` exposes the
//! pipeline over HTTP + SSE; `init-config` writes a default config file.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use trackmind_analyzer::config::resolve_llm_api_key;
use trackmind_analyzer::dsp::EngineProvider;
use trackmind_analyzer::models::AudioSource;
use trackmind_analyzer::workflow::PipelineOrchestrator;
use trackmind_analyzer::AppState;
use trackmind_common::config::{resolve_config_path, write_toml_config, TomlConfig};
use trackmind_common::ProgressEmitter;

/// Command-line arguments for trackmind-analyzer
#[derive(Parser, Debug)]
#[command(name = "trackmind-analyzer")]
#[command(about = "Audio analysis pipeline: tempo, key, chords and creative commentary")]
#[command(version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("GIT_HASH"), ")"))]
struct Args {
    /// Config file (defaults to <config_dir>/trackmind/config.toml)
    #[arg(short, long, global = true, env = "TRACKMIND_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyse one audio file
    Analyze {
        /// Audio file to analyse
        file: PathBuf,

        /// Display name used in the report
        #[arg(short, long)]
        name: Option<String>,

        /// Skip uploading (and therefore creative analysis)
        #[arg(long)]
        no_upload: bool,

        /// Print the result as JSON instead of the text report
        #[arg(long)]
        json: bool,
    },

    /// Serve the HTTP API
    Serve {
        /// Address to bind
        #[arg(long, env = "TRACKMIND_HOST")]
        host: Option<String>,

        /// Port to listen on
        #[arg(short, long, env = "TRACKMIND_PORT")]
        port: Option<u16>,
    },

    /// Write a config file populated with defaults
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn init_tracing(default_level: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("trackmind_analyzer={0},trackmind_common={0},tower_http=info", default_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = resolve_config_path(args.config.as_deref());
    let config = TomlConfig::load_or_default(config_path.as_deref()).context("Failed to load configuration")?;

    init_tracing(&config.logging.level);
    info!(version = env!("CARGO_PKG_VERSION"), git = env!("GIT_HASH"), "trackmind-analyzer starting");

    match args.command {
        Command::Analyze {
            file,
            name,
            no_upload,
            json,
        } => {
            let mut config = config;
            if no_upload {
                config.upload.enabled = false;
            }
            let success = analyze(config, file, name, json).await?;
            if !success {
                std::process::exit(1);
            }
            Ok(())
        }
        Command::Serve { host, port } => {
            let mut config = config;
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            serve(config).await
        }
        Command::InitConfig { force } => {
            let path = config_path.context("No config directory available on this platform")?;
            if path.exists() && !force {
                anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
            }
            write_toml_config(&TomlConfig::default(), &path)?;
            println!("{}", path.display());
            Ok(())
        }
    }
}

async fn analyze(config: TomlConfig, file: PathBuf, name: Option<String>, json: bool) -> Result<bool> {
    let path = std::fs::canonicalize(&file).with_context(|| format!("Cannot open {}", file.display()))?;
    let source = AudioSource::new(path, name)?;

    let engines = Arc::new(EngineProvider::native());
    let orchestrator = PipelineOrchestrator::from_config(&config, engines, resolve_llm_api_key(&config));

    let emitter = ProgressEmitter::new(config.progress.capacity);
    let mut rx = emitter.subscribe();
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            eprintln!("[{}] {}", event.step_name, event.message);
        }
    });

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling analysis");
            on_interrupt.cancel();
        }
    });

    let result = orchestrator.run(source, &emitter, &cancel).await;
    drop(emitter);
    if let Err(e) = printer.await {
        warn!(error = %e, "Progress printer ended abnormally");
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("{}", result.message);
        if let Some(features) = &result.technical {
            println!("\n{}", features.report());
        }
        eprintln!("{}", result.final_message);
    }

    Ok(result.is_success())
}

async fn serve(config: TomlConfig) -> Result<()> {
    let engines = Arc::new(EngineProvider::native());

    // Warm the engine so the first request does not pay for it
    let warm = Arc::clone(&engines);
    match tokio::task::spawn_blocking(move || warm.get().map(|_| ())).await {
        Ok(Ok(())) => info!("Feature engine initialized"),
        Ok(Err(e)) => warn!(error = %e, "Feature engine init failed, will retry on first request"),
        Err(e) => warn!(error = %e, "Feature engine init task failed"),
    }

    let orchestrator = Arc::new(PipelineOrchestrator::from_config(
        &config,
        Arc::clone(&engines),
        resolve_llm_api_key(&config),
    ));
    let state = AppState::new(orchestrator, engines, config.progress.capacity);
    let shutdown = state.shutdown.clone();
    let app = trackmind_analyzer::build_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            shutdown.cancel();
        })
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received terminate signal, shutting down"),
    }
}
