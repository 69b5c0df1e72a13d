//! Hookwire bot
//!
//! Starts a controller, optionally opens a new client through the command
//! server, and logs every event agents push until interrupted.

use anyhow::{Context, Result};
use clap::Parser;
use hookwire::{Controller, Envelope, EventKind};
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info};

/// Command-line options
#[derive(Debug, Parser)]
#[command(name = "hookwire-bot", version, about = "Log events from hooked agents")]
struct Args {
    /// Command server host
    #[arg(long, env = "HOOKWIRE_COMMAND_HOST", default_value = "127.0.0.1")]
    command_host: String,

    /// Command server port
    #[arg(long, env = "HOOKWIRE_COMMAND_PORT", default_value_t = 19088)]
    command_port: u16,

    /// Event listener bind host
    #[arg(long, env = "HOOKWIRE_LISTEN_HOST", default_value = "127.0.0.1")]
    listen_host: String,

    /// Event listener bind port
    #[arg(long, env = "HOOKWIRE_LISTEN_PORT", default_value_t = 18999)]
    listen_port: u16,

    /// Default wait for correlated responses, in seconds
    #[arg(long, env = "HOOKWIRE_TIMEOUT", default_value_t = 10)]
    timeout: u64,

    /// Limit on each command server request, in seconds
    #[arg(long, env = "HOOKWIRE_REQUEST_TIMEOUT", default_value_t = 30)]
    request_timeout: u64,

    /// Target process id handed to the injector
    #[arg(long, env = "HOOKWIRE_PID", default_value_t = 0)]
    pid: u32,

    /// Injector tool to launch on start
    #[arg(long, env = "HOOKWIRE_INJECTOR")]
    injector: Option<PathBuf>,

    /// Ask the command server to open a new client after start
    #[arg(long)]
    open: bool,

    /// Only log these event codes (all events when omitted)
    #[arg(long = "event", value_name = "CODE")]
    events: Vec<i64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    info!("Starting hookwire bot");

    let mut builder = Controller::builder()
        .with_command_addr(args.command_host, args.command_port)
        .with_listen_addr(args.listen_host, args.listen_port)
        .with_timeout(Duration::from_secs(args.timeout))
        .with_request_timeout(Duration::from_secs(args.request_timeout))
        .with_pid(args.pid);
    if let Some(injector) = args.injector {
        builder = builder.with_injector(injector);
    }

    let controller = builder.start().await.context("Failed to start controller")?;
    info!("Listening for agent events at {}", controller.callback_url());

    let kinds: Vec<EventKind> = args.events.into_iter().map(EventKind::from).collect();
    controller.subscribe_many(&kinds, log_event).await;
    controller
        .subscribe(EventKind::Connect, |envelope: &Envelope| -> anyhow::Result<()> {
            info!("Agent {} attached to pid {:?}", envelope.client_id, envelope.pid());
            Ok(())
        })
        .await;

    if args.open {
        match controller.commands().open().await {
            Ok(reply) => info!("Open requested: {}", reply),
            Err(e) => error!("Failed to open client: {}", e),
        }
    }

    serve_until(&controller, tokio::signal::ctrl_c()).await?;

    info!("Bot shutting down");
    Ok(())
}

/// Serve events until `interrupt` resolves, then shut the controller down
///
/// The listener is joined by `run`, so shutdown never races it for the
/// server handle.
async fn serve_until<F>(controller: &Controller, interrupt: F) -> Result<()>
where
    F: Future<Output = std::io::Result<()>>,
{
    let run = controller.run();
    tokio::pin!(run);

    let finished = tokio::select! {
        biased;
        result = &mut run => Some(result),
        signal = interrupt => {
            signal.context("Failed to listen for Ctrl-C")?;
            info!("Interrupted, shutting down");
            None
        }
    };

    controller.shutdown().await?;
    let result = match finished {
        Some(result) => result,
        None => run.await,
    };
    result.context("Event listener failed")
}

fn log_event(envelope: &Envelope) -> anyhow::Result<()> {
    let kind = envelope.kind.map(|kind| kind.to_string()).unwrap_or_default();
    let data = serde_json::to_string(&envelope.data)?;
    info!(client = envelope.client_id, kind = %kind, "{}", data);
    Ok(())
}
