//! Xpra headless client - entry point.
//!
//! ```text
//! xpra-client                          Connect with defaults
//! xpra-client --config <path>          Use custom config TOML
//! xpra-client --host h --port 10000    Override the server address
//! xpra-client --gen-config             Write default config and exit
//! ```

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use xpra_core::{
    Clock, Collaborators, ConnectionState, Engine, SystemClock, TcpTransport, parse_flag,
};
use xpra_client::config::ClientConfig;
use xpra_client::display::{HeadlessDisplay, LogStatus};
use xpra_client::input::{self, InputCapture};

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "xpra-client", about = "Headless Xpra protocol client")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "xpra-client.toml")]
    config: PathBuf,

    /// Server host (overrides config).
    #[arg(long)]
    host: Option<String>,

    /// Server port (overrides config).
    #[arg(short, long)]
    port: Option<u16>,

    /// Server path (overrides config).
    #[arg(long)]
    path: Option<String>,

    /// View-only session: yes/no, true/false, on/off, 1/0.
    #[arg(long, value_name = "FLAG")]
    view_only: Option<String>,

    /// Do not read scripted input from stdin.
    #[arg(long)]
    no_input: bool,

    /// Write the default configuration to the config path and exit.
    #[arg(long)]
    gen_config: bool,
}

/// Sleep until a [`SystemClock`] deadline, or forever without one.
async fn wait_until(deadline: Option<i64>) {
    match deadline {
        Some(at) => {
            let ms = u64::try_from(at - SystemClock.now_ms()).unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
        None => std::future::pending().await,
    }
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        ClientConfig::write_default(&cli.config)?;
        println!("wrote default config to {}", cli.config.display());
        return Ok(());
    }

    let mut config = ClientConfig::load(&cli.config)?;
    if let Some(host) = cli.host {
        config.network.host = host;
    }
    if let Some(port) = cli.port {
        config.network.port = port;
    }
    if let Some(path) = cli.path {
        config.network.path = path;
    }
    if let Some(flag) = cli.view_only.as_deref() {
        config.session.view_only = parse_flag(flag)?;
    }
    config.validate()?;

    // Init tracing.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("xpra-client v{}", env!("CARGO_PKG_VERSION"));

    // ── 1. Build the engine ─────────────────────────────────────

    let (transport, mut events) = TcpTransport::new();
    let mut engine = Engine::new(config.engine_config(), Collaborators {
        transport: Box::new(transport),
        display: Box::new(HeadlessDisplay::new()),
        input: Box::new(InputCapture::default()),
        status: Box::new(LogStatus),
        clock: Box::new(SystemClock),
    });
    if engine.state() == ConnectionState::Fatal {
        return Err(engine.status_message().unwrap_or("fatal error").into());
    }

    // ── 2. Connect ──────────────────────────────────────────────

    let net = &config.network;
    engine.connect(&net.host, net.port, &net.path)?;

    // ── 3. Event loop ───────────────────────────────────────────

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = !cli.no_input;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;

    loop {
        let deadline = engine.next_deadline();
        let pending = engine.has_pending_work();

        tokio::select! {
            event = events.recv() => match event {
                Some(event) => engine.handle_transport_event(event),
                None => break,
            },
            _ = wait_until(deadline) => engine.on_timer(),
            _ = tokio::task::yield_now(), if pending => engine.process_pending(),
            line = stdin.next_line(), if stdin_open => match line {
                Ok(Some(line)) => match input::parse_line(&line) {
                    Ok(Some(action)) => {
                        input::apply(&mut engine, action);
                    }
                    Ok(None) => {}
                    Err(e) => warn!("bad input line: {e}"),
                },
                Ok(None) => stdin_open = false,
                Err(e) => {
                    warn!("stdin: {e}");
                    stdin_open = false;
                }
            },
            result = &mut ctrl_c, if !interrupted => {
                interrupted = true;
                if let Err(e) = result {
                    error!("cannot listen for Ctrl-C: {e}");
                }
                info!("interrupted, disconnecting");
                if engine.disconnect().is_err() {
                    break;
                }
            }
        }

        if matches!(
            engine.state(),
            ConnectionState::Failed | ConnectionState::Disconnected | ConnectionState::Fatal
        ) {
            break;
        }
    }

    // ── 4. Shutdown ─────────────────────────────────────────────

    let stats = *engine.stats();
    info!(
        "shutting down: {} messages, {} draws, server latency {:?} ms",
        stats.messages_received,
        stats.draws,
        engine.latency().last_server_latency()
    );
    match engine.state() {
        ConnectionState::Failed | ConnectionState::Fatal => Err(engine
            .status_message()
            .unwrap_or("connection failed")
            .into()),
        _ => Ok(()),
    }
}
