use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{error, info, warn, Level};
use vssp_core::fragment::MAX_PAYLOAD;
use vssp_core::AssemblyOverrides;
use vssp_relay::sender::{self, SendOptions};
use vssp_relay::server::{self, ServerState};
use vssp_relay::{bind_ingest_socket, Config, Relay, SharedStats};

/// Pending join/leave events between viewer connections and the relay loop.
const VIEWER_EVENT_BACKLOG: usize = 64;

#[derive(Parser)]
#[command(name = "vssp-relay")]
#[command(about = "VSSP v1.0 fragment reassembly relay", version)]
struct Cli {
    /// Config file (default: ~/.vssp/relay.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Json)]
    log_format: LogFormat,

    /// Overrides `log_level` from the config file
    #[arg(long, global = true)]
    log_level: Option<Level>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Json,
    Pretty,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the relay
    Run {
        /// UDP address to receive fragments on
        #[arg(long)]
        udp: Option<SocketAddr>,
        /// WebSocket and status API address
        #[arg(long)]
        ws: Option<SocketAddr>,
        #[command(flatten)]
        assembly: AssemblyOverrides,
    },
    /// Stream a file or test pattern to a relay as VSSP fragments
    Send {
        #[arg(default_value = "127.0.0.1:8766")]
        target: SocketAddr,
        /// Frame body to send (default: generated test pattern)
        #[arg(long)]
        file: Option<PathBuf>,
        #[arg(long, default_value_t = 30.0)]
        fps: f64,
        #[arg(long, default_value_t = 300)]
        frames: u32,
        #[arg(long, default_value_t = 0)]
        mode: u8,
        #[arg(long, default_value_t = 0)]
        eye: u8,
        #[arg(long, default_value_t = 1)]
        codec: u8,
        /// Fraction of fragments to skip
        #[arg(long, default_value_t = 0.0)]
        loss: f64,
        #[arg(long, default_value_t = 64 * 1024)]
        pattern_size: usize,
        #[arg(long, default_value_t = MAX_PAYLOAD)]
        max_payload: usize,
    },
    /// Print the effective configuration as TOML
    Config,
}

fn init_logging(format: LogFormat, level: Level) -> anyhow::Result<()> {
    let builder = tracing_subscriber::fmt().with_max_level(level);
    let installed = match format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.try_init(),
    };
    installed.map_err(|e| anyhow::anyhow!("setting default subscriber failed: {}", e))
}

fn run_relay(
    mut config: Config,
    udp: Option<SocketAddr>,
    ws: Option<SocketAddr>,
    assembly: &AssemblyOverrides,
) -> anyhow::Result<()> {
    if let Some(udp) = udp {
        config.ingest.bind = udp;
    }
    if let Some(ws) = ws {
        config.viewers.bind = ws;
    }
    assembly.apply(&mut config.assembly);
    config.validate()?;

    let rt = tokio::runtime::Runtime::new().context("Failed to start tokio runtime")?;
    rt.block_on(relay_main(config))
}

async fn relay_main(config: Config) -> anyhow::Result<()> {
    let socket = bind_ingest_socket(config.ingest.bind, config.ingest.recv_buffer)
        .with_context(|| format!("Failed to bind UDP {}", config.ingest.bind))?;
    let listener = TcpListener::bind(config.viewers.bind)
        .await
        .with_context(|| format!("Failed to bind viewer listener {}", config.viewers.bind))?;

    info!(
        udp = %socket.local_addr()?,
        ws = %listener.local_addr()?,
        recv_buffer = config.ingest.recv_buffer,
        completion = ?config.assembly.completion,
        threshold = config.assembly.threshold,
        max_age_ms = config.assembly.max_age_ms,
        max_buffers = config.assembly.max_buffers,
        "VSSP relay listening"
    );

    let stats = SharedStats::default();
    let (events_tx, events_rx) = mpsc::channel(VIEWER_EVENT_BACKLOG);
    let relay: Relay = Relay::new(&config.assembly, stats.clone())?;
    let state = ServerState::new(events_tx, config.viewers.queue_depth, stats);

    tokio::spawn(async move {
        if let Err(e) = server::serve(listener, state).await {
            error!(error = %e, "Viewer server exited with error");
        }
    });

    relay
        .run(socket, events_rx, config.ingest.max_datagram, shutdown_signal())
        .await;
    info!("Relay stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Unable to listen for Ctrl-C, running until killed");
        std::future::pending::<()>().await;
    }
}

fn send(frame: Vec<u8>, options: SendOptions) -> anyhow::Result<()> {
    let rt = tokio::runtime::Runtime::new().context("Failed to start tokio runtime")?;
    rt.block_on(sender::send_frames(&frame, &options))?;
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref());

    let level = cli
        .log_level
        .or_else(|| config.as_ref().ok().and_then(|c| c.level().ok()))
        .unwrap_or(Level::INFO);
    if let Err(e) = init_logging(cli.log_format, level) {
        eprintln!("{}", e);
        std::process::exit(1);
    }

    let result = config.map_err(anyhow::Error::from).and_then(|config| match cli.command {
        Commands::Run { udp, ws, assembly } => run_relay(config, udp, ws, &assembly),
        Commands::Send {
            target,
            file,
            fps,
            frames,
            mode,
            eye,
            codec,
            loss,
            pattern_size,
            max_payload,
        } => {
            let frame = match file {
                Some(path) => std::fs::read(&path)
                    .with_context(|| format!("Failed to read {}", path.display()))?,
                None => sender::test_pattern(pattern_size),
            };
            let options = SendOptions {
                fps,
                frames,
                mode,
                eye,
                codec,
                loss,
                max_payload,
                ..SendOptions::new(target)
            };
            send(frame, options)
        }
        Commands::Config => {
            println!("{}", config.to_toml()?);
            Ok(())
        }
    });

    if let Err(e) = result {
        error!(error = format!("{:#}", e), "Fatal Error");
        std::process::exit(1);
    }
}
