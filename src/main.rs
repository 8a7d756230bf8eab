//! Motion input server: receives pose landmarks over TCP, classifies them
//! (rule set + optional ONNX model) and turns the active pose label into
//! key presses.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::oneshot;
use tracing_subscriber::EnvFilter;

use motion_input::classifier::{load_with_fallback, spawn_ml_worker};
use motion_input::config::Config;
use motion_input::input::{spawn_input_worker, KeySink, LogKeySink, OscKeySink, SchemeRegistry};
use motion_input::server::{serve_until, shutdown_signal, shutdown_workers, ConsoleCommand, ServerContext};
use motion_input::state::SharedState;
use motion_input::worker::Worker;

const CONFIG_PATH: &str = "config.toml";
const WORKER_STOP_TIMEOUT: Duration = Duration::from_millis(500);

fn build_sink(config: &Config) -> Result<Arc<dyn KeySink>> {
    let sink: Arc<dyn KeySink> = match config.key_sink.kind.as_str() {
        "osc" => Arc::new(OscKeySink::new(&config.key_sink.addr)?),
        _ => Arc::new(LogKeySink),
    };
    Ok(sink)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::load_or_default(CONFIG_PATH)?;
    tracing::info!("Motion Input ({})", env!("GIT_VERSION"));
    tracing::info!("Listen: {}", config.app.listen_addr);
    tracing::info!("Key sink: {} ({})", config.key_sink.kind, config.key_sink.addr);

    // スキームの不備は起動時に止める
    let registry = SchemeRegistry::with_overrides(&config.schemes);
    tracing::info!("Schemes: {}", registry.names().collect::<Vec<_>>().join(", "));
    let scheme = registry
        .resolve(&config.app.scheme)
        .context("invalid control scheme")?;
    let state = Arc::new(SharedState::new(scheme, config.app.mode));
    tracing::info!("Mode: {}", config.app.mode.as_str());

    let sink = build_sink(&config)?;

    let mut workers: Vec<Worker> = Vec::new();
    match load_with_fallback(&config.vision_ml) {
        Some(model) => workers.push(spawn_ml_worker(Arc::clone(&state), model, &config.vision_ml)?),
        None => tracing::warn!("full_body mode will report no label"),
    }
    workers.push(spawn_input_worker(Arc::clone(&state), sink, &config.input)?);

    let ctx = Arc::new(ServerContext::new(Arc::clone(&state), registry));

    // Console input: 's' permission, 'm' mode, 'c <name>' scheme, 'q' quit
    let (quit_tx, quit_rx) = oneshot::channel::<()>();
    {
        let ctx = Arc::clone(&ctx);
        std::thread::spawn(move || {
            let stdin = std::io::stdin();
            let mut line = String::new();
            loop {
                line.clear();
                match stdin.read_line(&mut line) {
                    Ok(0) | Err(_) => return,
                    Ok(_) => {}
                }
                match ConsoleCommand::parse(&line) {
                    Some(ConsoleCommand::Quit) => {
                        let _ = quit_tx.send(());
                        return;
                    }
                    Some(cmd) => cmd.apply(&ctx),
                    None => eprintln!("[input] commands: s | m | c <scheme> | q"),
                }
            }
        });
    }

    let bind_addr: std::net::SocketAddr = config.app.listen_addr.parse()
        .context("invalid listen_addr")?;
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!("Listening on {}", bind_addr);

    // 'q' か Ctrl-C で止め、押下中のキーを離してから終わる
    let result = serve_until(listener, ctx, shutdown_signal(quit_rx)).await;
    shutdown_workers(&state, &mut workers, WORKER_STOP_TIMEOUT);
    result
}
