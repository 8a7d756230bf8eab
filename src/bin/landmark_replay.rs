//! Landmark replay: streams recorded landmark rows from a CSV file to the
//! motion input server, as a stand-in for a live pose-estimation client.
//!
//! Usage: landmark_replay <file.csv> [server_addr] [fps] [--send]
//!
//! Each row holds 132 values (x, y, z, visibility for 33 landmarks). A
//! leading non-numeric column (recorded label) is skipped, as is a header
//! row. `--send` enables key sending before streaming and disables it after.

use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use tracing_subscriber::EnvFilter;

use motion_input::pose::LandmarkFrame;
use motion_input::protocol::{self, ClientMessage, ServerMessage, LANDMARK_COUNT};

const DEFAULT_SERVER_ADDR: &str = "127.0.0.1:39600";
const DEFAULT_FPS: f32 = 30.0;
const FRAME_WIDTH: u32 = 640;
const FRAME_HEIGHT: u32 = 480;

#[derive(Debug)]
struct Args {
    path: String,
    server_addr: String,
    fps: f32,
    send: bool,
}

fn parse_args(args: &[String]) -> Result<Args> {
    let send = args.iter().any(|a| a == "--send");
    let positional: Vec<&String> = args.iter().skip(1).filter(|a| *a != "--send").collect();
    let Some(path) = positional.first() else {
        bail!("usage: landmark_replay <file.csv> [server_addr] [fps] [--send]");
    };
    let server_addr = positional
        .get(1)
        .map(|s| s.to_string())
        .unwrap_or_else(|| DEFAULT_SERVER_ADDR.to_string());
    let fps = match positional.get(2) {
        Some(s) => s.parse::<f32>().with_context(|| format!("invalid fps {:?}", s))?,
        None => DEFAULT_FPS,
    };
    if fps.is_nan() || fps <= 0.0 {
        bail!("fps must be positive, got {}", fps);
    }
    Ok(Args {
        path: path.to_string(),
        server_addr,
        fps,
        send,
    })
}

/// CSV の1行をランドマーク行に変換。ヘッダ行などは None
fn parse_row(line: &str) -> Option<Vec<[f32; 4]>> {
    let mut fields: Vec<&str> = line.split(',').map(str::trim).collect();
    if fields.len() == LANDMARK_COUNT * 4 + 1 {
        fields.remove(0);
    }
    if fields.len() != LANDMARK_COUNT * 4 {
        return None;
    }
    let values: Vec<f32> = fields.iter().map(|f| f.parse().ok()).collect::<Option<_>>()?;
    // 不正フレームはサーバー側で捨てられるだけなので先に除く
    LandmarkFrame::from_flat(&values).ok().map(|frame| frame.to_rows())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = std::env::args().collect();
    let args = parse_args(&args)?;

    let content = std::fs::read_to_string(&args.path)
        .with_context(|| format!("failed to read {}", args.path))?;
    let frames: Vec<Vec<[f32; 4]>> = content.lines().filter_map(parse_row).collect();
    if frames.is_empty() {
        bail!("{} contains no landmark rows", args.path);
    }
    tracing::info!("Landmark Replay ({})", env!("GIT_VERSION"));
    tracing::info!("{} frames from {} at {} fps", frames.len(), args.path, args.fps);

    let tcp = tokio::net::TcpStream::connect(&args.server_addr)
        .await
        .with_context(|| format!("failed to connect to {}", args.server_addr))?;
    tcp.set_nodelay(true)?;
    let mut stream = protocol::message_stream(tcp);

    let ready: ServerMessage = protocol::recv_message(&mut stream).await?;
    if ready != ServerMessage::Ready {
        bail!("unexpected greeting: {:?}", ready);
    }
    if args.send {
        protocol::send_message(&mut stream, &ClientMessage::SetSendPermission { enabled: true }).await?;
    }

    let period = Duration::from_secs_f32(1.0 / args.fps);
    let started = Instant::now();
    let mut interval = tokio::time::interval(period);
    let mut last_rule: Option<String> = None;
    for landmarks in frames {
        interval.tick().await;
        let msg = ClientMessage::Landmarks {
            timestamp_us: started.elapsed().as_micros() as u64,
            width: FRAME_WIDTH,
            height: FRAME_HEIGHT,
            landmarks,
        };
        protocol::send_message(&mut stream, &msg).await?;
        if let ServerMessage::Labels { rule, ml } = protocol::recv_message(&mut stream).await? {
            if rule != last_rule {
                tracing::info!("rule={:?} ml={:?}", rule, ml);
                last_rule = rule;
            }
        }
    }

    if args.send {
        protocol::send_message(&mut stream, &ClientMessage::SetSendPermission { enabled: false }).await?;
    }
    tracing::info!("replay finished in {:.1}s", started.elapsed().as_secs_f32());
    Ok(())
}
