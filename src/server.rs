//! Landmark server: receives frames over TCP, classifies them with the rule
//! set and publishes frame + label into the shared state for the workers.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures::StreamExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;

use crate::input::SchemeRegistry;
use crate::pose::rules::matching_labels;
use crate::pose::{classify_rules, FrameSize, LandmarkFrame, PoseLabel};
use crate::protocol::{self, ClientMessage, ServerMessage};
use crate::state::{LabelSource, SharedState};
use crate::worker::Worker;

/// 接続間で共有するサーバー状態
pub struct ServerContext {
    pub state: Arc<SharedState>,
    pub registry: SchemeRegistry,
}

impl ServerContext {
    pub fn new(state: Arc<SharedState>, registry: SchemeRegistry) -> Self {
        Self { state, registry }
    }

    /// 1メッセージを処理し、返信があれば返す
    pub fn handle_message(&self, msg: ClientMessage) -> Option<ServerMessage> {
        match msg {
            ClientMessage::Landmarks {
                width,
                height,
                landmarks,
                ..
            } => {
                // 不正フレームは捨てるが、返信は常に現在のラベルで返す
                match LandmarkFrame::from_rows(&landmarks) {
                    Ok(frame) => {
                        self.ingest_frame(frame, FrameSize::new(width, height));
                    }
                    Err(e) => tracing::debug!("landmark frame dropped: {}", e),
                }
                Some(ServerMessage::Labels {
                    rule: label_name(self.state.rule_label()),
                    ml: label_name(self.state.ml_label()),
                })
            }
            ClientMessage::SetSendPermission { enabled } => {
                self.state.set_send_permission(enabled);
                tracing::info!("send permission: {}", enabled);
                None
            }
            ClientMessage::SelectMode { mode } => {
                match mode.parse::<LabelSource>() {
                    Ok(mode) => {
                        self.state.set_mode(mode);
                        tracing::info!("label source: {}", mode.as_str());
                    }
                    Err(e) => tracing::warn!("{:#}", e),
                }
                None
            }
            ClientMessage::SelectScheme { name } => {
                let reply = match self.state.activate_named_scheme(&self.registry, &name) {
                    Ok(()) => ServerMessage::SchemeAck { ok: true, error: None },
                    Err(e) => {
                        tracing::warn!("scheme not activated: {}", e);
                        ServerMessage::SchemeAck {
                            ok: false,
                            error: Some(e.to_string()),
                        }
                    }
                };
                Some(reply)
            }
        }
    }

    /// ルール分類してフレームとラベルを公開する
    pub fn ingest_frame(&self, frame: LandmarkFrame, size: FrameSize) -> PoseLabel {
        let label = classify_rules(&frame, size);
        if self.state.rule_label() != Some(label) {
            tracing::debug!("rule label -> {} (matched {:?})", label, matching_labels(&frame, size));
            tracing::trace!("landmarks:\n{}", frame.describe(size));
        }
        self.state.publish_frame(frame, size);
        self.state.set_rule_label(label);
        label
    }
}

fn label_name(label: Option<PoseLabel>) -> Option<String> {
    label.map(|l| l.as_str().to_string())
}

/// 1クライアント分の受信ループ
pub async fn serve_connection(stream: TcpStream, ctx: Arc<ServerContext>) -> Result<()> {
    let framed = protocol::message_stream(stream);
    let (mut sink, mut reader) = framed.split();
    protocol::send_to_sink(&mut sink, &ServerMessage::Ready).await?;

    loop {
        let bytes = match reader.next().await {
            Some(Ok(b)) => b,
            Some(Err(e)) => return Err(e.into()),
            None => return Ok(()),
        };
        let msg: ClientMessage = match bincode::deserialize(&bytes) {
            Ok(m) => m,
            Err(e) => {
                tracing::debug!("malformed client message dropped: {}", e);
                continue;
            }
        };
        if let Some(reply) = ctx.handle_message(msg) {
            protocol::send_to_sink(&mut sink, &reply).await?;
        }
    }
}

/// 接続を受け付け続ける
pub async fn run_listener(listener: TcpListener, ctx: Arc<ServerContext>) -> Result<()> {
    loop {
        let (tcp_stream, addr) = listener.accept().await.context("accept failed")?;
        tcp_stream.set_nodelay(true)?;
        tracing::info!("client connected: {}", addr);
        let ctx = Arc::clone(&ctx);
        tokio::spawn(async move {
            if let Err(e) = serve_connection(tcp_stream, ctx).await {
                tracing::warn!("client {} error: {:#}", addr, e);
            }
            tracing::info!("client disconnected: {}", addr);
        });
    }
}

/// `shutdown` が完了するまで接続を受け付ける
pub async fn serve_until<F>(listener: TcpListener, ctx: Arc<ServerContext>, shutdown: F) -> Result<()>
where
    F: Future<Output = ()>,
{
    tokio::select! {
        r = run_listener(listener, ctx) => r,
        () = shutdown => Ok(()),
    }
}

/// コンソールの quit か Ctrl-C のどちらかで完了する
///
/// The console sender being dropped (stdin closed) does not count as a quit.
pub async fn shutdown_signal(quit_rx: oneshot::Receiver<()>) {
    let console = async {
        if quit_rx.await.is_err() {
            std::future::pending::<()>().await;
        }
        tracing::info!("quit requested from console");
    };
    let interrupt = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("interrupt received, shutting down"),
            Err(e) => {
                tracing::warn!("Ctrl-C handler unavailable: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    tokio::select! {
        () = console => {}
        () = interrupt => {}
    }
}

/// 送信許可を落としてから各ワーカーを止める
pub fn shutdown_workers(state: &SharedState, workers: &mut [Worker], timeout: Duration) {
    state.set_send_permission(false);
    for worker in workers.iter_mut() {
        if worker.stop(timeout) {
            tracing::info!("{} worker stopped", worker.name());
        }
    }
}

/// コンソールコマンド
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    /// s
    TogglePermission,
    /// m
    ToggleMode,
    /// c <name>
    SelectScheme(String),
    /// q
    Quit,
}

impl ConsoleCommand {
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        let (head, rest) = match line.split_once(char::is_whitespace) {
            Some((h, r)) => (h, r.trim()),
            None => (line, ""),
        };
        match (head, rest) {
            ("s", "") => Some(ConsoleCommand::TogglePermission),
            ("m", "") => Some(ConsoleCommand::ToggleMode),
            ("q", "") => Some(ConsoleCommand::Quit),
            ("c", name) if !name.is_empty() => Some(ConsoleCommand::SelectScheme(name.to_string())),
            _ => None,
        }
    }

    /// 共有状態に反映する。`Quit` は呼び出し側が扱う
    pub fn apply(&self, ctx: &ServerContext) {
        let state = &ctx.state;
        match self {
            ConsoleCommand::TogglePermission => {
                let enabled = !state.send_permission();
                state.set_send_permission(enabled);
                eprintln!("[input] send permission {}", if enabled { "ON" } else { "OFF" });
            }
            ConsoleCommand::ToggleMode => {
                let mode = state.mode().toggled();
                state.set_mode(mode);
                eprintln!("[input] mode: {}", mode.as_str());
            }
            ConsoleCommand::SelectScheme(name) => {
                match state.activate_named_scheme(&ctx.registry, name) {
                    Ok(()) => eprintln!("[input] scheme: {}", state.scheme().name()),
                    Err(e) => eprintln!("[input] {}", e),
                }
            }
            ConsoleCommand::Quit => {}
        }
    }
}
