use anyhow::Result;
use rosc::{encoder, OscMessage, OscPacket, OscType};
use std::net::UdpSocket;
use std::sync::Mutex;

use super::scheme::Key;

/// キーブリッジのデフォルトアドレス
pub const OSC_KEY_DEFAULT_ADDR: &str = "127.0.0.1:39601";

const KEY_DOWN_ADDR: &str = "/key/down";
const KEY_UP_ADDR: &str = "/key/up";

/// キー押下・解放の送出先
///
/// Both operations must be idempotent: pressing a held key or releasing a
/// free one is harmless. Delivery failures are logged by the implementation
/// and never surface to the caller.
pub trait KeySink: Send + Sync {
    fn press(&self, key: &Key);
    fn release(&self, key: &Key);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyEvent {
    Press(Key),
    Release(Key),
}

/// キーイベントの OSC メッセージを構築
/// 引数: キー識別子 (string)
pub fn build_key_message(event: &KeyEvent) -> OscMessage {
    let (addr, key) = match event {
        KeyEvent::Press(k) => (KEY_DOWN_ADDR, k),
        KeyEvent::Release(k) => (KEY_UP_ADDR, k),
    };
    OscMessage {
        addr: addr.to_string(),
        args: vec![OscType::String(key.as_str().to_string())],
    }
}

/// OSCメッセージをバイト列にエンコード
pub fn encode_osc_message(msg: &OscMessage) -> Result<Vec<u8>> {
    let packet = OscPacket::Message(msg.clone());
    let encoded = encoder::encode(&packet)?;
    Ok(encoded)
}

/// OSC over UDP でキー入力ブリッジへ送る
pub struct OscKeySink {
    socket: UdpSocket,
    target_addr: String,
}

impl OscKeySink {
    pub fn new(target_addr: &str) -> Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        Ok(Self {
            socket,
            target_addr: target_addr.to_string(),
        })
    }

    pub fn send(&self, event: &KeyEvent) -> Result<()> {
        let msg = build_key_message(event);
        let data = encode_osc_message(&msg)?;
        self.socket.send_to(&data, &self.target_addr)?;
        Ok(())
    }

    fn send_logged(&self, event: KeyEvent) {
        if let Err(e) = self.send(&event) {
            tracing::warn!("key event {:?} not delivered to {}: {:#}", event, self.target_addr, e);
        }
    }
}

impl KeySink for OscKeySink {
    fn press(&self, key: &Key) {
        self.send_logged(KeyEvent::Press(key.clone()));
    }

    fn release(&self, key: &Key) {
        self.send_logged(KeyEvent::Release(key.clone()));
    }
}

/// 何も送らずログだけ出す（ドライラン）
#[derive(Debug, Default)]
pub struct LogKeySink;

impl KeySink for LogKeySink {
    fn press(&self, key: &Key) {
        tracing::info!("key down: {}", key);
    }

    fn release(&self, key: &Key) {
        tracing::info!("key up: {}", key);
    }
}

/// 送出されたイベントを記録する
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<KeyEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<KeyEvent> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// 記録済みイベントを取り出して空にする
    pub fn take(&self) -> Vec<KeyEvent> {
        std::mem::take(&mut *self.events.lock().unwrap_or_else(|e| e.into_inner()))
    }

    fn push(&self, event: KeyEvent) {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).push(event);
    }
}

impl KeySink for RecordingSink {
    fn press(&self, key: &Key) {
        self.push(KeyEvent::Press(key.clone()));
    }

    fn release(&self, key: &Key) {
        self.push(KeyEvent::Release(key.clone()));
    }
}
