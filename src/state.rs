//! Shared state between the landmark receiver, the classifier workers and
//! the input worker.
//!
//! Every field is synchronised on its own: labels, permission and mode are
//! atomics, the frame and the scheme sit behind their own locks. Each field
//! has a single writer, so no update needs another field's prior value.

use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use serde::{Deserialize, Serialize};

use crate::input::scheme::{KeyMappingScheme, SchemeError, SchemeRegistry};
use crate::pose::{FrameSize, LandmarkFrame, PoseLabel};

const UNRECOGNIZED: u8 = 0;

/// 入力に使うラベルの取得元
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelSource {
    /// ルールベース
    #[default]
    Simple,
    /// ML + 多数決
    FullBody,
}

impl LabelSource {
    fn code(self) -> u8 {
        match self {
            LabelSource::Simple => 0,
            LabelSource::FullBody => 1,
        }
    }

    fn from_code(code: u8) -> Self {
        match code {
            1 => LabelSource::FullBody,
            _ => LabelSource::Simple,
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            LabelSource::Simple => LabelSource::FullBody,
            LabelSource::FullBody => LabelSource::Simple,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LabelSource::Simple => "simple",
            LabelSource::FullBody => "full_body",
        }
    }
}

impl FromStr for LabelSource {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "simple" => Ok(LabelSource::Simple),
            "full_body" => Ok(LabelSource::FullBody),
            other => anyhow::bail!("unknown mode {:?} (expected \"simple\" or \"full_body\")", other),
        }
    }
}

/// 最新フレームとその画像サイズ
#[derive(Debug, Clone)]
pub struct FrameSnapshot {
    pub id: u64,
    pub frame: Arc<LandmarkFrame>,
    pub size: FrameSize,
}

/// Atomic slot holding `Option<PoseLabel>`.
#[derive(Debug)]
struct LabelCell(AtomicU8);

impl LabelCell {
    fn new() -> Self {
        Self(AtomicU8::new(UNRECOGNIZED))
    }

    fn load(&self) -> Option<PoseLabel> {
        PoseLabel::from_code(self.0.load(Ordering::Acquire))
    }

    fn store(&self, label: Option<PoseLabel>) {
        self.0.store(label.map_or(UNRECOGNIZED, |l| l.code()), Ordering::Release);
    }
}

pub struct SharedState {
    frame: Mutex<Option<FrameSnapshot>>,
    frame_id: AtomicU64,
    rule_label: LabelCell,
    ml_label: LabelCell,
    ml_available: AtomicBool,
    send_permission: AtomicBool,
    mode: AtomicU8,
    scheme: RwLock<Arc<KeyMappingScheme>>,
}

impl SharedState {
    pub fn new(scheme: KeyMappingScheme, mode: LabelSource) -> Self {
        Self {
            frame: Mutex::new(None),
            frame_id: AtomicU64::new(0),
            rule_label: LabelCell::new(),
            ml_label: LabelCell::new(),
            ml_available: AtomicBool::new(false),
            send_permission: AtomicBool::new(false),
            mode: AtomicU8::new(mode.code()),
            scheme: RwLock::new(Arc::new(scheme)),
        }
    }

    /// 新しいフレームを公開する。フレームIDを返す
    pub fn publish_frame(&self, frame: LandmarkFrame, size: FrameSize) -> u64 {
        let mut guard = self.frame.lock().unwrap_or_else(|e| e.into_inner());
        let id = self.frame_id.fetch_add(1, Ordering::AcqRel) + 1;
        *guard = Some(FrameSnapshot {
            id,
            frame: Arc::new(frame),
            size,
        });
        id
    }

    /// 現在のフレームID。新フレームが届くたびに増える
    pub fn frame_id(&self) -> u64 {
        self.frame_id.load(Ordering::Acquire)
    }

    /// 最新フレーム。初回フレーム到着前のみ None
    pub fn latest_frame(&self) -> Option<FrameSnapshot> {
        self.frame.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn rule_label(&self) -> Option<PoseLabel> {
        self.rule_label.load()
    }

    pub fn set_rule_label(&self, label: PoseLabel) {
        self.rule_label.store(Some(label));
    }

    pub fn ml_label(&self) -> Option<PoseLabel> {
        self.ml_label.load()
    }

    pub fn set_ml_label(&self, label: PoseLabel) {
        self.ml_label.store(Some(label));
    }

    /// ML ワーカーが動いているか
    pub fn ml_available(&self) -> bool {
        self.ml_available.load(Ordering::Acquire)
    }

    pub fn set_ml_available(&self, available: bool) {
        self.ml_available.store(available, Ordering::Release);
    }

    /// 現在のモードに応じたラベル
    ///
    /// `full_body` falls back to the rule label while no ML worker is running.
    pub fn current_label(&self) -> Option<PoseLabel> {
        match self.mode() {
            LabelSource::FullBody if self.ml_available() => self.ml_label(),
            _ => self.rule_label(),
        }
    }

    pub fn send_permission(&self) -> bool {
        self.send_permission.load(Ordering::Acquire)
    }

    pub fn set_send_permission(&self, enabled: bool) {
        self.send_permission.store(enabled, Ordering::Release);
    }

    pub fn mode(&self) -> LabelSource {
        LabelSource::from_code(self.mode.load(Ordering::Acquire))
    }

    pub fn set_mode(&self, mode: LabelSource) {
        self.mode.store(mode.code(), Ordering::Release);
    }

    pub fn scheme(&self) -> Arc<KeyMappingScheme> {
        self.scheme.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// 検証済みスキームを有効にする
    pub fn activate_scheme(&self, scheme: KeyMappingScheme) {
        tracing::info!("control scheme: {}", scheme.name());
        *self.scheme.write().unwrap_or_else(|e| e.into_inner()) = Arc::new(scheme);
    }

    /// 名前でスキームを有効にする。検証に失敗した場合は現在のスキームを維持する
    pub fn activate_named_scheme(&self, registry: &SchemeRegistry, name: &str) -> Result<(), SchemeError> {
        let scheme = registry.resolve(name)?;
        self.activate_scheme(scheme);
        Ok(())
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new(KeyMappingScheme::default(), LabelSource::default())
    }
}
