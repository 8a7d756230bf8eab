use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;

use crate::input::sink::OSC_KEY_DEFAULT_ADDR;
use crate::pose::PoseLabel;
use crate::state::LabelSource;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub app: AppConfig,
    #[serde(default)]
    pub vision_ml: MlConfig,
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub key_sink: KeySinkConfig,
    /// ユーザー定義スキーム: 名前 → (役割 → キー)
    #[serde(default)]
    pub schemes: BTreeMap<String, BTreeMap<String, String>>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    /// ラベルの取得元 ("simple" = ルールベース, "full_body" = ML)
    #[serde(default)]
    pub mode: LabelSource,
    /// 起動時のキー割り当てスキーム名
    #[serde(default = "default_scheme")]
    pub scheme: String,
    /// ランドマーク受信アドレス
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

fn default_scheme() -> String { "retroarch".to_string() }
fn default_listen_addr() -> String { "127.0.0.1:39600".to_string() }

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            mode: LabelSource::default(),
            scheme: default_scheme(),
            listen_addr: default_listen_addr(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct MlConfig {
    /// ユーザーデータ側のモデル
    #[serde(default = "default_model_path")]
    pub model_path: String,
    /// 同梱モデル（model_path が読めない場合）
    #[serde(default = "default_fallback_model_path")]
    pub fallback_model_path: String,
    /// モデル出力列の順序に対応するクラス名
    #[serde(default = "default_classes")]
    pub classes: Vec<String>,
    #[serde(default = "default_input_name")]
    pub input_name: String,
    #[serde(default = "default_output_name")]
    pub output_name: String,
    /// 平均可視性がこれ未満のフレームは捨てる
    #[serde(default = "default_frame_quality")]
    pub frame_quality: f32,
    /// 最大確率がこれ未満なら投票しない
    #[serde(default = "default_p_thresh")]
    pub p_thresh: f32,
    /// 多数決の採用比率
    #[serde(default = "default_vote_ratio")]
    pub vote_ratio: f32,
    /// 多数決ウィンドウ長
    #[serde(default = "default_window_size")]
    pub window_size: usize,
    #[serde(default = "default_ml_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// フレーム無し・低品質時の待機
    #[serde(default = "default_ml_idle_interval_ms")]
    pub idle_interval_ms: u64,
}

fn default_model_path() -> String { "data/pose_model.onnx".to_string() }
fn default_fallback_model_path() -> String { "models/pose_model.onnx".to_string() }
fn default_classes() -> Vec<String> {
    // scikit-learn orders classes_ lexicographically
    let mut names: Vec<String> = PoseLabel::ALL.iter().map(|l| l.as_str().to_string()).collect();
    names.sort();
    names
}
fn default_input_name() -> String { "float_input".to_string() }
fn default_output_name() -> String { "probabilities".to_string() }
fn default_frame_quality() -> f32 { 0.5 }
fn default_p_thresh() -> f32 { 0.7 }
fn default_vote_ratio() -> f32 { 0.6 }
fn default_window_size() -> usize { 11 }
fn default_ml_poll_interval_ms() -> u64 { 1 }
fn default_ml_idle_interval_ms() -> u64 { 10 }

impl Default for MlConfig {
    fn default() -> Self {
        Self {
            model_path: default_model_path(),
            fallback_model_path: default_fallback_model_path(),
            classes: default_classes(),
            input_name: default_input_name(),
            output_name: default_output_name(),
            frame_quality: default_frame_quality(),
            p_thresh: default_p_thresh(),
            vote_ratio: default_vote_ratio(),
            window_size: default_window_size(),
            poll_interval_ms: default_ml_poll_interval_ms(),
            idle_interval_ms: default_ml_idle_interval_ms(),
        }
    }
}

impl MlConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn idle_interval(&self) -> Duration {
        Duration::from_millis(self.idle_interval_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct InputConfig {
    #[serde(default = "default_input_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// ジャンプのキー保持時間
    #[serde(default = "default_jump_hold_ms")]
    pub jump_hold_ms: u64,
    /// 泳ぎパルスのキー保持時間
    #[serde(default = "default_swim_hold_ms")]
    pub swim_hold_ms: u64,
    /// 泳ぎパルスの繰り返し間隔
    #[serde(default = "default_swim_interval_ms")]
    pub swim_interval_ms: u64,
}

fn default_input_poll_interval_ms() -> u64 { 20 }
fn default_jump_hold_ms() -> u64 { 100 }
fn default_swim_hold_ms() -> u64 { 50 }
fn default_swim_interval_ms() -> u64 { 250 }

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_input_poll_interval_ms(),
            jump_hold_ms: default_jump_hold_ms(),
            swim_hold_ms: default_swim_hold_ms(),
            swim_interval_ms: default_swim_interval_ms(),
        }
    }
}

impl InputConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct KeySinkConfig {
    /// "osc" または "log"
    #[serde(default = "default_sink_kind")]
    pub kind: String,
    /// OSC キー入力ブリッジの宛先
    #[serde(default = "default_sink_addr")]
    pub addr: String,
}

fn default_sink_kind() -> String { "log".to_string() }
fn default_sink_addr() -> String { OSC_KEY_DEFAULT_ADDR.to_string() }

impl Default for KeySinkConfig {
    fn default() -> Self {
        Self {
            kind: default_sink_kind(),
            addr: default_sink_addr(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid config {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("Failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    /// ファイルが無いときだけデフォルト設定を使う。壊れた設定はエラー
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(content) => {
                Self::parse(&content).with_context(|| format!("Invalid config {}", path.display()))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::warn!("{} not found, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let ml = &self.vision_ml;
        for (name, value) in [
            ("frame_quality", ml.frame_quality),
            ("p_thresh", ml.p_thresh),
            ("vote_ratio", ml.vote_ratio),
        ] {
            if !(0.0..=1.0).contains(&value) {
                bail!("vision_ml.{} must be within [0, 1], got {}", name, value);
            }
        }
        if ml.window_size == 0 {
            bail!("vision_ml.window_size must be at least 1");
        }
        if ml.classes.is_empty() {
            bail!("vision_ml.classes must not be empty");
        }
        match self.key_sink.kind.as_str() {
            "osc" | "log" => {}
            other => bail!("key_sink.kind must be \"osc\" or \"log\", got {:?}", other),
        }
        Ok(())
    }
}
