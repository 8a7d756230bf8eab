//! Probability-gated, majority-smoothed ML pose classification.
//!
//! Each cycle takes the newest landmark frame and runs it through:
//! quality gate (mean visibility) → feature extraction → model →
//! confidence gate (arg-max probability) → [`SmoothingWindow`] → vote-ratio
//! gate. Only the last gate publishes; everything before it simply skips
//! the cycle and leaves the published label untouched.

use std::sync::Arc;

use anyhow::Result;

use super::model::PoseModel;
use super::smoothing::SmoothingWindow;
use crate::config::MlConfig;
use crate::pose::{extract_features, LandmarkFrame, PoseLabel};
use crate::state::SharedState;
use crate::worker::{sleep_unless_stopped, Worker};

/// 1フレーム分の処理結果
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CycleOutcome {
    /// 平均可視性が閾値未満
    LowQuality(f32),
    /// 最大確率が閾値未満（投票なし）
    LowConfidence(f32),
    /// 推論失敗
    ModelError,
    /// 投票したが比率が足りない
    Undecided { label: PoseLabel, ratio: f32 },
    /// 安定ラベルを更新
    Published { label: PoseLabel, ratio: f32 },
}

/// 投票しきい値
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub frame_quality: f32,
    pub p_thresh: f32,
    pub vote_ratio: f32,
}

impl Thresholds {
    pub fn from_config(config: &MlConfig) -> Self {
        Self {
            frame_quality: config.frame_quality,
            p_thresh: config.p_thresh,
            vote_ratio: config.vote_ratio,
        }
    }
}

pub struct MlClassifier<M: PoseModel> {
    model: M,
    thresholds: Thresholds,
    window: SmoothingWindow,
    stable: Option<PoseLabel>,
}

impl<M: PoseModel> MlClassifier<M> {
    pub fn new(model: M, thresholds: Thresholds, window_size: usize) -> Self {
        Self {
            model,
            thresholds,
            window: SmoothingWindow::new(window_size),
            stable: None,
        }
    }

    pub fn from_config(model: M, config: &MlConfig) -> Self {
        Self::new(model, Thresholds::from_config(config), config.window_size)
    }

    /// 最後に公開した安定ラベル
    pub fn stable_label(&self) -> Option<PoseLabel> {
        self.stable
    }

    pub fn window(&self) -> &SmoothingWindow {
        &self.window
    }

    pub fn process(&mut self, frame: &LandmarkFrame) -> CycleOutcome {
        let quality = frame.mean_visibility();
        if quality < self.thresholds.frame_quality {
            return CycleOutcome::LowQuality(quality);
        }

        let features = extract_features(frame);
        let proba = match self.model.predict_proba(&features) {
            Ok(p) => p,
            Err(e) => {
                tracing::debug!("pose model inference failed: {:#}", e);
                return CycleOutcome::ModelError;
            }
        };

        let Some((best, p_max)) = proba
            .iter()
            .copied()
            .enumerate()
            .filter(|(_, p)| p.is_finite())
            .fold(None, |acc: Option<(usize, f32)>, (i, p)| match acc {
                Some((_, best)) if best >= p => acc,
                _ => Some((i, p)),
            })
        else {
            return CycleOutcome::ModelError;
        };
        if p_max < self.thresholds.p_thresh {
            return CycleOutcome::LowConfidence(p_max);
        }
        let Some(&label) = self.model.classes().get(best) else {
            return CycleOutcome::ModelError;
        };

        self.window.push(label);
        let Some((label, ratio)) = self.window.majority() else {
            return CycleOutcome::ModelError;
        };
        if ratio >= self.thresholds.vote_ratio {
            self.stable = Some(label);
            CycleOutcome::Published { label, ratio }
        } else {
            CycleOutcome::Undecided { label, ratio }
        }
    }
}

/// ML分類ワーカーを起動する
///
/// Each new frame (by frame id) is processed once; the worker idles for
/// `idle_interval` while no new frame or only a low-quality one is available.
pub fn spawn_ml_worker<M>(state: Arc<SharedState>, model: M, config: &MlConfig) -> Result<Worker>
where
    M: PoseModel + 'static,
{
    let mut classifier = MlClassifier::from_config(model, config);
    let poll = config.poll_interval();
    let idle = config.idle_interval();
    state.set_ml_available(true);
    let shared = Arc::clone(&state);
    let spawned = Worker::spawn("vision_ml", move |stop| {
        tracing::info!("ML classifier started");
        let mut last_frame_id = 0;
        while !stop.is_set() {
            let snapshot = match state.latest_frame() {
                Some(s) if s.id != last_frame_id => s,
                _ => {
                    sleep_unless_stopped(&stop, idle);
                    continue;
                }
            };
            last_frame_id = snapshot.id;

            match classifier.process(&snapshot.frame) {
                CycleOutcome::Published { label, ratio } => {
                    if state.ml_label() != Some(label) {
                        tracing::debug!("ML label -> {} ({:.2})", label, ratio);
                    }
                    state.set_ml_label(label);
                }
                CycleOutcome::LowQuality(_) => {
                    sleep_unless_stopped(&stop, idle);
                    continue;
                }
                _ => {}
            }
            sleep_unless_stopped(&stop, poll);
        }
        state.set_ml_available(false);
        tracing::info!("ML classifier stopped");
    });
    if spawned.is_err() {
        shared.set_ml_available(false);
    }
    spawned
}
