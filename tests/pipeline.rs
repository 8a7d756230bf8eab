//! End-to-end: landmark frames → labels → input state machine → key events.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;

use motion_input::classifier::{spawn_ml_worker, PoseModel};
use motion_input::config::{InputConfig, MlConfig};
use motion_input::input::{
    spawn_input_worker, InputStateMachine, Key, KeyEvent, PulseTimings, RecordingSink, SchemeRegistry,
};
use motion_input::pose::{FeatureVector, FrameSize, Landmark, LandmarkFrame, LandmarkIndex, PoseLabel};
use motion_input::server::ServerContext;
use motion_input::state::{LabelSource, SharedState};

const SIZE: FrameSize = FrameSize { width: 640, height: 480 };

fn set(f: &mut LandmarkFrame, i: LandmarkIndex, x: f32, y: f32) {
    *f.get_mut(i) = Landmark::new(x, y, 0.0, 1.0);
}

/// 立ち姿勢: 手首は肩より下で左右に離れている
fn standing() -> LandmarkFrame {
    let mut f = LandmarkFrame::uniform(Landmark::new(0.5, 0.5, 0.0, 1.0));
    set(&mut f, LandmarkIndex::LeftEye, 0.55, 0.2);
    set(&mut f, LandmarkIndex::RightEye, 0.45, 0.2);
    set(&mut f, LandmarkIndex::LeftShoulder, 0.6, 0.4);
    set(&mut f, LandmarkIndex::RightShoulder, 0.4, 0.4);
    set(&mut f, LandmarkIndex::LeftWrist, 0.8, 0.7);
    set(&mut f, LandmarkIndex::RightWrist, 0.2, 0.7);
    f
}

fn walking_right() -> LandmarkFrame {
    let mut f = standing();
    set(&mut f, LandmarkIndex::RightWrist, 0.2, 0.3);
    f
}

fn jumping() -> LandmarkFrame {
    let mut f = standing();
    set(&mut f, LandmarkIndex::LeftWrist, 0.8, 0.1);
    set(&mut f, LandmarkIndex::RightWrist, 0.2, 0.1);
    f
}

fn press(k: &str) -> KeyEvent {
    KeyEvent::Press(Key::new(k))
}

fn release(k: &str) -> KeyEvent {
    KeyEvent::Release(Key::new(k))
}

#[test]
fn test_rule_labels_drive_key_events() {
    let state = Arc::new(SharedState::default());
    let ctx = ServerContext::new(Arc::clone(&state), SchemeRegistry::builtin());
    let sink = Arc::new(RecordingSink::new());
    let timings = PulseTimings {
        jump_hold: Duration::ZERO,
        swim_hold: Duration::ZERO,
        swim_interval: Duration::from_millis(250),
    };
    let mut machine = InputStateMachine::new(sink.clone(), timings);
    state.set_send_permission(true);

    let frames = [standing(), walking_right(), walking_right(), jumping(), standing()];
    let mut labels = Vec::new();
    for frame in frames {
        labels.push(ctx.ingest_frame(frame, SIZE));
        machine.step(
            state.current_label(),
            state.send_permission(),
            &state.scheme(),
            Instant::now(),
        );
    }

    assert_eq!(
        labels,
        vec![
            PoseLabel::Standing,
            PoseLabel::WalkingRight,
            PoseLabel::WalkingRight,
            PoseLabel::Jumping,
            PoseLabel::Standing,
        ]
    );
    assert_eq!(
        sink.take(),
        vec![
            press("right"),
            release("right"),
            press("x"),
            press("right"),
            release("x"),
            release("right"),
        ]
    );
    assert!(machine.held_keys().is_empty());
    assert_eq!(state.frame_id(), 5);
}

/// 常に同じクラスを高確率で返すモデル
struct FixedModel {
    classes: Vec<PoseLabel>,
    label: PoseLabel,
}

impl PoseModel for FixedModel {
    fn classes(&self) -> &[PoseLabel] {
        &self.classes
    }

    fn predict_proba(&mut self, _features: &FeatureVector) -> Result<Vec<f32>> {
        Ok(self
            .classes
            .iter()
            .map(|c| if *c == self.label { 0.92 } else { 0.01 })
            .collect())
    }
}

#[test]
fn test_full_body_mode_uses_ml_label() {
    let state = Arc::new(SharedState::new(Default::default(), LabelSource::FullBody));
    let ctx = ServerContext::new(Arc::clone(&state), SchemeRegistry::builtin());
    let sink = Arc::new(RecordingSink::new());

    let model = FixedModel {
        classes: PoseLabel::ALL.to_vec(),
        label: PoseLabel::Crouching,
    };
    let ml_config = MlConfig {
        window_size: 3,
        ..MlConfig::default()
    };
    let input_config = InputConfig {
        poll_interval_ms: 2,
        ..InputConfig::default()
    };
    let mut ml = spawn_ml_worker(Arc::clone(&state), model, &ml_config).unwrap();
    let mut input = spawn_input_worker(Arc::clone(&state), sink.clone(), &input_config).unwrap();
    state.set_send_permission(true);

    // ルール側は歩き右だが、ML 側のラベルが使われる
    let deadline = Instant::now() + Duration::from_secs(3);
    while sink.events().is_empty() && Instant::now() < deadline {
        ctx.ingest_frame(walking_right(), SIZE);
        std::thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(state.rule_label(), Some(PoseLabel::WalkingRight));
    assert_eq!(state.ml_label(), Some(PoseLabel::Crouching));

    state.set_send_permission(false);
    let deadline = Instant::now() + Duration::from_secs(1);
    while sink.events().len() < 2 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(2));
    }
    assert!(ml.stop(Duration::from_secs(1)));
    assert!(input.stop(Duration::from_secs(1)));
    assert_eq!(sink.take(), vec![press("down"), release("down")]);
}
