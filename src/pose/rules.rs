//! Rule-based pose classification from landmark geometry.
//!
//! Rules are evaluated in pixel space, first match wins; `standing` is the
//! fallback so classification never fails. Image y grows downward, so
//! "above" means a smaller y.

use super::label::PoseLabel;
use super::landmark::{FrameSize, LandmarkFrame, LandmarkIndex};

/// 手首間距離が肩幅のこの割合未満なら「手が近い」
pub const WRIST_PROXIMITY_RATIO: f64 = 0.75;

/// 判定に使う画素座標と派生量
#[derive(Debug, Clone, Copy)]
pub struct Measurements {
    pub eye_left_y: i32,
    pub eye_right_y: i32,
    pub shoulder_left_y: i32,
    pub shoulder_right_y: i32,
    pub wrist_left: (i32, i32),
    pub wrist_right: (i32, i32),
    pub shoulder_width: f64,
    pub wrist_distance: f64,
}

// 画素座標は飽和しうるので f64 で差を取る
fn distance(a: (i32, i32), b: (i32, i32)) -> f64 {
    let dx = b.0 as f64 - a.0 as f64;
    let dy = b.1 as f64 - a.1 as f64;
    dx.hypot(dy)
}

impl Measurements {
    pub fn from_frame(frame: &LandmarkFrame, size: FrameSize) -> Self {
        let px = |i: LandmarkIndex| frame.get(i).to_pixel(size);
        let shoulder_left = px(LandmarkIndex::LeftShoulder);
        let shoulder_right = px(LandmarkIndex::RightShoulder);
        let wrist_left = px(LandmarkIndex::LeftWrist);
        let wrist_right = px(LandmarkIndex::RightWrist);
        Self {
            eye_left_y: px(LandmarkIndex::LeftEye).1,
            eye_right_y: px(LandmarkIndex::RightEye).1,
            shoulder_left_y: shoulder_left.1,
            shoulder_right_y: shoulder_right.1,
            wrist_left,
            wrist_right,
            shoulder_width: distance(shoulder_left, shoulder_right),
            wrist_distance: distance(wrist_left, wrist_right),
        }
    }

    fn hands_close(&self) -> bool {
        self.wrist_distance < self.shoulder_width * WRIST_PROXIMITY_RATIO
    }

    fn hands_below_shoulders(&self) -> bool {
        self.wrist_left.1 > self.shoulder_left_y && self.wrist_right.1 > self.shoulder_right_y
    }

    fn running_left(&self) -> bool {
        self.wrist_left.1 < self.eye_left_y
    }

    fn running_right(&self) -> bool {
        self.wrist_right.1 < self.eye_right_y
    }

    fn walking_left(&self) -> bool {
        self.shoulder_left_y > self.wrist_left.1 && self.wrist_left.1 > self.eye_left_y
    }

    fn walking_right(&self) -> bool {
        self.shoulder_right_y > self.wrist_right.1 && self.wrist_right.1 > self.eye_right_y
    }
}

pub type Predicate = fn(&Measurements) -> bool;

// Provisional: crossed or resting arms also satisfy this. Kept at the top
// of the table until there is labelled data to place it.
fn swimming(m: &Measurements) -> bool {
    m.wrist_left.0 < m.wrist_right.0
}

fn throwing(m: &Measurements) -> bool {
    m.hands_close() && !m.hands_below_shoulders()
}

fn jumping(m: &Measurements) -> bool {
    (m.running_right() || m.walking_right()) && (m.running_left() || m.walking_left())
}

fn crouching(m: &Measurements) -> bool {
    m.hands_close() && m.hands_below_shoulders()
}

/// 優先度順の判定表（先勝ち）
pub const RULES: [(PoseLabel, Predicate); 8] = [
    (PoseLabel::Swimming, swimming),
    (PoseLabel::Throwing, throwing),
    (PoseLabel::Jumping, jumping),
    (PoseLabel::RunningRight, Measurements::running_right),
    (PoseLabel::RunningLeft, Measurements::running_left),
    (PoseLabel::WalkingRight, Measurements::walking_right),
    (PoseLabel::WalkingLeft, Measurements::walking_left),
    (PoseLabel::Crouching, crouching),
];

/// 判定表を上から評価し、最初に一致したラベルを返す
pub fn classify_measurements(m: &Measurements, rules: &[(PoseLabel, Predicate)]) -> PoseLabel {
    rules
        .iter()
        .find(|(_, matches)| matches(m))
        .map(|(label, _)| *label)
        .unwrap_or(PoseLabel::Standing)
}

/// ルールベースでポーズを分類する
pub fn classify(frame: &LandmarkFrame, size: FrameSize) -> PoseLabel {
    classify_measurements(&Measurements::from_frame(frame, size), &RULES)
}

/// Every rule that matches, in priority order. Used for diagnostics.
pub fn matching_labels(frame: &LandmarkFrame, size: FrameSize) -> Vec<PoseLabel> {
    let m = Measurements::from_frame(frame, size);
    RULES
        .iter()
        .filter(|(_, matches)| matches(&m))
        .map(|(label, _)| *label)
        .collect()
}
