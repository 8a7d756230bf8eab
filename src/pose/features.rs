//! Body-size-invariant feature vector for the ML classifier.
//!
//! Layout (109 values):
//! - 0..66: hip-centred, torso-scaled x/y for every landmark
//! - 66..70: elbow and knee angles in degrees (L elbow, R elbow, L knee, R knee)
//! - 70..76: shoulders, hips, wrists, ankles, L shoulder-hip, R shoulder-hip
//! - 76..109: raw visibility per landmark

use super::landmark::{FrameError, LandmarkFrame, LandmarkIndex};

pub const COORD_COUNT: usize = LandmarkIndex::COUNT * 2;
pub const ANGLE_COUNT: usize = 4;
pub const DISTANCE_COUNT: usize = 6;
pub const FEATURE_COUNT: usize = COORD_COUNT + ANGLE_COUNT + DISTANCE_COUNT + LandmarkIndex::COUNT;

const EPS: f32 = 1e-6;

const ANGLE_JOINTS: [(LandmarkIndex, LandmarkIndex, LandmarkIndex); ANGLE_COUNT] = {
    use LandmarkIndex::*;
    [
        (LeftShoulder, LeftElbow, LeftWrist),
        (RightShoulder, RightElbow, RightWrist),
        (LeftHip, LeftKnee, LeftAnkle),
        (RightHip, RightKnee, RightAnkle),
    ]
};

const DISTANCE_PAIRS: [(LandmarkIndex, LandmarkIndex); DISTANCE_COUNT] = {
    use LandmarkIndex::*;
    [
        (LeftShoulder, RightShoulder),
        (LeftHip, RightHip),
        (LeftWrist, RightWrist),
        (LeftAnkle, RightAnkle),
        (LeftShoulder, LeftHip),
        (RightShoulder, RightHip),
    ]
};

/// 固定長特徴量ベクトル
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureVector([f32; FEATURE_COUNT]);

impl FeatureVector {
    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn coords(&self) -> &[f32] {
        &self.0[..COORD_COUNT]
    }

    pub fn angles(&self) -> &[f32] {
        &self.0[COORD_COUNT..COORD_COUNT + ANGLE_COUNT]
    }

    pub fn distances(&self) -> &[f32] {
        let start = COORD_COUNT + ANGLE_COUNT;
        &self.0[start..start + DISTANCE_COUNT]
    }

    pub fn visibilities(&self) -> &[f32] {
        &self.0[COORD_COUNT + ANGLE_COUNT + DISTANCE_COUNT..]
    }
}

fn midpoint(a: [f32; 2], b: [f32; 2]) -> [f32; 2] {
    [(a[0] + b[0]) / 2.0, (a[1] + b[1]) / 2.0]
}

fn norm(v: [f32; 2]) -> f32 {
    (v[0] * v[0] + v[1] * v[1]).sqrt()
}

fn sub(a: [f32; 2], b: [f32; 2]) -> [f32; 2] {
    [a[0] - b[0], a[1] - b[1]]
}

/// 頂点 b における角度（度）
fn joint_angle(a: [f32; 2], b: [f32; 2], c: [f32; 2]) -> f32 {
    let ba = sub(a, b);
    let bc = sub(c, b);
    let cosine = (ba[0] * bc[0] + ba[1] * bc[1]) / (norm(ba) * norm(bc) + EPS);
    cosine.clamp(-1.0, 1.0).acos().to_degrees()
}

/// ランドマークフレームから特徴量を抽出する
pub fn extract_features(frame: &LandmarkFrame) -> FeatureVector {
    let mut xy = [[0.0f32; 2]; LandmarkIndex::COUNT];
    for (p, lm) in xy.iter_mut().zip(frame.landmarks.iter()) {
        *p = [lm.x, lm.y];
    }
    let at = |xy: &[[f32; 2]; LandmarkIndex::COUNT], i: LandmarkIndex| xy[i as usize];

    // 腰中点を原点へ
    let mid_hip = midpoint(at(&xy, LandmarkIndex::LeftHip), at(&xy, LandmarkIndex::RightHip));
    for p in xy.iter_mut() {
        *p = sub(*p, mid_hip);
    }

    // 胴体長で正規化
    let mid_shoulder = midpoint(
        at(&xy, LandmarkIndex::LeftShoulder),
        at(&xy, LandmarkIndex::RightShoulder),
    );
    let torso = norm(mid_shoulder) + EPS;
    for p in xy.iter_mut() {
        p[0] /= torso;
        p[1] /= torso;
    }

    let mut out = [0.0f32; FEATURE_COUNT];
    for (i, p) in xy.iter().enumerate() {
        out[i * 2] = p[0];
        out[i * 2 + 1] = p[1];
    }

    let mut k = COORD_COUNT;
    for &(a, b, c) in &ANGLE_JOINTS {
        out[k] = joint_angle(at(&xy, a), at(&xy, b), at(&xy, c));
        k += 1;
    }
    for &(a, b) in &DISTANCE_PAIRS {
        out[k] = norm(sub(at(&xy, a), at(&xy, b)));
        k += 1;
    }
    for lm in frame.landmarks.iter() {
        out[k] = lm.visibility;
        k += 1;
    }

    FeatureVector(out)
}

/// 生の `[x, y, z, visibility]` 行から特徴量を抽出する（長さ不一致は拒否）
pub fn extract_features_from_rows(rows: &[[f32; 4]]) -> Result<FeatureVector, FrameError> {
    let frame = LandmarkFrame::from_rows(rows)?;
    Ok(extract_features(&frame))
}
