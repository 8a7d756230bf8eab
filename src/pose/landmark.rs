use std::fmt::Write as _;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// BlazePose の 33 ランドマークインデックス
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum LandmarkIndex {
    Nose = 0,
    LeftEyeInner = 1,
    LeftEye = 2,
    LeftEyeOuter = 3,
    RightEyeInner = 4,
    RightEye = 5,
    RightEyeOuter = 6,
    LeftEar = 7,
    RightEar = 8,
    MouthLeft = 9,
    MouthRight = 10,
    LeftShoulder = 11,
    RightShoulder = 12,
    LeftElbow = 13,
    RightElbow = 14,
    LeftWrist = 15,
    RightWrist = 16,
    LeftPinky = 17,
    RightPinky = 18,
    LeftIndex = 19,
    RightIndex = 20,
    LeftThumb = 21,
    RightThumb = 22,
    LeftHip = 23,
    RightHip = 24,
    LeftKnee = 25,
    RightKnee = 26,
    LeftAnkle = 27,
    RightAnkle = 28,
    LeftHeel = 29,
    RightHeel = 30,
    LeftFootIndex = 31,
    RightFootIndex = 32,
}

impl LandmarkIndex {
    pub const COUNT: usize = 33;
}

/// フレーム検証エラー
#[derive(Debug, Error, PartialEq)]
pub enum FrameError {
    #[error("expected {expected} landmarks, got {actual}")]
    WrongLength { expected: usize, actual: usize },
    #[error("landmark {index} has a non-finite component")]
    NonFinite { index: usize },
}

/// 単一ランドマーク
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Landmark {
    /// 正規化されたX座標 (0.0〜1.0)
    pub x: f32,
    /// 正規化されたY座標 (0.0〜1.0, 下向きが正)
    pub y: f32,
    /// 深度推定値
    pub z: f32,
    /// 可視性スコア (0.0〜1.0)
    pub visibility: f32,
}

impl Landmark {
    pub fn new(x: f32, y: f32, z: f32, visibility: f32) -> Self {
        Self { x, y, z, visibility }
    }

    /// ピクセル座標に変換
    pub fn to_pixel(&self, size: FrameSize) -> (i32, i32) {
        let px = (self.x * size.width as f32) as i32;
        let py = (self.y * size.height as f32) as i32;
        (px, py)
    }

    fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite() && self.visibility.is_finite()
    }
}

/// 元画像のピクセルサイズ
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl Default for FrameSize {
    fn default() -> Self {
        Self::new(640, 480)
    }
}

/// 33ランドマークからなる1フレーム分の姿勢
#[derive(Debug, Clone, PartialEq)]
pub struct LandmarkFrame {
    pub landmarks: [Landmark; LandmarkIndex::COUNT],
}

impl LandmarkFrame {
    pub fn new(landmarks: [Landmark; LandmarkIndex::COUNT]) -> Self {
        Self { landmarks }
    }

    /// 全ランドマークを同一点に置いたフレーム
    pub fn uniform(landmark: Landmark) -> Self {
        Self::new([landmark; LandmarkIndex::COUNT])
    }

    /// `[x, y, z, visibility]` 行からフレームを構築する。
    ///
    /// Rows must number exactly [`LandmarkIndex::COUNT`] and contain only
    /// finite values; anything else is rejected without producing a frame.
    pub fn from_rows(rows: &[[f32; 4]]) -> Result<Self, FrameError> {
        if rows.len() != LandmarkIndex::COUNT {
            return Err(FrameError::WrongLength {
                expected: LandmarkIndex::COUNT,
                actual: rows.len(),
            });
        }
        let mut landmarks = [Landmark::default(); LandmarkIndex::COUNT];
        for (i, row) in rows.iter().enumerate() {
            let lm = Landmark::new(row[0], row[1], row[2], row[3]);
            if !lm.is_finite() {
                return Err(FrameError::NonFinite { index: i });
            }
            landmarks[i] = lm;
        }
        Ok(Self::new(landmarks))
    }

    /// Flat `x, y, z, visibility` sequence (CSV replay format).
    pub fn from_flat(values: &[f32]) -> Result<Self, FrameError> {
        if values.len() != LandmarkIndex::COUNT * 4 {
            return Err(FrameError::WrongLength {
                expected: LandmarkIndex::COUNT,
                actual: values.len() / 4,
            });
        }
        let rows: Vec<[f32; 4]> = values
            .chunks_exact(4)
            .map(|c| [c[0], c[1], c[2], c[3]])
            .collect();
        Self::from_rows(&rows)
    }

    pub fn to_rows(&self) -> Vec<[f32; 4]> {
        self.landmarks
            .iter()
            .map(|lm| [lm.x, lm.y, lm.z, lm.visibility])
            .collect()
    }

    /// インデックスでランドマークを取得
    pub fn get(&self, index: LandmarkIndex) -> &Landmark {
        &self.landmarks[index as usize]
    }

    pub fn get_mut(&mut self, index: LandmarkIndex) -> &mut Landmark {
        &mut self.landmarks[index as usize]
    }

    /// 全ランドマークの平均可視性
    pub fn mean_visibility(&self) -> f32 {
        let sum: f32 = self.landmarks.iter().map(|l| l.visibility).sum();
        sum / LandmarkIndex::COUNT as f32
    }

    /// `index(px, py)` を4個ずつ改行して並べたデバッグ文字列
    pub fn describe(&self, size: FrameSize) -> String {
        let mut out = String::new();
        for (i, lm) in self.landmarks.iter().enumerate() {
            let (px, py) = lm.to_pixel(size);
            let _ = write!(out, "{}({}, {}) ", i, px, py);
            if (i + 1) % 4 == 0 {
                out.push('\n');
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_landmark_index_count() {
        assert_eq!(LandmarkIndex::COUNT, 33);
        assert_eq!(LandmarkIndex::RightFootIndex as usize, 32);
        assert_eq!(LandmarkIndex::LeftEye as usize, 2);
        assert_eq!(LandmarkIndex::RightEye as usize, 5);
    }

    #[test]
    fn test_landmark_to_pixel() {
        let lm = Landmark::new(0.5, 0.25, 0.0, 1.0);
        assert_eq!(lm.to_pixel(FrameSize::new(640, 480)), (320, 120));
    }

    #[test]
    fn test_from_rows_rejects_wrong_length() {
        let rows = vec![[0.5, 0.5, 0.0, 1.0]; 32];
        assert_eq!(
            LandmarkFrame::from_rows(&rows),
            Err(FrameError::WrongLength { expected: 33, actual: 32 })
        );
    }

    #[test]
    fn test_from_rows_rejects_nan() {
        let mut rows = vec![[0.5, 0.5, 0.0, 1.0]; 33];
        rows[7][1] = f32::NAN;
        assert_eq!(LandmarkFrame::from_rows(&rows), Err(FrameError::NonFinite { index: 7 }));
    }

    #[test]
    fn test_from_flat_roundtrips_rows() {
        let flat: Vec<f32> = (0..132).map(|i| i as f32 / 132.0).collect();
        let frame = LandmarkFrame::from_flat(&flat).unwrap();
        assert_eq!(frame.get(LandmarkIndex::Nose).y, 1.0 / 132.0);
        assert_eq!(frame.to_rows().concat(), flat);
    }

    #[test]
    fn test_mean_visibility() {
        let frame = LandmarkFrame::uniform(Landmark::new(0.0, 0.0, 0.0, 0.5));
        assert!((frame.mean_visibility() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_describe_wraps_every_four() {
        let frame = LandmarkFrame::uniform(Landmark::new(0.5, 0.5, 0.0, 1.0));
        let text = frame.describe(FrameSize::new(640, 480));
        assert!(text.starts_with("0(320, 240) 1(320, 240) 2(320, 240) 3(320, 240) \n"));
        assert_eq!(text.matches('\n').count(), 8);
    }
}
