use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 姿勢ラベル（閉じた語彙）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoseLabel {
    Standing,
    WalkingLeft,
    WalkingRight,
    RunningLeft,
    RunningRight,
    Jumping,
    Crouching,
    Throwing,
    Swimming,
}

/// 左右の向き
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Left,
    Right,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown pose label: {0}")]
pub struct UnknownLabel(pub String);

impl PoseLabel {
    pub const COUNT: usize = 9;

    pub const ALL: [PoseLabel; Self::COUNT] = [
        PoseLabel::Standing,
        PoseLabel::WalkingLeft,
        PoseLabel::WalkingRight,
        PoseLabel::RunningLeft,
        PoseLabel::RunningRight,
        PoseLabel::Jumping,
        PoseLabel::Crouching,
        PoseLabel::Throwing,
        PoseLabel::Swimming,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PoseLabel::Standing => "standing",
            PoseLabel::WalkingLeft => "walking_left",
            PoseLabel::WalkingRight => "walking_right",
            PoseLabel::RunningLeft => "running_left",
            PoseLabel::RunningRight => "running_right",
            PoseLabel::Jumping => "jumping",
            PoseLabel::Crouching => "crouching",
            PoseLabel::Throwing => "throwing",
            PoseLabel::Swimming => "swimming",
        }
    }

    /// 横方向を含むポーズならその向き
    pub fn direction(&self) -> Option<Direction> {
        match self {
            PoseLabel::WalkingLeft | PoseLabel::RunningLeft => Some(Direction::Left),
            PoseLabel::WalkingRight | PoseLabel::RunningRight => Some(Direction::Right),
            _ => None,
        }
    }

    /// Compact code for lock-free storage. Codes are `1..=COUNT`; 0 is
    /// reserved for "unrecognized".
    pub fn code(&self) -> u8 {
        match self {
            PoseLabel::Standing => 1,
            PoseLabel::WalkingLeft => 2,
            PoseLabel::WalkingRight => 3,
            PoseLabel::RunningLeft => 4,
            PoseLabel::RunningRight => 5,
            PoseLabel::Jumping => 6,
            PoseLabel::Crouching => 7,
            PoseLabel::Throwing => 8,
            PoseLabel::Swimming => 9,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|l| l.code() == code)
    }
}

impl fmt::Display for PoseLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PoseLabel {
    type Err = UnknownLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|l| l.as_str().eq_ignore_ascii_case(name))
            .ok_or_else(|| UnknownLabel(s.to_string()))
    }
}
