use std::collections::VecDeque;

use crate::pose::PoseLabel;

/// 直近の採用ラベルによる多数決フィルタ
///
/// 容量を超えたら古い順に捨てる。比率は「最多ラベルの出現数 / 現在の要素数」
pub struct SmoothingWindow {
    capacity: usize,
    labels: VecDeque<PoseLabel>,
}

impl SmoothingWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            labels: VecDeque::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn push(&mut self, label: PoseLabel) {
        if self.labels.len() == self.capacity {
            self.labels.pop_front();
        }
        self.labels.push_back(label);
    }

    /// 最多ラベルとその比率
    ///
    /// Ties resolve to the label whose name sorts first.
    pub fn majority(&self) -> Option<(PoseLabel, f32)> {
        let mut counts = [0usize; PoseLabel::COUNT];
        for label in &self.labels {
            counts[label.code() as usize - 1] += 1;
        }
        let (label, count) = PoseLabel::ALL
            .iter()
            .zip(counts)
            .filter(|(_, c)| *c > 0)
            .min_by(|(la, ca), (lb, cb)| cb.cmp(ca).then_with(|| la.as_str().cmp(lb.as_str())))?;
        Some((*label, count as f32 / self.labels.len() as f32))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_has_no_majority() {
        let w = SmoothingWindow::new(5);
        assert!(w.majority().is_none());
        assert!(w.is_empty());
    }

    #[test]
    fn test_ratio_uses_current_length() {
        let mut w = SmoothingWindow::new(11);
        w.push(PoseLabel::Jumping);
        w.push(PoseLabel::Jumping);
        w.push(PoseLabel::Standing);
        let (label, ratio) = w.majority().unwrap();
        assert_eq!(label, PoseLabel::Jumping);
        assert!((ratio - 2.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_oldest_evicted() {
        let mut w = SmoothingWindow::new(3);
        for label in [
            PoseLabel::Crouching,
            PoseLabel::Crouching,
            PoseLabel::Crouching,
            PoseLabel::Standing,
            PoseLabel::Standing,
        ] {
            w.push(label);
        }
        assert_eq!(w.len(), 3);
        assert_eq!(w.majority().unwrap().0, PoseLabel::Standing);
    }

    #[test]
    fn test_tie_breaks_by_name() {
        let mut w = SmoothingWindow::new(4);
        w.push(PoseLabel::WalkingLeft);
        w.push(PoseLabel::Crouching);
        w.push(PoseLabel::WalkingLeft);
        w.push(PoseLabel::Crouching);
        assert_eq!(w.majority(), Some((PoseLabel::Crouching, 0.5)));
    }

    #[test]
    fn test_zero_capacity_clamped() {
        let mut w = SmoothingWindow::new(0);
        w.push(PoseLabel::Throwing);
        w.push(PoseLabel::Swimming);
        assert_eq!(w.capacity(), 1);
        assert_eq!(w.majority(), Some((PoseLabel::Swimming, 1.0)));
    }
}
