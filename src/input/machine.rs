//! Pose label → key press/release state machine.
//!
//! States are `idle` (no send permission) and `sending`. On every poll:
//! - permission rises: apply the current pose
//! - sending and the pose changed: release every held key, then apply the new pose
//! - permission falls: release every held key
//!
//! Continuous poses hold keys until the next change. Jumping and throwing are
//! one-shot pulses that never enter the held set; swimming repeats its pulse
//! every `swim_interval` while it stays the active pose.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;

use super::scheme::{Key, KeyMappingScheme, KeyRole};
use super::sink::KeySink;
use crate::config::InputConfig;
use crate::pose::{Direction, PoseLabel};
use crate::state::SharedState;
use crate::worker::{sleep_unless_stopped, Worker};

/// パルス系ポーズのタイミング
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PulseTimings {
    pub jump_hold: Duration,
    pub swim_hold: Duration,
    pub swim_interval: Duration,
}

impl Default for PulseTimings {
    fn default() -> Self {
        Self::from_config(&InputConfig::default())
    }
}

impl PulseTimings {
    pub fn from_config(config: &InputConfig) -> Self {
        Self {
            jump_hold: Duration::from_millis(config.jump_hold_ms),
            swim_hold: Duration::from_millis(config.swim_hold_ms),
            swim_interval: Duration::from_millis(config.swim_interval_ms),
        }
    }
}

/// ポーズごとの入力の種類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoseAction {
    /// 何もしない
    Neutral,
    /// 役割キーを押し続ける
    Hold(&'static [KeyRole]),
    /// ジャンプ + 向きキーを短く押す
    Jump,
    /// 走り/投げキーを叩く
    Throw,
    /// 向き + ジャンプの繰り返しパルス
    Swim,
}

impl PoseAction {
    pub fn for_label(label: PoseLabel) -> Self {
        match label {
            PoseLabel::Standing => PoseAction::Neutral,
            PoseLabel::WalkingLeft => PoseAction::Hold(&[KeyRole::Left]),
            PoseLabel::WalkingRight => PoseAction::Hold(&[KeyRole::Right]),
            PoseLabel::RunningLeft => PoseAction::Hold(&[KeyRole::RunThrow, KeyRole::Left]),
            PoseLabel::RunningRight => PoseAction::Hold(&[KeyRole::RunThrow, KeyRole::Right]),
            PoseLabel::Crouching => PoseAction::Hold(&[KeyRole::Down]),
            PoseLabel::Jumping => PoseAction::Jump,
            PoseLabel::Throwing => PoseAction::Throw,
            PoseLabel::Swimming => PoseAction::Swim,
        }
    }
}

/// 入力状態機械。押下中キーと向きの記憶を唯一所有する
pub struct InputStateMachine {
    sink: Arc<dyn KeySink>,
    timings: PulseTimings,
    held: Vec<Key>,
    last_pose: Option<PoseLabel>,
    orientation: Direction,
    sending: bool,
    last_swim_pulse: Option<Instant>,
}

impl InputStateMachine {
    pub fn new(sink: Arc<dyn KeySink>, timings: PulseTimings) -> Self {
        Self {
            sink,
            timings,
            held: Vec::new(),
            last_pose: Some(PoseLabel::Standing),
            orientation: Direction::Right,
            sending: false,
            last_swim_pulse: None,
        }
    }

    pub fn held_keys(&self) -> &[Key] {
        &self.held
    }

    pub fn last_pose(&self) -> Option<PoseLabel> {
        self.last_pose
    }

    pub fn orientation(&self) -> Direction {
        self.orientation
    }

    pub fn is_sending(&self) -> bool {
        self.sending
    }

    /// 1回分のポーリング処理
    ///
    /// `pose` is `None` when the label source has nothing recognised to
    /// offer; that pose gets no key action.
    pub fn step(
        &mut self,
        pose: Option<PoseLabel>,
        permission: bool,
        scheme: &KeyMappingScheme,
        now: Instant,
    ) {
        if permission {
            if !self.sending {
                self.sending = true;
                self.last_pose = pose;
                self.apply(pose, scheme, now);
            } else if self.last_pose != pose {
                self.release_held_keys();
                self.last_pose = pose;
                self.apply(pose, scheme, now);
            } else if pose == Some(PoseLabel::Swimming) && self.swim_due(now) {
                self.swim_pulse(scheme, now);
            }
        } else if self.sending {
            self.release_held_keys();
            self.sending = false;
            self.last_swim_pulse = None;
        }
    }

    /// 押下中のキーをすべて離す
    pub fn release_held_keys(&mut self) {
        for key in self.held.drain(..) {
            self.sink.release(&key);
        }
    }

    fn apply(&mut self, pose: Option<PoseLabel>, scheme: &KeyMappingScheme, now: Instant) {
        self.last_swim_pulse = None;
        let Some(label) = pose else {
            tracing::warn!("no input defined for unrecognized pose");
            return;
        };
        match PoseAction::for_label(label) {
            PoseAction::Neutral => {}
            PoseAction::Hold(roles) => {
                for role in roles {
                    self.hold(scheme.key(*role).clone());
                }
                if let Some(direction) = label.direction() {
                    self.orientation = direction;
                }
            }
            PoseAction::Jump => {
                let jump = scheme.key(KeyRole::Jump);
                let side = scheme.direction_key(self.orientation);
                self.sink.press(jump);
                self.sink.press(side);
                thread::sleep(self.timings.jump_hold);
                self.sink.release(jump);
                self.sink.release(side);
            }
            PoseAction::Throw => {
                let throw = scheme.key(KeyRole::RunThrow);
                self.sink.press(throw);
                self.sink.release(throw);
            }
            PoseAction::Swim => self.swim_pulse(scheme, now),
        }
    }

    fn hold(&mut self, key: Key) {
        if self.held.contains(&key) {
            return;
        }
        self.sink.press(&key);
        self.held.push(key);
    }

    fn swim_due(&self, now: Instant) -> bool {
        match self.last_swim_pulse {
            Some(last) => now.saturating_duration_since(last) >= self.timings.swim_interval,
            None => true,
        }
    }

    fn swim_pulse(&mut self, scheme: &KeyMappingScheme, now: Instant) {
        let side = scheme.direction_key(self.orientation);
        let jump = scheme.key(KeyRole::Jump);
        self.sink.press(side);
        self.sink.press(jump);
        thread::sleep(self.timings.swim_hold);
        self.sink.release(side);
        self.sink.release(jump);
        self.last_swim_pulse = Some(now);
    }
}

/// 入力ワーカーを起動する。終了時は押下中キーをすべて離す
pub fn spawn_input_worker(
    state: Arc<SharedState>,
    sink: Arc<dyn KeySink>,
    config: &InputConfig,
) -> Result<Worker> {
    let timings = PulseTimings::from_config(config);
    let poll = config.poll_interval();
    Worker::spawn("input", move |stop| {
        let mut machine = InputStateMachine::new(sink, timings);
        tracing::info!("input worker started");
        while !stop.is_set() {
            let scheme = state.scheme();
            machine.step(
                state.current_label(),
                state.send_permission(),
                &scheme,
                Instant::now(),
            );
            sleep_unless_stopped(&stop, poll);
        }
        machine.release_held_keys();
        tracing::info!("input worker stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::sink::{KeyEvent, RecordingSink};

    const FAST: PulseTimings = PulseTimings {
        jump_hold: Duration::ZERO,
        swim_hold: Duration::ZERO,
        swim_interval: Duration::from_millis(250),
    };

    fn setup() -> (InputStateMachine, Arc<RecordingSink>, KeyMappingScheme) {
        let sink = Arc::new(RecordingSink::new());
        let machine = InputStateMachine::new(sink.clone(), FAST);
        (machine, sink, KeyMappingScheme::retroarch())
    }

    fn press(k: &str) -> KeyEvent {
        KeyEvent::Press(Key::new(k))
    }

    fn release(k: &str) -> KeyEvent {
        KeyEvent::Release(Key::new(k))
    }

    fn keys(machine: &InputStateMachine) -> Vec<&str> {
        let mut k: Vec<&str> = machine.held_keys().iter().map(|k| k.as_str()).collect();
        k.sort();
        k
    }

    fn expected_held(label: PoseLabel, scheme: &KeyMappingScheme) -> Vec<&str> {
        let mut k: Vec<&str> = match PoseAction::for_label(label) {
            PoseAction::Hold(roles) => roles.iter().map(|r| scheme.key(*r).as_str()).collect(),
            _ => Vec::new(),
        };
        k.sort();
        k
    }

    #[test]
    fn test_idle_without_permission() {
        let (mut m, sink, scheme) = setup();
        let now = Instant::now();
        m.step(Some(PoseLabel::RunningRight), false, &scheme, now);
        m.step(Some(PoseLabel::WalkingLeft), false, &scheme, now);
        assert!(sink.events().is_empty());
        assert!(!m.is_sending());
    }

    #[test]
    fn test_rising_edge_applies_current_pose() {
        let (mut m, sink, scheme) = setup();
        m.step(Some(PoseLabel::RunningRight), true, &scheme, Instant::now());
        assert_eq!(sink.take(), vec![press("y"), press("right")]);
        assert_eq!(keys(&m), vec!["right", "y"]);
        assert_eq!(m.last_pose(), Some(PoseLabel::RunningRight));
    }

    #[test]
    fn test_duplicate_true_does_not_double_press() {
        let (mut m, sink, scheme) = setup();
        let now = Instant::now();
        m.step(Some(PoseLabel::WalkingLeft), false, &scheme, now);
        m.step(Some(PoseLabel::WalkingLeft), true, &scheme, now);
        m.step(Some(PoseLabel::WalkingLeft), true, &scheme, now);
        m.step(Some(PoseLabel::WalkingLeft), true, &scheme, now);
        assert_eq!(sink.take(), vec![press("left")]);
    }

    #[test]
    fn test_duplicate_false_does_not_double_release() {
        let (mut m, sink, scheme) = setup();
        let now = Instant::now();
        m.step(Some(PoseLabel::Crouching), true, &scheme, now);
        m.step(Some(PoseLabel::Crouching), false, &scheme, now);
        m.step(Some(PoseLabel::Crouching), false, &scheme, now);
        assert_eq!(sink.take(), vec![press("down"), release("down")]);
        assert!(m.held_keys().is_empty());
        assert!(!m.is_sending());
    }

    #[test]
    fn test_pose_change_releases_before_press() {
        let (mut m, sink, scheme) = setup();
        let now = Instant::now();
        m.step(Some(PoseLabel::WalkingLeft), true, &scheme, now);
        m.step(Some(PoseLabel::RunningRight), true, &scheme, now);
        assert_eq!(
            sink.take(),
            vec![press("left"), release("left"), press("y"), press("right")]
        );
        assert_eq!(keys(&m), vec!["right", "y"]);
    }

    #[test]
    fn test_held_set_tracks_current_continuous_pose() {
        let (mut m, _sink, scheme) = setup();
        let now = Instant::now();
        let sequence = [
            PoseLabel::WalkingRight,
            PoseLabel::RunningRight,
            PoseLabel::RunningLeft,
            PoseLabel::Crouching,
            PoseLabel::Jumping,
            PoseLabel::WalkingLeft,
            PoseLabel::Throwing,
            PoseLabel::RunningLeft,
            PoseLabel::Swimming,
            PoseLabel::Standing,
            PoseLabel::WalkingRight,
            PoseLabel::WalkingLeft,
        ];
        for label in sequence {
            m.step(Some(label), true, &scheme, now);
            assert_eq!(keys(&m), expected_held(label, &scheme), "after {}", label);
        }
    }

    #[test]
    fn test_no_conflicting_directions_held() {
        let (mut m, sink, scheme) = setup();
        let now = Instant::now();
        for label in [PoseLabel::WalkingLeft, PoseLabel::WalkingRight, PoseLabel::RunningLeft] {
            m.step(Some(label), true, &scheme, now);
        }
        let mut held = std::collections::HashSet::new();
        for event in sink.events() {
            match event {
                KeyEvent::Press(k) => {
                    held.insert(k);
                }
                KeyEvent::Release(k) => {
                    held.remove(&k);
                }
            }
            assert!(!(held.contains(&Key::new("left")) && held.contains(&Key::new("right"))));
        }
    }

    #[test]
    fn test_jump_uses_sticky_orientation() {
        let (mut m, sink, scheme) = setup();
        let now = Instant::now();
        m.step(Some(PoseLabel::WalkingLeft), true, &scheme, now);
        m.step(Some(PoseLabel::Standing), true, &scheme, now);
        sink.take();
        m.step(Some(PoseLabel::Jumping), true, &scheme, now);
        assert_eq!(
            sink.take(),
            vec![press("x"), press("left"), release("x"), release("left")]
        );
        assert!(m.held_keys().is_empty());
        assert_eq!(m.orientation(), Direction::Left);
    }

    #[test]
    fn test_default_orientation_is_right() {
        let (mut m, sink, scheme) = setup();
        m.step(Some(PoseLabel::Jumping), true, &scheme, Instant::now());
        assert_eq!(
            sink.take(),
            vec![press("x"), press("right"), release("x"), release("right")]
        );
    }

    #[test]
    fn test_throw_taps_run_throw() {
        let (mut m, sink, scheme) = setup();
        m.step(Some(PoseLabel::Throwing), true, &scheme, Instant::now());
        assert_eq!(sink.take(), vec![press("y"), release("y")]);
        assert!(m.held_keys().is_empty());
    }

    #[test]
    fn test_crouch_does_not_change_orientation() {
        let (mut m, _sink, scheme) = setup();
        let now = Instant::now();
        m.step(Some(PoseLabel::RunningLeft), true, &scheme, now);
        m.step(Some(PoseLabel::Crouching), true, &scheme, now);
        assert_eq!(m.orientation(), Direction::Left);
    }

    #[test]
    fn test_swimming_repeats_on_interval() {
        let (mut m, sink, scheme) = setup();
        let t0 = Instant::now();
        let pulse = vec![press("right"), press("x"), release("right"), release("x")];

        m.step(Some(PoseLabel::Swimming), true, &scheme, t0);
        assert_eq!(sink.take(), pulse);

        m.step(Some(PoseLabel::Swimming), true, &scheme, t0 + Duration::from_millis(100));
        assert!(sink.take().is_empty());

        m.step(Some(PoseLabel::Swimming), true, &scheme, t0 + Duration::from_millis(250));
        assert_eq!(sink.take(), pulse);

        m.step(Some(PoseLabel::Swimming), true, &scheme, t0 + Duration::from_millis(400));
        assert!(sink.take().is_empty());

        m.step(Some(PoseLabel::Swimming), true, &scheme, t0 + Duration::from_millis(520));
        assert_eq!(sink.take(), pulse);
        assert!(m.held_keys().is_empty());
    }

    #[test]
    fn test_swimming_stops_without_permission() {
        let (mut m, sink, scheme) = setup();
        let t0 = Instant::now();
        m.step(Some(PoseLabel::Swimming), true, &scheme, t0);
        m.step(Some(PoseLabel::Swimming), false, &scheme, t0 + Duration::from_millis(300));
        m.step(Some(PoseLabel::Swimming), false, &scheme, t0 + Duration::from_millis(600));
        assert_eq!(sink.take().len(), 4);
    }

    #[test]
    fn test_unrecognized_pose_is_noop() {
        let (mut m, sink, scheme) = setup();
        let now = Instant::now();
        m.step(Some(PoseLabel::WalkingRight), true, &scheme, now);
        m.step(None, true, &scheme, now);
        m.step(None, true, &scheme, now);
        assert_eq!(sink.take(), vec![press("right"), release("right")]);
        assert!(m.held_keys().is_empty());
        assert_eq!(m.last_pose(), None);
    }

    #[test]
    fn test_scheme_swap_releases_originally_pressed_key() {
        let (mut m, sink, scheme) = setup();
        let custom = KeyMappingScheme::custom_default();
        let now = Instant::now();
        m.step(Some(PoseLabel::WalkingRight), true, &scheme, now);
        m.step(Some(PoseLabel::WalkingLeft), true, &custom, now);
        assert_eq!(
            sink.take(),
            vec![press("right"), release("right"), press("a")]
        );
    }

    #[test]
    fn test_input_worker_releases_on_stop() {
        let state = Arc::new(SharedState::default());
        let sink = Arc::new(RecordingSink::new());
        state.set_rule_label(PoseLabel::RunningLeft);
        state.set_send_permission(true);

        let config = InputConfig {
            poll_interval_ms: 2,
            ..InputConfig::default()
        };
        let mut worker = spawn_input_worker(state.clone(), sink.clone(), &config).unwrap();
        let deadline = Instant::now() + Duration::from_secs(2);
        while sink.events().len() < 2 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(2));
        }
        assert!(worker.stop(Duration::from_secs(1)));
        assert_eq!(
            sink.take(),
            vec![press("y"), press("left"), release("y"), release("left")]
        );
    }
}
