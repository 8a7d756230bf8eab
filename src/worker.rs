//! Background polling threads with a cooperative stop flag.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

/// 停止フラグ（各ワーカーはループ毎に確認する）
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::Release);
    }
}

/// 別スレッドで動くポーリングワーカー
pub struct Worker {
    name: String,
    stop: StopFlag,
    handle: Option<thread::JoinHandle<()>>,
}

impl Worker {
    /// `body` receives the stop flag and is expected to return within one
    /// poll period of it being set.
    pub fn spawn<F>(name: &str, body: F) -> Result<Self>
    where
        F: FnOnce(StopFlag) + Send + 'static,
    {
        let stop = StopFlag::new();
        let flag = stop.clone();
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || body(flag))
            .with_context(|| format!("Failed to spawn {} worker", name))?;
        Ok(Self {
            name: name.to_string(),
            stop,
            handle: Some(handle),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |h| h.is_finished())
    }

    /// 停止を要求し、最大 `timeout` だけ終了を待つ。
    ///
    /// Returns `true` if the thread exited in time. A thread that already
    /// exited (or was stopped before) returns `true` immediately; one that
    /// overruns is detached rather than blocking the caller.
    pub fn stop(&mut self, timeout: Duration) -> bool {
        self.stop.set();
        let Some(handle) = self.handle.take() else {
            return true;
        };
        let deadline = Instant::now() + timeout;
        while !handle.is_finished() {
            if Instant::now() >= deadline {
                tracing::warn!("{} worker did not stop within {:?}", self.name, timeout);
                return false;
            }
            thread::sleep(Duration::from_millis(1));
        }
        if handle.join().is_err() {
            tracing::warn!("{} worker panicked", self.name);
        }
        true
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.stop.set();
    }
}

/// 停止フラグを見ながら `period` だけ眠る（長い待機でも停止に素早く反応する）
pub fn sleep_unless_stopped(stop: &StopFlag, period: Duration) {
    const SLICE: Duration = Duration::from_millis(5);
    let deadline = Instant::now() + period;
    loop {
        if stop.is_set() {
            return;
        }
        let now = Instant::now();
        if now >= deadline {
            return;
        }
        thread::sleep((deadline - now).min(SLICE));
    }
}
