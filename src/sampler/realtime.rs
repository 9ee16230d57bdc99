//! Wall-clock sampling of a live frame source.

use anyhow::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use super::FrameSource;
use crate::config::AppConfig;
use crate::region::Readings;
use crate::session::{Command, Session};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RealtimeState {
    Idle,
    Capturing,
}

pub struct RealtimeSampler {
    fps: f64,
    min_interval: Duration,
    state: RealtimeState,
    stop: Arc<AtomicBool>,
}

impl RealtimeSampler {
    pub fn new(fps: f64, min_interval: Duration) -> Self {
        Self {
            fps,
            min_interval,
            state: RealtimeState::Idle,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.fps, Duration::from_millis(config.min_interval_ms))
    }

    pub fn set_fps(&mut self, fps: f64) {
        self.fps = fps;
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    pub fn state(&self) -> RealtimeState {
        self.state
    }

    /// Flag another thread can set to end `run`.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Delay before the next tick given how long this one took.
    ///
    /// Never shorter than the minimum interval, even when a tick overruns.
    pub fn next_delay(&self, elapsed: Duration) -> Duration {
        let period = if self.fps > 0.0 {
            Duration::from_secs_f64(1.0 / self.fps)
        } else {
            Duration::ZERO
        };
        period.saturating_sub(elapsed).max(self.min_interval)
    }

    /// Captures one frame and runs a cycle on it.
    ///
    /// A failed capture, or locked region edits, skips the tick (`Ok(None)`).
    pub fn tick<S>(&mut self, source: &mut S, session: &mut Session) -> Result<Option<Readings>>
    where
        S: FrameSource + ?Sized,
    {
        let frame = match source.capture() {
            Ok(frame) => frame,
            Err(e) => {
                log::warn!("[RealtimeSampler] Capture failed, skipping tick: {:#}", e);
                return Ok(None);
            }
        };
        session.cycle(&frame, None)
    }

    /// Ticks until the stop flag is set.
    ///
    /// Pending `commands` are applied before every tick; `on_cycle` sees the
    /// session and the readings after each successful one.
    pub fn run<S, F>(
        &mut self,
        source: &mut S,
        session: &mut Session,
        commands: Option<&Receiver<Command>>,
        mut on_cycle: F,
    ) -> Result<()>
    where
        S: FrameSource + ?Sized,
        F: FnMut(&Session, &Readings),
    {
        self.state = RealtimeState::Capturing;
        log::info!("[RealtimeSampler] Capturing at {:.1} fps", self.fps);

        let outcome = loop {
            if self.stop.load(Ordering::SeqCst) {
                break Ok(());
            }
            if let Some(commands) = commands {
                session.drain(commands);
            }

            let started = Instant::now();
            match self.tick(source, session) {
                Ok(Some(readings)) => on_cycle(session, &readings),
                Ok(None) => {}
                Err(e) => break Err(e),
            }
            thread::sleep(self.next_delay(started.elapsed()));
        };

        self.state = RealtimeState::Idle;
        self.stop.store(false, Ordering::SeqCst);
        log::info!("[RealtimeSampler] Capture stopped");
        outcome
    }
}
