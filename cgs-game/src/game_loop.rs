//! Game Loop (§4.5): a steady-clock pacing thread that invokes a tick
//! callback at a fixed rate, tracking budget utilisation per tick.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use slog::{o, warn, Drain, Logger};

use crate::error::{GameServerError, GameServerResult};

pub const DEFAULT_TICK_RATE_HZ: f64 = 20.0;

#[derive(Debug, Clone, Copy, Default)]
pub struct TickMetrics {
    pub tick_number: u64,
    pub update_time: Duration,
    pub budget_utilization: f64,
}

pub type TickCallback = Box<dyn FnMut(f32) + Send>;

pub struct GameLoop {
    tick_rate_hz: f64,
    running: Arc<AtomicBool>,
    tick_number: Arc<AtomicU64>,
    last_metrics: Arc<Mutex<TickMetrics>>,
    thread_handle: Option<JoinHandle<()>>,
    logger: Logger,
}

impl GameLoop {
    pub fn new(tick_rate_hz: f64, logger: impl Into<Option<Logger>>) -> Self {
        GameLoop {
            tick_rate_hz,
            running: Arc::new(AtomicBool::new(false)),
            tick_number: Arc::new(AtomicU64::new(0)),
            last_metrics: Arc::new(Mutex::new(TickMetrics::default())),
            thread_handle: None,
            logger: logger.into().unwrap_or_else(default_logger),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn metrics(&self) -> TickMetrics {
        *self.last_metrics.lock().unwrap()
    }

    pub fn start(&mut self, mut callback: TickCallback) -> GameServerResult<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(GameServerError::GameLoopAlreadyRunning);
        }
        let running = self.running.clone();
        let tick_number = self.tick_number.clone();
        let last_metrics = self.last_metrics.clone();
        let tick_budget = Duration::from_secs_f64(1.0 / self.tick_rate_hz);
        let logger = self.logger.clone();

        let handle = std::thread::spawn(move || {
            let mut last_tick = Instant::now();
            while running.load(Ordering::SeqCst) {
                let now = Instant::now();
                let delta = now.duration_since(last_tick);
                last_tick = now;

                let update_start = Instant::now();
                callback(delta.as_secs_f32());
                let update_time = update_start.elapsed();

                let budget_utilization = update_time.as_secs_f64() / tick_budget.as_secs_f64();
                let n = tick_number.fetch_add(1, Ordering::SeqCst) + 1;
                *last_metrics.lock().unwrap() =
                    TickMetrics { tick_number: n, update_time, budget_utilization };
                if budget_utilization > 1.0 {
                    warn!(logger, "tick exceeded budget"; "tick" => n, "utilization" => budget_utilization);
                }

                if update_time < tick_budget {
                    std::thread::sleep(tick_budget - update_time);
                }
            }
        });
        self.thread_handle = Some(handle);
        Ok(())
    }

    pub fn stop(&mut self) -> GameServerResult<()> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Err(GameServerError::GameLoopNotRunning);
        }
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
        Ok(())
    }
}

fn default_logger() -> Logger {
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_envlogger::new(drain).fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    Logger::root(drain, o!("crate" => "cgs-game"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[test]
    fn tick_invokes_callback_and_advances_tick_number() {
        let mut loop_ = GameLoop::new(1000.0, None);
        let count = Arc::new(AtomicU32::new(0));
        let count2 = count.clone();
        loop_.start(Box::new(move |_dt| {
            count2.fetch_add(1, Ordering::SeqCst);
        })).unwrap();
        std::thread::sleep(Duration::from_millis(20));
        loop_.stop().unwrap();
        assert!(count.load(Ordering::SeqCst) > 0);
        assert!(loop_.metrics().tick_number > 0);
    }

    #[test]
    fn double_start_errors() {
        let mut loop_ = GameLoop::new(1000.0, None);
        loop_.start(Box::new(|_| {})).unwrap();
        let err = loop_.start(Box::new(|_| {})).unwrap_err();
        assert!(matches!(err, GameServerError::GameLoopAlreadyRunning));
        loop_.stop().unwrap();
    }

    #[test]
    fn stop_without_start_errors() {
        let mut loop_ = GameLoop::new(1000.0, None);
        let err = loop_.stop().unwrap_err();
        assert!(matches!(err, GameServerError::GameLoopNotRunning));
    }
}
