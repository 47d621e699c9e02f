use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc, Mutex, PoisonError,
};
use std::thread;
use std::time::{Duration, Instant};

/// Counters shared between scan workers and an optional background ticker
/// that logs them periodically.
#[derive(Clone)]
pub struct Progress {
    enabled: bool,
    interval: Duration,
    pub stage: Arc<Mutex<String>>,
    pub targets_done: Arc<AtomicUsize>,
    pub targets_total: Arc<AtomicUsize>,
    pub groups_found: Arc<AtomicUsize>,
    running: Arc<AtomicBool>,
}

impl Progress {
    pub fn new(enabled: bool) -> Self {
        Self::with_interval(enabled, Duration::from_secs(5))
    }

    pub fn with_interval(enabled: bool, interval: Duration) -> Self {
        Self {
            enabled,
            interval,
            stage: Arc::new(Mutex::new(String::new())),
            targets_done: Arc::new(AtomicUsize::new(0)),
            targets_total: Arc::new(AtomicUsize::new(0)),
            groups_found: Arc::new(AtomicUsize::new(0)),
            running: Arc::new(AtomicBool::new(false)),
        }
    }
    pub fn set_stage(&self, s: &str) {
        *self.stage.lock().unwrap_or_else(PoisonError::into_inner) = s.to_string();
    }
    pub fn set_targets_total(&self, n: usize) {
        self.targets_total.store(n, Ordering::Relaxed);
    }
    pub fn inc_target(&self) {
        self.targets_done.fetch_add(1, Ordering::Relaxed);
    }
    pub fn add_groups(&self, n: usize) {
        self.groups_found.fetch_add(n, Ordering::Relaxed);
    }
    pub fn targets_done(&self) -> usize {
        self.targets_done.load(Ordering::Relaxed)
    }

    pub fn start(&self) {
        if !self.enabled {
            return;
        }
        self.running.store(true, Ordering::Relaxed);
        let this = self.clone();
        thread::spawn(move || {
            let t0 = Instant::now();
            while this.running.load(Ordering::Relaxed) {
                thread::sleep(this.interval);
                if !this.running.load(Ordering::Relaxed) {
                    break;
                }
                let stage = this.stage.lock().unwrap_or_else(PoisonError::into_inner).clone();
                tracing::info!(
                    elapsed_s = t0.elapsed().as_secs(),
                    stage = %stage,
                    done = this.targets_done.load(Ordering::Relaxed),
                    total = this.targets_total.load(Ordering::Relaxed),
                    groups = this.groups_found.load(Ordering::Relaxed),
                    "progress"
                );
            }
        });
    }
    pub fn stop(&self) {
        if self.enabled {
            self.running.store(false, Ordering::Relaxed);
        }
    }
}
