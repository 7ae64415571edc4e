//! Sliding one-second admission windows, keyed by domain.

use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use {dashmap::DashMap, tokio::time::Instant};

const WINDOW: Duration = Duration::from_secs(1);
/// Admissions between sweeps of idle domain windows.
const SWEEP_EVERY: usize = 256;

type Window = Arc<Mutex<VecDeque<Instant>>>;

pub struct RateLimiter {
    per_second: usize,
    windows: DashMap<String, Window>,
    admissions: AtomicUsize,
}

impl RateLimiter {
    pub fn new(requests_per_second: u32) -> Self {
        Self {
            per_second: requests_per_second.max(1) as usize,
            windows: DashMap::new(),
            admissions: AtomicUsize::new(0),
        }
    }

    /// Domains currently holding a window.
    pub fn tracked_keys(&self) -> usize {
        self.windows.len()
    }

    /// Drop windows with no admission inside the last second that no caller
    /// is using.
    pub fn sweep_idle(&self) {
        let now = Instant::now();
        self.windows.retain(|_, window| {
            if Arc::strong_count(window) > 1 {
                return true;
            }
            let hits = window.lock().unwrap_or_else(|e| e.into_inner());
            hits.back().is_some_and(|t| now.duration_since(*t) < WINDOW)
        });
    }

    /// Wait until `key`'s window has room, record the admission and return
    /// how long the caller waited.
    pub async fn acquire(&self, key: &str) -> Duration {
        let window = Arc::clone(
            self.windows
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(VecDeque::new())))
                .value(),
        );
        let started = Instant::now();
        loop {
            let wait = {
                let mut hits = window.lock().unwrap_or_else(|e| e.into_inner());
                let now = Instant::now();
                while hits
                    .front()
                    .is_some_and(|t| now.duration_since(*t) >= WINDOW)
                {
                    hits.pop_front();
                }
                if hits.len() < self.per_second {
                    hits.push_back(now);
                    drop(hits);
                    drop(window);
                    let admitted = self.admissions.fetch_add(1, Ordering::Relaxed) + 1;
                    if admitted % SWEEP_EVERY == 0 {
                        self.sweep_idle();
                    }
                    return now.duration_since(started);
                }
                match hits.front() {
                    Some(oldest) => (*oldest + WINDOW).saturating_duration_since(now),
                    None => Duration::ZERO,
                }
            };
            tokio::time::sleep(wait).await;
        }
    }
}
