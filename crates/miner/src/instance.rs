use std::{
    sync::{
        Mutex,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

use {
    pagemine_config::InstanceConfig,
    tokio::{
        sync::{mpsc, watch},
        time::Instant,
    },
};

use crate::{
    MinerError, Result,
    types::{InstanceId, InstanceStats, InstanceStatus, ResultStatus},
};

#[derive(Default)]
struct Counters {
    total: AtomicU64,
    processed: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    disallowed: AtomicU64,
    results: AtomicU64,
}

#[derive(Default)]
struct Timing {
    started_at: Option<String>,
    finished_at: Option<String>,
    started: Option<Instant>,
    elapsed: Option<Duration>,
    error: Option<String>,
}

pub(crate) struct MiningInstance {
    pub(crate) id: InstanceId,
    pub(crate) config: InstanceConfig,
    status: watch::Sender<InstanceStatus>,
    stop_requested: AtomicBool,
    counters: Counters,
    timing: Mutex<Timing>,
    seed_tx: Mutex<Option<mpsc::UnboundedSender<String>>>,
    seed_rx: Mutex<Option<mpsc::UnboundedReceiver<String>>>,
}

impl MiningInstance {
    pub(crate) fn new(id: InstanceId, config: InstanceConfig) -> Self {
        let (seed_tx, seed_rx) = mpsc::unbounded_channel();
        let (status, _) = watch::channel(InstanceStatus::Ready);
        Self {
            id,
            config,
            status,
            stop_requested: AtomicBool::new(false),
            counters: Counters::default(),
            timing: Mutex::new(Timing::default()),
            seed_tx: Mutex::new(Some(seed_tx)),
            seed_rx: Mutex::new(Some(seed_rx)),
        }
    }

    pub(crate) fn status(&self) -> InstanceStatus {
        *self.status.borrow()
    }

    pub(crate) fn topic(&self) -> &str {
        self.config.topic()
    }

    /// Atomically move `from → to`. Returns the current status on mismatch.
    pub(crate) fn transition(
        &self,
        from: InstanceStatus,
        to: InstanceStatus,
    ) -> std::result::Result<(), InstanceStatus> {
        let mut outcome = Ok(());
        self.status.send_if_modified(|current| {
            if *current == from {
                *current = to;
                true
            } else {
                outcome = Err(*current);
                false
            }
        });
        outcome
    }

    pub(crate) fn mark_started(&self) {
        let mut timing = self.timing.lock().unwrap_or_else(|e| e.into_inner());
        timing.started_at = Some(pagemine_common::time::now_rfc3339());
        timing.started = Some(Instant::now());
    }

    /// Move to a terminal status and close seeding. `false` if the instance
    /// was not in `from`.
    pub(crate) fn finish(
        &self,
        from: InstanceStatus,
        to: InstanceStatus,
        error: Option<String>,
    ) -> bool {
        // held across the flip so stats() never sees a terminal status without timing
        let mut timing = self.timing.lock().unwrap_or_else(|e| e.into_inner());
        if self.transition(from, to).is_err() {
            return false;
        }
        self.close_seeding();
        timing.finished_at = Some(pagemine_common::time::now_rfc3339());
        timing.elapsed = Some(timing.started.map(|s| s.elapsed()).unwrap_or_default());
        timing.error = error;
        true
    }

    pub(crate) fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
    }

    pub(crate) fn stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }

    pub(crate) fn seed(&self, urls: Vec<String>) -> Result<usize> {
        let tx = self.seed_tx.lock().unwrap_or_else(|e| e.into_inner());
        let Some(tx) = tx.as_ref() else {
            return Err(MinerError::seeding_closed(&self.id));
        };
        let count = urls.len();
        for url in urls {
            tx.send(url)
                .map_err(|_| MinerError::seeding_closed(&self.id))?;
        }
        Ok(count)
    }

    pub(crate) fn close_seeding(&self) {
        self.seed_tx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
    }

    pub(crate) fn take_seed_rx(&self) -> Option<mpsc::UnboundedReceiver<String>> {
        self.seed_rx.lock().unwrap_or_else(|e| e.into_inner()).take()
    }

    pub(crate) fn add_total(&self, n: u64) {
        self.counters.total.fetch_add(n, Ordering::Relaxed);
    }

    /// Count one appended result. Returns the new processed count.
    pub(crate) fn record(&self, status: ResultStatus) -> u64 {
        let counter = match status {
            ResultStatus::Success => &self.counters.succeeded,
            ResultStatus::Failed => &self.counters.failed,
            ResultStatus::Disallowed => &self.counters.disallowed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.counters.results.fetch_add(1, Ordering::Relaxed);
        self.counters.processed.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub(crate) fn total(&self) -> u64 {
        self.counters.total.load(Ordering::Relaxed)
    }

    pub(crate) fn stats(&self) -> InstanceStats {
        let timing = self.timing.lock().unwrap_or_else(|e| e.into_inner());
        let elapsed = timing
            .elapsed
            .or_else(|| timing.started.map(|s| s.elapsed()))
            .unwrap_or_default();
        InstanceStats {
            instance_id: self.id.clone(),
            name: self.config.name.clone(),
            topic: self.topic().to_string(),
            status: self.status(),
            total: self.counters.total.load(Ordering::Relaxed),
            processed: self.counters.processed.load(Ordering::Relaxed),
            succeeded: self.counters.succeeded.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            disallowed: self.counters.disallowed.load(Ordering::Relaxed),
            results: self.counters.results.load(Ordering::Relaxed),
            started_at: timing.started_at.clone(),
            finished_at: timing.finished_at.clone(),
            elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            error: timing.error.clone(),
        }
    }

    /// Resolve once the instance reaches a terminal status.
    pub(crate) async fn wait(&self) -> InstanceStats {
        let mut rx = self.status.subscribe();
        // the sender lives in `self`, so the channel cannot close here
        let _ = rx.wait_for(|s| s.is_terminal()).await;
        self.stats()
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn instance() -> MiningInstance {
        MiningInstance::new("i1".into(), InstanceConfig {
            name: "news".into(),
            urls: vec!["https://a.test/".into()],
            ..Default::default()
        })
    }

    #[test]
    fn transitions_only_from_expected_status() {
        let inst = instance();
        assert_eq!(
            inst.transition(InstanceStatus::Running, InstanceStatus::Completed),
            Err(InstanceStatus::Ready)
        );
        inst.transition(InstanceStatus::Ready, InstanceStatus::Running)
            .unwrap();
        assert!(!inst.finish(InstanceStatus::Ready, InstanceStatus::Completed, None));
        assert!(inst.finish(
            InstanceStatus::Running,
            InstanceStatus::Failed,
            Some("pool is shut down".into())
        ));
        let stats = inst.stats();
        assert_eq!(stats.status, InstanceStatus::Failed);
        assert_eq!(stats.error.as_deref(), Some("pool is shut down"));
        assert!(stats.finished_at.is_some());
    }

    #[test]
    fn seeding_closes_with_the_instance() {
        let inst = instance();
        assert_eq!(inst.seed(vec!["https://a.test/x".into()]).unwrap(), 1);
        let mut rx = inst.take_seed_rx().unwrap();
        assert_eq!(rx.try_recv().unwrap(), "https://a.test/x");

        assert!(inst.finish(InstanceStatus::Ready, InstanceStatus::Completed, None));
        let err = inst.seed(vec!["https://a.test/y".into()]).unwrap_err();
        assert!(matches!(err, MinerError::SeedingClosed { .. }));
    }

    #[test]
    fn counters_track_each_status() {
        let inst = instance();
        inst.add_total(3);
        assert_eq!(inst.record(ResultStatus::Success), 1);
        assert_eq!(inst.record(ResultStatus::Failed), 2);
        assert_eq!(inst.record(ResultStatus::Disallowed), 3);
        let stats = inst.stats();
        assert_eq!(
            (stats.total, stats.succeeded, stats.failed, stats.disallowed),
            (3, 1, 1, 1)
        );
        assert_eq!(stats.results, 3);
    }

    #[tokio::test]
    async fn wait_resolves_on_terminal_status() {
        let inst = std::sync::Arc::new(instance());
        let waiter = {
            let inst = std::sync::Arc::clone(&inst);
            tokio::spawn(async move { inst.wait().await })
        };
        inst.transition(InstanceStatus::Ready, InstanceStatus::Running)
            .unwrap();
        inst.finish(InstanceStatus::Running, InstanceStatus::Completed, None);
        assert_eq!(waiter.await.unwrap().status, InstanceStatus::Completed);
    }
}
