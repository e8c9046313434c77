use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::executor::ProbeExecutor;
use super::types::{ProbeOutcome, Target};
use crate::database::LogStore;

/// Where the monitor loop currently is in its cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorPhase {
    Idle,
    Probing,
    Committing,
    Sleeping,
    Stopped,
}

/// Summary of one completed cycle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub probed: usize,
    pub reachable: usize,
    /// false when the batch was lost to a store error
    pub committed: bool,
}

/// Latest state published by the monitor loop
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonitorSnapshot {
    pub phase: MonitorPhase,
    pub cycles_completed: u64,
    pub last_cycle: Option<CycleReport>,
}

impl Default for MonitorSnapshot {
    fn default() -> Self {
        Self { phase: MonitorPhase::Idle, cycles_completed: 0, last_cycle: None }
    }
}

/// Monitor loop - probes every target once per cycle, commits the batch,
/// then sleeps for the interval.
///
/// Nothing that happens inside a cycle stops the loop: probe failures are
/// data, a faulted probe task is recorded as unreachable, and a failed
/// commit drops that cycle's batch. Only the cancellation token ends it.
pub struct MonitorLoop {
    targets: Arc<[Target]>,
    executor: ProbeExecutor,
    store: Arc<dyn LogStore>,
    interval: Duration,
    status: watch::Sender<MonitorSnapshot>,
    /// `observed_at` of the last outcome this loop produced
    last_observed: Mutex<Option<DateTime<Utc>>>,
}

impl MonitorLoop {
    /// Create a new monitor loop
    pub fn new(
        targets: Vec<Target>,
        executor: ProbeExecutor,
        store: Arc<dyn LogStore>,
        interval: Duration,
    ) -> Self {
        let (status, _) = watch::channel(MonitorSnapshot::default());
        Self { targets: targets.into(), executor, store, interval, status, last_observed: Mutex::new(None) }
    }

    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    /// Receiver for the loop's published state
    pub fn subscribe(&self) -> watch::Receiver<MonitorSnapshot> {
        self.status.subscribe()
    }

    fn set_phase(&self, phase: MonitorPhase) {
        self.status.send_modify(|snapshot| snapshot.phase = phase);
    }

    /// Probe every target, returning outcomes in configuration order.
    ///
    /// Each probe runs in its own task so that a panic while probing one
    /// target is contained to that target.
    async fn probe_all(&self) -> Vec<ProbeOutcome> {
        let handles: Vec<JoinHandle<ProbeOutcome>> = self
            .targets
            .iter()
            .cloned()
            .map(|target| {
                let executor = self.executor.clone();
                tokio::spawn(async move { executor.probe(&target).await })
            })
            .collect();

        let mut outcomes = Vec::with_capacity(handles.len());
        for (target, handle) in self.targets.iter().zip(handles) {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(target = %target.name, error = %e, "Probe task faulted, recording target as unreachable");
                    ProbeOutcome::unreachable(target, Utc::now())
                }
            };

            match outcome.latency_ms() {
                Some(latency_ms) => debug!(target = %target.name, latency_ms, "Target reachable"),
                None => warn!(target = %target.name, address = %target.address, "Target unreachable"),
            }
            outcomes.push(outcome);
        }

        outcomes
    }

    /// Keep `observed_at` non-decreasing in batch order and across cycles.
    ///
    /// Probes finish in any order and the wall clock can step backwards, so
    /// an outcome stamped earlier than the one before it is moved up to it.
    fn order_observations(&self, outcomes: &mut [ProbeOutcome]) {
        let mut last = self.last_observed.lock().unwrap_or_else(PoisonError::into_inner);
        for outcome in outcomes.iter_mut() {
            if let Some(floor) = *last {
                outcome.not_before(floor);
            }
            *last = Some(outcome.observed_at());
        }
    }

    /// Run one Probing + Committing pass
    pub async fn run_cycle(&self) -> CycleReport {
        let started_at = Utc::now();

        self.set_phase(MonitorPhase::Probing);
        let mut outcomes = self.probe_all().await;
        self.order_observations(&mut outcomes);
        let reachable = outcomes.iter().filter(|o| o.is_reachable()).count();

        self.set_phase(MonitorPhase::Committing);
        let committed = if outcomes.is_empty() {
            debug!("No targets configured, skipping commit");
            true
        } else {
            match self.store.append(&outcomes).await {
                Ok(()) => true,
                Err(e) => {
                    error!(error = %e, batch = outcomes.len(), "Failed to commit probe batch, cycle dropped");
                    false
                }
            }
        };

        let report = CycleReport { started_at, probed: outcomes.len(), reachable, committed };
        info!(
            probed = report.probed,
            reachable = report.reachable,
            committed = report.committed,
            "Monitoring cycle finished"
        );

        self.status.send_modify(|snapshot| {
            snapshot.cycles_completed += 1;
            snapshot.last_cycle = Some(report.clone());
        });

        report
    }

    /// Cycle until `cancel` fires.
    ///
    /// Cancellation is observed between cycles and while sleeping; a cycle
    /// already in flight runs to completion so its probes can time out
    /// normally and its batch is either fully committed or dropped.
    pub async fn run(self, cancel: CancellationToken) {
        info!(
            targets = self.targets.len(),
            interval_secs = self.interval.as_secs(),
            "Monitor loop started"
        );

        while !cancel.is_cancelled() {
            self.run_cycle().await;

            // The interval starts here, after the commit, so probe time
            // never shortens the gap between cycles.
            self.set_phase(MonitorPhase::Sleeping);
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
            self.set_phase(MonitorPhase::Idle);
        }

        self.set_phase(MonitorPhase::Stopped);
        info!("Monitor loop stopped");
    }

    /// Run the loop as a background task
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::StoreError;
    use crate::monitoring::checker::{Checker, ProbeError};
    use crate::monitoring::types::LogRecord;
    use std::num::NonZeroUsize;
    use tokio::time::Instant;

    /// Replies instantly, except for the addresses it is told to fault on
    struct ScriptedChecker {
        panic_on: Option<&'static str>,
        down: Vec<&'static str>,
        slow: Option<(&'static str, Duration)>,
    }

    #[async_trait::async_trait]
    impl Checker for ScriptedChecker {
        async fn check(&self, address: &str, limit: Duration) -> Result<Duration, ProbeError> {
            if self.panic_on.is_some_and(|p| p == address) {
                panic!("socket allocation failed for {address}");
            }
            if self.down.iter().any(|d| *d == address) {
                return Err(ProbeError::Timeout(limit));
            }
            if let Some((_, delay)) = self.slow.filter(|(slow, _)| *slow == address) {
                tokio::time::sleep(delay).await;
                return Ok(delay);
            }
            Ok(Duration::from_millis(3))
        }
    }

    /// Records every batch handed to `append`
    #[derive(Default)]
    struct RecordingStore {
        batches: Mutex<Vec<(Instant, Vec<ProbeOutcome>)>>,
        fail: bool,
    }

    impl RecordingStore {
        fn failing() -> Self {
            Self { fail: true, ..Self::default() }
        }

        fn batches(&self) -> Vec<(Instant, Vec<ProbeOutcome>)> {
            self.batches.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl LogStore for RecordingStore {
        async fn append(&self, outcomes: &[ProbeOutcome]) -> Result<(), StoreError> {
            self.batches.lock().unwrap().push((Instant::now(), outcomes.to_vec()));
            if self.fail {
                return Err(StoreError::Unavailable("disk full".to_string()));
            }
            Ok(())
        }

        async fn recent(&self, _limit: NonZeroUsize) -> Result<Vec<LogRecord>, StoreError> {
            Ok(Vec::new())
        }

        async fn failures_only(&self) -> Result<Vec<LogRecord>, StoreError> {
            Ok(Vec::new())
        }

        async fn prune_before(&self, _cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
            Ok(0)
        }
    }

    fn targets() -> Vec<Target> {
        vec![
            Target::new("Internal server", "10.0.0.1").unwrap(),
            Target::new("File server", "10.0.0.2").unwrap(),
            Target::new("Printer", "10.0.0.3").unwrap(),
        ]
    }

    fn executor(checker: ScriptedChecker) -> ProbeExecutor {
        ProbeExecutor::new(Arc::new(checker), Duration::from_secs(1))
    }

    fn healthy() -> ScriptedChecker {
        ScriptedChecker { panic_on: None, down: Vec::new(), slow: None }
    }

    #[tokio::test]
    async fn test_faulted_target_does_not_abort_cycle() {
        let store = Arc::new(RecordingStore::default());
        let checker = ScriptedChecker { panic_on: Some("10.0.0.2"), down: Vec::new(), slow: None };
        let monitor = MonitorLoop::new(targets(), executor(checker), store.clone(), Duration::from_secs(30));

        let report = monitor.run_cycle().await;

        assert_eq!(report.probed, 3);
        assert_eq!(report.reachable, 2);
        assert!(report.committed);

        let batches = store.batches();
        assert_eq!(batches.len(), 1, "append must be called exactly once per cycle");

        let batch = &batches[0].1;
        assert_eq!(batch.len(), 3);
        let names: Vec<_> = batch.iter().map(|o| o.target_name()).collect();
        assert_eq!(names, ["Internal server", "File server", "Printer"]);
        assert!(batch[0].is_reachable());
        assert!(!batch[1].is_reachable());
        assert_eq!(batch[1].latency_ms(), None);
        assert!(batch[2].is_reachable());
    }

    #[tokio::test]
    async fn test_unreachable_targets_are_recorded() {
        let store = Arc::new(RecordingStore::default());
        let checker = ScriptedChecker { panic_on: None, down: vec!["10.0.0.1", "10.0.0.3"], slow: None };
        let monitor = MonitorLoop::new(targets(), executor(checker), store.clone(), Duration::from_secs(30));

        let report = monitor.run_cycle().await;

        assert_eq!(report.reachable, 1);
        let batch = &store.batches()[0].1;
        assert_eq!(batch.iter().filter(|o| !o.is_reachable()).count(), 2);
    }

    #[tokio::test]
    async fn test_slow_first_target_keeps_batch_order() {
        let store = Arc::new(RecordingStore::default());
        let checker = ScriptedChecker {
            panic_on: None,
            down: vec!["10.0.0.3"],
            slow: Some(("10.0.0.1", Duration::from_millis(200))),
        };
        let monitor = MonitorLoop::new(targets(), executor(checker), store.clone(), Duration::from_secs(30));

        monitor.run_cycle().await;

        let batch = &store.batches()[0].1;
        let names: Vec<_> = batch.iter().map(|o| o.target_name()).collect();
        assert_eq!(names, ["Internal server", "File server", "Printer"]);
        assert!(batch.windows(2).all(|w| w[0].observed_at() <= w[1].observed_at()));
        assert_eq!(batch[0].latency_ms(), Some(200.0));
    }

    #[tokio::test]
    async fn test_next_cycle_never_precedes_previous() {
        let store = Arc::new(RecordingStore::default());
        let monitor = MonitorLoop::new(targets(), executor(healthy()), store.clone(), Duration::from_secs(30));

        // As if the wall clock stepped back an hour after the last cycle.
        let previous = Utc::now() + chrono::Duration::hours(1);
        *monitor.last_observed.lock().unwrap() = Some(previous);

        monitor.run_cycle().await;
        monitor.run_cycle().await;

        let batches = store.batches();
        let stamps: Vec<_> = batches.iter().flat_map(|(_, b)| b.iter().map(|o| o.observed_at())).collect();
        assert_eq!(stamps.len(), 6);
        assert!(stamps.iter().all(|at| *at >= previous));
        assert!(stamps.windows(2).all(|w| w[0] <= w[1]));
    }

    #[tokio::test]
    async fn test_failed_commit_is_reported_not_raised() {
        let store = Arc::new(RecordingStore::failing());
        let monitor = MonitorLoop::new(targets(), executor(healthy()), store.clone(), Duration::from_secs(30));
        let status = monitor.subscribe();

        let report = monitor.run_cycle().await;

        assert!(!report.committed);
        assert_eq!(status.borrow().cycles_completed, 1);
        assert_eq!(status.borrow().last_cycle.as_ref(), Some(&report));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cycles_are_spaced_by_interval() {
        let store = Arc::new(RecordingStore::default());
        let monitor = MonitorLoop::new(targets(), executor(healthy()), store.clone(), Duration::from_secs(30));

        let cancel = CancellationToken::new();
        let handle = monitor.spawn(cancel.clone());

        tokio::time::sleep(Duration::from_secs(95)).await;
        cancel.cancel();
        handle.await.unwrap();

        let starts: Vec<Instant> = store.batches().iter().map(|(at, _)| *at).collect();
        assert_eq!(starts.len(), 4, "cycles at t=0, 30, 60, 90");
        for pair in starts.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_secs(30));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_survives_store_outage() {
        let store = Arc::new(RecordingStore::failing());
        let monitor = MonitorLoop::new(targets(), executor(healthy()), store.clone(), Duration::from_secs(30));
        let status = monitor.subscribe();

        let cancel = CancellationToken::new();
        let handle = monitor.spawn(cancel.clone());

        tokio::time::sleep(Duration::from_secs(65)).await;
        cancel.cancel();
        handle.await.unwrap();

        assert_eq!(store.batches().len(), 3);
        assert_eq!(status.borrow().cycles_completed, 3);
        assert_eq!(status.borrow().phase, MonitorPhase::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_target_list_idles() {
        let store = Arc::new(RecordingStore::default());
        let monitor = MonitorLoop::new(Vec::new(), executor(healthy()), store.clone(), Duration::from_secs(30));
        let status = monitor.subscribe();

        let cancel = CancellationToken::new();
        let handle = monitor.spawn(cancel.clone());

        tokio::time::sleep(Duration::from_secs(65)).await;
        assert_eq!(status.borrow().phase, MonitorPhase::Sleeping);
        cancel.cancel();
        handle.await.unwrap();

        assert!(store.batches().is_empty());
        assert_eq!(status.borrow().cycles_completed, 3);
    }

    #[tokio::test]
    async fn test_cancelled_before_start_runs_no_cycle() {
        let store = Arc::new(RecordingStore::default());
        let monitor = MonitorLoop::new(targets(), executor(healthy()), store.clone(), Duration::from_secs(30));

        let cancel = CancellationToken::new();
        cancel.cancel();
        monitor.run(cancel).await;

        assert!(store.batches().is_empty());
    }
}
