//! Unlock scheduling: timing options, the background release coordinator,
//! and the RAII guard that makes release exactly-once on every exit path.

use std::sync::mpsc::{channel, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::id::BoundaryId;
use crate::info::LockInfo;
use crate::strategy::Strategy;

/// When a scheduled unlock actually runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnlockTiming {
    /// Release inline, before the call returns.
    Immediate,
    /// Release on the coordinator's next wakeup.
    NextTick,
    /// Release once a transition window of the given length has passed
    /// (e.g. a screen dismissal animation the caller wants to outlive).
    AfterTransition(Duration),
    /// Release after a fixed delay.
    Delayed(Duration),
}

/// Counters reported when the coordinator stops.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReleaseStats {
    pub scheduled: usize,
    pub released: usize,
}

struct ReleaseJob {
    due: Instant,
    strategy: Arc<dyn Strategy>,
    boundary: BoundaryId,
    info: LockInfo,
}

impl ReleaseJob {
    fn run(self) {
        self.strategy.unlock(&self.boundary, &self.info);
    }
}

enum Message {
    Schedule(ReleaseJob),
    Stop,
}

/// Cloneable handle for scheduling releases.
///
/// `Immediate` unlocks inline without touching the coordinator thread. If the
/// coordinator has already stopped, deferred requests degrade to an inline
/// unlock rather than leaking the lock.
#[derive(Clone)]
pub struct ReleaseHandle {
    tx: Sender<Message>,
}

impl ReleaseHandle {
    /// A handle with no coordinator behind it; every deferred request falls
    /// back to an inline unlock.
    pub(crate) fn detached() -> Self {
        let (tx, _) = channel();
        ReleaseHandle { tx }
    }

    pub fn schedule(
        &self,
        strategy: Arc<dyn Strategy>,
        boundary: BoundaryId,
        info: LockInfo,
        timing: UnlockTiming,
    ) {
        let delay = match timing {
            UnlockTiming::Immediate => {
                strategy.unlock(&boundary, &info);
                return;
            }
            UnlockTiming::NextTick => Duration::ZERO,
            UnlockTiming::AfterTransition(window) => window,
            UnlockTiming::Delayed(delay) => delay,
        };
        let job = ReleaseJob {
            due: Instant::now() + delay,
            strategy,
            boundary,
            info,
        };
        if let Err(rejected) = self.tx.send(Message::Schedule(job)) {
            // Coordinator is gone; release now rather than never.
            if let Message::Schedule(job) = rejected.0 {
                job.run();
            }
        }
    }
}

/// Background thread that runs deferred unlocks when they come due.
///
/// Guarantees that every scheduled release happens: `stop` drains the queue
/// and releases everything still pending, due or not.
pub struct ReleaseCoordinator {
    tx: Sender<Message>,
    handle: Option<JoinHandle<ReleaseStats>>,
}

impl ReleaseCoordinator {
    pub fn spawn(poll_interval: Duration) -> Self {
        let (tx, rx) = channel::<Message>();
        let handle = thread::spawn(move || {
            let mut pending: Vec<ReleaseJob> = Vec::new();
            let mut stats = ReleaseStats::default();

            loop {
                let timeout = pending
                    .iter()
                    .map(|job| job.due.saturating_duration_since(Instant::now()))
                    .min()
                    .unwrap_or(poll_interval);

                let stopping = match rx.recv_timeout(timeout) {
                    Ok(Message::Schedule(job)) => {
                        stats.scheduled += 1;
                        pending.push(job);
                        false
                    }
                    Ok(Message::Stop) | Err(RecvTimeoutError::Disconnected) => true,
                    Err(RecvTimeoutError::Timeout) => false,
                };

                if stopping {
                    // Drain whatever queued while we were waking up.
                    while let Ok(Message::Schedule(job)) = rx.try_recv() {
                        stats.scheduled += 1;
                        pending.push(job);
                    }
                    stats.released += pending.len();
                    for job in pending.drain(..) {
                        job.run();
                    }
                    debug!(
                        scheduled = stats.scheduled,
                        released = stats.released,
                        "release coordinator stopped"
                    );
                    return stats;
                }

                let now = Instant::now();
                let mut index = 0;
                while index < pending.len() {
                    if pending[index].due <= now {
                        let job = pending.remove(index);
                        stats.released += 1;
                        job.run();
                    } else {
                        index += 1;
                    }
                }
            }
        });

        ReleaseCoordinator {
            tx,
            handle: Some(handle),
        }
    }

    pub fn handle(&self) -> ReleaseHandle {
        ReleaseHandle {
            tx: self.tx.clone(),
        }
    }

    /// Stop the coordinator, releasing every still-pending lock first.
    pub fn stop(mut self) -> ReleaseStats {
        self.shutdown()
    }

    fn shutdown(&mut self) -> ReleaseStats {
        let Some(handle) = self.handle.take() else {
            return ReleaseStats::default();
        };
        let _ = self.tx.send(Message::Stop);
        handle.join().unwrap_or_default()
    }
}

impl Drop for ReleaseCoordinator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// RAII pairing of one successful admission with exactly one release.
///
/// Consuming `release` calls unlock with the chosen timing; dropping an
/// unreleased guard schedules the default timing instead, so no exit path
/// leaks a lock.
pub struct LockGuard {
    strategy: Arc<dyn Strategy>,
    boundary: BoundaryId,
    info: LockInfo,
    handle: ReleaseHandle,
    default_timing: UnlockTiming,
    released: bool,
}

impl LockGuard {
    pub(crate) fn new(
        strategy: Arc<dyn Strategy>,
        boundary: BoundaryId,
        info: LockInfo,
        handle: ReleaseHandle,
        default_timing: UnlockTiming,
    ) -> Self {
        LockGuard {
            strategy,
            boundary,
            info,
            handle,
            default_timing,
            released: false,
        }
    }

    pub fn info(&self) -> &LockInfo {
        &self.info
    }

    pub fn boundary(&self) -> &BoundaryId {
        &self.boundary
    }

    /// Release with an explicit timing.
    pub fn release(mut self, timing: UnlockTiming) {
        self.released = true;
        self.handle.schedule(
            self.strategy.clone(),
            self.boundary.clone(),
            self.info.clone(),
            timing,
        );
    }

    /// Release with the engine's default timing.
    pub fn release_default(self) {
        let timing = self.default_timing;
        self.release(timing);
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if !self.released {
            self.handle.schedule(
                self.strategy.clone(),
                self.boundary.clone(),
                self.info.clone(),
                self.default_timing,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::info::{ExecutionMode, LockInfo};
    use crate::strategy::SingleExecutionStrategy;

    fn held(strategy: &SingleExecutionStrategy, boundary: &BoundaryId) -> usize {
        strategy
            .current_locks()
            .get(boundary)
            .map_or(0, Vec::len)
    }

    fn admitted(
        strategy: &Arc<SingleExecutionStrategy>,
        boundary: &BoundaryId,
        action: &str,
    ) -> LockInfo {
        let info = LockInfo::single_execution(action, ExecutionMode::Action);
        strategy.can_lock(boundary, &info).unwrap();
        info
    }

    #[test]
    fn immediate_release_is_inline() {
        let coordinator = ReleaseCoordinator::spawn(Duration::from_millis(5));
        let strategy = Arc::new(SingleExecutionStrategy::new());
        let boundary = BoundaryId::from("b");
        let info = admitted(&strategy, &boundary, "save");

        coordinator.handle().schedule(
            strategy.clone(),
            boundary.clone(),
            info,
            UnlockTiming::Immediate,
        );
        assert_eq!(held(&strategy, &boundary), 0);
        coordinator.stop();
    }

    #[test]
    fn delayed_release_happens_after_the_delay() {
        let coordinator = ReleaseCoordinator::spawn(Duration::from_millis(2));
        let strategy = Arc::new(SingleExecutionStrategy::new());
        let boundary = BoundaryId::from("b");
        let info = admitted(&strategy, &boundary, "save");

        coordinator.handle().schedule(
            strategy.clone(),
            boundary.clone(),
            info,
            UnlockTiming::Delayed(Duration::from_millis(20)),
        );
        assert_eq!(held(&strategy, &boundary), 1);

        let deadline = Instant::now() + Duration::from_secs(2);
        while held(&strategy, &boundary) != 0 {
            assert!(Instant::now() < deadline, "release never happened");
            thread::sleep(Duration::from_millis(5));
        }
        coordinator.stop();
    }

    #[test]
    fn next_tick_release_happens_soon() {
        let coordinator = ReleaseCoordinator::spawn(Duration::from_millis(2));
        let strategy = Arc::new(SingleExecutionStrategy::new());
        let boundary = BoundaryId::from("b");
        let info = admitted(&strategy, &boundary, "save");

        coordinator.handle().schedule(
            strategy.clone(),
            boundary.clone(),
            info,
            UnlockTiming::NextTick,
        );

        let deadline = Instant::now() + Duration::from_secs(2);
        while held(&strategy, &boundary) != 0 {
            assert!(Instant::now() < deadline, "release never happened");
            thread::sleep(Duration::from_millis(2));
        }
        coordinator.stop();
    }

    #[test]
    fn stop_drains_pending_releases() {
        let coordinator = ReleaseCoordinator::spawn(Duration::from_millis(2));
        let strategy = Arc::new(SingleExecutionStrategy::new());
        let boundary = BoundaryId::from("b");
        let info = admitted(&strategy, &boundary, "save");

        coordinator.handle().schedule(
            strategy.clone(),
            boundary.clone(),
            info,
            UnlockTiming::Delayed(Duration::from_secs(3600)),
        );

        let stats = coordinator.stop();
        assert_eq!(stats.released, stats.scheduled);
        assert_eq!(held(&strategy, &boundary), 0);
    }

    #[test]
    fn scheduling_after_stop_releases_inline() {
        let coordinator = ReleaseCoordinator::spawn(Duration::from_millis(2));
        let handle = coordinator.handle();
        coordinator.stop();

        let strategy = Arc::new(SingleExecutionStrategy::new());
        let boundary = BoundaryId::from("b");
        let info = admitted(&strategy, &boundary, "save");

        handle.schedule(
            strategy.clone(),
            boundary.clone(),
            info,
            UnlockTiming::Delayed(Duration::from_secs(3600)),
        );
        assert_eq!(held(&strategy, &boundary), 0);
    }

    #[test]
    fn guard_drop_releases_once() {
        let coordinator = ReleaseCoordinator::spawn(Duration::from_millis(2));
        let strategy = Arc::new(SingleExecutionStrategy::new());
        let boundary = BoundaryId::from("b");
        let info = admitted(&strategy, &boundary, "save");

        {
            let _guard = LockGuard::new(
                strategy.clone(),
                boundary.clone(),
                info,
                coordinator.handle(),
                UnlockTiming::Immediate,
            );
        }
        assert_eq!(held(&strategy, &boundary), 0);
        coordinator.stop();
    }

    #[test]
    fn explicit_release_prevents_double_release() {
        let coordinator = ReleaseCoordinator::spawn(Duration::from_millis(2));
        let strategy = Arc::new(SingleExecutionStrategy::new());
        let boundary = BoundaryId::from("b");
        let first = admitted(&strategy, &boundary, "save");

        let guard = LockGuard::new(
            strategy.clone(),
            boundary.clone(),
            first,
            coordinator.handle(),
            UnlockTiming::Immediate,
        );
        guard.release(UnlockTiming::Immediate);
        assert_eq!(held(&strategy, &boundary), 0);

        // A second holder admitted after the release must not be disturbed
        // by the guard's drop.
        let _second = admitted(&strategy, &boundary, "save");
        assert_eq!(held(&strategy, &boundary), 1);
        coordinator.stop();
    }
}
