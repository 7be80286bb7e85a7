//! The process driver.
//!
//! Once per tick the scheduler checks the executable and the config file,
//! collects finished polls and starts a poll task for every host that is
//! due. Each host has at most one poll in flight; a `Semaphore` bounds how
//! many run at once so one slow device never holds up the others.

use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::{Id, JoinError, JoinSet};
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::{ConfigStore, HostConfig};
use crate::dispatch::Dispatch;
use crate::poller::{HostPoller, PollReport};
use crate::session::Walker;
use crate::watch::ExecutableWatch;

/// Scheduling granularity.
pub const TICK: Duration = Duration::from_secs(1);
/// Longest interval a backed-off host waits between attempts.
pub const MAX_BACKOFF: Duration = Duration::from_secs(3600);
const MAX_BACKOFF_EXPONENT: u32 = 6;

/// Scheduler tuning.
#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    /// Maximum number of concurrent host polls.
    pub workers: usize,
    pub tick: Duration,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            workers: 8,
            tick: TICK,
        }
    }
}

/// Why [`Scheduler::run`] returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunExit {
    /// The shutdown future completed.
    Shutdown,
    /// The executable at this path was replaced.
    ExecutableChanged(PathBuf),
}

/// Per-host scheduling state. Only the scheduler touches it.
#[derive(Debug, Clone, Default)]
struct PollState {
    /// When the last attempt finished, successful or not.
    last_poll: Option<Instant>,
    in_flight: bool,
    consecutive_failures: u32,
}

/// Interval until the next attempt, stretched while a host with backoff
/// enabled keeps failing.
pub fn effective_interval(host: &HostConfig, consecutive_failures: u32) -> Duration {
    if !host.backoff || consecutive_failures == 0 {
        return host.interval;
    }
    let factor = 2u32.pow(consecutive_failures.min(MAX_BACKOFF_EXPONENT));
    host.interval
        .saturating_mul(factor)
        .min(MAX_BACKOFF)
        .max(host.interval)
}

type TaskOutput = (PollReport, Instant);

pub struct Scheduler<W, D> {
    config: ConfigStore,
    poller: Arc<HostPoller<W, D>>,
    permits: Arc<Semaphore>,
    tasks: JoinSet<TaskOutput>,
    running: HashMap<Id, String>,
    states: HashMap<String, PollState>,
    executable: Option<ExecutableWatch>,
    options: SchedulerOptions,
}

impl<W: Walker, D: Dispatch> Scheduler<W, D> {
    pub fn new(config: ConfigStore, poller: Arc<HostPoller<W, D>>, options: SchedulerOptions) -> Self {
        let workers = options.workers.max(1);
        Self {
            config,
            poller,
            permits: Arc::new(Semaphore::new(workers)),
            tasks: JoinSet::new(),
            running: HashMap::new(),
            states: HashMap::new(),
            executable: None,
            options,
        }
    }

    /// Re-exec when this executable changes on disk.
    pub fn with_executable_watch(mut self, watch: ExecutableWatch) -> Self {
        self.executable = Some(watch);
        self
    }

    /// Number of poll tasks not yet reaped.
    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    /// Drive the scheduler until `shutdown` completes or the executable
    /// changes. In-flight polls are left running; see [`Scheduler::drain`].
    pub async fn run(&mut self, shutdown: impl Future<Output = ()>) -> RunExit {
        tracing::info!(
            path = %self.config.path().display(),
            hosts = self.config.snapshot().len(),
            workers = self.permits.available_permits(),
            "Scheduler started"
        );

        let mut ticker = tokio::time::interval(self.options.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => return RunExit::Shutdown,
                _ = ticker.tick() => {}
            }

            if let Some(watch) = &self.executable {
                if watch.changed() {
                    return RunExit::ExecutableChanged(watch.path().to_path_buf());
                }
            }
            self.tick();
        }
    }

    /// One scheduling pass: reload config, reap finished polls, start due
    /// hosts.
    pub fn tick(&mut self) {
        match self.config.check_and_reload() {
            Ok(true) => self.prune_states(),
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(error = %e, "Config reload failed, keeping previous configuration");
            }
        }

        while let Some(result) = self.tasks.try_join_next_with_id() {
            self.finish(result);
        }

        let now = Instant::now();
        let snapshot = self.config.snapshot();
        for host in snapshot.schedulable() {
            let state = self.states.entry(host.name.clone()).or_default();
            if state.in_flight {
                continue;
            }
            let due = state.last_poll.is_none_or(|last| {
                now.saturating_duration_since(last)
                    >= effective_interval(host, state.consecutive_failures)
            });
            if !due {
                continue;
            }
            state.in_flight = true;
            self.spawn(host.clone());
        }
    }

    fn spawn(&mut self, host: Arc<HostConfig>) {
        let poller = self.poller.clone();
        let permits = self.permits.clone();
        let name = host.name.clone();

        let handle = self.tasks.spawn(async move {
            let _permit = permits.acquire_owned().await;
            let report = poller.poll(&host).await;
            (report, Instant::now())
        });
        tracing::debug!(host = %name, "Poll started");
        self.running.insert(handle.id(), name);
    }

    fn finish(&mut self, result: Result<(Id, TaskOutput), JoinError>) {
        let (id, outcome) = match result {
            Ok((id, (report, finished))) => (id, Ok((report, finished))),
            Err(e) => (e.id(), Err(e)),
        };
        let Some(name) = self.running.remove(&id) else {
            return;
        };
        let snapshot = self.config.snapshot();
        let Some(host) = snapshot.host(&name) else {
            // Removed by a reload while polling.
            self.states.remove(&name);
            return;
        };
        let state = self.states.entry(name.clone()).or_default();
        state.in_flight = false;

        match outcome {
            Ok((report, finished)) => {
                state.last_poll = Some(finished);
                if report.is_unreachable() {
                    state.consecutive_failures = state.consecutive_failures.saturating_add(1);
                    if host.backoff {
                        tracing::info!(
                            host = %name,
                            failures = state.consecutive_failures,
                            next_in_secs = effective_interval(host, state.consecutive_failures).as_secs(),
                            "Host unreachable, backing off"
                        );
                    }
                } else {
                    state.consecutive_failures = 0;
                }
            }
            Err(e) => {
                state.last_poll = Some(Instant::now());
                if e.is_panic() {
                    tracing::error!(host = %name, "Poll task panicked");
                } else {
                    tracing::debug!(host = %name, "Poll task cancelled");
                }
            }
        }
    }

    /// Forget hosts that are gone from the config, unless still polling.
    fn prune_states(&mut self) {
        let snapshot = self.config.snapshot();
        self.states
            .retain(|name, state| state.in_flight || snapshot.host(name).is_some());
    }

    /// Wait up to `grace` for in-flight polls, then abort the rest.
    pub async fn drain(&mut self, grace: Duration) {
        if self.tasks.is_empty() {
            return;
        }
        tracing::info!(in_flight = self.tasks.len(), "Waiting for in-flight polls");

        let deadline = Instant::now() + grace;
        loop {
            match tokio::time::timeout_at(deadline, self.tasks.join_next_with_id()).await {
                Ok(Some(result)) => self.finish(result),
                Ok(None) => return,
                Err(_) => break,
            }
        }

        tracing::warn!(aborted = self.tasks.len(), "Aborting polls still running");
        self.tasks.abort_all();
        while let Some(result) = self.tasks.join_next_with_id().await {
            self.finish(result);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::mib;
    use crate::poller::testing::{FakeWalker, RecordingDispatch, host};
    use crate::session::{WalkEntry, WireValue};

    const SETTLE: Duration = Duration::from_secs(3600);

    fn write_config(path: &Path, content: &str) {
        let staged = path.with_extension("new");
        std::fs::write(&staged, content).unwrap();
        std::fs::rename(&staged, path).unwrap();
    }

    fn scheduler(
        dir: &tempfile::TempDir,
        content: &str,
        walker: FakeWalker,
        dispatch: RecordingDispatch,
    ) -> (Scheduler<FakeWalker, RecordingDispatch>, PathBuf) {
        let path = dir.path().join("snmp_hoststats.cfg");
        write_config(&path, content);
        let config = ConfigStore::load(&path).unwrap();
        let poller = Arc::new(HostPoller::new(walker, dispatch, "poller"));
        (Scheduler::new(config, poller, SchedulerOptions::default()), path)
    }

    fn eth0() -> Vec<WalkEntry> {
        vec![
            WalkEntry::new("1.3.6.1.2.1.2.2.1.2.1", WireValue::OctetString(b"eth0".to_vec())),
            WalkEntry::new("1.3.6.1.2.1.2.2.1.10.1", WireValue::Counter32(1)),
        ]
    }

    #[test]
    fn test_effective_interval() {
        let mut h = host("sw1");
        assert_eq!(effective_interval(&h, 3), Duration::from_secs(60));

        h.backoff = true;
        assert_eq!(effective_interval(&h, 0), Duration::from_secs(60));
        assert_eq!(effective_interval(&h, 1), Duration::from_secs(120));
        assert_eq!(effective_interval(&h, 3), Duration::from_secs(480));
        assert_eq!(effective_interval(&h, 20), MAX_BACKOFF);

        h.interval = Duration::from_secs(7200);
        assert_eq!(effective_interval(&h, 2), Duration::from_secs(7200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_skipped_hosts_never_polled() {
        let dir = tempfile::tempdir().unwrap();
        let walker = FakeWalker::default();
        let (mut sched, _) = scheduler(
            &dir,
            "[sw1]\npoll_interfaces = 1\n[old-box]\nskip = 1\npoll_interfaces = 1\n",
            walker.clone(),
            RecordingDispatch::default(),
        );

        for _ in 0..3 {
            sched.tick();
            sched.drain(SETTLE).await;
            tokio::time::advance(Duration::from_secs(120)).await;
        }

        let hosts = walker.walked_hosts();
        assert_eq!(hosts.len(), 3);
        assert!(hosts.iter().all(|h| h == "sw1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_host_does_not_block_others() {
        let dir = tempfile::tempdir().unwrap();
        let walker = FakeWalker::default()
            .with("fast", mib::IF_TABLE, eth0())
            .timing_out("slow", Duration::from_secs(30));
        let dispatch = RecordingDispatch::default();
        let (mut sched, _) = scheduler(
            &dir,
            "[slow]\npoll_interfaces = 1\n[fast]\npoll_interfaces = 1\nstore = db:8020\n",
            walker.clone(),
            dispatch.clone(),
        );

        sched.tick();
        assert_eq!(sched.in_flight(), 2);

        tokio::time::sleep(Duration::from_secs(1)).await;
        sched.tick();
        assert_eq!(dispatch.hosts(), vec!["fast"]);
        assert_eq!(sched.in_flight(), 1);

        sched.drain(SETTLE).await;
        assert_eq!(sched.in_flight(), 0);
        assert_eq!(dispatch.count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_respected() {
        let dir = tempfile::tempdir().unwrap();
        let walker = FakeWalker::default();
        let (mut sched, _) = scheduler(
            &dir,
            "[sw1]\ninterval = 60\npoll_interfaces = 1\n",
            walker.clone(),
            RecordingDispatch::default(),
        );

        sched.tick();
        sched.drain(SETTLE).await;
        assert_eq!(walker.walked_hosts().len(), 1);

        tokio::time::advance(Duration::from_secs(30)).await;
        sched.tick();
        sched.drain(SETTLE).await;
        assert_eq!(walker.walked_hosts().len(), 1);

        tokio::time::advance(Duration::from_secs(30)).await;
        sched.tick();
        sched.drain(SETTLE).await;
        assert_eq!(walker.walked_hosts().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_host_not_started_twice() {
        let dir = tempfile::tempdir().unwrap();
        let walker = FakeWalker::default().timing_out("sw1", Duration::from_secs(10));
        let (mut sched, _) = scheduler(
            &dir,
            "[sw1]\ninterval = 1\npoll_interfaces = 1\n",
            walker.clone(),
            RecordingDispatch::default(),
        );

        sched.tick();
        tokio::time::sleep(Duration::from_secs(2)).await;
        sched.tick();
        assert_eq!(sched.in_flight(), 1);
        sched.drain(SETTLE).await;
        assert_eq!(walker.walked_hosts().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reload_adds_and_removes_hosts() {
        let dir = tempfile::tempdir().unwrap();
        let walker = FakeWalker::default();
        let (mut sched, path) = scheduler(
            &dir,
            "[sw1]\npoll_interfaces = 1\n",
            walker.clone(),
            RecordingDispatch::default(),
        );

        sched.tick();
        sched.drain(SETTLE).await;

        write_config(&path, "[sw2]\npoll_interfaces = 1\n");
        sched.tick();
        sched.drain(SETTLE).await;
        assert_eq!(walker.walked_hosts(), vec!["sw1", "sw2"]);
        assert!(!sched.states.contains_key("sw1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_bad_reload_keeps_polling() {
        let dir = tempfile::tempdir().unwrap();
        let walker = FakeWalker::default();
        let (mut sched, path) = scheduler(
            &dir,
            "[sw1]\ninterval = 10\npoll_interfaces = 1\n",
            walker.clone(),
            RecordingDispatch::default(),
        );
        sched.tick();
        sched.drain(SETTLE).await;

        write_config(&path, "[sw1]\ninterval = soon\n");
        tokio::time::advance(Duration::from_secs(10)).await;
        sched.tick();
        sched.drain(SETTLE).await;
        assert_eq!(walker.walked_hosts().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_after_unreachable_cycles() {
        let dir = tempfile::tempdir().unwrap();
        let walker = FakeWalker::default().timing_out("sw1", Duration::from_secs(1));
        let (mut sched, _) = scheduler(
            &dir,
            "[sw1]\ninterval = 10\nbackoff = 1\npoll_interfaces = 1\n",
            walker.clone(),
            RecordingDispatch::default(),
        );

        sched.tick();
        sched.drain(SETTLE).await;
        assert_eq!(sched.states["sw1"].consecutive_failures, 1);

        // Plain interval has passed, backed-off interval (20s) has not.
        tokio::time::advance(Duration::from_secs(10)).await;
        sched.tick();
        assert_eq!(sched.in_flight(), 0);

        tokio::time::advance(Duration::from_secs(10)).await;
        sched.tick();
        assert_eq!(sched.in_flight(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let walker = FakeWalker::default();
        let (mut sched, _) = scheduler(
            &dir,
            "[sw1]\npoll_interfaces = 1\n",
            walker.clone(),
            RecordingDispatch::default(),
        );

        let exit = sched
            .run(tokio::time::sleep(Duration::from_millis(2500)))
            .await;
        assert_eq!(exit, RunExit::Shutdown);
        sched.drain(SETTLE).await;
        assert_eq!(walker.walked_hosts(), vec!["sw1"]);
    }
}
