//! One poll cycle for one host.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use instrument_common::{Batch, current_timestamp_millis};

use crate::collector::{self, Collection};
use crate::config::HostConfig;
use crate::dispatch::Dispatch;
use crate::metrics::MetricBuilder;
use crate::mib::{self, MibResolver};
use crate::session::{WalkEntry, Walker};

/// Outcome of one host cycle, logged once per cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PollReport {
    pub host: String,
    /// Metrics emitted into the batch.
    pub metrics: usize,
    /// Walks that failed (timeouts included).
    pub transport_errors: usize,
    pub timeouts: usize,
    /// Skipped fields by reason.
    pub skipped: BTreeMap<&'static str, usize>,
    /// The batch reached the datastore.
    pub dispatched: bool,
    pub elapsed: Duration,
}

impl PollReport {
    /// Every walk failed and nothing was collected.
    pub fn is_unreachable(&self) -> bool {
        self.transport_errors > 0 && self.metrics == 0
    }
}

/// Runs the feature collectors for a host and dispatches the result.
#[derive(Debug)]
pub struct HostPoller<W, D> {
    walker: W,
    dispatcher: D,
    mib: MibResolver,
    srchost: String,
}

impl<W: Walker, D: Dispatch> HostPoller<W, D> {
    pub fn new(walker: W, dispatcher: D, srchost: impl Into<String>) -> Self {
        Self {
            walker,
            dispatcher,
            mib: MibResolver::builtin(),
            srchost: srchost.into(),
        }
    }

    /// Walk `prefix`, turning any transport error into an empty result.
    async fn walk(&self, host: &HostConfig, prefix: &str, report: &mut PollReport) -> Vec<WalkEntry> {
        match self.walker.bulk_walk(host, prefix).await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(host = %host.name, prefix, error = %e, "SNMP walk failed");
                report.transport_errors += 1;
                if e.is_timeout() {
                    report.timeouts += 1;
                }
                Vec::new()
            }
        }
    }

    /// Run every enabled collector and return the batch without sending it.
    pub async fn collect(&self, host: &HostConfig) -> (Batch, PollReport) {
        let started = Instant::now();
        let metrics = MetricBuilder::new(&host.name, &self.srchost, current_timestamp_millis());
        let mut report = PollReport {
            host: host.name.clone(),
            ..Default::default()
        };
        let mut out = Collection::new();
        let features = host.features;

        if features.interfaces {
            let if_walk = self.walk(host, mib::IF_TABLE, &mut report).await;
            let if_x_walk = if if_walk.is_empty() {
                Vec::new()
            } else {
                self.walk(host, mib::IF_X_TABLE, &mut report).await
            };
            collector::interface_stats(&metrics, &self.mib, &if_walk, &if_x_walk, &mut out);
        }

        let storage_walk = if features.filesystems || features.system {
            self.walk(host, mib::HR_STORAGE_TABLE, &mut report).await
        } else {
            Vec::new()
        };
        if features.filesystems {
            collector::filesystem_stats(&metrics, &self.mib, &storage_walk, &mut out);
        }
        if features.system {
            let system_walk = self.walk(host, mib::HR_SYSTEM, &mut report).await;
            collector::system_stats(&metrics, &self.mib, &system_walk, &storage_walk, &mut out);
        }

        if features.sockets {
            let tcp_walk = self.walk(host, mib::TCP, &mut report).await;
            let udp_walk = self.walk(host, mib::UDP, &mut report).await;
            collector::socket_stats(&metrics, &self.mib, &tcp_walk, &udp_walk, &mut out);
        }

        report.metrics = out.batch.len();
        report.skipped = out.skipped;
        report.elapsed = started.elapsed();
        (out.batch, report)
    }

    /// Collect, then hand a non-empty batch to the dispatcher.
    pub async fn poll(&self, host: &HostConfig) -> PollReport {
        let (batch, mut report) = self.collect(host).await;

        if !batch.is_empty() {
            match self.dispatcher.dispatch(host, &batch).await {
                Ok(()) => report.dispatched = true,
                Err(e) => {
                    tracing::warn!(host = %host.name, error = %e, "Dropping batch");
                }
            }
        }

        tracing::info!(
            host = %report.host,
            metrics = report.metrics,
            transport_errors = report.transport_errors,
            skipped = report.skipped.values().sum::<usize>(),
            skipped_by_reason = ?report.skipped,
            dispatched = report.dispatched,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Poll cycle complete"
        );
        report
    }
}
