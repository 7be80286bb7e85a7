//! SNMP host statistics poller.
//!
//! Periodically walks the interface, host-resources, TCP and UDP MIBs of
//! every host in an INI config file and stores the results in an
//! OpenInstrument datastore:
//!
//! - [`config`] - Host list with hot reload (`ConfigStore`)
//! - [`session`] - SNMP bulk walks (`Walker`, `SnmpSession`)
//! - [`table`] - Walk results to tables (`TableBuilder`)
//! - [`coerce`] - Wire types to metric values
//! - [`metrics`] - Labeled sample construction (`MetricBuilder`)
//! - [`collector`] - Interface, filesystem, system and socket collectors
//! - [`poller`] - One poll cycle for one host (`HostPoller`)
//! - [`dispatch`] - Datastore hand-off (`Dispatch`)
//! - [`scheduler`] - Per-host scheduling over a bounded worker pool

pub mod coerce;
pub mod collector;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod metrics;
pub mod mib;
pub mod oid;
pub mod poller;
pub mod scheduler;
pub mod session;
pub mod table;
pub mod watch;

pub use config::{ConfigSnapshot, ConfigStore, HostConfig};
pub use error::{ConfigError, TransportError};
pub use poller::{HostPoller, PollReport};
pub use scheduler::{RunExit, Scheduler, SchedulerOptions};
pub use session::{SnmpSession, WalkEntry, Walker, WireValue};
