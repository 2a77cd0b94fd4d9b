//! The Tally metering engine.
//!
//! [`QuotaLedger`] and [`BandwidthLedger`] own the per-tenant records,
//! [`AlertEngine`] turns their state into threshold alerts, [`AdmissionGate`]
//! authorizes transfers before bytes move, and [`QuotaEnforcer`] runs the
//! storage-side upload, download and delete flows. [`MeterBuilder`] wires
//! them around a shared state store.

pub mod admission;
pub mod alert;
pub mod builder;
pub mod clock;
pub mod enforcer;
pub mod error;
pub mod ledger;
pub mod metrics;
mod records;

pub use admission::{Admission, AdmissionGate, AdmissionMode, DEFAULT_ADMISSION_TIMEOUT};
pub use alert::{ALERT_QUERY_LIMIT, AlertEngine, AlertPolicy};
pub use builder::{Meter, MeterBuilder};
pub use clock::{Clock, ManualClock, SystemClock};
pub use enforcer::{Admitted, ChunkStream, DEFAULT_STREAM_CHUNK, QuotaEnforcer};
pub use error::BuildError;
pub use ledger::{BandwidthLedger, LedgerContext, QuotaLedger};
pub use metrics::{MeterMetrics, MetricsSnapshot};
