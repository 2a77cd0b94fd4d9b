pub mod admission;
pub mod alert;
pub mod error;
pub mod limits;
pub mod storage;
pub mod types;
pub mod usage;

pub use admission::{AdmissionGrant, AdmissionRequest, Principal};
pub use alert::{AlertKind, AlertRecord};
pub use error::{MeteringError, Resource};
pub use limits::{BYTES_PER_MB, MeteringLimits};
pub use storage::{FileDescriptor, QuotaStatus, TenantStorageRecord, UploadReceipt};
pub use types::{Namespace, TenantId};
pub use usage::{DailyUsageRecord, Direction, UsageStatus};
