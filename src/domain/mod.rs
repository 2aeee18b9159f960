pub mod failure;
pub mod history;
pub mod timestamp;
pub mod url;
pub mod work;

pub use failure::{FailureCategory, FailureKind, FailureRecord, FailureStatus};
pub use history::{HistoryRecord, RecordSource, RecordStatus};
pub use url::NormalizedUrl;
pub use work::{NumberLedger, PendingWorkItem, WorkCategory};
