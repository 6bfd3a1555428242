//! chw-transitions library interface
//!
//! Record-change transitions for community-health data records. The facility
//! resolver attaches the owning facility contact to inbound records.

pub mod context;
pub mod facility_resolver;
pub mod records;
pub mod runner;
pub mod store;
pub mod types;

pub use crate::context::TransitionContext;
pub use crate::facility_resolver::{FacilityResolver, FACILITY_NOT_FOUND};
pub use crate::records::{read_record_lines, write_record_lines, RecordLine};
pub use crate::runner::{RunOutcome, RunSummary, TransitionRunner};
pub use crate::store::MemoryStore;
pub use crate::types::{FacilityIndex, FacilityQuery, IndexKey, IndexRow, LineageHydrator, Transition};
