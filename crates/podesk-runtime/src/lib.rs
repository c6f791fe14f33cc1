//! podesk-runtime
//!
//! The engine services built on the storage seams of `podesk-db`:
//!
//! - [`SequenceAllocator`]: per-period order identifiers.
//! - [`OrderDesk`]: intake, creation and lifecycle transitions.
//! - [`DelayScanner`]: periodic stale-order sweeps with exactly-one claims.
//! - [`ReminderDispatcher`]: delivery seam for claimed escalations.

mod allocator;
mod clock;
mod desk;
mod dispatch;
mod scanner;

pub use allocator::{SequenceAllocator, DEFAULT_MAX_ATTEMPTS};
pub use clock::{Calendar, Clock, SystemClock, DEFAULT_TIMEZONE};
pub use desk::{Outcome, OrderDesk, WriteContention, DEFAULT_MAX_SAVE_ATTEMPTS};
pub use dispatch::{DispatchError, Escalation, LogDispatcher, ReminderDispatcher, WebhookDispatcher};
pub use scanner::{
    escalation_kind, CategoryReport, DelayScanner, ScanReport, DEFAULT_STALE_AFTER_HOURS,
};
