//! podesk-lifecycle
//!
//! Pure order lifecycle rules: the approval/deletion state machine with its
//! payment-derived sub-state, and intake validation of drafts. No I/O.

pub mod intake;
mod state_machine;

pub use intake::{
    describe, validate_draft, DraftParser, IntakeError, LineDraftParser, ParsedDraft, ValidDraft,
};
pub use state_machine::{apply, validate_payment, LifecycleError, LifecycleEvent};
