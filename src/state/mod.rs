//! Source lifecycle state
//!
//! The download manager owns the status state machine; status transitions
//! are the only legal mutation path for a source's lifecycle.

mod source_status;

pub use source_status::SourceStatus;
