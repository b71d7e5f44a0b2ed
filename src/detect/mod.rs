//! Change detection and integrity verification
//!
//! Both halves compare origin snapshots against stored data through the
//! same canonical content hash: the detector turns differences into an
//! append-only event log, the checker turns them into a per-source
//! integrity score.

mod change_detector;
mod diff;
mod integrity;

pub use change_detector::ChangeDetector;
pub use diff::{describe_differences, field_diff};
pub use integrity::{
    IntegrityChecker, IntegrityReport, Mismatch, Reference, VerificationSummary,
};
