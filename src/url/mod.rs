//! URL normalization and domain filtering
//!
//! Normalization strips fragments and keeps only a fixed allow-list of query
//! parameters, so the visited set collapses surface-different URLs that
//! denote the same resource.

mod domain;
mod normalize;

pub use domain::{extract_domain, is_allowed_domain};
pub use normalize::normalize_url;
