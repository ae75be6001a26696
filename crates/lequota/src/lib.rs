#![warn(missing_docs)]

//! lequota - Capability Quota Ledger
//!
//! *Le Quota* (The Quota) - per-user consumption caps on gated
//! capabilities, enforced with an atomic check-and-increment.

/// Capability identifiers and configured limits.
pub mod limits;
/// The ledger itself.
pub mod ledger;

pub use ledger::{QuotaDecision, QuotaLedger, QuotaSnapshot};
pub use limits::{Capability, CapabilityLimits, QuotaLimits};
