//! Input Validation
//!
//! Every record from a remote peer passes through [`validate`] before it
//! can touch the delta store or the simulation. A rejection is always
//! attributable to the sending peer.

pub mod combinator;
pub mod rules;

pub use combinator::{all_of, at_most, below, in_bounds, in_range, is_one_of, Reason, Rejection, Verdict};
pub use rules::{validate, ValidationContext};
