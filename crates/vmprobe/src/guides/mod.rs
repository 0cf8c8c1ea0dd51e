//! Guides for using vmprobe.
//!
//! For API reference, see the individual type documentation.

#[doc = include_str!("writing_scenarios.md")]
pub mod writing_scenarios {}
