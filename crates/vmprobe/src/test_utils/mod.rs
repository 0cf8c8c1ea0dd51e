//! In-memory stand-ins for the orchestration platform and guest consoles.
//!
//! Enabled with the `test-utils` feature.

mod guest;
mod platform;

pub use guest::{FakeGuest, GuestHandle};
pub use platform::{FakePlatform, VmPlan};
