//! CIDR range arithmetic and first-fit allocation.
//!
//! Everything in this module is pure: no store access, no logging.

pub mod allocator;
pub mod range;

pub use allocator::{allocate, AllocationError};
pub use range::parse;
