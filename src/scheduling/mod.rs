//! Doctor appointment scheduling.
//!
//! `slots` answers "which half-hours are still free on this day";
//! `reservations` creates and mutates appointments. Reservations never
//! trust a previously computed slot list: the storage layer's unique index
//! on live (doctor, instant) pairs is the final arbiter.

pub mod reservations;
pub mod slots;

pub use reservations::*;
pub use slots::*;
