//! API middleware stack.
//!
//! Execution order (outermost → innermost):
//! 1. Access log: records every request, including rejected ones
//! 2. Rate limiter: reject early, save resources

pub mod audit;
pub mod rate;
