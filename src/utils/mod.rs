//! Pure utility functions.
//!
//! These are small helpers and injectable seams used across the codebase.

pub mod bootstrap;
pub mod clock;
pub mod random;
pub mod retry;
