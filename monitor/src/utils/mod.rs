//! Shared utilities for the monitor crate.

pub mod debounce;

pub use debounce::{Debouncer, DebouncerError};
