//! Utility modules for the Feedmark tracker.
//!
//! # Modules
//!
//! - [`debounce`]: Cancel-and-reschedule deadline timer for coalescing bursts

pub mod debounce;

pub use debounce::DebounceTimer;
