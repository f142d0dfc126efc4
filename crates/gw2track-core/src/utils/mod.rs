//! Utility functions for display formatting and text matching.

pub mod format;

pub use format::{contains_ignore_case, format_age, percent, truncate};
