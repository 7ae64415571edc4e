//! Helpers shared across pagemine crates.

pub mod time;
