//! CLI-specific utilities for butterfly-stream
//!
//! This module contains code specific to the command-line interface,
//! separate from the core library functionality.

pub mod diff;
pub mod output;

pub use diff::{classify, Change};
pub use output::{KindCounts, OutputFormat};
