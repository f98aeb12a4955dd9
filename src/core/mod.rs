//! Core library modules for butterfly-stream
//!
//! Readers turn an [`Input`](source::Input) into records, the processor
//! chains the location stage, area assembly and filters over them, and
//! [`zip`] aligns several sorted streams.

pub mod area;
pub mod config;
pub mod filter;
pub mod index;
pub mod locations;
pub mod opl;
pub mod pbf;
pub mod processor;
pub mod source;
pub mod zip;
