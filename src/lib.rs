//! # Butterfly-stream Library
//!
//! Pull-based OpenStreetMap record streams with optional node location
//! caching, two-pass area assembly and per-record filters, plus a merge
//! synchronizer for comparing sorted files.
//!
//! ## Basic Usage
//!
//! ```rust,no_run
//! use butterfly_stream::{Element, StreamProcessor};
//!
//! fn main() -> butterfly_stream::Result<()> {
//!     let processor = StreamProcessor::open("monaco-latest.osm.pbf")?
//!         .with_areas()?
//!         .with_filter(|e: Element| e.tags().contains_key("building").then_some(e));
//!
//!     for record in processor {
//!         if let Element::Area(area) = record? {
//!             println!("building area {}", area.orig_id());
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Comparing Files
//!
//! ```rust,no_run
//! use butterfly_stream::{zip_processors, StreamProcessor};
//!
//! fn main() -> butterfly_stream::Result<()> {
//!     let old = StreamProcessor::open("old.osm.pbf")?;
//!     let new = StreamProcessor::open("new.osm.pbf")?;
//!     for tuple in zip_processors([old, new]) {
//!         let tuple = tuple?;
//!         if tuple[0] != tuple[1] {
//!             println!("changed: {:?}", tuple);
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod core;

pub use butterfly_common::{
    Area, Changeset, CompositeKey, Element, EntityKind, EntityMask, Error, Location, Member, Meta,
    Node, Relation, Result, Ring, Tags, Way, WayNode,
};

pub use crate::core::area::{AreaAssembler, MultipolygonAssembler, StagingBuffer};
pub use crate::core::config::StreamConfig;
pub use crate::core::filter::{Filter, FilterChain};
pub use crate::core::index::{available_maps, create_map, LocationCache, LocationIndex};
pub use crate::core::locations::NodeLocationsForWays;
pub use crate::core::processor::{LocationStorage, Records, StreamProcessor};
pub use crate::core::source::{FileFormat, Header, Input, RecordReader};
pub use crate::core::zip::{zip_processors, ZipStreams};
