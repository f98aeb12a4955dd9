//! Common data model and error types for the butterfly-osm toolkit

pub mod element;
pub mod entity;
pub mod error;
pub mod location;

pub use element::{Area, Changeset, Element, Member, Meta, Node, Relation, Ring, Tags, Way, WayNode};
pub use entity::{CompositeKey, EntityKind, EntityMask};
pub use error::{Error, Result};
pub use location::Location;
