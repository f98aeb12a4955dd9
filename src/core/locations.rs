//! Location resolution stage
//!
//! Nodes passing through the stage have their location recorded in the
//! cache; ways get the locations of their node references filled in.

use butterfly_common::{Element, Error, Result};

use crate::core::index::LocationCache;

/// What to do with a way node whose location is not cached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissingLocationPolicy {
    /// Report [`Error::MissingLocation`]
    #[default]
    Fail,
    /// Leave the reference without location, as needed for partial extracts
    Ignore,
}

pub struct NodeLocationsForWays {
    cache: LocationCache,
    policy: MissingLocationPolicy,
    missing: u64,
}

impl NodeLocationsForWays {
    pub fn new(cache: LocationCache) -> Self {
        NodeLocationsForWays {
            cache,
            policy: MissingLocationPolicy::default(),
            missing: 0,
        }
    }

    pub fn ignore_errors(mut self) -> Self {
        self.policy = MissingLocationPolicy::Ignore;
        self
    }

    pub fn cache(&self) -> &LocationCache {
        &self.cache
    }

    /// Number of references left unresolved so far
    pub fn missing(&self) -> u64 {
        self.missing
    }

    pub fn apply(&mut self, element: &mut Element) -> Result<()> {
        match element {
            Element::Node(node) => {
                if node.location.is_defined() {
                    self.cache.set(node.id, node.location);
                }
            }
            Element::Way(way) => {
                let policy = self.policy;
                let mut missing = 0;
                let resolved = self.cache.with_index(|index| {
                    for way_node in way.nodes.iter_mut() {
                        match index.get(way_node.id) {
                            Some(location) => way_node.location = location,
                            None if policy == MissingLocationPolicy::Ignore => missing += 1,
                            None => {
                                return Err(Error::MissingLocation {
                                    way: way.id,
                                    node: way_node.id,
                                })
                            }
                        }
                    }
                    Ok(())
                });
                self.missing += missing;
                if missing > 0 {
                    log::trace!("Way {} has {missing} unresolved node references", way.id);
                }
                resolved?;
            }
            _ => {}
        }
        Ok(())
    }
}
