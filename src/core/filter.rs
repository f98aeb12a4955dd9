//! Filter stages applied to records right before they are yielded

use std::fmt;

use butterfly_common::{Element, EntityKind, EntityMask};
use rustc_hash::FxHashSet;

/// A stage that can drop (`None`) or pass through (`Some`) a record,
/// possibly modified
pub trait Filter: Send {
    fn apply(&mut self, element: Element) -> Option<Element>;
}

impl<F> Filter for F
where
    F: FnMut(Element) -> Option<Element> + Send,
{
    fn apply(&mut self, element: Element) -> Option<Element> {
        self(element)
    }
}

/// Ordered, append-only list of filters
#[derive(Default)]
pub struct FilterChain {
    stages: Vec<Box<dyn Filter>>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, filter: impl Filter + 'static) {
        self.stages.push(Box::new(filter));
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Run `element` through every stage in registration order, stopping at
    /// the first veto
    pub fn apply(&mut self, element: Element) -> Option<Element> {
        self.stages
            .iter_mut()
            .try_fold(element, |element, stage| stage.apply(element))
    }
}

impl fmt::Debug for FilterChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterChain")
            .field("stages", &self.stages.len())
            .finish()
    }
}

/// Passes only records of the given kinds
#[derive(Debug, Clone, Copy)]
pub struct EntityFilter {
    mask: EntityMask,
}

impl EntityFilter {
    pub fn new(mask: EntityMask) -> Self {
        EntityFilter { mask }
    }
}

impl Filter for EntityFilter {
    fn apply(&mut self, element: Element) -> Option<Element> {
        self.mask.contains(element.kind()).then_some(element)
    }
}

/// Passes records carrying at least one of the keys
#[derive(Debug, Clone)]
pub struct KeyFilter {
    keys: Vec<String>,
}

impl KeyFilter {
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        KeyFilter {
            keys: keys.into_iter().map(Into::into).collect(),
        }
    }
}

impl Filter for KeyFilter {
    fn apply(&mut self, element: Element) -> Option<Element> {
        let tags = element.tags();
        self.keys
            .iter()
            .any(|k| tags.contains_key(k))
            .then_some(element)
    }
}

/// Passes records carrying at least one of the exact key/value pairs
#[derive(Debug, Clone)]
pub struct TagFilter {
    tags: Vec<(String, String)>,
}

impl TagFilter {
    pub fn new<I, K, V>(tags: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        TagFilter {
            tags: tags
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl Filter for TagFilter {
    fn apply(&mut self, element: Element) -> Option<Element> {
        let tags = element.tags();
        self.tags
            .iter()
            .any(|(k, v)| tags.get(k) == Some(v.as_str()))
            .then_some(element)
    }
}

/// Passes records of one kind whose id is in a set; other kinds pass
/// untouched
#[derive(Debug, Clone)]
pub struct IdFilter {
    kind: EntityKind,
    ids: FxHashSet<i64>,
}

impl IdFilter {
    pub fn new(kind: EntityKind, ids: impl IntoIterator<Item = i64>) -> Self {
        IdFilter {
            kind,
            ids: ids.into_iter().collect(),
        }
    }
}

impl Filter for IdFilter {
    fn apply(&mut self, element: Element) -> Option<Element> {
        if element.kind() != self.kind || self.ids.contains(&element.id()) {
            Some(element)
        } else {
            None
        }
    }
}

/// Drops records without any tags
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyTagFilter;

impl Filter for EmptyTagFilter {
    fn apply(&mut self, element: Element) -> Option<Element> {
        (!element.tags().is_empty()).then_some(element)
    }
}
