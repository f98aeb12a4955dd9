//! Owned OSM records as they travel through a stream

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::entity::{CompositeKey, EntityKind};
use crate::location::Location;

/// Key/value tags in file order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Tags(Vec<(String, String)>);

impl Tags {
    pub fn new() -> Self {
        Tags(Vec::new())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.push((key.into(), value.into()));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Tags {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Tags(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Editing metadata shared by all OSM objects
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Meta {
    pub version: Option<u32>,
    pub changeset: Option<i64>,
    pub timestamp: Option<DateTime<Utc>>,
    pub uid: Option<i64>,
    pub user: Option<String>,
    pub visible: bool,
}

impl Default for Meta {
    fn default() -> Self {
        Meta {
            version: None,
            changeset: None,
            timestamp: None,
            uid: None,
            user: None,
            visible: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Node {
    pub id: i64,
    pub meta: Meta,
    pub location: Location,
    pub tags: Tags,
}

/// A node reference inside a way, with its location once resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WayNode {
    pub id: i64,
    pub location: Location,
}

impl WayNode {
    pub fn new(id: i64) -> Self {
        WayNode {
            id,
            location: Location::UNDEFINED,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Way {
    pub id: i64,
    pub meta: Meta,
    pub nodes: Vec<WayNode>,
    pub tags: Tags,
}

impl Way {
    /// First and last node reference are the same and there are enough
    /// references to enclose an area
    pub fn is_closed(&self) -> bool {
        match (self.nodes.first(), self.nodes.last()) {
            (Some(first), Some(last)) => self.nodes.len() >= 4 && first.id == last.id,
            _ => false,
        }
    }

    pub fn node_ids(&self) -> impl Iterator<Item = i64> + '_ {
        self.nodes.iter().map(|n| n.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Member {
    pub kind: EntityKind,
    pub id: i64,
    pub role: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Relation {
    pub id: i64,
    pub meta: Meta,
    pub members: Vec<Member>,
    pub tags: Tags,
}

/// Outer ring of an area with the inner rings it contains
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Ring {
    pub outer: Vec<WayNode>,
    pub inners: Vec<Vec<WayNode>>,
}

/// Polygon assembled from a closed way or a multipolygon relation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Area {
    pub id: i64,
    pub meta: Meta,
    pub rings: Vec<Ring>,
    pub tags: Tags,
}

impl Area {
    /// Area id of a closed way; `None` when the id is out of range
    pub fn id_from_way(way_id: i64) -> Option<i64> {
        way_id.checked_mul(2)
    }

    /// Area id of a relation; `None` when the id is out of range
    pub fn id_from_relation(relation_id: i64) -> Option<i64> {
        relation_id.checked_mul(2)?.checked_add(1)
    }

    pub fn from_way(&self) -> bool {
        self.id & 1 == 0
    }

    /// Id of the way or relation this area was built from
    pub fn orig_id(&self) -> i64 {
        // Arithmetic shift keeps negative ids intact
        self.id >> 1
    }

    pub fn num_rings(&self) -> (usize, usize) {
        let inner = self.rings.iter().map(|r| r.inners.len()).sum();
        (self.rings.len(), inner)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Changeset {
    pub id: i64,
    pub created_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub num_changes: u32,
    pub num_comments: u32,
    pub uid: Option<i64>,
    pub user: Option<String>,
    /// Bottom-left and top-right corners
    pub bbox: Option<(Location, Location)>,
    pub tags: Tags,
}

impl Changeset {
    pub fn is_open(&self) -> bool {
        self.closed_at.is_none()
    }
}

/// One record of a stream
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Element {
    Node(Node),
    Way(Way),
    Relation(Relation),
    Area(Area),
    Changeset(Changeset),
}

impl Element {
    pub fn kind(&self) -> EntityKind {
        match self {
            Element::Node(_) => EntityKind::Node,
            Element::Way(_) => EntityKind::Way,
            Element::Relation(_) => EntityKind::Relation,
            Element::Area(_) => EntityKind::Area,
            Element::Changeset(_) => EntityKind::Changeset,
        }
    }

    pub fn id(&self) -> i64 {
        match self {
            Element::Node(n) => n.id,
            Element::Way(w) => w.id,
            Element::Relation(r) => r.id,
            Element::Area(a) => a.id,
            Element::Changeset(c) => c.id,
        }
    }

    pub fn key(&self) -> CompositeKey {
        CompositeKey::new(self.kind(), self.id())
    }

    pub fn tags(&self) -> &Tags {
        match self {
            Element::Node(n) => &n.tags,
            Element::Way(w) => &w.tags,
            Element::Relation(r) => &r.tags,
            Element::Area(a) => &a.tags,
            Element::Changeset(c) => &c.tags,
        }
    }

    pub fn tags_mut(&mut self) -> &mut Tags {
        match self {
            Element::Node(n) => &mut n.tags,
            Element::Way(w) => &mut w.tags,
            Element::Relation(r) => &mut r.tags,
            Element::Area(a) => &mut a.tags,
            Element::Changeset(c) => &mut c.tags,
        }
    }

    /// Object metadata; changesets have none
    pub fn meta(&self) -> Option<&Meta> {
        match self {
            Element::Node(n) => Some(&n.meta),
            Element::Way(w) => Some(&w.meta),
            Element::Relation(r) => Some(&r.meta),
            Element::Area(a) => Some(&a.meta),
            Element::Changeset(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn way(ids: &[i64]) -> Way {
        Way {
            id: 1,
            meta: Meta::default(),
            nodes: ids.iter().copied().map(WayNode::new).collect(),
            tags: Tags::new(),
        }
    }

    #[test]
    fn test_way_closed() {
        assert!(way(&[1, 2, 3, 1]).is_closed());
        assert!(!way(&[1, 2, 1]).is_closed());
        assert!(!way(&[1, 2, 3, 4]).is_closed());
        assert!(!way(&[]).is_closed());
    }

    #[test]
    fn test_area_id_convention() {
        let mut area = Area {
            id: Area::id_from_way(17).unwrap(),
            meta: Meta::default(),
            rings: Vec::new(),
            tags: Tags::new(),
        };
        assert!(area.from_way());
        assert_eq!(area.orig_id(), 17);

        area.id = Area::id_from_relation(5).unwrap();
        assert!(!area.from_way());
        assert_eq!(area.orig_id(), 5);

        area.id = Area::id_from_relation(-3).unwrap();
        assert_eq!(area.orig_id(), -3);
    }

    #[test]
    fn test_area_id_out_of_range() {
        assert_eq!(Area::id_from_way(i64::MAX / 2 + 1), None);
        assert_eq!(Area::id_from_relation(i64::MAX / 2 + 1), None);
        assert_eq!(Area::id_from_way(i64::MIN), None);
        assert_eq!(Area::id_from_way(i64::MAX / 2), Some(i64::MAX - 1));
    }

    #[test]
    fn test_tags_lookup() {
        let tags: Tags = [("highway", "residential"), ("name", "Main")]
            .into_iter()
            .collect();
        assert_eq!(tags.get("name"), Some("Main"));
        assert!(!tags.contains_key("oneway"));
        assert_eq!(tags.len(), 2);
    }

    #[test]
    fn test_element_serializes_with_type_tag() {
        let element = Element::Node(Node {
            id: 3,
            meta: Meta::default(),
            location: Location::from_degrees(1.0, 2.0),
            tags: Tags::new(),
        });
        let json = serde_json::to_value(&element).unwrap();
        assert_eq!(json["type"], "node");
        assert_eq!(json["id"], 3);
        assert_eq!(element.key(), CompositeKey::new(EntityKind::Node, 3));
    }
}
