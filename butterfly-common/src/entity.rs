//! Entity kinds, entity masks and the composite ordering key

use std::fmt;
use std::ops::{BitAnd, BitOr};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// The five record types a stream can carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Node,
    Way,
    Relation,
    Area,
    Changeset,
}

impl EntityKind {
    pub const ALL: [EntityKind; 5] = [
        EntityKind::Node,
        EntityKind::Way,
        EntityKind::Relation,
        EntityKind::Area,
        EntityKind::Changeset,
    ];

    /// Position in the fixed type ordering node < way < relation < area < changeset
    pub const fn rank(self) -> u8 {
        match self {
            EntityKind::Node => 0,
            EntityKind::Way => 1,
            EntityKind::Relation => 2,
            EntityKind::Area => 3,
            EntityKind::Changeset => 4,
        }
    }

    /// Single-letter tag used by the OPL format
    pub const fn letter(self) -> char {
        match self {
            EntityKind::Node => 'n',
            EntityKind::Way => 'w',
            EntityKind::Relation => 'r',
            EntityKind::Area => 'a',
            EntityKind::Changeset => 'c',
        }
    }

    pub fn from_letter(c: char) -> Option<Self> {
        match c {
            'n' => Some(EntityKind::Node),
            'w' => Some(EntityKind::Way),
            'r' => Some(EntityKind::Relation),
            'a' => Some(EntityKind::Area),
            'c' => Some(EntityKind::Changeset),
            _ => None,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            EntityKind::Node => "node",
            EntityKind::Way => "way",
            EntityKind::Relation => "relation",
            EntityKind::Area => "area",
            EntityKind::Changeset => "changeset",
        }
    }

    const fn bit(self) -> u8 {
        1 << self.rank()
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Set of entity kinds a reader is allowed to produce
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntityMask(u8);

impl EntityMask {
    pub const NOTHING: EntityMask = EntityMask(0);
    pub const NODE: EntityMask = EntityMask(EntityKind::Node.bit());
    pub const WAY: EntityMask = EntityMask(EntityKind::Way.bit());
    pub const RELATION: EntityMask = EntityMask(EntityKind::Relation.bit());
    pub const AREA: EntityMask = EntityMask(EntityKind::Area.bit());
    pub const CHANGESET: EntityMask = EntityMask(EntityKind::Changeset.bit());
    pub const OBJECT: EntityMask = EntityMask(
        EntityKind::Node.bit() | EntityKind::Way.bit() | EntityKind::Relation.bit(),
    );
    pub const ALL: EntityMask = EntityMask(0b1_1111);

    pub const fn contains(self, kind: EntityKind) -> bool {
        self.0 & kind.bit() != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn kinds(self) -> impl Iterator<Item = EntityKind> {
        EntityKind::ALL.into_iter().filter(move |k| self.contains(*k))
    }
}

impl Default for EntityMask {
    fn default() -> Self {
        EntityMask::ALL
    }
}

impl From<EntityKind> for EntityMask {
    fn from(kind: EntityKind) -> Self {
        EntityMask(kind.bit())
    }
}

impl BitOr for EntityMask {
    type Output = EntityMask;

    fn bitor(self, rhs: Self) -> Self::Output {
        EntityMask(self.0 | rhs.0)
    }
}

impl BitAnd for EntityMask {
    type Output = EntityMask;

    fn bitand(self, rhs: Self) -> Self::Output {
        EntityMask(self.0 & rhs.0)
    }
}

impl fmt::Debug for EntityMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.kinds()).finish()
    }
}

impl fmt::Display for EntityMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.kinds().map(EntityKind::name).collect();
        f.write_str(&names.join(","))
    }
}

/// Parses `"node,way"`, `"all"` or `"nothing"`
impl FromStr for EntityMask {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut mask = EntityMask::NOTHING;
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            mask = mask
                | match part.to_ascii_lowercase().as_str() {
                    "n" | "node" | "nodes" => EntityMask::NODE,
                    "w" | "way" | "ways" => EntityMask::WAY,
                    "r" | "relation" | "relations" => EntityMask::RELATION,
                    "a" | "area" | "areas" => EntityMask::AREA,
                    "c" | "changeset" | "changesets" => EntityMask::CHANGESET,
                    "object" | "objects" => EntityMask::OBJECT,
                    "all" => EntityMask::ALL,
                    "nothing" | "none" => EntityMask::NOTHING,
                    other => {
                        return Err(Error::Config(format!("unknown entity type '{other}'")));
                    }
                };
        }
        Ok(mask)
    }
}

impl Serialize for EntityMask {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for EntityMask {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// `(type-rank, id)` pair used to order and align records across streams
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CompositeKey {
    rank: u8,
    id: i64,
}

impl CompositeKey {
    /// Greater than every key built from a real record
    pub const SENTINEL: CompositeKey = CompositeKey {
        rank: u8::MAX,
        id: i64::MAX,
    };

    pub const fn new(kind: EntityKind, id: i64) -> Self {
        CompositeKey {
            rank: kind.rank(),
            id,
        }
    }

    pub const fn is_sentinel(&self) -> bool {
        self.rank == u8::MAX
    }

    pub fn kind(&self) -> Option<EntityKind> {
        EntityKind::ALL.into_iter().find(|k| k.rank() == self.rank)
    }

    pub const fn id(&self) -> i64 {
        self.id
    }
}

impl fmt::Display for CompositeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind() {
            Some(kind) => write!(f, "{}{}", kind.letter(), self.id),
            None => f.write_str("<end>"),
        }
    }
}
