//! Two-pass area assembly
//!
//! Pass one registers the multipolygon relations and their member ways.
//! Pass two sees every way with resolved node locations: closed ways become
//! areas right away, member ways are retained until their relation is
//! complete and can be turned into rings.

use std::collections::{HashSet, VecDeque};

use butterfly_common::{Area, Element, EntityKind, Relation, Ring, Tags, Way, WayNode};
use geo::{Contains, Coord, LineString, MultiPolygon, Point, Polygon};
use rustc_hash::FxHashMap;

/// Queue of assembled areas waiting to be yielded
#[derive(Debug, Default)]
pub struct StagingBuffer {
    queue: VecDeque<Area>,
}

impl StagingBuffer {
    pub fn push(&mut self, area: Area) {
        self.queue.push_back(area);
    }

    pub fn pop(&mut self) -> Option<Area> {
        self.queue.pop_front()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

/// Contract between the stream processor and a polygon builder
pub trait AreaAssembler: Send {
    /// Pass one: called for every relation that survives the filter chain
    fn first_pass(&mut self, relation: &Relation);

    /// Pass two: called for every primary record after location resolution
    fn second_pass(&mut self, element: &Element, out: &mut StagingBuffer);

    /// End of pass two; emit whatever can still be built
    fn finish(&mut self, out: &mut StagingBuffer);
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AssemblerStats {
    pub relations_registered: usize,
    pub areas_from_ways: usize,
    pub areas_from_relations: usize,
    pub failed_relations: usize,
}

struct PendingRelation {
    relation: Relation,
    missing: usize,
}

/// Builds areas from closed ways and `type=multipolygon`/`type=boundary`
/// relations
#[derive(Default)]
pub struct MultipolygonAssembler {
    relations: FxHashMap<i64, PendingRelation>,
    /// way id -> ids of registered relations still waiting for it
    members: FxHashMap<i64, Vec<i64>>,
    geometries: FxHashMap<i64, Vec<WayNode>>,
    stats: AssemblerStats,
}

impl MultipolygonAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> AssemblerStats {
        self.stats
    }

    fn is_area_relation(relation: &Relation) -> bool {
        matches!(
            relation.tags.get("type"),
            Some("multipolygon") | Some("boundary")
        )
    }

    fn way_area(way: &Way) -> Option<Area> {
        if !way.is_closed() || way.tags.is_empty() || way.tags.get("area") == Some("no") {
            return None;
        }
        if !way.nodes.iter().all(|n| n.location.is_defined()) {
            log::trace!("Closed way {} lacks node locations", way.id);
            return None;
        }
        let Some(id) = Area::id_from_way(way.id) else {
            log::debug!("Way {} has no area id in range", way.id);
            return None;
        };
        Some(Area {
            id,
            meta: way.meta.clone(),
            rings: vec![Ring {
                outer: way.nodes.clone(),
                inners: Vec::new(),
            }],
            tags: way.tags.clone(),
        })
    }

    fn complete(&mut self, relation_id: i64, out: &mut StagingBuffer) {
        let Some(pending) = self.relations.remove(&relation_id) else {
            return;
        };
        match assemble_relation(&pending.relation, &self.geometries) {
            Some(area) => {
                self.stats.areas_from_relations += 1;
                out.push(area);
            }
            None => {
                self.stats.failed_relations += 1;
                log::debug!("Relation {relation_id} does not form valid rings");
            }
        }
        self.release(&pending.relation);
    }

    /// Forget member geometries no other pending relation needs
    fn release(&mut self, relation: &Relation) {
        for way_id in way_member_ids(relation) {
            if let Some(waiting) = self.members.get_mut(&way_id) {
                waiting.retain(|id| *id != relation.id);
                if waiting.is_empty() {
                    self.members.remove(&way_id);
                    self.geometries.remove(&way_id);
                }
            }
        }
    }
}

impl AreaAssembler for MultipolygonAssembler {
    fn first_pass(&mut self, relation: &Relation) {
        if !Self::is_area_relation(relation) || self.relations.contains_key(&relation.id) {
            return;
        }
        let ways = way_member_ids(relation);
        if ways.is_empty() {
            return;
        }
        for way_id in &ways {
            self.members.entry(*way_id).or_default().push(relation.id);
        }
        self.relations.insert(
            relation.id,
            PendingRelation {
                relation: relation.clone(),
                missing: ways.len(),
            },
        );
        self.stats.relations_registered += 1;
    }

    fn second_pass(&mut self, element: &Element, out: &mut StagingBuffer) {
        let Element::Way(way) = element else {
            return;
        };

        if let Some(area) = Self::way_area(way) {
            self.stats.areas_from_ways += 1;
            out.push(area);
        }

        let Some(waiting) = self.members.get(&way.id) else {
            return;
        };
        if self.geometries.contains_key(&way.id) {
            // Duplicate way in the input
            return;
        }
        let waiting = waiting.clone();
        self.geometries.insert(way.id, way.nodes.clone());

        for relation_id in waiting {
            let done = match self.relations.get_mut(&relation_id) {
                Some(pending) => {
                    pending.missing = pending.missing.saturating_sub(1);
                    pending.missing == 0
                }
                None => false,
            };
            if done {
                self.complete(relation_id, out);
            }
        }
    }

    fn finish(&mut self, _out: &mut StagingBuffer) {
        // Relations still pending lack member ways; they yield no area
        let mut incomplete: Vec<(i64, usize)> = self
            .relations
            .iter()
            .map(|(id, pending)| (*id, pending.missing))
            .collect();
        incomplete.sort_unstable();
        for (relation_id, missing) in &incomplete {
            log::debug!("Relation {relation_id} is missing {missing} member ways, skipped");
        }
        self.stats.failed_relations += incomplete.len();
        self.relations.clear();
        self.members.clear();
        self.geometries.clear();
        log::debug!("Area assembly finished: {:?}", self.stats);
    }
}

fn way_member_ids(relation: &Relation) -> Vec<i64> {
    let mut seen = HashSet::new();
    relation
        .members
        .iter()
        .filter(|m| m.kind == EntityKind::Way)
        .map(|m| m.id)
        .filter(|id| seen.insert(*id))
        .collect()
}

fn assemble_relation(
    relation: &Relation,
    geometries: &FxHashMap<i64, Vec<WayNode>>,
) -> Option<Area> {
    let mut outer_segments = Vec::new();
    let mut inner_segments = Vec::new();
    for member in relation.members.iter().filter(|m| m.kind == EntityKind::Way) {
        let Some(nodes) = geometries.get(&member.id) else {
            continue;
        };
        if member.role == "inner" {
            inner_segments.push(nodes.clone());
        } else {
            outer_segments.push(nodes.clone());
        }
    }

    let all_located = outer_segments
        .iter()
        .chain(inner_segments.iter())
        .flatten()
        .all(|n| n.location.is_defined());
    if outer_segments.is_empty() || !all_located {
        return None;
    }

    let outers = build_rings(outer_segments)?;
    let inners = build_rings(inner_segments)?;

    let polygons: Vec<Polygon<f64>> = outers
        .iter()
        .map(|ring| Polygon::new(to_line_string(ring), Vec::new()))
        .collect();
    let mut rings: Vec<Ring> = outers
        .into_iter()
        .map(|outer| Ring {
            outer,
            inners: Vec::new(),
        })
        .collect();

    for inner in inners {
        let probe = inner[0].location;
        let probe = Point::new(probe.lon(), probe.lat());
        match polygons.iter().position(|p| p.contains(&probe)) {
            Some(pos) => rings[pos].inners.push(inner),
            None => log::debug!(
                "Relation {}: inner ring outside of every outer ring",
                relation.id
            ),
        }
    }

    let Some(id) = Area::id_from_relation(relation.id) else {
        log::debug!("Relation {} has no area id in range", relation.id);
        return None;
    };
    let tags: Tags = relation.tags.iter().filter(|(k, _)| *k != "type").collect();
    Some(Area {
        id,
        meta: relation.meta.clone(),
        rings,
        tags,
    })
}

/// Join open segments end to end into closed rings
fn build_rings(segments: Vec<Vec<WayNode>>) -> Option<Vec<Vec<WayNode>>> {
    let mut segments: VecDeque<Vec<WayNode>> =
        segments.into_iter().filter(|s| s.len() >= 2).collect();
    let mut rings = Vec::new();

    while let Some(mut ring) = segments.pop_front() {
        loop {
            let first = ring[0].id;
            let last = ring[ring.len() - 1].id;
            if first == last {
                if ring.len() < 4 {
                    return None;
                }
                break;
            }
            let pos = segments
                .iter()
                .position(|s| s[0].id == last || s[s.len() - 1].id == last)?;
            let mut next = segments.remove(pos)?;
            if next[0].id != last {
                next.reverse();
            }
            ring.extend(next.into_iter().skip(1));
        }
        rings.push(ring);
    }
    Some(rings)
}

fn to_line_string(nodes: &[WayNode]) -> LineString<f64> {
    nodes
        .iter()
        .map(|n| Coord {
            x: n.location.lon(),
            y: n.location.lat(),
        })
        .collect()
}

/// Convert an assembled area into a `geo` multipolygon
pub fn to_multipolygon(area: &Area) -> MultiPolygon<f64> {
    area.rings
        .iter()
        .map(|ring| {
            Polygon::new(
                to_line_string(&ring.outer),
                ring.inners.iter().map(|i| to_line_string(i)).collect(),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use butterfly_common::{Location, Member, Meta};
    use geo::Area as _;

    fn located(id: i64, x: f64, y: f64) -> WayNode {
        WayNode {
            id,
            location: Location::from_degrees(x, y),
        }
    }

    fn way(id: i64, nodes: Vec<WayNode>, tags: &[(&str, &str)]) -> Element {
        Element::Way(Way {
            id,
            meta: Meta::default(),
            nodes,
            tags: tags.iter().copied().collect(),
        })
    }

    fn multipolygon(id: i64, members: &[(i64, &str)]) -> Relation {
        Relation {
            id,
            meta: Meta::default(),
            members: members
                .iter()
                .map(|(way, role)| Member {
                    kind: EntityKind::Way,
                    id: *way,
                    role: role.to_string(),
                })
                .collect(),
            tags: [("type", "multipolygon"), ("landuse", "forest")]
                .into_iter()
                .collect(),
        }
    }

    fn square(ids: [i64; 4], x0: f64, y0: f64, size: f64) -> Vec<WayNode> {
        vec![
            located(ids[0], x0, y0),
            located(ids[1], x0 + size, y0),
            located(ids[2], x0 + size, y0 + size),
            located(ids[3], x0, y0 + size),
            located(ids[0], x0, y0),
        ]
    }

    #[test]
    fn test_closed_way_becomes_area() {
        let mut assembler = MultipolygonAssembler::new();
        let mut out = StagingBuffer::default();
        assembler.second_pass(&way(5, square([1, 2, 3, 4], 0.0, 0.0, 1.0), &[("building", "yes")]), &mut out);
        let area = out.pop().unwrap();
        assert_eq!(area.id, 10);
        assert!(area.from_way());
        assert_eq!(area.num_rings(), (1, 0));
    }

    #[test]
    fn test_untagged_or_area_no_ways_are_skipped() {
        let mut assembler = MultipolygonAssembler::new();
        let mut out = StagingBuffer::default();
        assembler.second_pass(&way(5, square([1, 2, 3, 4], 0.0, 0.0, 1.0), &[]), &mut out);
        assembler.second_pass(
            &way(6, square([1, 2, 3, 4], 0.0, 0.0, 1.0), &[("highway", "pedestrian"), ("area", "no")]),
            &mut out,
        );
        assert!(out.is_empty());
    }

    #[test]
    fn test_relation_from_split_outer_with_hole() {
        let mut assembler = MultipolygonAssembler::new();
        let mut out = StagingBuffer::default();
        assembler.first_pass(&multipolygon(3, &[(10, "outer"), (11, "outer"), (12, "inner")]));

        // Outer square split into two open halves, second one reversed
        let outer = square([1, 2, 3, 4], 0.0, 0.0, 10.0);
        let half_a = outer[0..3].to_vec();
        let mut half_b = outer[2..5].to_vec();
        half_b.reverse();

        assembler.second_pass(&way(10, half_a, &[]), &mut out);
        assembler.second_pass(&way(11, half_b, &[]), &mut out);
        assert!(out.is_empty());
        assembler.second_pass(&way(12, square([5, 6, 7, 8], 2.0, 2.0, 2.0), &[]), &mut out);

        let area = out.pop().expect("relation should be assembled");
        assert_eq!(area.id, 7);
        assert_eq!(area.orig_id(), 3);
        assert_eq!(area.num_rings(), (1, 1));
        assert_eq!(area.tags.get("landuse"), Some("forest"));
        assert!(!area.tags.contains_key("type"));
        assert_eq!(area.rings[0].outer.len(), 5);

        let polygon = to_multipolygon(&area);
        assert!((polygon.unsigned_area() - 96.0).abs() < 1e-6);
        assert_eq!(assembler.stats().areas_from_relations, 1);
    }

    #[test]
    fn test_incomplete_relations_yield_nothing_at_finish() {
        let mut assembler = MultipolygonAssembler::new();
        let mut out = StagingBuffer::default();
        // Relation 3: first island present and closed, second island absent
        assembler.first_pass(&multipolygon(3, &[(10, "outer"), (99, "outer")]));
        assembler.first_pass(&multipolygon(4, &[(20, "outer"), (98, "outer")]));
        assembler.second_pass(&way(10, square([1, 2, 3, 4], 0.0, 0.0, 1.0), &[]), &mut out);
        let mut open = square([5, 6, 7, 8], 5.0, 5.0, 1.0);
        open.pop();
        assembler.second_pass(&way(20, open, &[]), &mut out);
        assert!(out.is_empty());

        assembler.finish(&mut out);
        assert!(out.is_empty());
        assert_eq!(assembler.stats().failed_relations, 2);
        assert_eq!(assembler.stats().areas_from_relations, 0);
    }

    #[test]
    fn test_ids_without_area_id_are_skipped() {
        let mut assembler = MultipolygonAssembler::new();
        let mut out = StagingBuffer::default();
        let huge = i64::MAX / 2 + 1;
        assembler.second_pass(
            &way(huge, square([1, 2, 3, 4], 0.0, 0.0, 1.0), &[("building", "yes")]),
            &mut out,
        );
        assert!(out.is_empty());

        assembler.first_pass(&multipolygon(huge, &[(10, "outer")]));
        assembler.second_pass(&way(10, square([1, 2, 3, 4], 0.0, 0.0, 1.0), &[]), &mut out);
        assert!(out.is_empty());
        assert_eq!(assembler.stats().failed_relations, 1);
    }

    #[test]
    fn test_non_area_relations_ignored() {
        let mut assembler = MultipolygonAssembler::new();
        let mut route = multipolygon(3, &[(10, "")]);
        route.tags = [("type", "route")].into_iter().collect();
        assembler.first_pass(&route);
        assert_eq!(assembler.stats().relations_registered, 0);
    }

    #[test]
    fn test_build_rings_rejects_open_chain() {
        let segs = vec![vec![located(1, 0.0, 0.0), located(2, 1.0, 0.0)]];
        assert!(build_rings(segs).is_none());
        assert_eq!(build_rings(Vec::new()), Some(Vec::new()));
    }
}
