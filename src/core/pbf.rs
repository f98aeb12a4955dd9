//! OSM PBF reader built on `osmpbf`
//!
//! Blobs are decoded one at a time; the elements of each primitive block are
//! converted into owned records and queued until the consumer pulls them.

use std::collections::VecDeque;
use std::io::Read;

use butterfly_common::{
    Element, EntityKind, EntityMask, Error, Location, Member, Meta, Node, Relation, Result, Tags,
    Way, WayNode,
};
use chrono::DateTime;
use osmpbf::{BlobDecode, BlobReader, PrimitiveBlock, RelMemberType};

use crate::core::source::{BoundingBox, FileFormat, Header, RecordReader};

pub struct PbfReader<R: Read + Send> {
    blobs: BlobReader<R>,
    mask: EntityMask,
    header: Header,
    pending: VecDeque<Element>,
    blocks_read: u64,
    finished: bool,
}

impl<R: Read + Send> PbfReader<R> {
    /// Wrap a byte stream and read its header blob
    pub fn new(reader: R, mask: EntityMask) -> Result<Self> {
        let mut blobs = BlobReader::new(reader);
        let mut pending = VecDeque::new();
        let mut header = Header::empty(FileFormat::Pbf);

        // The header blob comes first in well-formed files; tolerate files
        // that start with data right away.
        if let Some(blob) = blobs.next() {
            let blob = blob.map_err(decode_error)?;
            match blob.decode().map_err(decode_error)? {
                BlobDecode::OsmHeader(block) => {
                    header.bbox = block.bbox().map(|b| BoundingBox {
                        bottom_left: Location::from_degrees(b.left, b.bottom),
                        top_right: Location::from_degrees(b.right, b.top),
                    });
                    header.required_features = block.required_features().to_vec();
                    header.optional_features = block.optional_features().to_vec();
                }
                BlobDecode::OsmData(block) => convert_block(&block, mask, &mut pending),
                BlobDecode::Unknown(kind) => log::warn!("Skipping unknown blob type '{kind}'"),
            }
        }

        Ok(PbfReader {
            blobs,
            mask,
            header,
            pending,
            blocks_read: 0,
            finished: false,
        })
    }

    fn wants_objects(&self) -> bool {
        !(self.mask & EntityMask::OBJECT).is_empty()
    }

    fn fill(&mut self) -> Result<bool> {
        while self.pending.is_empty() {
            let Some(blob) = self.blobs.next() else {
                log::debug!("PBF reader finished after {} data blocks", self.blocks_read);
                return Ok(false);
            };
            let blob = blob.map_err(decode_error)?;
            if !self.wants_objects() {
                // Areas and changesets never live in PBF data blocks
                continue;
            }
            match blob.decode().map_err(decode_error)? {
                BlobDecode::OsmData(block) => {
                    self.blocks_read += 1;
                    convert_block(&block, self.mask, &mut self.pending);
                }
                BlobDecode::OsmHeader(_) => log::warn!("Ignoring repeated header blob"),
                BlobDecode::Unknown(kind) => log::warn!("Skipping unknown blob type '{kind}'"),
            }
        }
        Ok(true)
    }
}

impl<R: Read + Send> Iterator for PbfReader<R> {
    type Item = Result<Element>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.fill() {
            Ok(true) => self.pending.pop_front().map(Ok),
            Ok(false) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

impl<R: Read + Send> RecordReader for PbfReader<R> {
    fn header(&self) -> &Header {
        &self.header
    }
}

fn decode_error(err: osmpbf::Error) -> Error {
    Error::Decode(err.to_string())
}

fn convert_block(block: &PrimitiveBlock, mask: EntityMask, out: &mut VecDeque<Element>) {
    let nodes = mask.contains(EntityKind::Node);
    let ways = mask.contains(EntityKind::Way);
    let relations = mask.contains(EntityKind::Relation);

    for element in block.elements() {
        match element {
            osmpbf::Element::Node(node) if nodes => {
                out.push_back(Element::Node(Node {
                    id: node.id(),
                    meta: convert_info(node.info()),
                    location: Location::from_fixed(node.decimicro_lon(), node.decimicro_lat()),
                    tags: node.tags().collect(),
                }));
            }
            osmpbf::Element::DenseNode(node) if nodes => {
                let meta = match node.info() {
                    Some(info) => Meta {
                        version: Some(info.version() as u32),
                        changeset: Some(info.changeset()),
                        timestamp: DateTime::from_timestamp_millis(info.milli_timestamp()),
                        uid: Some(i64::from(info.uid())),
                        user: info.user().ok().map(str::to_string),
                        visible: !info.deleted(),
                    },
                    None => Meta::default(),
                };
                out.push_back(Element::Node(Node {
                    id: node.id(),
                    meta,
                    location: Location::from_fixed(node.decimicro_lon(), node.decimicro_lat()),
                    tags: node.tags().collect(),
                }));
            }
            osmpbf::Element::Way(way) if ways => {
                out.push_back(Element::Way(Way {
                    id: way.id(),
                    meta: convert_info(way.info()),
                    nodes: way.refs().map(WayNode::new).collect(),
                    tags: way.tags().collect(),
                }));
            }
            osmpbf::Element::Relation(relation) if relations => {
                let members = relation
                    .members()
                    .map(|member| Member {
                        kind: match member.member_type {
                            RelMemberType::Node => EntityKind::Node,
                            RelMemberType::Way => EntityKind::Way,
                            RelMemberType::Relation => EntityKind::Relation,
                        },
                        id: member.member_id,
                        role: member.role().unwrap_or("").to_string(),
                    })
                    .collect();
                out.push_back(Element::Relation(Relation {
                    id: relation.id(),
                    meta: convert_info(relation.info()),
                    members,
                    tags: relation.tags().collect::<Tags>(),
                }));
            }
            _ => {}
        }
    }
}

fn convert_info(info: osmpbf::Info<'_>) -> Meta {
    Meta {
        version: info.version().map(|v| v as u32),
        changeset: info.changeset(),
        timestamp: info.milli_timestamp().and_then(DateTime::from_timestamp_millis),
        uid: info.uid().map(i64::from),
        user: info.user().and_then(|u| u.ok()).map(str::to_string),
        visible: info.visible(),
    }
}
