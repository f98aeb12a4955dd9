//! Stream processor: one lazy record sequence out of a file
//!
//! The processor is configured with a builder-style API and then consumed
//! by iteration. Stage order for every primary record is fixed:
//!
//! 1. location resolution (when a cache is configured),
//! 2. area assembly, second pass (when areas are enabled),
//! 3. the filter chain.
//!
//! Filters run last so the cache and the assembler always see the complete
//! stream; a vetoed record only disappears from the output.

use std::fmt;

use butterfly_common::{Element, EntityKind, EntityMask, Error, Result};

use crate::core::area::{AreaAssembler, MultipolygonAssembler, StagingBuffer};
use crate::core::filter::{Filter, FilterChain};
use crate::core::index::{LocationCache, DEFAULT_INDEX};
use crate::core::locations::NodeLocationsForWays;
use crate::core::source::{Header, Input, RecordReader};

/// How the location cache should be provided
pub enum LocationStorage {
    /// Create a fresh index by strategy name
    Named(String),
    /// Use an existing cache, possibly shared with other processors
    Cache(LocationCache),
    /// Remove any configured cache
    Disabled,
}

impl From<&str> for LocationStorage {
    fn from(name: &str) -> Self {
        LocationStorage::Named(name.to_string())
    }
}

impl From<String> for LocationStorage {
    fn from(name: String) -> Self {
        LocationStorage::Named(name)
    }
}

impl From<LocationCache> for LocationStorage {
    fn from(cache: LocationCache) -> Self {
        LocationStorage::Cache(cache)
    }
}

impl<T: Into<LocationStorage>> From<Option<T>> for LocationStorage {
    fn from(storage: Option<T>) -> Self {
        storage.map_or(LocationStorage::Disabled, Into::into)
    }
}

pub struct StreamProcessor {
    input: Input,
    reader: Box<dyn RecordReader>,
    mask: EntityMask,
    locations: Option<LocationCache>,
    areas: Option<Box<dyn AreaAssembler>>,
    filters: FilterChain,
}

impl StreamProcessor {
    /// Open `input` reading every entity type
    pub fn open<I>(input: I) -> Result<Self>
    where
        I: TryInto<Input>,
        Error: From<I::Error>,
    {
        Self::open_with(input, EntityMask::ALL)
    }

    /// Open `input` restricted to the entity types in `mask`
    pub fn open_with<I>(input: I, mask: EntityMask) -> Result<Self>
    where
        I: TryInto<Input>,
        Error: From<I::Error>,
    {
        let input = input.try_into()?;
        let reader = input.open(mask)?;
        Ok(StreamProcessor {
            input,
            reader,
            mask,
            locations: None,
            areas: None,
            filters: FilterChain::new(),
        })
    }

    /// Header of the underlying file; reads no records
    pub fn header(&self) -> &Header {
        self.reader.header()
    }

    pub fn entities(&self) -> EntityMask {
        self.mask
    }

    /// Location cache in use, for manual lookups
    pub fn node_location_storage(&self) -> Option<&LocationCache> {
        self.locations.as_ref()
    }

    pub fn areas_enabled(&self) -> bool {
        self.areas.is_some()
    }

    pub fn filter_count(&self) -> usize {
        self.filters.len()
    }

    /// Cache node locations so ways get geometries.
    ///
    /// Fails when nodes are not part of the entity mask. The last call wins.
    pub fn with_locations(mut self, storage: impl Into<LocationStorage>) -> Result<Self> {
        if !self.mask.contains(EntityKind::Node) {
            return Err(Error::Precondition(
                "nodes are not read from the file, cannot enable the location cache".to_string(),
            ));
        }
        self.locations = match storage.into() {
            LocationStorage::Named(name) => Some(LocationCache::by_name(&name)?),
            LocationStorage::Cache(cache) => Some(cache),
            LocationStorage::Disabled => None,
        };
        Ok(self)
    }

    /// Also emit areas for closed ways and multipolygon relations.
    ///
    /// Enables the default location cache if none is set. Area handling
    /// reads the input twice. Calling this again has no effect.
    pub fn with_areas(self) -> Result<Self> {
        if self.areas.is_some() {
            return Ok(self);
        }
        self.with_area_assembler(MultipolygonAssembler::new())
    }

    /// Like [`with_areas`](Self::with_areas) with a custom assembler,
    /// replacing any assembler set before
    pub fn with_area_assembler(mut self, assembler: impl AreaAssembler + 'static) -> Result<Self> {
        if self.locations.is_none() {
            self = self.with_locations(DEFAULT_INDEX)?;
        }
        self.areas = Some(Box::new(assembler));
        Ok(self)
    }

    /// Append a filter applied to every record before it is returned
    pub fn with_filter(mut self, filter: impl Filter + 'static) -> Self {
        self.filters.push(filter);
        self
    }
}

impl fmt::Debug for StreamProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamProcessor")
            .field("input", &self.input.to_string())
            .field("mask", &self.mask)
            .field("locations", &self.locations)
            .field("areas", &self.areas.is_some())
            .field("filters", &self.filters)
            .finish()
    }
}

impl IntoIterator for StreamProcessor {
    type Item = Result<Element>;
    type IntoIter = Records;

    fn into_iter(self) -> Records {
        let phase = if self.areas.is_some() {
            Phase::Scanning
        } else {
            Phase::Emitting
        };
        Records {
            input: self.input,
            reader: self.reader,
            locations: self
                .locations
                .map(|cache| NodeLocationsForWays::new(cache).ignore_errors()),
            areas: self.areas,
            filters: self.filters,
            staging: StagingBuffer::default(),
            phase,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Area pass one still has to run
    Scanning,
    /// Reading the primary stream
    Emitting,
    /// Primary stream exhausted, draining the staging buffer
    Flushing,
    Done,
}

/// Iterator over the records of a [`StreamProcessor`]
pub struct Records {
    input: Input,
    reader: Box<dyn RecordReader>,
    locations: Option<NodeLocationsForWays>,
    areas: Option<Box<dyn AreaAssembler>>,
    filters: FilterChain,
    staging: StagingBuffer,
    phase: Phase,
}

impl Records {
    /// Area pass one: feed every relation that passes the filters to the
    /// assembler. The secondary reader is dropped when this returns, also
    /// on error.
    fn scan_relations(&mut self) -> Result<()> {
        let Some(assembler) = self.areas.as_mut() else {
            return Ok(());
        };
        let relations = self.input.open(EntityMask::RELATION)?;
        let mut scanned = 0u64;
        for element in relations {
            let Some(Element::Relation(relation)) = self.filters.apply(element?) else {
                continue;
            };
            assembler.first_pass(&relation);
            scanned += 1;
        }
        log::debug!("Area pass one done: {scanned} relations scanned");
        Ok(())
    }

    fn next_staged(&mut self) -> Option<Element> {
        while let Some(area) = self.staging.pop() {
            if let Some(element) = self.filters.apply(Element::Area(area)) {
                return Some(element);
            }
        }
        None
    }

    fn process(&mut self, mut element: Element) -> Result<Option<Element>> {
        if let Some(stage) = self.locations.as_mut() {
            stage.apply(&mut element)?;
        }
        if let Some(assembler) = self.areas.as_mut() {
            assembler.second_pass(&element, &mut self.staging);
        }
        Ok(self.filters.apply(element))
    }

    fn end_of_input(&mut self) {
        if let Some(assembler) = self.areas.as_mut() {
            assembler.finish(&mut self.staging);
        }
        if let Some(stage) = &self.locations {
            if stage.missing() > 0 {
                log::debug!(
                    "{} way node references had no cached location",
                    stage.missing()
                );
            }
        }
    }

    fn fail(&mut self, err: Error) -> Option<Result<Element>> {
        self.phase = Phase::Done;
        Some(Err(err))
    }
}

impl Iterator for Records {
    type Item = Result<Element>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.phase {
                Phase::Scanning => {
                    if let Err(e) = self.scan_relations() {
                        return self.fail(e);
                    }
                    self.phase = Phase::Emitting;
                }
                Phase::Emitting => {
                    if let Some(area) = self.next_staged() {
                        return Some(Ok(area));
                    }
                    match self.reader.next() {
                        Some(Ok(element)) => match self.process(element) {
                            Ok(Some(element)) => return Some(Ok(element)),
                            Ok(None) => {}
                            Err(e) => return self.fail(e),
                        },
                        Some(Err(e)) => return self.fail(e),
                        None => {
                            self.end_of_input();
                            self.phase = Phase::Flushing;
                        }
                    }
                }
                Phase::Flushing => {
                    if let Some(area) = self.next_staged() {
                        return Some(Ok(area));
                    }
                    self.phase = Phase::Done;
                }
                Phase::Done => return None,
            }
        }
    }
}

impl std::iter::FusedIterator for Records {}
