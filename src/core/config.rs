//! Processor configuration files
//!
//! ```toml
//! entities = "node,way,relation"
//! locations = "sparse_mem_array"
//! areas = true
//!
//! [filters]
//! keys = ["building"]
//! tags = ["amenity=cafe"]
//! ```

use std::fs;
use std::path::Path;

use butterfly_common::{EntityMask, Error, Result};
use serde::{Deserialize, Serialize};

use crate::core::filter::{KeyFilter, TagFilter};
use crate::core::processor::StreamProcessor;
use crate::core::source::Input;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StreamConfig {
    /// Entity types read from the file
    pub entities: EntityMask,
    /// Location index strategy; no cache when absent
    pub locations: Option<String>,
    /// Emit areas (implies a location cache)
    pub areas: bool,
    pub filters: FilterConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FilterConfig {
    /// Keep records carrying any of these keys
    pub keys: Vec<String>,
    /// Keep records carrying any of these `key=value` pairs
    pub tags: Vec<String>,
}

impl StreamConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let config: StreamConfig = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        log::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        for tag in &self.filters.tags {
            parse_tag(tag)?;
        }
        Ok(())
    }

    /// Parsed `key=value` tag filters
    pub fn tag_pairs(&self) -> Result<Vec<(String, String)>> {
        self.filters.tags.iter().map(|t| parse_tag(t)).collect()
    }
}

/// Split a `key=value` filter expression
pub fn parse_tag(expr: &str) -> Result<(String, String)> {
    match expr.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(Error::Config(format!(
            "invalid tag filter '{expr}', expected key=value"
        ))),
    }
}

impl StreamProcessor {
    /// Open `input` and apply every setting of `config`
    pub fn from_config<I>(input: I, config: &StreamConfig) -> Result<Self>
    where
        I: TryInto<Input>,
        Error: From<I::Error>,
    {
        let mut processor = StreamProcessor::open_with(input, config.entities)?;
        if let Some(name) = &config.locations {
            processor = processor.with_locations(name.as_str())?;
        }
        if config.areas {
            processor = processor.with_areas()?;
        }
        if !config.filters.keys.is_empty() {
            processor = processor.with_filter(KeyFilter::new(config.filters.keys.iter().cloned()));
        }
        let tags = config.tag_pairs()?;
        if !tags.is_empty() {
            processor = processor.with_filter(TagFilter::new(tags));
        }
        Ok(processor)
    }
}
