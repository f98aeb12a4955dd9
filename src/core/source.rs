//! Input resolution and the record reader contract
//!
//! An [`Input`] names where records come from. Opening it with an
//! [`EntityMask`] yields a forward-only [`RecordReader`]; the same input can
//! be opened any number of times, which is what the two-pass area handling
//! relies on.

use std::fmt;
use std::fs::File;
use std::io::{BufReader, Cursor, Read};
use std::path::{Path, PathBuf};

use bytes::Bytes;
use butterfly_common::{Element, EntityMask, Error, Location, Result};
use serde::Serialize;

use crate::core::opl::OplReader;
use crate::core::pbf::PbfReader;

/// Encodings understood by the bundled readers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    Pbf,
    Opl,
}

impl FileFormat {
    /// Guess the format from a file name
    pub fn detect(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?.to_ascii_lowercase();
        if name.ends_with(".pbf") {
            Some(FileFormat::Pbf)
        } else if name.ends_with(".opl") {
            Some(FileFormat::Opl)
        } else {
            None
        }
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileFormat::Pbf => f.write_str("pbf"),
            FileFormat::Opl => f.write_str("opl"),
        }
    }
}

/// Where records are read from
#[derive(Debug, Clone)]
pub enum Input {
    /// A file on disk, reopened for every reader
    Path { path: PathBuf, format: FileFormat },
    /// Bytes held in memory, shared between readers without copying
    Buffer { data: Bytes, format: FileFormat },
}

impl Input {
    /// Resolve a path, detecting the format from its extension
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let format = FileFormat::detect(path)
            .ok_or_else(|| Error::UnsupportedInput(path.display().to_string()))?;
        Ok(Input::Path {
            path: path.to_path_buf(),
            format,
        })
    }

    pub fn from_buffer(data: impl Into<Bytes>, format: FileFormat) -> Self {
        Input::Buffer {
            data: data.into(),
            format,
        }
    }

    pub fn format(&self) -> FileFormat {
        match self {
            Input::Path { format, .. } | Input::Buffer { format, .. } => *format,
        }
    }

    /// Open a fresh reader restricted to `mask`
    pub fn open(&self, mask: EntityMask) -> Result<Box<dyn RecordReader>> {
        log::debug!("Opening {self} for {mask}");
        match self {
            Input::Path { path, format } => {
                let file = File::open(path)?;
                open_reader(BufReader::new(file), *format, mask)
            }
            Input::Buffer { data, format } => {
                open_reader(Cursor::new(data.clone()), *format, mask)
            }
        }
    }
}

fn open_reader<R>(reader: R, format: FileFormat, mask: EntityMask) -> Result<Box<dyn RecordReader>>
where
    R: Read + Send + 'static,
{
    Ok(match format {
        FileFormat::Pbf => Box::new(PbfReader::new(reader, mask)?),
        FileFormat::Opl => Box::new(OplReader::new(reader, mask)),
    })
}

impl fmt::Display for Input {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Input::Path { path, format } => write!(f, "{} ({format})", path.display()),
            Input::Buffer { data, format } => {
                write!(f, "<buffer of {} bytes> ({format})", data.len())
            }
        }
    }
}

impl TryFrom<&str> for Input {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self> {
        Input::from_path(value)
    }
}

impl TryFrom<String> for Input {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Input::from_path(value)
    }
}

impl TryFrom<&Path> for Input {
    type Error = Error;

    fn try_from(value: &Path) -> Result<Self> {
        Input::from_path(value)
    }
}

impl TryFrom<PathBuf> for Input {
    type Error = Error;

    fn try_from(value: PathBuf) -> Result<Self> {
        Input::from_path(value)
    }
}

impl TryFrom<&PathBuf> for Input {
    type Error = Error;

    fn try_from(value: &PathBuf) -> Result<Self> {
        Input::from_path(value)
    }
}

/// Bounding box stored in a file header
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoundingBox {
    pub bottom_left: Location,
    pub top_right: Location,
}

/// File-level metadata available before any record is read
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Header {
    pub format: FileFormat,
    pub bbox: Option<BoundingBox>,
    pub required_features: Vec<String>,
    pub optional_features: Vec<String>,
}

impl Header {
    pub fn empty(format: FileFormat) -> Self {
        Header {
            format,
            bbox: None,
            required_features: Vec::new(),
            optional_features: Vec::new(),
        }
    }

    /// Whether the file declares its objects sorted by type then id
    pub fn is_sorted(&self) -> bool {
        self.optional_features.iter().any(|f| f == "Sort.Type_then_ID")
    }
}

/// Forward-only stream of records restricted to one entity mask
///
/// Dropping the reader releases the underlying file.
pub trait RecordReader: Iterator<Item = Result<Element>> + Send {
    fn header(&self) -> &Header;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_format() {
        assert_eq!(
            FileFormat::detect(Path::new("monaco-latest.osm.pbf")),
            Some(FileFormat::Pbf)
        );
        assert_eq!(FileFormat::detect(Path::new("data/x.OPL")), Some(FileFormat::Opl));
        assert_eq!(FileFormat::detect(Path::new("notes.txt")), None);
    }

    #[test]
    fn test_unsupported_path_is_rejected() {
        let err = Input::try_from("map.geojson").unwrap_err();
        assert!(matches!(err, Error::UnsupportedInput(_)));
        assert!(err.to_string().contains(".opl"));
    }

    #[test]
    fn test_buffer_input_opens_repeatedly() {
        let input = Input::from_buffer("n1 x1 y2\nw2 Nn1\n", FileFormat::Opl);
        let first: Vec<_> = input.open(EntityMask::ALL).unwrap().collect();
        let second: Vec<_> = input.open(EntityMask::WAY).unwrap().collect();
        assert_eq!(first.len(), 2);
        assert_eq!(second.len(), 1);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let input = Input::from_path("/nonexistent/dir/file.opl").unwrap();
        assert!(matches!(input.open(EntityMask::ALL), Err(Error::Io(_))));
    }

    #[test]
    fn test_sorted_header_flag() {
        let mut header = Header::empty(FileFormat::Pbf);
        assert!(!header.is_sorted());
        header.optional_features.push("Sort.Type_then_ID".to_string());
        assert!(header.is_sorted());
    }
}
