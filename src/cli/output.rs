//! Record rendering for the command line

use std::fmt;
use std::io::{self, Write};

use butterfly_stream::core::opl::to_opl;
use butterfly_stream::{Element, EntityKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// One OPL line per record
    Opl,
    /// One JSON object per line
    Json,
}

impl OutputFormat {
    pub fn write<W: Write>(self, out: &mut W, element: &Element) -> io::Result<()> {
        match self {
            OutputFormat::Opl => writeln!(out, "{}", to_opl(element)),
            OutputFormat::Json => {
                serde_json::to_writer(&mut *out, element)?;
                writeln!(out)
            }
        }
    }
}

/// Per-kind record counters
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct KindCounts {
    counts: [u64; 5],
}

impl KindCounts {
    pub fn add(&mut self, kind: EntityKind) {
        self.counts[kind.rank() as usize] += 1;
    }

    pub fn get(&self, kind: EntityKind) -> u64 {
        self.counts[kind.rank() as usize]
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }
}

impl fmt::Display for KindCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for kind in EntityKind::ALL {
            writeln!(f, "{}s: {}", kind.name(), self.get(kind))?;
        }
        write!(f, "total: {}", self.total())
    }
}
