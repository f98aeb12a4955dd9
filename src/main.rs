//! # Butterfly-stream CLI
//!
//! Command-line interface for the butterfly-stream library.
//! Prints, counts and compares the records of OSM PBF and OPL files.

use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use butterfly_stream::core::config::parse_tag;
use butterfly_stream::core::opl::to_opl;
use butterfly_stream::{zip_processors, EntityMask, FileFormat, StreamConfig, StreamProcessor};
use clap::{Parser, Subcommand};

mod cli;

use cli::{classify, KindCounts, OutputFormat};

/// Command-line interface for butterfly-stream
#[derive(Parser)]
#[command(name = "butterfly-stream")]
#[command(about = "Stream, filter and compare OpenStreetMap records")]
#[command(long_about = "Reads OSM PBF and OPL files record by record:
  butterfly-stream cat monaco.osm.pbf --types node --tag amenity=bench
  butterfly-stream cat monaco.osm.pbf --areas --key building --json
  butterfly-stream count monaco.osm.pbf --areas
  butterfly-stream header monaco.osm.pbf
  butterfly-stream diff old.osm.pbf new.osm.pbf

Settings can also come from a TOML file given with --config;
command-line flags take precedence over the file.")]
#[command(version = env!("BUTTERFLY_VERSION"))]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// TOML file with processor settings
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print records, one per line
    Cat {
        /// Input file (.osm.pbf, .pbf or .opl)
        file: PathBuf,

        /// Entity types to read, e.g. "node,way"
        #[arg(long, value_name = "TYPES")]
        types: Option<EntityMask>,

        /// Cache node locations using this index strategy
        #[arg(long, value_name = "INDEX")]
        locations: Option<String>,

        /// Also emit areas assembled from closed ways and multipolygons
        #[arg(long)]
        areas: bool,

        /// Print JSON objects instead of OPL
        #[arg(long)]
        json: bool,

        /// Keep only records with this tag key (repeatable)
        #[arg(long = "key", value_name = "KEY")]
        keys: Vec<String>,

        /// Keep only records with this key=value tag (repeatable)
        #[arg(long = "tag", value_name = "KEY=VALUE")]
        tags: Vec<String>,
    },

    /// Count records per type
    Count {
        file: PathBuf,

        /// Include assembled areas
        #[arg(long)]
        areas: bool,
    },

    /// Show the file header
    Header { file: PathBuf },

    /// Compare sorted files and print the records that differ
    Diff {
        /// Two or more files; the first one is the reference
        #[arg(required = true, num_args = 2..)]
        files: Vec<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging to stderr
    let default_level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .target(env_logger::Target::Stderr)
        .init();

    if let Err(e) = run(cli) {
        eprintln!("❌ Error: {e:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    if cli.verbose {
        eprintln!("🦋 Butterfly-stream v{} starting...", env!("BUTTERFLY_VERSION"));
    }

    let mut config = match &cli.config {
        Some(path) => StreamConfig::load(path)
            .with_context(|| format!("Failed to load configuration {}", path.display()))?,
        None => StreamConfig::default(),
    };

    match cli.command {
        Commands::Cat {
            file,
            types,
            locations,
            areas,
            json,
            keys,
            tags,
        } => {
            if let Some(types) = types {
                config.entities = types;
            }
            if locations.is_some() {
                config.locations = locations;
            }
            config.areas |= areas;
            config.filters.keys.extend(keys);
            for tag in tags {
                parse_tag(&tag)?;
                config.filters.tags.push(tag);
            }
            let format = if json {
                OutputFormat::Json
            } else {
                OutputFormat::Opl
            };
            cat(&file, &config, format)
        }
        Commands::Count { file, areas } => {
            config.areas |= areas;
            count(&file, &config)
        }
        Commands::Header { file } => header(&file),
        Commands::Diff { files } => diff(&files),
    }
}

fn open(file: &Path, config: &StreamConfig) -> Result<StreamProcessor> {
    StreamProcessor::from_config(file, config)
        .with_context(|| format!("Failed to open {}", file.display()))
}

fn cat(file: &Path, config: &StreamConfig, format: OutputFormat) -> Result<()> {
    let processor = open(file, config)?;
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    let mut counts = KindCounts::default();
    for record in processor {
        let record = record.with_context(|| format!("Failed to read {}", file.display()))?;
        counts.add(record.kind());
        format.write(&mut out, &record)?;
    }
    out.flush()?;
    log::info!("{} records written", counts.total());
    Ok(())
}

fn count(file: &Path, config: &StreamConfig) -> Result<()> {
    let processor = open(file, config)?;
    let mut counts = KindCounts::default();
    for record in processor {
        let record = record.with_context(|| format!("Failed to read {}", file.display()))?;
        counts.add(record.kind());
    }
    println!("{counts}");
    Ok(())
}

fn header(file: &Path) -> Result<()> {
    let processor = StreamProcessor::open_with(file, EntityMask::NOTHING)
        .with_context(|| format!("Failed to open {}", file.display()))?;
    let header = processor.header();
    println!("file: {}", file.display());
    println!("format: {}", header.format);
    match &header.bbox {
        Some(bbox) => println!(
            "bbox: {:.7},{:.7},{:.7},{:.7}",
            bbox.bottom_left.lon(),
            bbox.bottom_left.lat(),
            bbox.top_right.lon(),
            bbox.top_right.lat()
        ),
        None => println!("bbox: none"),
    }
    println!("sorted: {}", if header.is_sorted() { "yes" } else { "no" });
    for feature in &header.required_features {
        println!("required: {feature}");
    }
    for feature in &header.optional_features {
        println!("optional: {feature}");
    }
    Ok(())
}

fn diff(files: &[PathBuf]) -> Result<()> {
    if files.len() < 2 {
        bail!("diff needs at least two files");
    }
    let mut processors = Vec::with_capacity(files.len());
    for file in files {
        let processor = StreamProcessor::open(file.as_path())
            .with_context(|| format!("Failed to open {}", file.display()))?;
        if processor.header().format == FileFormat::Pbf && !processor.header().is_sorted() {
            log::warn!("{} does not declare sorted content", file.display());
        }
        processors.push(processor);
    }

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    let mut differences = 0u64;
    for tuple in zip_processors(processors) {
        let tuple = tuple.context("Failed to read input while comparing")?;
        if let Some((change, element)) = classify(&tuple) {
            differences += 1;
            writeln!(out, "{change} {}", to_opl(element))?;
        }
    }
    out.flush()?;
    log::info!("{differences} records differ");
    Ok(())
}
