//! UPK CLI - Command-line tool for Unreal package containers
//!
//! This binary provides command-line interfaces for:
//! - info: header and table summary of a package
//! - ls: list exports of one or more packages
//! - props: dump the decoded properties of one export
//! - decompress: expand a compressed package

use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::error::Error;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{info, Level};
use upk_io::decompress::{decompress_stream, detect_archive, ArchiveKind};
use upk_io::{
    decompress_if_needed, open_many, open_with, ByteStream, Layout, Limits, OpenOptions, Package,
    PackageObject, ParallelConfig, Property, PropertyValue, Warning,
};

#[derive(Parser)]
#[command(name = "upk")]
#[command(about = "Unreal package decoder")]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Decompress in memory instead of writing a `.decompressed` cache file
    #[arg(long, global = true)]
    no_cache: bool,

    /// Maximum nesting depth of property values
    #[arg(long, global = true)]
    max_depth: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the package header and table sizes
    Info {
        /// Input package
        input: PathBuf,
        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },
    /// List exports as qualified names
    Ls {
        /// Input packages
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
        /// Worker threads when listing several packages
        #[arg(long)]
        threads: Option<usize>,
        /// Show a progress spinner
        #[arg(long)]
        progress: bool,
    },
    /// Print the properties of one export
    Props {
        /// Input package
        input: PathBuf,
        /// Qualified name (`Outer\Name.Type`) or path of the export
        object: String,
        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },
    /// Expand a compressed package
    Decompress {
        /// Input package
        input: PathBuf,
        /// Output path (defaults to the cache file next to the input)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut opts = OpenOptions {
        use_cache: !cli.no_cache,
        ..OpenOptions::default()
    };
    if let Some(depth) = cli.max_depth {
        opts.limits.max_nesting_depth = depth;
    }

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());

    match cli.command {
        Commands::Info { input, format } => handle_info(&mut out, &input, format, &opts)?,
        Commands::Ls {
            inputs,
            format,
            threads,
            progress,
        } => handle_ls(&mut out, &inputs, format, threads, progress, &opts)?,
        Commands::Props {
            input,
            object,
            format,
        } => handle_props(&mut out, &input, &object, format, &opts)?,
        Commands::Decompress { input, output } => {
            handle_decompress(&mut out, &input, output, &opts.limits)?
        }
    }

    out.flush()?;
    Ok(())
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

#[derive(Debug, Clone, Serialize)]
struct InfoSummary {
    path: String,
    layout: Layout,
    version: u16,
    licensee: u16,
    folder: Option<String>,
    package_flags: u32,
    compressed_chunks: usize,
    names: usize,
    imports: usize,
    exports: usize,
    warnings: Vec<Warning>,
}

impl InfoSummary {
    fn new(path: &Path, package: &Package) -> Self {
        let header = package.header();
        let tables = package.tables();
        Self {
            path: path.display().to_string(),
            layout: header.layout,
            version: header.version,
            licensee: header.licensee,
            folder: header.folder_name.clone(),
            package_flags: header.package_flags,
            compressed_chunks: header.chunks.len(),
            names: tables.names.len(),
            imports: tables.imports.len(),
            exports: tables.exports.len(),
            warnings: package.warnings().to_vec(),
        }
    }
}

fn handle_info(
    writer: &mut dyn Write,
    input: &Path,
    format: OutputFormat,
    opts: &OpenOptions,
) -> Result<(), Box<dyn Error>> {
    let opts = OpenOptions {
        decode_properties: false,
        ..opts.clone()
    };
    let package = open_with(input, &opts)?;
    let summary = InfoSummary::new(input, &package);

    match format {
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut *writer, &summary)?;
            writeln!(writer)?;
        }
        OutputFormat::Table => {
            writeln!(writer, "Path\t{}", summary.path)?;
            writeln!(writer, "Layout\t{:?}", summary.layout)?;
            writeln!(writer, "Version\t{}/{}", summary.version, summary.licensee)?;
            if let Some(folder) = &summary.folder {
                writeln!(writer, "Folder\t{}", folder)?;
            }
            writeln!(writer, "Flags\t{:#010x}", summary.package_flags)?;
            writeln!(writer, "Chunks\t{}", summary.compressed_chunks)?;
            writeln!(writer, "Names\t{}", summary.names)?;
            writeln!(writer, "Imports\t{}", summary.imports)?;
            writeln!(writer, "Exports\t{}", summary.exports)?;
            print_warnings(writer, &summary.warnings)?;
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
struct ObjectSummary {
    name: String,
    type_name: String,
    serial_offset: u64,
    serial_size: u64,
    properties: usize,
}

impl From<&PackageObject> for ObjectSummary {
    fn from(object: &PackageObject) -> Self {
        Self {
            name: object.qualified_name(),
            type_name: object.type_name.clone(),
            serial_offset: object.serial_offset,
            serial_size: object.serial_size,
            properties: object.properties.len(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct ListEntry {
    path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    objects: Vec<ObjectSummary>,
    warnings: Vec<Warning>,
}

fn handle_ls(
    writer: &mut dyn Write,
    inputs: &[PathBuf],
    format: OutputFormat,
    threads: Option<usize>,
    progress: bool,
    opts: &OpenOptions,
) -> Result<(), Box<dyn Error>> {
    let start = Instant::now();
    let spinner = progress.then(|| create_spinner("Decoding packages"));

    let config = ParallelConfig {
        max_threads: threads,
    };
    let items = open_many(inputs, opts, config)?;

    let mut failures = 0usize;
    let entries: Vec<ListEntry> = items
        .into_iter()
        .map(|item| {
            if let Some(pb) = spinner.as_ref() {
                pb.inc(1);
            }
            match item.result {
                Ok(package) => ListEntry {
                    path: item.path.display().to_string(),
                    error: None,
                    objects: package.objects().map(ObjectSummary::from).collect(),
                    warnings: package.warnings().to_vec(),
                },
                Err(e) => {
                    failures += 1;
                    ListEntry {
                        path: item.path.display().to_string(),
                        error: Some(e.to_string()),
                        objects: Vec::new(),
                        warnings: Vec::new(),
                    }
                }
            }
        })
        .collect();

    if let Some(pb) = spinner {
        pb.finish_with_message(format!("Decoded {} packages", entries.len()));
    }
    info!(
        packages = entries.len(),
        failures,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "listing complete"
    );

    match format {
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut *writer, &entries)?;
            writeln!(writer)?;
        }
        OutputFormat::Table => print_ls_table(writer, &entries)?,
    }

    if failures > 0 {
        let first = entries
            .iter()
            .find_map(|entry| entry.error.as_ref().map(|e| (&entry.path, e)));
        if let Some((path, error)) = first {
            return Err(format!("{}: {}", path, error).into());
        }
    }
    Ok(())
}

fn print_ls_table(writer: &mut dyn Write, entries: &[ListEntry]) -> Result<(), Box<dyn Error>> {
    let multiple = entries.len() > 1;
    for entry in entries {
        if multiple {
            writeln!(writer, "{}:", entry.path)?;
        }
        if let Some(error) = &entry.error {
            writeln!(writer, "error\t{}", error)?;
            continue;
        }
        writeln!(writer, "Object\tType\tOffset\tSize\tProperties")?;
        for object in &entry.objects {
            writeln!(
                writer,
                "{}\t{}\t{}\t{}\t{}",
                object.name,
                object.type_name,
                object.serial_offset,
                object.serial_size,
                object.properties
            )?;
        }
        print_warnings(writer, &entry.warnings)?;
    }
    Ok(())
}

fn handle_props(
    writer: &mut dyn Write,
    input: &Path,
    object: &str,
    format: OutputFormat,
    opts: &OpenOptions,
) -> Result<(), Box<dyn Error>> {
    let package = open_with(input, opts)?;
    let found = package
        .object(object)
        .ok_or_else(|| format!("object '{}' not found in {}", object, input.display()))?;

    match format {
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut *writer, found)?;
            writeln!(writer)?;
        }
        OutputFormat::Table => {
            writeln!(writer, "{}", found.qualified_name())?;
            for property in &found.properties {
                print_property(writer, property, 1)?;
            }
            let related: Vec<_> = package
                .warnings()
                .iter()
                .filter(|w| w.object.as_deref() == Some(found.path.as_str()))
                .cloned()
                .collect();
            print_warnings(writer, &related)?;
        }
    }
    Ok(())
}

fn print_property(
    writer: &mut dyn Write,
    property: &Property,
    depth: usize,
) -> Result<(), Box<dyn Error>> {
    let indent = "  ".repeat(depth);
    let label = if property.array_index > 0 {
        format!("{}[{}]", property.name, property.array_index)
    } else {
        property.name.clone()
    };

    match &property.value {
        PropertyValue::Properties(children) => {
            writeln!(writer, "{}{}\tProperties", indent, label)?;
            for child in children {
                print_property(writer, child, depth + 1)?;
            }
        }
        other => writeln!(writer, "{}{}\t{}\t{}", indent, label, other.kind(), render_value(other)?)?,
    }
    Ok(())
}

fn render_value(value: &PropertyValue) -> Result<String, serde_json::Error> {
    Ok(match value {
        PropertyValue::None => "-".to_string(),
        PropertyValue::Byte(v) => v.to_string(),
        PropertyValue::Int(v) => v.to_string(),
        PropertyValue::Bool(v) => v.to_string(),
        PropertyValue::Float(v) => v.to_string(),
        PropertyValue::Object(v) => v.to_string(),
        PropertyValue::Name { value, .. } => value.clone(),
        PropertyValue::Str(v) => format!("{:?}", v),
        other => serde_json::to_value(other)?["value"].to_string(),
    })
}

fn print_warnings(writer: &mut dyn Write, warnings: &[Warning]) -> io::Result<()> {
    for warning in warnings {
        match &warning.object {
            Some(object) => writeln!(writer, "warning\t{}\t{}", object, warning.message)?,
            None => writeln!(writer, "warning\t{}", warning.message)?,
        }
    }
    Ok(())
}

fn handle_decompress(
    writer: &mut dyn Write,
    input: &Path,
    output: Option<PathBuf>,
    limits: &Limits,
) -> Result<(), Box<dyn Error>> {
    let start = Instant::now();
    let target = match output {
        None => decompress_if_needed(input, limits)?,
        Some(output) => {
            let kind = detect_archive(input, limits)?;
            if kind == ArchiveKind::Plain {
                std::fs::copy(input, &output)?;
            } else {
                let mut stream = ByteStream::new(BufReader::new(File::open(input)?))?;
                let mut out = BufWriter::new(File::create(&output)?);
                decompress_stream(&mut stream, kind, &mut out, limits)?;
                out.flush()?;
            }
            output
        }
    };

    info!(
        input = %input.display(),
        output = %target.display(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "decompress complete"
    );
    writeln!(writer, "{}", target.display())?;
    Ok(())
}

fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {pos} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_scalar_values() {
        assert_eq!(render_value(&PropertyValue::Int(-4)).unwrap(), "-4");
        assert_eq!(render_value(&PropertyValue::Bool(true)).unwrap(), "true");
        assert_eq!(
            render_value(&PropertyValue::Str("a b".to_string())).unwrap(),
            "\"a b\""
        );
        assert_eq!(
            render_value(&PropertyValue::Name {
                index: 3,
                value: "Wood".to_string()
            })
            .unwrap(),
            "Wood"
        );
    }

    #[test]
    fn render_nested_values_as_json() {
        let value = PropertyValue::Raw {
            type_name: "Vector".to_string(),
            bytes: vec![0x00, 0xab],
        };
        let rendered: serde_json::Value = serde_json::from_str(&render_value(&value).unwrap()).unwrap();
        assert_eq!(rendered["type_name"], "Vector");
        assert_eq!(rendered["bytes"], "00ab");
    }

    #[test]
    fn print_nested_property_list() {
        let property = Property {
            name: "Diffuse".to_string(),
            array_index: 0,
            value: PropertyValue::Properties(vec![Property {
                name: "Expression".to_string(),
                array_index: 2,
                value: PropertyValue::Object(-3),
            }]),
        };
        let mut out = Vec::new();
        print_property(&mut out, &property, 0).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, "Diffuse\tProperties\n  Expression[2]\tObject\t-3\n");
    }
}
