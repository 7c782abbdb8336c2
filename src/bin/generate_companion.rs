use std::fs::{self, File};
use std::io::{self, BufWriter};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::LevelFilter;
use regex::Regex;

use show_files::data::companion::{plan_plate, write_companion, CompanionSettings, IndexBase};
use show_files::data::model::{DimensionOrder, PixelType};

/// Generate a companion OME-XML file for a plate stored as single TIFFs
#[derive(Parser, Debug)]
#[command(name = "generate_companion", version)]
#[command(after_help = "\
The regex must contain the named groups 'row' and 'col', and may contain
'field', 'z', 't', 'channel_index' and 'channel_name'. For file names like
B12_2-z1-t2-ch1-DAPI.tiff use:
(?P<row>[a-zA-Z]+)(?P<col>\\d+)_(?P<field>\\d+)-z(?P<z>\\d+)-t(?P<t>\\d+)-ch(?P<channel_index>\\d+)-(?P<channel_name>.+)\\.")]
struct Cli {
    /// Name of the plate
    name: String,

    /// File containing the list of image file names, one per line
    file_list: PathBuf,

    /// File containing the regex used to parse the file names
    regex: PathBuf,

    /// Image width in pixels
    size_x: u32,

    /// Image height in pixels
    size_y: u32,

    /// Pixel type, e.g. uint8, uint16, float
    pixel_type: PixelType,

    /// Dimension order of the planes
    #[arg(long, default_value = "XYCZT")]
    order: DimensionOrder,

    /// Output file [default: <name>.companion.ome]
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Rows are numbers (1, 2, ... instead of A, B, ...)
    #[arg(long)]
    row_num: bool,

    /// Numeric rows are zero-based
    #[arg(long)]
    row_zero: bool,

    /// Columns are zero-based
    #[arg(long)]
    col_zero: bool,

    /// Fields are zero-based
    #[arg(long)]
    field_zero: bool,

    /// Channel indices are zero-based
    #[arg(long)]
    c_zero: bool,

    /// Z plane indices are zero-based
    #[arg(long)]
    z_zero: bool,

    /// Timepoint indices are zero-based
    #[arg(long)]
    t_zero: bool,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    quiet: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn index_base(&self) -> IndexBase {
        IndexBase {
            numeric_rows: self.row_num,
            row_zero: self.row_zero,
            col_zero: self.col_zero,
            field_zero: self.field_zero,
            c_zero: self.c_zero,
            z_zero: self.z_zero,
            t_zero: self.t_zero,
        }
    }
}

fn confirmed() -> Result<bool> {
    println!("Is that correct? (y/n)");
    let mut answer = String::new();
    io::stdin()
        .read_line(&mut answer)
        .context("reading confirmation")?;
    Ok(answer.trim().eq_ignore_ascii_case("y"))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    let settings = CompanionSettings {
        plate_name: cli.name.clone(),
        size_x: cli.size_x,
        size_y: cli.size_y,
        pixel_type: cli.pixel_type,
        dimension_order: cli.order,
    };

    let file_list = fs::read_to_string(&cli.file_list)
        .with_context(|| format!("reading file list {}", cli.file_list.display()))?;
    let pattern_text = fs::read_to_string(&cli.regex)
        .with_context(|| format!("reading regex file {}", cli.regex.display()))?;
    let pattern = Regex::new(pattern_text.trim()).context("compiling file name regex")?;

    let layout = plan_plate(file_list.lines(), &pattern, cli.index_base())?;
    println!("Summary:");
    println!("  X: {}", settings.size_x);
    println!("  Y: {}", settings.size_y);
    println!("  Channels: {}", layout.size_c());
    println!("  Z planes: {}", layout.size_z);
    println!("  Timepoints: {}", layout.size_t);
    println!("  Pixel type: {}", settings.pixel_type);
    println!("  Dimension order: {}", settings.dimension_order);
    println!("  Rows: {}", layout.rows());
    println!("  Columns: {}", layout.columns());
    println!("  Images: {}", layout.image_count());

    if !cli.quiet && !confirmed()? {
        println!("Nothing written");
        return Ok(());
    }

    let output = cli
        .output
        .unwrap_or_else(|| PathBuf::from(format!("{}.companion.ome", settings.plate_name)));
    let handle = File::create(&output)
        .with_context(|| format!("creating {}", output.display()))?;
    write_companion(&layout, &settings, BufWriter::new(handle))
        .with_context(|| format!("writing {}", output.display()))?;

    println!("Wrote OME-XML to {}", output.display());
    Ok(())
}
