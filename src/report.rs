use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use log::{info, warn};

use crate::config::RunConfig;
use crate::data::loader::open_image;
use crate::data::model::{SeriesFiles, UsedFileRow};
use crate::data::partition::{common_files, partition, PartitionError};
use crate::reader::{ImageReader, ReaderError};

pub const CSV_HEADER: &str = "ImageName,UsedFiles";

// ---------------------------------------------------------------------------
// Full report
// ---------------------------------------------------------------------------

/// Print the metadata report for `config.image_path` to `out` and, for plates,
/// the files used by each series.
pub fn run_report<W: Write>(config: &RunConfig, out: &mut W) -> Result<()> {
    writeln!(out, "Reading image: {}", config.image_path.display())?;
    writeln!(out, "{}", "=".repeat(50))?;

    // Released when it goes out of scope, on every return path.
    let reader = open_image(&config.image_path)?;

    print_image_info(&*reader, out)?;

    if reader.plate_count() > 0 {
        report_used_files(&*reader, config.csv_path.as_deref(), out)?;
    } else if config.csv_path.is_some() {
        info!("Not a plate, no used-files CSV written");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Image information
// ---------------------------------------------------------------------------

/// The `- <Label>: <value>` lines for the first series.
pub fn print_image_info<W: Write>(reader: &dyn ImageReader, out: &mut W) -> Result<()> {
    writeln!(out, "Image Information:")?;
    writeln!(out, "- Format: {}", reader.format())?;

    let series_count = reader.series_count();
    if series_count == 0 {
        warn!("The file contains no series");
        writeln!(out, "- Series count: 0")?;
        return Ok(());
    }

    let core = reader.core_metadata(0)?;
    writeln!(out, "- Dimensions: {}x{}", core.size_x, core.size_y)?;
    writeln!(out, "- Series count: {series_count}")?;
    writeln!(out, "- Pixel type: {}", core.pixel_type)?;
    writeln!(out, "- Bits per pixel: {}", core.bits_per_pixel)?;
    writeln!(out, "- RGB channel count: {}", core.rgb_channel_count)?;
    writeln!(out, "- Dimension order: {}", core.dimension_order)?;
    writeln!(out, "- Little endian: {}", core.little_endian)?;
    writeln!(out, "- Interleaved: {}", core.interleaved)?;
    writeln!(out, "- Indexed: {}", core.indexed)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Used files per series
// ---------------------------------------------------------------------------

/// Print the series-specific files of every series and optionally write them
/// to `csv_path`. With fewer than two series the section is skipped entirely.
pub fn report_used_files<W: Write>(
    reader: &dyn ImageReader,
    csv_path: Option<&Path>,
    out: &mut W,
) -> Result<()> {
    let series_count = reader.series_count();
    let common = match common_files(reader, series_count) {
        Ok(common) => common,
        Err(PartitionError::InsufficientSeries { found }) => {
            warn!("Skipping used files: the plate has {found} series, at least 2 are needed");
            return Ok(());
        }
        Err(e) => return Err(e).context("finding files shared between series"),
    };
    let parts = partition(reader, series_count, &common)?;
    let rows = used_file_rows(reader, &parts)?;

    writeln!(out, "Used Files:")?;
    for part in &parts {
        writeln!(out, "Name: {}", reader.image_name(part.series)?)?;
        for file in &part.files {
            writeln!(out, "  {file}")?;
        }
    }

    if let Some(path) = csv_path {
        let handle = File::create(path)
            .with_context(|| format!("creating CSV file {}", path.display()))?;
        write_used_files_csv(&rows, handle)
            .with_context(|| format!("writing CSV file {}", path.display()))?;
        info!("Wrote {} used-file row(s) to {}", rows.len(), path.display());
    }
    Ok(())
}

/// Pair every series-specific file with the name of its series.
pub fn used_file_rows(
    reader: &dyn ImageReader,
    parts: &[SeriesFiles],
) -> Result<Vec<UsedFileRow>, ReaderError> {
    let mut rows = Vec::new();
    for part in parts {
        let image_name = reader.image_name(part.series)?;
        rows.extend(part.files.iter().map(|file| UsedFileRow {
            image_name: image_name.to_string(),
            used_file: file.clone(),
        }));
    }
    Ok(rows)
}

/// Write the `ImageName,UsedFiles` header and one row per entry, both fields
/// wrapped in double quotes. Embedded quotes are written as-is.
pub fn write_used_files_csv<W: Write>(rows: &[UsedFileRow], writer: W) -> Result<()> {
    let mut writer = BufWriter::new(writer);
    writeln!(writer, "{CSV_HEADER}")?;
    for row in rows {
        writeln!(writer, "\"{}\",\"{}\"", row.image_name, row.used_file)?;
    }
    writer.flush()?;
    Ok(())
}
