use std::collections::HashSet;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

use indexmap::IndexSet;
use log::{debug, info};
use thiserror::Error;

use crate::data::model::{CoreMetadata, DimensionOrder, PixelType};
use crate::data::ome::{parse_ome_xml, OmeDocument, OmeParseError, Pixels};
use crate::data::partition::SeriesFileSource;

/// All the ways opening or querying an image can fail.
#[derive(Debug, Error)]
pub enum ReaderError {
    #[error("{0}: unsupported file format")]
    UnsupportedFormat(PathBuf),
    #[error("failed to read {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: OmeParseError,
    },
    #[error("inconsistent image metadata: {0}")]
    Metadata(String),
    #[error("series {series} does not exist, the file has {count} series")]
    SeriesOutOfRange { series: usize, count: usize },
}

// ---------------------------------------------------------------------------
// ImageReader – per-series queries with the series passed explicitly
// ---------------------------------------------------------------------------

/// A metadata view over an opened image file.
pub trait ImageReader: SeriesFileSource<Error = ReaderError> {
    /// Human-readable name of the file format.
    fn format(&self) -> &str;

    fn series_count(&self) -> usize;

    /// Number of plates described by the file; zero for plain images.
    fn plate_count(&self) -> usize;

    fn core_metadata(&self, series: usize) -> Result<&CoreMetadata, ReaderError>;

    /// Display name of the series, empty when the file does not name it.
    fn image_name(&self, series: usize) -> Result<&str, ReaderError>;
}

// ---------------------------------------------------------------------------
// OME-XML companion reader
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct SeriesEntry {
    name: String,
    core: CoreMetadata,
    /// Referenced TIFF files, resolved and de-duplicated, in document order.
    files: IndexSet<String>,
}

/// Reads the metadata of an OME-XML document, typically a `.companion.ome`
/// describing a plate whose planes live in separate TIFF files.
#[derive(Debug)]
pub struct OmeXmlReader {
    plate_count: usize,
    series: Vec<SeriesEntry>,
}

impl OmeXmlReader {
    pub fn open(path: &Path) -> Result<Self, ReaderError> {
        let handle = File::open(path).map_err(|source| ReaderError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let document =
            parse_ome_xml(BufReader::new(handle)).map_err(|source| match source {
                OmeParseError::NotOme(_) | OmeParseError::Empty => {
                    ReaderError::UnsupportedFormat(path.to_path_buf())
                }
                source => ReaderError::Parse {
                    path: path.to_path_buf(),
                    source,
                },
            })?;
        Self::from_document(path, document)
    }

    /// Build the per-series view of an already parsed document. `path` is the
    /// location of the document; TIFF file names are resolved against its
    /// directory.
    pub fn from_document(path: &Path, document: OmeDocument) -> Result<Self, ReaderError> {
        check_image_refs(&document)?;

        let base = path.parent().unwrap_or_else(|| Path::new(""));
        let companion = path.to_string_lossy().into_owned();

        let mut series = Vec::with_capacity(document.images.len());
        for (index, image) in document.images.into_iter().enumerate() {
            let pixels = image.pixels.ok_or_else(|| {
                ReaderError::Metadata(format!("image {index} has no Pixels element"))
            })?;
            let core = core_metadata_from(&pixels, index)?;

            let mut files = IndexSet::new();
            files.insert(companion.clone());
            for tiff in &pixels.tiff_data {
                if let Some(file_name) = &tiff.file_name {
                    files.insert(base.join(file_name).to_string_lossy().into_owned());
                }
            }
            debug!(
                "Series {index}: {}x{}x{}x{}x{} {} in {} file(s)",
                core.size_x,
                core.size_y,
                core.size_z,
                core.size_c,
                core.size_t,
                core.pixel_type,
                files.len()
            );
            series.push(SeriesEntry {
                name: image.name.unwrap_or_default(),
                core,
                files,
            });
        }

        info!(
            "Opened {} with {} series and {} plate(s)",
            path.display(),
            series.len(),
            document.plates.len()
        );
        Ok(Self {
            plate_count: document.plates.len(),
            series,
        })
    }

    fn entry(&self, series: usize) -> Result<&SeriesEntry, ReaderError> {
        self.series.get(series).ok_or(ReaderError::SeriesOutOfRange {
            series,
            count: self.series.len(),
        })
    }
}

/// Every well sample must point at an image declared in the same document.
fn check_image_refs(document: &OmeDocument) -> Result<(), ReaderError> {
    let image_ids: HashSet<&str> = document
        .images
        .iter()
        .filter_map(|img| img.id.as_deref())
        .collect();
    for plate in &document.plates {
        for well in &plate.wells {
            for sample in &well.samples {
                if let Some(image_ref) = sample.image_ref.as_deref() {
                    if !image_ids.contains(image_ref) {
                        return Err(ReaderError::Metadata(format!(
                            "well ({}, {}) references unknown image {image_ref}",
                            well.row, well.column
                        )));
                    }
                }
            }
        }
    }
    Ok(())
}

fn core_metadata_from(pixels: &Pixels, index: usize) -> Result<CoreMetadata, ReaderError> {
    let pixel_type: PixelType = pixels
        .pixel_type
        .as_deref()
        .ok_or_else(|| ReaderError::Metadata(format!("image {index} has no pixel type")))?
        .parse()
        .map_err(|e| ReaderError::Metadata(format!("image {index}: {e}")))?;
    let dimension_order: DimensionOrder = pixels
        .dimension_order
        .as_deref()
        .ok_or_else(|| ReaderError::Metadata(format!("image {index} has no dimension order")))?
        .parse()
        .map_err(|e| ReaderError::Metadata(format!("image {index}: {e}")))?;

    let rgb_channel_count = pixels
        .channels
        .first()
        .and_then(|c| c.samples_per_pixel)
        .unwrap_or(1);

    Ok(CoreMetadata {
        size_x: pixels.size_x.unwrap_or(1),
        size_y: pixels.size_y.unwrap_or(1),
        size_z: pixels.size_z.unwrap_or(1),
        size_c: pixels.size_c.unwrap_or(1),
        size_t: pixels.size_t.unwrap_or(1),
        pixel_type,
        bits_per_pixel: pixels.significant_bits.unwrap_or_else(|| pixel_type.bits()),
        rgb_channel_count,
        dimension_order,
        little_endian: !pixels.big_endian.unwrap_or(false),
        interleaved: pixels.interleaved.unwrap_or(false),
        indexed: false,
    })
}

impl SeriesFileSource for OmeXmlReader {
    type Error = ReaderError;

    fn series_used_files(&self, series: usize) -> Result<IndexSet<String>, ReaderError> {
        Ok(self.entry(series)?.files.clone())
    }
}

impl ImageReader for OmeXmlReader {
    fn format(&self) -> &str {
        "OME-XML"
    }

    fn series_count(&self) -> usize {
        self.series.len()
    }

    fn plate_count(&self) -> usize {
        self.plate_count
    }

    fn core_metadata(&self, series: usize) -> Result<&CoreMetadata, ReaderError> {
        Ok(&self.entry(series)?.core)
    }

    fn image_name(&self, series: usize) -> Result<&str, ReaderError> {
        Ok(&self.entry(series)?.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::ome::{Image, Plate, TiffData, Well, WellSample};

    fn image(id: &str, name: &str, files: &[&str]) -> Image {
        Image {
            id: Some(id.to_string()),
            name: Some(name.to_string()),
            pixels: Some(Pixels {
                pixel_type: Some("uint8".into()),
                dimension_order: Some("XYZCT".into()),
                size_x: Some(64),
                size_y: Some(32),
                big_endian: Some(true),
                tiff_data: files
                    .iter()
                    .map(|f| TiffData {
                        file_name: Some(f.to_string()),
                        ..Default::default()
                    })
                    .collect(),
                ..Default::default()
            }),
        }
    }

    #[test]
    fn used_files_start_with_the_companion() {
        let document = OmeDocument {
            plates: vec![],
            images: vec![
                image("Image:0", "A1", &["A1_z1.tif", "A1_z2.tif", "A1_z1.tif"]),
                image("Image:1", "A2", &["A2_z1.tif"]),
            ],
        };
        let reader =
            OmeXmlReader::from_document(Path::new("data/plate.companion.ome"), document).unwrap();
        let files: Vec<String> = reader.series_used_files(0).unwrap().into_iter().collect();
        let expected: Vec<String> = ["data/plate.companion.ome", "data/A1_z1.tif", "data/A1_z2.tif"]
            .iter()
            .map(|p| Path::new(p).to_string_lossy().into_owned())
            .collect();
        assert_eq!(files, expected);
        assert_eq!(reader.image_name(1).unwrap(), "A2");
    }

    #[test]
    fn core_metadata_applies_defaults() {
        let document = OmeDocument {
            plates: vec![],
            images: vec![image("Image:0", "A1", &[])],
        };
        let reader = OmeXmlReader::from_document(Path::new("x.ome.xml"), document).unwrap();
        let core = reader.core_metadata(0).unwrap();
        assert_eq!((core.size_x, core.size_y, core.size_z), (64, 32, 1));
        assert_eq!(core.bits_per_pixel, 8);
        assert_eq!(core.rgb_channel_count, 1);
        assert!(!core.little_endian);
        assert!(!core.interleaved);
        assert!(!core.indexed);
        assert_eq!(reader.format(), "OME-XML");
    }

    #[test]
    fn out_of_range_series_is_an_error() {
        let document = OmeDocument {
            plates: vec![],
            images: vec![image("Image:0", "A1", &[])],
        };
        let reader = OmeXmlReader::from_document(Path::new("x.ome.xml"), document).unwrap();
        assert!(matches!(
            reader.series_used_files(1),
            Err(ReaderError::SeriesOutOfRange { series: 1, count: 1 })
        ));
    }

    #[test]
    fn dangling_image_ref_is_a_metadata_error() {
        let document = OmeDocument {
            plates: vec![Plate {
                wells: vec![Well {
                    samples: vec![WellSample {
                        image_ref: Some("Image:9".into()),
                        ..Default::default()
                    }],
                    ..Default::default()
                }],
                ..Default::default()
            }],
            images: vec![image("Image:0", "A1", &[])],
        };
        let err = OmeXmlReader::from_document(Path::new("x.ome.xml"), document).unwrap_err();
        assert!(matches!(err, ReaderError::Metadata(_)));
    }

    #[test]
    fn missing_pixel_type_is_a_metadata_error() {
        let mut img = image("Image:0", "A1", &[]);
        img.pixels.as_mut().unwrap().pixel_type = None;
        let document = OmeDocument {
            plates: vec![],
            images: vec![img],
        };
        let err = OmeXmlReader::from_document(Path::new("x.ome.xml"), document).unwrap_err();
        assert!(matches!(err, ReaderError::Metadata(_)));
    }
}
