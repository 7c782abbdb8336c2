use std::collections::{BTreeMap, HashMap};
use std::io::{self, Write};

use log::{debug, warn};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Error as XMLError, Writer};
use regex::{Captures, Regex};
use thiserror::Error;
use uuid::Uuid;

use super::model::{DimensionOrder, PixelType};

const OME_NAMESPACE: &str = "http://www.openmicroscopy.org/Schemas/OME/2016-06";
const XSI_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema-instance";
const OME_SCHEMA_LOCATION: &str = "http://www.openmicroscopy.org/Schemas/OME/2016-06 \
     http://www.openmicroscopy.org/Schemas/OME/2016-06/ome.xsd";

#[derive(Debug, Error)]
pub enum CompanionError {
    #[error("The file name pattern has no named group '{0}'")]
    MissingGroup(&'static str),
    #[error("Invalid {group} value '{value}' in {file}")]
    InvalidIndex {
        group: &'static str,
        value: String,
        file: String,
    },
    #[error("Channel {name} has multiple indices: {first} and {second}")]
    ChannelConflict { name: String, first: u32, second: u32 },
    #[error("No file name matched the pattern")]
    NoMatchingFiles,
    #[error("An XML error occurred while writing the companion")]
    XMLError(#[from] XMLError),
    #[error("An IO error occurred while writing the companion")]
    IOError(#[from] io::Error),
}

/// Image properties shared by every file of the plate.
#[derive(Debug, Clone, PartialEq)]
pub struct CompanionSettings {
    pub plate_name: String,
    pub size_x: u32,
    pub size_y: u32,
    pub pixel_type: PixelType,
    pub dimension_order: DimensionOrder,
}

/// One TIFF file and the plane it holds. All indices are zero-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TiffPlane {
    pub file_name: String,
    pub z: u32,
    pub t: u32,
    pub c: u32,
}

/// Wells, fields and planes recovered from a list of file names.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlateLayout {
    /// (row, column) -> field -> planes.
    pub wells: BTreeMap<(u32, u32), BTreeMap<u32, Vec<TiffPlane>>>,
    /// Channel index -> channel name, when the file names carry one.
    pub channels: BTreeMap<u32, Option<String>>,
    pub size_z: u32,
    pub size_t: u32,
}

impl PlateLayout {
    pub fn rows(&self) -> u32 {
        self.wells.keys().map(|(row, _)| row + 1).max().unwrap_or(0)
    }

    pub fn columns(&self) -> u32 {
        self.wells.keys().map(|(_, col)| col + 1).max().unwrap_or(0)
    }

    pub fn size_c(&self) -> u32 {
        self.channels.keys().map(|c| c + 1).max().unwrap_or(1)
    }

    pub fn image_count(&self) -> usize {
        self.wells.values().map(|fields| fields.len()).sum()
    }
}

// ---------------------------------------------------------------------------
// File name parsing
// ---------------------------------------------------------------------------

fn group<'t>(caps: &Captures<'t>, name: &str) -> Option<&'t str> {
    caps.name(name).map(|m| m.as_str()).filter(|s| !s.is_empty())
}

/// Which file name groups count from zero. Groups not flagged here are 1-based.
/// Letter rows always map `A` to 0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexBase {
    /// Rows are written as numbers; letter rows are rejected.
    pub numeric_rows: bool,
    pub row_zero: bool,
    pub col_zero: bool,
    pub field_zero: bool,
    pub c_zero: bool,
    pub z_zero: bool,
    pub t_zero: bool,
}

fn invalid(group: &'static str, value: &str, file: &str) -> CompanionError {
    CompanionError::InvalidIndex {
        group,
        value: value.to_string(),
        file: file.to_string(),
    }
}

/// Parse a number into a zero-based index.
fn parse_index(
    group: &'static str,
    value: &str,
    file: &str,
    zero_based: bool,
) -> Result<u32, CompanionError> {
    let parsed = value.parse::<u32>().ok();
    let index = if zero_based {
        parsed
    } else {
        parsed.and_then(|v| v.checked_sub(1))
    };
    // Extents are stored as index + 1.
    index
        .filter(|&i| i < u32::MAX)
        .ok_or_else(|| invalid(group, value, file))
}

/// Rows are either letters (`A` -> 0, `AA` -> 26) or numbers.
fn row_index(value: &str, file: &str, base: &IndexBase) -> Result<u32, CompanionError> {
    if base.numeric_rows || !value.chars().all(|c| c.is_ascii_alphabetic()) {
        return parse_index("row", value, file, base.row_zero);
    }
    value
        .to_ascii_uppercase()
        .bytes()
        .try_fold(0u32, |acc, b| {
            acc.checked_mul(26)?.checked_add(u32::from(b - b'A' + 1))
        })
        .map(|index| index - 1)
        .ok_or_else(|| invalid("row", value, file))
}

/// Group the matching file names into wells and fields.
///
/// `pattern` must have the named groups `row` and `col`; `field`, `z`, `t`,
/// `channel_index` and `channel_name` are optional. Non-matching lines and
/// blank lines are skipped.
pub fn plan_plate<'a, I>(
    file_names: I,
    pattern: &Regex,
    base: IndexBase,
) -> Result<PlateLayout, CompanionError>
where
    I: IntoIterator<Item = &'a str>,
{
    for required in ["row", "col"] {
        if !pattern.capture_names().flatten().any(|n| n == required) {
            return Err(CompanionError::MissingGroup(required));
        }
    }

    let mut layout = PlateLayout {
        size_z: 1,
        size_t: 1,
        ..Default::default()
    };
    let mut channel_by_name: HashMap<String, u32> = HashMap::new();

    for line in file_names {
        let file = line.trim();
        if file.is_empty() {
            continue;
        }
        let Some(caps) = pattern.captures(file) else {
            warn!("Skipping, no match in line: {file}");
            continue;
        };
        let (Some(row), Some(col)) = (group(&caps, "row"), group(&caps, "col")) else {
            warn!("Skipping, no row or column in line: {file}");
            continue;
        };
        let row = row_index(row, file, &base)?;
        let col = parse_index("col", col, file, base.col_zero)?;
        let optional = |name: &'static str, zero_based: bool| {
            group(&caps, name)
                .map(|v| parse_index(name, v, file, zero_based))
                .transpose()
        };
        let field = optional("field", base.field_zero)?.unwrap_or(0);
        let z = optional("z", base.z_zero)?.unwrap_or(0);
        let t = optional("t", base.t_zero)?.unwrap_or(0);
        let channel_index = optional("channel_index", base.c_zero)?;
        let channel_name = group(&caps, "channel_name");
        let c = match (channel_index, channel_name) {
            (Some(index), name) => {
                if let Some(name) = name {
                    if let Some(&first) = channel_by_name.get(name) {
                        if first != index {
                            return Err(CompanionError::ChannelConflict {
                                name: name.to_string(),
                                first,
                                second: index,
                            });
                        }
                    }
                    channel_by_name.insert(name.to_string(), index);
                }
                layout
                    .channels
                    .entry(index)
                    .or_insert_with(|| name.map(str::to_string));
                index
            }
            (None, Some(name)) => {
                let next = channel_by_name.len() as u32;
                let index = *channel_by_name.entry(name.to_string()).or_insert(next);
                layout.channels.insert(index, Some(name.to_string()));
                index
            }
            (None, None) => 0,
        };

        layout.size_z = layout.size_z.max(z + 1);
        layout.size_t = layout.size_t.max(t + 1);
        layout
            .wells
            .entry((row, col))
            .or_default()
            .entry(field)
            .or_default()
            .push(TiffPlane {
                file_name: file.to_string(),
                z,
                t,
                c,
            });
    }

    if layout.wells.is_empty() {
        return Err(CompanionError::NoMatchingFiles);
    }
    debug!(
        "Planned {} well(s), {} image(s), {} channel(s)",
        layout.wells.len(),
        layout.image_count(),
        layout.size_c()
    );
    Ok(layout)
}

// ---------------------------------------------------------------------------
// OME-XML writing
// ---------------------------------------------------------------------------

struct CompanionWriter<W: Write> {
    handle: Writer<W>,
}

impl<W: Write> CompanionWriter<W> {
    fn start(&mut self, elt: &BytesStart) -> Result<(), CompanionError> {
        self.handle.write_event(Event::Start(elt.borrow()))?;
        Ok(())
    }

    fn end(&mut self, elt: &BytesStart) -> Result<(), CompanionError> {
        self.handle.write_event(Event::End(elt.to_end()))?;
        Ok(())
    }

    fn empty(&mut self, elt: BytesStart) -> Result<(), CompanionError> {
        self.handle.write_event(Event::Empty(elt))?;
        Ok(())
    }

    fn write_plate(
        &mut self,
        layout: &PlateLayout,
        settings: &CompanionSettings,
    ) -> Result<(), CompanionError> {
        let mut plate = BytesStart::new("Plate");
        plate.push_attribute(("ID", "Plate:0"));
        plate.push_attribute(("Name", settings.plate_name.as_str()));
        plate.push_attribute(("Rows", layout.rows().to_string().as_str()));
        plate.push_attribute(("Columns", layout.columns().to_string().as_str()));
        self.start(&plate)?;

        let mut image_index = 0usize;
        for (well_index, ((row, col), fields)) in layout.wells.iter().enumerate() {
            let mut well = BytesStart::new("Well");
            well.push_attribute(("ID", format!("Well:{well_index}").as_str()));
            well.push_attribute(("Row", row.to_string().as_str()));
            well.push_attribute(("Column", col.to_string().as_str()));
            self.start(&well)?;
            for (sample_index, field) in fields.keys().enumerate() {
                let mut sample = BytesStart::new("WellSample");
                sample.push_attribute((
                    "ID",
                    format!("WellSample:{well_index}:{sample_index}").as_str(),
                ));
                sample.push_attribute(("Index", field.to_string().as_str()));
                self.start(&sample)?;
                let mut image_ref = BytesStart::new("ImageRef");
                image_ref.push_attribute(("ID", format!("Image:{image_index}").as_str()));
                self.empty(image_ref)?;
                self.end(&sample)?;
                image_index += 1;
            }
            self.end(&well)?;
        }
        self.end(&plate)
    }

    fn write_images(
        &mut self,
        layout: &PlateLayout,
        settings: &CompanionSettings,
    ) -> Result<(), CompanionError> {
        let size_c = layout.size_c();
        let mut image_index = 0usize;
        for ((row, col), fields) in &layout.wells {
            for (field, planes) in fields {
                let mut image = BytesStart::new("Image");
                image.push_attribute(("ID", format!("Image:{image_index}").as_str()));
                image.push_attribute(("Name", format!("{row}|{col}|{field}").as_str()));
                self.start(&image)?;

                let mut pixels = BytesStart::new("Pixels");
                pixels.push_attribute(("ID", format!("Pixels:{image_index}").as_str()));
                pixels.push_attribute(("DimensionOrder", settings.dimension_order.as_str()));
                pixels.push_attribute(("Type", settings.pixel_type.as_str()));
                pixels.push_attribute(("SizeX", settings.size_x.to_string().as_str()));
                pixels.push_attribute(("SizeY", settings.size_y.to_string().as_str()));
                pixels.push_attribute(("SizeZ", layout.size_z.to_string().as_str()));
                pixels.push_attribute(("SizeC", size_c.to_string().as_str()));
                pixels.push_attribute(("SizeT", layout.size_t.to_string().as_str()));
                pixels.push_attribute(("BigEndian", "false"));
                self.start(&pixels)?;

                for c in 0..size_c {
                    let mut channel = BytesStart::new("Channel");
                    channel.push_attribute(("ID", format!("Channel:{image_index}:{c}").as_str()));
                    channel.push_attribute(("SamplesPerPixel", "1"));
                    if let Some(Some(name)) = layout.channels.get(&c) {
                        channel.push_attribute(("Name", name.as_str()));
                    }
                    self.empty(channel)?;
                }

                for plane in planes {
                    let mut tiff = BytesStart::new("TiffData");
                    tiff.push_attribute(("FirstC", plane.c.to_string().as_str()));
                    tiff.push_attribute(("FirstT", plane.t.to_string().as_str()));
                    tiff.push_attribute(("FirstZ", plane.z.to_string().as_str()));
                    tiff.push_attribute(("IFD", "0"));
                    tiff.push_attribute(("PlaneCount", "1"));
                    self.start(&tiff)?;

                    let mut uuid = BytesStart::new("UUID");
                    uuid.push_attribute(("FileName", plane.file_name.as_str()));
                    self.start(&uuid)?;
                    let urn = format!("urn:uuid:{}", Uuid::new_v4());
                    self.handle.write_event(Event::Text(BytesText::new(&urn)))?;
                    self.end(&uuid)?;

                    self.end(&tiff)?;
                }

                self.end(&pixels)?;
                self.end(&image)?;
                image_index += 1;
            }
        }
        Ok(())
    }
}

/// Write a companion OME-XML document describing `layout`.
pub fn write_companion<W: Write>(
    layout: &PlateLayout,
    settings: &CompanionSettings,
    handle: W,
) -> Result<(), CompanionError> {
    let mut writer = CompanionWriter {
        handle: Writer::new_with_indent(handle, b' ', 2),
    };
    writer
        .handle
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let mut ome = BytesStart::new("OME");
    ome.push_attribute(("xmlns", OME_NAMESPACE));
    ome.push_attribute(("xmlns:xsi", XSI_NAMESPACE));
    ome.push_attribute(("xsi:schemaLocation", OME_SCHEMA_LOCATION));
    ome.push_attribute(("Creator", concat!("show-files ", env!("CARGO_PKG_VERSION"))));
    writer.start(&ome)?;
    writer.write_plate(layout, settings)?;
    writer.write_images(layout, settings)?;
    writer
        .handle
        .write_event(Event::End(BytesEnd::new("OME")))?;
    writer.handle.get_mut().flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::ome::parse_ome_xml;

    const PATTERN: &str = r"(?P<row>[a-zA-Z]+)(?P<col>\d+)_(?P<field>\d+)-z(?P<z>\d+)-t(?P<t>\d+)-ch(?P<channel_index>\d+)-(?P<channel_name>.+)\.";

    fn names() -> Vec<&'static str> {
        vec![
            "B12_2-z1-t1-ch1-DAPI.tiff",
            "B12_2-z1-t1-ch2-GFP.tiff",
            "B12_1-z2-t1-ch1-DAPI.tiff",
            "",
            "thumbs.db",
            "A1_1-z1-t3-ch2-GFP.tiff",
        ]
    }

    fn settings() -> CompanionSettings {
        CompanionSettings {
            plate_name: "screen".into(),
            size_x: 1024,
            size_y: 1024,
            pixel_type: PixelType::UInt16,
            dimension_order: DimensionOrder::XYCZT,
        }
    }

    #[test]
    fn groups_files_by_well_and_field() {
        let pattern = Regex::new(PATTERN).unwrap();
        let layout = plan_plate(names(), &pattern, IndexBase::default()).unwrap();
        assert_eq!(layout.wells.len(), 2);
        assert_eq!(layout.rows(), 2);
        assert_eq!(layout.columns(), 12);
        assert_eq!(layout.size_z, 2);
        assert_eq!(layout.size_t, 3);
        assert_eq!(layout.size_c(), 2);
        assert_eq!(layout.image_count(), 3);
        assert_eq!(layout.channels.get(&1), Some(&Some("GFP".to_string())));

        let b12 = &layout.wells[&(1, 11)];
        assert_eq!(b12[&1].len(), 2);
        assert_eq!(
            b12[&0][0],
            TiffPlane {
                file_name: "B12_1-z2-t1-ch1-DAPI.tiff".into(),
                z: 1,
                t: 0,
                c: 0
            }
        );
    }

    #[test]
    fn numeric_rows_are_one_based() {
        let pattern = Regex::new(r"r(?P<row>\d+)c(?P<col>\d+)\.tif").unwrap();
        let layout = plan_plate(["r3c4.tif"], &pattern, IndexBase::default()).unwrap();
        assert!(layout.wells.contains_key(&(2, 3)));
        assert_eq!(layout.size_c(), 1);
    }

    #[test]
    fn pattern_without_column_is_rejected() {
        let pattern = Regex::new(r"(?P<row>[A-H])").unwrap();
        assert!(matches!(
            plan_plate(["A1.tif"], &pattern, IndexBase::default()),
            Err(CompanionError::MissingGroup("col"))
        ));
    }

    #[test]
    fn conflicting_channel_indices_are_rejected() {
        let pattern =
            Regex::new(r"(?P<row>[A-H])(?P<col>\d+)-ch(?P<channel_index>\d+)-(?P<channel_name>\w+)")
                .unwrap();
        let err = plan_plate(
            ["A1-ch1-DAPI.tif", "A2-ch2-DAPI.tif"],
            &pattern,
            IndexBase::default(),
        ).unwrap_err();
        assert!(matches!(err, CompanionError::ChannelConflict { first: 0, second: 1, .. }));
    }

    #[test]
    fn zero_for_a_one_based_index_is_invalid() {
        let pattern = Regex::new(r"(?P<row>[A-H])(?P<col>\d+)").unwrap();
        assert!(matches!(
            plan_plate(["A0.tif"], &pattern, IndexBase::default()),
            Err(CompanionError::InvalidIndex { group: "col", .. })
        ));
    }

    #[test]
    fn zero_based_columns_and_fields() {
        let pattern = Regex::new(r"(?P<row>[A-H])(?P<col>\d+)_(?P<field>\d+)\.tif").unwrap();
        let base = IndexBase {
            col_zero: true,
            field_zero: true,
            ..Default::default()
        };
        let layout = plan_plate(["A0_0.tif", "A0_1.tif", "B3_0.tif"], &pattern, base).unwrap();
        assert_eq!(layout.wells[&(0, 0)].len(), 2);
        assert!(layout.wells[&(0, 0)].contains_key(&1));
        assert!(layout.wells.contains_key(&(1, 3)));
        assert_eq!(layout.columns(), 4);
    }

    #[test]
    fn zero_based_numeric_rows_and_planes() {
        let pattern = Regex::new(r"r(?P<row>\d+)c(?P<col>\d+)-z(?P<z>\d+)-t(?P<t>\d+)").unwrap();
        let base = IndexBase {
            numeric_rows: true,
            row_zero: true,
            z_zero: true,
            t_zero: true,
            ..Default::default()
        };
        let layout = plan_plate(["r0c1-z0-t2.tif"], &pattern, base).unwrap();
        let plane = &layout.wells[&(0, 0)][&0][0];
        assert_eq!((plane.z, plane.t), (0, 2));
        assert_eq!(layout.size_t, 3);
    }

    #[test]
    fn numeric_rows_reject_letters() {
        let pattern = Regex::new(r"(?P<row>[A-H])(?P<col>\d+)").unwrap();
        let base = IndexBase {
            numeric_rows: true,
            ..Default::default()
        };
        assert!(matches!(
            plan_plate(["B2.tif"], &pattern, base),
            Err(CompanionError::InvalidIndex { group: "row", .. })
        ));
    }

    #[test]
    fn very_long_letter_row_is_invalid() {
        let pattern = Regex::new(r"(?P<row>[a-zA-Z]+)(?P<col>\d+)\.tif").unwrap();
        assert!(matches!(
            plan_plate(["ABCDEFGH1.tif"], &pattern, IndexBase::default()),
            Err(CompanionError::InvalidIndex { group: "row", .. })
        ));
        let layout = plan_plate(["AA1.tif"], &pattern, IndexBase::default()).unwrap();
        assert!(layout.wells.contains_key(&(26, 0)));
    }

    #[test]
    fn nothing_matching_is_an_error() {
        let pattern = Regex::new(r"(?P<row>[A-H])(?P<col>\d+)").unwrap();
        assert!(matches!(
            plan_plate(["notes.txt"], &pattern, IndexBase::default()),
            Err(CompanionError::NoMatchingFiles)
        ));
    }

    #[test]
    fn written_companion_parses_back() {
        let pattern = Regex::new(PATTERN).unwrap();
        let layout = plan_plate(names(), &pattern, IndexBase::default()).unwrap();
        let mut buffer = Vec::new();
        write_companion(&layout, &settings(), &mut buffer).unwrap();

        let doc = parse_ome_xml(buffer.as_slice()).unwrap();
        assert_eq!(doc.plates.len(), 1);
        assert_eq!(doc.plates[0].name.as_deref(), Some("screen"));
        assert_eq!(doc.plates[0].wells.len(), 2);
        assert_eq!(doc.images.len(), 3);

        // A1 sorts before B12, so image 0 is well (0, 0).
        assert_eq!(doc.images[0].name.as_deref(), Some("0|0|0"));
        let pixels = doc.images[2].pixels.as_ref().unwrap();
        assert_eq!(pixels.size_c, Some(2));
        assert_eq!(pixels.pixel_type.as_deref(), Some("uint16"));
        let files: Vec<_> = pixels
            .tiff_data
            .iter()
            .filter_map(|t| t.file_name.as_deref())
            .collect();
        assert_eq!(files, ["B12_2-z1-t1-ch1-DAPI.tiff", "B12_2-z1-t1-ch2-GFP.tiff"]);
        assert!(pixels.tiff_data[0]
            .uuid
            .as_deref()
            .is_some_and(|u| u.starts_with("urn:uuid:")));
    }
}
