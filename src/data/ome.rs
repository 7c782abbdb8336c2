use std::collections::HashMap;
use std::io::BufRead;
use std::str::FromStr;

use log::{debug, trace};
use quick_xml::events::{BytesStart, Event};
use quick_xml::{Error as XMLError, Reader};
use thiserror::Error;

// ---------------------------------------------------------------------------
// OME object model – the subset needed to describe plates and their files
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OmeDocument {
    pub plates: Vec<Plate>,
    pub images: Vec<Image>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Plate {
    pub id: Option<String>,
    pub name: Option<String>,
    pub rows: Option<u32>,
    pub columns: Option<u32>,
    pub wells: Vec<Well>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Well {
    pub id: Option<String>,
    pub row: u32,
    pub column: u32,
    pub samples: Vec<WellSample>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WellSample {
    pub id: Option<String>,
    pub index: Option<u32>,
    /// ID of the `Image` this field of view points to.
    pub image_ref: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Image {
    pub id: Option<String>,
    pub name: Option<String>,
    pub pixels: Option<Pixels>,
}

/// Raw `Pixels` attributes. Interpretation (defaults, enums) happens in the reader.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pixels {
    pub id: Option<String>,
    pub pixel_type: Option<String>,
    pub dimension_order: Option<String>,
    pub size_x: Option<u32>,
    pub size_y: Option<u32>,
    pub size_z: Option<u32>,
    pub size_c: Option<u32>,
    pub size_t: Option<u32>,
    pub big_endian: Option<bool>,
    pub interleaved: Option<bool>,
    pub significant_bits: Option<u32>,
    pub channels: Vec<Channel>,
    pub tiff_data: Vec<TiffData>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Channel {
    pub id: Option<String>,
    pub name: Option<String>,
    pub samples_per_pixel: Option<u32>,
}

/// A block of planes stored in a TIFF file, possibly a different file than
/// the one holding this document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TiffData {
    pub first_z: u32,
    pub first_t: u32,
    pub first_c: u32,
    pub ifd: u32,
    pub plane_count: Option<u32>,
    /// `urn:uuid:...` identifier of the referenced file.
    pub uuid: Option<String>,
    pub file_name: Option<String>,
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

/// Where in the document the parser currently is. Reported with errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OmeParserState {
    Start,
    Ome,
    Plate,
    Well,
    WellSample,
    Image,
    Pixels,
    TiffData,
    Uuid,
    Done,
}

#[derive(Debug, Error)]
pub enum OmeParseError {
    #[error("An XML error was encountered in {0:?}")]
    XMLError(OmeParserState, #[source] XMLError),
    #[error("The document root is <{0}>, not <OME>")]
    NotOme(String),
    #[error("The document has no elements")]
    Empty,
    #[error("Invalid value {value:?} for {element}@{attribute}")]
    InvalidAttribute {
        element: &'static str,
        attribute: &'static str,
        value: String,
    },
    #[error("Missing required attribute {element}@{attribute}")]
    MissingAttribute {
        element: &'static str,
        attribute: &'static str,
    },
}

type Attributes = HashMap<String, String>;

fn collect_attributes(
    event: &BytesStart,
    state: OmeParserState,
) -> Result<Attributes, OmeParseError> {
    let mut attrs = HashMap::new();
    for attr_parsed in event.attributes() {
        let attr = attr_parsed.map_err(|e| OmeParseError::XMLError(state, e.into()))?;
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| OmeParseError::XMLError(state, e))?;
        attrs.insert(key, value.into_owned());
    }
    Ok(attrs)
}

fn parse_attribute<T: FromStr>(
    attrs: &Attributes,
    element: &'static str,
    attribute: &'static str,
) -> Result<Option<T>, OmeParseError> {
    match attrs.get(attribute) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| OmeParseError::InvalidAttribute {
                element,
                attribute,
                value: raw.clone(),
            }),
    }
}

fn require_attribute<T: FromStr>(
    attrs: &Attributes,
    element: &'static str,
    attribute: &'static str,
) -> Result<T, OmeParseError> {
    parse_attribute(attrs, element, attribute)?
        .ok_or(OmeParseError::MissingAttribute { element, attribute })
}

fn parse_bool_attribute(
    attrs: &Attributes,
    element: &'static str,
    attribute: &'static str,
) -> Result<Option<bool>, OmeParseError> {
    match attrs.get(attribute).map(|v| v.trim()) {
        None => Ok(None),
        Some("true") | Some("1") => Ok(Some(true)),
        Some("false") | Some("0") => Ok(Some(false)),
        Some(other) => Err(OmeParseError::InvalidAttribute {
            element,
            attribute,
            value: other.to_string(),
        }),
    }
}

/// Accumulates an [`OmeDocument`] from SAX events.
#[derive(Debug)]
struct OmeBuilder {
    state: OmeParserState,
    document: OmeDocument,
}

impl OmeBuilder {
    fn new() -> Self {
        Self {
            state: OmeParserState::Start,
            document: OmeDocument::default(),
        }
    }

    fn current_plate(&mut self) -> Option<&mut Plate> {
        self.document.plates.last_mut()
    }

    fn current_well(&mut self) -> Option<&mut Well> {
        self.current_plate().and_then(|p| p.wells.last_mut())
    }

    fn current_pixels(&mut self) -> Option<&mut Pixels> {
        self.document
            .images
            .last_mut()
            .and_then(|img| img.pixels.as_mut())
    }

    fn current_tiff_data(&mut self) -> Option<&mut TiffData> {
        self.current_pixels().and_then(|px| px.tiff_data.last_mut())
    }

    fn start_element(&mut self, event: &BytesStart) -> Result<(), OmeParseError> {
        let local = event.local_name();
        let name = local.as_ref();
        use OmeParserState as S;
        match (self.state, name) {
            (S::Start, b"OME") => self.state = S::Ome,
            (S::Start, other) => {
                return Err(OmeParseError::NotOme(
                    String::from_utf8_lossy(other).into_owned(),
                ))
            }
            (S::Ome, b"Plate") => {
                let attrs = collect_attributes(event, self.state)?;
                self.document.plates.push(Plate {
                    id: attrs.get("ID").cloned(),
                    name: attrs.get("Name").cloned(),
                    rows: parse_attribute(&attrs, "Plate", "Rows")?,
                    columns: parse_attribute(&attrs, "Plate", "Columns")?,
                    wells: Vec::new(),
                });
                self.state = S::Plate;
            }
            (S::Plate, b"Well") => {
                let attrs = collect_attributes(event, self.state)?;
                let well = Well {
                    id: attrs.get("ID").cloned(),
                    row: require_attribute(&attrs, "Well", "Row")?,
                    column: require_attribute(&attrs, "Well", "Column")?,
                    samples: Vec::new(),
                };
                if let Some(plate) = self.current_plate() {
                    plate.wells.push(well);
                }
                self.state = S::Well;
            }
            (S::Well, b"WellSample") => {
                let attrs = collect_attributes(event, self.state)?;
                let sample = WellSample {
                    id: attrs.get("ID").cloned(),
                    index: parse_attribute(&attrs, "WellSample", "Index")?,
                    image_ref: None,
                };
                if let Some(well) = self.current_well() {
                    well.samples.push(sample);
                }
                self.state = S::WellSample;
            }
            (S::WellSample, b"ImageRef") => {
                let attrs = collect_attributes(event, self.state)?;
                let image_ref = attrs.get("ID").cloned();
                if let Some(sample) = self.current_well().and_then(|w| w.samples.last_mut()) {
                    sample.image_ref = image_ref;
                }
            }
            (S::Ome, b"Image") => {
                let attrs = collect_attributes(event, self.state)?;
                self.document.images.push(Image {
                    id: attrs.get("ID").cloned(),
                    name: attrs.get("Name").cloned(),
                    pixels: None,
                });
                self.state = S::Image;
            }
            (S::Image, b"Pixels") => {
                let attrs = collect_attributes(event, self.state)?;
                let pixels = Pixels {
                    id: attrs.get("ID").cloned(),
                    pixel_type: attrs.get("Type").cloned(),
                    dimension_order: attrs.get("DimensionOrder").cloned(),
                    size_x: parse_attribute(&attrs, "Pixels", "SizeX")?,
                    size_y: parse_attribute(&attrs, "Pixels", "SizeY")?,
                    size_z: parse_attribute(&attrs, "Pixels", "SizeZ")?,
                    size_c: parse_attribute(&attrs, "Pixels", "SizeC")?,
                    size_t: parse_attribute(&attrs, "Pixels", "SizeT")?,
                    big_endian: parse_bool_attribute(&attrs, "Pixels", "BigEndian")?,
                    interleaved: parse_bool_attribute(&attrs, "Pixels", "Interleaved")?,
                    significant_bits: parse_attribute(&attrs, "Pixels", "SignificantBits")?,
                    channels: Vec::new(),
                    tiff_data: Vec::new(),
                };
                if let Some(image) = self.document.images.last_mut() {
                    image.pixels = Some(pixels);
                }
                self.state = S::Pixels;
            }
            (S::Pixels, b"Channel") => {
                let attrs = collect_attributes(event, self.state)?;
                let channel = Channel {
                    id: attrs.get("ID").cloned(),
                    name: attrs.get("Name").cloned(),
                    samples_per_pixel: parse_attribute(&attrs, "Channel", "SamplesPerPixel")?,
                };
                if let Some(pixels) = self.current_pixels() {
                    pixels.channels.push(channel);
                }
            }
            (S::Pixels, b"TiffData") => {
                let attrs = collect_attributes(event, self.state)?;
                let tiff = TiffData {
                    first_z: parse_attribute(&attrs, "TiffData", "FirstZ")?.unwrap_or(0),
                    first_t: parse_attribute(&attrs, "TiffData", "FirstT")?.unwrap_or(0),
                    first_c: parse_attribute(&attrs, "TiffData", "FirstC")?.unwrap_or(0),
                    ifd: parse_attribute(&attrs, "TiffData", "IFD")?.unwrap_or(0),
                    plane_count: parse_attribute(&attrs, "TiffData", "PlaneCount")?,
                    uuid: None,
                    file_name: None,
                };
                if let Some(pixels) = self.current_pixels() {
                    pixels.tiff_data.push(tiff);
                }
                self.state = S::TiffData;
            }
            (S::TiffData, b"UUID") => {
                let attrs = collect_attributes(event, self.state)?;
                let file_name = attrs.get("FileName").cloned();
                if let Some(tiff) = self.current_tiff_data() {
                    tiff.file_name = file_name;
                }
                self.state = S::Uuid;
            }
            _ => {
                trace!(
                    "Skipping element {} in {:?}",
                    String::from_utf8_lossy(name),
                    self.state
                );
            }
        }
        Ok(())
    }

    fn end_element(&mut self, name: &[u8]) {
        use OmeParserState as S;
        self.state = match (self.state, name) {
            (S::Ome, b"OME") => S::Done,
            (S::Plate, b"Plate") => S::Ome,
            (S::Well, b"Well") => S::Plate,
            (S::WellSample, b"WellSample") => S::Well,
            (S::Image, b"Image") => S::Ome,
            (S::Pixels, b"Pixels") => S::Image,
            (S::TiffData, b"TiffData") => S::Pixels,
            (S::Uuid, b"UUID") => S::TiffData,
            (state, _) => state,
        };
    }

    fn text(&mut self, value: &str) {
        if self.state == OmeParserState::Uuid {
            if let Some(tiff) = self.current_tiff_data() {
                tiff.uuid = Some(value.to_string());
            }
        }
    }
}

/// Parse an OME-XML document.
pub fn parse_ome_xml<R: BufRead>(source: R) -> Result<OmeDocument, OmeParseError> {
    let mut reader = Reader::from_reader(source);
    reader.trim_text(true);
    let mut builder = OmeBuilder::new();
    let mut buffer = Vec::new();

    loop {
        match reader.read_event_into(&mut buffer) {
            Ok(Event::Start(ref e)) => builder.start_element(e)?,
            Ok(Event::Empty(ref e)) => {
                builder.start_element(e)?;
                builder.end_element(e.local_name().as_ref());
            }
            Ok(Event::End(ref e)) => builder.end_element(e.local_name().as_ref()),
            Ok(Event::Text(ref e)) => {
                let text = e
                    .unescape()
                    .map_err(|err| OmeParseError::XMLError(builder.state, err))?;
                builder.text(&text);
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(err) => return Err(OmeParseError::XMLError(builder.state, err)),
        }
        buffer.clear();
    }

    if builder.state == OmeParserState::Start {
        return Err(OmeParseError::Empty);
    }
    debug!(
        "Parsed OME-XML with {} plate(s) and {} image(s)",
        builder.document.plates.len(),
        builder.document.images.len()
    );
    Ok(builder.document)
}
