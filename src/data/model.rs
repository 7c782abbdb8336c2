use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// PixelType – the OME `Pixels@Type` enumeration
// ---------------------------------------------------------------------------

/// Storage type of a single pixel sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelType {
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Float,
    Double,
    Bit,
    Complex,
    DoubleComplex,
}

impl PixelType {
    /// Width of one sample in bits.
    pub fn bits(&self) -> u32 {
        match self {
            PixelType::Bit => 1,
            PixelType::Int8 | PixelType::UInt8 => 8,
            PixelType::Int16 | PixelType::UInt16 => 16,
            PixelType::Int32 | PixelType::UInt32 | PixelType::Float => 32,
            PixelType::Double | PixelType::Complex => 64,
            PixelType::DoubleComplex => 128,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PixelType::Int8 => "int8",
            PixelType::UInt8 => "uint8",
            PixelType::Int16 => "int16",
            PixelType::UInt16 => "uint16",
            PixelType::Int32 => "int32",
            PixelType::UInt32 => "uint32",
            PixelType::Float => "float",
            PixelType::Double => "double",
            PixelType::Bit => "bit",
            PixelType::Complex => "complex",
            PixelType::DoubleComplex => "double-complex",
        }
    }
}

impl FromStr for PixelType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = match s.to_ascii_lowercase().as_str() {
            "int8" => PixelType::Int8,
            "uint8" => PixelType::UInt8,
            "int16" => PixelType::Int16,
            "uint16" => PixelType::UInt16,
            "int32" => PixelType::Int32,
            "uint32" => PixelType::UInt32,
            // numpy spells these differently from OME
            "float" | "float32" => PixelType::Float,
            "double" | "float64" => PixelType::Double,
            "bit" | "bool" => PixelType::Bit,
            "complex" | "complex64" => PixelType::Complex,
            "double-complex" | "complex128" => PixelType::DoubleComplex,
            other => return Err(format!("unknown pixel type '{other}'")),
        };
        Ok(value)
    }
}

impl fmt::Display for PixelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// DimensionOrder
// ---------------------------------------------------------------------------

/// Rasterization order of the Z, C and T planes. X and Y always come first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DimensionOrder {
    #[default]
    XYZCT,
    XYZTC,
    XYCTZ,
    XYCZT,
    XYTCZ,
    XYTZC,
}

impl DimensionOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            DimensionOrder::XYZCT => "XYZCT",
            DimensionOrder::XYZTC => "XYZTC",
            DimensionOrder::XYCTZ => "XYCTZ",
            DimensionOrder::XYCZT => "XYCZT",
            DimensionOrder::XYTCZ => "XYTCZ",
            DimensionOrder::XYTZC => "XYTZC",
        }
    }
}

impl FromStr for DimensionOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = match s.to_ascii_uppercase().as_str() {
            "XYZCT" => DimensionOrder::XYZCT,
            "XYZTC" => DimensionOrder::XYZTC,
            "XYCTZ" => DimensionOrder::XYCTZ,
            "XYCZT" => DimensionOrder::XYCZT,
            "XYTCZ" => DimensionOrder::XYTCZ,
            "XYTZC" => DimensionOrder::XYTZC,
            other => return Err(format!("unknown dimension order '{other}'")),
        };
        Ok(value)
    }
}

impl fmt::Display for DimensionOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// CoreMetadata – the per-series properties printed by the report
// ---------------------------------------------------------------------------

/// Shape and storage description of one series.
#[derive(Debug, Clone, PartialEq)]
pub struct CoreMetadata {
    pub size_x: u32,
    pub size_y: u32,
    pub size_z: u32,
    pub size_c: u32,
    pub size_t: u32,
    pub pixel_type: PixelType,
    /// Significant bits per sample; may be less than `pixel_type.bits()`.
    pub bits_per_pixel: u32,
    /// Samples stored per pixel (3 for RGB data, 1 otherwise).
    pub rgb_channel_count: u32,
    pub dimension_order: DimensionOrder,
    pub little_endian: bool,
    pub interleaved: bool,
    /// Whether pixel values are indices into a colour lookup table.
    pub indexed: bool,
}

// ---------------------------------------------------------------------------
// Used-file partition results
// ---------------------------------------------------------------------------

/// The files of one series that are not shared with the other series.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesFiles {
    pub series: usize,
    /// Files in the order the reader listed them.
    pub files: Vec<String>,
}

/// One line of the used-files CSV.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsedFileRow {
    pub image_name: String,
    pub used_file: String,
}
