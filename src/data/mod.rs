/// Data layer: core types, OME-XML parsing, loading and the used-files partition.
///
/// Architecture:
/// ```text
///  .companion.ome / .ome.xml
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  pick a reader by extension
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │   ome     │  parse XML → OmeDocument → ImageReader
///   └──────────┘
///        │
///        ▼
///   ┌───────────┐
///   │ partition  │  per-series used files minus the shared ones
///   └───────────┘
///
///  file list + regex ──► companion ──► .companion.ome
/// ```

pub mod companion;
pub mod loader;
pub mod model;
pub mod ome;
pub mod partition;
