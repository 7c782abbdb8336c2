use std::fs;
use std::path::Path;

use crate::reader::{ImageReader, OmeXmlReader, ReaderError};

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// Open an image file for metadata queries.  Dispatch by extension.
///
/// Supported formats:
/// * `.companion.ome` / `.ome` – OME-XML companion describing external TIFFs
/// * `.ome.xml` / `.xml`       – standalone OME-XML metadata
pub fn open_image(path: &Path) -> Result<Box<dyn ImageReader>, ReaderError> {
    fs::metadata(path).map_err(|source| ReaderError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    match ext.as_str() {
        "ome" | "xml" => Ok(Box::new(OmeXmlReader::open(path)?)),
        _ => Err(ReaderError::UnsupportedFormat(path.to_path_buf())),
    }
}

#[cfg(test)]
mod tests {
    use std::io::ErrorKind;

    use super::*;

    #[test]
    fn unknown_extension_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plate.czi");
        fs::write(&path, b"not an ome file").unwrap();
        assert!(matches!(
            open_image(&path),
            Err(ReaderError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.companion.ome");
        match open_image(&path) {
            Err(ReaderError::Io { source, .. }) => assert_eq!(source.kind(), ErrorKind::NotFound),
            other => panic!("expected an IO error, got {:?}", other.map(|r| r.series_count())),
        }
    }

    #[test]
    fn io_errors_keep_their_own_kind() {
        let dir = tempfile::tempdir().unwrap();
        let not_a_dir = dir.path().join("listing.txt");
        fs::write(&not_a_dir, "a.tif").unwrap();
        let path = not_a_dir.join("plate.companion.ome");
        match open_image(&path) {
            Err(ReaderError::Io { source, .. }) => assert_ne!(source.kind(), ErrorKind::NotFound),
            other => panic!("expected an IO error, got {:?}", other.map(|r| r.series_count())),
        }
    }

    #[test]
    fn xml_that_is_not_ome_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.xml");
        fs::write(&path, "<settings><value/></settings>").unwrap();
        assert!(matches!(
            open_image(&path),
            Err(ReaderError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn opens_companion_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plate.companion.OME");
        fs::write(
            &path,
            r#"<OME><Image ID="Image:0" Name="A1"><Pixels Type="uint8" DimensionOrder="XYZCT" SizeX="2" SizeY="3"/></Image></OME>"#,
        )
        .unwrap();
        let reader = open_image(&path).unwrap();
        assert_eq!(reader.series_count(), 1);
        assert_eq!(reader.plate_count(), 0);
        assert_eq!(reader.core_metadata(0).unwrap().size_y, 3);
    }
}
