use super::FootprintReader;
use crate::error::{AdjustError, AdjustResult};
use memmap2::Mmap;
use nalgebra::Vector2;
use std::fs::File;
use std::path::Path;

/// Corner tags of a WorldView image metadata file, as `(longitude, latitude)`
/// pairs in upper-left, upper-right, lower-right, lower-left order.
const CORNER_TAGS: [(&str, &str); 4] = [
    ("ULLON", "ULLAT"),
    ("URLON", "URLAT"),
    ("LRLON", "LRLAT"),
    ("LLLON", "LLLAT"),
];

/// Reads image corners from WorldView (DigitalGlobe) XML metadata.
#[derive(Debug, Clone, Copy, Default)]
pub struct WorldViewXmlReader;

impl WorldViewXmlReader {
    pub fn new() -> Self {
        Self
    }

    /// Text of the first `<tag>...</tag>` element.
    fn element_text<'a>(content: &'a str, tag: &str) -> Option<&'a str> {
        let open = format!("<{tag}>");
        let close = format!("</{tag}>");
        let start = content.find(&open)? + open.len();
        let len = content[start..].find(&close)?;
        Some(content[start..start + len].trim())
    }

    fn element_value(path: &Path, content: &str, tag: &str) -> AdjustResult<f64> {
        let text = Self::element_text(content, tag).ok_or_else(|| AdjustError::Parse {
            path: path.to_path_buf(),
            line: 0,
            message: format!("missing element <{tag}>"),
        })?;
        text.parse::<f64>().map_err(|_| AdjustError::Parse {
            path: path.to_path_buf(),
            line: 0,
            message: format!("invalid number in <{tag}>: {text}"),
        })
    }

    pub fn parse_corners(path: &Path, content: &str) -> AdjustResult<Vec<Vector2<f64>>> {
        CORNER_TAGS
            .iter()
            .map(|(lon_tag, lat_tag)| {
                Ok(Vector2::new(
                    Self::element_value(path, content, lon_tag)?,
                    Self::element_value(path, content, lat_tag)?,
                ))
            })
            .collect()
    }
}

impl FootprintReader for WorldViewXmlReader {
    fn read_lonlat_corners(&self, path: &Path) -> AdjustResult<Vec<Vector2<f64>>> {
        let file = File::open(path).map_err(|e| AdjustError::io(path, e))?;
        let mmap = unsafe { Mmap::map(&file).map_err(|e| AdjustError::io(path, e))? };
        let content = std::str::from_utf8(&mmap).map_err(|e| AdjustError::Parse {
            path: path.to_path_buf(),
            line: 0,
            message: format!("Invalid UTF-8: {e}"),
        })?;
        Self::parse_corners(path, content)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<isd>
  <IMD>
    <BAND_P>
      <ULLON>-105.30</ULLON>
      <ULLAT>40.10</ULLAT>
      <URLON>-105.20</URLON>
      <URLAT>40.11</URLAT>
      <LRLON>-105.21</LRLON>
      <LRLAT>39.95</LRLAT>
      <LLLON>-105.31</LLLON>
      <LLLAT>39.94</LLLAT>
    </BAND_P>
  </IMD>
</isd>
"#;

    #[test]
    fn test_parse_corners() {
        let corners = WorldViewXmlReader::parse_corners(Path::new("x.xml"), SAMPLE).unwrap();
        assert_eq!(corners.len(), 4);
        assert_eq!(corners[0], Vector2::new(-105.30, 40.10));
        assert_eq!(corners[3], Vector2::new(-105.31, 39.94));
    }

    #[test]
    fn test_missing_tag() {
        let content = SAMPLE.replace("<LLLAT>39.94</LLLAT>", "");
        let err = WorldViewXmlReader::parse_corners(Path::new("x.xml"), &content).unwrap_err();
        assert!(err.to_string().contains("LLLAT"));
    }

    #[test]
    fn test_read_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let corners = WorldViewXmlReader::new()
            .read_lonlat_corners(file.path())
            .unwrap();
        assert_eq!(corners[1], Vector2::new(-105.20, 40.11));
    }
}
