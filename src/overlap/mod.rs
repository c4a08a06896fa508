//! Candidate image pairs for interest point matching.
//!
//! Footprints come from sensor metadata (longitude/latitude of the image
//! corners). Two images are candidates when their footprints intersect after
//! the first one is grown by a buffer in degrees.
//!
//! Only the first operand of each comparison is buffered. For axis-aligned
//! boxes this gives the same answer as buffering the second one.

mod worldview;

pub use worldview::WorldViewXmlReader;

use crate::error::{AdjustError, AdjustResult};
use nalgebra::Vector2;
use rayon::prelude::*;
use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Source of image corner coordinates.
pub trait FootprintReader: Sync {
    /// Corners of the image as `(longitude, latitude)` in degrees.
    fn read_lonlat_corners(&self, path: &Path) -> AdjustResult<Vec<Vector2<f64>>>;
}

/// Longitude/latitude bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Footprint {
    min: Vector2<f64>,
    max: Vector2<f64>,
}

impl Footprint {
    pub fn new(min: Vector2<f64>, max: Vector2<f64>) -> Self {
        Self { min, max }
    }

    /// Bounding box of the corners; `None` when there are none.
    pub fn from_corners(corners: &[Vector2<f64>]) -> Option<Self> {
        let (first, rest) = corners.split_first()?;
        let mut footprint = Self::new(*first, *first);
        for corner in rest {
            footprint.grow(corner);
        }
        Some(footprint)
    }

    pub fn min(&self) -> Vector2<f64> {
        self.min
    }

    pub fn max(&self) -> Vector2<f64> {
        self.max
    }

    pub fn grow(&mut self, point: &Vector2<f64>) {
        self.min = self.min.inf(point);
        self.max = self.max.sup(point);
    }

    /// Box grown by `buffer` on every side; a negative buffer shrinks it.
    pub fn expanded(&self, buffer: f64) -> Self {
        let delta = Vector2::new(buffer, buffer);
        Self::new(self.min - delta, self.max + delta)
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y
    }

    /// Whether the interiors overlap. Boxes that only touch do not.
    pub fn intersects(&self, other: &Footprint) -> bool {
        if self.is_empty() || other.is_empty() {
            return false;
        }
        self.min.x < other.max.x
            && other.min.x < self.max.x
            && self.min.y < other.max.y
            && other.min.y < self.max.y
    }
}

/// An image and the file holding its sensor metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSource {
    pub image_file: PathBuf,
    pub camera_file: PathBuf,
}

impl ImageSource {
    pub fn new(image_file: impl Into<PathBuf>, camera_file: impl Into<PathBuf>) -> Self {
        Self {
            image_file: image_file.into(),
            camera_file: camera_file.into(),
        }
    }

    fn name(&self) -> String {
        self.image_file.to_string_lossy().into_owned()
    }
}

/// Ordered set of image-name pairs. Every pair is present in both orders.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OverlapList {
    pairs: BTreeSet<(String, String)>,
}

impl OverlapList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `(a, b)` and `(b, a)`.
    pub fn insert(&mut self, a: impl Into<String>, b: impl Into<String>) {
        let (a, b) = (a.into(), b.into());
        self.pairs.insert((b.clone(), a.clone()));
        self.pairs.insert((a, b));
    }

    pub fn contains(&self, a: &str, b: &str) -> bool {
        self.pairs.contains(&(a.to_string(), b.to_string()))
    }

    /// Number of ordered pairs.
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, String)> {
        self.pairs.iter()
    }

    /// Read `img1 img2` lines. Blank lines and `#` comments are skipped.
    pub fn read_from_file<P: AsRef<Path>>(path: P) -> AdjustResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| AdjustError::io(path, e))?;
        let mut list = Self::new();
        for (line_num, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let tokens: Vec<&str> = line.split_whitespace().collect();
            match tokens.as_slice() {
                [a, b] => list.insert(*a, *b),
                _ => {
                    return Err(AdjustError::Parse {
                        path: path.to_path_buf(),
                        line: line_num + 1,
                        message: format!("expecting two image names, found {}", tokens.len()),
                    });
                }
            }
        }
        Ok(list)
    }

    /// Write each unordered pair once, smaller name first.
    pub fn write_to_file<P: AsRef<Path>>(&self, path: P) -> AdjustResult<()> {
        let path = path.as_ref();
        let mut text = String::new();
        for (a, b) in self.pairs.iter().filter(|(a, b)| a < b) {
            let _ = writeln!(text, "{a} {b}");
        }
        fs::write(path, text).map_err(|e| AdjustError::io(path, e))
    }
}

/// Build the overlap list from image footprints.
///
/// Every footprint is read before any comparison; a file whose metadata
/// cannot be read fails the whole call. Finding no overlapping pair is an
/// error.
pub fn auto_build_overlap_list(
    images: &[ImageSource],
    buffer: f64,
    reader: &dyn FootprintReader,
) -> AdjustResult<OverlapList> {
    let footprints = images
        .iter()
        .map(|image| {
            let unreadable = || AdjustError::UnreadableMetadata {
                path: image.camera_file.clone(),
            };
            let corners = reader.read_lonlat_corners(&image.camera_file).map_err(|e| {
                debug!("{}: {}", image.camera_file.display(), e);
                unreadable()
            })?;
            Footprint::from_corners(&corners).ok_or_else(unreadable)
        })
        .collect::<AdjustResult<Vec<_>>>()?;

    info!("Computing image overlaps with a buffer of {buffer} degrees");
    let n = footprints.len();
    let matches: BTreeSet<(usize, usize)> = (0..n)
        .into_par_iter()
        .fold(BTreeSet::new, |mut found, i| {
            let expanded = footprints[i].expanded(buffer);
            for j in (i + 1)..n {
                if expanded.intersects(&footprints[j]) {
                    found.insert((i, j));
                }
            }
            found
        })
        .reduce(BTreeSet::new, |mut a, mut b| {
            a.append(&mut b);
            a
        });

    if matches.is_empty() {
        return Err(AdjustError::InvalidInput(
            "Unable to find any image overlaps. Increase the overlap buffer \
             or provide an overlap list."
                .to_string(),
        ));
    }

    let mut list = OverlapList::new();
    for &(i, j) in &matches {
        info!(
            "Predicted overlap: {} {}",
            images[i].image_file.display(),
            images[j].image_file.display()
        );
        list.insert(images[i].name(), images[j].name());
    }
    info!("Found {} overlapping image pairs", matches.len());
    Ok(list)
}
