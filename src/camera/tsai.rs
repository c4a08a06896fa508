//! Reader and writer for the `key = values` text format of `.tsai` files.
//!
//! A file is a sequence of lines that are either a bare marker (`VERSION_4`,
//! `PINHOLE`, `TSAI`, ...) or an entry `key = v1 v2 ...`. Markers match
//! case-insensitively. Keys are looked up case-sensitively and the first
//! occurrence wins.

use crate::error::{AdjustError, AdjustResult};
use nalgebra::{Matrix3, Vector3};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
struct Entry {
    key: String,
    values: Vec<String>,
    line: usize,
}

/// A parsed `.tsai`-style file.
#[derive(Debug, Clone)]
pub struct TsaiFile {
    path: PathBuf,
    markers: Vec<String>,
    entries: Vec<Entry>,
}

impl TsaiFile {
    pub fn read<P: AsRef<Path>>(path: P) -> AdjustResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| AdjustError::io(path, e))?;
        Ok(Self::parse(path, &content))
    }

    pub fn parse(path: &Path, content: &str) -> Self {
        let mut markers = Vec::new();
        let mut entries = Vec::new();
        for (line_num, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            match line.split_once('=') {
                Some((key, values)) => entries.push(Entry {
                    key: key.trim().to_string(),
                    values: values.split_whitespace().map(str::to_string).collect(),
                    line: line_num + 1,
                }),
                None => markers.push(line.to_string()),
            }
        }
        Self {
            path: path.to_path_buf(),
            markers,
            entries,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn has_marker(&self, marker: &str) -> bool {
        self.markers.iter().any(|m| m.eq_ignore_ascii_case(marker))
    }

    pub fn has_key(&self, key: &str) -> bool {
        self.entries.iter().any(|e| e.key == key)
    }

    fn entry(&self, key: &str) -> AdjustResult<&Entry> {
        self.entries
            .iter()
            .find(|e| e.key == key)
            .ok_or_else(|| AdjustError::Parse {
                path: self.path.clone(),
                line: 0,
                message: format!("missing entry: {key}"),
            })
    }

    /// Raw string values of an entry.
    pub fn strings(&self, key: &str) -> AdjustResult<&[String]> {
        Ok(&self.entry(key)?.values)
    }

    /// Numeric values of an entry.
    pub fn values(&self, key: &str) -> AdjustResult<Vec<f64>> {
        let entry = self.entry(key)?;
        entry
            .values
            .iter()
            .map(|token| {
                token.parse::<f64>().map_err(|_| AdjustError::Parse {
                    path: self.path.clone(),
                    line: entry.line,
                    message: format!("invalid number for {key}: {token}"),
                })
            })
            .collect()
    }

    /// Numeric values of an entry, which must hold exactly `count` of them.
    pub fn fixed_values(&self, key: &str, count: usize) -> AdjustResult<Vec<f64>> {
        let values = self.values(key)?;
        if values.len() != count {
            let line = self.entry(key)?.line;
            return Err(AdjustError::Parse {
                path: self.path.clone(),
                line,
                message: format!("expecting {count} values for {key}, found {}", values.len()),
            });
        }
        Ok(values)
    }

    pub fn scalar(&self, key: &str) -> AdjustResult<f64> {
        Ok(self.fixed_values(key, 1)?[0])
    }

    /// Scalar entry, or `default` when the key is absent.
    pub fn scalar_or(&self, key: &str, default: f64) -> AdjustResult<f64> {
        if self.has_key(key) {
            self.scalar(key)
        } else {
            Ok(default)
        }
    }

    pub fn vector3(&self, key: &str) -> AdjustResult<Vector3<f64>> {
        let v = self.fixed_values(key, 3)?;
        Ok(Vector3::new(v[0], v[1], v[2]))
    }

    /// Row-major 3x3 matrix.
    pub fn matrix3(&self, key: &str) -> AdjustResult<Matrix3<f64>> {
        let v = self.fixed_values(key, 9)?;
        Ok(Matrix3::from_row_slice(&v))
    }
}

/// Accumulates the text of a `.tsai`-style file.
#[derive(Debug, Default)]
pub struct TsaiWriter {
    text: String,
}

impl TsaiWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn marker(&mut self, marker: &str) -> &mut Self {
        self.text.push_str(marker);
        self.text.push('\n');
        self
    }

    pub fn scalar(&mut self, key: &str, value: f64) -> &mut Self {
        self.values(key, &[value])
    }

    pub fn values(&mut self, key: &str, values: &[f64]) -> &mut Self {
        let joined = values
            .iter()
            .map(|v| format!("{v:.17}"))
            .collect::<Vec<_>>()
            .join(" ");
        // Writing into a String cannot fail.
        let _ = writeln!(self.text, "{key} = {joined}");
        self
    }

    pub fn text(&mut self, key: &str, value: &str) -> &mut Self {
        let _ = writeln!(self.text, "{key} = {value}");
        self
    }

    pub fn vector3(&mut self, key: &str, v: &Vector3<f64>) -> &mut Self {
        self.values(key, v.as_slice())
    }

    pub fn matrix3(&mut self, key: &str, m: &Matrix3<f64>) -> &mut Self {
        let row_major: Vec<f64> = m.transpose().iter().copied().collect();
        self.values(key, &row_major)
    }

    pub fn write<P: AsRef<Path>>(&self, path: P) -> AdjustResult<()> {
        let path = path.as_ref();
        fs::write(path, &self.text).map_err(|e| AdjustError::io(path, e))
    }
}
