//! Read-only feature tables.
//!
//! A table exposes two row-aligned columns: `X` (frames x feature bins) and `y`
//! (frames x label width). Rows are addressed by physical frame index and stored
//! contiguously in row-major layout, so a run of consecutive frames is a single slice.

use std::fs::File;
use std::path::Path;

use std::io::{Read, Seek};

use ndarray::{Array1, Array2, Axis};
use ndarray_npy::{NpzReader, ReadNpzError, ReadableElement};

use crate::{Error, Result};

/// The narrow capability the dataset adapter needs from a feature table.
pub trait TableStore {
    /// Number of physical rows (frames) in both columns.
    fn num_rows(&self) -> usize;

    /// Width of a feature row (number of feature bins).
    fn feature_dim(&self) -> usize;

    /// Width of a label row.
    fn target_dim(&self) -> usize;

    /// Rows `[start, start + count)` of `X`, flattened row-major.
    fn feature_rows(&self, start: usize, count: usize) -> Result<&[f32]>;

    /// Row `idx` of `y`.
    fn target_row(&self, idx: usize) -> Result<&[f32]>;
}

/// An in-memory table with contiguous row-major `X` and `y` buffers.
#[derive(Debug, Clone)]
pub struct MemoryTable {
    features: Vec<f32>,
    targets: Vec<f32>,
    rows: usize,
    feature_dim: usize,
    target_dim: usize,
}

impl MemoryTable {
    /// Build a table from flat buffers.
    ///
    /// `features` is `(rows, feature_dim)` and `targets` is `(rows, target_dim)`.
    pub fn from_flat(
        features: Vec<f32>,
        targets: Vec<f32>,
        feature_dim: usize,
        target_dim: usize,
    ) -> Result<Self> {
        if feature_dim == 0 {
            return Err(Error::InvalidData("feature_dim must be > 0".to_owned()));
        }
        if target_dim == 0 {
            return Err(Error::InvalidData("target_dim must be > 0".to_owned()));
        }
        if !features.len().is_multiple_of(feature_dim) {
            return Err(Error::InvalidData(format!(
                "features length {} is not divisible by feature_dim {}",
                features.len(),
                feature_dim
            )));
        }

        let rows = features.len() / feature_dim;
        if targets.len() != rows * target_dim {
            return Err(Error::InvalidData(format!(
                "targets length {} does not match rows * target_dim ({} * {})",
                targets.len(),
                rows,
                target_dim
            )));
        }

        Ok(Self {
            features,
            targets,
            rows,
            feature_dim,
            target_dim,
        })
    }

    /// Build a table from per-frame rows.
    ///
    /// This is a convenience constructor (it copies into contiguous storage).
    pub fn from_rows(features: &[Vec<f32>], targets: &[Vec<f32>]) -> Result<Self> {
        if features.len() != targets.len() {
            return Err(Error::InvalidData(format!(
                "features/targets row count mismatch: {} vs {}",
                features.len(),
                targets.len()
            )));
        }
        let feature_dim = features.first().map(|r| r.len()).unwrap_or(0);
        let target_dim = targets.first().map(|r| r.len()).unwrap_or(0);

        let features = flatten_rows(features, feature_dim, "feature")?;
        let targets = flatten_rows(targets, target_dim, "target")?;
        Self::from_flat(features, targets, feature_dim, target_dim)
    }

    fn from_arrays(x: Array2<f32>, y: Array2<f32>) -> Result<Self> {
        if x.nrows() != y.nrows() {
            return Err(Error::InvalidData(format!(
                "X has {} rows but y has {}",
                x.nrows(),
                y.nrows()
            )));
        }
        let (feature_dim, target_dim) = (x.ncols(), y.ncols());
        // `iter` walks in logical row-major order whatever the memory layout.
        let features = x.iter().copied().collect();
        let targets = y.iter().copied().collect();
        Self::from_flat(features, targets, feature_dim, target_dim)
    }
}

fn flatten_rows(rows: &[Vec<f32>], dim: usize, what: &str) -> Result<Vec<f32>> {
    let mut flat = Vec::with_capacity(rows.len() * dim);
    for (i, row) in rows.iter().enumerate() {
        if row.len() != dim {
            return Err(Error::InvalidData(format!(
                "{what} row {i} has len {}, expected {dim}",
                row.len()
            )));
        }
        flat.extend_from_slice(row);
    }
    Ok(flat)
}

impl TableStore for MemoryTable {
    #[inline]
    fn num_rows(&self) -> usize {
        self.rows
    }

    #[inline]
    fn feature_dim(&self) -> usize {
        self.feature_dim
    }

    #[inline]
    fn target_dim(&self) -> usize {
        self.target_dim
    }

    fn feature_rows(&self, start: usize, count: usize) -> Result<&[f32]> {
        let end = start
            .checked_add(count)
            .filter(|&end| end <= self.rows)
            .ok_or_else(|| {
                Error::OutOfRange(format!(
                    "rows [{start}, {start} + {count}) exceed table row count {}",
                    self.rows
                ))
            })?;
        Ok(&self.features[start * self.feature_dim..end * self.feature_dim])
    }

    fn target_row(&self, idx: usize) -> Result<&[f32]> {
        if idx >= self.rows {
            return Err(Error::OutOfRange(format!(
                "target row {idx} exceeds table row count {}",
                self.rows
            )));
        }
        let start = idx * self.target_dim;
        Ok(&self.targets[start..start + self.target_dim])
    }
}

/// A table read from a `.npz` archive holding arrays `X` and `y`.
///
/// Both columns may be stored as `f32`, `f64` or `i64` and are converted to `f32`.
/// A 1-D `y` (index labels) becomes a single-column table. The archive is read once in [`NpzTable::open`]; the file handle is closed before
/// `open` returns, so the table itself holds no OS resources.
#[derive(Debug, Clone)]
pub struct NpzTable {
    table: MemoryTable,
}

impl NpzTable {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let p = path.as_ref();
        let file = File::open(p)
            .map_err(|e| Error::InvalidData(format!("failed to open {}: {e}", p.display())))?;
        let mut npz = NpzReader::new(file)
            .map_err(|e| Error::InvalidData(format!("{} is not an npz archive: {e}", p.display())))?;
        let names = npz
            .names()
            .map_err(|e| Error::InvalidData(format!("failed to list {}: {e}", p.display())))?;

        let x_name = entry_name(&names, "X", p)?;
        let y_name = entry_name(&names, "y", p)?;
        let x = read_column(&mut npz, &x_name)
            .map_err(|e| Error::InvalidData(format!("failed to read X from {}: {e}", p.display())))?;
        let y = read_column(&mut npz, &y_name)
            .map_err(|e| Error::InvalidData(format!("failed to read y from {}: {e}", p.display())))?;

        let table = MemoryTable::from_arrays(x, y)?;
        log::debug!(
            "opened {} ({} rows, {} feature bins, label width {})",
            p.display(),
            table.num_rows(),
            table.feature_dim(),
            table.target_dim()
        );
        Ok(Self { table })
    }
}

/// Read `name` as `f32`, falling back to `f64` and `i64`.
///
/// On failure the `f32` error is returned.
fn read_column<R: Read + Seek>(
    npz: &mut NpzReader<R>,
    name: &str,
) -> std::result::Result<Array2<f32>, ReadNpzError> {
    let first = match read_as::<R, f32>(npz, name, |v| v) {
        Ok(a) => return Ok(a),
        Err(e) => e,
    };
    read_as::<R, f64>(npz, name, |v| v as f32)
        .or_else(|_| read_as::<R, i64>(npz, name, |v| v as f32))
        .map_err(|_| first)
}

fn read_as<R, A>(
    npz: &mut NpzReader<R>,
    name: &str,
    to_f32: impl Fn(A) -> f32,
) -> std::result::Result<Array2<f32>, ReadNpzError>
where
    R: Read + Seek,
    A: ReadableElement + Copy,
{
    let matrix: std::result::Result<Array2<A>, _> = npz.by_name(name);
    match matrix {
        Ok(a) => Ok(a.mapv(to_f32)),
        Err(e) => {
            let v: Array1<A> = npz.by_name(name).map_err(|_| e)?;
            Ok(v.mapv(to_f32).insert_axis(Axis(1)))
        }
    }
}

fn entry_name(names: &[String], column: &str, path: &Path) -> Result<String> {
    let with_ext = format!("{column}.npy");
    names
        .iter()
        .find(|n| *n == column || **n == with_ext)
        .cloned()
        .ok_or_else(|| {
            Error::InvalidData(format!(
                "{} has no `{column}` array (entries: {names:?})",
                path.display()
            ))
        })
}

impl TableStore for NpzTable {
    #[inline]
    fn num_rows(&self) -> usize {
        self.table.num_rows()
    }

    #[inline]
    fn feature_dim(&self) -> usize {
        self.table.feature_dim()
    }

    #[inline]
    fn target_dim(&self) -> usize {
        self.table.target_dim()
    }

    #[inline]
    fn feature_rows(&self, start: usize, count: usize) -> Result<&[f32]> {
        self.table.feature_rows(start, count)
    }

    #[inline]
    fn target_row(&self, idx: usize) -> Result<&[f32]> {
        self.table.target_row(idx)
    }
}
