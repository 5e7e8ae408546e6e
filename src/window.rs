//! Sliding-window sample extraction.
//!
//! A sample is `n_frames_per_sample` consecutive rows of the feature column,
//! flattened row-major into one vector of length `n_frames_per_sample * bin_count`.
//!
//! The physical table is a concatenation of source files of `n_frames_per_file`
//! frames each. By default a window may not straddle two files.

use crate::store::TableStore;
use crate::{DatasetConfig, Error, Result};

/// Whether a window may cross the boundary between two concatenated source files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FileBoundary {
    #[default]
    Forbid,
    Allow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSpec {
    pub n_frames_per_sample: usize,
    pub n_frames_per_file: usize,
    pub boundary: FileBoundary,
}

impl WindowSpec {
    pub fn new(n_frames_per_sample: usize, n_frames_per_file: usize) -> Result<Self> {
        if n_frames_per_sample == 0 || n_frames_per_file == 0 {
            return Err(Error::InvalidConfig(format!(
                "frame counts must be > 0, got n_frames_per_sample={n_frames_per_sample} \
                 n_frames_per_file={n_frames_per_file}"
            )));
        }
        if n_frames_per_sample > n_frames_per_file {
            return Err(Error::InvalidConfig(format!(
                "n_frames_per_sample {n_frames_per_sample} exceeds n_frames_per_file \
                 {n_frames_per_file}"
            )));
        }
        Ok(Self {
            n_frames_per_sample,
            n_frames_per_file,
            boundary: FileBoundary::Forbid,
        })
    }

    pub fn from_config(cfg: &DatasetConfig) -> Result<Self> {
        Self::new(cfg.n_frames_per_sample, cfg.n_frames_per_file)
    }

    #[must_use]
    pub fn with_boundary(mut self, boundary: FileBoundary) -> Self {
        self.boundary = boundary;
        self
    }

    /// Flattened length of one sample.
    #[inline]
    pub fn sample_dim(&self, bin_count: usize) -> usize {
        self.n_frames_per_sample * bin_count
    }

    /// Check that the window starting at `row` fits in a table of `num_rows` rows.
    pub fn check(&self, row: usize, num_rows: usize) -> Result<()> {
        let w = self.n_frames_per_sample;
        let end = row.checked_add(w).ok_or_else(|| {
            Error::OutOfRange(format!("window start {row} overflows"))
        })?;
        if end > num_rows {
            return Err(Error::OutOfRange(format!(
                "window [{row}, {end}) exceeds table row count {num_rows}"
            )));
        }

        let first_file = row / self.n_frames_per_file;
        let last_file = (end - 1) / self.n_frames_per_file;
        if first_file != last_file {
            match self.boundary {
                FileBoundary::Forbid => {
                    return Err(Error::OutOfRange(format!(
                        "window [{row}, {end}) spans source files {first_file} and {last_file} \
                         ({} frames per file)",
                        self.n_frames_per_file
                    )));
                }
                FileBoundary::Allow => {
                    log::warn!(
                        "window [{row}, {end}) spans source files {first_file} and {last_file}"
                    );
                }
            }
        }
        Ok(())
    }
}

/// Extract the flattened window starting at physical row `row`.
pub fn extract_window<S: TableStore + ?Sized>(
    store: &S,
    row: usize,
    spec: &WindowSpec,
) -> Result<Vec<f32>> {
    let mut out = vec![0.0; spec.sample_dim(store.feature_dim())];
    extract_window_into(store, row, spec, &mut out)?;
    Ok(out)
}

/// Non-allocating form of [`extract_window`].
///
/// Shape contract: `out.len() == spec.sample_dim(store.feature_dim())`.
pub fn extract_window_into<S: TableStore + ?Sized>(
    store: &S,
    row: usize,
    spec: &WindowSpec,
    out: &mut [f32],
) -> Result<()> {
    let expected = spec.sample_dim(store.feature_dim());
    if out.len() != expected {
        return Err(Error::ShapeMismatch(format!(
            "window buffer has len {}, expected {expected}",
            out.len()
        )));
    }
    spec.check(row, store.num_rows())?;
    out.copy_from_slice(store.feature_rows(row, spec.n_frames_per_sample)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryTable;

    /// `rows` frames of `bins` bins; frame `r`, bin `b` holds `r * 1000 + b`.
    fn ramp_table(rows: usize, bins: usize) -> MemoryTable {
        let x: Vec<f32> = (0..rows)
            .flat_map(|r| (0..bins).map(move |b| (r * 1000 + b) as f32))
            .collect();
        MemoryTable::from_flat(x, vec![0.0; rows], bins, 1).unwrap()
    }

    #[test]
    fn window_of_four_frames_by_513_bins() {
        let table = ramp_table(8, 513);
        let spec = WindowSpec::new(4, 8).unwrap();
        let w = extract_window(&table, 2, &spec).unwrap();
        assert_eq!(w.len(), 4 * 513);
        assert_eq!(w.len(), 2052);
        assert_eq!(w[0], 2000.0);
        assert_eq!(w[513], 3000.0);
        assert_eq!(w[2051], 5512.0);
    }

    #[test]
    fn window_past_the_last_row_fails() {
        let table = ramp_table(6, 2);
        let spec = WindowSpec::new(3, 6).unwrap();
        assert!(extract_window(&table, 3, &spec).is_ok());
        assert!(matches!(
            extract_window(&table, 4, &spec),
            Err(Error::OutOfRange(_))
        ));
    }

    #[test]
    fn cross_file_windows_are_rejected_unless_allowed() {
        // Two files of 4 frames.
        let table = ramp_table(8, 1);
        let spec = WindowSpec::new(2, 4).unwrap();
        assert!(extract_window(&table, 2, &spec).is_ok());
        assert!(matches!(
            extract_window(&table, 3, &spec),
            Err(Error::OutOfRange(_))
        ));
        assert!(extract_window(&table, 4, &spec).is_ok());

        let allow = spec.with_boundary(FileBoundary::Allow);
        assert_eq!(extract_window(&table, 3, &allow).unwrap(), vec![3000.0, 4000.0]);
    }

    #[test]
    fn into_rejects_wrong_buffer() {
        let table = ramp_table(4, 3);
        let spec = WindowSpec::new(2, 4).unwrap();
        let mut buf = [0.0_f32; 5];
        assert!(matches!(
            extract_window_into(&table, 0, &spec, &mut buf),
            Err(Error::ShapeMismatch(_))
        ));
    }

    #[test]
    fn spec_validation() {
        assert!(WindowSpec::new(0, 4).is_err());
        assert!(WindowSpec::new(5, 4).is_err());
    }
}
