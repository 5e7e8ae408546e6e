//! Windowed dataset adapter and its batch iterator.
//!
//! `WindowedDataset` owns one read-only table handle and the support set of one split.
//! Batch-relative indices produced by a [`SubsetSchedule`] are remapped through the
//! support before any row is read, so train/test/valid share the same physical table.

use std::fmt;
use std::sync::Arc;

use crate::iteration::{IterationMode, SubsetSchedule, DEFAULT_SEED};
use crate::space::{Axes, Batch, BatchTransform, DataSpecs, Source, Space};
use crate::store::{NpzTable, TableStore};
use crate::window::{extract_window, extract_window_into, FileBoundary, WindowSpec};
use crate::{DatasetConfig, Error, Result, WhichSet};

/// Batch size used when a request names neither a batch size nor a batch count.
pub const DEFAULT_BATCH_SIZE: usize = 10;

#[derive(Debug)]
pub struct WindowedDataset<S: TableStore = NpzTable> {
    store: S,
    which: WhichSet,
    support: Vec<usize>,
    window: WindowSpec,
}

impl WindowedDataset<NpzTable> {
    /// Open the `.npz` table named by `config.h5_file_name` and select `which`.
    pub fn open(config: &DatasetConfig, which: WhichSet) -> Result<Self> {
        let store = NpzTable::open(&config.h5_file_name)?;
        Self::with_store(store, config, which, FileBoundary::default())
    }
}

impl<S: TableStore> WindowedDataset<S> {
    /// Wrap an already opened table.
    ///
    /// Every support entry is checked up front: its window must fit in the table and,
    /// under [`FileBoundary::Forbid`], stay inside one source file.
    pub fn with_store(
        store: S,
        config: &DatasetConfig,
        which: WhichSet,
        boundary: FileBoundary,
    ) -> Result<Self> {
        config.validate()?;
        let window = WindowSpec::from_config(config)?.with_boundary(boundary);
        let support = config.support(which).to_vec();

        for (pos, &row) in support.iter().enumerate() {
            window.check(row, store.num_rows()).map_err(|e| match e {
                Error::OutOfRange(msg) => {
                    Error::OutOfRange(format!("{which} support entry {pos}: {msg}"))
                }
                other => other,
            })?;
        }

        log::info!(
            "{which} split: {} windows of {} frames x {} bins over {} rows",
            support.len(),
            window.n_frames_per_sample,
            store.feature_dim(),
            store.num_rows()
        );

        Ok(Self {
            store,
            which,
            support,
            window,
        })
    }

    #[inline]
    pub fn which_set(&self) -> WhichSet {
        self.which
    }

    #[inline]
    pub fn support(&self) -> &[usize] {
        &self.support
    }

    /// Number of samples in the split.
    #[inline]
    pub fn len(&self) -> usize {
        self.support.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.support.is_empty()
    }

    #[inline]
    pub fn window(&self) -> &WindowSpec {
        &self.window
    }

    /// Feature bins per frame.
    #[inline]
    pub fn bin_count(&self) -> usize {
        self.store.feature_dim()
    }

    #[inline]
    pub fn target_dim(&self) -> usize {
        self.store.target_dim()
    }

    /// Flattened length of one sample window.
    #[inline]
    pub fn sample_dim(&self) -> usize {
        self.window.sample_dim(self.bin_count())
    }

    #[inline]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Features as flat vectors and targets as label rows.
    pub fn default_specs(&self) -> DataSpecs {
        DataSpecs::single(
            Space::Vector {
                dim: self.sample_dim(),
            },
            Source::Features,
        )
        .with(
            Space::Vector {
                dim: self.target_dim(),
            },
            Source::Targets,
        )
    }

    /// Frames-by-bins single-channel view of a window.
    pub fn topological_space(&self) -> Space {
        Space::Conv2D {
            rows: self.window.n_frames_per_sample,
            cols: self.bin_count(),
            channels: 1,
            axes: Axes::BC01,
        }
    }

    /// Map a batch-relative index through the support set.
    #[inline]
    pub fn physical_index(&self, rel: usize) -> Result<usize> {
        self.support.get(rel).copied().ok_or_else(|| {
            Error::OutOfRange(format!(
                "index {rel} is past the {} entries of the {} support",
                self.support.len(),
                self.which
            ))
        })
    }

    /// The flattened window of the `rel`-th sample.
    pub fn sample(&self, rel: usize) -> Result<Vec<f32>> {
        extract_window(&self.store, self.physical_index(rel)?, &self.window)
    }

    /// Label row of the `rel`-th sample.
    pub fn target(&self, rel: usize) -> Result<&[f32]> {
        self.store.target_row(self.physical_index(rel)?)
    }

    /// Start a fresh pass over the split.
    pub fn iterator(&self, request: IteratorRequest) -> Result<BatchIterator<'_, S>> {
        let specs = self.resolve_specs(&request)?;
        for (space, source) in specs.components() {
            let width = match source {
                Source::Features => self.sample_dim(),
                Source::Targets => self.target_dim(),
            };
            if space.width() != width {
                return Err(Error::ShapeMismatch(format!(
                    "{source} space {space:?} has width {}, data has width {width}",
                    space.width()
                )));
            }
        }

        let mode = request.mode.unwrap_or_default();
        let batch_size = match (request.batch_size, request.num_batches) {
            (None, None) => Some(DEFAULT_BATCH_SIZE),
            (bs, _) => bs,
        };
        let seed = request.seed.or(Some(DEFAULT_SEED));
        let schedule =
            SubsetSchedule::new(mode, self.len(), batch_size, request.num_batches, seed)?;

        log::debug!(
            "{} iterator: mode={mode} batch_size={} num_batches={}",
            self.which,
            schedule.batch_size(),
            schedule.num_batches()
        );

        Ok(BatchIterator {
            dataset: self,
            schedule,
            specs,
            return_tuple: request.return_tuple,
            transform: request.features_transform,
        })
    }

    fn resolve_specs(&self, request: &IteratorRequest) -> Result<DataSpecs> {
        if request.topo.is_none() && request.targets.is_none() {
            return Ok(request
                .data_specs
                .clone()
                .unwrap_or_else(|| self.default_specs()));
        }
        if request.data_specs.is_some() {
            return Err(Error::InvalidConfig(
                "both data_specs and the deprecated topo/targets arguments were provided"
                    .to_owned(),
            ));
        }

        log::warn!("topo/targets iterator arguments are deprecated; use data_specs");
        let features = if request.topo.unwrap_or(false) {
            self.topological_space()
        } else {
            Space::Vector {
                dim: self.sample_dim(),
            }
        };
        let specs = DataSpecs::single(features, Source::Features);
        if request.targets.unwrap_or(false) {
            Ok(specs.with(
                Space::Vector {
                    dim: self.target_dim(),
                },
                Source::Targets,
            ))
        } else {
            Ok(specs)
        }
    }

    /// Release the table handle.
    pub fn close(self) -> S {
        log::info!("closing {} split", self.which);
        self.store
    }
}

/// Arguments of [`WindowedDataset::iterator`].
///
/// `data_specs` and the deprecated `topo` / `targets` flags are mutually exclusive.
#[derive(Clone, Default)]
pub struct IteratorRequest {
    pub mode: Option<IterationMode>,
    pub batch_size: Option<usize>,
    pub num_batches: Option<usize>,
    pub seed: Option<u64>,
    pub data_specs: Option<DataSpecs>,
    pub topo: Option<bool>,
    pub targets: Option<bool>,
    /// Keep a single requested source wrapped in [`BatchOutput::Tuple`].
    pub return_tuple: bool,
    /// Applied to each `features` design matrix before view formatting.
    pub features_transform: Option<Arc<dyn BatchTransform>>,
}

impl fmt::Debug for IteratorRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IteratorRequest")
            .field("mode", &self.mode)
            .field("batch_size", &self.batch_size)
            .field("num_batches", &self.num_batches)
            .field("seed", &self.seed)
            .field("data_specs", &self.data_specs)
            .field("topo", &self.topo)
            .field("targets", &self.targets)
            .field("return_tuple", &self.return_tuple)
            .field("features_transform", &self.features_transform.is_some())
            .finish()
    }
}

impl IteratorRequest {
    pub fn sequential(batch_size: usize) -> Self {
        Self {
            mode: Some(IterationMode::Sequential),
            batch_size: Some(batch_size),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_specs(mut self, specs: DataSpecs) -> Self {
        self.data_specs = Some(specs);
        self
    }

    #[must_use]
    pub fn with_transform(mut self, transform: Arc<dyn BatchTransform>) -> Self {
        self.features_transform = Some(transform);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BatchOutput {
    Single(Batch),
    Tuple(Vec<Batch>),
}

impl BatchOutput {
    pub fn into_vec(self) -> Vec<Batch> {
        match self {
            BatchOutput::Single(b) => vec![b],
            BatchOutput::Tuple(bs) => bs,
        }
    }

    /// Number of examples in the batch.
    pub fn rows(&self) -> usize {
        match self {
            BatchOutput::Single(b) => b.rows(),
            BatchOutput::Tuple(bs) => bs.first().map(Batch::rows).unwrap_or(0),
        }
    }
}

/// One pass over a dataset split. Not restartable; ask the dataset for a new one.
pub struct BatchIterator<'a, S: TableStore> {
    dataset: &'a WindowedDataset<S>,
    schedule: SubsetSchedule,
    specs: DataSpecs,
    return_tuple: bool,
    transform: Option<Arc<dyn BatchTransform>>,
}

impl<S: TableStore> BatchIterator<'_, S> {
    #[inline]
    pub fn num_batches(&self) -> usize {
        self.schedule.num_batches()
    }

    #[inline]
    pub fn batch_size(&self) -> usize {
        self.schedule.batch_size()
    }

    #[inline]
    pub fn num_examples(&self) -> usize {
        self.schedule.num_examples()
    }

    #[inline]
    pub fn is_stochastic(&self) -> bool {
        self.schedule.mode().is_stochastic()
    }

    #[inline]
    pub fn specs(&self) -> &DataSpecs {
        &self.specs
    }

    /// Produce the next batch, or `Err(Error::EndOfIteration)` once the pass is over.
    pub fn next_batch(&mut self) -> Result<BatchOutput> {
        let rel = self.schedule.next().ok_or(Error::EndOfIteration)?;
        let rows = rel
            .iter()
            .map(|&i| self.dataset.physical_index(i))
            .collect::<Result<Vec<_>>>()?;

        let mut out = Vec::with_capacity(self.specs.len());
        for (space, source) in self.specs.components() {
            let design = match source {
                Source::Targets => self.target_matrix(&rows)?,
                Source::Features => {
                    let design = self.design_matrix(&rows)?;
                    match &self.transform {
                        Some(t) => t.apply(&design)?,
                        None => design,
                    }
                }
            };
            out.push(space.format(design)?);
        }

        log::debug!(
            "{} batch of {} examples starting at row {:?}",
            self.dataset.which,
            rows.len(),
            rows.first()
        );

        if !self.return_tuple && out.len() == 1 {
            if let Some(batch) = out.pop() {
                return Ok(BatchOutput::Single(batch));
            }
        }
        Ok(BatchOutput::Tuple(out))
    }

    fn design_matrix(&self, rows: &[usize]) -> Result<Batch> {
        let dim = self.dataset.sample_dim();
        let mut data = vec![0.0; rows.len() * dim];
        for (&row, out) in rows.iter().zip(data.chunks_exact_mut(dim)) {
            extract_window_into(&self.dataset.store, row, &self.dataset.window, out)?;
        }
        Batch::from_matrix(data, dim)
    }

    fn target_matrix(&self, rows: &[usize]) -> Result<Batch> {
        let dim = self.dataset.target_dim();
        let mut data = Vec::with_capacity(rows.len() * dim);
        for &row in rows {
            data.extend_from_slice(self.dataset.store.target_row(row)?);
        }
        Batch::from_matrix(data, dim)
    }
}

impl<S: TableStore> Iterator for BatchIterator<'_, S> {
    type Item = Result<BatchOutput>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_batch() {
            Err(Error::EndOfIteration) => None,
            other => Some(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MemoryTable, Standardizer};

    const BINS: usize = 3;

    /// 20 frames in one file; frame `r`, bin `b` holds `r * 10 + b`; label = `r % 2` one-hot.
    fn table() -> MemoryTable {
        let x: Vec<Vec<f32>> = (0..20)
            .map(|r| (0..BINS).map(|b| (r * 10 + b) as f32).collect())
            .collect();
        let y: Vec<Vec<f32>> = (0..20)
            .map(|r| if r % 2 == 0 { vec![1.0, 0.0] } else { vec![0.0, 1.0] })
            .collect();
        MemoryTable::from_rows(&x, &y).unwrap()
    }

    fn config() -> DatasetConfig {
        DatasetConfig {
            h5_file_name: "unused.npz".into(),
            train: vec![5, 12, 7],
            test: vec![0, 1, 2, 3, 4, 5, 6],
            valid: vec![16],
            n_frames_per_file: 20,
            n_frames_per_sample: 4,
            mean: None,
            std: None,
        }
    }

    fn dataset(which: WhichSet) -> WindowedDataset<MemoryTable> {
        WindowedDataset::with_store(table(), &config(), which, FileBoundary::Forbid).unwrap()
    }

    #[test]
    fn every_split_constructs_with_in_range_support() {
        for which in WhichSet::ALL {
            let ds = dataset(which);
            assert!(!ds.is_empty());
            assert!(ds
                .support()
                .iter()
                .all(|&i| i + ds.window().n_frames_per_sample <= ds.store().num_rows()));
        }
    }

    #[test]
    fn relative_index_goes_through_support() {
        let ds = dataset(WhichSet::Train);
        assert_eq!(ds.physical_index(1).unwrap(), 12);
        let sample = ds.sample(1).unwrap();
        assert_eq!(sample.len(), 4 * BINS);
        assert_eq!(sample[0], 120.0);
        assert_eq!(sample[BINS * 3 + 2], 152.0);
        assert!(matches!(ds.physical_index(3), Err(Error::OutOfRange(_))));
    }

    #[test]
    fn support_past_the_table_is_rejected() {
        let mut cfg = config();
        cfg.valid = vec![17];
        let err = WindowedDataset::with_store(table(), &cfg, WhichSet::Valid, FileBoundary::Forbid)
            .unwrap_err();
        assert!(matches!(err, Error::OutOfRange(ref m) if m.contains("valid")));
    }

    #[test]
    fn sequential_pass_then_end_of_iteration() {
        let ds = dataset(WhichSet::Test);
        let mut it = ds.iterator(IteratorRequest::sequential(3)).unwrap();
        assert_eq!(it.num_batches(), 3);

        let mut sizes = Vec::new();
        for _ in 0..3 {
            let batch = it.next_batch().unwrap();
            sizes.push(batch.rows());
        }
        assert_eq!(sizes, vec![3, 3, 1]);
        assert_eq!(it.next_batch(), Err(Error::EndOfIteration));
        assert!(it.next().is_none());
    }

    #[test]
    fn default_specs_yield_features_and_targets() {
        let ds = dataset(WhichSet::Train);
        let mut it = ds.iterator(IteratorRequest::sequential(2)).unwrap();
        let BatchOutput::Tuple(parts) = it.next_batch().unwrap() else {
            panic!("expected a tuple");
        };
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].shape(), &[2, 4 * BINS]);
        assert_eq!(parts[0].row(1)[0], 120.0);
        assert_eq!(parts[1].shape(), &[2, 2]);
        assert_eq!(parts[1].row(0), &[0.0, 1.0]);
        assert_eq!(parts[1].row(1), &[1.0, 0.0]);
    }

    #[test]
    fn single_source_is_unwrapped_unless_tuple_requested() {
        let ds = dataset(WhichSet::Train);
        let specs = DataSpecs::single(ds.topological_space(), Source::Features);

        let mut it = ds
            .iterator(IteratorRequest::sequential(3).with_specs(specs.clone()))
            .unwrap();
        match it.next_batch().unwrap() {
            BatchOutput::Single(b) => assert_eq!(b.shape(), &[3, 1, 4, BINS]),
            other => panic!("unexpected {other:?}"),
        }

        let mut request = IteratorRequest::sequential(3).with_specs(specs);
        request.return_tuple = true;
        let mut it = ds.iterator(request).unwrap();
        assert!(matches!(it.next_batch().unwrap(), BatchOutput::Tuple(ref v) if v.len() == 1));
    }

    #[test]
    fn specs_and_deprecated_flags_are_exclusive() {
        let ds = dataset(WhichSet::Train);
        let mut request = IteratorRequest::sequential(1).with_specs(ds.default_specs());
        request.targets = Some(true);
        assert!(matches!(ds.iterator(request), Err(Error::InvalidConfig(_))));

        let request = IteratorRequest {
            topo: Some(true),
            targets: Some(true),
            ..IteratorRequest::sequential(1)
        };
        let it = ds.iterator(request).unwrap();
        assert_eq!(it.specs().components()[0].0, ds.topological_space());
        assert_eq!(it.specs().len(), 2);
    }

    #[test]
    fn wrong_space_width_fails_before_iterating() {
        let ds = dataset(WhichSet::Train);
        let specs = DataSpecs::single(Space::Vector { dim: 7 }, Source::Features);
        assert!(matches!(
            ds.iterator(IteratorRequest::sequential(1).with_specs(specs)),
            Err(Error::ShapeMismatch(_))
        ));
    }

    #[test]
    fn features_transform_is_applied() {
        let ds = dataset(WhichSet::Train);
        let dim = ds.sample_dim();
        let standardizer = Standardizer::new(vec![100.0; dim], vec![10.0; dim]).unwrap();
        let specs = DataSpecs::single(Space::Vector { dim }, Source::Features);
        let request = IteratorRequest::sequential(3)
            .with_specs(specs)
            .with_transform(Arc::new(standardizer));
        let mut it = ds.iterator(request).unwrap();
        let BatchOutput::Single(b) = it.next_batch().unwrap() else {
            panic!("expected a single batch");
        };
        // Row 12, bin 0 = 120 -> (120 - 100) / 10.
        assert_eq!(b.row(1)[0], 2.0);
    }

    #[test]
    fn close_returns_the_store() {
        let ds = dataset(WhichSet::Valid);
        let store = ds.close();
        assert_eq!(store.num_rows(), 20);
    }

    #[test]
    fn request_debug_reports_transform_presence() {
        let plain = format!("{:?}", IteratorRequest::sequential(4));
        assert!(plain.contains("batch_size: Some(4)"));
        assert!(plain.contains("features_transform: false"));

        let s = Standardizer::new(vec![0.0; 2], vec![1.0; 2]).unwrap();
        let with = format!("{:?}", IteratorRequest::default().with_transform(Arc::new(s)));
        assert!(with.contains("features_transform: true"));
    }
}
