//! Batch index policies.
//!
//! A `SubsetSchedule` emits batches of *batch-relative* indices in `[0, dataset_size)`.
//! The dataset maps them through its support set; the schedule knows nothing about
//! physical rows.

use std::fmt;
use std::str::FromStr;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::{Error, Result};

/// Seed used by stochastic modes when the caller does not supply one.
pub const DEFAULT_SEED: u64 = 2013_01_04;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IterationMode {
    /// Contiguous batches in index order; the last batch may be short.
    #[default]
    Sequential,
    /// Contiguous batches over one random permutation.
    ShuffledSequential,
    /// Each batch is a random contiguous slice.
    RandomSlice,
    /// Each batch is drawn uniformly with replacement.
    RandomUniform,
    /// Equal-sized contiguous batches; the remainder is dropped.
    EvenSequential,
    /// Equal-sized batches over one random permutation.
    EvenShuffledSequential,
}

impl IterationMode {
    pub fn as_str(self) -> &'static str {
        match self {
            IterationMode::Sequential => "sequential",
            IterationMode::ShuffledSequential => "shuffled_sequential",
            IterationMode::RandomSlice => "random_slice",
            IterationMode::RandomUniform => "random_uniform",
            IterationMode::EvenSequential => "even_sequential",
            IterationMode::EvenShuffledSequential => "even_shuffled_sequential",
        }
    }

    #[inline]
    pub fn is_stochastic(self) -> bool {
        !matches!(
            self,
            IterationMode::Sequential | IterationMode::EvenSequential
        )
    }
}

impl FromStr for IterationMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "sequential" => Ok(IterationMode::Sequential),
            "shuffled_sequential" => Ok(IterationMode::ShuffledSequential),
            "random_slice" => Ok(IterationMode::RandomSlice),
            "random_uniform" => Ok(IterationMode::RandomUniform),
            "even_sequential" => Ok(IterationMode::EvenSequential),
            "even_shuffled_sequential" => Ok(IterationMode::EvenShuffledSequential),
            other => Err(Error::InvalidConfig(format!(
                "unknown iteration mode {other:?}"
            ))),
        }
    }
}

impl fmt::Display for IterationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A finite, non-restartable sequence of index batches.
#[derive(Debug, Clone)]
pub struct SubsetSchedule {
    mode: IterationMode,
    dataset_size: usize,
    batch_size: usize,
    num_batches: usize,
    /// Index order for the sequential modes (identity or a permutation).
    order: Vec<usize>,
    rng: StdRng,
    emitted: usize,
}

impl SubsetSchedule {
    /// Resolve batch size and batch count for `mode` and build the schedule.
    ///
    /// - sequential modes: the missing one of `batch_size` / `num_batches` is derived
    ///   with a ceiling division; `num_batches` may not exceed `ceil(N / batch_size)`,
    ///   including when `batch_size` was itself derived from `num_batches`.
    /// - random modes: both must be given.
    /// - even modes: `N` is split into `num_batches` batches of `N / num_batches`.
    pub fn new(
        mode: IterationMode,
        dataset_size: usize,
        batch_size: Option<usize>,
        num_batches: Option<usize>,
        seed: Option<u64>,
    ) -> Result<Self> {
        if batch_size == Some(0) {
            return Err(Error::InvalidConfig("batch_size must be > 0".to_owned()));
        }
        if num_batches == Some(0) {
            return Err(Error::InvalidConfig("num_batches must be > 0".to_owned()));
        }

        let (batch_size, num_batches) = match mode {
            IterationMode::Sequential | IterationMode::ShuffledSequential => {
                resolve_sequential(dataset_size, batch_size, num_batches)?
            }
            IterationMode::RandomSlice | IterationMode::RandomUniform => {
                let (Some(bs), Some(nb)) = (batch_size, num_batches) else {
                    return Err(Error::InvalidConfig(format!(
                        "{mode} requires both batch_size and num_batches"
                    )));
                };
                if dataset_size == 0 {
                    return Err(Error::InvalidConfig(format!(
                        "{mode} cannot sample from an empty dataset"
                    )));
                }
                if mode == IterationMode::RandomSlice && bs > dataset_size {
                    return Err(Error::InvalidConfig(format!(
                        "batch_size {bs} exceeds dataset size {dataset_size}"
                    )));
                }
                (bs, nb)
            }
            IterationMode::EvenSequential | IterationMode::EvenShuffledSequential => {
                let nb = match (batch_size, num_batches) {
                    (_, Some(nb)) => nb,
                    (Some(bs), None) => dataset_size.div_ceil(bs),
                    (None, None) => {
                        return Err(Error::InvalidConfig(format!(
                            "{mode} requires batch_size or num_batches"
                        )));
                    }
                };
                if nb == 0 {
                    (batch_size.unwrap_or(1), 0)
                } else {
                    let even = dataset_size / nb;
                    if even == 0 {
                        return Err(Error::InvalidConfig(format!(
                            "cannot split {dataset_size} examples into {nb} non-empty batches"
                        )));
                    }
                    (even, nb)
                }
            }
        };

        let mut rng = StdRng::seed_from_u64(seed.unwrap_or(DEFAULT_SEED));
        let order = match mode {
            IterationMode::Sequential | IterationMode::EvenSequential => {
                (0..dataset_size).collect()
            }
            IterationMode::ShuffledSequential | IterationMode::EvenShuffledSequential => {
                let mut order: Vec<usize> = (0..dataset_size).collect();
                order.shuffle(&mut rng);
                order
            }
            IterationMode::RandomSlice | IterationMode::RandomUniform => Vec::new(),
        };

        Ok(Self {
            mode,
            dataset_size,
            batch_size,
            num_batches,
            order,
            rng,
            emitted: 0,
        })
    }

    #[inline]
    pub fn mode(&self) -> IterationMode {
        self.mode
    }

    #[inline]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    #[inline]
    pub fn num_batches(&self) -> usize {
        self.num_batches
    }

    /// Total number of indices the schedule will emit.
    pub fn num_examples(&self) -> usize {
        match self.mode {
            IterationMode::Sequential | IterationMode::ShuffledSequential => self
                .dataset_size
                .min(self.batch_size * self.num_batches),
            _ => self.batch_size * self.num_batches,
        }
    }
}

fn resolve_sequential(
    dataset_size: usize,
    batch_size: Option<usize>,
    num_batches: Option<usize>,
) -> Result<(usize, usize)> {
    match (batch_size, num_batches) {
        (None, None) => Err(Error::InvalidConfig(
            "sequential iteration requires batch_size or num_batches".to_owned(),
        )),
        (None, Some(nb)) => {
            let bs = dataset_size.div_ceil(nb).max(1);
            let max = dataset_size.div_ceil(bs);
            if nb > max {
                return Err(Error::InvalidConfig(format!(
                    "cannot split {dataset_size} examples into {nb} sequential batches \
                     (batch size {bs} gives {max})"
                )));
            }
            Ok((bs, nb))
        }
        (Some(bs), None) => Ok((bs, dataset_size.div_ceil(bs))),
        (Some(bs), Some(nb)) => {
            let max = dataset_size.div_ceil(bs);
            if nb > max {
                return Err(Error::InvalidConfig(format!(
                    "num_batches {nb} exceeds the {max} batches of size {bs} \
                     available in {dataset_size} examples"
                )));
            }
            Ok((bs, nb))
        }
    }
}

impl Iterator for SubsetSchedule {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Vec<usize>> {
        if self.emitted >= self.num_batches {
            return None;
        }
        let k = self.emitted;
        self.emitted += 1;

        let batch = match self.mode {
            IterationMode::Sequential
            | IterationMode::ShuffledSequential
            | IterationMode::EvenSequential
            | IterationMode::EvenShuffledSequential => {
                let start = k * self.batch_size;
                let end = (start + self.batch_size).min(self.order.len());
                self.order[start..end].to_vec()
            }
            IterationMode::RandomSlice => {
                let start = self
                    .rng
                    .gen_range(0..=self.dataset_size - self.batch_size);
                (start..start + self.batch_size).collect()
            }
            IterationMode::RandomUniform => (0..self.batch_size)
                .map(|_| self.rng.gen_range(0..self.dataset_size))
                .collect(),
        };
        Some(batch)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.num_batches - self.emitted;
        (left, Some(left))
    }
}

impl ExactSizeIterator for SubsetSchedule {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequential_yields_ceil_batches() {
        for (n, b) in [(10, 3), (9, 3), (1, 5), (7, 1)] {
            let s = SubsetSchedule::new(IterationMode::Sequential, n, Some(b), None, None).unwrap();
            assert_eq!(s.num_batches(), n.div_ceil(b));
            let batches: Vec<_> = s.collect();
            assert_eq!(batches.len(), n.div_ceil(b));
            let flat: Vec<usize> = batches.into_iter().flatten().collect();
            assert_eq!(flat, (0..n).collect::<Vec<_>>());
        }
    }

    #[test]
    fn sequential_derives_batch_size_from_count() {
        let s = SubsetSchedule::new(IterationMode::Sequential, 10, None, Some(4), None).unwrap();
        assert_eq!(s.batch_size(), 3);
        assert_eq!(s.num_batches(), 4);
        assert!(SubsetSchedule::new(IterationMode::Sequential, 10, Some(3), Some(5), None).is_err());
        assert!(SubsetSchedule::new(IterationMode::Sequential, 10, None, None, None).is_err());
    }

    #[test]
    fn sequential_rejects_a_count_it_cannot_serve() {
        // ceil(10 / 6) = 2 leaves only 5 batches.
        assert!(matches!(
            SubsetSchedule::new(IterationMode::Sequential, 10, None, Some(6), None),
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(
            SubsetSchedule::new(IterationMode::ShuffledSequential, 10, None, Some(6), Some(1)),
            Err(Error::InvalidConfig(_))
        ));

        let s = SubsetSchedule::new(IterationMode::Sequential, 10, None, Some(5), None).unwrap();
        assert_eq!((s.batch_size(), s.num_batches()), (2, 5));
        assert_eq!(s.count(), 5);
    }

    #[test]
    fn shuffled_is_a_seeded_permutation() {
        let a: Vec<usize> =
            SubsetSchedule::new(IterationMode::ShuffledSequential, 20, Some(6), None, Some(7))
                .unwrap()
                .flatten()
                .collect();
        let b: Vec<usize> =
            SubsetSchedule::new(IterationMode::ShuffledSequential, 20, Some(6), None, Some(7))
                .unwrap()
                .flatten()
                .collect();
        assert_eq!(a, b);
        let mut sorted = a.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn random_modes_need_both_sizes_and_stay_in_range() {
        assert!(SubsetSchedule::new(IterationMode::RandomUniform, 10, Some(4), None, None).is_err());
        assert!(SubsetSchedule::new(IterationMode::RandomSlice, 3, Some(4), Some(1), None).is_err());

        let s = SubsetSchedule::new(IterationMode::RandomSlice, 10, Some(4), Some(5), Some(1)).unwrap();
        for batch in s {
            assert_eq!(batch.len(), 4);
            assert!(batch.windows(2).all(|w| w[1] == w[0] + 1));
            assert!(batch[3] < 10);
        }

        let s = SubsetSchedule::new(IterationMode::RandomUniform, 10, Some(8), Some(3), Some(1)).unwrap();
        assert_eq!(s.num_examples(), 24);
        for batch in s {
            assert_eq!(batch.len(), 8);
            assert!(batch.iter().all(|&i| i < 10));
        }
    }

    #[test]
    fn even_modes_drop_the_remainder() {
        let batches: Vec<_> =
            SubsetSchedule::new(IterationMode::EvenSequential, 10, None, Some(3), None)
                .unwrap()
                .collect();
        assert_eq!(batches, vec![vec![0, 1, 2], vec![3, 4, 5], vec![6, 7, 8]]);
        assert!(SubsetSchedule::new(IterationMode::EvenSequential, 2, None, Some(3), None).is_err());
    }

    #[test]
    fn mode_names_round_trip() {
        for name in [
            "sequential",
            "shuffled_sequential",
            "random_slice",
            "random_uniform",
            "even_sequential",
            "even_shuffled_sequential",
        ] {
            assert_eq!(name.parse::<IterationMode>().unwrap().as_str(), name);
        }
        assert!("shuffled".parse::<IterationMode>().is_err());
        assert!(!IterationMode::Sequential.is_stochastic());
        assert!(IterationMode::RandomUniform.is_stochastic());
    }
}
