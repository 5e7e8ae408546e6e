//! Sliding-window frame datasets and an input-gradient check for softmax MLPs.
//!
//! `frame-window` serves fixed-width windows of consecutive spectrogram frames from a
//! feature table, grouped into per-split supports of whole files, and iterates them in
//! mini-batches. Alongside the data side it carries a small dense network with a
//! hand-written backward pass for `d log p(label | x) / d x`, plus a finite-difference
//! harness that checks it.
//!
//! # Data layout and shapes
//!
//! - Scalars are `f32`.
//! - Tables store one frame per row; every file occupies `n_frames_per_file` rows.
//! - A sample is `n_frames_per_sample` consecutive rows, flattened row-major.
//! - Batches are flat row-major buffers with an explicit shape
//!   (see [`space::Batch`]).
//! - Layer weights are row-major with shape `(out_dim, in_dim)`.
//!
//! # Quick start
//!
//! ```rust
//! use frame_window::{
//!     DatasetConfig, FileBoundary, IteratorRequest, MemoryTable, WhichSet, WindowedDataset,
//! };
//!
//! # fn main() -> frame_window::Result<()> {
//! // Two files of 4 frames, 2 bins each.
//! let features: Vec<f32> = (0..16).map(|v| v as f32).collect();
//! let targets = vec![1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 0.0,
//!                    0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0];
//! let table = MemoryTable::from_flat(features, targets, 2, 2)?;
//!
//! let config = DatasetConfig::from_json_str(r#"{
//!     "h5_file_name": "unused.npz",
//!     "train": [0, 4], "test": [1], "valid": [2],
//!     "n_frames_per_file": 4, "n_frames_per_sample": 2
//! }"#)?;
//! let ds = WindowedDataset::with_store(table, &config, WhichSet::Train, FileBoundary::Forbid)?;
//! assert_eq!(ds.sample(1)?, vec![8.0, 9.0, 10.0, 11.0]);
//!
//! let mut it = ds.iterator(IteratorRequest::sequential(2))?;
//! let batch = it.next_batch()?;
//! assert_eq!(batch.rows(), 2);
//! assert!(it.next_batch().unwrap_err().is_end_of_iteration());
//! # Ok(())
//! # }
//! ```
//!
//! # Gradient check
//!
//! ```rust
//! use frame_window::{check_gradient, BackwardMode, LayerKind, MlpBuilder};
//!
//! # fn main() -> frame_window::Result<()> {
//! let mlp = MlpBuilder::new(4)?
//!     .add_layer(6, LayerKind::Linear)?
//!     .add_layer(5, LayerKind::RectifiedLinear)?
//!     .add_layer(3, LayerKind::Softmax)?
//!     .build_with_seed(0)?;
//! let report = check_gradient(&mlp, &[0.3, -0.1, 0.2, 0.4], 1, 1e-2, 1e-2, BackwardMode::Corrected)?;
//! assert_eq!(report.analytic.len(), 4);
//! # Ok(())
//! # }
//! ```
//!
//! # MSRV
//!
//! This crate's minimum supported Rust version (MSRV) is specified in `Cargo.toml`.

pub mod activation;
pub mod builder;
pub mod config;
pub mod dataset;
pub mod error;
pub mod gradcheck;
pub mod gradient;
pub mod iteration;
pub mod layer;
pub mod mlp;
pub mod serde_model;
pub mod space;
pub mod standardize;
pub mod store;
pub mod window;

pub use activation::LayerKind;
pub use builder::MlpBuilder;
pub use config::{DatasetConfig, StandardizerConfig, WhichSet};
pub use dataset::{BatchIterator, BatchOutput, IteratorRequest, WindowedDataset};
pub use error::{Error, Result};
pub use gradcheck::{check_gradient, finite_difference, uniform_difference, GradCheckReport};
pub use gradient::{input_gradient, BackwardMode};
pub use iteration::{IterationMode, SubsetSchedule};
pub use layer::Layer;
pub use mlp::Mlp;
pub use space::{Axes, Batch, BatchTransform, DataSpecs, Source, Space};
pub use standardize::Standardizer;
pub use store::{MemoryTable, NpzTable, TableStore};
pub use window::{extract_window, FileBoundary, WindowSpec};
