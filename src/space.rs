//! Data sources, spaces and batches.
//!
//! A request for data names one or more sources (`features`, `targets`), each paired
//! with the space its batches must be delivered in.

use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Source {
    Features,
    Targets,
}

impl Source {
    pub fn as_str(self) -> &'static str {
        match self {
            Source::Features => "features",
            Source::Targets => "targets",
        }
    }
}

impl FromStr for Source {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "features" => Ok(Source::Features),
            "targets" => Ok(Source::Targets),
            other => Err(Error::UnsupportedSource(other.to_owned())),
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Axis order of a topological batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Axes {
    /// (batch, channel, row, col)
    #[default]
    BC01,
    /// (batch, row, col, channel); the layout design rows are stored in.
    B01C,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Space {
    Vector {
        dim: usize,
    },
    /// A `rows x cols` image with `channels` channels. For frame windows, rows are
    /// frames and cols are feature bins.
    Conv2D {
        rows: usize,
        cols: usize,
        channels: usize,
        axes: Axes,
    },
}

impl Space {
    /// Flattened width of one example.
    #[inline]
    pub fn width(&self) -> usize {
        match *self {
            Space::Vector { dim } => dim,
            Space::Conv2D {
                rows,
                cols,
                channels,
                ..
            } => rows * cols * channels,
        }
    }

    /// Shape of a batch of `n` examples in this space.
    pub fn batch_shape(&self, n: usize) -> Vec<usize> {
        match *self {
            Space::Vector { dim } => vec![n, dim],
            Space::Conv2D {
                rows,
                cols,
                channels,
                axes: Axes::BC01,
            } => vec![n, channels, rows, cols],
            Space::Conv2D {
                rows,
                cols,
                channels,
                axes: Axes::B01C,
            } => vec![n, rows, cols, channels],
        }
    }

    /// Check that `batch` has this space's per-example width.
    pub fn validate(&self, batch: &Batch) -> Result<()> {
        if batch.width() != self.width() {
            return Err(Error::ShapeMismatch(format!(
                "batch of shape {:?} has per-example width {}, space {self:?} expects {}",
                batch.shape(),
                batch.width(),
                self.width()
            )));
        }
        Ok(())
    }

    /// Convert a flat design matrix into this space.
    ///
    /// Design rows are laid out `(rows, cols, channels)`; for `BC01` the channel axis
    /// is moved to the front of each example.
    pub fn format(&self, batch: Batch) -> Result<Batch> {
        self.validate(&batch)?;
        let n = batch.rows();
        match *self {
            Space::Conv2D {
                rows,
                cols,
                channels,
                axes: Axes::BC01,
            } if channels > 1 => {
                let plane = rows * cols;
                let mut data = vec![0.0; batch.data.len()];
                for (b, example) in batch.data.chunks_exact(self.width()).enumerate() {
                    let out = &mut data[b * self.width()..(b + 1) * self.width()];
                    for p in 0..plane {
                        for c in 0..channels {
                            out[c * plane + p] = example[p * channels + c];
                        }
                    }
                }
                Batch::new(data, self.batch_shape(n))
            }
            _ => Batch::new(batch.data, self.batch_shape(n)),
        }
    }
}

/// A row-major batch; `shape[0]` is the number of examples.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    data: Vec<f32>,
    shape: Vec<usize>,
}

impl Batch {
    pub fn new(data: Vec<f32>, shape: Vec<usize>) -> Result<Self> {
        if shape.is_empty() {
            return Err(Error::ShapeMismatch("batch shape must not be empty".to_owned()));
        }
        let expected: usize = shape.iter().product();
        if data.len() != expected {
            return Err(Error::ShapeMismatch(format!(
                "batch data has len {}, shape {shape:?} needs {expected}",
                data.len()
            )));
        }
        Ok(Self { data, shape })
    }

    /// A `(rows, width)` design matrix.
    pub fn from_matrix(data: Vec<f32>, width: usize) -> Result<Self> {
        if width == 0 || !data.len().is_multiple_of(width) {
            return Err(Error::ShapeMismatch(format!(
                "data of len {} cannot form rows of width {width}",
                data.len()
            )));
        }
        let rows = data.len() / width;
        Self::new(data, vec![rows, width])
    }

    #[inline]
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    #[inline]
    pub fn into_data(self) -> Vec<f32> {
        self.data
    }

    #[inline]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.shape[0]
    }

    /// Flattened width of one example.
    #[inline]
    pub fn width(&self) -> usize {
        self.shape[1..].iter().product()
    }

    /// The `idx`-th example, flattened.
    ///
    /// Panics if `idx >= rows`.
    #[inline]
    pub fn row(&self, idx: usize) -> &[f32] {
        let w = self.width();
        &self.data[idx * w..(idx + 1) * w]
    }
}

/// A function applied to each `features` design matrix before view formatting.
pub trait BatchTransform {
    fn apply(&self, batch: &Batch) -> Result<Batch>;
}

/// Ordered `(space, source)` pairs describing what an iterator produces.
#[derive(Debug, Clone, PartialEq)]
pub struct DataSpecs {
    components: Vec<(Space, Source)>,
}

impl DataSpecs {
    pub fn single(space: Space, source: Source) -> Self {
        Self {
            components: vec![(space, source)],
        }
    }

    pub fn composite(components: Vec<(Space, Source)>) -> Result<Self> {
        if components.is_empty() {
            return Err(Error::InvalidConfig(
                "data specs must name at least one source".to_owned(),
            ));
        }
        Ok(Self { components })
    }

    /// Build specs from source names; unknown names fail with `UnsupportedSource`.
    pub fn from_names(components: &[(Space, &str)]) -> Result<Self> {
        let components = components
            .iter()
            .map(|(space, name)| Ok((*space, name.parse::<Source>()?)))
            .collect::<Result<Vec<_>>>()?;
        Self::composite(components)
    }

    /// Append one more component.
    #[must_use]
    pub fn with(mut self, space: Space, source: Source) -> Self {
        self.components.push((space, source));
        self
    }

    #[inline]
    pub fn components(&self) -> &[(Space, Source)] {
        &self.components
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.components.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}
