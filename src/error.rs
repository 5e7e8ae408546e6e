use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    InvalidConfig(String),
    InvalidData(String),
    ShapeMismatch(String),
    OutOfRange(String),
    UnsupportedSource(String),
    UnsupportedLayerKind(String),
    /// The index sequence of a batch iterator is exhausted.
    ///
    /// This is the expected end of a pass, not a fault.
    EndOfIteration,
}

pub type Result<T> = std::result::Result<T, Error>;

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidConfig(msg) => write!(f, "invalid config: {msg}"),
            Error::InvalidData(msg) => write!(f, "invalid data: {msg}"),
            Error::ShapeMismatch(msg) => write!(f, "shape mismatch: {msg}"),
            Error::OutOfRange(msg) => write!(f, "out of range: {msg}"),
            Error::UnsupportedSource(name) => {
                write!(f, "unsupported data source: {name}")
            }
            Error::UnsupportedLayerKind(kind) => {
                write!(f, "unsupported layer kind: {kind}")
            }
            Error::EndOfIteration => write!(f, "end of iteration"),
        }
    }
}

impl std::error::Error for Error {}

impl Error {
    /// Returns true for the end-of-pass signal raised by `BatchIterator::next_batch`.
    #[inline]
    pub fn is_end_of_iteration(&self) -> bool {
        matches!(self, Error::EndOfIteration)
    }
}
