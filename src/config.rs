//! Dataset configuration.
//!
//! A configuration record names the feature table, the three support sets and the
//! framing parameters. It is loaded once (JSON) and never mutated afterwards.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Which split of the physical table a dataset exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WhichSet {
    Train,
    Test,
    Valid,
}

impl WhichSet {
    pub const ALL: [WhichSet; 3] = [WhichSet::Train, WhichSet::Test, WhichSet::Valid];

    pub fn as_str(self) -> &'static str {
        match self {
            WhichSet::Train => "train",
            WhichSet::Test => "test",
            WhichSet::Valid => "valid",
        }
    }
}

impl FromStr for WhichSet {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "train" => Ok(WhichSet::Train),
            "test" => Ok(WhichSet::Test),
            "valid" => Ok(WhichSet::Valid),
            other => Err(Error::InvalidConfig(format!(
                "which_set must be one of train, test, valid; got {other:?}"
            ))),
        }
    }
}

impl fmt::Display for WhichSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration record for a windowed dataset.
///
/// `mean` / `std` are optional and only needed by the standardizer; they are stored
/// flattened (length `n_frames_per_sample * bin_count`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatasetConfig {
    pub h5_file_name: PathBuf,
    pub train: Vec<usize>,
    pub test: Vec<usize>,
    pub valid: Vec<usize>,
    pub n_frames_per_file: usize,
    pub n_frames_per_sample: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mean: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub std: Option<Vec<f32>>,
}

/// Standardizer statistics extracted from a [`DatasetConfig`].
#[derive(Debug, Clone, PartialEq)]
pub struct StandardizerConfig {
    pub mean: Vec<f32>,
    pub std: Vec<f32>,
}

impl DatasetConfig {
    /// Parse and validate a configuration from JSON.
    pub fn from_json_str(s: &str) -> Result<Self> {
        let cfg: DatasetConfig = serde_json::from_str(s)
            .map_err(|e| Error::InvalidConfig(format!("failed to parse dataset config: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load and validate a configuration file.
    ///
    /// A relative `h5_file_name` is resolved against the config file's directory.
    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let p = path.as_ref();
        let s = std::fs::read_to_string(p)
            .map_err(|e| Error::InvalidData(format!("failed to read {}: {e}", p.display())))?;
        let mut cfg = Self::from_json_str(&s)?;
        if cfg.h5_file_name.is_relative() {
            if let Some(dir) = p.parent() {
                cfg.h5_file_name = dir.join(&cfg.h5_file_name);
            }
        }
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.n_frames_per_file == 0 {
            return Err(Error::InvalidConfig(
                "n_frames_per_file must be > 0".to_owned(),
            ));
        }
        if self.n_frames_per_sample == 0 {
            return Err(Error::InvalidConfig(
                "n_frames_per_sample must be > 0".to_owned(),
            ));
        }
        if self.n_frames_per_sample > self.n_frames_per_file {
            return Err(Error::InvalidConfig(format!(
                "n_frames_per_sample {} exceeds n_frames_per_file {}",
                self.n_frames_per_sample, self.n_frames_per_file
            )));
        }
        Ok(())
    }

    /// Support set of the requested split.
    #[inline]
    pub fn support(&self, which: WhichSet) -> &[usize] {
        match which {
            WhichSet::Train => &self.train,
            WhichSet::Test => &self.test,
            WhichSet::Valid => &self.valid,
        }
    }

    pub fn standardizer_stats(&self) -> Result<StandardizerConfig> {
        match (&self.mean, &self.std) {
            (Some(mean), Some(std)) => Ok(StandardizerConfig {
                mean: mean.clone(),
                std: std.clone(),
            }),
            (None, _) => Err(Error::InvalidConfig(
                "config has no `mean` entry".to_owned(),
            )),
            (_, None) => Err(Error::InvalidConfig("config has no `std` entry".to_owned())),
        }
    }
}
