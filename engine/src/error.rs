use crate::pool::ClipId;
use std::{io, path::PathBuf};
use symphonia::core::errors::Error as SymphoniaError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("failed to open '{}'", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("unsupported or unreadable audio '{}'", .path.display())]
    Probe {
        path: PathBuf,
        #[source]
        source: SymphoniaError,
    },
    #[error("no decodable audio track in '{}'", .path.display())]
    NoTrack { path: PathBuf },
    #[error("audio decode failed '{}'", .path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: SymphoniaError,
    },
    #[error("audio file '{}' contains no samples", .path.display())]
    Empty { path: PathBuf },
    #[error("failed to create resampler")]
    ResamplerSetup(#[from] rubato::ResamplerConstructionError),
    #[error("resampling failed")]
    Resample(#[from] rubato::ResampleError),
    #[error("buffer holds {actual} samples, expected {expected}")]
    BufferSize { expected: usize, actual: usize },
}

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("i/o error on '{}'", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to encode '{}': {reason}", .path.display())]
    Encode { path: PathBuf, reason: String },
    #[error("clip '{name}' has no frames loaded")]
    Unloaded { name: String },
}

impl WriteError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// First failure of a bulk writeback; the remaining clips were still written.
#[derive(Debug, Error)]
#[error("failed to write clip '{name}' ({id}), {failed} of {total} writes failed: {source}")]
pub struct AggregateWriteError {
    pub id: ClipId,
    pub name: String,
    pub failed: usize,
    pub total: usize,
    #[source]
    pub source: WriteError,
}

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("no clip in pool slot {0}")]
    NotFound(ClipId),
    #[error("clip name must not be empty")]
    EmptyName,
    #[error(transparent)]
    Import(#[from] ImportError),
    #[error(transparent)]
    Write(#[from] WriteError),
    #[error(transparent)]
    Aggregate(#[from] AggregateWriteError),
    #[error("i/o error on '{}'", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to start writeback workers")]
    Workers(#[from] rayon::ThreadPoolBuildError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config '{}'", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid config")]
    Parse(#[from] toml::de::Error),
}
