pub mod audio;
pub mod config;
pub mod error;
pub mod files;
pub mod naming;
pub mod paths;
pub mod pool;
pub mod resampler;
pub mod usage;
pub mod workers;

pub use audio::clip::{AudioClip, BitDepth, ClipMetadata, WriteOutcome};
pub use audio::frames::{FrameBuffer, FramesHandle};
pub use config::PoolConfig;
pub use error::{AggregateWriteError, ConfigError, ImportError, PoolError, WriteError};
pub use paths::{PathProvider, ProjectDirs, ProjectPath};
pub use pool::{AudioPool, ClipId, PoolMetadata};
pub use usage::{ClipReferences, UsageScanner};
pub use workers::writeback::WritebackCoordinator;
