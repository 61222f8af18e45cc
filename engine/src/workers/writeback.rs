use crate::{
    audio::clip::AudioClip,
    error::{AggregateWriteError, PoolError, WriteError},
    paths::{PathProvider, ProjectPath},
    pool::ClipId,
};
use rayon::prelude::*;
use std::fs;
use tracing::{error, info};

/// Persists a pool's clips on a bounded set of worker threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WritebackCoordinator {
    workers: usize,
}

impl Default for WritebackCoordinator {
    fn default() -> Self {
        Self::new(num_cpus::get())
    }
}

impl WritebackCoordinator {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Runs one full write per live clip and waits for all of them. Every
    /// clip is attempted; the first failure in slot order is reported along
    /// with how many writes failed.
    pub fn write(
        &self,
        clips: &mut [Option<AudioClip>],
        paths: &dyn PathProvider,
        is_backup: bool,
    ) -> Result<(), PoolError> {
        let pool_dir = paths.path(ProjectPath::Pool, is_backup);
        fs::create_dir_all(&pool_dir).map_err(|source| PoolError::Io {
            path: pool_dir.clone(),
            source,
        })?;

        let threads = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .thread_name(|i| format!("pool-writeback-{i}"))
            .build()?;
        let results: Vec<(ClipId, String, Result<(), WriteError>)> = threads.install(|| {
            clips
                .par_iter_mut()
                .enumerate()
                .filter_map(|(idx, slot)| slot.as_mut().map(|clip| (idx, clip)))
                .map(|(idx, clip)| {
                    let result = clip.write_to_pool(paths, false, is_backup).map(|_| ());
                    (ClipId(idx), clip.name().to_string(), result)
                })
                .collect()
        });

        let total = results.len();
        let mut failures = results.into_iter().filter_map(|(id, name, result)| {
            result.err().map(|source| {
                error!("Failed to write clip '{name}' ({id}): {source}");
                (id, name, source)
            })
        });
        let first = failures.next();
        let failed = first.as_ref().map_or(0, |_| 1 + failures.count());
        match first {
            None => {
                info!(
                    "Wrote {total} clips to '{}' with {} workers",
                    pool_dir.display(),
                    self.workers
                );
                Ok(())
            }
            Some((id, name, source)) => Err(AggregateWriteError {
                id,
                name,
                failed,
                total,
                source,
            }
            .into()),
        }
    }
}
