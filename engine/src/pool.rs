use crate::{
    audio::{
        clip::{AudioClip, ClipMetadata},
        frames::{FrameBuffer, FramesHandle},
    },
    error::PoolError,
    naming::{strip_extension, uniquify},
    paths::{PathProvider, ProjectPath},
    usage::UsageScanner,
    workers::writeback::WritebackCoordinator,
};
use serde::{Deserialize, Serialize};
use std::{collections::HashSet, fmt, fs, io, path::PathBuf, sync::Arc};
use tracing::{debug, info, warn};

/// Slot index of a clip in the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClipId(pub usize);

impl fmt::Display for ClipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Persisted form of the pool, in slot order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PoolMetadata {
    pub clips: Vec<Option<ClipMetadata>>,
}

pub struct AudioPool {
    clips: Vec<Option<AudioClip>>,
    sample_rate: u32,
    paths: Arc<dyn PathProvider>,
    retired: Vec<Arc<FrameBuffer>>,
}

impl fmt::Debug for AudioPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioPool")
            .field("clips", &self.clips)
            .field("sample_rate", &self.sample_rate)
            .field("retired", &self.retired.len())
            .finish()
    }
}

impl AudioPool {
    pub fn new(sample_rate: u32, paths: Arc<dyn PathProvider>) -> Self {
        Self {
            clips: Vec::new(),
            sample_rate,
            paths,
            retired: Vec::new(),
        }
    }

    pub fn from_metadata(
        meta: PoolMetadata,
        sample_rate: u32,
        paths: Arc<dyn PathProvider>,
    ) -> Self {
        let clips = meta
            .clips
            .into_iter()
            .enumerate()
            .map(|(idx, slot)| {
                slot.map(|meta| {
                    let mut clip = AudioClip::from_metadata(meta);
                    clip.set_id(Some(ClipId(idx)));
                    clip
                })
            })
            .collect();
        Self {
            clips,
            sample_rate,
            paths,
            retired: Vec::new(),
        }
    }

    pub fn metadata(&self) -> PoolMetadata {
        PoolMetadata {
            clips: self
                .clips
                .iter()
                .map(|slot| slot.as_ref().map(AudioClip::metadata))
                .collect(),
        }
    }

    /// Same slots and clip metadata, no frames, resolving files through
    /// `paths`. Used to save a copy of the project somewhere else, such as a
    /// backup.
    pub fn clone_metadata(&self, paths: Arc<dyn PathProvider>) -> Self {
        Self::from_metadata(self.metadata(), self.sample_rate, paths)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn paths(&self) -> &dyn PathProvider {
        self.paths.as_ref()
    }

    pub fn len(&self) -> usize {
        self.clips.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn ids(&self) -> impl Iterator<Item = ClipId> + '_ {
        self.iter().filter_map(AudioClip::id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &AudioClip> {
        self.clips.iter().flatten()
    }

    pub fn get(&self, id: ClipId) -> Result<&AudioClip, PoolError> {
        self.clips
            .get(id.0)
            .and_then(Option::as_ref)
            .ok_or(PoolError::NotFound(id))
    }

    pub fn get_mut(&mut self, id: ClipId) -> Result<&mut AudioClip, PoolError> {
        self.clips
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .ok_or(PoolError::NotFound(id))
    }

    pub fn frames_handle(&self, id: ClipId) -> Result<FramesHandle, PoolError> {
        self.get(id).map(AudioClip::frames_handle)
    }

    fn name_exists(&self, name: &str) -> bool {
        self.iter().any(|clip| clip.name() == name)
    }

    fn next_free_id(&self) -> ClipId {
        ClipId(
            self.clips
                .iter()
                .position(Option::is_none)
                .unwrap_or(self.clips.len()),
        )
    }

    fn retire(&mut self, frames: Option<Arc<FrameBuffer>>) {
        if let Some(frames) = frames {
            self.retired.push(frames);
        }
    }

    /// Takes ownership of `clip`, giving it the lowest free id and a name no
    /// other live clip has.
    pub fn add(&mut self, mut clip: AudioClip) -> Result<ClipId, PoolError> {
        if clip.name().is_empty() {
            return Err(PoolError::EmptyName);
        }
        let base = if clip.has_bare_name() {
            clip.name()
        } else {
            strip_extension(clip.name())
        };
        let name = uniquify(base, |candidate| self.name_exists(candidate));
        if name != clip.name() {
            debug!("Renaming clip '{}' to '{name}'", clip.name());
        }
        clip.set_name(name);

        let id = self.next_free_id();
        clip.set_id(Some(id));
        let previous = clip.publish();
        self.retire(previous);
        if id.0 == self.clips.len() {
            self.clips.push(Some(clip));
        } else {
            self.clips[id.0] = Some(clip);
        }
        debug!("Added clip {id} to pool");
        Ok(id)
    }

    /// Makes the clip's current frames visible to the render thread and
    /// retires the buffer they replace.
    pub fn publish(&mut self, id: ClipId) -> Result<(), PoolError> {
        let previous = self.get_mut(id)?.publish();
        self.retire(previous);
        Ok(())
    }

    pub fn duplicate(&mut self, id: ClipId, write_file: bool) -> Result<ClipId, PoolError> {
        let copy = self.get(id)?.duplicate(self.paths.as_ref())?;
        let new_id = self.add(copy)?;
        if write_file {
            let paths = Arc::clone(&self.paths);
            self.get_mut(new_id)?
                .write_to_pool(paths.as_ref(), false, false)?;
        }
        Ok(new_id)
    }

    /// Clears slot `id`, deleting its pool file first when `delete_file`.
    pub fn remove(&mut self, id: ClipId, delete_file: bool, is_backup: bool) -> Result<(), PoolError> {
        let clip = self.get(id)?;
        if delete_file {
            let path = clip.path_in_pool(self.paths.as_ref(), is_backup);
            match fs::remove_file(&path) {
                Ok(()) => debug!("Deleted '{}'", path.display()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    debug!("Nothing to delete at '{}'", path.display())
                }
                Err(source) => return Err(PoolError::Io { path, source }),
            }
        }
        if let Some(mut clip) = self.clips[id.0].take() {
            let previous = clip.release_frames();
            self.retire(previous);
            debug!("Removed clip '{}' ({id}) from pool", clip.name());
        }
        Ok(())
    }

    /// Removes every clip the project no longer references, undo history
    /// included, then deletes pool files that belong to no clip.
    pub fn remove_unused(&mut self, scanner: &dyn UsageScanner, is_backup: bool) -> Vec<ClipId> {
        let unused: Vec<ClipId> = self
            .iter()
            .filter(|clip| !clip.is_in_use(scanner, true))
            .filter_map(AudioClip::id)
            .collect();
        let mut removed = Vec::with_capacity(unused.len());
        for id in unused {
            match self.remove(id, true, is_backup) {
                Ok(()) => removed.push(id),
                Err(e) => warn!("Failed to remove unused clip {id}: {e}"),
            }
        }

        let live: HashSet<PathBuf> = self
            .iter()
            .map(|clip| clip.path_in_pool(self.paths.as_ref(), is_backup))
            .collect();
        let pool_dir = self.paths.path(ProjectPath::Pool, is_backup);
        match fs::read_dir(&pool_dir) {
            Ok(entries) => {
                for entry in entries.flatten() {
                    let path = entry.path();
                    if !path.is_file() || live.contains(&path) {
                        continue;
                    }
                    match fs::remove_file(&path) {
                        Ok(()) => debug!("Deleted orphaned '{}'", path.display()),
                        Err(e) => warn!("Failed to delete '{}': {e}", path.display()),
                    }
                }
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to list '{}': {e}", pool_dir.display()),
        }

        info!("Removed {} unused clips", removed.len());
        removed
    }

    /// Loads frames of clips the project references and drops the frames of
    /// the rest.
    pub fn reload_frame_buffers(&mut self, scanner: &dyn UsageScanner) -> Result<(), PoolError> {
        let paths = Arc::clone(&self.paths);
        let mut first_error = None;
        let mut retired = Vec::new();
        for clip in self.clips.iter_mut().flatten() {
            let in_use = clip.is_in_use(scanner, false);
            if in_use && !clip.is_loaded() {
                debug!("Loading frames of clip '{}'", clip.name());
                match clip.load_from_pool(paths.as_ref()) {
                    Ok(previous) => retired.extend(previous),
                    Err(e) => {
                        warn!("Failed to load clip '{}': {e}", clip.name());
                        first_error.get_or_insert(e);
                    }
                }
            } else if !in_use && clip.is_loaded() {
                debug!("Unloading frames of clip '{}'", clip.name());
                retired.extend(clip.release_frames());
            }
        }
        self.retired.extend(retired);
        first_error.map_or(Ok(()), |e| Err(e.into()))
    }

    /// Reads every clip's frames from the main pool after a project load.
    pub fn init_loaded(&mut self) -> Result<(), PoolError> {
        let paths = Arc::clone(&self.paths);
        let mut retired = Vec::new();
        for clip in self.clips.iter_mut().flatten() {
            retired.extend(clip.load_from_pool(paths.as_ref())?);
        }
        self.retired.extend(retired);
        Ok(())
    }

    /// Writes every clip into the pool with `coordinator`'s workers.
    pub fn write_to_disk(
        &mut self,
        is_backup: bool,
        coordinator: &WritebackCoordinator,
    ) -> Result<(), PoolError> {
        let paths = Arc::clone(&self.paths);
        coordinator.write(&mut self.clips, paths.as_ref(), is_backup)
    }

    pub fn gen_name_for_recording_clip(track_name: &str, lane: usize) -> String {
        format!("{track_name} - lane {} - recording", lane + 1)
    }

    /// Drops retired frame buffers the render thread no longer reads.
    pub fn collect_retired(&mut self) -> usize {
        let before = self.retired.len();
        self.retired.retain(|frames| Arc::strong_count(frames) > 1);
        before - self.retired.len()
    }
}

impl fmt::Display for AudioPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "[Audio Pool]")?;
        for (idx, slot) in self.clips.iter().enumerate() {
            match slot {
                Some(clip) => {
                    let path = clip.path_in_pool(self.paths.as_ref(), false);
                    write!(f, "[Clip #{idx}] {} ", clip.name())?;
                    match clip.file_hash() {
                        Some(hash) => write!(f, "({hash:016x})")?,
                        None => write!(f, "(unsaved)")?,
                    }
                    writeln!(
                        f,
                        ": {} frames, {} ch, {}: {}",
                        clip.num_frames(),
                        clip.channels(),
                        clip.bit_depth().bits(),
                        path.display()
                    )?;
                }
                None => writeln!(f, "[Clip #{idx}] <empty>")?,
            }
        }
        Ok(())
    }
}
