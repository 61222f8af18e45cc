use crate::{
    audio::{
        codec::{self, FLAC_EXTENSION, WAV_EXTENSION},
        frames::{DENORMAL_PREVENTION_VAL, FrameBuffer, FramesHandle},
    },
    error::{ImportError, WriteError},
    files,
    naming::strip_extension,
    paths::{PathProvider, ProjectPath},
    pool::ClipId,
    resampler::Resampler,
    usage::UsageScanner,
};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, Instant},
};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "u32", into = "u32")]
pub enum BitDepth {
    Bits16,
    Bits24,
    Bits32,
}

impl BitDepth {
    pub fn bits(self) -> u32 {
        match self {
            BitDepth::Bits16 => 16,
            BitDepth::Bits24 => 24,
            BitDepth::Bits32 => 32,
        }
    }

    /// FLAC for integer depths, float WAV for 32 bit.
    pub fn use_flac(self) -> bool {
        self != BitDepth::Bits32
    }
}

impl From<u32> for BitDepth {
    fn from(bits: u32) -> Self {
        match bits {
            16 => BitDepth::Bits16,
            24 => BitDepth::Bits24,
            32 => BitDepth::Bits32,
            other => {
                debug!("Unknown bit depth {other}, using 32");
                BitDepth::Bits32
            }
        }
    }
}

impl From<BitDepth> for u32 {
    fn from(depth: BitDepth) -> Self {
        depth.bits()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    /// The file on disk already had the clip's hash.
    Unchanged,
    /// Backup shares the main project's file through a reflink.
    Reflinked,
    /// Backup got a byte copy of the main project's file.
    Copied,
}

/// What a project file stores for a clip. Samples live in the pool only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClipMetadata {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_hash: Option<u64>,
    pub bpm: f64,
    pub bit_depth: BitDepth,
    pub use_flac: bool,
    #[serde(rename = "samplerate")]
    pub sample_rate: u32,
    pub channels: usize,
    pub pool_id: Option<ClipId>,
}

/// One audio asset of the pool.
#[derive(Debug)]
pub struct AudioClip {
    id: Option<ClipId>,
    name: String,
    channels: usize,
    sample_rate: u32,
    bit_depth: BitDepth,
    use_flac: bool,
    file_hash: Option<u64>,
    bpm: f64,
    frames: Arc<FrameBuffer>,
    handle: FramesHandle,
    frames_written: usize,
    last_write: Option<Instant>,
    /// The name already had any file extension removed.
    bare_name: bool,
}

pub fn path_in_pool_from_name(
    paths: &dyn PathProvider,
    name: &str,
    use_flac: bool,
    is_backup: bool,
) -> PathBuf {
    let ext = if use_flac {
        FLAC_EXTENSION
    } else {
        WAV_EXTENSION
    };
    paths
        .path(ProjectPath::Pool, is_backup)
        .join(format!("{name}.{ext}"))
}

impl AudioClip {
    fn with_frames(
        name: String,
        frames: FrameBuffer,
        sample_rate: u32,
        bit_depth: BitDepth,
        bpm: f64,
    ) -> Self {
        let frames = Arc::new(frames);
        Self {
            id: None,
            name,
            channels: frames.channels(),
            sample_rate,
            bit_depth,
            use_flac: bit_depth.use_flac(),
            file_hash: None,
            bpm,
            handle: FramesHandle::new(Arc::clone(&frames)),
            frames,
            frames_written: 0,
            last_write: None,
            bare_name: false,
        }
    }

    /// Imports `path`, resampled to `project_rate`. The clip is named after
    /// the file without its extension.
    pub fn from_file(path: &Path, project_rate: u32, bpm: f64) -> Result<Self, ImportError> {
        let (frames, bit_depth) = read_resampled(path, project_rate)?;
        let name = path
            .file_name()
            .map(|n| strip_extension(&n.to_string_lossy()).to_string())
            .unwrap_or_default();
        Ok(Self {
            bare_name: true,
            ..Self::with_frames(name, frames, project_rate, bit_depth, bpm)
        })
    }

    pub fn from_buffer(
        samples: &[f32],
        frames: usize,
        channels: usize,
        bit_depth: BitDepth,
        name: &str,
        sample_rate: u32,
        bpm: f64,
    ) -> Result<Self, ImportError> {
        let expected = frames * channels;
        if channels == 0 || samples.len() != expected {
            return Err(ImportError::BufferSize {
                expected,
                actual: samples.len(),
            });
        }
        Ok(Self::with_frames(
            name.to_string(),
            FrameBuffer::new(samples.to_vec(), channels),
            sample_rate,
            bit_depth,
            bpm,
        ))
    }

    /// Starts a growable 32-bit recording buffer of `initial_frames` frames.
    pub fn new_recording(
        channels: usize,
        initial_frames: usize,
        name: &str,
        sample_rate: u32,
        bpm: f64,
    ) -> Self {
        Self::with_frames(
            name.to_string(),
            FrameBuffer::filled(DENORMAL_PREVENTION_VAL, initial_frames, channels),
            sample_rate,
            BitDepth::Bits32,
            bpm,
        )
    }

    /// A clip restored from project metadata. Frames stay unloaded until the
    /// pool reads them from disk.
    pub fn from_metadata(meta: ClipMetadata) -> Self {
        let channels = meta.channels.max(1);
        let frames = Arc::new(FrameBuffer::unloaded(channels));
        Self {
            id: meta.pool_id,
            name: meta.name,
            channels,
            sample_rate: meta.sample_rate,
            bit_depth: meta.bit_depth,
            use_flac: meta.use_flac,
            file_hash: meta.file_hash,
            bpm: meta.bpm,
            handle: FramesHandle::new(Arc::clone(&frames)),
            frames,
            frames_written: 0,
            last_write: None,
            bare_name: true,
        }
    }

    pub fn metadata(&self) -> ClipMetadata {
        ClipMetadata {
            name: self.name.clone(),
            file_hash: self.file_hash,
            bpm: self.bpm,
            bit_depth: self.bit_depth,
            use_flac: self.use_flac,
            sample_rate: self.sample_rate,
            channels: self.channels,
            pool_id: self.id,
        }
    }

    pub fn clone_metadata(&self) -> Self {
        Self::from_metadata(self.metadata())
    }

    pub fn id(&self) -> Option<ClipId> {
        self.id
    }

    pub(crate) fn set_id(&mut self, id: Option<ClipId>) {
        self.id = id;
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn set_name(&mut self, name: String) {
        self.name = name;
        self.bare_name = true;
    }

    pub(crate) fn has_bare_name(&self) -> bool {
        self.bare_name
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn bit_depth(&self) -> BitDepth {
        self.bit_depth
    }

    pub fn use_flac(&self) -> bool {
        self.use_flac
    }

    pub fn file_hash(&self) -> Option<u64> {
        self.file_hash
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    pub fn frames_written(&self) -> usize {
        self.frames_written
    }

    /// Frames as the controller sees them, including unpublished changes.
    pub fn frames(&self) -> &FrameBuffer {
        &self.frames
    }

    pub fn num_frames(&self) -> usize {
        self.frames.num_frames()
    }

    pub fn is_loaded(&self) -> bool {
        self.frames.is_loaded()
    }

    /// Handle for the render thread.
    pub fn frames_handle(&self) -> FramesHandle {
        self.handle.clone()
    }

    /// Makes the current frames visible to the render thread. Returns the
    /// buffer it replaced, unless that is the same allocation.
    pub fn publish(&mut self) -> Option<Arc<FrameBuffer>> {
        let previous = self.handle.swap(Arc::clone(&self.frames));
        (!Arc::ptr_eq(&previous, &self.frames)).then_some(previous)
    }

    /// Drops the samples but keeps the metadata, publishing the empty buffer.
    pub fn release_frames(&mut self) -> Option<Arc<FrameBuffer>> {
        self.frames = Arc::new(FrameBuffer::unloaded(self.channels));
        self.publish()
    }

    /// Appends recorded frames, growing the buffer in place unless the render
    /// thread still holds the published copy. The pool file no longer
    /// matches, so the cached hash is dropped.
    pub fn append_frames(&mut self, samples: &[f32]) {
        Arc::make_mut(&mut self.frames).extend_interleaved(samples);
        self.file_hash = None;
    }

    pub fn needs_flush(&self, interval: Duration) -> bool {
        self.last_write.is_none_or(|at| at.elapsed() >= interval)
    }

    pub fn is_in_use(&self, scanner: &dyn UsageScanner, include_undo_history: bool) -> bool {
        self.id
            .is_some_and(|id| scanner.is_in_use(id, include_undo_history))
    }

    pub fn path_in_pool(&self, paths: &dyn PathProvider, is_backup: bool) -> PathBuf {
        path_in_pool_from_name(paths, &self.name, self.use_flac, is_backup)
    }

    /// Replaces the frames with the clip's file in the main pool, keeping the
    /// tempo the clip was created with.
    pub fn load_from_pool(
        &mut self,
        paths: &dyn PathProvider,
    ) -> Result<Option<Arc<FrameBuffer>>, ImportError> {
        let path = self.path_in_pool(paths, false);
        let (frames, bit_depth) = read_resampled(&path, self.sample_rate)?;
        self.channels = frames.channels();
        self.bit_depth = bit_depth;
        self.use_flac = bit_depth.use_flac();
        self.frames = Arc::new(frames);
        self.frames_written = self.frames.num_frames();
        Ok(self.publish())
    }

    /// A new unpooled clip holding a copy of this clip's samples, read back
    /// from the pool when they are not loaded.
    pub fn duplicate(&self, paths: &dyn PathProvider) -> Result<Self, ImportError> {
        let frames = if self.is_loaded() {
            FrameBuffer::clone(&self.frames)
        } else {
            read_resampled(&self.path_in_pool(paths, false), self.sample_rate)?.0
        };
        Ok(Self {
            bare_name: self.bare_name,
            ..Self::with_frames(
                self.name.clone(),
                frames,
                self.sample_rate,
                self.bit_depth,
                self.bpm,
            )
        })
    }

    /// Writes the clip into the pool directory.
    ///
    /// With `parts` only the frames past the last partial write are encoded,
    /// which is how long recordings get flushed while they grow. Full writes
    /// are skipped when the file already has the clip's hash, and backups
    /// clone the main project's file when it is identical.
    pub fn write_to_pool(
        &mut self,
        paths: &dyn PathProvider,
        parts: bool,
        is_backup: bool,
    ) -> Result<WriteOutcome, WriteError> {
        let path = self.path_in_pool(paths, is_backup);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(|source| WriteError::io(dir, source))?;
        }

        if !parts
            && self.file_hash.is_some()
            && path.exists()
            && files::hash_file(&path).ok() == self.file_hash
        {
            debug!("Skipping write of unchanged clip '{}'", path.display());
            if !is_backup {
                self.mark_written();
            }
            return Ok(WriteOutcome::Unchanged);
        }

        if is_backup && let Some(hash) = self.file_hash {
            let main_path = self.path_in_pool(paths, false);
            if main_path.exists() && files::hash_file(&main_path).ok() == Some(hash) {
                debug!(
                    "Cloning clip from main project ('{}' to '{}')",
                    main_path.display(),
                    path.display()
                );
                match files::reflink_or_copy(&main_path, &path) {
                    Ok(outcome) => return Ok(outcome),
                    Err(e) => warn!(
                        "Failed to copy '{}' to '{}': {e}",
                        main_path.display(),
                        path.display()
                    ),
                }
            }
        }

        debug!(
            "Writing clip '{}' to pool (parts {parts}, backup {is_backup}): '{}'",
            self.name,
            path.display()
        );
        // Backups never feed the main file's append offset.
        let append = parts && !is_backup && self.frames_written > 0;
        let written = self.write_to_file(&path, append)?;
        let hash = if parts {
            None
        } else {
            Some(files::hash_file(&path).map_err(|e| WriteError::io(&path, e))?)
        };
        self.file_hash = hash;
        if !is_backup {
            self.frames_written = written;
            self.last_write = Some(Instant::now());
        }
        Ok(WriteOutcome::Written)
    }

    fn mark_written(&mut self) {
        self.frames_written = self.frames.num_frames();
        self.last_write = Some(Instant::now());
    }

    /// Encodes the clip to `path` regardless of what is already there and
    /// returns how many frames the file now holds. With `append`, a WAV file
    /// only gets the frames past the last write; FLAC is always rewritten.
    pub fn write_to_file(&self, path: &Path, append: bool) -> Result<usize, WriteError> {
        let frames = Arc::clone(&self.frames);
        if !frames.is_loaded() {
            return Err(WriteError::Unloaded {
                name: self.name.clone(),
            });
        }
        let append = append && !self.use_flac && path.exists();
        let offset = if append { self.frames_written } else { 0 };
        let samples = frames.frames_from(offset);
        if self.use_flac {
            codec::write_flac(
                path,
                samples,
                self.channels,
                self.sample_rate,
                self.bit_depth,
            )?;
        } else {
            codec::write_wav(path, samples, self.channels, self.sample_rate, append)?;
        }
        Ok(frames.num_frames())
    }
}

fn read_resampled(path: &Path, project_rate: u32) -> Result<(FrameBuffer, BitDepth), ImportError> {
    let decoded = codec::decode_file(path)?;
    let bit_depth = decoded.bit_depth.map_or(BitDepth::Bits32, BitDepth::from);
    let mut resampler = Resampler::new(
        &decoded.samples,
        decoded.channels,
        decoded.sample_rate,
        project_rate,
    )?;
    while !resampler.is_done() {
        resampler.process()?;
    }
    Ok((
        FrameBuffer::new(resampler.into_interleaved(), decoded.channels),
        bit_depth,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paths::ProjectDirs;

    fn sine(frames: usize, channels: usize) -> Vec<f32> {
        (0..frames * channels)
            .map(|i| ((i / channels) as f32 * 0.05).sin() * 0.8)
            .collect()
    }

    #[test]
    fn rejects_mismatched_buffer() {
        let err = AudioClip::from_buffer(&[0.0; 5], 3, 2, BitDepth::Bits16, "a", 48_000, 120.0)
            .unwrap_err();
        assert!(matches!(
            err,
            ImportError::BufferSize {
                expected: 6,
                actual: 5
            }
        ));
    }

    #[test]
    fn codec_follows_bit_depth() {
        for (depth, flac) in [
            (BitDepth::Bits16, true),
            (BitDepth::Bits24, true),
            (BitDepth::Bits32, false),
        ] {
            let clip =
                AudioClip::from_buffer(&[0.0; 4], 2, 2, depth, "a", 48_000, 120.0).unwrap();
            assert_eq!(clip.use_flac(), flac);
        }
        assert_eq!(BitDepth::from(8), BitDepth::Bits32);
    }

    #[test]
    fn recording_is_primed_against_denormals() {
        let clip = AudioClip::new_recording(2, 64, "rec", 48_000, 90.0);
        assert_eq!(clip.num_frames(), 64);
        assert_eq!(clip.bit_depth(), BitDepth::Bits32);
        assert!(!clip.use_flac());
        assert!(
            clip.frames()
                .samples()
                .iter()
                .all(|s| *s == DENORMAL_PREVENTION_VAL)
        );
    }

    #[test]
    fn append_is_invisible_until_published() {
        let mut clip = AudioClip::new_recording(1, 2, "rec", 48_000, 120.0);
        let handle = clip.frames_handle();
        clip.append_frames(&[0.5, 0.5]);
        assert_eq!(clip.num_frames(), 4);
        assert_eq!(handle.load().num_frames(), 2);
        let previous = clip.publish().unwrap();
        assert_eq!(previous.num_frames(), 2);
        assert_eq!(handle.load().num_frames(), 4);
        assert_eq!(handle.load().channel(0), Some(&[1e-20, 1e-20, 0.5, 0.5][..]));
    }

    #[test]
    fn release_keeps_metadata() {
        let mut clip =
            AudioClip::from_buffer(&sine(16, 2), 16, 2, BitDepth::Bits24, "pad", 44_100, 128.0)
                .unwrap();
        let handle = clip.frames_handle();
        let before = handle.load_full();
        let released = clip.release_frames().unwrap();
        assert!(Arc::ptr_eq(&before, &released));
        assert!(!clip.is_loaded());
        assert!(!handle.load().is_loaded());
        assert_eq!(clip.channels(), 2);
        assert_eq!(clip.name(), "pad");
        assert_eq!(clip.bit_depth(), BitDepth::Bits24);
    }

    #[test]
    fn metadata_serializes_with_project_field_names() {
        let mut clip =
            AudioClip::from_buffer(&[0.0; 2], 1, 2, BitDepth::Bits16, "Kick", 48_000, 120.0)
                .unwrap();
        clip.set_id(Some(ClipId(3)));
        let json = serde_json::to_value(clip.metadata()).unwrap();
        assert_eq!(json["name"], "Kick");
        assert_eq!(json["bitDepth"], 16);
        assert_eq!(json["useFlac"], true);
        assert_eq!(json["samplerate"], 48_000);
        assert_eq!(json["poolId"], 3);
        assert!(json.get("fileHash").is_none());

        let restored = AudioClip::from_metadata(serde_json::from_value(json).unwrap());
        assert_eq!(restored.metadata(), clip.metadata());
        assert!(!restored.is_loaded());
    }

    #[test]
    fn flush_interval_tracks_partial_writes() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ProjectDirs::new(dir.path());
        let mut clip = AudioClip::new_recording(2, 32, "rec", 48_000, 120.0);
        assert!(clip.needs_flush(Duration::from_secs(3600)));
        clip.write_to_pool(&paths, true, false).unwrap();
        assert_eq!(clip.frames_written(), 32);
        assert!(!clip.needs_flush(Duration::from_secs(3600)));
        assert!(clip.needs_flush(Duration::ZERO));
        assert_eq!(clip.file_hash(), None);
    }

    fn frames_on_disk(clip: &AudioClip, paths: &ProjectDirs) -> Vec<f32> {
        codec::decode_file(&clip.path_in_pool(paths, false))
            .unwrap()
            .samples
    }

    #[test]
    fn mixed_full_and_partial_writes_never_duplicate_frames() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ProjectDirs::new(dir.path());
        let mut clip = AudioClip::new_recording(1, 100, "take", 48_000, 120.0);
        clip.write_to_pool(&paths, true, false).unwrap();
        clip.append_frames(&sine(200, 1));
        clip.write_to_pool(&paths, false, false).unwrap();
        assert_eq!(clip.frames_written(), 300);
        clip.append_frames(&sine(50, 1));
        clip.write_to_pool(&paths, true, false).unwrap();
        assert_eq!(clip.frames_written(), 350);

        let on_disk = frames_on_disk(&clip, &paths);
        assert_eq!(on_disk.len(), 350);
        assert_eq!(on_disk, clip.frames().samples());
    }

    #[test]
    fn appended_frames_are_not_skipped_as_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ProjectDirs::new(dir.path());
        let mut clip = AudioClip::new_recording(1, 100, "take", 48_000, 120.0);
        clip.write_to_pool(&paths, false, false).unwrap();
        let first_hash = clip.file_hash();
        assert!(first_hash.is_some());

        clip.append_frames(&sine(200, 1));
        assert_eq!(clip.file_hash(), None);
        assert_eq!(
            clip.write_to_pool(&paths, false, false).unwrap(),
            WriteOutcome::Written
        );
        assert_ne!(clip.file_hash(), first_hash);
        assert_eq!(frames_on_disk(&clip, &paths).len(), 300);
        assert_eq!(
            clip.write_to_pool(&paths, false, false).unwrap(),
            WriteOutcome::Unchanged
        );
    }

    #[test]
    fn empty_recording_can_be_flushed() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ProjectDirs::new(dir.path());
        let mut clip = AudioClip::new_recording(2, 0, "take", 48_000, 120.0);
        assert!(clip.is_loaded());
        clip.write_to_pool(&paths, true, false).unwrap();
        assert_eq!(clip.frames_written(), 0);

        clip.append_frames(&sine(10, 2));
        clip.write_to_pool(&paths, true, false).unwrap();
        assert_eq!(frames_on_disk(&clip, &paths), clip.frames().samples());
    }

    #[test]
    fn backup_write_keeps_main_append_offset() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ProjectDirs::new(dir.path());
        let mut clip = AudioClip::new_recording(1, 16, "take", 48_000, 120.0);
        clip.write_to_pool(&paths, true, false).unwrap();
        clip.append_frames(&sine(8, 1));
        clip.write_to_pool(&paths, false, true).unwrap();
        assert_eq!(clip.frames_written(), 16);
        clip.write_to_pool(&paths, true, false).unwrap();
        assert_eq!(frames_on_disk(&clip, &paths), clip.frames().samples());
    }

    #[test]
    fn unloaded_clip_refuses_full_write() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ProjectDirs::new(dir.path());
        let mut clip =
            AudioClip::from_buffer(&sine(8, 1), 8, 1, BitDepth::Bits32, "gone", 48_000, 120.0)
                .unwrap();
        clip.release_frames();
        assert!(matches!(
            clip.write_to_pool(&paths, false, false),
            Err(WriteError::Unloaded { .. })
        ));
        assert_eq!(clip.file_hash(), None);
    }
}
