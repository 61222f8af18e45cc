use anyhow::{Context, Result};
use maolan_pool_engine::{
    AudioClip, AudioPool, ClipId, ClipReferences, PathProvider, PoolConfig, PoolMetadata,
    ProjectDirs, ProjectPath, WritebackCoordinator,
};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path, sync::Arc};
use tracing::info;

/// Contents of `project.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectFile {
    pub sample_rate: u32,
    pub bpm: f64,
    pub pool: PoolMetadata,
    #[serde(default)]
    pub usage: ClipReferences,
}

/// An open project: its pool plus the clip references that keep clips alive.
pub struct Session {
    dirs: Arc<ProjectDirs>,
    pub config: PoolConfig,
    pub pool: AudioPool,
    pub usage: ClipReferences,
}

impl Session {
    /// Opens the project in `root`, starting an empty one when there is no
    /// project file yet. Frames stay on disk until a command needs them.
    pub fn open(root: &Path, config: PoolConfig) -> Result<Self> {
        let dirs = Arc::new(ProjectDirs::new(root));
        let project_path = dirs.path(ProjectPath::ProjectFile, false);
        let (pool, usage) = if project_path.exists() {
            let content = fs::read_to_string(&project_path)
                .with_context(|| format!("reading {}", project_path.display()))?;
            let project: ProjectFile = serde_json::from_str(&content)
                .with_context(|| format!("parsing {}", project_path.display()))?;
            let pool = AudioPool::from_metadata(project.pool, project.sample_rate, dirs.clone());
            (pool, project.usage)
        } else {
            (
                AudioPool::new(config.sample_rate, dirs.clone()),
                ClipReferences::default(),
            )
        };
        Ok(Self {
            dirs,
            config,
            pool,
            usage,
        })
    }

    pub fn coordinator(&self) -> WritebackCoordinator {
        WritebackCoordinator::new(self.config.workers())
    }

    pub fn import(&mut self, path: &Path, bpm: f64) -> Result<ClipId> {
        let clip = AudioClip::from_file(path, self.pool.sample_rate(), bpm)
            .with_context(|| format!("importing {}", path.display()))?;
        let id = self.pool.add(clip)?;
        self.usage.reference(id);
        Ok(id)
    }

    /// Generates a sine tone block by block as if it were being recorded,
    /// flushing the growing clip whenever the flush interval has passed.
    pub fn record(&mut self, track: &str, lane: usize, channels: usize, seconds: f64) -> Result<ClipId> {
        const BLOCK: usize = 1024;
        let channels = channels.max(1);
        let rate = self.pool.sample_rate();
        let name = AudioPool::gen_name_for_recording_clip(track, lane);
        let id = self
            .pool
            .add(AudioClip::new_recording(channels, 0, &name, rate, self.config.bpm))?;
        let total = (seconds.max(0.0) * f64::from(rate)) as usize;
        let interval = self.config.flush_interval();
        let dirs = Arc::clone(&self.dirs);
        let clip = self.pool.get_mut(id)?;
        let mut block = Vec::with_capacity(BLOCK * channels);
        let mut frame = 0;
        while frame < total {
            block.clear();
            for i in frame..(frame + BLOCK).min(total) {
                let phase = i as f32 * 440.0 * std::f32::consts::TAU / rate as f32;
                block.extend(std::iter::repeat_n(phase.sin() * 0.5, channels));
            }
            frame += block.len() / channels;
            clip.append_frames(&block);
            if clip.needs_flush(interval) {
                clip.write_to_pool(dirs.as_ref(), true, false)?;
            }
        }
        clip.write_to_pool(dirs.as_ref(), false, false)?;
        self.pool.publish(id)?;
        self.usage.reference(id);
        info!("Recorded {frame} frames into '{name}'");
        Ok(id)
    }

    pub fn project_file(&self) -> ProjectFile {
        ProjectFile {
            sample_rate: self.pool.sample_rate(),
            bpm: self.config.bpm,
            pool: self.pool.metadata(),
            usage: self.usage.clone(),
        }
    }

    fn write_project_file(&self, dirs: &ProjectDirs, is_backup: bool) -> Result<()> {
        let path = dirs.path(ProjectPath::ProjectFile, is_backup);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        }
        let json = serde_json::to_string_pretty(&self.project_file())?;
        fs::write(&path, json).with_context(|| format!("writing {}", path.display()))
    }

    /// Writes the project file only, for commands that change no samples.
    pub fn save_metadata(&self) -> Result<()> {
        self.write_project_file(&self.dirs, false)
    }

    pub fn save(&mut self) -> Result<()> {
        self.pool.write_to_disk(false, &self.coordinator())?;
        self.save_metadata()
    }

    /// Saves the project into backup `n`. Clip files are cloned from the main
    /// pool.
    pub fn save_backup(&self, n: usize) -> Result<()> {
        let dirs = Arc::new(ProjectDirs::clone(&self.dirs).with_backup(n));
        let mut backup = self.pool.clone_metadata(dirs.clone());
        backup.write_to_disk(true, &self.coordinator())?;
        self.write_project_file(&dirs, true)?;
        info!(
            "Saved backup to {}",
            dirs.path(ProjectPath::Pool, true).display()
        );
        Ok(())
    }

    pub fn gc(&mut self) -> Vec<ClipId> {
        let removed = self.pool.remove_unused(&self.usage, false);
        for id in &removed {
            self.usage.forget(*id);
        }
        removed
    }

    pub fn duplicate(&mut self, id: ClipId) -> Result<ClipId> {
        let new_id = self.pool.duplicate(id, true)?;
        self.usage.reference(new_id);
        Ok(new_id)
    }

    pub fn remove(&mut self, id: ClipId, delete_file: bool) -> Result<()> {
        self.pool.remove(id, delete_file, false)?;
        self.usage.forget(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maolan_pool_engine::BitDepth;

    fn add_clip(session: &mut Session, name: &str) -> ClipId {
        let samples = vec![0.25_f32; 64];
        let clip =
            AudioClip::from_buffer(&samples, 32, 2, BitDepth::Bits16, name, 48_000, 120.0).unwrap();
        let id = session.pool.add(clip).unwrap();
        session.usage.reference(id);
        id
    }

    #[test]
    fn reopened_project_keeps_pool_and_references() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = Session::open(dir.path(), PoolConfig::default()).unwrap();
        let a = add_clip(&mut session, "Bass");
        let b = add_clip(&mut session, "Keys");
        session.usage.unreference(b);
        session.save().unwrap();

        let reopened = Session::open(dir.path(), PoolConfig::default()).unwrap();
        assert_eq!(reopened.project_file(), session.project_file());
        assert_eq!(reopened.pool.get(a).unwrap().name(), "Bass");
        assert!(!reopened.pool.get(a).unwrap().is_loaded());
    }

    #[test]
    fn backup_gets_its_own_pool() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = Session::open(dir.path(), PoolConfig::default()).unwrap();
        add_clip(&mut session, "Lead");
        session.save().unwrap();
        session.save_backup(1).unwrap();

        let backup = dir.path().join("backups/1.bak");
        assert!(backup.join("pool/Lead.FLAC").exists());
        assert!(backup.join("project.json").exists());
        assert_eq!(
            fs::read(backup.join("pool/Lead.FLAC")).unwrap(),
            fs::read(dir.path().join("pool/Lead.FLAC")).unwrap()
        );
    }

    #[test]
    fn recording_is_flushed_and_saved() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = Session::open(dir.path(), PoolConfig::default()).unwrap();
        let id = session.record("Guitar", 1, 1, 0.1).unwrap();
        let clip = session.pool.get(id).unwrap();
        assert_eq!(clip.name(), "Guitar - lane 2 - recording");
        assert_eq!(clip.num_frames(), 4_800);
        assert!(clip.file_hash().is_some());
        assert!(dir.path().join("pool/Guitar - lane 2 - recording.wav").exists());
        assert_eq!(session.pool.frames_handle(id).unwrap().load().num_frames(), 4_800);
    }

    #[test]
    fn empty_recording_still_saves() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = Session::open(dir.path(), PoolConfig::default()).unwrap();
        let id = session.record("Vocals", 0, 2, 0.0).unwrap();
        let clip = session.pool.get(id).unwrap();
        assert!(clip.is_loaded());
        assert_eq!(clip.num_frames(), 0);
        assert!(clip.file_hash().is_some());
    }

    #[test]
    fn gc_forgets_removed_clips() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = Session::open(dir.path(), PoolConfig::default()).unwrap();
        let keep = add_clip(&mut session, "Keep");
        let drop = add_clip(&mut session, "Drop");
        session.usage.forget(drop);
        assert_eq!(session.gc(), vec![drop]);
        assert!(session.pool.get(keep).is_ok());
        assert!(session.usage.regions.contains(&keep));
    }
}
