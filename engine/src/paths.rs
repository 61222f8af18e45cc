use std::path::PathBuf;

pub const POOL_DIR: &str = "pool";
pub const BACKUPS_DIR: &str = "backups";
pub const PROJECT_FILE: &str = "project.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectPath {
    Pool,
    ProjectFile,
    Backups,
}

/// Resolves where a project keeps its files, for the main project or for the
/// current backup.
pub trait PathProvider: Send + Sync {
    fn path(&self, kind: ProjectPath, is_backup: bool) -> PathBuf;
}

/// `<root>/pool` for the project itself, `<root>/backups/<n>.bak/pool` for
/// backup number `n`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectDirs {
    root: PathBuf,
    backup: usize,
}

impl ProjectDirs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            backup: 0,
        }
    }

    pub fn with_backup(mut self, backup: usize) -> Self {
        self.backup = backup;
        self
    }

    fn backup_root(&self) -> PathBuf {
        self.root
            .join(BACKUPS_DIR)
            .join(format!("{}.bak", self.backup))
    }
}

impl PathProvider for ProjectDirs {
    fn path(&self, kind: ProjectPath, is_backup: bool) -> PathBuf {
        let base = if is_backup {
            self.backup_root()
        } else {
            self.root.clone()
        };
        match kind {
            ProjectPath::Pool => base.join(POOL_DIR),
            ProjectPath::ProjectFile => base.join(PROJECT_FILE),
            ProjectPath::Backups => self.root.join(BACKUPS_DIR),
        }
    }
}
