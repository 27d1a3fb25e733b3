//! Staging and snapshot directories owned by the engine.

use std::path::{Path, PathBuf};

use crate::{Error, trace_categories};

/// Which per-shell snapshot directory to copy staged artifacts into.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SnapshotSide {
    /// Snapshot of the candidate shell's side effects.
    Candidate,
    /// Snapshot of the reference shell's side effects.
    Reference,
}

/// The directories both shells operate in.
///
/// Shells run with `root` as their working directory and write redirection side effects into
/// `staging_dir`. After each run the staged files are copied into that shell's snapshot
/// directory, and the staging directory is cleared before the next run.
#[derive(Clone, Debug)]
pub struct Workspace {
    /// Working directory for every spawned process.
    pub root: PathBuf,
    /// Directory shells write redirection side effects into.
    pub staging_dir: PathBuf,
    /// Snapshot of the candidate shell's side effects.
    pub candidate_dir: PathBuf,
    /// Snapshot of the reference shell's side effects.
    pub reference_dir: PathBuf,
}

impl Workspace {
    /// Creates a workspace with the conventional directory names under `root`.
    pub fn under(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            staging_dir: root.join("outfiles"),
            candidate_dir: root.join("mini_outfiles"),
            reference_dir: root.join("bash_outfiles"),
            root,
        }
    }

    /// Returns the snapshot directory for the given side.
    pub fn snapshot_dir(&self, side: SnapshotSide) -> &Path {
        match side {
            SnapshotSide::Candidate => &self.candidate_dir,
            SnapshotSide::Reference => &self.reference_dir,
        }
    }

    fn managed_dirs(&self) -> [&Path; 3] {
        [&self.staging_dir, &self.candidate_dir, &self.reference_dir]
    }

    /// Creates all managed directories.
    pub fn prepare(&self) -> Result<(), Error> {
        for dir in self.managed_dirs() {
            std::fs::create_dir_all(dir).map_err(Error::workspace(dir))?;
        }
        Ok(())
    }

    /// Empties all managed directories, creating any that are missing.
    pub fn clean_all(&self) -> Result<(), Error> {
        for dir in self.managed_dirs() {
            clean_dir(dir)?;
        }
        Ok(())
    }

    /// Empties the staging directory so the next run sees none of the previous run's effects.
    pub fn clean_staging(&self) -> Result<(), Error> {
        clean_dir(&self.staging_dir)
    }

    /// Copies everything currently staged into the snapshot directory for `side`.
    pub fn snapshot(&self, side: SnapshotSide) -> Result<(), Error> {
        copy_tree(&self.staging_dir, self.snapshot_dir(side))
    }

    /// Removes all managed directories.
    pub fn remove(&self) -> Result<(), Error> {
        for dir in self.managed_dirs() {
            match std::fs::remove_dir_all(dir) {
                Ok(()) => (),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => (),
                Err(e) => return Err(Error::workspace(dir)(e)),
            }
        }
        Ok(())
    }
}

fn clean_dir(dir: &Path) -> Result<(), Error> {
    std::fs::create_dir_all(dir).map_err(Error::workspace(dir))?;

    for entry in std::fs::read_dir(dir).map_err(Error::workspace(dir))? {
        let entry = entry.map_err(Error::workspace(dir))?;
        let path = entry.path();
        let file_type = entry.file_type().map_err(Error::workspace(&path))?;

        let result = if file_type.is_dir() {
            std::fs::remove_dir_all(&path)
        } else {
            std::fs::remove_file(&path)
        };
        result.map_err(Error::workspace(&path))?;
    }

    Ok(())
}

fn copy_tree(src: &Path, dst: &Path) -> Result<(), Error> {
    std::fs::create_dir_all(dst).map_err(Error::workspace(dst))?;

    for entry in walkdir::WalkDir::new(src).min_depth(1).sort_by_file_name() {
        let entry = entry?;
        let Ok(relative_path) = entry.path().strip_prefix(src) else {
            continue;
        };
        let target = dst.join(relative_path);

        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target).map_err(Error::workspace(&target))?;
        } else if entry.file_type().is_file() {
            std::fs::copy(entry.path(), &target).map_err(Error::workspace(entry.path()))?;
        } else {
            tracing::debug!(target: trace_categories::WORKSPACE, "not snapshotting special file: {}", entry.path().display());
        }
    }

    Ok(())
}
