//! On-disk fixtures that test commands refer to.

use std::path::{Path, PathBuf};

use crate::{Error, Workspace, trace_categories};

/// Contents of `test_files/infile`.
pub const INFILE_CONTENT: &str = "hi\nhello\nworld\n42\n";

/// Contents of `test_files/infile_big`.
pub const INFILE_BIG_CONTENT: &str = "Lorem ipsum dolor sit amet, consectetur adipiscing elit. \
Sed non risus. Suspendisse lectus tortor, dignissim sit amet, adipiscing nec, ultricies sed, \
dolor. Cras elementum ultrices diam. Maecenas ligula massa, varius a, semper congue, euismod non, \
mi. Proin porttitor, orci nec nonummy molestie, enim est eleifend mi, non fermentum diam nisl sit \
amet erat. Duis semper. Duis arcu massa, scelerisque vitae, consequat in, pretium a, enim. \
Pellentesque congue. Ut in risus volutpat libero pharetra tempor. Cras vestibulum bibendum augue. \
Praesent egestas leo in pede. Praesent blandit odio eu enim. Pellentesque sed dui ut augue \
blandit sodales. Vestibulum ante ipsum primis in faucibus orci luctus et ultrices posuere cubilia \
Curae; Aliquam nibh. Mauris ac mauris sed pede pellentesque fermentum. Maecenas adipiscing ante \
non diam sodales hendrerit.";

/// The fixture files under a workspace root, plus the workspace directories themselves.
#[derive(Clone, Debug)]
pub struct Fixtures {
    test_files_dir: PathBuf,
    workspace: Workspace,
}

impl Fixtures {
    /// Creates `test_files/` under the workspace root with its sample files, and the
    /// workspace's staging and snapshot directories.
    ///
    /// Existing sample files are left as they are.
    pub fn setup(workspace: &Workspace) -> Result<Self, Error> {
        let test_files_dir = workspace.root.join("test_files");
        std::fs::create_dir_all(&test_files_dir).map_err(Error::workspace(&test_files_dir))?;

        let fixtures = Self {
            test_files_dir,
            workspace: workspace.clone(),
        };

        write_if_missing(&fixtures.invalid_permission_path(), "test")?;
        set_mode(&fixtures.invalid_permission_path(), 0o000)?;

        write_if_missing(&fixtures.test_files_dir.join("infile"), INFILE_CONTENT)?;
        write_if_missing(&fixtures.test_files_dir.join("infile_big"), INFILE_BIG_CONTENT)?;

        workspace.prepare()?;

        Ok(fixtures)
    }

    /// Directory holding the sample files.
    pub fn test_files_dir(&self) -> &Path {
        &self.test_files_dir
    }

    /// Path of the file no shell may read or write.
    pub fn invalid_permission_path(&self) -> PathBuf {
        self.test_files_dir.join("invalid_permission")
    }

    /// Restores permissions on the restricted file and removes the workspace directories.
    /// Problems are logged, not returned.
    pub fn teardown(self) {
        let restricted = self.invalid_permission_path();
        if let Err(e) = set_mode(&restricted, 0o666) {
            tracing::warn!("failed to restore permissions on {}: {e}", restricted.display());
        }

        if let Err(e) = self.workspace.remove() {
            tracing::warn!("failed to clean up workspace: {e}");
        }
    }
}

fn write_if_missing(path: &Path, content: &str) -> Result<(), Error> {
    if path.exists() {
        tracing::debug!(target: trace_categories::WORKSPACE, "keeping existing fixture {}", path.display());
        return Ok(());
    }

    std::fs::write(path, content).map_err(Error::workspace(path))
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<(), Error> {
    use std::os::unix::fs::PermissionsExt;

    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
        .map_err(Error::workspace(path))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> Result<(), Error> {
    Ok(())
}
