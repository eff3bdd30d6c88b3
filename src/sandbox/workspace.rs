use std::io;
use std::path::Path;

use tempfile::TempDir;

/// An ephemeral directory owned by exactly one run or test invocation
///
/// The directory gets a fresh random name on creation and is removed when the
/// workspace is closed or dropped, whichever comes first.
#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    pub fn create(root: &Path, prefix: &str) -> io::Result<Self> {
        std::fs::create_dir_all(root)?;
        let dir = tempfile::Builder::new().prefix(prefix).tempdir_in(root)?;
        log::debug!("Created workspace {}", dir.path().display());
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Removes the directory, logging instead of failing if that goes wrong
    pub fn close(self) {
        let path = self.dir.path().to_path_buf();
        match self.dir.close() {
            Ok(()) => log::debug!("Removed workspace {}", path.display()),
            Err(e) => log::error!("Failed to remove workspace {}: {e}", path.display()),
        }
    }
}
