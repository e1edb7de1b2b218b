use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::trace;

use crate::error::StoreError;

/// Mode for files that must not be readable by other users
pub(crate) const PRIVATE_MODE: u32 = 0o600;

/// Mode for certificate material and metadata
pub(crate) const PUBLIC_MODE: u32 = 0o644;

/// Replace `path` with `data` using a sibling temporary file and a rename.
///
/// On success the file holds exactly `data`. On failure the previous content
/// is left in place and the temporary file is removed.
pub(crate) fn write_replace(path: &Path, data: &[u8], mode: u32) -> Result<(), StoreError> {
    let tmp = temp_path(path);
    trace!(path = %path.display(), bytes = data.len(), "Writing file");

    // A leftover from an interrupted write may carry a wider mode
    let _ = fs::remove_file(&tmp);

    if let Err(e) = write_new(&tmp, data, mode).and_then(|_| fs::rename(&tmp, path)) {
        let _ = fs::remove_file(&tmp);
        return Err(StoreError::write(path, e));
    }

    Ok(())
}

fn write_new(path: &Path, data: &[u8], mode: u32) -> io::Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);

    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(mode);
    }
    #[cfg(not(unix))]
    let _ = mode;

    let mut file = options.open(path)?;
    file.write_all(data)?;
    file.sync_all()
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.tmp", name))
}

/// Remove a directory tree. A directory that is already gone is not an error.
pub(crate) fn remove_tree(path: &Path) -> Result<(), StoreError> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StoreError::io(path, e)),
    }
}
