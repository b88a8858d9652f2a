use std::fs::{self, OpenOptions};
use std::path::Path;

use crate::StoreError;

fn io_error(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Create the database's parent directory and file with owner-only permissions.
///
/// Existing files keep their contents; on Unix their mode is tightened to 0o600.
pub(crate) fn prepare_db_path(path: &Path) -> Result<(), StoreError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(parent)
                .map_err(|e| io_error(parent, e))?
                .permissions()
                .mode();
            if mode & 0o077 != 0 {
                // Shared parents such as /tmp are not ours to tighten.
                if let Err(e) = fs::set_permissions(parent, fs::Permissions::from_mode(0o700)) {
                    tracing::debug!(path = %parent.display(), "Leaving directory permissions as-is: {e}");
                }
            }
        }
    }

    let mut options = OpenOptions::new();
    options.create(true).truncate(false).read(true).write(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options.open(path).map_err(|e| io_error(path, e))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))
            .map_err(|e| io_error(path, e))?;
    }
    Ok(())
}
