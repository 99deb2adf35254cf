use std::io::Write;
use std::path::Path;

use crate::errors::ProviError;

pub fn file_exists<P>(path: P) -> bool
where
    P: AsRef<Path>,
{
    path.as_ref().exists()
}

/// Writes `contents` to `path`, creating parent directories as needed.
pub fn write_file<P>(path: P, contents: &str) -> Result<(), ProviError>
where
    P: AsRef<Path>,
{
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|err| {
            ProviError::NoSuchFile(err, parent.display().to_string())
        })?;
    }

    std::fs::write(path, contents)
        .map_err(|err| ProviError::NoSuchFile(err, path.display().to_string()))
}

/// Like [`write_file`], but marks the file executable (mode 0755).
pub fn write_executable<P>(path: P, contents: &str) -> Result<(), ProviError>
where
    P: AsRef<Path>,
{
    use std::os::unix::fs::PermissionsExt;

    write_file(&path, contents)?;

    let path = path.as_ref();
    let perms = std::fs::Permissions::from_mode(0o755);
    std::fs::set_permissions(path, perms)
        .map_err(|err| ProviError::NoSuchFile(err, path.display().to_string()))
}

/// Appends a line to a file, creating it if missing.
pub fn append_line<P>(path: P, line: &str) -> Result<(), ProviError>
where
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let mut f = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|err| ProviError::NoSuchFile(err, path.display().to_string()))?;

    writeln!(f, "{line}")
        .map_err(|err| ProviError::NoSuchFile(err, path.display().to_string()))
}
