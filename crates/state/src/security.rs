// Owner-only permissions for persisted state on disk.

use std::fs::{self, OpenOptions};
use std::io;
use std::path::Path;

pub fn ensure_owner_only_file(path: &Path) -> io::Result<()> {
    ensure_mode(path, 0o600)
}

pub fn ensure_owner_only_dir(path: &Path) -> io::Result<()> {
    ensure_mode(path, 0o700)
}

#[cfg(unix)]
fn ensure_mode(path: &Path, wanted: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    if !path.exists() {
        return Ok(());
    }

    let mode = fs::metadata(path)?.permissions().mode() & 0o777;
    if mode != wanted {
        fs::set_permissions(path, fs::Permissions::from_mode(wanted))?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn ensure_mode(path: &Path, _wanted: u32) -> io::Result<()> {
    let _ = path;
    Ok(())
}

pub fn open_private_truncate(path: &Path) -> io::Result<fs::File> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;

        OpenOptions::new().create(true).write(true).truncate(true).mode(0o600).open(path)
    }
    #[cfg(not(unix))]
    {
        OpenOptions::new().create(true).write(true).truncate(true).open(path)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::os::unix::fs::PermissionsExt;

    use super::*;
    use tempfile::tempdir;

    #[test]
    fn private_files_and_dirs_are_owner_only() {
        let tmp = tempdir().expect("tempdir should be created");
        let dir = tmp.path().join("state");
        fs::create_dir_all(&dir).unwrap();
        fs::set_permissions(&dir, fs::Permissions::from_mode(0o755)).unwrap();
        ensure_owner_only_dir(&dir).unwrap();
        assert_eq!(fs::metadata(&dir).unwrap().permissions().mode() & 0o777, 0o700);

        let file = dir.join("workspaces.json");
        drop(open_private_truncate(&file).unwrap());
        assert_eq!(fs::metadata(&file).unwrap().permissions().mode() & 0o777, 0o600);
    }

    #[test]
    fn missing_paths_are_ignored() {
        let tmp = tempdir().expect("tempdir should be created");
        assert!(ensure_owner_only_file(&tmp.path().join("nope")).is_ok());
    }
}
