//! Capability-based file helpers for opening mapping and input files.
//!
//! Paths are UTF-8 (`camino`) and resolved through `cap-std` directories
//! opened with ambient authority. Handles are returned as `std::fs::File`
//! because the mapping backends need raw OS handles.
#![forbid(unsafe_code)]

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::fs::OpenOptions;
use cap_std::{ambient_authority, fs_utf8};
use std::fs::File;
use std::io;
use std::path::Component;

fn open_read_only(path: &Utf8Path) -> io::Result<fs_utf8::File> {
    fs_utf8::File::open_ambient(path, ambient_authority())
}

/// Open an input file read-only and hand back the standard library handle.
pub fn open_input(path: &Utf8Path) -> io::Result<File> {
    open_read_only(path).map(fs_utf8::File::into_std)
}

/// Open a file suitable for backing a memory mapping.
///
/// Read-only mappings require the file to exist. Writable mappings open the
/// file for reading and writing, creating it (and any missing parent
/// directories) when absent. Existing contents are never truncated.
pub fn open_for_mapping(path: &Utf8Path, writable: bool) -> io::Result<File> {
    if !writable {
        return open_input(path);
    }
    ensure_parent_dir(path)?;
    let (dir, name) = parent_dir_and_name(path)?;
    let mut options = OpenOptions::new();
    options.read(true).write(true).create(true);
    dir.open_with(name.as_str(), &options)
        .map(fs_utf8::File::into_std)
}

/// The directory holding `path`, opened ambiently, and the file name in it.
fn parent_dir_and_name(path: &Utf8Path) -> io::Result<(fs_utf8::Dir, String)> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent,
        _ => Utf8Path::new("."),
    };
    let file_name = path
        .file_name()
        .ok_or_else(|| io::Error::other("target should include a file name"))?
        .to_owned();
    let dir = fs_utf8::Dir::open_ambient_dir(parent, ambient_authority())?;
    Ok((dir, file_name))
}

/// Ensure the parent directory for `path` exists, handling absolute paths safely for cap-std.
pub fn ensure_parent_dir(path: &Utf8Path) -> io::Result<()> {
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    if parent.as_os_str().is_empty() || parent == Utf8Path::new("/") {
        return Ok(());
    }

    let (base_dir, relative) = split_ambient_base(parent)?;
    if relative.as_os_str().is_empty() {
        return Ok(());
    }
    base_dir.create_dir_all(&relative)?;
    Ok(())
}

/// Split `parent` into an ambient base directory (drive, root, or `.`) and
/// the path below it.
fn split_ambient_base(parent: &Utf8Path) -> io::Result<(fs_utf8::Dir, Utf8PathBuf)> {
    let std_parent = parent.as_std_path();

    let (base, relative) = match std_parent.components().next() {
        // Windows absolute path with a drive or UNC prefix.
        Some(Component::Prefix(prefix)) => {
            let prefix_str = prefix
                .as_os_str()
                .to_str()
                .ok_or_else(|| io::Error::other("non-UTF-8 path prefix"))?;

            let base = Utf8PathBuf::from(prefix_str).join(std::path::MAIN_SEPARATOR.to_string());
            let relative = std_parent
                .strip_prefix(base.as_std_path())
                .or_else(|_| std_parent.strip_prefix(prefix.as_os_str()))
                .map_err(|_| io::Error::other("failed to strip prefix from parent path"))?
                .to_path_buf();
            (base, relative)
        }
        Some(Component::RootDir) => {
            let base = Utf8PathBuf::from(std::path::MAIN_SEPARATOR.to_string());
            let relative = std_parent
                .strip_prefix(base.as_std_path())
                .map_err(|_| io::Error::other("failed to strip root from absolute path"))?
                .to_path_buf();
            (base, relative)
        }
        _ => (Utf8PathBuf::from("."), std_parent.to_path_buf()),
    };

    let dir = fs_utf8::Dir::open_ambient_dir(&base, ambient_authority())?;
    let relative = Utf8PathBuf::from_path_buf(relative)
        .map_err(|_| io::Error::other("non-UTF-8 parent path"))?;

    Ok((dir, relative))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};
    use std::io::{Read, Write};
    use tempfile::TempDir;

    #[fixture]
    fn workspace() -> TempDir {
        TempDir::new().expect("create temp dir")
    }

    fn utf8_join(dir: &TempDir, tail: &str) -> Utf8PathBuf {
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf())
            .expect("temp dir should be UTF-8");
        root.join(tail)
    }

    #[rstest]
    fn writable_open_creates_missing_parents(workspace: TempDir) {
        let path = utf8_join(&workspace, "nested/deeper/nodes.bin");
        let file = open_for_mapping(&path, true).expect("open writable mapping file");
        assert_eq!(file.metadata().expect("metadata").len(), 0);
        assert!(path.as_std_path().is_file());
    }

    #[rstest]
    fn writable_open_keeps_existing_contents(workspace: TempDir) {
        let path = utf8_join(&workspace, "ways.bin");
        std::fs::write(&path, b"payload").expect("seed file");
        let mut file = open_for_mapping(&path, true).expect("open writable mapping file");
        let mut contents = String::new();
        file.read_to_string(&mut contents).expect("read back");
        assert_eq!(contents, "payload");
    }

    #[rstest]
    fn parent_dirs_are_created_below_absolute_roots(workspace: TempDir) {
        let path = utf8_join(&workspace, "a/b/c/tags.bin");
        assert!(path.is_absolute());
        ensure_parent_dir(&path).expect("create parents");
        assert!(utf8_join(&workspace, "a/b/c").as_std_path().is_dir());
        ensure_parent_dir(&path).expect("existing parents are accepted");
    }

    #[rstest]
    fn readonly_open_requires_existing_file(workspace: TempDir) {
        let path = utf8_join(&workspace, "missing.bin");
        let err = open_for_mapping(&path, false).expect_err("missing file must not open");
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[rstest]
    fn readonly_handle_rejects_writes(workspace: TempDir) {
        let path = utf8_join(&workspace, "relations.bin");
        std::fs::write(&path, b"abc").expect("seed file");
        let mut file = open_input(&path).expect("open input");
        assert!(file.write_all(b"x").is_err(), "read-only handle accepted a write");
    }
}
